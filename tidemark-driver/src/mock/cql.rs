//! Minimal CQL parser for the statement shapes the mock cluster understands.
//!
//! Parameters (`?`) are bound positionally while parsing, so every command
//! carries concrete `Value`s. Anything outside the supported grammar is
//! rejected with `DriverError::Unsupported`.

use tidemark_core::{
    DriverError, KeyRole, LiveColumn, SortOrder, Statement, TidemarkResult, Value, WireType,
};

// ============================================================================
// TOKENS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Str(String),
    Num(i64),
    Param,
    Punct(&'static str),
}

fn tokenize(cql: &str) -> Option<Vec<Tok>> {
    let chars: Vec<char> = cql.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ';' {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' || c == '[' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.' | '[' | ']'))
            {
                i += 1;
            }
            toks.push(Tok::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            toks.push(Tok::Num(text.parse().ok()?));
        } else if c == '\'' {
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return None,
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        s.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        s.push(*ch);
                        i += 1;
                    }
                }
            }
            toks.push(Tok::Str(s));
        } else if c == '?' {
            toks.push(Tok::Param);
            i += 1;
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let punct = match two.as_str() {
                "<=" => Some("<="),
                ">=" => Some(">="),
                _ => None,
            };
            if let Some(p) = punct {
                toks.push(Tok::Punct(p));
                i += 2;
                continue;
            }
            let p = match c {
                '(' => "(",
                ')' => ")",
                ',' => ",",
                '=' => "=",
                '<' => "<",
                '>' => ">",
                '*' => "*",
                _ => return None,
            };
            toks.push(Tok::Punct(p));
            i += 1;
        }
    }
    Some(toks)
}

// ============================================================================
// COMMANDS
// ============================================================================

/// `token(cols) op value` bound.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenBound {
    pub value: i64,
    pub inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct TokenFilter {
    pub lower: Option<TokenBound>,
    pub upper: Option<TokenBound>,
}

impl TokenFilter {
    pub fn contains(&self, token: i64) -> bool {
        let above = match &self.lower {
            Some(b) if b.inclusive => token >= b.value,
            Some(b) => token > b.value,
            None => true,
        };
        let below = match &self.upper {
            Some(b) if b.inclusive => token <= b.value,
            Some(b) => token < b.value,
            None => true,
        };
        above && below
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    CreateTable {
        keyspace: String,
        table: String,
        if_not_exists: bool,
        columns: Vec<LiveColumn>,
    },
    DropTable {
        keyspace: String,
        table: String,
        if_exists: bool,
    },
    AlterAdd {
        keyspace: String,
        table: String,
        column: String,
        wire_type: WireType,
        is_static: bool,
    },
    AlterDrop {
        keyspace: String,
        table: String,
        column: String,
    },
    AlterType {
        keyspace: String,
        table: String,
        column: String,
        wire_type: WireType,
    },
    CreateIndex {
        keyspace: String,
        table: String,
        name: String,
        column: String,
        if_not_exists: bool,
    },
    DropIndex {
        keyspace: String,
        name: String,
        if_exists: bool,
    },
    Insert {
        keyspace: String,
        table: String,
        values: Vec<(String, Value)>,
        if_not_exists: bool,
        ttl: Option<i64>,
    },
    Update {
        keyspace: String,
        table: String,
        ttl: Option<i64>,
        assignments: Vec<(String, Value)>,
        filters: Vec<(String, Value)>,
        conditions: Vec<(String, Value)>,
    },
    Delete {
        keyspace: String,
        table: String,
        filters: Vec<(String, Value)>,
    },
    Select {
        keyspace: String,
        table: String,
        projection: Option<Vec<String>>,
        filters: Vec<(String, Value)>,
        token_filter: Option<TokenFilter>,
        limit: Option<usize>,
    },
}

// ============================================================================
// PARSER
// ============================================================================

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    params: std::slice::Iter<'a, Value>,
    cql: &'a str,
}

pub(crate) fn parse(statement: &Statement) -> TidemarkResult<Command> {
    let toks = tokenize(&statement.cql).ok_or_else(|| unsupported(&statement.cql))?;
    let mut parser = Parser {
        toks,
        pos: 0,
        params: statement.params.iter(),
        cql: &statement.cql,
    };
    let command = parser.command()?;
    if parser.pos != parser.toks.len() {
        return Err(parser.fail());
    }
    Ok(command)
}

fn unsupported(cql: &str) -> tidemark_core::TidemarkError {
    DriverError::Unsupported {
        statement: cql.to_string(),
    }
    .into()
}

impl<'a> Parser<'a> {
    fn fail(&self) -> tidemark_core::TidemarkError {
        unsupported(self.cql)
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Word(w)) if w.eq_ignore_ascii_case(word))
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> TidemarkResult<()> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.fail())
        }
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Punct(q)) if *q == p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> TidemarkResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.fail())
        }
    }

    fn ident(&mut self) -> TidemarkResult<String> {
        match self.next() {
            Some(Tok::Word(w)) => Ok(w),
            _ => Err(self.fail()),
        }
    }

    /// `keyspace.table`
    fn qualified(&mut self) -> TidemarkResult<(String, String)> {
        let name = self.ident()?;
        match name.split_once('.') {
            Some((ks, t)) if !ks.is_empty() && !t.is_empty() => Ok((ks.to_string(), t.to_string())),
            _ => Err(self.fail()),
        }
    }

    fn value(&mut self) -> TidemarkResult<Value> {
        match self.next() {
            Some(Tok::Param) => self.params.next().cloned().ok_or_else(|| self.fail()),
            Some(Tok::Str(s)) => Ok(Value::Text(s)),
            Some(Tok::Num(n)) => Ok(Value::BigInt(n)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Tok::Word(w)) if w.eq_ignore_ascii_case("null") => Ok(Value::Null),
            _ => Err(self.fail()),
        }
    }

    fn integer(&mut self) -> TidemarkResult<i64> {
        match self.value()? {
            Value::BigInt(n) => Ok(n),
            Value::Int(n) => Ok(i64::from(n)),
            _ => Err(self.fail()),
        }
    }

    /// A type expression, e.g. `int` or `map<text, frozen<list<int>>>`.
    fn wire_type(&mut self) -> TidemarkResult<WireType> {
        let mut raw = self.ident()?;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some(Tok::Punct("<")) => {
                    depth += 1;
                    raw.push('<');
                }
                Some(Tok::Punct(">")) if depth > 0 => {
                    depth -= 1;
                    raw.push('>');
                }
                Some(Tok::Punct(",")) if depth > 0 => raw.push(','),
                Some(Tok::Word(w)) if depth > 0 => raw.push_str(w),
                _ if depth > 0 => return Err(self.fail()),
                _ => break,
            }
            self.pos += 1;
        }
        Ok(WireType::from_cql(&raw))
    }

    fn ident_list(&mut self) -> TidemarkResult<Vec<String>> {
        self.expect_punct("(")?;
        let mut names = vec![self.ident()?];
        while self.eat_punct(",") {
            names.push(self.ident()?);
        }
        self.expect_punct(")")?;
        Ok(names)
    }

    fn command(&mut self) -> TidemarkResult<Command> {
        if self.eat_word("CREATE") {
            if self.eat_word("TABLE") {
                return self.create_table();
            }
            if self.eat_word("INDEX") {
                return self.create_index();
            }
        } else if self.eat_word("DROP") {
            if self.eat_word("TABLE") {
                let if_exists = self.if_exists()?;
                let (keyspace, table) = self.qualified()?;
                return Ok(Command::DropTable {
                    keyspace,
                    table,
                    if_exists,
                });
            }
            if self.eat_word("INDEX") {
                let if_exists = self.if_exists()?;
                let (keyspace, name) = self.qualified()?;
                return Ok(Command::DropIndex {
                    keyspace,
                    name,
                    if_exists,
                });
            }
        } else if self.eat_word("ALTER") {
            self.expect_word("TABLE")?;
            return self.alter_table();
        } else if self.eat_word("INSERT") {
            return self.insert();
        } else if self.eat_word("UPDATE") {
            return self.update();
        } else if self.eat_word("DELETE") {
            self.expect_word("FROM")?;
            let (keyspace, table) = self.qualified()?;
            self.expect_word("WHERE")?;
            let (filters, _) = self.where_clause(false)?;
            return Ok(Command::Delete {
                keyspace,
                table,
                filters,
            });
        } else if self.eat_word("SELECT") {
            return self.select();
        }
        Err(self.fail())
    }

    fn if_exists(&mut self) -> TidemarkResult<bool> {
        if self.eat_word("IF") {
            self.expect_word("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn if_not_exists(&mut self) -> TidemarkResult<bool> {
        if self.eat_word("IF") {
            self.expect_word("NOT")?;
            self.expect_word("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn create_table(&mut self) -> TidemarkResult<Command> {
        let if_not_exists = self.if_not_exists()?;
        let (keyspace, table) = self.qualified()?;
        self.expect_punct("(")?;

        let mut columns: Vec<LiveColumn> = Vec::new();
        let mut partition: Vec<String> = Vec::new();
        let mut clustering: Vec<String> = Vec::new();

        loop {
            if self.eat_word("PRIMARY") {
                self.expect_word("KEY")?;
                self.expect_punct("(")?;
                if matches!(self.peek(), Some(Tok::Punct("("))) {
                    partition = self.ident_list()?;
                } else {
                    partition = vec![self.ident()?];
                }
                while self.eat_punct(",") {
                    clustering.push(self.ident()?);
                }
                self.expect_punct(")")?;
            } else {
                let name = self.ident()?;
                let wire_type = self.wire_type()?;
                let mut role = KeyRole::Regular;
                if self.eat_word("STATIC") {
                    role = KeyRole::Static;
                }
                if self.eat_word("PRIMARY") {
                    self.expect_word("KEY")?;
                    partition = vec![name.clone()];
                }
                columns.push(LiveColumn {
                    name,
                    wire_type,
                    key_role: role,
                    ordinal: -1,
                    sort_order: SortOrder::None,
                });
            }
            if self.eat_punct(")") {
                break;
            }
            self.expect_punct(",")?;
        }

        let mut orders: Vec<(String, SortOrder)> = Vec::new();
        if self.eat_word("WITH") {
            self.expect_word("CLUSTERING")?;
            self.expect_word("ORDER")?;
            self.expect_word("BY")?;
            self.expect_punct("(")?;
            loop {
                let name = self.ident()?;
                let order = if self.eat_word("DESC") {
                    SortOrder::Desc
                } else {
                    self.eat_word("ASC");
                    SortOrder::Asc
                };
                orders.push((name, order));
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }

        if partition.is_empty() {
            return Err(self.fail());
        }
        for col in columns.iter_mut() {
            if let Some(pos) = partition.iter().position(|p| *p == col.name) {
                col.key_role = KeyRole::PartitionKey;
                col.ordinal = pos as i32;
            } else if let Some(pos) = clustering.iter().position(|c| *c == col.name) {
                col.key_role = KeyRole::Clustering;
                col.ordinal = pos as i32;
                col.sort_order = orders
                    .iter()
                    .find(|(n, _)| *n == col.name)
                    .map(|(_, o)| *o)
                    .unwrap_or(SortOrder::Asc);
            }
        }

        Ok(Command::CreateTable {
            keyspace,
            table,
            if_not_exists,
            columns,
        })
    }

    fn create_index(&mut self) -> TidemarkResult<Command> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.ident()?;
        self.expect_word("ON")?;
        let (keyspace, table) = self.qualified()?;
        let mut cols = self.ident_list()?;
        if cols.len() != 1 {
            return Err(self.fail());
        }
        Ok(Command::CreateIndex {
            keyspace,
            table,
            name,
            column: cols.remove(0),
            if_not_exists,
        })
    }

    fn alter_table(&mut self) -> TidemarkResult<Command> {
        let (keyspace, table) = self.qualified()?;
        if self.eat_word("ADD") {
            let column = self.ident()?;
            let wire_type = self.wire_type()?;
            let is_static = self.eat_word("STATIC");
            return Ok(Command::AlterAdd {
                keyspace,
                table,
                column,
                wire_type,
                is_static,
            });
        }
        if self.eat_word("DROP") {
            let column = self.ident()?;
            return Ok(Command::AlterDrop {
                keyspace,
                table,
                column,
            });
        }
        if self.eat_word("ALTER") {
            let column = self.ident()?;
            self.expect_word("TYPE")?;
            let wire_type = self.wire_type()?;
            return Ok(Command::AlterType {
                keyspace,
                table,
                column,
                wire_type,
            });
        }
        Err(self.fail())
    }

    fn using_ttl(&mut self) -> TidemarkResult<Option<i64>> {
        if self.eat_word("USING") {
            self.expect_word("TTL")?;
            Ok(Some(self.integer()?))
        } else {
            Ok(None)
        }
    }

    fn insert(&mut self) -> TidemarkResult<Command> {
        self.expect_word("INTO")?;
        let (keyspace, table) = self.qualified()?;
        let names = self.ident_list()?;
        self.expect_word("VALUES")?;
        self.expect_punct("(")?;
        let mut values = vec![self.value()?];
        while self.eat_punct(",") {
            values.push(self.value()?);
        }
        self.expect_punct(")")?;
        if names.len() != values.len() {
            return Err(self.fail());
        }
        let if_not_exists = self.if_not_exists()?;
        let ttl = self.using_ttl()?;
        Ok(Command::Insert {
            keyspace,
            table,
            values: names.into_iter().zip(values).collect(),
            if_not_exists,
            ttl,
        })
    }

    fn update(&mut self) -> TidemarkResult<Command> {
        let (keyspace, table) = self.qualified()?;
        let ttl = self.using_ttl()?;
        self.expect_word("SET")?;
        let mut assignments = Vec::new();
        loop {
            let name = self.ident()?;
            self.expect_punct("=")?;
            assignments.push((name, self.value()?));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_word("WHERE")?;
        let (filters, _) = self.where_clause(false)?;
        let mut conditions = Vec::new();
        if self.eat_word("IF") {
            loop {
                let name = self.ident()?;
                self.expect_punct("=")?;
                conditions.push((name, self.value()?));
                if !self.eat_word("AND") {
                    break;
                }
            }
        }
        Ok(Command::Update {
            keyspace,
            table,
            ttl,
            assignments,
            filters,
            conditions,
        })
    }

    fn select(&mut self) -> TidemarkResult<Command> {
        let projection = if self.eat_punct("*") {
            None
        } else {
            let mut names = vec![self.ident()?];
            while self.eat_punct(",") {
                names.push(self.ident()?);
            }
            Some(names)
        };
        self.expect_word("FROM")?;
        let (keyspace, table) = self.qualified()?;
        let (filters, token_filter) = if self.eat_word("WHERE") {
            self.where_clause(true)?
        } else {
            (Vec::new(), None)
        };
        let limit = if self.eat_word("LIMIT") {
            Some(self.integer()?.max(0) as usize)
        } else {
            None
        };
        Ok(Command::Select {
            keyspace,
            table,
            projection,
            filters,
            token_filter,
            limit,
        })
    }

    /// `col = v [AND col = v]* [AND token(cols) op v]*`
    fn where_clause(
        &mut self,
        allow_token: bool,
    ) -> TidemarkResult<(Vec<(String, Value)>, Option<TokenFilter>)> {
        let mut filters = Vec::new();
        let mut token_filter: Option<TokenFilter> = None;
        loop {
            if allow_token && self.peek_word("token") {
                self.pos += 1;
                self.ident_list()?;
                let op = match self.next() {
                    Some(Tok::Punct(p)) => p,
                    _ => return Err(self.fail()),
                };
                let value = self.integer()?;
                let filter = token_filter.get_or_insert_with(TokenFilter::default);
                match op {
                    ">" => filter.lower = Some(TokenBound { value, inclusive: false }),
                    ">=" => filter.lower = Some(TokenBound { value, inclusive: true }),
                    "<" => filter.upper = Some(TokenBound { value, inclusive: false }),
                    "<=" => filter.upper = Some(TokenBound { value, inclusive: true }),
                    _ => return Err(self.fail()),
                }
            } else {
                let name = self.ident()?;
                self.expect_punct("=")?;
                filters.push((name, self.value()?));
            }
            if !self.eat_word("AND") {
                break;
            }
        }
        Ok((filters, token_filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(cql: &str, params: Vec<Value>) -> Command {
        parse(&Statement::with_params(cql, params)).unwrap()
    }

    #[test]
    fn test_parse_create_table_compound_key() {
        let c = cmd(
            "CREATE TABLE IF NOT EXISTS shop.events (tenant uuid, day date, seq bigint, tags set<text>, \
             PRIMARY KEY ((tenant, day), seq)) WITH CLUSTERING ORDER BY (seq DESC)",
            vec![],
        );
        match c {
            Command::CreateTable {
                if_not_exists,
                columns,
                ..
            } => {
                assert!(if_not_exists);
                assert_eq!(columns.len(), 4);
                assert_eq!(columns[1].key_role, KeyRole::PartitionKey);
                assert_eq!(columns[1].ordinal, 1);
                assert_eq!(columns[2].key_role, KeyRole::Clustering);
                assert_eq!(columns[2].sort_order, SortOrder::Desc);
                assert_eq!(columns[3].wire_type, WireType::Other("set<text>".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert_lwt_with_ttl_param() {
        let c = cmd(
            "INSERT INTO ks.lock (lock_id, owner) VALUES (?, ?) IF NOT EXISTS USING TTL ?",
            vec!["m".into(), "me".into(), Value::BigInt(60)],
        );
        assert_eq!(
            c,
            Command::Insert {
                keyspace: "ks".to_string(),
                table: "lock".to_string(),
                values: vec![
                    ("lock_id".to_string(), Value::Text("m".to_string())),
                    ("owner".to_string(), Value::Text("me".to_string())),
                ],
                if_not_exists: true,
                ttl: Some(60),
            }
        );
    }

    #[test]
    fn test_parse_token_range_select() {
        let c = cmd(
            "SELECT * FROM shop.items WHERE token(id) > ? AND token(id) <= ?",
            vec![Value::BigInt(-10), Value::BigInt(10)],
        );
        match c {
            Command::Select {
                token_filter: Some(filter),
                ..
            } => {
                assert!(!filter.contains(-10));
                assert!(filter.contains(-9));
                assert!(filter.contains(10));
                assert!(!filter.contains(11));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_alter_variants() {
        assert!(matches!(
            cmd("ALTER TABLE a.b ADD owner text STATIC", vec![]),
            Command::AlterAdd { is_static: true, .. }
        ));
        assert!(matches!(
            cmd("ALTER TABLE a.b ALTER n TYPE bigint", vec![]),
            Command::AlterType { wire_type: WireType::BigInt, .. }
        ));
        assert!(matches!(
            cmd("ALTER TABLE a.b DROP n", vec![]),
            Command::AlterDrop { .. }
        ));
    }

    #[test]
    fn test_rejects_unknown_statements() {
        assert!(parse(&Statement::new("TRUNCATE a.b")).is_err());
        assert!(parse(&Statement::new("SELECT * FROM unqualified")).is_err());
        assert!(parse(&Statement::new("INSERT INTO a.b (x) VALUES (?)")).is_err());
    }
}
