// src/core/backend/statement.rs

//! A small statement interpreter for the in-memory backend.
//!
//! Supported forms (keywords are case-insensitive, unquoted identifiers fold to lowercase):
//!
//! - `CREATE TABLE [IF NOT EXISTS] t (col type, ...)`
//! - `DROP TABLE [IF EXISTS] t`
//! - `INSERT INTO t [(col, ...)] VALUES (v, ...)[, (v, ...)]`
//! - `DELETE FROM t`
//! - `SELECT * | col, ... FROM t`
//!
//! Values are single-quoted strings, numbers, `NULL`, or `$n` placeholders bound from
//! the statement parameters. Every cell is stored as text; `NULL` is stored as `""`.

use crate::core::CortadoError;
use crate::core::types::{ResultSet, Statement, Tuple};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Number(String),
    Param(usize),
    LParen,
    RParen,
    Comma,
    Star,
    Semicolon,
}

fn syntax_error(near: impl std::fmt::Display) -> CortadoError {
    CortadoError::Application(format!("syntax error at or near \"{near}\""))
}

fn tokenize(query: &str) -> Result<Vec<Token>, CortadoError> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | ',' | '*' | ';' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    '*' => Token::Star,
                    _ => Token::Semicolon,
                });
            }
            '\'' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            literal.push('\'');
                        }
                        Some('\'') => break,
                        Some(other) => literal.push(other),
                        None => {
                            return Err(CortadoError::Application(
                                "unterminated quoted string".to_string(),
                            ));
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '"' => {
                chars.next();
                let mut ident = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(other) => ident.push(other),
                        None => {
                            return Err(CortadoError::Application(
                                "unterminated quoted identifier".to_string(),
                            ));
                        }
                    }
                }
                tokens.push(Token::Word(ident));
            }
            '$' => {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                match digits.parse::<usize>() {
                    Ok(n) if n > 0 => tokens.push(Token::Param(n)),
                    _ => return Err(syntax_error(format!("${digits}"))),
                }
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let mut number = String::new();
                number.push(c);
                chars.next();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit() || **d == '.') {
                    number.push(*d);
                    chars.next();
                }
                if !number.chars().any(|d| d.is_ascii_digit()) {
                    return Err(syntax_error(number));
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(w) = chars.peek().filter(|w| w.is_alphanumeric() || **w == '_') {
                    word.push(w.to_ascii_lowercase());
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            other => return Err(syntax_error(other)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, PartialEq)]
enum Parsed {
    CreateTable {
        name: String,
        if_not_exists: bool,
        columns: Vec<String>,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<String>>,
    },
    Delete {
        table: String,
    },
    Select {
        table: String,
        columns: Option<Vec<String>>,
    },
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    params: &'a [Vec<u8>],
}

impl<'a> Parser<'a> {
    fn new(statement: &'a Statement) -> Result<Self, CortadoError> {
        Ok(Self {
            tokens: tokenize(&statement.query)?,
            pos: 0,
            params: &statement.params,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(Token::Word(w)) | Some(Token::Number(w)) | Some(Token::Str(w)) => w.clone(),
            Some(Token::Param(n)) => format!("${n}"),
            Some(Token::LParen) => "(".into(),
            Some(Token::RParen) => ")".into(),
            Some(Token::Comma) => ",".into(),
            Some(Token::Star) => "*".into(),
            Some(Token::Semicolon) => ";".into(),
            None => "end of input".into(),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), CortadoError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(syntax_error(self.describe_next()))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), CortadoError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(syntax_error(self.describe_next()))
        }
    }

    fn ident(&mut self) -> Result<String, CortadoError> {
        if let Some(Token::Word(word)) = self.peek() {
            let word = word.clone();
            self.pos += 1;
            Ok(word)
        } else {
            Err(syntax_error(self.describe_next()))
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>, CortadoError> {
        let mut idents = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            idents.push(self.ident()?);
        }
        Ok(idents)
    }

    fn value(&mut self) -> Result<String, CortadoError> {
        match self.advance() {
            Some(Token::Str(s)) | Some(Token::Number(s)) => Ok(s),
            Some(Token::Word(w)) if w == "null" => Ok(String::new()),
            Some(Token::Word(w)) if w == "true" || w == "false" => Ok(w),
            Some(Token::Param(n)) => self
                .params
                .get(n - 1)
                .ok_or_else(|| CortadoError::Application(format!("there is no parameter ${n}")))
                .and_then(|bytes| {
                    String::from_utf8(bytes.clone()).map_err(|_| {
                        CortadoError::Application(format!("parameter ${n} is not valid UTF-8"))
                    })
                }),
            _ => {
                self.pos -= 1;
                Err(syntax_error(self.describe_next()))
            }
        }
    }

    /// Accepts an optional trailing `;` and requires the end of input.
    fn finish(&mut self) -> Result<(), CortadoError> {
        self.eat(&Token::Semicolon);
        if self.peek().is_some() {
            return Err(syntax_error(self.describe_next()));
        }
        Ok(())
    }

    fn parse(mut self) -> Result<Parsed, CortadoError> {
        let parsed = if self.eat_keyword("create") {
            self.parse_create()?
        } else if self.eat_keyword("drop") {
            self.expect_keyword("table")?;
            let if_exists = self.eat_keyword("if");
            if if_exists {
                self.expect_keyword("exists")?;
            }
            Parsed::DropTable {
                name: self.ident()?,
                if_exists,
            }
        } else if self.eat_keyword("insert") {
            self.parse_insert()?
        } else if self.eat_keyword("delete") {
            self.expect_keyword("from")?;
            let table = self.ident()?;
            if self.eat_keyword("where") {
                return Err(CortadoError::Application(
                    "DELETE ... WHERE is not supported".to_string(),
                ));
            }
            Parsed::Delete { table }
        } else if self.eat_keyword("select") {
            let columns = if self.eat(&Token::Star) {
                None
            } else {
                Some(self.ident_list()?)
            };
            self.expect_keyword("from")?;
            Parsed::Select {
                table: self.ident()?,
                columns,
            }
        } else {
            return Err(syntax_error(self.describe_next()));
        };
        self.finish()?;
        Ok(parsed)
    }

    fn parse_create(&mut self) -> Result<Parsed, CortadoError> {
        self.expect_keyword("table")?;
        let if_not_exists = self.eat_keyword("if");
        if if_not_exists {
            self.expect_keyword("not")?;
            self.expect_keyword("exists")?;
        }
        let name = self.ident()?;
        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            let column = self.ident()?;
            if columns.contains(&column) {
                return Err(CortadoError::Application(format!(
                    "column \"{column}\" specified more than once"
                )));
            }
            columns.push(column);

            // Skip the type, including any parenthesised modifiers such as `varchar(20)`.
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    Some(Token::Comma) | Some(Token::RParen) if depth == 0 => break,
                    Some(Token::LParen) => depth += 1,
                    Some(Token::RParen) => depth -= 1,
                    None => return Err(syntax_error("end of input")),
                    _ => {}
                }
                self.pos += 1;
            }

            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen)?;
            break;
        }

        Ok(Parsed::CreateTable {
            name,
            if_not_exists,
            columns,
        })
    }

    fn parse_insert(&mut self) -> Result<Parsed, CortadoError> {
        self.expect_keyword("into")?;
        let table = self.ident()?;
        let columns = if self.eat(&Token::LParen) {
            let columns = self.ident_list()?;
            self.expect(&Token::RParen)?;
            Some(columns)
        } else {
            None
        };
        self.expect_keyword("values")?;

        let mut rows = Vec::new();
        loop {
            self.expect(&Token::LParen)?;
            let mut row = vec![self.value()?];
            while self.eat(&Token::Comma) {
                row.push(self.value()?);
            }
            self.expect(&Token::RParen)?;
            rows.push(row);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(Parsed::Insert {
            table,
            columns,
            rows,
        })
    }
}

#[derive(Debug)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn column_index(&self, table: &str, column: &str) -> Result<usize, CortadoError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                CortadoError::Application(format!(
                    "column \"{column}\" of relation \"{table}\" does not exist"
                ))
            })
    }
}

/// The full set of tables held by one backend instance.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    tables: IndexMap<String, Table>,
}

impl Catalog {
    pub(crate) fn execute(&mut self, statement: &Statement) -> Result<ResultSet, CortadoError> {
        if statement.query.trim().is_empty() {
            return Err(CortadoError::Application("empty query".to_string()));
        }

        match Parser::new(statement)?.parse()? {
            Parsed::CreateTable {
                name,
                if_not_exists,
                columns,
            } => {
                if self.tables.contains_key(&name) {
                    if if_not_exists {
                        return Ok(ResultSet::empty());
                    }
                    return Err(CortadoError::Application(format!(
                        "relation \"{name}\" already exists"
                    )));
                }
                self.tables.insert(
                    name,
                    Table {
                        columns,
                        rows: Vec::new(),
                    },
                );
                Ok(ResultSet::empty())
            }
            Parsed::DropTable { name, if_exists } => {
                if self.tables.shift_remove(&name).is_none() && !if_exists {
                    return Err(missing_relation(&name));
                }
                Ok(ResultSet::empty())
            }
            Parsed::Insert {
                table,
                columns,
                rows,
            } => {
                let target = self.table_mut(&table)?;
                let positions = match columns {
                    Some(columns) => columns
                        .iter()
                        .map(|c| target.column_index(&table, c))
                        .collect::<Result<Vec<_>, _>>()?,
                    None => (0..target.columns.len()).collect(),
                };

                let mut staged = Vec::with_capacity(rows.len());
                for values in rows {
                    if values.len() > positions.len() {
                        return Err(CortadoError::Application(
                            "INSERT has more expressions than target columns".to_string(),
                        ));
                    }
                    let mut row = vec![String::new(); target.columns.len()];
                    for (position, value) in positions.iter().zip(values) {
                        row[*position] = value;
                    }
                    staged.push(row);
                }
                target.rows.extend(staged);
                Ok(ResultSet::empty())
            }
            Parsed::Delete { table } => {
                self.table_mut(&table)?.rows.clear();
                Ok(ResultSet::empty())
            }
            Parsed::Select { table, columns } => {
                let source = self
                    .tables
                    .get(&table)
                    .ok_or_else(|| missing_relation(&table))?;
                let (field_names, positions) = match columns {
                    None => (source.columns.clone(), (0..source.columns.len()).collect()),
                    Some(columns) => {
                        let positions = columns
                            .iter()
                            .map(|c| source.column_index(&table, c))
                            .collect::<Result<Vec<usize>, _>>()?;
                        (columns, positions)
                    }
                };
                let tuples = source
                    .rows
                    .iter()
                    .map(|row| Tuple {
                        cells: positions.iter().map(|p| row[*p].clone()).collect(),
                    })
                    .collect();
                Ok(ResultSet {
                    field_names,
                    tuples,
                })
            }
        }
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table, CortadoError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| missing_relation(name))
    }
}

fn missing_relation(name: &str) -> CortadoError {
    CortadoError::Application(format!("relation \"{name}\" does not exist"))
}
