//! Lexer, parser and evaluator for the infix query text of the expression,
//! selector and statement dialects.
//!
//! One grammar covers all three spellings:
//!
//! - paths: `#n0.#n1[2]`, `c["items"][0]["sku"]`, `"items"[0]."sku"`
//! - parameters: `:v0`, `@p0`, positional `?`
//! - comparisons `= <> != < <= > >=`, `BETWEEN`, `IN (...)` / `IN [...]`
//! - `AND`, `OR`, `NOT`, parentheses, postfix `IS [NOT] MISSING`
//! - functions: `attribute_exists`, `attribute_not_exists`, `IS_DEFINED`,
//!   `begins_with`, `STARTSWITH`, `contains`, `CONTAINS`, `ARRAY_CONTAINS`
//!
//! Keywords are matched case-insensitively; function names are matched
//! exactly because `contains` and `CONTAINS` differ (the former also tests
//! list membership).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value;

use crate::types::FieldPath;
use crate::types::value::{Record, compare_values, lookup, values_equal};

/// Errors produced while parsing query text.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ExpressionError {
    /// An unexpected token was encountered.
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    /// A `#name` alias with no binding.
    #[error("unresolved attribute name: {name}")]
    UnresolvedName { name: String },

    /// A value placeholder with no binding.
    #[error("unresolved value placeholder: {name}")]
    UnresolvedValue { name: String },

    /// A function the emulator does not know.
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    Name(String),
    Placeholder(String),
    Positional,
    Number(u32),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Dot,
    Comma,
    Star,
    LParen,
    RParen,
    LBracket,
    RBracket,
    And,
    Or,
    Not,
    Between,
    In,
    Is,
    Missing,
    Select,
    From,
    Where,
    Order,
    By,
    Asc,
    Desc,
    True,
    False,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::Quoted(s) => write!(f, "\"{}\"", s),
            Token::Name(s) | Token::Placeholder(s) => write!(f, "{}", s),
            Token::Positional => write!(f, "'?'"),
            Token::Number(n) => write!(f, "{}", n),
            Token::Eof => write!(f, "end of input"),
            other => write!(f, "{:?}", other),
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn next_token(&mut self) -> Result<Token, ExpressionError> {
        while self.chars.peek().is_some_and(char::is_ascii_whitespace) {
            self.chars.next();
        }
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '#' | ':' | '@' => {
                self.chars.next();
                let name = self.read_ident_chars();
                if name.is_empty() {
                    return Err(unexpected(&format!("name after '{}'", ch), "nothing"));
                }
                let full = format!("{}{}", ch, name);
                if ch == '#' {
                    Token::Name(full)
                } else {
                    Token::Placeholder(full)
                }
            }
            '"' => Token::Quoted(self.read_quoted()?),
            '?' => self.single(Token::Positional),
            '=' => self.single(Token::Eq),
            '!' => {
                self.chars.next();
                if self.chars.next_if_eq(&'=').is_none() {
                    return Err(unexpected("'=' after '!'", "nothing"));
                }
                Token::Ne
            }
            '<' => {
                self.chars.next();
                if self.chars.next_if_eq(&'=').is_some() {
                    Token::Le
                } else if self.chars.next_if_eq(&'>').is_some() {
                    Token::Ne
                } else {
                    Token::Lt
                }
            }
            '>' => {
                self.chars.next();
                if self.chars.next_if_eq(&'=').is_some() {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '.' => self.single(Token::Dot),
            ',' => self.single(Token::Comma),
            '*' => self.single(Token::Star),
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            c if c.is_ascii_digit() => {
                let digits = self.read_ident_chars();
                let n = digits
                    .parse()
                    .map_err(|_| unexpected("an array index", &digits))?;
                Token::Number(n)
            }
            c if c.is_ascii_alphabetic() || c == '_' => keyword(self.read_ident_chars()),
            other => return Err(unexpected("a valid token", &format!("'{}'", other))),
        };
        Ok(token)
    }

    fn read_ident_chars(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
            s.push(c);
        }
        s
    }

    /// Reads a double-quoted string. Accepts backslash escapes and doubled quotes.
    fn read_quoted(&mut self) -> Result<String, ExpressionError> {
        self.chars.next();
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some('"') if self.chars.peek() == Some(&'"') => {
                    self.chars.next();
                    s.push('"');
                }
                Some('"') => return Ok(s),
                Some('\\') => match self.chars.next() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => break,
                },
                Some(c) => s.push(c),
                None => break,
            }
        }
        Err(unexpected("closing '\"'", "end of input"))
    }
}

fn keyword(ident: String) -> Token {
    match ident.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "BETWEEN" => Token::Between,
        "IN" => Token::In,
        "IS" => Token::Is,
        "MISSING" => Token::Missing,
        "SELECT" => Token::Select,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "ORDER" => Token::Order,
        "BY" => Token::By,
        "ASC" => Token::Asc,
        "DESC" => Token::Desc,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        _ => Token::Ident(ident),
    }
}

fn unexpected(expected: &str, found: &str) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Path(FieldPath),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Function {
    Defined,
    NotDefined,
    BeginsWith,
    Contains,
    Substring,
    ArrayContains,
}

/// A parsed boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare(Operand, CompareOp, Operand),
    Between(Operand, Operand, Operand),
    In(Operand, Vec<Operand>),
    Missing(Operand, bool),
    Call(Function, Vec<Operand>),
}

/// A parsed `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Select {
    /// Selected paths; `None` for `*`.
    pub projection: Option<Vec<FieldPath>>,
    /// The `WHERE` clause.
    pub condition: Option<Expr>,
}

/// Name and value bindings referenced by query text.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    /// `#name` alias to attribute name.
    pub names: BTreeMap<String, String>,
    /// Named placeholder (`:v0`, `@p0`) to value.
    pub named: BTreeMap<String, Value>,
    /// Positional (`?`) values in order of appearance.
    pub positional: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    bindings: &'a Bindings,
    next_positional: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &str, bindings: &'a Bindings) -> Result<Self, ExpressionError> {
        Ok(Self {
            tokens: Lexer::new(text).tokenize()?,
            pos: 0,
            bindings,
            next_positional: 0,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let token = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(unexpected(&expected.to_string(), &token.to_string()))
        }
    }

    fn finish(&mut self) -> Result<(), ExpressionError> {
        self.expect(Token::Eof)
    }

    fn parse_select(&mut self) -> Result<Select, ExpressionError> {
        self.expect(Token::Select)?;
        let projection = if self.eat(&Token::Star) {
            None
        } else {
            Some(self.parse_path_list()?)
        };
        self.expect(Token::From)?;
        // The source is routed by the request envelope; skip it.
        self.parse_path()?;
        let condition = if self.eat(&Token::Where) {
            Some(self.parse_or()?)
        } else {
            None
        };
        if self.eat(&Token::Order) {
            self.expect(Token::By)?;
            self.parse_path()?;
            if !self.eat(&Token::Asc) {
                self.eat(&Token::Desc);
            }
        }
        Ok(Select { projection, condition })
    }

    fn parse_path_list(&mut self) -> Result<Vec<FieldPath>, ExpressionError> {
        let mut paths = vec![self.parse_path()?];
        while self.eat(&Token::Comma) {
            paths.push(self.parse_path()?);
        }
        Ok(paths)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::LParen) {
            let expr = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }
        let call = match (self.peek(), self.peek_at(1)) {
            (Token::Ident(name), Token::LParen) => Some(function(name)?),
            _ => None,
        };
        if let Some(function) = call {
            self.pos += 2;
            let mut args = vec![self.parse_operand()?];
            while self.eat(&Token::Comma) {
                args.push(self.parse_operand()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::Call(function, args));
        }

        let left = self.parse_operand()?;
        match self.advance() {
            Token::Eq => Ok(Expr::Compare(left, CompareOp::Eq, self.parse_operand()?)),
            Token::Ne => Ok(Expr::Compare(left, CompareOp::Ne, self.parse_operand()?)),
            Token::Lt => Ok(Expr::Compare(left, CompareOp::Lt, self.parse_operand()?)),
            Token::Le => Ok(Expr::Compare(left, CompareOp::Le, self.parse_operand()?)),
            Token::Gt => Ok(Expr::Compare(left, CompareOp::Gt, self.parse_operand()?)),
            Token::Ge => Ok(Expr::Compare(left, CompareOp::Ge, self.parse_operand()?)),
            Token::Between => {
                let low = self.parse_operand()?;
                self.expect(Token::And)?;
                let high = self.parse_operand()?;
                Ok(Expr::Between(left, low, high))
            }
            Token::In => {
                let close = match self.advance() {
                    Token::LParen => Token::RParen,
                    Token::LBracket => Token::RBracket,
                    other => return Err(unexpected("'(' or '['", &other.to_string())),
                };
                let mut list = vec![self.parse_operand()?];
                while self.eat(&Token::Comma) {
                    list.push(self.parse_operand()?);
                }
                self.expect(close)?;
                Ok(Expr::In(left, list))
            }
            Token::Is => {
                let negated = self.eat(&Token::Not);
                self.expect(Token::Missing)?;
                Ok(Expr::Missing(left, negated))
            }
            other => Err(unexpected("a comparison", &other.to_string())),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ExpressionError> {
        match self.peek().clone() {
            Token::Placeholder(name) => {
                self.pos += 1;
                let value = self
                    .bindings
                    .named
                    .get(&name)
                    .cloned()
                    .ok_or(ExpressionError::UnresolvedValue { name })?;
                Ok(Operand::Literal(value))
            }
            Token::Positional => {
                self.pos += 1;
                let index = self.next_positional;
                self.next_positional += 1;
                let value = self
                    .bindings
                    .positional
                    .get(index)
                    .cloned()
                    .ok_or_else(|| ExpressionError::UnresolvedValue {
                        name: format!("?{}", index),
                    })?;
                Ok(Operand::Literal(value))
            }
            Token::True => {
                self.pos += 1;
                Ok(Operand::Literal(Value::Bool(true)))
            }
            Token::False => {
                self.pos += 1;
                Ok(Operand::Literal(Value::Bool(false)))
            }
            _ => Ok(Operand::Path(self.parse_path()?)),
        }
    }

    /// Parses a path. A leading bare identifier followed by `[` is the
    /// container alias and contributes no segment.
    fn parse_path(&mut self) -> Result<FieldPath, ExpressionError> {
        let mut path: Option<FieldPath> = None;
        match self.advance() {
            Token::Ident(_) if self.peek() == &Token::LBracket => {}
            Token::Ident(name) | Token::Quoted(name) => path = Some(FieldPath::key(name)),
            Token::Name(alias) => path = Some(FieldPath::key(self.resolve_name(alias)?)),
            other => return Err(unexpected("a path", &other.to_string())),
        }

        loop {
            if self.eat(&Token::LBracket) {
                let next = match self.advance() {
                    Token::Number(i) => match &path {
                        Some(p) => p.with_index(i),
                        None => return Err(unexpected("a member name", &i.to_string())),
                    },
                    Token::Quoted(name) => append(path.as_ref(), name),
                    other => return Err(unexpected("an index or member", &other.to_string())),
                };
                self.expect(Token::RBracket)?;
                path = Some(next);
            } else if self.peek() == &Token::Dot {
                self.pos += 1;
                let name = match self.advance() {
                    Token::Ident(name) | Token::Quoted(name) => name,
                    Token::Name(alias) => self.resolve_name(alias)?,
                    other => return Err(unexpected("a member name", &other.to_string())),
                };
                path = Some(append(path.as_ref(), name));
            } else {
                break;
            }
        }
        path.ok_or_else(|| unexpected("a path", "container alias"))
    }

    fn resolve_name(&self, alias: String) -> Result<String, ExpressionError> {
        self.bindings
            .names
            .get(&alias)
            .cloned()
            .ok_or(ExpressionError::UnresolvedName { name: alias })
    }
}

fn append(base: Option<&FieldPath>, name: String) -> FieldPath {
    match base {
        Some(base) => base.join(&FieldPath::key(name)),
        None => FieldPath::key(name),
    }
}

fn function(name: &str) -> Result<Function, ExpressionError> {
    Ok(match name {
        "attribute_exists" | "IS_DEFINED" => Function::Defined,
        "attribute_not_exists" => Function::NotDefined,
        "begins_with" | "STARTSWITH" => Function::BeginsWith,
        "contains" => Function::Contains,
        "CONTAINS" => Function::Substring,
        "ARRAY_CONTAINS" => Function::ArrayContains,
        other => {
            return Err(ExpressionError::UnknownFunction {
                name: other.to_string(),
            });
        }
    })
}

/// Parses a condition expression.
pub(crate) fn parse_condition(text: &str, bindings: &Bindings) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(text, bindings)?;
    let expr = parser.parse_or()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses a comma-separated list of paths.
pub(crate) fn parse_paths(text: &str, bindings: &Bindings) -> Result<Vec<FieldPath>, ExpressionError> {
    let mut parser = Parser::new(text, bindings)?;
    let paths = parser.parse_path_list()?;
    parser.finish()?;
    Ok(paths)
}

/// Parses a `SELECT` statement.
pub(crate) fn parse_select(text: &str, bindings: &Bindings) -> Result<Select, ExpressionError> {
    let mut parser = Parser::new(text, bindings)?;
    let select = parser.parse_select()?;
    parser.finish()?;
    Ok(select)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Expr {
    /// Evaluates the expression against a record.
    ///
    /// Comparisons involving a missing path are false.
    pub(crate) fn eval(&self, record: &Record) -> bool {
        match self {
            Expr::And(l, r) => l.eval(record) && r.eval(record),
            Expr::Or(l, r) => l.eval(record) || r.eval(record),
            Expr::Not(inner) => !inner.eval(record),
            Expr::Compare(l, op, r) => match (resolve(l, record), resolve(r, record)) {
                (Some(a), Some(b)) => match op {
                    CompareOp::Eq => values_equal(a, b),
                    CompareOp::Ne => !values_equal(a, b),
                    CompareOp::Lt => compare_values(a, b) == Some(Ordering::Less),
                    CompareOp::Le => matches!(compare_values(a, b), Some(Ordering::Less | Ordering::Equal)),
                    CompareOp::Gt => compare_values(a, b) == Some(Ordering::Greater),
                    CompareOp::Ge => {
                        matches!(compare_values(a, b), Some(Ordering::Greater | Ordering::Equal))
                    }
                },
                _ => false,
            },
            Expr::Between(v, low, high) => {
                match (resolve(v, record), resolve(low, record), resolve(high, record)) {
                    (Some(v), Some(low), Some(high)) => {
                        matches!(compare_values(v, low), Some(Ordering::Greater | Ordering::Equal))
                            && matches!(compare_values(v, high), Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => false,
                }
            }
            Expr::In(v, list) => resolve(v, record).is_some_and(|v| {
                list.iter()
                    .filter_map(|candidate| resolve(candidate, record))
                    .any(|candidate| values_equal(v, candidate))
            }),
            Expr::Missing(v, negated) => resolve(v, record).is_some() == *negated,
            Expr::Call(function, args) => call(*function, args, record),
        }
    }
}

fn resolve<'a>(operand: &'a Operand, record: &'a Record) -> Option<&'a Value> {
    match operand {
        Operand::Path(path) => lookup(record, path),
        Operand::Literal(value) => Some(value),
    }
}

fn call(function: Function, args: &[Operand], record: &Record) -> bool {
    let arg = |i: usize| args.get(i).and_then(|a| resolve(a, record));
    let ignore_case = matches!(arg(2), Some(Value::Bool(true)));
    let fold = |s: &str| if ignore_case { s.to_lowercase() } else { s.to_string() };

    match function {
        Function::Defined => arg(0).is_some(),
        Function::NotDefined => arg(0).is_none(),
        Function::BeginsWith => match (arg(0), arg(1)) {
            (Some(Value::String(s)), Some(Value::String(prefix))) => fold(s.as_str()).starts_with(&fold(prefix.as_str())),
            _ => false,
        },
        Function::Contains => match (arg(0), arg(1)) {
            (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle.as_str()),
            (Some(Value::Array(items)), Some(needle)) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
        Function::Substring => match (arg(0), arg(1)) {
            (Some(Value::String(s)), Some(Value::String(needle))) => fold(s.as_str()).contains(&fold(needle.as_str())),
            _ => false,
        },
        Function::ArrayContains => match (arg(0), arg(1)) {
            (Some(Value::Array(items)), Some(needle)) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn named(pairs: &[(&str, Value)]) -> Bindings {
        Bindings {
            named: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_expression_aliases() {
        let mut bindings = named(&[(":v0", json!("open")), (":v1", json!(100))]);
        bindings.names.insert("#n0".into(), "status".into());
        bindings.names.insert("#n1".into(), "amount".into());
        let expr = parse_condition("#n0 = :v0 AND #n1 >= :v1", &bindings).unwrap();
        assert!(expr.eval(&record(json!({"status": "open", "amount": 150}))));
        assert!(!expr.eval(&record(json!({"status": "open", "amount": 50}))));
        assert!(!expr.eval(&record(json!({"status": "open"}))));
    }

    #[test]
    fn test_guarded_negation_matches_missing() {
        let mut bindings = named(&[(":v0", json!("closed"))]);
        bindings.names.insert("#n0".into(), "status".into());
        let expr = parse_condition("(attribute_not_exists(#n0) OR #n0 <> :v0)", &bindings).unwrap();
        assert!(expr.eval(&record(json!({}))));
        assert!(expr.eval(&record(json!({"status": "open"}))));
        assert!(!expr.eval(&record(json!({"status": "closed"}))));
    }

    #[test]
    fn test_selector_syntax() {
        let bindings = named(&[("@p0", json!("ab")), ("@p1", json!("red"))]);
        let select = parse_select(
            r#"SELECT c["id"], c["name"] FROM c WHERE STARTSWITH(c["name"], @p0, false) AND ARRAY_CONTAINS(c["tags"], @p1) ORDER BY c["name"] ASC"#,
            &bindings,
        )
        .unwrap();
        assert_eq!(
            select.projection,
            Some(vec![FieldPath::key("id"), FieldPath::key("name")])
        );
        let expr = select.condition.unwrap();
        assert!(expr.eval(&record(json!({"name": "abc", "tags": ["red"]}))));
        assert!(!expr.eval(&record(json!({"name": "Abc", "tags": ["red"]}))));
    }

    #[test]
    fn test_statement_syntax_with_positional_parameters() {
        let bindings = Bindings {
            positional: vec![json!("A"), json!("eu"), json!("us")],
            ..Default::default()
        };
        let select = parse_select(
            r#"SELECT * FROM "orders"."bySku" WHERE "items"[0]."sku" = ? AND ("region" IS MISSING OR NOT ("region" IN [?, ?]))"#,
            &bindings,
        )
        .unwrap();
        assert_eq!(select.projection, None);
        let expr = select.condition.unwrap();
        assert!(expr.eval(&record(json!({"items": [{"sku": "A"}]}))));
        assert!(expr.eval(&record(json!({"items": [{"sku": "A"}], "region": "ap"}))));
        assert!(!expr.eval(&record(json!({"items": [{"sku": "A"}], "region": "us"}))));
    }

    #[test]
    fn test_contains_function_spellings() {
        let bindings = named(&[(":v0", json!("red")), ("@p0", json!("RED"))]);
        let lower = parse_condition("contains(tags, :v0)", &bindings).unwrap();
        assert!(lower.eval(&record(json!({"tags": ["red", "blue"]}))));
        assert!(lower.eval(&record(json!({"tags": "dark red"}))));

        let upper = parse_condition(r#"CONTAINS(c["tags"], @p0, true)"#, &bindings).unwrap();
        assert!(upper.eval(&record(json!({"tags": "dark red"}))));
        assert!(!upper.eval(&record(json!({"tags": ["RED"]}))));
    }

    #[test]
    fn test_between_binds_its_own_and() {
        let bindings = named(&[(":a", json!(1)), (":b", json!(5)), (":c", json!("x"))]);
        let expr = parse_condition("n BETWEEN :a AND :b AND s = :c", &bindings).unwrap();
        assert!(expr.eval(&record(json!({"n": 5, "s": "x"}))));
        assert!(!expr.eval(&record(json!({"n": 6, "s": "x"}))));
    }

    #[test]
    fn test_unresolved_placeholders() {
        let bindings = Bindings::default();
        assert!(matches!(
            parse_condition("#n0 = :v0", &bindings),
            Err(ExpressionError::UnresolvedName { .. })
        ));
        assert!(matches!(
            parse_condition("a = ?", &bindings),
            Err(ExpressionError::UnresolvedValue { .. })
        ));
        assert!(matches!(
            parse_condition("size(a) = :v0", &bindings),
            Err(ExpressionError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_projection_list() {
        let mut bindings = Bindings::default();
        bindings.names.insert("#n0".into(), "address".into());
        bindings.names.insert("#n1".into(), "city".into());
        let paths = parse_paths("#n0.#n1, id", &bindings).unwrap();
        assert_eq!(paths[0].to_string(), "address.city");
        assert_eq!(paths[1], FieldPath::key("id"));
    }
}
