//! Embedded expression language for the REPL
//!
//! A small, self-contained language standing in for ad hoc dynamic
//! evaluation: arithmetic, attribute access on documents, indexing into
//! arrays, and top-level assignment into an explicit, caller-owned scope.
//! Parsing is independent of evaluation so the statement introspector can
//! inspect a snippet without executing it.

use crate::context::Value;
use crate::error::{Result, ServeError};
use crate::features::{FeatureKind, FeatureSet, FeatureStore, NdArray, SearchResults};
use crate::range::TimeSlice;
use std::collections::HashMap;
use std::io::Read;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
}

fn eval_err(msg: impl Into<String>) -> ServeError {
    ServeError::Eval(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Assign);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => match chars.next() {
                            Some(esc) => s.push(esc),
                            None => return Err(eval_err("unterminated string literal")),
                        },
                        Some(ch) => s.push(ch),
                        None => return Err(eval_err("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = s
                    .parse::<f64>()
                    .map_err(|_| eval_err(format!("invalid number literal '{}'", s)))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            other => return Err(eval_err(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A node of the parsed syntax tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    /// A bare identifier reference
    Ident(String),
    /// Attribute access, `target.name`
    Attr { target: Box<Expr>, name: String },
    /// Indexing, `target[index]`
    Index { target: Box<Expr>, index: Box<Expr> },
    /// A call, `target(args...)`
    Call { target: Box<Expr>, args: Vec<Expr> },
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Pre-order traversal. The visitor returns `false` to stop the walk
    /// early; the return value reports whether the walk ran to completion.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Expr) -> bool) -> bool {
        if !visit(self) {
            return false;
        }
        match self {
            Expr::Number(_) | Expr::Str(_) | Expr::Ident(_) => true,
            Expr::Attr { target, .. } => target.walk(visit),
            Expr::Index { target, index } => target.walk(visit) && index.walk(visit),
            Expr::Call { target, args } => {
                if !target.walk(visit) {
                    return false;
                }
                for arg in args {
                    if !arg.walk(visit) {
                        return false;
                    }
                }
                true
            }
            Expr::Neg(operand) => operand.walk(visit),
            Expr::Binary { lhs, rhs, .. } => lhs.walk(visit) && rhs.walk(visit),
        }
    }
}

/// A parsed top-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `name = expr`, executed for its side effect on the scope
    Assign { target: String, value: Expr },
}

/// Parse a statement without evaluating anything
pub fn parse(input: &str) -> Result<Stmt> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(eval_err("empty statement"));
    }

    let mut parser = Parser { tokens, pos: 0 };
    // `ident = expr` at the top level is an assignment statement.
    if let (Some(Token::Ident(name)), Some(Token::Assign)) =
        (parser.tokens.first(), parser.tokens.get(1))
    {
        let target = name.clone();
        parser.pos = 2;
        let value = parser.expression()?;
        parser.expect_end()?;
        return Ok(Stmt::Assign { target, value });
    }

    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(Stmt::Expr(expr))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(eval_err(format!(
                "expected {:?}, found {:?}",
                token,
                self.peek()
            )))
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(eval_err(format!("unexpected trailing {:?}", t))),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.additive()
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    other => {
                        return Err(eval_err(format!(
                            "expected attribute name, found {:?}",
                            other
                        )))
                    }
                };
                expr = Expr::Attr {
                    target: Box::new(expr),
                    name,
                };
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                }
                expr = Expr::Call {
                    target: Box::new(expr),
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            other => Err(eval_err(format!("unexpected {:?}", other))),
        }
    }
}

/// A value produced by evaluation or bound in a scope
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// The result of a side-effecting statement; displays as nothing
    Unit,
    Number(f64),
    Str(String),
    Array(NdArray),
    /// A stored document, by id
    Document(String),
    Search(SearchResults),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Unit => "unit",
            ScriptValue::Number(_) => "number",
            ScriptValue::Str(_) => "string",
            ScriptValue::Array(_) => "array",
            ScriptValue::Document(_) => "document",
            ScriptValue::Search(_) => "search results",
        }
    }

    /// The raw value this produces for preview serialization, if any
    pub fn preview_value(&self) -> Option<Value> {
        match self {
            ScriptValue::Array(a) => Some(Value::Array(a.clone())),
            ScriptValue::Search(s) => Some(Value::Search(s.clone())),
            _ => None,
        }
    }

    /// Display form returned in the `result` field of a REPL response
    pub fn display(&self) -> String {
        match self {
            ScriptValue::Unit => String::new(),
            ScriptValue::Number(n) => format_number(*n),
            ScriptValue::Str(s) => s.clone(),
            ScriptValue::Array(a) => {
                if a.rank() == 1 && a.frames() <= 16 {
                    let items: Vec<String> =
                        a.data().iter().map(|v| format_number(*v)).collect();
                    format!("[{}]", items.join(", "))
                } else {
                    format!("array(shape={:?})", a.shape())
                }
            }
            ScriptValue::Document(id) => format!("<document {}>", id),
            ScriptValue::Search(s) => format!("<search results: {} hits>", s.hits.len()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Explicit, caller-owned evaluation scope
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: HashMap<String, ScriptValue>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: ScriptValue) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Evaluates statements against a scope, fetching feature values through the
/// storage boundary when a document attribute is accessed
pub struct Interpreter<'a> {
    store: &'a dyn FeatureStore,
    features: &'a FeatureSet,
}

impl<'a> Interpreter<'a> {
    pub fn new(store: &'a dyn FeatureStore, features: &'a FeatureSet) -> Self {
        Interpreter { store, features }
    }

    /// Evaluate one statement; assignments mutate the scope and produce
    /// `Unit`
    pub fn execute(&self, text: &str, scope: &mut Scope) -> Result<ScriptValue> {
        match parse(text)? {
            Stmt::Assign { target, value } => {
                let value = self.eval(&value, scope)?;
                scope.bind(target, value);
                Ok(ScriptValue::Unit)
            }
            Stmt::Expr(expr) => self.eval(&expr, scope),
        }
    }

    fn eval(&self, expr: &Expr, scope: &Scope) -> Result<ScriptValue> {
        match expr {
            Expr::Number(n) => Ok(ScriptValue::Number(*n)),
            Expr::Str(s) => Ok(ScriptValue::Str(s.clone())),
            Expr::Ident(name) => scope
                .get(name)
                .cloned()
                .ok_or_else(|| eval_err(format!("name '{}' is not defined", name))),
            Expr::Attr { target, name } => {
                let target = self.eval(target, scope)?;
                self.attribute(&target, name)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                self.index(&target, &index)
            }
            Expr::Call { .. } => Err(eval_err("calls are not supported")),
            Expr::Neg(operand) => match self.eval(operand, scope)? {
                ScriptValue::Number(n) => Ok(ScriptValue::Number(-n)),
                other => Err(eval_err(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, scope)?;
                let rhs = self.eval(rhs, scope)?;
                self.binary(*op, &lhs, &rhs)
            }
        }
    }

    fn attribute(&self, target: &ScriptValue, name: &str) -> Result<ScriptValue> {
        let id = match target {
            ScriptValue::Document(id) => id,
            other => {
                return Err(eval_err(format!(
                    "attribute access on {}",
                    other.type_name()
                )))
            }
        };
        let feature = self
            .features
            .get(name)
            .ok_or_else(|| eval_err(format!("unknown feature '{}'", name)))?;

        match feature.kind {
            FeatureKind::ConstantRateSeries { .. } => {
                let array = self.store.read_series(id, feature, &TimeSlice::full())?;
                Ok(ScriptValue::Array(array))
            }
            FeatureKind::Audio => {
                let window = self.store.read_audio(id, feature, &TimeSlice::full())?;
                let samples = window.samples.iter().map(|s| *s as f64).collect();
                Ok(ScriptValue::Array(NdArray::vector(samples)))
            }
            FeatureKind::Packed => {
                let mut reader = self.store.open_bytes(id, feature)?;
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(ScriptValue::Str(String::from_utf8_lossy(&bytes).into_owned()))
            }
        }
    }

    fn index(&self, target: &ScriptValue, index: &ScriptValue) -> Result<ScriptValue> {
        let array = match target {
            ScriptValue::Array(a) => a,
            other => return Err(eval_err(format!("cannot index {}", other.type_name()))),
        };
        let i = match index {
            ScriptValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => *n as usize,
            other => {
                return Err(eval_err(format!(
                    "array index must be a non-negative integer, got {}",
                    other.display()
                )))
            }
        };
        if i >= array.frames() {
            return Err(eval_err(format!(
                "index {} out of range for {} frames",
                i,
                array.frames()
            )));
        }
        match array.rank() {
            1 => Ok(ScriptValue::Number(array.data()[i])),
            _ => Ok(ScriptValue::Array(NdArray::vector(array.row(i).to_vec()))),
        }
    }

    fn binary(&self, op: BinOp, lhs: &ScriptValue, rhs: &ScriptValue) -> Result<ScriptValue> {
        let (a, b) = match (lhs, rhs) {
            (ScriptValue::Number(a), ScriptValue::Number(b)) => (*a, *b),
            _ => {
                return Err(eval_err(format!(
                    "cannot combine {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        };
        let result = match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => {
                if b == 0.0 {
                    return Err(eval_err("division by zero"));
                }
                a / b
            }
        };
        Ok(ScriptValue::Number(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureSpec, MemoryFeatureStore};

    fn fixture() -> (MemoryFeatureStore, FeatureSet) {
        let store = MemoryFeatureStore::new();
        store.insert_series(
            "doc-1",
            "loudness",
            NdArray::vector(vec![0.5, 1.0, 1.5]),
            1_000_000_000_000,
        );
        let features: FeatureSet = [FeatureSpec::series("loudness", 1)].into_iter().collect();
        (store, features)
    }

    #[test]
    fn test_parse_attribute_chain() {
        let stmt = parse("doc.loudness").unwrap();
        match stmt {
            Stmt::Expr(Expr::Attr { target, name }) => {
                assert_eq!(name, "loudness");
                assert_eq!(*target, Expr::Ident("doc".to_string()));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignment() {
        let stmt = parse("x = 1 + 2").unwrap();
        assert!(matches!(stmt, Stmt::Assign { ref target, .. } if target == "x"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("doc .. loudness").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("").is_err());
        assert!(parse("doc.loudness extra").is_err());
    }

    #[test]
    fn test_precedence() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();
        let value = interp.execute("1 + 2 * 3", &mut scope).unwrap();
        assert_eq!(value, ScriptValue::Number(7.0));
    }

    #[test]
    fn test_arithmetic_display() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();
        let value = interp.execute("1 + 1", &mut scope).unwrap();
        assert_eq!(value.display(), "2");
    }

    #[test]
    fn test_undefined_name() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();
        let err = interp.execute("nope", &mut scope).unwrap_err();
        assert!(matches!(err, ServeError::Eval(_)));
    }

    #[test]
    fn test_document_attribute_fetches_series() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();
        scope.bind("doc", ScriptValue::Document("doc-1".to_string()));

        let value = interp.execute("doc.loudness", &mut scope).unwrap();
        match value {
            ScriptValue::Array(a) => assert_eq!(a.data(), &[0.5, 1.0, 1.5]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_indexing() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();
        scope.bind("doc", ScriptValue::Document("doc-1".to_string()));

        let value = interp.execute("doc.loudness[1]", &mut scope).unwrap();
        assert_eq!(value, ScriptValue::Number(1.0));

        let err = interp.execute("doc.loudness[9]", &mut scope).unwrap_err();
        assert!(matches!(err, ServeError::Eval(_)));
    }

    #[test]
    fn test_assignment_binds_into_scope() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();

        let value = interp.execute("x = 21 * 2", &mut scope).unwrap();
        assert_eq!(value, ScriptValue::Unit);
        assert_eq!(value.display(), "");
        assert_eq!(scope.get("x"), Some(&ScriptValue::Number(42.0)));
    }

    #[test]
    fn test_division_by_zero() {
        let (store, features) = fixture();
        let interp = Interpreter::new(&store, &features);
        let mut scope = Scope::new();
        assert!(interp.execute("1 / 0", &mut scope).is_err());
    }

    #[test]
    fn test_walk_is_preorder() {
        let stmt = parse("a + b").unwrap();
        let expr = match stmt {
            Stmt::Expr(e) => e,
            _ => unreachable!(),
        };
        let mut names = Vec::new();
        expr.walk(&mut |node| {
            if let Expr::Ident(name) = node {
                names.push(name.clone());
            }
            true
        });
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
