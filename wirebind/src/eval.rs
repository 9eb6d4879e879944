//! Expression evaluation for conditions, sizes, and derived values.
//!
//! Expressions are small property-path formulas evaluated against the
//! record under construction (`self`), the most recent choice prefix
//! (`prefix`, alias `choicePrefix`), and any user-registered context
//! values and methods. There is no hidden state: everything an
//! expression can see arrives through [`EvalContext`].

use crate::error::{Error, Result};
use crate::types::{Record, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A user-registered context method.
pub type ContextMethod = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Process-wide context entries, published before any parse begins.
#[derive(Clone, Default)]
pub struct UserContext {
    values: HashMap<String, Value>,
    methods: HashMap<String, ContextMethod>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named context value, replacing any previous one.
    pub fn set_value(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Register a named context method, replacing any previous one.
    pub fn set_method(&mut self, name: &str, method: ContextMethod) {
        self.methods.insert(name.to_string(), method);
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn method(&self, name: &str) -> Option<&ContextMethod> {
        self.methods.get(name)
    }

    /// Iterate registered value entries, for introspection.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate registered method names, for introspection.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(|k| k.as_str())
    }
}

/// Everything an expression may reference during one evaluation.
#[derive(Copy, Clone)]
pub struct EvalContext<'a> {
    /// The record currently under construction or composition.
    pub current: Option<&'a Record>,

    /// The outermost record of the message, for cross-references out of
    /// a nested decode. Falls back to `current` when unset.
    pub root: Option<&'a Record>,

    /// The most recently read choice prefix.
    pub prefix: Option<u64>,

    /// User-registered values and methods.
    pub user: &'a UserContext,
}

impl<'a> EvalContext<'a> {
    pub fn new(user: &'a UserContext) -> Self {
        Self {
            current: None,
            root: None,
            prefix: None,
            user,
        }
    }

    pub fn with_record(mut self, record: &'a Record) -> Self {
        self.current = Some(record);
        self
    }

    pub fn with_root(mut self, root: &'a Record) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_prefix(mut self, prefix: Option<u64>) -> Self {
        self.prefix = prefix;
        self
    }
}

/// Evaluate an expression to a value.
pub fn evaluate(expression: &str, ctx: &EvalContext) -> Result<Value> {
    let tokens = lex(expression)?;
    let mut parser = Parser {
        expression,
        tokens,
        position: 0,
    };
    let ast = parser.parse_or()?;
    parser.expect_end()?;

    eval_node(&ast, expression, ctx)
}

/// Evaluate a condition. An empty expression is unconditionally true.
pub fn evaluate_bool(expression: &str, ctx: &EvalContext) -> Result<bool> {
    if expression.trim().is_empty() {
        return Ok(true);
    }

    match evaluate(expression, ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(evaluation_error(
            expression,
            &format!("condition yielded {}, not bool", other.kind_name()),
        )),
    }
}

/// Evaluate a size expression. Anything negative or non-integral fails
/// with `InvalidSize`.
pub fn evaluate_size(expression: &str, ctx: &EvalContext) -> Result<usize> {
    let value = evaluate(expression, ctx)?;
    match value.as_i64() {
        Some(size) if size >= 0 => Ok(size as usize),
        _ => Err(Error::InvalidSize {
            expression: expression.to_string(),
        }),
    }
}

fn evaluation_error(expression: &str, reason: &str) -> Error {
    Error::Evaluation {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

fn lex(expression: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let c = chars[index];
        match c {
            ' ' | '\t' | '\n' | '\r' => index += 1,
            '0'..='9' => {
                let start = index;
                if c == '0' && chars.get(index + 1).map(|c| *c == 'x' || *c == 'X') == Some(true) {
                    index += 2;
                    let digits_start = index;
                    while index < chars.len() && chars[index].is_ascii_hexdigit() {
                        index += 1;
                    }
                    let digits: String = chars[digits_start..index].iter().collect();
                    let value = u64::from_str_radix(&digits, 16)
                        .map_err(|_| evaluation_error(expression, "malformed hex literal"))?;
                    tokens.push(Token::UInt(value));
                } else {
                    let mut is_float = false;
                    while index < chars.len()
                        && (chars[index].is_ascii_digit()
                            || (chars[index] == '.'
                                && chars
                                    .get(index + 1)
                                    .map(|c| c.is_ascii_digit())
                                    .unwrap_or(false)
                                && !is_float))
                    {
                        if chars[index] == '.' {
                            is_float = true;
                        }
                        index += 1;
                    }
                    let text: String = chars[start..index].iter().collect();
                    if is_float {
                        let value = text
                            .parse::<f64>()
                            .map_err(|_| evaluation_error(expression, "malformed float literal"))?;
                        tokens.push(Token::Float(value));
                    } else {
                        let value = text
                            .parse::<i64>()
                            .map_err(|_| evaluation_error(expression, "malformed int literal"))?;
                        tokens.push(Token::Int(value));
                    }
                }
            }
            '\'' | '"' => {
                let quote = c;
                index += 1;
                let start = index;
                while index < chars.len() && chars[index] != quote {
                    index += 1;
                }
                if index == chars.len() {
                    return Err(evaluation_error(expression, "unterminated string literal"));
                }
                tokens.push(Token::Str(chars[start..index].iter().collect()));
                index += 1;
            }
            'a'..='z' | 'A'..='Z' | '_' | '#' => {
                let start = index;
                // A leading `#` marks a context reference in the source
                // notation; it resolves the same way a bare name does.
                if c == '#' {
                    index += 1;
                }
                while index < chars.len()
                    && (chars[index].is_ascii_alphanumeric() || chars[index] == '_')
                {
                    index += 1;
                }
                let name: String = chars[start..index]
                    .iter()
                    .filter(|c| **c != '#')
                    .collect();
                if name.is_empty() {
                    return Err(evaluation_error(expression, "dangling `#`"));
                }
                tokens.push(Token::Ident(name));
            }
            _ => {
                let two: String = chars[index..min_len(&chars, index + 2)].iter().collect();
                let punct = match two.as_str() {
                    "||" => Some("||"),
                    "&&" => Some("&&"),
                    "==" => Some("=="),
                    "!=" => Some("!="),
                    "<=" => Some("<="),
                    ">=" => Some(">="),
                    _ => None,
                };

                if let Some(p) = punct {
                    tokens.push(Token::Punct(p));
                    index += 2;
                } else {
                    let single = match c {
                        '(' => "(",
                        ')' => ")",
                        ',' => ",",
                        '.' => ".",
                        '[' => "[",
                        ']' => "]",
                        '<' => "<",
                        '>' => ">",
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        '%' => "%",
                        '!' => "!",
                        _ => {
                            return Err(evaluation_error(
                                expression,
                                &format!("unexpected character `{}`", c),
                            ))
                        }
                    };
                    tokens.push(Token::Punct(single));
                    index += 1;
                }
            }
        }
    }

    Ok(tokens)
}

fn min_len(chars: &[char], end: usize) -> usize {
    std::cmp::min(chars.len(), end)
}

#[derive(Debug)]
enum Node {
    Literal(Value),
    Ident(String),
    Member(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
    Unary(&'static str, Box<Node>),
    Binary(&'static str, Box<Node>, Box<Node>),
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if let Some(Token::Punct(p)) = self.peek() {
            if *p == punct {
                self.position += 1;
                return true;
            }
        }
        false
    }

    fn fail(&self, reason: &str) -> Error {
        evaluation_error(self.expression, reason)
    }

    fn expect_end(&self) -> Result<()> {
        if self.position != self.tokens.len() {
            return Err(self.fail("trailing tokens after expression"));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut node = self.parse_and()?;
        while self.eat_punct("||") {
            let rhs = self.parse_and()?;
            node = Node::Binary("||", Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut node = self.parse_equality()?;
        while self.eat_punct("&&") {
            let rhs = self.parse_equality()?;
            node = Node::Binary("&&", Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_equality(&mut self) -> Result<Node> {
        let mut node = self.parse_relational()?;
        loop {
            let op = if self.eat_punct("==") {
                "=="
            } else if self.eat_punct("!=") {
                "!="
            } else {
                break;
            };
            let rhs = self.parse_relational()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_relational(&mut self) -> Result<Node> {
        let mut node = self.parse_additive()?;
        loop {
            let op = if self.eat_punct("<=") {
                "<="
            } else if self.eat_punct(">=") {
                ">="
            } else if self.eat_punct("<") {
                "<"
            } else if self.eat_punct(">") {
                ">"
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_additive(&mut self) -> Result<Node> {
        let mut node = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_punct("+") {
                "+"
            } else if self.eat_punct("-") {
                "-"
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> Result<Node> {
        let mut node = self.parse_unary()?;
        loop {
            let op = if self.eat_punct("*") {
                "*"
            } else if self.eat_punct("/") {
                "/"
            } else if self.eat_punct("%") {
                "%"
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        if self.eat_punct("!") {
            return Ok(Node::Unary("!", Box::new(self.parse_unary()?)));
        }
        if self.eat_punct("-") {
            return Ok(Node::Unary("-", Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Node> {
        let mut node = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                match self.advance() {
                    Some(Token::Ident(name)) => {
                        node = Node::Member(Box::new(node), name);
                    }
                    _ => return Err(self.fail("expected member name after `.`")),
                }
            } else if self.eat_punct("[") {
                let index = self.parse_or()?;
                if !self.eat_punct("]") {
                    return Err(self.fail("expected `]`"));
                }
                node = Node::Index(Box::new(node), Box::new(index));
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Int(v)) => Ok(Node::Literal(Value::Int(v))),
            Some(Token::UInt(v)) => Ok(Node::Literal(Value::UInt(v))),
            Some(Token::Float(v)) => Ok(Node::Literal(Value::Float(v))),
            Some(Token::Str(v)) => Ok(Node::Literal(Value::Str(v))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                _ => {
                    if self.eat_punct("(") {
                        let mut args = Vec::new();
                        if !self.eat_punct(")") {
                            loop {
                                args.push(self.parse_or()?);
                                if self.eat_punct(")") {
                                    break;
                                }
                                if !self.eat_punct(",") {
                                    return Err(self.fail("expected `,` or `)` in call"));
                                }
                            }
                        }
                        Ok(Node::Call(name, args))
                    } else {
                        Ok(Node::Ident(name))
                    }
                }
            },
            Some(Token::Punct("(")) => {
                let node = self.parse_or()?;
                if !self.eat_punct(")") {
                    return Err(self.fail("expected `)`"));
                }
                Ok(node)
            }
            _ => Err(self.fail("expected a value")),
        }
    }
}

fn eval_node(node: &Node, expression: &str, ctx: &EvalContext) -> Result<Value> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Ident(name) => resolve_ident(name, expression, ctx),
        Node::Member(target, name) => {
            let value = eval_node(target, expression, ctx)?;
            member_of(&value, name, expression)
        }
        Node::Index(target, index) => {
            let value = eval_node(target, expression, ctx)?;
            let index = eval_node(index, expression, ctx)?
                .as_u64()
                .ok_or_else(|| evaluation_error(expression, "index is not an integer"))?
                as usize;
            match value {
                Value::List(items) => items
                    .get(index)
                    .cloned()
                    .ok_or_else(|| evaluation_error(expression, "list index out of range")),
                Value::Bytes(bytes) => bytes
                    .get(index)
                    .map(|b| Value::UInt(*b as u64))
                    .ok_or_else(|| evaluation_error(expression, "byte index out of range")),
                other => Err(evaluation_error(
                    expression,
                    &format!("cannot index into {}", other.kind_name()),
                )),
            }
        }
        Node::Call(name, args) => {
            let method = ctx
                .user
                .method(name)
                .ok_or_else(|| {
                    evaluation_error(expression, &format!("unknown method `{}`", name))
                })?
                .clone();
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_node(arg, expression, ctx)?);
            }
            (&*method)(&evaluated)
        }
        Node::Unary(op, target) => {
            let value = eval_node(target, expression, ctx)?;
            match *op {
                "!" => value
                    .as_bool()
                    .map(|b| Value::Bool(!b))
                    .ok_or_else(|| evaluation_error(expression, "`!` needs a bool")),
                "-" => match value {
                    Value::Int(v) => Ok(Value::Int(-v)),
                    Value::UInt(v) if v <= i64::MAX as u64 => Ok(Value::Int(-(v as i64))),
                    Value::Float(v) => Ok(Value::Float(-v)),
                    _ => Err(evaluation_error(expression, "`-` needs a number")),
                },
                _ => Err(evaluation_error(expression, "unknown unary operator")),
            }
        }
        Node::Binary(op, lhs, rhs) => eval_binary(op, lhs, rhs, expression, ctx),
    }
}

fn resolve_ident(name: &str, expression: &str, ctx: &EvalContext) -> Result<Value> {
    match name {
        "self" => ctx
            .current
            .map(|record| Value::Record(record.clone()))
            .ok_or_else(|| evaluation_error(expression, "no record in scope for `self`")),
        "root" => ctx
            .root
            .or(ctx.current)
            .map(|record| Value::Record(record.clone()))
            .ok_or_else(|| evaluation_error(expression, "no record in scope for `root`")),
        "prefix" | "choicePrefix" => ctx
            .prefix
            .map(Value::UInt)
            .ok_or_else(|| evaluation_error(expression, "no choice prefix in scope")),
        _ => {
            if let Some(value) = ctx.user.value(name) {
                return Ok(value.clone());
            }
            if let Some(record) = ctx.current {
                if let Some(value) = record.get(name) {
                    return Ok(value.clone());
                }
            }
            Err(evaluation_error(
                expression,
                &format!("unknown identifier `{}`", name),
            ))
        }
    }
}

fn member_of(value: &Value, name: &str, expression: &str) -> Result<Value> {
    if let Value::Record(record) = value {
        if let Some(field) = record.get(name) {
            return Ok(field.clone());
        }
    }

    // `size` is a pseudo-property of every sized value; a real record
    // field of the same name wins above.
    if name == "size" {
        if let Some(size) = value.size() {
            return Ok(Value::Int(size as i64));
        }
    }

    Err(evaluation_error(
        expression,
        &format!("no member `{}` on {}", name, value.kind_name()),
    ))
}

fn eval_binary(
    op: &str,
    lhs: &Node,
    rhs: &Node,
    expression: &str,
    ctx: &EvalContext,
) -> Result<Value> {
    // The boolean connectives short-circuit so that a guarded right-hand
    // side is never evaluated.
    if op == "||" || op == "&&" {
        let left = eval_node(lhs, expression, ctx)?
            .as_bool()
            .ok_or_else(|| evaluation_error(expression, "logical operand is not a bool"))?;
        if op == "||" && left {
            return Ok(Value::Bool(true));
        }
        if op == "&&" && !left {
            return Ok(Value::Bool(false));
        }
        let right = eval_node(rhs, expression, ctx)?
            .as_bool()
            .ok_or_else(|| evaluation_error(expression, "logical operand is not a bool"))?;
        return Ok(Value::Bool(right));
    }

    let left = eval_node(lhs, expression, ctx)?;
    let right = eval_node(rhs, expression, ctx)?;

    match op {
        "==" => Ok(Value::Bool(values_equal(&left, &right))),
        "!=" => Ok(Value::Bool(!values_equal(&left, &right))),
        "<" | "<=" | ">" | ">=" => {
            let ordering = compare(&left, &right)
                .ok_or_else(|| evaluation_error(expression, "operands are not comparable"))?;
            let holds = match op {
                "<" => ordering == std::cmp::Ordering::Less,
                "<=" => ordering != std::cmp::Ordering::Greater,
                ">" => ordering == std::cmp::Ordering::Greater,
                _ => ordering != std::cmp::Ordering::Less,
            };
            Ok(Value::Bool(holds))
        }
        "+" | "-" | "*" | "/" | "%" => arithmetic(op, &left, &right, expression),
        _ => Err(evaluation_error(expression, "unknown operator")),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (numeric(left), numeric(right)) {
        return match (l, r) {
            (Numeric::Int(a), Numeric::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        };
    }

    left == right
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(l), Some(r)) = (numeric(left), numeric(right)) {
        return match (l, r) {
            (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        };
    }

    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[derive(Copy, Clone)]
enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(v) => v as f64,
            Numeric::Float(v) => v,
        }
    }
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Int(v) => Some(Numeric::Int(*v as i128)),
        Value::UInt(v) => Some(Numeric::Int(*v as i128)),
        Value::Float(v) => Some(Numeric::Float(*v)),
        _ => None,
    }
}

fn arithmetic(op: &str, left: &Value, right: &Value, expression: &str) -> Result<Value> {
    let (l, r) = match (numeric(left), numeric(right)) {
        (Some(l), Some(r)) => (l, r),
        _ => {
            return Err(evaluation_error(
                expression,
                &format!(
                    "cannot apply `{}` to {} and {}",
                    op,
                    left.kind_name(),
                    right.kind_name()
                ),
            ))
        }
    };

    match (l, r) {
        (Numeric::Int(a), Numeric::Int(b)) => {
            let result = match op {
                "+" => a.checked_add(b),
                "-" => a.checked_sub(b),
                "*" => a.checked_mul(b),
                "/" => {
                    if b == 0 {
                        return Err(evaluation_error(expression, "division by zero"));
                    }
                    a.checked_div(b)
                }
                _ => {
                    if b == 0 {
                        return Err(evaluation_error(expression, "division by zero"));
                    }
                    a.checked_rem(b)
                }
            }
            .ok_or_else(|| evaluation_error(expression, "integer overflow"))?;

            if result >= 0 && result <= u64::MAX as i128 && matches!((left, right), (Value::UInt(_), Value::UInt(_)))
            {
                Ok(Value::UInt(result as u64))
            } else if result >= i64::MIN as i128 && result <= i64::MAX as i128 {
                Ok(Value::Int(result as i64))
            } else {
                Err(evaluation_error(expression, "integer overflow"))
            }
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let result = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                _ => a % b,
            };
            Ok(Value::Float(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(user: &UserContext) -> EvalContext {
        EvalContext::new(user)
    }

    #[test]
    fn empty_condition_is_true() {
        let user = UserContext::new();
        assert!(evaluate_bool("", &context(&user)).unwrap());
        assert!(evaluate_bool("   ", &context(&user)).unwrap());
    }

    #[test]
    fn arithmetic_precedence() {
        let user = UserContext::new();
        assert_eq!(
            Value::Int(14),
            evaluate("2 + 3 * 4", &context(&user)).unwrap()
        );
        assert_eq!(
            Value::Int(20),
            evaluate("(2 + 3) * 4", &context(&user)).unwrap()
        );
    }

    #[test]
    fn field_paths_resolve_against_self() {
        let mut record = Record::new("Frame");
        record.set("length", Value::UInt(4));
        let user = UserContext::new();
        let ctx = context(&user).with_record(&record);

        assert_eq!(Value::UInt(4), evaluate("length", &ctx).unwrap());
        assert_eq!(Value::UInt(4), evaluate("self.length", &ctx).unwrap());
        assert!(evaluate_bool("length == 4", &ctx).unwrap());
    }

    #[test]
    fn size_pseudo_property() {
        let mut record = Record::new("Frame");
        record.set("payload", Value::Bytes(vec![1, 2, 3, 4]));
        let user = UserContext::new();
        let ctx = context(&user).with_record(&record);

        assert_eq!(Value::Int(32), evaluate("payload.size * 8", &ctx).unwrap());
        assert_eq!(
            Value::Int(32),
            evaluate("#payload.size * 8", &ctx).unwrap()
        );
    }

    #[test]
    fn prefix_and_alias() {
        let user = UserContext::new();
        let ctx = context(&user).with_prefix(Some(0x2));

        assert!(evaluate_bool("prefix == 2", &ctx).unwrap());
        assert!(evaluate_bool("choicePrefix == 0x2", &ctx).unwrap());
        evaluate("prefix", &context(&user)).unwrap_err();
    }

    #[test]
    fn short_circuit_guards_rhs() {
        let mut record = Record::new("Frame");
        record.set("payload", Value::Null);
        let user = UserContext::new();
        let ctx = context(&user).with_record(&record);

        // Without short-circuiting, `.size` on null would fail.
        assert!(!evaluate_bool("payload != null && payload.size > 0", &ctx).unwrap());
        assert!(evaluate_bool("payload == null || payload.size > 0", &ctx).unwrap());
    }

    #[test]
    fn context_values_and_methods() {
        let mut user = UserContext::new();
        user.set_value("limit", Value::Int(10));
        user.set_method(
            "double",
            Arc::new(|args: &[Value]| -> Result<Value> {
                let v = args[0].as_i64().unwrap_or(0);
                Ok(Value::Int(v * 2))
            }),
        );
        let ctx = context(&user);

        assert_eq!(Value::Int(20), evaluate("double(limit)", &ctx).unwrap());
        assert!(evaluate_bool("double(3) < limit", &ctx).unwrap());
    }

    #[test]
    fn size_rejects_negatives() {
        let user = UserContext::new();
        assert_eq!(7, evaluate_size("7", &context(&user)).unwrap());
        assert!(matches!(
            evaluate_size("3 - 5", &context(&user)),
            Err(Error::InvalidSize { .. })
        ));
        assert!(matches!(
            evaluate_size("'text'", &context(&user)),
            Err(Error::InvalidSize { .. })
        ));
    }

    #[test]
    fn string_literals_and_comparison() {
        let mut record = Record::new("Frame");
        record.set("tag", Value::Str("ACK".to_string()));
        let user = UserContext::new();
        let ctx = context(&user).with_record(&record);

        assert!(evaluate_bool("tag == 'ACK'", &ctx).unwrap());
        assert!(evaluate_bool("tag != \"NAK\"", &ctx).unwrap());
    }

    #[test]
    fn indexing_lists_and_bytes() {
        let mut record = Record::new("Frame");
        record.set("payload", Value::Bytes(vec![0x0A, 0x0B]));
        record.set(
            "parts",
            Value::List(vec![Value::Int(5), Value::Int(6)]),
        );
        let user = UserContext::new();
        let ctx = context(&user).with_record(&record);

        assert_eq!(Value::UInt(0x0B), evaluate("payload[1]", &ctx).unwrap());
        assert_eq!(Value::Int(6), evaluate("parts[1]", &ctx).unwrap());
        evaluate("payload[9]", &ctx).unwrap_err();
    }

    #[test]
    fn unsigned_arithmetic_stays_unsigned() {
        let user = UserContext::new();
        let ctx = context(&user).with_prefix(Some(3));
        assert_eq!(Value::UInt(6), evaluate("prefix * 0x2", &ctx).unwrap());
    }

    #[test]
    fn malformed_expressions_fail() {
        let user = UserContext::new();
        evaluate("1 +", &context(&user)).unwrap_err();
        evaluate("(1", &context(&user)).unwrap_err();
        evaluate("1 1", &context(&user)).unwrap_err();
        evaluate("'open", &context(&user)).unwrap_err();
    }
}
