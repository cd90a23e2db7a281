//! Skip/stop rules and their predicate expressions.
//!
//! A rule predicate is a small boolean expression over prior answers:
//! selectors (`q1.answer`, or bare `q1`), literals, comparisons, `in`
//! membership and `and`/`or`/`not`. Predicates are parsed once at rule
//! construction; evaluation is total — a selector over a question that has
//! not been answered makes the predicate false instead of erroring.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Answers, SurveyError};

/// Where a matched rule sends the interview next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    /// Jump to the question at this index.
    Question(usize),
    /// Terminate the interview.
    End,
}

/// A skip/stop rule attached to a survey.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Index of the question this rule fires from.
    pub from: usize,
    /// Predicate over prior answers.
    pub expression: RuleExpression,
    /// Jump target when the predicate holds.
    pub to: RuleTarget,
    /// Explicit priority; higher wins. Ties break toward later insertion.
    pub priority: i32,
    /// Insertion sequence, assigned by the survey.
    pub(crate) seq: usize,
}

/// A parsed predicate, retaining its source for serialization.
#[derive(Debug, Clone)]
pub struct RuleExpression {
    source: String,
    expr: Expr,
}

impl RuleExpression {
    /// Parse a predicate from its source text.
    pub fn parse(source: &str) -> Result<Self, SurveyError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;

        if parser.pos != parser.tokens.len() {
            return Err(SurveyError::RuleParse {
                expression: source.to_string(),
                detail: "trailing input after expression".to_string(),
            });
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The predicate source as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against the answers so far. Total: unanswered selectors
    /// make the predicate false.
    pub fn evaluate(&self, answers: &Answers) -> bool {
        matches!(eval(&self.expr, answers), Some(Value::Bool(true)))
    }
}

impl PartialEq for RuleExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for RuleExpression {
    type Err = SurveyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for RuleExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for RuleExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    List(Vec<Value>),
    Selector { question: String, field: SelectorField },
    Cmp { op: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectorField {
    Answer,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Op(CmpOp),
    And,
    Or,
    Not,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn tokenize(source: &str) -> Result<Vec<Token>, SurveyError> {
    // Selectors may be written in piping style; the braces carry no meaning
    // inside a predicate.
    let source = source.replace("{{", " ").replace("}}", " ");

    let err = |detail: String| SurveyError::RuleParse {
        expression: source.clone(),
        detail,
    };

    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
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
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Op(CmpOp::Eq)),
                    _ => return Err(err("expected '==' after '='".to_string())),
                }
            }
            '!' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Op(CmpOp::Ne)),
                    _ => return Err(err("expected '!=' after '!'".to_string())),
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CmpOp::Le));
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(CmpOp::Ge));
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();

                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => literal.push(c),
                        None => return Err(err("unterminated string literal".to_string())),
                    }
                }

                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();

                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }

                let value = literal
                    .parse::<f64>()
                    .map_err(|_| err(format!("invalid number '{literal}'")))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();

                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }

                match word.to_ascii_lowercase().as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::Op(CmpOp::In)),
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            c => return Err(err(format!("unexpected character '{c}'"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn err(&self, detail: impl Into<String>) -> SurveyError {
        SurveyError::RuleParse {
            expression: String::new(),
            detail: detail.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<Expr, SurveyError> {
        let mut lhs = self.conjunction()?;

        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.conjunction()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<Expr, SurveyError> {
        let mut lhs = self.negation()?;

        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.negation()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn negation(&mut self) -> Result<Expr, SurveyError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.negation()?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SurveyError> {
        let lhs = self.operand()?;

        let Some(Token::Op(op)) = self.peek().cloned() else {
            return Ok(lhs);
        };

        self.next();
        let rhs = self.operand()?;

        Ok(Expr::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn operand(&mut self) -> Result<Expr, SurveyError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(number(n))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.err("expected ')'")),
                }
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();

                if self.peek() == Some(&Token::RBracket) {
                    self.next();
                    return Ok(Expr::List(items));
                }

                loop {
                    match self.next() {
                        Some(Token::Str(s)) => items.push(Value::String(s)),
                        Some(Token::Num(n)) => items.push(number(n)),
                        Some(Token::Bool(b)) => items.push(Value::Bool(b)),
                        _ => return Err(self.err("expected a literal inside list")),
                    }

                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => return Err(self.err("expected ',' or ']' in list")),
                    }
                }

                Ok(Expr::List(items))
            }
            Some(Token::Ident(question)) => {
                let mut field = SelectorField::Answer;

                if self.peek() == Some(&Token::Dot) {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(name)) if name == "answer" => field = SelectorField::Answer,
                        Some(Token::Ident(name)) if name == "comment" => field = SelectorField::Comment,
                        Some(Token::Ident(name)) => {
                            return Err(self.err(format!("unknown selector field '{name}'")));
                        }
                        _ => return Err(self.err("expected a field name after '.'")),
                    }
                }

                Ok(Expr::Selector { question, field })
            }
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn eval(expr: &Expr, answers: &Answers) -> Option<Value> {
    match expr {
        Expr::Literal(value) => Some(value.clone()),
        Expr::List(items) => Some(Value::Array(items.clone())),
        Expr::Selector { question, field } => {
            let cell = answers.get(question)?;
            match field {
                SelectorField::Answer => Some(cell.answer.clone()),
                SelectorField::Comment => cell.comment.clone().map(Value::String),
            }
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = eval(lhs, answers)?;
            let rhs = eval(rhs, answers)?;
            Some(Value::Bool(compare(*op, &lhs, &rhs)?))
        }
        Expr::And(lhs, rhs) => {
            let lhs = truthy(eval(lhs, answers));
            // Total evaluation: an unanswered side is simply false.
            let rhs = truthy(eval(rhs, answers));
            Some(Value::Bool(lhs && rhs))
        }
        Expr::Or(lhs, rhs) => {
            let lhs = truthy(eval(lhs, answers));
            let rhs = truthy(eval(rhs, answers));
            Some(Value::Bool(lhs || rhs))
        }
        Expr::Not(inner) => Some(Value::Bool(!truthy(eval(inner, answers)))),
    }
}

fn truthy(value: Option<Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Option<bool> {
    match op {
        CmpOp::Eq => Some(loose_eq(lhs, rhs)),
        CmpOp::Ne => Some(!loose_eq(lhs, rhs)),
        CmpOp::In => {
            let Value::Array(items) = rhs else {
                return None;
            };
            Some(items.iter().any(|item| loose_eq(lhs, item)))
        }
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = order(lhs, rhs)?;
            Some(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                _ => unreachable!("handled above"),
            })
        }
    }
}

/// Equality with numeric coercion: `3 == 3.0` holds.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => lhs == rhs,
    }
}

fn order(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) {
        return l.partial_cmp(&r);
    }

    if let (Value::String(l), Value::String(r)) = (lhs, rhs) {
        return Some(l.cmp(r));
    }

    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn answered(pairs: &[(&str, Value)]) -> Answers {
        let mut answers = Answers::new();
        for (name, value) in pairs {
            answers.insert(*name, value.clone(), None);
        }
        answers
    }

    fn eval_src(source: &str, answers: &Answers) -> bool {
        RuleExpression::parse(source).unwrap().evaluate(answers)
    }

    #[test]
    fn string_equality() {
        let answers = answered(&[("q1", json!("No"))]);

        assert!(eval_src("q1.answer == 'No'", &answers));
        assert!(eval_src("q1 == 'No'", &answers));
        assert!(!eval_src("q1.answer == 'Yes'", &answers));
    }

    #[test]
    fn numeric_comparison_coerces() {
        let answers = answered(&[("age", json!(42))]);

        assert!(eval_src("age.answer > 40", &answers));
        assert!(eval_src("age.answer == 42.0", &answers));
        assert!(!eval_src("age.answer < 10", &answers));
    }

    #[test]
    fn membership() {
        let answers = answered(&[("color", json!("green"))]);

        assert!(eval_src("color.answer in ['red', 'green', 'blue']", &answers));
        assert!(!eval_src("color.answer in ['red', 'blue']", &answers));
    }

    #[test]
    fn connectives_and_grouping() {
        let answers = answered(&[("a", json!(1)), ("b", json!("x"))]);

        assert!(eval_src("a == 1 and b == 'x'", &answers));
        assert!(eval_src("a == 2 or b == 'x'", &answers));
        assert!(eval_src("not (a == 2)", &answers));
        assert!(!eval_src("a == 1 and not b == 'x'", &answers));
    }

    #[test]
    fn unanswered_selector_is_false_not_an_error() {
        let answers = Answers::new();

        assert!(!eval_src("missing.answer == 'x'", &answers));
        assert!(!eval_src("missing.answer != 'x'", &answers));
        // Negation of an unanswerable predicate is true.
        assert!(eval_src("not (missing.answer == 'x')", &answers));
    }

    #[test]
    fn piping_braces_are_tolerated() {
        let answers = answered(&[("q1", json!("No"))]);

        assert!(eval_src("{{ q1.answer }} == 'No'", &answers));
    }

    #[test]
    fn parse_errors() {
        assert!(RuleExpression::parse("q1 ==").is_err());
        assert!(RuleExpression::parse("q1 = 'x'").is_err());
        assert!(RuleExpression::parse("q1.unknown == 1").is_err());
        assert!(RuleExpression::parse("'unterminated").is_err());
    }

    #[test]
    fn serializes_as_source_text() {
        let expression = RuleExpression::parse("q1.answer == 'No'").unwrap();
        let json = serde_json::to_string(&expression).unwrap();

        assert_eq!(json, r#""q1.answer == 'No'""#);

        let back: RuleExpression = serde_json::from_str(&json).unwrap();
        assert_eq!(expression, back);
    }
}
