//! Combination formulas over named instruments, e.g. `DE40 - US500` or
//! `log(EU50 / DE40) * 100`.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident | ident '(' expr ')' | '(' expr ')'
//! ```
//!
//! `^` is right-associative and binds tighter than unary minus, so `-2^2`
//! is `-4`. Functions are limited to `log`, `exp` and `sqrt`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character {ch:?} at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unexpected token {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),

    #[error("unknown function {0:?} (allowed: log, exp, sqrt)")]
    UnknownFunction(String),

    #[error("unknown variable {0:?}")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Log,
    Exp,
    Sqrt,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(Func::Log),
            "exp" => Some(Func::Exp),
            "sqrt" => Some(Func::Sqrt),
            _ => None,
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Log => v.ln(),
            Func::Exp => v.exp(),
            Func::Sqrt => v.sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Func,
        arg: Box<Expr>,
    },
}

impl Expr {
    /// Evaluate with `lookup` resolving variables. Unknown variables are `NaN`.
    pub fn eval<F>(&self, lookup: &F) -> f64
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Num(v) => *v,
            Expr::Var(name) => lookup(name).unwrap_or(f64::NAN),
            Expr::Neg(inner) => -inner.eval(lookup),
            Expr::Call { func, arg } => func.apply(arg.eval(lookup)),
            Expr::Binary { op, lhs, rhs } => {
                let (a, b) = (lhs.eval(lookup), rhs.eval(lookup));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        }
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Neg(inner) | Expr::Call { arg: inner, .. } => inner.collect_vars(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
        }
    }
}

// ---- Lexer ----

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "{v}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Caret => f.write_str("^"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent: 1e-3, 2E5
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::InvalidNumber(text.clone()))?;
            out.push((Token::Num(value), start));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            out.push((Token::Ident(chars[start..i].iter().collect()), start));
            continue;
        }

        let tok = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(ExpressionError::UnexpectedChar { ch: other, pos: i }),
        };
        out.push((tok, start));
        i += 1;
    }

    Ok(out)
}

// ---- Parser ----

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Token) -> Result<(), ExpressionError> {
        match self.next() {
            Some((t, _)) if t == want => Ok(()),
            Some((t, pos)) => Err(ExpressionError::UnexpectedToken {
                found: t.to_string(),
                pos,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(Token::Minus) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some((Token::Num(v), _)) => Ok(Expr::Num(v)),
            Some((Token::Ident(name), _)) => {
                if let Some(Token::LParen) = self.peek() {
                    let func = Func::from_name(&name)
                        .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call {
                        func,
                        arg: Box::new(arg),
                    })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some((Token::LParen, _)) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some((t, pos)) => Err(ExpressionError::UnexpectedToken {
                found: t.to_string(),
                pos,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut p = Parser { tokens, pos: 0 };
    let expr = p.expr()?;

    if let Some((t, pos)) = p.next() {
        return Err(ExpressionError::UnexpectedToken {
            found: t.to_string(),
            pos,
        });
    }
    Ok(expr)
}

/// A parsed combination formula plus the latest known value of each variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMetric {
    source: String,
    expr: Expr,
    data: HashMap<String, f64>,
}

impl ExpressionMetric {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.trim().to_string(),
            expr: parse(source)?,
            data: HashMap::new(),
        })
    }

    /// `a + b + c` over `names`.
    pub fn sum<S: AsRef<str>>(names: &[S]) -> Result<Self, ExpressionError> {
        Self::parse(&join(names, " + "))
    }

    /// `a * b * c` over `names`.
    pub fn product<S: AsRef<str>>(names: &[S]) -> Result<Self, ExpressionError> {
        Self::parse(&join(names, " * "))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.expr.collect_vars(&mut out);
        out
    }

    /// Fail on the first variable `known` does not recognise.
    pub fn validate<F>(&self, known: F) -> Result<(), ExpressionError>
    where
        F: Fn(&str) -> bool,
    {
        match self.variables().into_iter().find(|v| !known(v)) {
            Some(missing) => Err(ExpressionError::UnknownVariable(missing)),
            None => Ok(()),
        }
    }

    pub fn set_value(&mut self, name: &str, value: f64) {
        self.data.insert(name.to_string(), value);
    }

    /// Record `name = value` and evaluate against every stored value.
    pub fn update_and_evaluate(&mut self, name: &str, value: f64) -> f64 {
        self.set_value(name, value);
        self.evaluate()
    }

    pub fn evaluate(&self) -> f64 {
        self.expr.eval(&|name: &str| self.data.get(name).copied())
    }

    pub fn evaluate_with(&self, values: &HashMap<String, f64>) -> f64 {
        self.expr.eval(&|name: &str| values.get(name).copied())
    }

    /// Evaluate row by row over aligned columns.
    ///
    /// The output length is the shortest provided column; a referenced
    /// variable with no column evaluates to `NaN`.
    pub fn evaluate_array(&self, columns: &HashMap<String, Vec<f64>>) -> Vec<f64> {
        let len = columns.values().map(Vec::len).min().unwrap_or(0);

        (0..len)
            .map(|i| {
                self.expr
                    .eval(&|name: &str| columns.get(name).and_then(|c| c.get(i).copied()))
            })
            .collect()
    }
}

fn join<S: AsRef<str>>(names: &[S], sep: &str) -> String {
    names
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, vars: &[(&str, f64)]) -> f64 {
        let mut m = ExpressionMetric::parse(src).unwrap();
        for (k, v) in vars {
            m.set_value(k, *v);
        }
        m.evaluate()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", &[]), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &[]), 9.0);
        assert_eq!(eval("8 - 3 - 2", &[]), 3.0);
        assert_eq!(eval("2 ^ 3 ^ 2", &[]), 512.0);
        assert_eq!(eval("-2 ^ 2", &[]), -4.0);
        assert_eq!(eval("2 * -3", &[]), -6.0);
    }

    #[test]
    fn instrument_variables() {
        assert_eq!(eval("DE40 - US500", &[("DE40", 18_000.0), ("US500", 5_000.0)]), 13_000.0);
        assert_eq!(eval("sqrt(EU50 * 4)", &[("EU50", 25.0)]), 10.0);
    }

    #[test]
    fn functions_are_whitelisted() {
        assert!((eval("log(exp(2))", &[]) - 2.0).abs() < 1e-12);
        assert_eq!(
            ExpressionMetric::parse("sin(1)").unwrap_err(),
            ExpressionError::UnknownFunction("sin".into())
        );
    }

    #[test]
    fn unknown_variable_is_nan_at_eval_time() {
        assert!(eval("DE40 + X", &[("DE40", 1.0)]).is_nan());
    }

    #[test]
    fn validate_reports_missing_variables() {
        let m = ExpressionMetric::parse("DE40 - US500").unwrap();
        assert_eq!(
            m.variables().into_iter().collect::<Vec<_>>(),
            vec!["DE40".to_string(), "US500".to_string()]
        );
        assert_eq!(
            m.validate(|v| v == "DE40"),
            Err(ExpressionError::UnknownVariable("US500".into()))
        );
    }

    #[test]
    fn parse_errors_are_typed() {
        assert_eq!(ExpressionMetric::parse("  ").unwrap_err(), ExpressionError::Empty);
        assert_eq!(ExpressionMetric::parse("1 +").unwrap_err(), ExpressionError::UnexpectedEnd);
        assert!(matches!(
            ExpressionMetric::parse("1 $ 2"),
            Err(ExpressionError::UnexpectedChar { ch: '$', pos: 2 })
        ));
        assert!(matches!(
            ExpressionMetric::parse("(1 + 2"),
            Err(ExpressionError::UnexpectedEnd)
        ));
        assert!(matches!(
            ExpressionMetric::parse("1 2"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn scientific_literals() {
        assert_eq!(eval("1e3 + 2.5E-1", &[]), 1000.25);
    }

    #[test]
    fn sum_and_product_builders() {
        let s = ExpressionMetric::sum(&["A", "B", "C"]).unwrap();
        assert_eq!(s.source(), "A + B + C");

        let mut p = ExpressionMetric::product(&["A", "B"]).unwrap();
        p.set_value("A", 3.0);
        assert_eq!(p.update_and_evaluate("B", 4.0), 12.0);
    }

    #[test]
    fn array_evaluation_over_aligned_columns() {
        let m = ExpressionMetric::parse("A / B").unwrap();
        let mut cols = HashMap::new();
        cols.insert("A".to_string(), vec![2.0, 4.0, 9.0]);
        cols.insert("B".to_string(), vec![1.0, 2.0]);

        assert_eq!(m.evaluate_array(&cols), vec![2.0, 2.0]);
    }
}
