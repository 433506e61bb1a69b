//! Scalar expressions in `x` with named free parameters, e.g.
//! `a * exp(-x / tau) + c`. The grammar lives in `expr.pest`.

use pest::error::InputLocation;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

/// Deepest parenthesis nesting accepted by [`Expression::parse`].
pub const MAX_NESTING: usize = 64;

#[derive(Parser)]
#[grammar = "analysis/expr.pest"]
struct ExpressionParser;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("invalid number '{text}' at {pos}")]
    InvalidNumber { text: String, pos: usize },

    #[error("parentheses nested deeper than {limit}")]
    TooDeep { limit: usize },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("expression is empty")]
    Empty,
}

impl From<pest::error::Error<Rule>> for ExprError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let pos = match err.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        ExprError::Syntax {
            pos,
            message: err.variant.message().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    Asin,
    Acos,
    Atan,
}

impl Function {
    fn from_name(name: &str) -> Option<Function> {
        Some(match name {
            "exp" => Function::Exp,
            "log" | "ln" => Function::Ln,
            "log10" => Function::Log10,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            "asin" => Function::Asin,
            "acos" => Function::Acos,
            "atan" => Function::Atan,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Function::Exp => v.exp(),
            Function::Ln => v.ln(),
            Function::Log10 => v.log10(),
            Function::Sqrt => v.sqrt(),
            Function::Abs => v.abs(),
            Function::Sin => v.sin(),
            Function::Cos => v.cos(),
            Function::Tan => v.tan(),
            Function::Sinh => v.sinh(),
            Function::Cosh => v.cosh(),
            Function::Tanh => v.tanh(),
            Function::Asin => v.asin(),
            Function::Acos => v.acos(),
            Function::Atan => v.atan(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }
}

/// Operator chains are stored flat so tree depth follows parenthesis
/// nesting only.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    X,
    /// Index into the parameter list given at parse time.
    Parameter(usize),
    Negate(Box<Node>),
    /// Left-associative `a op b op c` over `+ -` or `* /`.
    Chain(Box<Node>, Vec<(BinaryOp, Node)>),
    /// Right-associative `a ^ b ^ c`. A set flag negates that operand after
    /// the exponent to its right has been applied.
    Power(Vec<(bool, Node)>),
    Call(Function, Box<Node>),
}

impl Node {
    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        match self {
            Node::Number(v) => *v,
            Node::X => x,
            Node::Parameter(i) => params[*i],
            Node::Negate(inner) => -inner.eval(x, params),
            Node::Chain(first, rest) => rest
                .iter()
                .fold(first.eval(x, params), |acc, (op, rhs)| op.apply(acc, rhs.eval(x, params))),
            Node::Power(operands) => {
                let mut exponent: Option<f64> = None;
                for (negate, operand) in operands.iter().rev() {
                    let mut v = operand.eval(x, params);
                    if let Some(e) = exponent {
                        v = v.powf(e);
                    }
                    if *negate {
                        v = -v;
                    }
                    exponent = Some(v);
                }
                exponent.unwrap_or(f64::NAN)
            }
            Node::Call(f, arg) => f.apply(arg.eval(x, params)),
        }
    }
}

/// A parsed expression bound to an ordered parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    parameters: Vec<String>,
    root: Node,
}

impl Expression {
    /// Parse `text`. Identifiers other than `x`, `pi`, `e` and function names
    /// must appear in `parameters`; their position there is the slot used by
    /// [`Expression::eval`].
    pub fn parse(text: &str, parameters: &[String]) -> Result<Self, ExprError> {
        let root = parse_pairs(text)?
            .next()
            .ok_or(ExprError::Empty)
            .and_then(|pair| build(pair, parameters))?;
        Ok(Expression {
            text: text.to_string(),
            parameters: parameters.to_vec(),
            root,
        })
    }

    /// Identifiers in `text` that would need to be declared as parameters.
    pub fn free_identifiers(text: &str) -> Result<Vec<String>, ExprError> {
        let mut names: Vec<String> = Vec::new();
        for pair in parse_pairs(text)?.flatten() {
            if pair.as_rule() != Rule::identifier {
                continue;
            }
            let name = pair.as_str();
            if !matches!(name, "x" | "pi" | "e") && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// `params` must be ordered like the parameter list given to `parse`.
    pub fn eval(&self, x: f64, params: &[f64]) -> f64 {
        self.root.eval(x, params)
    }
}

// ---------------------------------------------------------------------------
// Pairs -> Node
// ---------------------------------------------------------------------------

fn parse_pairs(text: &str) -> Result<Pairs<'_, Rule>, ExprError> {
    if text.trim().is_empty() {
        return Err(ExprError::Empty);
    }
    check_nesting(text)?;
    Ok(ExpressionParser::parse(Rule::expression, text)?)
}

/// The grammar recurses once per parenthesis level, so the depth is bounded
/// before pest sees the input.
fn check_nesting(text: &str) -> Result<(), ExprError> {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(ExprError::TooDeep { limit: MAX_NESTING });
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn missing(pos: usize, what: &str) -> ExprError {
    ExprError::Syntax {
        pos,
        message: format!("expected {what}"),
    }
}

fn next_node(
    pairs: &mut Pairs<'_, Rule>,
    pos: usize,
    parameters: &[String],
) -> Result<Node, ExprError> {
    let pair = pairs.next().ok_or_else(|| missing(pos, "an operand"))?;
    build(pair, parameters)
}

/// Leading `-`/`+` signs followed by one operand.
fn signed(pair: Pair<'_, Rule>, parameters: &[String]) -> Result<(bool, Node), ExprError> {
    let pos = pair.as_span().start();
    let mut negate = false;
    let mut operand = None;
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::neg {
            negate = !negate;
        } else {
            operand = Some(build(inner, parameters)?);
        }
    }
    let operand = operand.ok_or_else(|| missing(pos, "an operand"))?;
    Ok((negate, operand))
}

fn build(pair: Pair<'_, Rule>, parameters: &[String]) -> Result<Node, ExprError> {
    let pos = pair.as_span().start();
    match pair.as_rule() {
        Rule::expr | Rule::term => {
            let mut inner = pair.into_inner();
            let first = next_node(&mut inner, pos, parameters)?;
            let mut rest = Vec::new();
            while let Some(op) = inner.next() {
                let op = match op.as_rule() {
                    Rule::add => BinaryOp::Add,
                    Rule::sub => BinaryOp::Sub,
                    Rule::mul => BinaryOp::Mul,
                    _ => BinaryOp::Div,
                };
                rest.push((op, next_node(&mut inner, pos, parameters)?));
            }
            if rest.is_empty() {
                Ok(first)
            } else {
                Ok(Node::Chain(Box::new(first), rest))
            }
        }
        Rule::unary => match signed(pair, parameters)? {
            (true, node) => Ok(Node::Negate(Box::new(node))),
            (false, node) => Ok(node),
        },
        Rule::power => {
            let mut operands = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::pow => {}
                    Rule::signed => operands.push(signed(inner, parameters)?),
                    _ => operands.push((false, build(inner, parameters)?)),
                }
            }
            match operands.len() {
                0 => Err(missing(pos, "an operand")),
                1 => Ok(operands.remove(0).1),
                _ => Ok(Node::Power(operands)),
            }
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let name = inner.next().ok_or_else(|| missing(pos, "a function name"))?;
            let f = Function::from_name(name.as_str())
                .ok_or_else(|| ExprError::UnknownFunction(name.as_str().to_string()))?;
            let arg = next_node(&mut inner, pos, parameters)?;
            Ok(Node::Call(f, Box::new(arg)))
        }
        Rule::number => {
            let text = pair.as_str();
            text.parse::<f64>()
                .map(Node::Number)
                .map_err(|_| ExprError::InvalidNumber {
                    text: text.to_string(),
                    pos,
                })
        }
        Rule::identifier => match pair.as_str() {
            "x" => Ok(Node::X),
            "pi" => Ok(Node::Number(std::f64::consts::PI)),
            "e" => Ok(Node::Number(std::f64::consts::E)),
            name => parameters
                .iter()
                .position(|p| p == name)
                .map(Node::Parameter)
                .ok_or_else(|| ExprError::UnknownIdentifier(name.to_string())),
        },
        other => Err(missing(pos, &format!("an operand, found {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn precedence_and_associativity() {
        let e = Expression::parse("1 + 2 * 3 ^ 2 / 6 - 4", &[]).unwrap();
        assert_relative_eq!(e.eval(0.0, &[]), 0.0);

        let e = Expression::parse("2 ^ 3 ^ 2", &[]).unwrap();
        assert_relative_eq!(e.eval(0.0, &[]), 512.0);

        let e = Expression::parse("-x**2", &[]).unwrap();
        assert_relative_eq!(e.eval(3.0, &[]), -9.0);

        let e = Expression::parse("8 / 2 / 2", &[]).unwrap();
        assert_relative_eq!(e.eval(0.0, &[]), 2.0);
    }

    #[test]
    fn parameters_functions_and_constants() {
        let e = Expression::parse("a * exp(-x / tau) + c", &params(&["a", "tau", "c"])).unwrap();
        assert_relative_eq!(e.eval(2.0, &[3.0, 2.0, 1.0]), 3.0 * (-1.0f64).exp() + 1.0);

        let e = Expression::parse("sin(pi * x) + ln(e)", &[]).unwrap();
        assert_relative_eq!(e.eval(0.5, &[]), 2.0, epsilon = 1e-12);

        let e = Expression::parse("1.5e-3 * x + 2E2", &[]).unwrap();
        assert_relative_eq!(e.eval(1000.0, &[]), 201.5, epsilon = 1e-9);
    }

    #[test]
    fn free_identifiers_skip_x_constants_and_calls() {
        assert_eq!(
            Expression::free_identifiers("a*exp(-x/tau) + a + pi*c").unwrap(),
            params(&["a", "tau", "c"])
        );
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert_eq!(Expression::parse("   ", &[]), Err(ExprError::Empty));
        assert!(matches!(
            Expression::parse("x +", &[]),
            Err(ExprError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("(x + 1", &[]),
            Err(ExprError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("x $ 2", &[]),
            Err(ExprError::Syntax { pos: 2, .. })
        ));
        assert_eq!(
            Expression::parse("k * x", &[]),
            Err(ExprError::UnknownIdentifier("k".into()))
        );
        assert_eq!(
            Expression::parse("foo(x)", &[]),
            Err(ExprError::UnknownFunction("foo".into()))
        );
        assert!(matches!(
            Expression::parse("1.2.3", &[]),
            Err(ExprError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("x 2", &[]),
            Err(ExprError::Syntax { .. })
        ));
        assert!(matches!(
            Expression::parse("x ** ", &[]),
            Err(ExprError::Syntax { .. })
        ));
    }

    #[test]
    fn signs_around_powers() {
        let e = Expression::parse("2 ^ -3 ^ 2", &[]).unwrap();
        assert_relative_eq!(e.eval(0.0, &[]), 2f64.powf(-9.0));

        let e = Expression::parse("--x - -+1", &[]).unwrap();
        assert_relative_eq!(e.eval(4.0, &[]), 5.0);
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let deep = format!("{}x{}", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(
            Expression::parse(&deep, &[]),
            Err(ExprError::TooDeep { limit: MAX_NESTING })
        );
        assert_eq!(
            Expression::free_identifiers(&deep),
            Err(ExprError::TooDeep { limit: MAX_NESTING })
        );

        let nested = format!("{}x{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let e = Expression::parse(&nested, &[]).unwrap();
        assert_relative_eq!(e.eval(3.0, &[]), 3.0);
    }

    #[test]
    fn long_operator_chains_stay_flat() {
        let text = format!("x{}", " + x".repeat(20_000));
        let e = Expression::parse(&text, &[]).unwrap();
        assert_relative_eq!(e.eval(0.5, &[]), 10_000.5);

        let text = format!("1{}", " ^ 1".repeat(20_000));
        let e = Expression::parse(&text, &[]).unwrap();
        assert_relative_eq!(e.eval(0.0, &[]), 1.0);
    }
}
