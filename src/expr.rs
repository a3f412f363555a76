//! Analytic field functions: arithmetic expressions in the radial coordinate `r`.

use std::collections::HashMap;
use std::fmt;

use meval::{Context, ContextProvider, Expr};
use thiserror::Error;

use crate::geom::Point3;
use crate::units::AU;

/// Smallest radius handed to analytic functions, in metres.
pub const RADIUS_FLOOR: f64 = 0.1 * AU;

/// Radius at which every configured function is checked before a run.
pub const SENTINEL_RADIUS: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("malformed expression `{source_text}`: {reason}")]
    Syntax { source_text: String, reason: String },
    #[error("expression `{source_text}` references unknown name `{name}`")]
    UnboundVariable { source_text: String, name: String },
    #[error("expression `{source_text}` could not be evaluated: {reason}")]
    Evaluate { source_text: String, reason: String },
}

/// A parsed expression. Parsing happens once; the tree is immutable and can
/// be evaluated from any thread.
#[derive(Clone)]
pub struct AnalyticFunction {
    source: String,
    expr: Expr,
}

impl fmt::Debug for AnalyticFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnalyticFunction").field(&self.source).finish()
    }
}

impl AnalyticFunction {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let source = normalize_expression(source);
        let expr: Expr = source.parse().map_err(|error: meval::Error| {
            ExpressionError::Syntax {
                source_text: source.clone(),
                reason: error.to_string(),
            }
        })?;
        Ok(Self { source, expr })
    }

    /// Parses and evaluates once at [`SENTINEL_RADIUS`], so that unknown
    /// names surface before the first real query.
    pub fn parse_checked(source: &str) -> Result<Self, ExpressionError> {
        let function = Self::parse(source)?;
        function.evaluate(SENTINEL_RADIUS)?;
        Ok(function)
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates with `r` bound to `r`.
    pub fn evaluate(&self, r: f64) -> Result<f64, ExpressionError> {
        self.evaluate_with(&RadiusBinding(r))
    }

    fn evaluate_with(&self, bindings: &impl ContextProvider) -> Result<f64, ExpressionError> {
        BUILTINS.with(|builtins| {
            self.expr
                .eval_with_context((bindings, builtins))
                .map_err(|error| classify(&self.source, error))
        })
    }
}

/// Parses `text` and evaluates it under `bindings`.
pub fn evaluate(text: &str, bindings: &HashMap<String, f64>) -> Result<f64, ExpressionError> {
    AnalyticFunction::parse(text)?.evaluate_with(&Bindings(bindings))
}

/// Distance from the origin, floored at [`RADIUS_FLOOR`].
#[must_use]
pub fn radius(point: Point3) -> f64 {
    point.norm().max(RADIUS_FLOOR)
}

struct RadiusBinding(f64);

impl ContextProvider for RadiusBinding {
    fn get_var(&self, name: &str) -> Option<f64> {
        (name == "r").then_some(self.0)
    }
}

struct Bindings<'a>(&'a HashMap<String, f64>);

impl ContextProvider for Bindings<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }
}

fn classify(source: &str, error: meval::Error) -> ExpressionError {
    match error {
        meval::Error::UnknownVariable(name) => ExpressionError::UnboundVariable {
            source_text: source.to_owned(),
            name,
        },
        other => ExpressionError::Evaluate {
            source_text: source.to_owned(),
            reason: other.to_string(),
        },
    }
}

fn normalize_expression(source: &str) -> String {
    let mut normalized = source.trim().to_owned();
    while normalized.ends_with(';') {
        normalized.pop();
        normalized = normalized.trim_end().to_owned();
    }
    normalized
}

thread_local! {
    static BUILTINS: Context<'static> = build_context();
}

fn build_context() -> Context<'static> {
    let mut context = Context::new();
    context.var("PI", std::f64::consts::PI);
    context.var("E", std::f64::consts::E);
    context.funcn("log", logarithm, 1..3);
    context.func2("pow", f64::powf);
    context.func3("clamp", clamp);
    context.func("sign", f64::signum);
    context.func("sgn", f64::signum);
    context.func("deg", f64::to_degrees);
    context.func("rad", f64::to_radians);
    context.funcn("if", conditional, 2..4);
    context
}

/// Natural logarithm, or logarithm in the base given as second argument.
fn logarithm(args: &[f64]) -> f64 {
    match args {
        [value, base] => value.log(*base),
        [value, ..] => value.ln(),
        [] => f64::NAN,
    }
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    let lower = min.min(max);
    let upper = min.max(max);
    value.max(lower).min(upper)
}

fn conditional(args: &[f64]) -> f64 {
    match args {
        [condition, truthy, falsy] => {
            if *condition != 0.0 {
                *truthy
            } else {
                *falsy
            }
        }
        [_, truthy] => *truthy,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * b.abs().max(1.0)
    }

    #[test]
    fn evaluates_power_law_in_r() {
        let f = AnalyticFunction::parse("1e6*(r/100)^-2").expect("parse");
        assert!(approx(f.evaluate(10.0).expect("eval"), 1e8));
        assert!(approx(f.evaluate(100.0).expect("eval"), 1e6));
    }

    #[test]
    fn supports_named_functions_and_constants() {
        let f = AnalyticFunction::parse("exp(-r) + log(E) + pow(2, 3) + sqrt(4) - PI + pi")
            .expect("parse");
        assert!(approx(f.evaluate(0.0).expect("eval"), 1.0 + 1.0 + 8.0 + 2.0));
        let base10 = AnalyticFunction::parse("log(r, 10)").expect("parse");
        assert!(approx(base10.evaluate(1000.0).expect("eval"), 3.0));
    }

    #[test]
    fn constant_expression_ignores_r() {
        let f = AnalyticFunction::parse("5").expect("parse");
        assert!(approx(f.evaluate(1234.5).expect("eval"), 5.0));
    }

    #[test]
    fn malformed_expression_is_a_syntax_error() {
        let err = AnalyticFunction::parse("2*(r+").unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }), "{err}");
    }

    #[test]
    fn unknown_name_is_unbound() {
        let f = AnalyticFunction::parse("r*q").expect("parse");
        let err = f.evaluate(1.0).unwrap_err();
        assert_eq!(
            err,
            ExpressionError::UnboundVariable {
                source_text: "r*q".to_owned(),
                name: "q".to_owned()
            }
        );
        assert!(AnalyticFunction::parse_checked("r*q").is_err());
        assert!(AnalyticFunction::parse_checked("r*2").is_ok());
    }

    #[test]
    fn free_evaluate_uses_given_bindings() {
        let mut bindings = HashMap::new();
        bindings.insert("r".to_owned(), 3.0);
        assert!(approx(evaluate("r^2 + 1", &bindings).expect("eval"), 10.0));
        assert!(matches!(
            evaluate("x + 1", &bindings),
            Err(ExpressionError::UnboundVariable { ref name, .. }) if name == "x"
        ));
    }

    #[test]
    fn radius_is_floored_near_origin() {
        assert!(approx(radius(Point3::ORIGIN), RADIUS_FLOOR));
        assert!(approx(radius(Point3::new(3.0 * AU, 4.0 * AU, 0.0)), 5.0 * AU));
    }

    #[test]
    fn helper_functions_behave() {
        assert!(approx(clamp(5.0, 1.0, 0.0), 1.0));
        assert!(approx(conditional(&[0.0, 1.0, 2.0]), 2.0));
        assert!(approx(conditional(&[1.0, 1.0]), 1.0));
        assert!(logarithm(&[]).is_nan());
    }
}
