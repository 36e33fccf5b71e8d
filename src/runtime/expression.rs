/// Condition expression evaluator
///
/// Sequence-flow conditions are boolean expressions over literals and
/// `executionId.field` references. A reference reads `field` from the JSON
/// output of the most recently started node with that execution id in the
/// same instance.
///
/// References are located with the `ident.ident` token pattern and rewritten
/// to scope variables; the rewritten text is compiled once into a rhai AST
/// when the model is built. Resolved values are pushed into the rhai scope as
/// typed values, never spliced into the source text, so quotes inside user
/// data cannot change the expression.

use crate::error::{EngineError, Result};
use crate::store::nodes::NodeStore;
use regex::Regex;
use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Scope, AST, FLOAT, INT};
use sqlx::SqliteConnection;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// String literals first, so a dotted word inside quotes is not a reference
const TOKEN_PATTERN: &str = r#"'[^']*'|"[^"]*"|\b([A-Za-z_]\w*)\.(\w+)\b"#;

/// Nesting limit for parentheses and `!`
const MAX_EXPR_DEPTH: usize = 64;
const MAX_OPERATIONS: u64 = 10_000;

static TOKENS: OnceLock<Regex> = OnceLock::new();
static ENGINE: OnceLock<Engine> = OnceLock::new();

/// `executionId.field` operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub execution_id: String,
    pub field: String,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.execution_id, self.field)
    }
}

/// Compiled condition, ready to evaluate against bound reference values
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    /// Each distinct reference and the scope variable standing in for it
    bindings: Vec<(Reference, String)>,
    ast: AST,
}

fn tokens() -> Result<&'static Regex> {
    if let Some(re) = TOKENS.get() {
        return Ok(re);
    }
    let re = Regex::new(TOKEN_PATTERN).map_err(|e| EngineError::InvalidExpression(e.to_string()))?;
    Ok(TOKENS.get_or_init(|| re))
}

/// Shared rhai engine. Fast operators are off so the coercing comparisons
/// below are consulted for mixed operand types.
fn engine() -> &'static Engine {
    ENGINE.get_or_init(|| {
        let mut engine = Engine::new();
        engine
            .set_strict_variables(true)
            .set_fast_operators(false)
            .set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH)
            .set_max_operations(MAX_OPERATIONS);
        register_coercions(&mut engine);
        engine
    })
}

type OrderingTest = fn(Ordering) -> bool;

const COMPARISONS: [(&str, OrderingTest); 6] = [
    ("==", Ordering::is_eq),
    ("!=", Ordering::is_ne),
    ("<", Ordering::is_lt),
    ("<=", Ordering::is_le),
    (">", Ordering::is_gt),
    (">=", Ordering::is_ge),
];

/// Compare a string operand against a number. A numeric string compares by
/// value; any other string is unequal, and ordering it is an error.
fn string_vs_number(
    text: &str,
    number: FLOAT,
    op: &'static str,
    test: OrderingTest,
    flipped: bool,
) -> std::result::Result<bool, Box<EvalAltResult>> {
    let ordering = text
        .trim()
        .parse::<FLOAT>()
        .ok()
        .and_then(|value| value.partial_cmp(&number))
        .map(|ordering| if flipped { ordering.reverse() } else { ordering });

    match (ordering, op) {
        (Some(ordering), _) => Ok(test(ordering)),
        (None, "==") => Ok(false),
        (None, "!=") => Ok(true),
        (None, _) => Err(format!("cannot compare '{}' {} {}", text, op, number).into()),
    }
}

fn register_coercions(engine: &mut Engine) {
    for (op, test) in COMPARISONS {
        engine.register_fn(op, move |a: ImmutableString, b: INT| {
            string_vs_number(&a, b as FLOAT, op, test, false)
        });
        engine.register_fn(op, move |a: INT, b: ImmutableString| {
            string_vs_number(&b, a as FLOAT, op, test, true)
        });
        engine.register_fn(op, move |a: ImmutableString, b: FLOAT| {
            string_vs_number(&a, b, op, test, false)
        });
        engine.register_fn(op, move |a: FLOAT, b: ImmutableString| {
            string_vs_number(&b, a, op, test, true)
        });
    }

    // a string equals a boolean when it spells it
    for (op, equal) in [("==", true), ("!=", false)] {
        engine.register_fn(op, move |a: ImmutableString, b: bool| (a.as_str() == bool_text(b)) == equal);
        engine.register_fn(op, move |a: bool, b: ImmutableString| (b.as_str() == bool_text(a)) == equal);
    }
}

fn bool_text(b: bool) -> &'static str {
    if b { "true" } else { "false" }
}

/// Re-quote a literal body as a rhai string; single quotes are chars in rhai
fn quote(body: &str) -> String {
    format!("\"{}\"", body.replace('\\', "\\\\").replace('"', "\\\""))
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let mut bindings: Vec<(Reference, String)> = Vec::new();
        let mut script = String::with_capacity(source.len());
        let mut last = 0;

        for captures in tokens()?.captures_iter(source) {
            let Some(token) = captures.get(0) else { continue };
            script.push_str(&source[last..token.start()]);
            last = token.end();

            match (captures.get(1), captures.get(2)) {
                (Some(id), Some(field)) => {
                    let reference = Reference {
                        execution_id: id.as_str().to_string(),
                        field: field.as_str().to_string(),
                    };
                    let variable = match bindings.iter().find(|(r, _)| *r == reference) {
                        Some((_, variable)) => variable.clone(),
                        None => {
                            let variable = format!("ref_{}", bindings.len());
                            bindings.push((reference, variable.clone()));
                            variable
                        }
                    };
                    script.push_str(&variable);
                }
                _ => {
                    let literal = token.as_str();
                    script.push_str(&quote(&literal[1..literal.len() - 1]));
                }
            }
        }
        script.push_str(&source[last..]);

        let mut scope = Scope::new();
        for (_, variable) in &bindings {
            scope.push_dynamic(variable.as_str(), Dynamic::UNIT);
        }
        let ast = engine()
            .compile_expression_with_scope(&scope, &script)
            .map_err(|e| EngineError::InvalidExpression(format!("{} in '{}'", e, source)))?;

        Ok(Self { source: source.to_string(), bindings, ast })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct references, in a stable order
    pub fn references(&self) -> Vec<Reference> {
        self.bindings
            .iter()
            .map(|(reference, _)| reference.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Evaluate with every reference bound to its resolved value
    pub fn evaluate(&self, values: &HashMap<Reference, Dynamic>) -> Result<Dynamic> {
        let mut scope = Scope::new();
        for (reference, variable) in &self.bindings {
            let value = values.get(reference).cloned().ok_or_else(|| EngineError::AttributeNotFound {
                execution_id: reference.execution_id.clone(),
                field: reference.field.clone(),
            })?;
            scope.push_dynamic(variable.as_str(), value);
        }

        engine()
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| EngineError::InvalidExpression(format!("{} in '{}'", e, self.source)))
    }
}

/// Look up the value of every reference in `expression` for one instance.
///
/// Fails with `AttributeNotFound` when the referenced node has not run, has no
/// output yet, its output is not a JSON object, or the field is absent.
pub async fn resolve_values(
    nodes: &NodeStore,
    conn: &mut SqliteConnection,
    expression: &Expression,
    instance_id: i64,
) -> Result<HashMap<Reference, Dynamic>> {
    let mut values = HashMap::new();

    for reference in expression.references() {
        let not_found = || EngineError::AttributeNotFound {
            execution_id: reference.execution_id.clone(),
            field: reference.field.clone(),
        };

        let output = nodes
            .latest_output(&mut *conn, instance_id, &reference.execution_id)
            .await?
            .ok_or_else(not_found)?;

        let parsed: serde_json::Value = serde_json::from_str(&output).map_err(|_| not_found())?;
        let field = parsed
            .as_object()
            .and_then(|object| object.get(&reference.field))
            .ok_or_else(not_found)?;

        let value = rhai::serde::to_dynamic(field)
            .map_err(|e| EngineError::InvalidExpression(format!("{}: {}", reference, e)))?;
        tracing::debug!("🔎 {} = {}", reference, field);
        values.insert(reference, value);
    }

    Ok(values)
}
