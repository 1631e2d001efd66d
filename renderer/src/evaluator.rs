use emboss::expression::{AssignOperator, BinaryOperator, Expr, Literal, Statement, UnaryOperator};

use crate::builtins;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::runtime_value::{Object, Value};

/// Evaluate an expression against the current bindings.
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Value, RuntimeError> {
    match expr {
        // --- Literals ---
        Expr::Literal(literal) => Ok(match literal {
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
            Literal::Undefined => Value::Undefined,
        }),
        Expr::Array(items) => Ok(Value::Array(
            items.iter().map(|item| evaluate(item, env)).collect::<Result<_, _>>()?,
        )),
        Expr::Object(entries) => {
            let mut object = Object::new();
            for (key, value) in entries {
                object.insert(key.clone(), evaluate(value, env)?);
            }
            Ok(Value::Object(object))
        }

        // --- References ---
        Expr::Variable(name, _) => env
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone())),
        Expr::Member { object, property } => {
            let target = evaluate(object, env)?;
            read_property(&target, property)
        }
        Expr::Index { object, index } => {
            let target = evaluate(object, env)?;
            let key = evaluate(index, env)?;
            read_property(&target, &builtins::property_key(&key))
        }
        Expr::Call {
            function,
            arguments,
            ..
        } => {
            let arguments = arguments
                .iter()
                .map(|argument| evaluate(argument, env))
                .collect::<Result<Vec<_>, _>>()?;
            builtins::call(function, arguments)
        }

        // --- Operations ---
        Expr::Unary { operator, operand } => {
            let value = evaluate(operand, env)?;
            Ok(match operator {
                UnaryOperator::Negation => Value::Number(-value.to_number()),
                UnaryOperator::LogicalNot => Value::Boolean(!value.is_truthy()),
            })
        }
        Expr::Binary {
            operator: BinaryOperator::LogicalAnd,
            left,
            right,
        } => {
            let left = evaluate(left, env)?;
            if left.is_truthy() { evaluate(right, env) } else { Ok(left) }
        }
        Expr::Binary {
            operator: BinaryOperator::LogicalOr,
            left,
            right,
        } => {
            let left = evaluate(left, env)?;
            if left.is_truthy() { Ok(left) } else { evaluate(right, env) }
        }
        Expr::Binary {
            operator,
            left,
            right,
        } => {
            let l = evaluate(left, env)?;
            let r = evaluate(right, env)?;
            Ok(eval_binary_op(*operator, &l, &r))
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if evaluate(condition, env)?.is_truthy() {
                evaluate(then_branch, env)
            } else {
                evaluate(else_branch, env)
            }
        }
    }
}

/// Run one statement. Declarations bind in the innermost scope; every
/// other write goes to the nearest existing binding.
pub fn execute_statement(statement: &Statement, env: &mut Environment) -> Result<(), RuntimeError> {
    match statement {
        Statement::Declare { name, value } => {
            if name == emboss::RESERVED_NAME {
                return Err(RuntimeError::ReservedName(name.clone()));
            }
            let value = match value {
                Some(expr) => evaluate(expr, env)?,
                None => Value::Undefined,
            };
            env.declare(name, value);
        }
        Statement::Assign {
            name,
            operator,
            value,
        } => {
            let value = evaluate(value, env)?;
            let value = match compound_operator(*operator) {
                None => value,
                Some(op) => {
                    let current = env
                        .get(name)
                        .ok_or_else(|| RuntimeError::UndeclaredAssignment(name.clone()))?;
                    eval_binary_op(op, current, &value)
                }
            };
            env.assign(name, value)?;
        }
        Statement::Increment { name, delta } => {
            let current = env
                .get(name)
                .ok_or_else(|| RuntimeError::UndeclaredAssignment(name.clone()))?;
            let next = Value::Number(current.to_number() + delta);
            env.assign(name, next)?;
        }
        Statement::Expression(expr) => {
            evaluate(expr, env)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn compound_operator(operator: AssignOperator) -> Option<BinaryOperator> {
    match operator {
        AssignOperator::Set => None,
        AssignOperator::Add => Some(BinaryOperator::Addition),
        AssignOperator::Subtract => Some(BinaryOperator::Subtraction),
        AssignOperator::Multiply => Some(BinaryOperator::Multiplication),
        AssignOperator::Divide => Some(BinaryOperator::Division),
        AssignOperator::Modulo => Some(BinaryOperator::Modulo),
    }
}

fn read_property(target: &Value, property: &str) -> Result<Value, RuntimeError> {
    match target {
        Value::Undefined | Value::Null => Err(RuntimeError::PropertyOfNothing {
            property: property.to_string(),
            target: target.type_name(),
        }),
        Value::Object(object) => Ok(object.get(property).cloned().unwrap_or_default()),
        Value::Array(items) => Ok(match property {
            "length" => Value::Number(items.len() as f64),
            index => array_index(index)
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or_default(),
        }),
        Value::String(s) => Ok(match property {
            "length" => Value::Number(s.chars().count() as f64),
            index => array_index(index)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
        }),
        Value::Boolean(_) | Value::Number(_) => Ok(Value::Undefined),
    }
}

/// Canonical non-negative integer keys only: "01" and "1.5" are not indices.
fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

fn eval_binary_op(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOperator::Addition => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (l, r) if is_textual(l) || is_textual(r) => Value::String(format!("{}{}", l, r)),
            (l, r) => Value::Number(l.to_number() + r.to_number()),
        },
        BinaryOperator::Subtraction => numeric_binop(left, right, |a, b| a - b),
        BinaryOperator::Multiplication => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Division => numeric_binop(left, right, |a, b| a / b),
        BinaryOperator::Modulo => numeric_binop(left, right, |a, b| a % b),
        BinaryOperator::Equality => Value::Boolean(left.loose_equals(right)),
        BinaryOperator::Inequality => Value::Boolean(!left.loose_equals(right)),
        BinaryOperator::StrictEquality => Value::Boolean(left.strict_equals(right)),
        BinaryOperator::StrictInequality => Value::Boolean(!left.strict_equals(right)),
        BinaryOperator::GreaterThan => compare(left, right, |o| o.is_gt()),
        BinaryOperator::LessThan => compare(left, right, |o| o.is_lt()),
        BinaryOperator::GreaterThanOrEqual => compare(left, right, |o| o.is_ge()),
        BinaryOperator::LessThanOrEqual => compare(left, right, |o| o.is_le()),
        // Short-circuiting happens in `evaluate`; these arms serve compound use.
        BinaryOperator::LogicalAnd => {
            if left.is_truthy() { right.clone() } else { left.clone() }
        }
        BinaryOperator::LogicalOr => {
            if left.is_truthy() { left.clone() } else { right.clone() }
        }
    }
}

/// Strings, arrays and objects make `+` concatenate.
fn is_textual(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_))
}

fn numeric_binop(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    Value::Number(f(left.to_number(), right.to_number()))
}

/// Two strings compare by code points; anything else compares as numbers,
/// and NaN makes every comparison false.
fn compare(left: &Value, right: &Value, f: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    Value::Boolean(ordering.is_some_and(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Scope;
    use emboss::parser::{parse_expression, parse_statements};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn env_with(data: serde_json::Value) -> Environment {
        let mut scope = Scope::new();
        if let Value::Object(object) = Value::from(data) {
            for (key, value) in object.iter() {
                scope.set(key, value.clone());
            }
        }
        Environment::new(scope)
    }

    fn eval(source: &str, env: &Environment) -> Result<Value, RuntimeError> {
        evaluate(&parse_expression(source).unwrap(), env)
    }

    #[rstest]
    #[case("1 + 2 * 3", json!(7))]
    #[case("'a' + 1", json!("a1"))]
    #[case("1 + true", json!(2))]
    #[case("7 % 4", json!(3))]
    #[case("user.name + '!'", json!("Ada!"))]
    #[case("user.tags[1]", json!("b"))]
    #[case("user.tags.length", json!(2))]
    #[case("user['name']", json!("Ada"))]
    #[case("user.missing", serde_json::Value::Null)]
    #[case("n > 2 && 'big' || 'small'", json!("big"))]
    #[case("0 || 'fallback'", json!("fallback"))]
    #[case("'b' > 'a'", json!(true))]
    #[case("n === 3 ? 'three' : 'other'", json!("three"))]
    #[case("'3' == n", json!(true))]
    #[case("'3' === n", json!(false))]
    #[case("!user.tags", json!(false))]
    #[case("upper(user.name)", json!("ADA"))]
    #[case("{a: n, b: [n]}", json!({"a": 3, "b": [3]}))]
    fn evaluates(#[case] source: &str, #[case] expected: serde_json::Value) {
        let env = env_with(json!({"n": 3, "user": {"name": "Ada", "tags": ["a", "b"]}}));
        let value = eval(source, &env).unwrap();
        // `user.missing` is undefined, which converts to JSON null.
        assert_eq!(value.to_json(), expected);
    }

    #[test]
    fn missing_values() {
        let env = env_with(json!({"user": null}));
        assert_eq!(
            eval("nobody", &env),
            Err(RuntimeError::UndefinedVariable("nobody".to_string()))
        );
        assert_eq!(
            eval("user.name", &env),
            Err(RuntimeError::PropertyOfNothing {
                property: "name".to_string(),
                target: "null"
            })
        );
        assert_eq!(eval("1 / 0", &env), Ok(Value::Number(f64::INFINITY)));
    }

    #[test]
    fn short_circuit_skips_errors() {
        let env = env_with(json!({}));
        assert_eq!(eval("false && nobody", &env), Ok(Value::Boolean(false)));
        assert_eq!(eval("1 || nobody", &env), Ok(Value::Number(1.0)));
    }

    #[test]
    fn statements_declare_and_assign() {
        let mut env = env_with(json!({"total": 1}));
        for statement in parse_statements("let x = 2; total += x; total *= 3; x++").unwrap() {
            execute_statement(&statement, &mut env).unwrap();
        }
        assert_eq!(env.get("total"), Some(&Value::Number(9.0)));
        assert_eq!(env.get("x"), Some(&Value::Number(3.0)));

        let statement = &parse_statements("ghost = 1").unwrap()[0];
        assert_eq!(
            execute_statement(statement, &mut env),
            Err(RuntimeError::UndeclaredAssignment("ghost".to_string()))
        );
    }
}
