//! Arithmetic Evaluation
//!
//! Evaluates the parsed `ArithExpr` tree against shell state: 64-bit signed
//! wrapping integers, C semantics, assignment writes back as decimal text.
//! A variable whose value is not a plain integer literal is re-parsed and
//! evaluated as an expression (depth-capped), matching the reference
//! shell's recursive resolution.

use crate::ast::types::{ArithBinaryOp, ArithExpr, ArithUnaryOp};
use crate::interpreter::errors::ControlFlow;
use crate::interpreter::state::{ExecutionLimits, ShellState, Value};
use crate::parser::arith::{parse_arith, parse_integer_literal};

pub fn eval(
    state: &mut ShellState,
    limits: &ExecutionLimits,
    expr: &ArithExpr,
) -> Result<i64, ControlFlow> {
    eval_at(state, limits, expr, 0)
}

fn eval_at(
    state: &mut ShellState,
    limits: &ExecutionLimits,
    expr: &ArithExpr,
    depth: u32,
) -> Result<i64, ControlFlow> {
    if depth > limits.max_subst_depth {
        return Err(ControlFlow::arithmetic("expression recursion level exceeded"));
    }
    match expr {
        ArithExpr::Number(n) => Ok(*n),
        ArithExpr::SyntaxError { message } => Err(ControlFlow::arithmetic(message.clone())),

        ArithExpr::Var { name, subscript } => {
            let index = match subscript {
                Some(e) => Some(eval_at(state, limits, e, depth + 1)?),
                None => None,
            };
            read_numeric(state, limits, name, index, depth)
        }

        ArithExpr::Unary { op, operand } => {
            let v = eval_at(state, limits, operand, depth + 1)?;
            Ok(match op {
                ArithUnaryOp::Plus => v,
                ArithUnaryOp::Minus => v.wrapping_neg(),
                ArithUnaryOp::Not => i64::from(v == 0),
                ArithUnaryOp::BitNot => !v,
            })
        }

        ArithExpr::IncDec { name, subscript, increment, prefix } => {
            let index = match subscript {
                Some(e) => Some(eval_at(state, limits, e, depth + 1)?),
                None => None,
            };
            let old = read_numeric(state, limits, name, index, depth)?;
            let new = if *increment { old.wrapping_add(1) } else { old.wrapping_sub(1) };
            write_numeric(state, name, index, new)?;
            Ok(if *prefix { new } else { old })
        }

        ArithExpr::Binary { op, lhs, rhs } => {
            // Logical operators short-circuit before the rhs is touched.
            match op {
                ArithBinaryOp::LogicalAnd => {
                    let l = eval_at(state, limits, lhs, depth + 1)?;
                    if l == 0 {
                        return Ok(0);
                    }
                    let r = eval_at(state, limits, rhs, depth + 1)?;
                    return Ok(i64::from(r != 0));
                }
                ArithBinaryOp::LogicalOr => {
                    let l = eval_at(state, limits, lhs, depth + 1)?;
                    if l != 0 {
                        return Ok(1);
                    }
                    let r = eval_at(state, limits, rhs, depth + 1)?;
                    return Ok(i64::from(r != 0));
                }
                _ => {}
            }
            let l = eval_at(state, limits, lhs, depth + 1)?;
            let r = eval_at(state, limits, rhs, depth + 1)?;
            apply_binary(*op, l, r)
        }

        ArithExpr::Ternary { cond, then, otherwise } => {
            let c = eval_at(state, limits, cond, depth + 1)?;
            if c != 0 {
                eval_at(state, limits, then, depth + 1)
            } else {
                eval_at(state, limits, otherwise, depth + 1)
            }
        }

        ArithExpr::Assign { op, name, subscript, value } => {
            let index = match subscript {
                Some(e) => Some(eval_at(state, limits, e, depth + 1)?),
                None => None,
            };
            let rhs = eval_at(state, limits, value, depth + 1)?;
            let result = match op {
                None => rhs,
                Some(binop) => {
                    let current = read_numeric(state, limits, name, index, depth)?;
                    apply_binary(*binop, current, rhs)?
                }
            };
            write_numeric(state, name, index, result)?;
            Ok(result)
        }

        ArithExpr::Comma(lhs, rhs) => {
            eval_at(state, limits, lhs, depth + 1)?;
            eval_at(state, limits, rhs, depth + 1)
        }
    }
}

fn apply_binary(op: ArithBinaryOp, l: i64, r: i64) -> Result<i64, ControlFlow> {
    Ok(match op {
        ArithBinaryOp::Add => l.wrapping_add(r),
        ArithBinaryOp::Sub => l.wrapping_sub(r),
        ArithBinaryOp::Mul => l.wrapping_mul(r),
        ArithBinaryOp::Div => {
            if r == 0 {
                return Err(ControlFlow::arithmetic("division by 0"));
            }
            l.wrapping_div(r)
        }
        ArithBinaryOp::Mod => {
            if r == 0 {
                return Err(ControlFlow::arithmetic("division by 0"));
            }
            l.wrapping_rem(r)
        }
        ArithBinaryOp::Pow => {
            if r < 0 {
                return Err(ControlFlow::arithmetic("exponent less than 0"));
            }
            let mut acc: i64 = 1;
            let mut base = l;
            let mut exp = r;
            while exp > 0 {
                if exp & 1 == 1 {
                    acc = acc.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            acc
        }
        ArithBinaryOp::Shl => l.wrapping_shl(r as u32),
        ArithBinaryOp::Shr => l.wrapping_shr(r as u32),
        ArithBinaryOp::Lt => i64::from(l < r),
        ArithBinaryOp::Le => i64::from(l <= r),
        ArithBinaryOp::Gt => i64::from(l > r),
        ArithBinaryOp::Ge => i64::from(l >= r),
        ArithBinaryOp::Eq => i64::from(l == r),
        ArithBinaryOp::Ne => i64::from(l != r),
        ArithBinaryOp::BitAnd => l & r,
        ArithBinaryOp::BitXor => l ^ r,
        ArithBinaryOp::BitOr => l | r,
        ArithBinaryOp::LogicalAnd | ArithBinaryOp::LogicalOr => {
            unreachable!("short-circuited before dispatch")
        }
    })
}

/// Numeric view of a variable. Unset reads as 0 (nounset is enforced by
/// word expansion, not inside arithmetic, as in the reference shell);
/// non-literal values are evaluated recursively.
fn read_numeric(
    state: &mut ShellState,
    limits: &ExecutionLimits,
    name: &str,
    index: Option<i64>,
    depth: u32,
) -> Result<i64, ControlFlow> {
    // Dynamic specials first.
    let special: Option<i64> = match name {
        "RANDOM" => Some(state.random() as i64),
        "LINENO" => Some(state.current_line as i64),
        "SECONDS" => Some(state.seconds() as i64),
        _ => None,
    };
    if let Some(v) = special {
        return Ok(v);
    }

    let bytes: Option<Vec<u8>> = match (state.find_var(name), index) {
        (None, _) => None,
        (Some(var), None) => var.value.as_scalar().map(|b| b.to_vec()),
        (Some(var), Some(i)) => match &var.value {
            Value::Indexed(map) => map.get(&i).cloned(),
            Value::Assoc(map) => map.get(i.to_string().as_bytes()).cloned(),
            Value::Scalar(b) => {
                if i == 0 {
                    Some(b.clone())
                } else {
                    None
                }
            }
        },
    };

    let bytes = match bytes {
        None => return Ok(0),
        Some(b) => b,
    };
    let text = String::from_utf8_lossy(&bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = parse_integer_literal(trimmed) {
        return Ok(n);
    }
    // Value is itself an expression: `x=y+1; echo $((x))`.
    let parsed = parse_arith(trimmed);
    eval_at(state, limits, &parsed, depth + 1)
}

fn write_numeric(
    state: &mut ShellState,
    name: &str,
    index: Option<i64>,
    value: i64,
) -> Result<(), ControlFlow> {
    let rendered = value.to_string().into_bytes();
    let result = match index {
        None => state.set_scalar(name, rendered),
        Some(i) => state.var_for_update(name).map(|var| {
            match &mut var.value {
                Value::Indexed(map) => {
                    map.insert(i, rendered);
                }
                Value::Assoc(map) => {
                    map.insert(i.to_string().into_bytes(), rendered);
                }
                Value::Scalar(old) => {
                    let mut map = indexmap::IndexMap::new();
                    if !old.is_empty() {
                        map.insert(0i64, old.clone());
                    }
                    map.insert(i, rendered);
                    var.value = Value::Indexed(map);
                }
            }
        }),
    };
    result.map_err(ControlFlow::arithmetic)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_text(state: &mut ShellState, text: &str) -> Result<i64, ControlFlow> {
        let limits = ExecutionLimits::default();
        eval(state, &limits, &parse_arith(text))
    }

    #[test]
    fn test_basic_arithmetic() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "1 + 2 * 3").unwrap(), 7);
        assert_eq!(eval_text(&mut st, "(1 + 2) * 3").unwrap(), 9);
        assert_eq!(eval_text(&mut st, "7 % 3").unwrap(), 1);
        assert_eq!(eval_text(&mut st, "2 ** 10").unwrap(), 1024);
        assert_eq!(eval_text(&mut st, "-5 + 3").unwrap(), -2);
    }

    #[test]
    fn test_comparisons_and_logic() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "3 < 5").unwrap(), 1);
        assert_eq!(eval_text(&mut st, "3 >= 5").unwrap(), 0);
        assert_eq!(eval_text(&mut st, "1 && 2").unwrap(), 1);
        assert_eq!(eval_text(&mut st, "0 || 0").unwrap(), 0);
        assert_eq!(eval_text(&mut st, "!5").unwrap(), 0);
        assert_eq!(eval_text(&mut st, "~0").unwrap(), -1);
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "0 && (x = 9)").unwrap(), 0);
        assert_eq!(st.get_scalar("x"), None);
        assert_eq!(eval_text(&mut st, "1 || (y = 9)").unwrap(), 1);
        assert_eq!(st.get_scalar("y"), None);
    }

    #[test]
    fn test_variables_and_assignment() {
        let mut st = ShellState::new();
        st.set_scalar("a", b"4".to_vec()).unwrap();
        assert_eq!(eval_text(&mut st, "a + 1").unwrap(), 5);
        assert_eq!(eval_text(&mut st, "b = a * 2").unwrap(), 8);
        assert_eq!(st.get_scalar("b").unwrap(), b"8");
        assert_eq!(eval_text(&mut st, "b += 2").unwrap(), 10);
    }

    #[test]
    fn test_unset_reads_zero() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "missing + 1").unwrap(), 1);
    }

    #[test]
    fn test_recursive_value_resolution() {
        let mut st = ShellState::new();
        st.set_scalar("y", b"3".to_vec()).unwrap();
        st.set_scalar("x", b"y + 1".to_vec()).unwrap();
        assert_eq!(eval_text(&mut st, "x * 2").unwrap(), 8);
    }

    #[test]
    fn test_incdec() {
        let mut st = ShellState::new();
        st.set_scalar("i", b"5".to_vec()).unwrap();
        assert_eq!(eval_text(&mut st, "i++").unwrap(), 5);
        assert_eq!(st.get_scalar("i").unwrap(), b"6");
        assert_eq!(eval_text(&mut st, "++i").unwrap(), 7);
        assert_eq!(eval_text(&mut st, "i--").unwrap(), 7);
        assert_eq!(st.get_scalar("i").unwrap(), b"6");
    }

    #[test]
    fn test_ternary_and_comma() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "1 ? 10 : 20").unwrap(), 10);
        assert_eq!(eval_text(&mut st, "0 ? 10 : 20").unwrap(), 20);
        assert_eq!(eval_text(&mut st, "x = 1, x + 1").unwrap(), 2);
    }

    #[test]
    fn test_division_by_zero() {
        let mut st = ShellState::new();
        assert!(matches!(
            eval_text(&mut st, "1 / 0"),
            Err(ControlFlow::Arithmetic { .. })
        ));
        assert!(matches!(
            eval_text(&mut st, "1 % 0"),
            Err(ControlFlow::Arithmetic { .. })
        ));
    }

    #[test]
    fn test_float_rejected() {
        let mut st = ShellState::new();
        assert!(matches!(
            eval_text(&mut st, "1.5 + 1"),
            Err(ControlFlow::Arithmetic { .. })
        ));
    }

    #[test]
    fn test_array_elements() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "a[2] = 7").unwrap(), 7);
        assert_eq!(eval_text(&mut st, "a[2] * 3").unwrap(), 21);
        assert_eq!(eval_text(&mut st, "a[1+1]").unwrap(), 7);
    }

    #[test]
    fn test_bases() {
        let mut st = ShellState::new();
        assert_eq!(eval_text(&mut st, "0xff").unwrap(), 255);
        assert_eq!(eval_text(&mut st, "010").unwrap(), 8);
        assert_eq!(eval_text(&mut st, "2#1010").unwrap(), 10);
    }

    #[test]
    fn test_readonly_write_fails() {
        let mut st = ShellState::new();
        st.set_scalar("ro", b"1".to_vec()).unwrap();
        st.mark_readonly("ro");
        assert!(matches!(
            eval_text(&mut st, "ro = 2"),
            Err(ControlFlow::Arithmetic { .. })
        ));
    }
}
