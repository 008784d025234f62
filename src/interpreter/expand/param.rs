//! Parameter Expansion
//!
//! `$name`, the special parameters, array subscripts, and the `${…}`
//! operator suite: defaults, assignment, error-if-unset, alternatives,
//! length, substrings, pattern removal/replacement, case modification,
//! indirection, name listing and key listing. Nounset is enforced here —
//! reading an unset variable under `set -u` unwinds with exit 1 (`$@`/`$*`
//! excepted).

use crate::ast::types::{Anchor, ParamExpansion, ParamIndex, ParamOp};
use crate::bytes::lossy;
use crate::interpreter::errors::{ControlFlow, Output};
use crate::interpreter::expand::Expander;
use crate::interpreter::state::Value;
use crate::pattern::{
    fnmatch, match_prefix_length, match_suffix_start, replace as pattern_replace, MatchOptions,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Single(Vec<u8>),
    /// Multiple fields (`$@`, `${arr[@]}`); the caller inserts separators.
    Fields(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq)]
enum Base {
    Unset,
    Scalar(Vec<u8>),
    List(Vec<Vec<u8>>),
}

impl Base {
    fn is_unset_or_null(&self, colon: bool) -> bool {
        match self {
            Base::Unset => true,
            Base::Scalar(b) => colon && b.is_empty(),
            Base::List(v) => colon && v.is_empty(),
        }
    }

    fn into_value(self) -> ParamValue {
        match self {
            Base::Unset => ParamValue::Single(Vec::new()),
            Base::Scalar(b) => ParamValue::Single(b),
            Base::List(v) => ParamValue::Fields(v),
        }
    }
}

pub(crate) fn expand_parameter(
    xp: &mut Expander<'_, '_>,
    p: &ParamExpansion,
    in_dq: bool,
) -> Result<ParamValue, ControlFlow> {
    let base = resolve_base(xp, &p.name, p.index.as_ref(), in_dq)?;

    let op = match &p.op {
        None => {
            nounset_check(xp, &p.name, &base)?;
            return Ok(base.into_value());
        }
        Some(op) => op,
    };

    match op {
        ParamOp::Bad { text } => Err(ControlFlow::bad_substitution(format!("${{{}}}", text))),

        ParamOp::Length => {
            nounset_check(xp, &p.name, &base)?;
            let n = match &base {
                Base::List(v) => v.len(),
                Base::Scalar(b) => lossy(b).chars().count(),
                Base::Unset => 0,
            };
            Ok(ParamValue::Single(n.to_string().into_bytes()))
        }

        ParamOp::Default { word, colon } => {
            if base.is_unset_or_null(*colon) {
                Ok(ParamValue::Single(xp.expand_word_single(word)?))
            } else {
                Ok(base.into_value())
            }
        }

        ParamOp::AssignDefault { word, colon } => {
            if base.is_unset_or_null(*colon) {
                let value = xp.expand_word_single(word)?;
                assign_default(xp, p, value.clone())?;
                Ok(ParamValue::Single(value))
            } else {
                Ok(base.into_value())
            }
        }

        ParamOp::ErrorIfUnset { word, colon } => {
            if base.is_unset_or_null(*colon) {
                let message = match word {
                    Some(w) => lossy(&xp.expand_word_single(w)?).into_owned(),
                    None => "parameter null or not set".to_string(),
                };
                return Err(ControlFlow::Exit {
                    code: 1,
                    output: Output::stderr_text(format!("bash: {}: {}\n", p.name, message)),
                });
            }
            Ok(base.into_value())
        }

        ParamOp::Alternative { word, colon } => {
            if base.is_unset_or_null(*colon) {
                Ok(ParamValue::Single(Vec::new()))
            } else {
                Ok(ParamValue::Single(xp.expand_word_single(word)?))
            }
        }

        ParamOp::Substring { offset, length } => {
            nounset_check(xp, &p.name, &base)?;
            let off = crate::interpreter::arith::eval(xp.state, xp.exec.limits, offset)?;
            let len = match length {
                None => None,
                Some(e) => Some(crate::interpreter::arith::eval(xp.state, xp.exec.limits, e)?),
            };
            match base {
                Base::List(items) => {
                    let items = slice_list(&p.name, items, xp, off, len)?;
                    Ok(ParamValue::Fields(items))
                }
                Base::Scalar(bytes) => Ok(ParamValue::Single(substring(&bytes, off, len)?)),
                Base::Unset => Ok(ParamValue::Single(Vec::new())),
            }
        }

        ParamOp::RemovePrefix { pattern, greedy } | ParamOp::RemoveSuffix { pattern, greedy } => {
            nounset_check(xp, &p.name, &base)?;
            let pat = xp.expand_pattern(pattern)?;
            let prefix = matches!(op, ParamOp::RemovePrefix { .. });
            let opts = match_opts(xp);
            let apply = |bytes: &[u8]| -> Vec<u8> {
                if prefix {
                    match match_prefix_length(&pat, bytes, &opts, *greedy) {
                        Some(n) => bytes[n..].to_vec(),
                        None => bytes.to_vec(),
                    }
                } else {
                    match match_suffix_start(&pat, bytes, &opts, *greedy) {
                        Some(n) => bytes[..n].to_vec(),
                        None => bytes.to_vec(),
                    }
                }
            };
            Ok(map_base(base, apply))
        }

        ParamOp::Replace { pattern, replacement, all, anchor } => {
            nounset_check(xp, &p.name, &base)?;
            let pat = xp.expand_pattern(pattern)?;
            let rep = match replacement {
                Some(w) => xp.expand_word_single(w)?,
                None => Vec::new(),
            };
            let opts = match_opts(xp);
            let apply = |bytes: &[u8]| -> Vec<u8> {
                match anchor {
                    Some(Anchor::Start) => match match_prefix_length(&pat, bytes, &opts, true) {
                        Some(n) => {
                            let mut out = rep.clone();
                            out.extend_from_slice(&bytes[n..]);
                            out
                        }
                        None => bytes.to_vec(),
                    },
                    Some(Anchor::End) => match match_suffix_start(&pat, bytes, &opts, true) {
                        Some(n) => {
                            let mut out = bytes[..n].to_vec();
                            out.extend_from_slice(&rep);
                            out
                        }
                        None => bytes.to_vec(),
                    },
                    None => pattern_replace(&pat, &rep, bytes, &opts, *all),
                }
            };
            Ok(map_base(base, apply))
        }

        ParamOp::CaseMod { upper, all, pattern } => {
            nounset_check(xp, &p.name, &base)?;
            let pat = match pattern {
                Some(w) => Some(xp.expand_pattern(w)?),
                None => None,
            };
            let opts = match_opts(xp);
            let apply = |bytes: &[u8]| case_modify(bytes, *upper, *all, pat.as_deref(), &opts);
            Ok(map_base(base, apply))
        }

        ParamOp::Indirect => {
            let target = match &base {
                Base::Unset => Vec::new(),
                Base::Scalar(b) => b.clone(),
                Base::List(_) => {
                    return Err(ControlFlow::bad_substitution(p.name.clone()));
                }
            };
            let target_text = lossy(&target).into_owned();
            if target_text.is_empty() {
                if xp.state.flags.nounset {
                    return Err(ControlFlow::nounset(&p.name));
                }
                return Ok(ParamValue::Single(Vec::new()));
            }
            let (name, index) = parse_indirect_target(&target_text);
            let inner = resolve_base(xp, &name, index.as_ref(), in_dq)?;
            nounset_check(xp, &target_text, &inner)?;
            Ok(inner.into_value())
        }

        ParamOp::NamesWithPrefix { .. } => {
            let names: Vec<Vec<u8>> = xp
                .state
                .visible_names()
                .into_iter()
                .filter(|n| n.starts_with(&p.name))
                .map(String::into_bytes)
                .collect();
            Ok(ParamValue::Fields(names))
        }

        ParamOp::Keys { .. } => {
            let keys = match xp.state.find_var(&p.name) {
                None => Vec::new(),
                Some(var) => var.value.keys(),
            };
            Ok(ParamValue::Fields(keys))
        }
    }
}

fn map_base(base: Base, f: impl Fn(&[u8]) -> Vec<u8>) -> ParamValue {
    match base {
        Base::Unset => ParamValue::Single(Vec::new()),
        Base::Scalar(b) => ParamValue::Single(f(&b)),
        Base::List(items) => ParamValue::Fields(items.iter().map(|b| f(b)).collect()),
    }
}

fn match_opts(xp: &Expander<'_, '_>) -> MatchOptions {
    MatchOptions { extglob: true, nocase: xp.state.shopt.nocasematch }
}

fn nounset_check(xp: &Expander<'_, '_>, name: &str, base: &Base) -> Result<(), ControlFlow> {
    if !xp.state.flags.nounset || !matches!(base, Base::Unset) {
        return Ok(());
    }
    if name == "@" || name == "*" {
        return Ok(());
    }
    Err(ControlFlow::nounset(name))
}

// =============================================================================
// Base resolution
// =============================================================================

fn resolve_base(
    xp: &mut Expander<'_, '_>,
    name: &str,
    index: Option<&ParamIndex>,
    in_dq: bool,
) -> Result<Base, ControlFlow> {
    // Positional and special parameters.
    match name {
        "@" | "*" => {
            let params: Vec<Vec<u8>> = xp.state.params().to_vec();
            if name == "*" && in_dq {
                return Ok(Base::Scalar(join_fields(&params, &xp.state.ifs())));
            }
            return Ok(Base::List(params));
        }
        "#" => return Ok(Base::Scalar(xp.state.params().len().to_string().into_bytes())),
        "?" => return Ok(Base::Scalar(xp.state.last_exit_code.to_string().into_bytes())),
        "$" => return Ok(Base::Scalar(xp.state.shell_pid.to_string().into_bytes())),
        "!" => {
            return Ok(if xp.state.last_background_pid == 0 {
                Base::Scalar(Vec::new())
            } else {
                Base::Scalar(xp.state.last_background_pid.to_string().into_bytes())
            });
        }
        "-" => return Ok(Base::Scalar(xp.state.flags.short_flags().into_bytes())),
        "_" => return Ok(Base::Scalar(xp.state.last_arg.clone())),
        "0" => return Ok(Base::Scalar(xp.state.script_name.clone().into_bytes())),
        "RANDOM" if xp.state.find_var("RANDOM").is_none() => {
            let r = xp.state.random();
            return Ok(Base::Scalar(r.to_string().into_bytes()));
        }
        "LINENO" => return Ok(Base::Scalar(xp.state.current_line.to_string().into_bytes())),
        "SECONDS" if xp.state.find_var("SECONDS").is_none() => {
            return Ok(Base::Scalar(xp.state.seconds().to_string().into_bytes()));
        }
        "PIPESTATUS" => {
            let items: Vec<Vec<u8>> = xp
                .state
                .pipestatus
                .iter()
                .map(|c| c.to_string().into_bytes())
                .collect();
            return Ok(resolve_synthetic_array(items, index, in_dq, &xp.state.ifs()));
        }
        "FUNCNAME" => {
            if xp.state.func_stack.is_empty() {
                return Ok(Base::Unset);
            }
            let items: Vec<Vec<u8>> = xp
                .state
                .func_stack
                .iter()
                .rev()
                .map(|n| n.clone().into_bytes())
                .collect();
            return Ok(resolve_synthetic_array(items, index, in_dq, &xp.state.ifs()));
        }
        _ => {}
    }

    if name.chars().all(|c| c.is_ascii_digit()) && !name.is_empty() {
        let n: usize = name.parse().unwrap_or(0);
        if n == 0 {
            return Ok(Base::Scalar(xp.state.script_name.clone().into_bytes()));
        }
        return Ok(match xp.state.params().get(n - 1) {
            Some(v) => Base::Scalar(v.clone()),
            None => Base::Unset,
        });
    }

    // Named variables.
    let Some(var) = xp.state.find_var(name) else {
        return Ok(Base::Unset);
    };
    let value = var.value.clone();

    match index {
        None => Ok(match value.as_scalar() {
            Some(b) => Base::Scalar(b.to_vec()),
            None => {
                if value.element_count() == 0 {
                    Base::Unset
                } else {
                    Base::Scalar(Vec::new())
                }
            }
        }),
        Some(ParamIndex::At) | Some(ParamIndex::Star) => {
            let items = value.elements();
            if matches!(index, Some(ParamIndex::Star)) && in_dq {
                Ok(Base::Scalar(join_fields(&items, &xp.state.ifs())))
            } else {
                Ok(Base::List(items))
            }
        }
        Some(ParamIndex::Text(text)) => element_at(xp, name, &value, text),
    }
}

fn resolve_synthetic_array(
    items: Vec<Vec<u8>>,
    index: Option<&ParamIndex>,
    in_dq: bool,
    ifs: &[u8],
) -> Base {
    match index {
        None => match items.first() {
            Some(v) => Base::Scalar(v.clone()),
            None => Base::Scalar(Vec::new()),
        },
        Some(ParamIndex::At) => Base::List(items),
        Some(ParamIndex::Star) => {
            if in_dq {
                Base::Scalar(join_fields(&items, ifs))
            } else {
                Base::List(items)
            }
        }
        Some(ParamIndex::Text(t)) => {
            let idx: i64 = t.trim().parse().unwrap_or(0);
            let idx = if idx < 0 { items.len() as i64 + idx } else { idx };
            if idx < 0 {
                return Base::Unset;
            }
            match items.get(idx as usize) {
                Some(v) => Base::Scalar(v.clone()),
                None => Base::Unset,
            }
        }
    }
}

fn element_at(
    xp: &mut Expander<'_, '_>,
    name: &str,
    value: &Value,
    subscript: &str,
) -> Result<Base, ControlFlow> {
    match value {
        Value::Assoc(map) => {
            let key = expand_subscript_text(xp, subscript)?;
            Ok(match map.get(key.as_slice()) {
                Some(v) => Base::Scalar(v.clone()),
                None => Base::Unset,
            })
        }
        Value::Indexed(map) => {
            let mut idx =
                crate::interpreter::arith::eval(xp.state, xp.exec.limits, &crate::parser::arith::parse_arith(subscript))?;
            if idx < 0 {
                let max = map.keys().copied().max().unwrap_or(-1);
                idx += max + 1;
            }
            let _ = name;
            Ok(match map.get(&idx) {
                Some(v) => Base::Scalar(v.clone()),
                None => Base::Unset,
            })
        }
        Value::Scalar(b) => {
            let idx =
                crate::interpreter::arith::eval(xp.state, xp.exec.limits, &crate::parser::arith::parse_arith(subscript))?;
            Ok(if idx == 0 { Base::Scalar(b.clone()) } else { Base::Unset })
        }
    }
}

/// Associative-array subscripts are expanded as words (`${m[$key]}`).
fn expand_subscript_text(xp: &mut Expander<'_, '_>, text: &str) -> Result<Vec<u8>, ControlFlow> {
    let mut lexer = crate::parser::lexer::Lexer::new(text);
    match lexer.read_word() {
        Ok(word) => xp.expand_word_single(&word),
        Err(_) => Ok(text.as_bytes().to_vec()),
    }
}

fn join_fields(items: &[Vec<u8>], ifs: &[u8]) -> Vec<u8> {
    let sep: &[u8] = match ifs.first() {
        Some(b) => std::slice::from_ref(b),
        None => b"",
    };
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(sep);
        }
        out.extend_from_slice(item);
    }
    out
}

// =============================================================================
// Operator helpers
// =============================================================================

fn assign_default(
    xp: &mut Expander<'_, '_>,
    p: &ParamExpansion,
    value: Vec<u8>,
) -> Result<(), ControlFlow> {
    if !crate::parser::parser::is_identifier(&p.name) {
        return Err(ControlFlow::bad_substitution(format!(
            "${}: cannot assign in this way",
            p.name
        )));
    }
    let result = match &p.index {
        None | Some(ParamIndex::At) | Some(ParamIndex::Star) => {
            xp.state.set_scalar(&p.name, value)
        }
        Some(ParamIndex::Text(t)) => {
            let idx = crate::interpreter::arith::eval(
                xp.state,
                xp.exec.limits,
                &crate::parser::arith::parse_arith(t),
            )?;
            xp.state.var_for_update(&p.name).map(|var| match &mut var.value {
                Value::Indexed(map) => {
                    map.insert(idx, value);
                }
                Value::Assoc(map) => {
                    map.insert(t.as_bytes().to_vec(), value);
                }
                Value::Scalar(_) => {
                    let mut map = indexmap::IndexMap::new();
                    map.insert(idx, value);
                    var.value = Value::Indexed(map);
                }
            })
        }
    };
    result.map_err(|e| {
        ControlFlow::Exit { code: 1, output: Output::stderr_text(format!("bash: {}\n", e)) }
    })
}

fn substring(bytes: &[u8], offset: i64, length: Option<i64>) -> Result<Vec<u8>, ControlFlow> {
    let text = lossy(bytes).into_owned();
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len() as i64;

    let start = if offset < 0 { len + offset } else { offset };
    if start < 0 || start > len {
        return Ok(Vec::new());
    }
    let end = match length {
        None => len,
        Some(l) if l >= 0 => (start + l).min(len),
        Some(l) => {
            let end = len + l;
            if end < start {
                return Err(ControlFlow::arithmetic(format!("{}: substring expression < 0", l)));
            }
            end
        }
    };
    Ok(chars[start as usize..end as usize].iter().collect::<String>().into_bytes())
}

/// `${@:off:len}` slices the `$0`-prefixed parameter list; array slices are
/// plain zero-based.
fn slice_list(
    name: &str,
    items: Vec<Vec<u8>>,
    xp: &Expander<'_, '_>,
    offset: i64,
    length: Option<i64>,
) -> Result<Vec<Vec<u8>>, ControlFlow> {
    let full: Vec<Vec<u8>> = if name == "@" || name == "*" {
        std::iter::once(xp.state.script_name.clone().into_bytes())
            .chain(items)
            .collect()
    } else {
        items
    };
    let len = full.len() as i64;
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = match length {
        None => len,
        Some(l) if l >= 0 => (start + l).min(len),
        Some(l) => {
            let end = len + l;
            if end < start {
                return Err(ControlFlow::arithmetic(format!("{}: substring expression < 0", l)));
            }
            end
        }
    };
    Ok(full[start as usize..end as usize].to_vec())
}

fn case_modify(
    bytes: &[u8],
    upper: bool,
    all: bool,
    pattern: Option<&[u8]>,
    opts: &MatchOptions,
) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let matches_at = |b: u8| -> bool {
        match pattern {
            None => true,
            Some(p) => fnmatch(p, &[b], opts),
        }
    };
    if all {
        for b in out.iter_mut() {
            if matches_at(*b) {
                *b = if upper { b.to_ascii_uppercase() } else { b.to_ascii_lowercase() };
            }
        }
    } else if let Some(first) = out.first_mut() {
        if matches_at(*first) {
            *first = if upper { first.to_ascii_uppercase() } else { first.to_ascii_lowercase() };
        }
    }
    out
}

fn parse_indirect_target(text: &str) -> (String, Option<ParamIndex>) {
    if let Some(open) = text.find('[') {
        if text.ends_with(']') {
            let name = text[..open].to_string();
            let inner = &text[open + 1..text.len() - 1];
            let index = match inner {
                "@" => ParamIndex::At,
                "*" => ParamIndex::Star,
                other => ParamIndex::Text(other.to_string()),
            };
            return (name, Some(index));
        }
    }
    (text.to_string(), None)
}
