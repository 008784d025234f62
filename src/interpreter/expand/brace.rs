//! Brace Expansion
//!
//! Purely lexical, before any variable lookup: `a{b,c}d`, `{1..5..2}`,
//! `{a..e}`. Only unquoted literal braces participate; quoted parts and
//! other expansions ride along opaquely inside items. Mixed-case character
//! ranges are an error (exit 1).

use crate::ast::types::{Word, WordPart};
use crate::interpreter::errors::ControlFlow;

/// One word in, one or more words out.
pub fn expand_braces(word: &Word) -> Result<Vec<Word>, ControlFlow> {
    let atoms = to_atoms(word);
    let expanded = expand_atoms(&atoms)?;
    Ok(expanded.iter().map(|a| to_word(a)).collect())
}

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Char(char),
    Part(WordPart),
}

fn to_atoms(word: &Word) -> Vec<Atom> {
    let mut atoms = Vec::new();
    for part in &word.parts {
        match part {
            WordPart::Literal(s) => atoms.extend(s.chars().map(Atom::Char)),
            other => atoms.push(Atom::Part(other.clone())),
        }
    }
    atoms
}

fn to_word(atoms: &[Atom]) -> Word {
    let mut parts: Vec<WordPart> = Vec::new();
    let mut lit = String::new();
    for atom in atoms {
        match atom {
            Atom::Char(c) => lit.push(*c),
            Atom::Part(p) => {
                if !lit.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut lit)));
                }
                parts.push(p.clone());
            }
        }
    }
    if !lit.is_empty() {
        parts.push(WordPart::Literal(lit));
    }
    if parts.is_empty() {
        return Word::empty();
    }
    Word { parts }
}

fn expand_atoms(atoms: &[Atom]) -> Result<Vec<Vec<Atom>>, ControlFlow> {
    for (open, atom) in atoms.iter().enumerate() {
        if *atom != Atom::Char('{') {
            continue;
        }
        if let Some(group) = parse_group(atoms, open)? {
            let mut results = Vec::new();
            for item in group.items {
                let mut candidate = atoms[..open].to_vec();
                candidate.extend(item);
                candidate.extend_from_slice(&atoms[group.close + 1..]);
                results.extend(expand_atoms(&candidate)?);
            }
            return Ok(results);
        }
    }
    Ok(vec![atoms.to_vec()])
}

struct Group {
    items: Vec<Vec<Atom>>,
    close: usize,
}

/// Parse a candidate group starting at `atoms[open] == '{'`. Returns None if
/// it is not a valid expansion (unmatched, no comma and no range).
fn parse_group(atoms: &[Atom], open: usize) -> Result<Option<Group>, ControlFlow> {
    let mut depth = 1usize;
    let mut items: Vec<Vec<Atom>> = vec![Vec::new()];
    let mut had_comma = false;
    let mut close = None;

    for (j, atom) in atoms.iter().enumerate().skip(open + 1) {
        match atom {
            Atom::Char('{') => {
                depth += 1;
                items.last_mut().expect("items non-empty").push(atom.clone());
            }
            Atom::Char('}') => {
                depth -= 1;
                if depth == 0 {
                    close = Some(j);
                    break;
                }
                items.last_mut().expect("items non-empty").push(atom.clone());
            }
            Atom::Char(',') if depth == 1 => {
                had_comma = true;
                items.push(Vec::new());
            }
            other => items.last_mut().expect("items non-empty").push(other.clone()),
        }
    }

    let close = match close {
        None => return Ok(None),
        Some(c) => c,
    };

    if had_comma {
        return Ok(Some(Group { items, close }));
    }

    // Single item: maybe a sequence expression.
    let only = &items[0];
    let text: Option<String> = only
        .iter()
        .map(|a| match a {
            Atom::Char(c) => Some(*c),
            Atom::Part(_) => None,
        })
        .collect();
    if let Some(text) = text {
        if let Some(rendered) = expand_range(&text)? {
            let items = rendered
                .into_iter()
                .map(|s| s.chars().map(Atom::Char).collect())
                .collect();
            return Ok(Some(Group { items, close }));
        }
    }
    Ok(None)
}

/// `a..b` / `a..b..step` sequences; None when the text is not one.
fn expand_range(text: &str) -> Result<Option<Vec<String>>, ControlFlow> {
    let pieces: Vec<&str> = text.split("..").collect();
    if pieces.len() != 2 && pieces.len() != 3 {
        return Ok(None);
    }
    let step: i64 = match pieces.get(2) {
        None => 1,
        Some(s) => match s.parse::<i64>() {
            Ok(0) => 1,
            Ok(n) => n.abs(),
            Err(_) => return Ok(None),
        },
    };

    // Numeric?
    if let (Ok(start), Ok(end)) = (pieces[0].parse::<i64>(), pieces[1].parse::<i64>()) {
        let pad = pieces[..2]
            .iter()
            .filter(|p| {
                let d = p.strip_prefix('-').unwrap_or(p);
                d.len() > 1 && d.starts_with('0')
            })
            .map(|p| p.len())
            .max()
            .unwrap_or(0);
        let mut out = Vec::new();
        let mut v = start;
        if start <= end {
            while v <= end {
                out.push(render_padded(v, pad));
                v += step;
            }
        } else {
            while v >= end {
                out.push(render_padded(v, pad));
                v -= step;
            }
        }
        return Ok(Some(out));
    }

    // Single characters?
    let (a, b) = match (single_char(pieces[0]), single_char(pieces[1])) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(None),
    };
    if !a.is_ascii_alphabetic() || !b.is_ascii_alphabetic() {
        return Ok(None);
    }
    if a.is_ascii_lowercase() != b.is_ascii_lowercase() {
        return Err(ControlFlow::brace_expansion(format!(
            "invalid character range: {{{}..{}}}",
            a, b
        )));
    }
    let (a, b) = (a as u8 as i64, b as u8 as i64);
    let mut out = Vec::new();
    let mut c = a;
    if a <= b {
        while c <= b {
            out.push(((c as u8) as char).to_string());
            c += step;
        }
    } else {
        while c >= b {
            out.push(((c as u8) as char).to_string());
            c -= step;
        }
    }
    Ok(Some(out))
}

fn render_padded(v: i64, pad: usize) -> String {
    if pad == 0 {
        v.to_string()
    } else if v < 0 {
        format!("-{:0>width$}", -v, width = pad.saturating_sub(1))
    } else {
        format!("{:0>width$}", v, width = pad)
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_text(src: &str) -> Vec<String> {
        let word = Word::literal(src);
        expand_braces(&word)
            .unwrap()
            .into_iter()
            .map(|w| w.as_plain_literal().unwrap_or("<complex>").to_string())
            .collect()
    }

    #[test]
    fn test_simple_list() {
        assert_eq!(expand_text("a{b,c}d"), vec!["abd", "acd"]);
        assert_eq!(expand_text("{x,y,z}"), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_no_expansion_without_comma() {
        assert_eq!(expand_text("{abc}"), vec!["{abc}"]);
        assert_eq!(expand_text("a{b"), vec!["a{b"]);
        assert_eq!(expand_text("{}"), vec!["{}"]);
    }

    #[test]
    fn test_nested() {
        assert_eq!(expand_text("{a,b{c,d}}"), vec!["a", "bc", "bd"]);
        assert_eq!(expand_text("x{a,{1,2}}y"), vec!["xay", "x1y", "x2y"]);
    }

    #[test]
    fn test_multiple_groups() {
        assert_eq!(expand_text("{a,b}{1,2}"), vec!["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn test_empty_items() {
        assert_eq!(expand_text("a{,b}"), vec!["a", "ab"]);
    }

    #[test]
    fn test_numeric_range() {
        assert_eq!(expand_text("{1..5}"), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(expand_text("{5..1}"), vec!["5", "4", "3", "2", "1"]);
        assert_eq!(expand_text("{1..5..2}"), vec!["1", "3", "5"]);
        assert_eq!(expand_text("{-2..2}"), vec!["-2", "-1", "0", "1", "2"]);
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(expand_text("{01..03}"), vec!["01", "02", "03"]);
        assert_eq!(expand_text("{08..10}"), vec!["08", "09", "10"]);
    }

    #[test]
    fn test_char_range() {
        assert_eq!(expand_text("{a..e}"), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(expand_text("{e..a}"), vec!["e", "d", "c", "b", "a"]);
        assert_eq!(expand_text("{A..C}"), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_mixed_case_range_is_error() {
        let word = Word::literal("{a..Z}");
        assert!(matches!(
            expand_braces(&word),
            Err(ControlFlow::BraceExpansion { .. })
        ));
    }

    #[test]
    fn test_quoted_braces_opaque() {
        // '{a,b}' single-quoted: no expansion.
        let word = Word { parts: vec![WordPart::SingleQuoted("{a,b}".into())] };
        let out = expand_braces(&word).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_expansion_inside_item() {
        // a{$x,c}: the parameter part is carried through opaquely.
        let word = Word {
            parts: vec![
                WordPart::Literal("a{".into()),
                WordPart::Parameter(crate::ast::types::ParamExpansion {
                    name: "x".into(),
                    index: None,
                    op: None,
                }),
                WordPart::Literal(",c}".into()),
            ],
        };
        let out = expand_braces(&word).unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0].parts[1], WordPart::Parameter(_)));
        assert_eq!(out[1].as_plain_literal(), Some("ac"));
    }
}
