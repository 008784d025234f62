//! tr
//!
//! Byte translation/deletion/squeezing over stdin. Supports ranges
//! (`a-z`), the common classes (`[:upper:]` …), backslash escapes, `-d`,
//! `-s` and `-c`.

use super::{Command, CommandContext, CommandResult};

pub struct Tr;

impl Command for Tr {
    fn name(&self) -> &'static str {
        "tr"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let mut delete = false;
        let mut squeeze = false;
        let mut complement = false;
        let mut sets: Vec<Vec<u8>> = Vec::new();

        for arg in argv {
            match arg.as_slice() {
                b"-d" => delete = true,
                b"-s" => squeeze = true,
                b"-c" | b"-C" => complement = true,
                b"--" => {}
                other if other.starts_with(b"-") && other.len() > 1 && !sets.is_empty() => {
                    sets.push(other.to_vec())
                }
                other => sets.push(other.to_vec()),
            }
        }

        if sets.is_empty() || (!delete && sets.len() < 2 && !squeeze) {
            return CommandResult::with_code(
                Vec::new(),
                b"tr: missing operand\n".to_vec(),
                1,
            );
        }

        let set1 = expand_set(&sets[0]);
        let mut member = [false; 256];
        for b in &set1 {
            member[*b as usize] = true;
        }
        if complement {
            for slot in member.iter_mut() {
                *slot = !*slot;
            }
        }

        let input = std::mem::take(&mut ctx.stdin);
        let mut out: Vec<u8> = Vec::new();

        if delete {
            for b in input {
                if !member[b as usize] {
                    out.push(b);
                }
            }
        } else if sets.len() >= 2 {
            let set2 = expand_set(&sets[1]);
            let mut table: [u8; 256] = [0; 256];
            for (i, slot) in table.iter_mut().enumerate() {
                *slot = i as u8;
            }
            if complement {
                let fill = set2.last().copied().unwrap_or(0);
                for (i, slot) in table.iter_mut().enumerate() {
                    if member[i] {
                        *slot = fill;
                    }
                }
            } else {
                for (i, b) in set1.iter().enumerate() {
                    let to = set2.get(i).or(set2.last()).copied().unwrap_or(*b);
                    table[*b as usize] = to;
                }
            }
            for b in input {
                out.push(table[b as usize]);
            }
        } else {
            out = input;
        }

        if squeeze {
            let squeeze_set: Vec<u8> = if sets.len() >= 2 { expand_set(&sets[1]) } else { set1 };
            let mut squeezed = Vec::with_capacity(out.len());
            let mut prev: Option<u8> = None;
            for b in out {
                if prev == Some(b) && squeeze_set.contains(&b) {
                    continue;
                }
                prev = Some(b);
                squeezed.push(b);
            }
            out = squeezed;
        }

        CommandResult::success(out)
    }
}

/// Expand ranges, classes and escapes into an explicit byte list.
fn expand_set(spec: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < spec.len() {
        // [:class:]
        if spec[i] == b'[' && spec.get(i + 1) == Some(&b':') {
            if let Some(end) = find_subslice(&spec[i..], b":]") {
                let name = &spec[i + 2..i + end];
                out.extend(class_bytes(name));
                i += end + 2;
                continue;
            }
        }
        // escape
        if spec[i] == b'\\' && i + 1 < spec.len() {
            out.push(match spec[i + 1] {
                b'n' => b'\n',
                b't' => b'\t',
                b'r' => b'\r',
                b'a' => 0x07,
                b'b' => 0x08,
                b'f' => 0x0c,
                b'v' => 0x0b,
                b'\\' => b'\\',
                other => other,
            });
            i += 2;
            continue;
        }
        // range
        if i + 2 < spec.len() && spec[i + 1] == b'-' {
            let (lo, hi) = (spec[i], spec[i + 2]);
            if lo <= hi {
                out.extend(lo..=hi);
                i += 3;
                continue;
            }
        }
        out.push(spec[i]);
        i += 1;
    }
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

fn class_bytes(name: &[u8]) -> Vec<u8> {
    let all = 0u8..=255u8;
    match name {
        b"upper" => all.filter(|b| b.is_ascii_uppercase()).collect(),
        b"lower" => all.filter(|b| b.is_ascii_lowercase()).collect(),
        b"alpha" => all.filter(|b| b.is_ascii_alphabetic()).collect(),
        b"digit" => all.filter(|b| b.is_ascii_digit()).collect(),
        b"alnum" => all.filter(|b| b.is_ascii_alphanumeric()).collect(),
        b"space" => vec![b' ', b'\t', b'\n', 0x0b, 0x0c, b'\r'],
        b"blank" => vec![b' ', b'\t'],
        b"punct" => all.filter(|b| b.is_ascii_punctuation()).collect(),
        b"xdigit" => all.filter(|b| b.is_ascii_hexdigit()).collect(),
        b"cntrl" => all.filter(|b| b.is_ascii_control()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_set_range_and_class() {
        assert_eq!(expand_set(b"a-e"), b"abcde");
        assert_eq!(expand_set(b"\\n,"), b"\n,");
        assert!(expand_set(b"[:digit:]").starts_with(b"0123456789"));
    }
}
