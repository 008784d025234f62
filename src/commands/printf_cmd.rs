//! printf
//!
//! `%s %d %i %u %o %x %X %c %b %q %%` with flags, width and precision; the
//! format string is reused until all arguments are consumed. `%q` quotes a
//! word so that `eval` reproduces it byte-for-byte.

use super::{Command, CommandContext, CommandResult};
use crate::bytes::decode_ansi_c;

pub struct Printf;

impl Command for Printf {
    fn name(&self) -> &'static str {
        "printf"
    }

    fn execute(&self, argv: &[Vec<u8>], ctx: &mut CommandContext<'_>) -> CommandResult {
        let _ = ctx;
        let mut args = argv;
        if args.first().map(|a| a.as_slice()) == Some(b"--") {
            args = &args[1..];
        }
        let Some(format) = args.first() else {
            return CommandResult::with_code(
                Vec::new(),
                b"printf: usage: printf [-v var] format [arguments]\n".to_vec(),
                2,
            );
        };
        let format = format.clone();
        let mut operands = args[1..].iter();
        let mut out: Vec<u8> = Vec::new();
        let mut code = 0;
        let mut stderr: Vec<u8> = Vec::new();

        loop {
            let consumed = render_once(
                &format,
                &mut operands,
                &mut out,
                &mut stderr,
                &mut code,
            );
            // Reuse the format while operands remain; a format that consumes
            // nothing must not loop forever.
            if operands.len() == 0 || !consumed {
                break;
            }
        }
        CommandResult::with_code(out, stderr, code)
    }
}

/// One pass over the format; returns whether any operand was consumed.
fn render_once<'it>(
    format: &[u8],
    operands: &mut std::slice::Iter<'it, Vec<u8>>,
    out: &mut Vec<u8>,
    stderr: &mut Vec<u8>,
    code: &mut i32,
) -> bool {
    let mut consumed = false;
    let mut i = 0;
    while i < format.len() {
        let b = format[i];
        if b == b'\\' {
            // Escapes are always live in the format string.
            let rest = String::from_utf8_lossy(&format[i..]).into_owned();
            let mut chars = rest.chars();
            chars.next();
            if let Some(c) = chars.next() {
                let escape: String = format!("\\{}", c);
                out.extend_from_slice(&decode_ansi_c(&escape));
                i += 1 + c.len_utf8();
            } else {
                out.push(b'\\');
                i += 1;
            }
            continue;
        }
        if b != b'%' {
            out.push(b);
            i += 1;
            continue;
        }
        if format.get(i + 1) == Some(&b'%') {
            out.push(b'%');
            i += 2;
            continue;
        }

        // %[flags][width][.precision]conv
        let spec_start = i;
        i += 1;
        while i < format.len() && matches!(format[i], b'-' | b'+' | b' ' | b'0' | b'#') {
            i += 1;
        }
        while i < format.len() && format[i].is_ascii_digit() {
            i += 1;
        }
        if i < format.len() && format[i] == b'.' {
            i += 1;
            while i < format.len() && format[i].is_ascii_digit() {
                i += 1;
            }
        }
        let Some(&conv) = format.get(i) else {
            out.extend_from_slice(&format[spec_start..]);
            break;
        };
        i += 1;
        let spec = String::from_utf8_lossy(&format[spec_start..i]).into_owned();

        let operand = operands.next();
        if operand.is_some() {
            consumed = true;
        }
        let arg: &[u8] = operand.map(|v| v.as_slice()).unwrap_or(b"");

        match conv {
            b's' => out.extend_from_slice(&pad_str(&spec, arg)),
            b'b' => {
                let text = String::from_utf8_lossy(arg).into_owned();
                out.extend_from_slice(&decode_ansi_c(&text));
            }
            b'q' => out.extend_from_slice(&quote_word(arg)),
            b'c' => {
                if let Some(first) = arg.first() {
                    out.push(*first);
                }
            }
            b'd' | b'i' | b'u' | b'o' | b'x' | b'X' => {
                let value = parse_numeric_operand(arg).unwrap_or_else(|| {
                    if !arg.is_empty() {
                        stderr.extend_from_slice(
                            format!(
                                "printf: {}: invalid number\n",
                                String::from_utf8_lossy(arg)
                            )
                            .as_bytes(),
                        );
                        *code = 1;
                    }
                    0
                });
                let body = match conv {
                    b'o' => format!("{:o}", value),
                    b'x' => format!("{:x}", value),
                    b'X' => format!("{:X}", value),
                    _ => value.to_string(),
                };
                out.extend_from_slice(&pad_str(&spec, body.as_bytes()));
            }
            other => {
                stderr.extend_from_slice(
                    format!("printf: `{}': invalid format character\n", other as char).as_bytes(),
                );
                *code = 1;
                out.extend_from_slice(&format[spec_start..i]);
            }
        }
    }
    consumed
}

fn parse_numeric_operand(arg: &[u8]) -> Option<i64> {
    if arg.is_empty() {
        return Some(0);
    }
    // 'c / "c yield the character's code point.
    if (arg[0] == b'\'' || arg[0] == b'"') && arg.len() > 1 {
        let text = String::from_utf8_lossy(&arg[1..]);
        return text.chars().next().map(|c| c as i64);
    }
    let text = String::from_utf8_lossy(arg).into_owned();
    crate::parser::arith::parse_integer_literal(text.trim()).ok()
}

/// Apply `%-10.3s`-style width/precision to a rendered body.
fn pad_str(spec: &str, body: &[u8]) -> Vec<u8> {
    let mut left = false;
    let mut zero = false;
    let mut width = 0usize;
    let mut precision: Option<usize> = None;

    let mut chars = spec.chars().peekable();
    chars.next(); // %
    while let Some(c) = chars.peek().copied() {
        match c {
            '-' => {
                left = true;
                chars.next();
            }
            '0' => {
                zero = true;
                chars.next();
            }
            '+' | ' ' | '#' => {
                chars.next();
            }
            _ => break,
        }
    }
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    width = digits.parse().unwrap_or(width);
    if chars.peek() == Some(&'.') {
        chars.next();
        let mut prec = String::new();
        while let Some(c) = chars.peek().copied() {
            if c.is_ascii_digit() {
                prec.push(c);
                chars.next();
            } else {
                break;
            }
        }
        precision = Some(prec.parse().unwrap_or(0));
    }

    let mut body = body.to_vec();
    let is_string = spec.ends_with('s');
    if is_string {
        if let Some(p) = precision {
            body.truncate(p);
        }
    }

    if body.len() >= width {
        return body;
    }
    let fill = width - body.len();
    let pad_byte = if zero && !left && !is_string { b'0' } else { b' ' };
    let mut padded = Vec::with_capacity(width);
    if left {
        padded.extend_from_slice(&body);
        padded.extend(std::iter::repeat(b' ').take(fill));
    } else {
        // Zero padding goes after a sign.
        if pad_byte == b'0' && body.first() == Some(&b'-') {
            padded.push(b'-');
            padded.extend(std::iter::repeat(b'0').take(fill));
            padded.extend_from_slice(&body[1..]);
        } else {
            padded.extend(std::iter::repeat(pad_byte).take(fill));
            padded.extend_from_slice(&body);
        }
    }
    padded
}

/// `%q`: render bytes so `eval` gets them back verbatim.
fn quote_word(arg: &[u8]) -> Vec<u8> {
    if arg.is_empty() {
        return b"''".to_vec();
    }
    let printable_safe = arg.iter().all(|b| {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b':' | b'=' | b'@' | b'%' | b'+' | b',')
    });
    if printable_safe {
        return arg.to_vec();
    }
    let needs_dollar = arg
        .iter()
        .any(|b| !b.is_ascii() || b.is_ascii_control() || *b == b'\'' || *b == 0x7f);
    if !needs_dollar {
        // Plain single quoting suffices.
        let mut out = vec![b'\''];
        out.extend_from_slice(arg);
        out.push(b'\'');
        return out;
    }
    // ANSI-C quoting for the rest.
    let mut out = Vec::with_capacity(arg.len() + 4);
    out.extend_from_slice(b"$'");
    for b in arg {
        match b {
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b if b.is_ascii() && !b.is_ascii_control() && *b != 0x7f => out.push(*b),
            b => out.extend_from_slice(format!("\\x{:02x}", b).as_bytes()),
        }
    }
    out.extend_from_slice(b"'");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_word_plain() {
        assert_eq!(quote_word(b"abc"), b"abc");
        assert_eq!(quote_word(b""), b"''");
        assert_eq!(quote_word(b"a b"), b"'a b'");
    }

    #[test]
    fn test_quote_word_raw_bytes() {
        assert_eq!(quote_word(&[0xff]), b"$'\\xff'");
        assert_eq!(quote_word(b"a\nb"), b"$'a\\nb'");
        assert_eq!(quote_word(b"it's"), b"$'it\\'s'");
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad_str("%5s", b"ab"), b"   ab");
        assert_eq!(pad_str("%-5s", b"ab"), b"ab   ");
        assert_eq!(pad_str("%05d", b"42"), b"00042");
        assert_eq!(pad_str("%05d", b"-42"), b"-0042");
        assert_eq!(pad_str("%.2s", b"abcdef"), b"ab");
    }
}
