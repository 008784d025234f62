//! Parameter Expansion Sub-Grammar
//!
//! Everything between `${` and the matching `}`. The lexer hands control
//! here after consuming `${`; this module reads the parameter name, an
//! optional subscript, and the operator suffix, re-entering the word reader
//! for operator arguments so nested expansions keep working.

use crate::ast::types::{Anchor, ParamExpansion, ParamIndex, ParamOp, Word, WordPart};
use crate::parser::arith::parse_arith;
use crate::parser::lexer::Lexer;
use crate::parser::ParseError;

impl Lexer {
    /// `${` already consumed.
    pub(crate) fn read_braced_parameter(&mut self) -> Result<WordPart, ParseError> {
        // ${#…}: length, unless it names the `#` parameter itself.
        if self.peek_is('#') {
            if self.peek_at_is(1, '}') {
                self.bump_n(2);
                return Ok(param("#", None, None));
            }
            self.bump_n(1);
            let name = self.read_param_name()?;
            let index = self.read_optional_index()?;
            if self.peek_is('}') {
                self.bump_n(1);
                return Ok(param(&name, index, Some(ParamOp::Length)));
            }
            let text = self.consume_to_close_brace()?;
            return Ok(param(&name, index, Some(ParamOp::Bad { text })));
        }

        // ${!…}: indirection, prefix listing, or array keys.
        if self.peek_is('!') && !self.peek_at_is(1, '}') {
            self.bump_n(1);
            let name = self.read_param_name()?;
            if (self.peek_is('*') || self.peek_is('@')) && self.peek_at_is(1, '}') {
                let star = self.peek_is('*');
                self.bump_n(2);
                return Ok(param(&name, None, Some(ParamOp::NamesWithPrefix { star })));
            }
            let index = self.read_optional_index()?;
            match index {
                Some(ParamIndex::At) | Some(ParamIndex::Star) => {
                    let star = matches!(index, Some(ParamIndex::Star));
                    if !self.peek_is('}') {
                        let text = self.consume_to_close_brace()?;
                        return Ok(param(&name, None, Some(ParamOp::Bad { text })));
                    }
                    self.bump_n(1);
                    return Ok(param(&name, None, Some(ParamOp::Keys { star })));
                }
                other => {
                    if !self.peek_is('}') {
                        let text = self.consume_to_close_brace()?;
                        return Ok(param(&name, other, Some(ParamOp::Bad { text })));
                    }
                    self.bump_n(1);
                    return Ok(param(&name, other, Some(ParamOp::Indirect)));
                }
            }
        }

        let name = self.read_param_name()?;
        if name.is_empty() {
            let text = self.consume_to_close_brace()?;
            return Ok(param("", None, Some(ParamOp::Bad { text })));
        }
        let index = self.read_optional_index()?;

        if self.peek_is('}') {
            self.bump_n(1);
            return Ok(param(&name, index, None));
        }

        let op = self.read_param_operator()?;
        Ok(param(&name, index, Some(op)))
    }

    fn read_param_operator(&mut self) -> Result<ParamOp, ParseError> {
        let c = self.peek_word_char().unwrap_or('}');
        match c {
            ':' => {
                self.bump_n(1);
                match self.peek_word_char() {
                    Some('-') => {
                        self.bump_n(1);
                        let (word, _) = self.read_brace_word(&['}'])?;
                        Ok(ParamOp::Default { word, colon: true })
                    }
                    Some('=') => {
                        self.bump_n(1);
                        let (word, _) = self.read_brace_word(&['}'])?;
                        Ok(ParamOp::AssignDefault { word, colon: true })
                    }
                    Some('?') => {
                        self.bump_n(1);
                        let (word, _) = self.read_brace_word(&['}'])?;
                        let word = if word.as_plain_literal() == Some("") { None } else { Some(word) };
                        Ok(ParamOp::ErrorIfUnset { word, colon: true })
                    }
                    Some('+') => {
                        self.bump_n(1);
                        let (word, _) = self.read_brace_word(&['}'])?;
                        Ok(ParamOp::Alternative { word, colon: true })
                    }
                    _ => {
                        // Substring: arithmetic offset, optional length.
                        let offset_text = self.read_arith_until(&[':', '}'])?;
                        let offset = parse_arith(&offset_text);
                        if self.peek_is(':') {
                            self.bump_n(1);
                            let len_text = self.read_arith_until(&['}'])?;
                            self.expect_close()?;
                            Ok(ParamOp::Substring { offset, length: Some(parse_arith(&len_text)) })
                        } else {
                            self.expect_close()?;
                            Ok(ParamOp::Substring { offset, length: None })
                        }
                    }
                }
            }
            '-' => {
                self.bump_n(1);
                let (word, _) = self.read_brace_word(&['}'])?;
                Ok(ParamOp::Default { word, colon: false })
            }
            '=' => {
                self.bump_n(1);
                let (word, _) = self.read_brace_word(&['}'])?;
                Ok(ParamOp::AssignDefault { word, colon: false })
            }
            '?' => {
                self.bump_n(1);
                let (word, _) = self.read_brace_word(&['}'])?;
                let word = if word.as_plain_literal() == Some("") { None } else { Some(word) };
                Ok(ParamOp::ErrorIfUnset { word, colon: false })
            }
            '+' => {
                self.bump_n(1);
                let (word, _) = self.read_brace_word(&['}'])?;
                Ok(ParamOp::Alternative { word, colon: false })
            }
            '#' => {
                self.bump_n(1);
                let greedy = self.peek_is('#');
                if greedy {
                    self.bump_n(1);
                }
                let (pattern, _) = self.read_brace_word(&['}'])?;
                Ok(ParamOp::RemovePrefix { pattern, greedy })
            }
            '%' => {
                self.bump_n(1);
                let greedy = self.peek_is('%');
                if greedy {
                    self.bump_n(1);
                }
                let (pattern, _) = self.read_brace_word(&['}'])?;
                Ok(ParamOp::RemoveSuffix { pattern, greedy })
            }
            '/' => {
                self.bump_n(1);
                let mut all = false;
                let mut anchor = None;
                match self.peek_word_char() {
                    Some('/') => {
                        all = true;
                        self.bump_n(1);
                    }
                    Some('#') => {
                        anchor = Some(Anchor::Start);
                        self.bump_n(1);
                    }
                    Some('%') => {
                        anchor = Some(Anchor::End);
                        self.bump_n(1);
                    }
                    _ => {}
                }
                let (pattern, term) = self.read_brace_word(&['}', '/'])?;
                let replacement = if term == '/' {
                    let (rep, _) = self.read_brace_word(&['}'])?;
                    Some(rep)
                } else {
                    None
                };
                Ok(ParamOp::Replace { pattern, replacement, all, anchor })
            }
            '^' => {
                self.bump_n(1);
                let all = self.peek_is('^');
                if all {
                    self.bump_n(1);
                }
                let (pat, _) = self.read_brace_word(&['}'])?;
                let pattern = if pat.as_plain_literal() == Some("") { None } else { Some(pat) };
                Ok(ParamOp::CaseMod { upper: true, all, pattern })
            }
            ',' => {
                self.bump_n(1);
                let all = self.peek_is(',');
                if all {
                    self.bump_n(1);
                }
                let (pat, _) = self.read_brace_word(&['}'])?;
                let pattern = if pat.as_plain_literal() == Some("") { None } else { Some(pat) };
                Ok(ParamOp::CaseMod { upper: false, all, pattern })
            }
            _ => {
                let text = self.consume_to_close_brace()?;
                Ok(ParamOp::Bad { text })
            }
        }
    }

    /// Identifier, positional digits, or a special single character.
    fn read_param_name(&mut self) -> Result<String, ParseError> {
        let mut name = String::new();
        match self.peek_word_char() {
            Some(c) if c.is_ascii_digit() => {
                while let Some(c) = self.peek_word_char() {
                    if c.is_ascii_digit() {
                        name.push(c);
                        self.bump_n(1);
                    } else {
                        break;
                    }
                }
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                while let Some(c) = self.peek_word_char() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        self.bump_n(1);
                    } else {
                        break;
                    }
                }
            }
            Some(c @ ('@' | '*' | '?' | '$' | '!' | '-' | '#')) => {
                name.push(c);
                self.bump_n(1);
            }
            _ => {}
        }
        Ok(name)
    }

    /// `[@]`, `[*]`, or `[text]` with bracket nesting.
    fn read_optional_index(&mut self) -> Result<Option<ParamIndex>, ParseError> {
        if !self.peek_is('[') {
            return Ok(None);
        }
        self.bump_n(1);
        if self.peek_is('@') && self.peek_at_is(1, ']') {
            self.bump_n(2);
            return Ok(Some(ParamIndex::At));
        }
        if self.peek_is('*') && self.peek_at_is(1, ']') {
            self.bump_n(2);
            return Ok(Some(ParamIndex::Star));
        }
        let mut depth = 1usize;
        let mut text = String::new();
        loop {
            match self.bump_char() {
                None => return Err(ParseError::UnexpectedEof),
                Some('[') => {
                    depth += 1;
                    text.push('[');
                }
                Some(']') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(ParamIndex::Text(text)));
                    }
                    text.push(']');
                }
                Some(c) => text.push(c),
            }
        }
    }

    /// Word terminated by one of `terminators` at brace depth zero; the
    /// terminator is consumed and returned.
    fn read_brace_word(&mut self, terminators: &[char]) -> Result<(Word, char), ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut lit = String::new();
        let mut depth = 0usize;

        macro_rules! flush {
            () => {
                if !lit.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut lit)));
                }
            };
        }

        loop {
            let c = match self.peek_word_char() {
                None => return Err(ParseError::UnexpectedEof),
                Some(c) => c,
            };
            if depth == 0 && terminators.contains(&c) {
                self.bump_n(1);
                flush!();
                if parts.is_empty() {
                    parts.push(WordPart::Literal(String::new()));
                }
                return Ok((Word { parts }, c));
            }
            match c {
                '{' => {
                    depth += 1;
                    lit.push('{');
                    self.bump_n(1);
                }
                '}' => {
                    // Only reached when depth > 0.
                    depth -= 1;
                    lit.push('}');
                    self.bump_n(1);
                }
                '\'' => {
                    self.bump_n(1);
                    flush!();
                    parts.push(WordPart::SingleQuoted(self.read_single_quoted()?));
                }
                '"' => {
                    self.bump_n(1);
                    flush!();
                    parts.push(WordPart::DoubleQuoted(self.read_double_quoted()?));
                }
                '\\' => {
                    self.bump_n(1);
                    match self.bump_char() {
                        None => lit.push('\\'),
                        Some('\n') => {}
                        Some(e) => {
                            flush!();
                            parts.push(WordPart::Escaped(e.to_string()));
                        }
                    }
                }
                '$' => {
                    self.bump_n(1);
                    match self.read_dollar(false)? {
                        Some(part) => {
                            flush!();
                            parts.push(part);
                        }
                        None => lit.push('$'),
                    }
                }
                '`' => {
                    self.bump_n(1);
                    flush!();
                    parts.push(self.read_backquote_pub()?);
                }
                _ => {
                    self.bump_n(1);
                    lit.push(c);
                }
            }
        }
    }

    /// Raw arithmetic text until one of `stops` at paren depth zero; the stop
    /// character is left unconsumed unless it is `}`-terminal context.
    fn read_arith_until(&mut self, stops: &[char]) -> Result<String, ParseError> {
        let mut text = String::new();
        let mut depth = 0usize;
        loop {
            let c = match self.peek_word_char() {
                None => return Err(ParseError::UnexpectedEof),
                Some(c) => c,
            };
            if depth == 0 && stops.contains(&c) {
                return Ok(text);
            }
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            text.push(c);
            self.bump_n(1);
        }
    }

    fn expect_close(&mut self) -> Result<(), ParseError> {
        if self.peek_is('}') {
            self.bump_n(1);
            Ok(())
        } else {
            Err(ParseError::unexpected(
                self.peek_word_char().map(|c| c.to_string()).unwrap_or_default(),
                self.line(),
            ))
        }
    }

    /// Skip to (and consume) the matching close brace, returning the skipped
    /// text for a bad-substitution report.
    fn consume_to_close_brace(&mut self) -> Result<String, ParseError> {
        let mut depth = 1usize;
        let mut text = String::new();
        loop {
            match self.bump_char() {
                None => return Err(ParseError::UnexpectedEof),
                Some('{') => {
                    depth += 1;
                    text.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                    text.push('}');
                }
                Some(c) => text.push(c),
            }
        }
    }
}

fn param(name: &str, index: Option<ParamIndex>, op: Option<ParamOp>) -> WordPart {
    WordPart::Parameter(ParamExpansion { name: name.to_string(), index, op })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::Token;

    fn parse_param(src: &str) -> ParamExpansion {
        let mut lx = Lexer::new(src);
        match lx.next_token().unwrap() {
            Token::Word(w) => match w.parts.into_iter().next().unwrap() {
                WordPart::Parameter(p) => p,
                other => panic!("not a parameter: {:?}", other),
            },
            other => panic!("not a word: {:?}", other),
        }
    }

    #[test]
    fn test_plain_braced() {
        let p = parse_param("${HOME}");
        assert_eq!(p.name, "HOME");
        assert!(p.op.is_none());
    }

    #[test]
    fn test_length() {
        let p = parse_param("${#var}");
        assert_eq!(p.name, "var");
        assert!(matches!(p.op, Some(ParamOp::Length)));

        let p = parse_param("${#}");
        assert_eq!(p.name, "#");
        assert!(p.op.is_none());
    }

    #[test]
    fn test_default_value() {
        let p = parse_param("${var:-fallback}");
        match p.op {
            Some(ParamOp::Default { word, colon: true }) => {
                assert_eq!(word.as_plain_literal(), Some("fallback"));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_default_without_colon() {
        let p = parse_param("${var-x}");
        assert!(matches!(p.op, Some(ParamOp::Default { colon: false, .. })));
    }

    #[test]
    fn test_pattern_removal() {
        let p = parse_param("${path##*/}");
        match p.op {
            Some(ParamOp::RemovePrefix { pattern, greedy: true }) => {
                assert_eq!(pattern.as_plain_literal(), Some("*/"));
            }
            other => panic!("{:?}", other),
        }
        let p = parse_param("${path%.txt}");
        assert!(matches!(p.op, Some(ParamOp::RemoveSuffix { greedy: false, .. })));
    }

    #[test]
    fn test_replacement() {
        let p = parse_param("${s/a/b}");
        match p.op {
            Some(ParamOp::Replace { pattern, replacement, all: false, anchor: None }) => {
                assert_eq!(pattern.as_plain_literal(), Some("a"));
                assert_eq!(replacement.unwrap().as_plain_literal(), Some("b"));
            }
            other => panic!("{:?}", other),
        }
        let p = parse_param("${s//a/b}");
        assert!(matches!(p.op, Some(ParamOp::Replace { all: true, .. })));
        let p = parse_param("${s/#a/b}");
        assert!(matches!(p.op, Some(ParamOp::Replace { anchor: Some(Anchor::Start), .. })));
    }

    #[test]
    fn test_substring() {
        let p = parse_param("${s:2:3}");
        assert!(matches!(p.op, Some(ParamOp::Substring { length: Some(_), .. })));
        let p = parse_param("${s:2}");
        assert!(matches!(p.op, Some(ParamOp::Substring { length: None, .. })));
    }

    #[test]
    fn test_case_mod() {
        assert!(matches!(
            parse_param("${s^^}").op,
            Some(ParamOp::CaseMod { upper: true, all: true, pattern: None })
        ));
        assert!(matches!(
            parse_param("${s,}").op,
            Some(ParamOp::CaseMod { upper: false, all: false, pattern: None })
        ));
    }

    #[test]
    fn test_indirection_and_prefix_names() {
        assert!(matches!(parse_param("${!ref}").op, Some(ParamOp::Indirect)));
        assert!(matches!(
            parse_param("${!BASH*}").op,
            Some(ParamOp::NamesWithPrefix { star: true })
        ));
    }

    #[test]
    fn test_array_forms() {
        let p = parse_param("${arr[@]}");
        assert!(matches!(p.index, Some(ParamIndex::At)));
        let p = parse_param("${arr[2]}");
        assert!(matches!(p.index, Some(ParamIndex::Text(t)) if t == "2"));
        let p = parse_param("${#arr[@]}");
        assert!(matches!(p.op, Some(ParamOp::Length)));
        let p = parse_param("${!arr[@]}");
        assert!(matches!(p.op, Some(ParamOp::Keys { star: false })));
    }

    #[test]
    fn test_nested_default() {
        let p = parse_param("${a:-${b:-c}}");
        match p.op {
            Some(ParamOp::Default { word, .. }) => {
                assert!(matches!(&word.parts[0], WordPart::Parameter(_)));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_bad_substitution_deferred() {
        let p = parse_param("${x@Z}");
        assert!(matches!(p.op, Some(ParamOp::Bad { .. })));
    }
}
