//! Arithmetic Expression Parser
//!
//! Parses the text inside `$((…))`, `((…))`, `${var:off:len}` offsets and
//! C-style for headers into an `ArithExpr`. Malformed input produces an
//! `ArithExpr::SyntaxError` node rather than a parse failure: the shell
//! reports arithmetic problems at evaluation time with exit status 1.
//!
//! Grammar is the C ladder: comma, assignment (right-assoc), ternary,
//! `||`, `&&`, `|`, `^`, `&`, equality, relational, shifts, additive,
//! multiplicative, `**` (right-assoc), unary, postfix, primary.

use crate::ast::types::{ArithBinaryOp, ArithExpr, ArithUnaryOp};

/// Parse arithmetic text. Empty/blank input evaluates to 0.
pub fn parse_arith(text: &str) -> ArithExpr {
    let mut p = ArithParser::new(text);
    p.skip_ws();
    if p.eof() {
        return ArithExpr::Number(0);
    }
    match p.parse_comma() {
        Ok(expr) => {
            p.skip_ws();
            if p.eof() {
                expr
            } else {
                ArithExpr::SyntaxError {
                    message: format!("syntax error in expression (error token is \"{}\")", p.rest()),
                }
            }
        }
        Err(message) => ArithExpr::SyntaxError { message },
    }
}

type ArithResult = Result<ArithExpr, String>;

struct ArithParser {
    chars: Vec<char>,
    pos: usize,
}

impl ArithParser {
    fn new(text: &str) -> Self {
        Self { chars: text.chars().collect(), pos: 0 }
    }

    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\n') | Some('\r')) {
            self.pos += 1;
        }
    }

    fn rest(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    /// Consume `s` if the input starts with it, with one-char lookahead
    /// protection against eating a longer operator's prefix.
    fn eat(&mut self, s: &str, not_followed_by: &[char]) -> bool {
        let n = s.chars().count();
        for (i, ec) in s.chars().enumerate() {
            if self.peek_at(i) != Some(ec) {
                return false;
            }
        }
        if let Some(next) = self.peek_at(n) {
            if not_followed_by.contains(&next) {
                return false;
            }
        }
        self.pos += n;
        true
    }

    // ---- precedence ladder ----

    fn parse_comma(&mut self) -> ArithResult {
        let mut lhs = self.parse_assign()?;
        loop {
            self.skip_ws();
            if self.eat(",", &[]) {
                let rhs = self.parse_assign()?;
                lhs = ArithExpr::Comma(Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_assign(&mut self) -> ArithResult {
        let start = self.pos;
        let lhs = self.parse_ternary()?;

        // Only a plain variable (or array element) can be an assignment target.
        let (name, subscript) = match &lhs {
            ArithExpr::Var { name, subscript } => (name.clone(), subscript.clone()),
            _ => return Ok(lhs),
        };

        self.skip_ws();
        let op = if self.eat("=", &['=']) {
            None
        } else if self.eat("+=", &[]) {
            Some(ArithBinaryOp::Add)
        } else if self.eat("-=", &[]) {
            Some(ArithBinaryOp::Sub)
        } else if self.eat("*=", &[]) {
            Some(ArithBinaryOp::Mul)
        } else if self.eat("/=", &[]) {
            Some(ArithBinaryOp::Div)
        } else if self.eat("%=", &[]) {
            Some(ArithBinaryOp::Mod)
        } else if self.eat("<<=", &[]) {
            Some(ArithBinaryOp::Shl)
        } else if self.eat(">>=", &[]) {
            Some(ArithBinaryOp::Shr)
        } else if self.eat("&=", &[]) {
            Some(ArithBinaryOp::BitAnd)
        } else if self.eat("|=", &[]) {
            Some(ArithBinaryOp::BitOr)
        } else if self.eat("^=", &[]) {
            Some(ArithBinaryOp::BitXor)
        } else {
            let _ = start;
            return Ok(lhs);
        };

        let value = self.parse_assign()?;
        Ok(ArithExpr::Assign { op, name, subscript, value: Box::new(value) })
    }

    fn parse_ternary(&mut self) -> ArithResult {
        let cond = self.parse_logical_or()?;
        self.skip_ws();
        if self.eat("?", &[]) {
            let then = self.parse_assign()?;
            self.skip_ws();
            if !self.eat(":", &[]) {
                return Err("expected `:' in conditional expression".to_string());
            }
            let otherwise = self.parse_assign()?;
            Ok(ArithExpr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            })
        } else {
            Ok(cond)
        }
    }

    fn parse_logical_or(&mut self) -> ArithResult {
        let mut lhs = self.parse_logical_and()?;
        loop {
            self.skip_ws();
            if self.eat("||", &[]) {
                let rhs = self.parse_logical_and()?;
                lhs = bin(ArithBinaryOp::LogicalOr, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_logical_and(&mut self) -> ArithResult {
        let mut lhs = self.parse_bit_or()?;
        loop {
            self.skip_ws();
            if self.eat("&&", &[]) {
                let rhs = self.parse_bit_or()?;
                lhs = bin(ArithBinaryOp::LogicalAnd, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_bit_or(&mut self) -> ArithResult {
        let mut lhs = self.parse_bit_xor()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('|') && self.peek_at(1) != Some('|') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_bit_xor()?;
                lhs = bin(ArithBinaryOp::BitOr, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_bit_xor(&mut self) -> ArithResult {
        let mut lhs = self.parse_bit_and()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('^') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_bit_and()?;
                lhs = bin(ArithBinaryOp::BitXor, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_bit_and(&mut self) -> ArithResult {
        let mut lhs = self.parse_equality()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('&') && self.peek_at(1) != Some('&') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_equality()?;
                lhs = bin(ArithBinaryOp::BitAnd, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_equality(&mut self) -> ArithResult {
        let mut lhs = self.parse_relational()?;
        loop {
            self.skip_ws();
            if self.eat("==", &[]) {
                let rhs = self.parse_relational()?;
                lhs = bin(ArithBinaryOp::Eq, lhs, rhs);
            } else if self.eat("!=", &[]) {
                let rhs = self.parse_relational()?;
                lhs = bin(ArithBinaryOp::Ne, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_relational(&mut self) -> ArithResult {
        let mut lhs = self.parse_shift()?;
        loop {
            self.skip_ws();
            if self.eat("<=", &[]) {
                let rhs = self.parse_shift()?;
                lhs = bin(ArithBinaryOp::Le, lhs, rhs);
            } else if self.eat(">=", &[]) {
                let rhs = self.parse_shift()?;
                lhs = bin(ArithBinaryOp::Ge, lhs, rhs);
            } else if self.peek() == Some('<') && self.peek_at(1) != Some('<') {
                self.bump();
                let rhs = self.parse_shift()?;
                lhs = bin(ArithBinaryOp::Lt, lhs, rhs);
            } else if self.peek() == Some('>') && self.peek_at(1) != Some('>') {
                self.bump();
                let rhs = self.parse_shift()?;
                lhs = bin(ArithBinaryOp::Gt, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_shift(&mut self) -> ArithResult {
        let mut lhs = self.parse_additive()?;
        loop {
            self.skip_ws();
            if self.eat("<<", &['=']) {
                let rhs = self.parse_additive()?;
                lhs = bin(ArithBinaryOp::Shl, lhs, rhs);
            } else if self.eat(">>", &['=']) {
                let rhs = self.parse_additive()?;
                lhs = bin(ArithBinaryOp::Shr, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_additive(&mut self) -> ArithResult {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('+') && self.peek_at(1) != Some('+') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_multiplicative()?;
                lhs = bin(ArithBinaryOp::Add, lhs, rhs);
            } else if self.peek() == Some('-') && self.peek_at(1) != Some('-') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_multiplicative()?;
                lhs = bin(ArithBinaryOp::Sub, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_multiplicative(&mut self) -> ArithResult {
        let mut lhs = self.parse_power()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('*') && self.peek_at(1) != Some('*') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_power()?;
                lhs = bin(ArithBinaryOp::Mul, lhs, rhs);
            } else if self.peek() == Some('/') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_power()?;
                lhs = bin(ArithBinaryOp::Div, lhs, rhs);
            } else if self.peek() == Some('%') && self.peek_at(1) != Some('=') {
                self.bump();
                let rhs = self.parse_power()?;
                lhs = bin(ArithBinaryOp::Mod, lhs, rhs);
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_power(&mut self) -> ArithResult {
        let lhs = self.parse_unary()?;
        self.skip_ws();
        if self.eat("**", &[]) {
            // Right-associative.
            let rhs = self.parse_power()?;
            Ok(bin(ArithBinaryOp::Pow, lhs, rhs))
        } else {
            Ok(lhs)
        }
    }

    fn parse_unary(&mut self) -> ArithResult {
        self.skip_ws();
        if self.eat("++", &[]) {
            self.skip_ws();
            let (name, subscript) = self.parse_lvalue()?;
            return Ok(ArithExpr::IncDec { name, subscript, increment: true, prefix: true });
        }
        if self.eat("--", &[]) {
            self.skip_ws();
            let (name, subscript) = self.parse_lvalue()?;
            return Ok(ArithExpr::IncDec { name, subscript, increment: false, prefix: true });
        }
        match self.peek() {
            Some('+') => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(ArithExpr::Unary { op: ArithUnaryOp::Plus, operand: Box::new(operand) })
            }
            Some('-') => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(ArithExpr::Unary { op: ArithUnaryOp::Minus, operand: Box::new(operand) })
            }
            Some('!') => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(ArithExpr::Unary { op: ArithUnaryOp::Not, operand: Box::new(operand) })
            }
            Some('~') => {
                self.bump();
                let operand = self.parse_unary()?;
                Ok(ArithExpr::Unary { op: ArithUnaryOp::BitNot, operand: Box::new(operand) })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ArithResult {
        let expr = self.parse_primary()?;
        self.skip_ws();
        if let ArithExpr::Var { name, subscript } = &expr {
            if self.eat("++", &[]) {
                return Ok(ArithExpr::IncDec {
                    name: name.clone(),
                    subscript: subscript.clone(),
                    increment: true,
                    prefix: false,
                });
            }
            if self.eat("--", &[]) {
                return Ok(ArithExpr::IncDec {
                    name: name.clone(),
                    subscript: subscript.clone(),
                    increment: false,
                    prefix: false,
                });
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ArithResult {
        self.skip_ws();
        match self.peek() {
            None => Err("operand expected".to_string()),
            Some('(') => {
                self.bump();
                let inner = self.parse_comma()?;
                self.skip_ws();
                if self.bump() != Some(')') {
                    return Err("missing `)'".to_string());
                }
                Ok(inner)
            }
            Some('$') => {
                // $name and ${name} are resolved like bare names; anything
                // fancier belongs in word expansion, not arithmetic.
                self.bump();
                if self.peek() == Some('{') {
                    self.bump();
                    let name = self.read_name();
                    if name.is_empty() || self.bump() != Some('}') {
                        return Err("bad substitution in expression".to_string());
                    }
                    Ok(ArithExpr::Var { name, subscript: None })
                } else if self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    let mut name = String::new();
                    name.push(self.bump().unwrap_or('0'));
                    Ok(ArithExpr::Var { name, subscript: None })
                } else {
                    let name = self.read_name();
                    if name.is_empty() {
                        return Err("operand expected".to_string());
                    }
                    Ok(ArithExpr::Var { name, subscript: None })
                }
            }
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let (name, subscript) = self.parse_lvalue()?;
                Ok(ArithExpr::Var { name, subscript })
            }
            Some('.') => Err("floating point numbers are not supported".to_string()),
            Some(c) => Err(format!("syntax error: operand expected (error token is \"{}\")", c)),
        }
    }

    fn parse_lvalue(&mut self) -> Result<(String, Option<Box<ArithExpr>>), String> {
        let name = self.read_name();
        if name.is_empty() {
            return Err("operand expected".to_string());
        }
        if self.peek() == Some('[') {
            self.bump();
            let idx = self.parse_comma()?;
            self.skip_ws();
            if self.bump() != Some(']') {
                return Err("missing `]'".to_string());
            }
            Ok((name, Some(Box::new(idx))))
        } else {
            Ok((name, None))
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn parse_number(&mut self) -> ArithResult {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '#' || c == '@' || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();

        if self.peek() == Some('.') {
            return Err(format!("{}.: floating point numbers are not supported", text));
        }

        parse_integer_literal(&text).map(ArithExpr::Number)
    }
}

fn bin(op: ArithBinaryOp, lhs: ArithExpr, rhs: ArithExpr) -> ArithExpr {
    ArithExpr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

/// Parse a shell integer literal: decimal, `0` octal, `0x` hex, or
/// `base#digits` with base 2–64 (digits, lowercase, uppercase, `@`, `_`).
pub fn parse_integer_literal(text: &str) -> Result<i64, String> {
    if text.is_empty() {
        return Err("operand expected".to_string());
    }
    if let Some(hash) = text.find('#') {
        let (base_str, digits) = text.split_at(hash);
        let digits = &digits[1..];
        let base: i64 = base_str
            .parse()
            .map_err(|_| format!("{}: invalid arithmetic base", base_str))?;
        if !(2..=64).contains(&base) {
            return Err(format!("{}: invalid arithmetic base (error token is \"{}\")", base_str, text));
        }
        if digits.is_empty() {
            return Err(format!("{}: invalid integer constant", text));
        }
        let mut value: i64 = 0;
        for c in digits.chars() {
            let d = digit_value(c).ok_or_else(|| format!("{}: value too great for base (error token is \"{}\")", text, c))?;
            if d >= base {
                return Err(format!("{}: value too great for base (error token is \"{}\")", text, c));
            }
            value = value.wrapping_mul(base).wrapping_add(d);
        }
        return Ok(value);
    }
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if hex.is_empty() {
            return Err(format!("{}: invalid hexadecimal constant", text));
        }
        return i64::from_str_radix(hex, 16)
            .map_err(|_| format!("{}: invalid hexadecimal constant", text));
    }
    if text.len() > 1 && text.starts_with('0') {
        return i64::from_str_radix(&text[1..], 8)
            .map_err(|_| format!("{}: invalid octal constant", text));
    }
    text.parse::<i64>()
        .map_err(|_| format!("{}: invalid integer constant", text))
}

fn digit_value(c: char) -> Option<i64> {
    match c {
        '0'..='9' => Some(c as i64 - '0' as i64),
        'a'..='z' => Some(c as i64 - 'a' as i64 + 10),
        'A'..='Z' => Some(c as i64 - 'A' as i64 + 36),
        '@' => Some(62),
        '_' => Some(63),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(e: &ArithExpr) -> i64 {
        match e {
            ArithExpr::Number(n) => *n,
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_number_bases() {
        assert_eq!(num(&parse_arith("42")), 42);
        assert_eq!(num(&parse_arith("0x1f")), 31);
        assert_eq!(num(&parse_arith("010")), 8);
        assert_eq!(num(&parse_arith("2#101")), 5);
        assert_eq!(num(&parse_arith("16#ff")), 255);
        assert_eq!(num(&parse_arith("64#_")), 63);
    }

    #[test]
    fn test_parse_precedence_shape() {
        // 1 + 2 * 3 groups as 1 + (2 * 3)
        match parse_arith("1 + 2 * 3") {
            ArithExpr::Binary { op: ArithBinaryOp::Add, rhs, .. } => match *rhs {
                ArithExpr::Binary { op: ArithBinaryOp::Mul, .. } => {}
                other => panic!("rhs should be a product, got {:?}", other),
            },
            other => panic!("expected sum, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignment() {
        match parse_arith("x += 2") {
            ArithExpr::Assign { op: Some(ArithBinaryOp::Add), name, .. } => {
                assert_eq!(name, "x");
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ternary_and_comma() {
        assert!(matches!(parse_arith("a ? 1 : 2"), ArithExpr::Ternary { .. }));
        assert!(matches!(parse_arith("1, 2"), ArithExpr::Comma(_, _)));
    }

    #[test]
    fn test_parse_incdec() {
        assert!(matches!(
            parse_arith("i++"),
            ArithExpr::IncDec { increment: true, prefix: false, .. }
        ));
        assert!(matches!(
            parse_arith("--i"),
            ArithExpr::IncDec { increment: false, prefix: true, .. }
        ));
    }

    #[test]
    fn test_float_is_error() {
        assert!(matches!(parse_arith("1.5 + 2"), ArithExpr::SyntaxError { .. }));
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        assert!(matches!(parse_arith("1 +"), ArithExpr::SyntaxError { .. }));
    }

    #[test]
    fn test_dollar_variable() {
        assert!(matches!(parse_arith("$x + 1"), ArithExpr::Binary { .. }));
        assert!(matches!(parse_arith("${x} + 1"), ArithExpr::Binary { .. }));
    }

    #[test]
    fn test_array_element() {
        match parse_arith("a[i+1]") {
            ArithExpr::Var { name, subscript: Some(_) } => assert_eq!(name, "a"),
            other => panic!("expected array element, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(num(&parse_arith("")), 0);
        assert_eq!(num(&parse_arith("   ")), 0);
    }
}
