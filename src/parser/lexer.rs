//! Lexer
//!
//! Turns source text into a token stream honoring the shell's
//! context-sensitive rules: quoting modes, operator maximal munch,
//! io-numbers, substitutions, and here-document capture. Words come out as
//! typed part sequences so quoting information survives into expansion.
//!
//! Here-doc protocol: after the parser reads a `<<`/`<<-` delimiter word it
//! calls [`Lexer::register_heredoc`]; the lexer captures the body when it
//! consumes the next newline, and the parser patches the bodies into the
//! redirect nodes it built (in registration order).

use std::collections::VecDeque;

use crate::ast::types::{HereDocBody, ProcessSubst, Script, SubstDirection, Word, WordPart};
use crate::bytes::decode_ansi_c;
use crate::parser::arith::parse_arith;
use crate::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Word(Word),
    Op(Op),
    /// `((…))` at command position; carries the inner expression text.
    DLParen(String),
    /// Digits immediately preceding a redirection operator.
    IoNumber(i32),
    Newline,
    Eof,
}

impl Token {
    /// Short rendering for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.as_plain_literal().unwrap_or("word").to_string(),
            Token::Op(op) => op.symbol().to_string(),
            Token::DLParen(_) => "((".to_string(),
            Token::IoNumber(n) => n.to_string(),
            Token::Newline => "newline".to_string(),
            Token::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Pipe,      // |
    PipeAnd,   // |&
    AndAnd,    // &&
    OrOr,      // ||
    Amp,       // &
    Semi,      // ;
    DSemi,     // ;;
    SemiAnd,   // ;&
    DSemiAnd,  // ;;&
    LParen,    // (
    RParen,    // )
    Less,      // <
    Great,     // >
    DGreat,    // >>
    DLess,     // <<
    DLessDash, // <<-
    TLess,     // <<<
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    Clobber,   // >|
    AndGreat,  // &>
    AndDGreat, // &>>
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Pipe => "|",
            Op::PipeAnd => "|&",
            Op::AndAnd => "&&",
            Op::OrOr => "||",
            Op::Amp => "&",
            Op::Semi => ";",
            Op::DSemi => ";;",
            Op::SemiAnd => ";&",
            Op::DSemiAnd => ";;&",
            Op::LParen => "(",
            Op::RParen => ")",
            Op::Less => "<",
            Op::Great => ">",
            Op::DGreat => ">>",
            Op::DLess => "<<",
            Op::DLessDash => "<<-",
            Op::TLess => "<<<",
            Op::LessAnd => "<&",
            Op::GreatAnd => ">&",
            Op::LessGreat => "<>",
            Op::Clobber => ">|",
            Op::AndGreat => "&>",
            Op::AndDGreat => "&>>",
        }
    }
}

struct PendingHeredoc {
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    pending_heredocs: Vec<PendingHeredoc>,
    pub(crate) heredoc_bodies: VecDeque<HereDocBody>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            pending_heredocs: Vec::new(),
            heredoc_bodies: VecDeque::new(),
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(ch) = c {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
            }
        }
        c
    }

    fn eat_str(&mut self, s: &str) -> bool {
        for (i, c) in s.chars().enumerate() {
            if self.peek_at(i) != Some(c) {
                return false;
            }
        }
        for _ in s.chars() {
            self.bump();
        }
        true
    }

    /// The parser calls this right after the delimiter word of a here-doc.
    pub fn register_heredoc(&mut self, delimiter: String, strip_tabs: bool, quoted: bool) {
        self.pending_heredocs.push(PendingHeredoc { delimiter, strip_tabs, quoted });
    }

    /// Blanks, line continuations, comments.
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_blanks();

        let c = match self.peek() {
            None => {
                // Unterminated here-docs at EOF take the rest of the input
                // (which is nothing).
                self.consume_heredoc_bodies()?;
                return Ok(Token::Eof);
            }
            Some(c) => c,
        };

        if c == '\n' {
            self.bump();
            self.consume_heredoc_bodies()?;
            return Ok(Token::Newline);
        }

        // Io-number: digits directly followed by < or >.
        if c.is_ascii_digit() {
            let mut off = 0;
            while self.peek_at(off).map_or(false, |d| d.is_ascii_digit()) {
                off += 1;
            }
            if matches!(self.peek_at(off), Some('<') | Some('>')) {
                let digits: String = self.chars[self.pos..self.pos + off].iter().collect();
                if let Ok(n) = digits.parse::<i32>() {
                    self.pos += off;
                    return Ok(Token::IoNumber(n));
                }
            }
        }

        // `<(…)` / `>(…)` begin a word, not a redirection.
        if (c == '<' || c == '>') && self.peek_at(1) == Some('(') {
            return Ok(Token::Word(self.read_word()?));
        }

        match c {
            '(' if self.peek_at(1) == Some('(') => self.read_double_paren(),
            '|' | '&' | ';' | '<' | '>' | '(' | ')' => self.read_operator(),
            _ => Ok(Token::Word(self.read_word()?)),
        }
    }

    fn read_operator(&mut self) -> Result<Token, ParseError> {
        let table: &[(&str, Op)] = &[
            (";;&", Op::DSemiAnd),
            (";;", Op::DSemi),
            (";&", Op::SemiAnd),
            (";", Op::Semi),
            ("&&", Op::AndAnd),
            ("&>>", Op::AndDGreat),
            ("&>", Op::AndGreat),
            ("&", Op::Amp),
            ("||", Op::OrOr),
            ("|&", Op::PipeAnd),
            ("|", Op::Pipe),
            ("<<<", Op::TLess),
            ("<<-", Op::DLessDash),
            ("<<", Op::DLess),
            ("<&", Op::LessAnd),
            ("<>", Op::LessGreat),
            ("<", Op::Less),
            (">>", Op::DGreat),
            (">&", Op::GreatAnd),
            (">|", Op::Clobber),
            (">", Op::Great),
            ("(", Op::LParen),
            (")", Op::RParen),
        ];
        for (text, op) in table {
            if self.eat_str(text) {
                return Ok(Token::Op(*op));
            }
        }
        Err(ParseError::unexpected(
            self.peek().map(|c| c.to_string()).unwrap_or_default(),
            self.line,
        ))
    }

    /// `((…))`: capture the inner text if the closing parens are adjacent and
    /// the text parses as arithmetic; otherwise fall back to a subshell `(`.
    fn read_double_paren(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        self.bump();
        self.bump();
        let inner_start = self.pos;
        let mut depth = 2;
        let mut prev_close = false;
        while depth > 0 {
            match self.bump() {
                None => {
                    self.pos = start;
                    return Err(ParseError::UnexpectedEof);
                }
                Some('(') => {
                    depth += 1;
                    prev_close = false;
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 && !prev_close {
                        // Closers not adjacent: subshell.
                        self.pos = start + 1;
                        return Ok(Token::Op(Op::LParen));
                    }
                    prev_close = true;
                }
                Some(_) => prev_close = false,
            }
        }
        let inner: String = self.chars[inner_start..self.pos - 2].iter().collect();
        Ok(Token::DLParen(inner))
    }

    // =========================================================================
    // Words
    // =========================================================================

    pub(crate) fn read_word(&mut self) -> Result<Word, ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut lit = String::new();

        macro_rules! flush {
            () => {
                if !lit.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut lit)));
                }
            };
        }

        loop {
            let c = match self.peek() {
                None => break,
                Some(c) => c,
            };
            match c {
                ' ' | '\t' | '\r' | '\n' => break,
                '|' | '&' | ';' | ')' => break,
                '<' | '>' => {
                    if self.peek_at(1) == Some('(') {
                        flush!();
                        parts.push(self.read_process_subst()?);
                    } else {
                        break;
                    }
                }
                '(' => {
                    // Extglob group: previous char is one of ? * + @ !
                    let extglob = lit
                        .chars()
                        .last()
                        .map_or(false, |p| matches!(p, '?' | '*' | '+' | '@' | '!'));
                    if extglob {
                        self.read_group_raw(&mut lit)?;
                    } else {
                        break;
                    }
                }
                '\'' => {
                    flush!();
                    self.bump();
                    parts.push(WordPart::SingleQuoted(self.read_single_quoted()?));
                }
                '"' => {
                    flush!();
                    self.bump();
                    parts.push(WordPart::DoubleQuoted(self.read_double_quoted()?));
                }
                '\\' => {
                    self.bump();
                    match self.peek() {
                        None => lit.push('\\'),
                        Some('\n') => {
                            self.bump();
                        }
                        Some(esc) => {
                            self.bump();
                            flush!();
                            parts.push(WordPart::Escaped(esc.to_string()));
                        }
                    }
                }
                '$' => {
                    self.bump();
                    match self.read_dollar(false)? {
                        Some(part) => {
                            flush!();
                            parts.push(part);
                        }
                        None => lit.push('$'),
                    }
                }
                '`' => {
                    flush!();
                    self.bump();
                    parts.push(self.read_backquote()?);
                }
                '~' if parts.is_empty() && lit.is_empty() => {
                    self.bump();
                    parts.push(self.read_tilde_prefix());
                }
                _ => {
                    self.bump();
                    lit.push(c);
                }
            }
        }

        if !lit.is_empty() {
            parts.push(WordPart::Literal(lit));
        }
        if parts.is_empty() {
            return Err(ParseError::unexpected(
                self.peek().map(|c| c.to_string()).unwrap_or_default(),
                self.line,
            ));
        }
        Ok(Word { parts })
    }

    fn read_tilde_prefix(&mut self) -> WordPart {
        // `~+` / `~-` only when they end the prefix.
        if matches!(self.peek(), Some('+') | Some('-'))
            && matches!(self.peek_at(1), None | Some('/') | Some(' ') | Some('\t') | Some('\n'))
        {
            let c = self.bump().unwrap_or('+');
            return WordPart::Tilde(Some(c.to_string()));
        }
        let mut user = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                user.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if user.is_empty() {
            WordPart::Tilde(None)
        } else {
            WordPart::Tilde(Some(user))
        }
    }

    /// Raw `(...)` group consumed into the literal (extglob patterns).
    fn read_group_raw(&mut self, lit: &mut String) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof),
                Some('(') => {
                    depth += 1;
                    lit.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    lit.push(')');
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some('\'') => {
                    lit.push('\'');
                    let inner = self.read_single_quoted()?;
                    lit.push_str(&inner);
                    lit.push('\'');
                }
                Some(c) => lit.push(c),
            }
        }
    }

    pub(crate) fn read_single_quoted(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof),
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    pub(crate) fn read_double_quoted(&mut self) -> Result<Vec<WordPart>, ParseError> {
        let mut parts: Vec<WordPart> = Vec::new();
        let mut lit = String::new();

        macro_rules! flush {
            () => {
                if !lit.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut lit)));
                }
            };
        }

        loop {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof),
                Some('"') => break,
                Some('\\') => match self.peek() {
                    Some(e @ ('$' | '`' | '"' | '\\')) => {
                        self.bump();
                        flush!();
                        parts.push(WordPart::Escaped(e.to_string()));
                    }
                    Some('\n') => {
                        self.bump();
                    }
                    _ => lit.push('\\'),
                },
                Some('$') => match self.read_dollar(true)? {
                    Some(part) => {
                        flush!();
                        parts.push(part);
                    }
                    None => lit.push('$'),
                },
                Some('`') => {
                    flush!();
                    parts.push(self.read_backquote()?);
                }
                Some(c) => lit.push(c),
            }
        }
        flush!();
        Ok(parts)
    }

    /// `$` already consumed. Returns None if the dollar is literal.
    pub(crate) fn read_dollar(&mut self, in_double_quotes: bool) -> Result<Option<WordPart>, ParseError> {
        match self.peek() {
            None => Ok(None),
            Some('\'') if !in_double_quotes => {
                self.bump();
                let raw = self.read_ansi_c_raw()?;
                Ok(Some(WordPart::Bytes(decode_ansi_c(&raw))))
            }
            Some('"') if !in_double_quotes => {
                // `$"…"` locale quoting degrades to plain double quotes.
                self.bump();
                Ok(Some(WordPart::DoubleQuoted(self.read_double_quoted()?)))
            }
            Some('(') if self.peek_at(1) == Some('(') => {
                let save = self.pos;
                match self.read_arith_subst() {
                    Ok(part) => Ok(Some(part)),
                    Err(_) => {
                        // `$( (a); (b) )` style: command substitution after all.
                        self.pos = save;
                        self.bump();
                        let script = self.read_command_subst_body()?;
                        Ok(Some(WordPart::CommandSubst(crate::ast::types::CommandSubst {
                            script,
                            backquoted: false,
                        })))
                    }
                }
            }
            Some('(') => {
                self.bump();
                let script = self.read_command_subst_body()?;
                Ok(Some(WordPart::CommandSubst(crate::ast::types::CommandSubst {
                    script,
                    backquoted: false,
                })))
            }
            Some('{') => {
                self.bump();
                self.read_braced_parameter().map(Some)
            }
            Some(c) if c.is_ascii_digit() => {
                self.bump();
                Ok(Some(WordPart::Parameter(crate::ast::types::ParamExpansion {
                    name: c.to_string(),
                    index: None,
                    op: None,
                })))
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        name.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Ok(Some(WordPart::Parameter(crate::ast::types::ParamExpansion {
                    name,
                    index: None,
                    op: None,
                })))
            }
            Some(c @ ('?' | '@' | '*' | '$' | '!' | '#' | '-')) => {
                self.bump();
                Ok(Some(WordPart::Parameter(crate::ast::types::ParamExpansion {
                    name: c.to_string(),
                    index: None,
                    op: None,
                })))
            }
            Some(_) => Ok(None),
        }
    }

    /// Body of `$'…'` with the escape sequences still encoded.
    fn read_ansi_c_raw(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof),
                Some('\\') => {
                    out.push('\\');
                    match self.bump() {
                        None => return Err(ParseError::UnexpectedEof),
                        Some(c) => out.push(c),
                    }
                }
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    /// `$((…))` with `((` pending at the current position.
    fn read_arith_subst(&mut self) -> Result<WordPart, ParseError> {
        self.bump();
        self.bump();
        let inner_start = self.pos;
        let mut depth = 2;
        let mut prev_close = false;
        while depth > 0 {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof),
                Some('(') => {
                    depth += 1;
                    prev_close = false;
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 && !prev_close {
                        return Err(ParseError::unexpected(")".to_string(), self.line));
                    }
                    prev_close = true;
                }
                Some(_) => prev_close = false,
            }
        }
        let inner: String = self.chars[inner_start..self.pos - 2].iter().collect();
        Ok(WordPart::ArithSubst(parse_arith(&inner)))
    }

    /// Balanced scan of a `$(…)` body (opening paren consumed) and recursive
    /// parse of the inner text.
    fn read_command_subst_body(&mut self) -> Result<Script, ParseError> {
        let inner = self.scan_balanced_paren()?;
        super::parse(&inner)
    }

    fn read_process_subst(&mut self) -> Result<WordPart, ParseError> {
        let direction = if self.bump() == Some('<') {
            SubstDirection::Read
        } else {
            SubstDirection::Write
        };
        self.bump(); // (
        let inner = self.scan_balanced_paren()?;
        let script = super::parse(&inner)?;
        Ok(WordPart::ProcessSubst(ProcessSubst { direction, script }))
    }

    /// Scan to the matching `)` with quote and nesting awareness; returns the
    /// inner text with the closer consumed.
    fn scan_balanced_paren(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let mut depth = 1usize;
        let mut prev_blank = true;
        while let Some(c) = self.bump() {
            match c {
                '(' => {
                    depth += 1;
                    prev_blank = false;
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.chars[start..self.pos - 1].iter().collect());
                    }
                    prev_blank = false;
                }
                '\'' => {
                    self.read_single_quoted()?;
                    prev_blank = false;
                }
                '"' => {
                    // Skip the quoted span; nested substitutions recurse.
                    loop {
                        match self.bump() {
                            None => return Err(ParseError::UnexpectedEof),
                            Some('"') => break,
                            Some('\\') => {
                                self.bump();
                            }
                            Some('$') if self.peek() == Some('(') => {
                                self.bump();
                                self.scan_balanced_paren()?;
                            }
                            Some(_) => {}
                        }
                    }
                    prev_blank = false;
                }
                '\\' => {
                    self.bump();
                    prev_blank = false;
                }
                '#' if prev_blank => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '`' => {
                    loop {
                        match self.bump() {
                            None => return Err(ParseError::UnexpectedEof),
                            Some('`') => break,
                            Some('\\') => {
                                self.bump();
                            }
                            Some(_) => {}
                        }
                    }
                    prev_blank = false;
                }
                c => prev_blank = c == ' ' || c == '\t' || c == '\n' || c == ';',
            }
        }
        Err(ParseError::UnexpectedEof)
    }

    // Small visibility shims for the `${…}` sub-grammar in `word.rs`
    // (inherent impls there cannot reach private members of this module).
    pub(crate) fn peek_word_char(&self) -> Option<char> {
        self.peek()
    }

    pub(crate) fn peek_is(&self, c: char) -> bool {
        self.peek() == Some(c)
    }

    pub(crate) fn peek_at_is(&self, off: usize, c: char) -> bool {
        self.peek_at(off) == Some(c)
    }

    pub(crate) fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    pub(crate) fn bump_char(&mut self) -> Option<char> {
        self.bump()
    }

    pub(crate) fn read_backquote_pub(&mut self) -> Result<WordPart, ParseError> {
        self.read_backquote()
    }

    fn read_backquote(&mut self) -> Result<WordPart, ParseError> {
        let mut inner = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::UnexpectedEof),
                Some('`') => break,
                Some('\\') => match self.peek() {
                    Some(e @ ('$' | '`' | '\\')) => {
                        self.bump();
                        inner.push(e);
                    }
                    _ => inner.push('\\'),
                },
                Some(c) => inner.push(c),
            }
        }
        let script = super::parse(&inner)?;
        Ok(WordPart::CommandSubst(crate::ast::types::CommandSubst { script, backquoted: true }))
    }

    // =========================================================================
    // Here-documents
    // =========================================================================

    fn consume_heredoc_bodies(&mut self) -> Result<(), ParseError> {
        if self.pending_heredocs.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending_heredocs);
        for spec in pending {
            let mut body = String::new();
            loop {
                if self.peek().is_none() {
                    break;
                }
                let mut line = String::new();
                while let Some(c) = self.peek() {
                    self.bump();
                    if c == '\n' {
                        break;
                    }
                    line.push(c);
                }
                let stripped = if spec.strip_tabs {
                    line.trim_start_matches('\t').to_string()
                } else {
                    line.clone()
                };
                if stripped == spec.delimiter {
                    break;
                }
                body.push_str(&stripped);
                body.push('\n');
            }
            let word = if spec.quoted {
                Word { parts: vec![WordPart::SingleQuoted(body)] }
            } else {
                parse_heredoc_text(&body)?
            };
            self.heredoc_bodies.push_back(HereDocBody {
                delimiter: spec.delimiter,
                body: word,
                quoted: spec.quoted,
            });
        }
        Ok(())
    }

    /// Regex operand of `[[ x =~ … ]]`: read raw until unquoted whitespace,
    /// letting `( ) |` and friends through as pattern characters.
    pub fn next_regex_word(&mut self) -> Result<Word, ParseError> {
        self.skip_blanks();
        let mut parts: Vec<WordPart> = Vec::new();
        let mut lit = String::new();

        macro_rules! flush {
            () => {
                if !lit.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut lit)));
                }
            };
        }

        loop {
            let c = match self.peek() {
                None => break,
                Some(c) => c,
            };
            if c == ' ' || c == '\t' || c == '\n' {
                break;
            }
            if c == ']' && self.peek_at(1) == Some(']') {
                break;
            }
            match c {
                '\'' => {
                    flush!();
                    self.bump();
                    parts.push(WordPart::SingleQuoted(self.read_single_quoted()?));
                }
                '"' => {
                    flush!();
                    self.bump();
                    parts.push(WordPart::DoubleQuoted(self.read_double_quoted()?));
                }
                '\\' => {
                    self.bump();
                    match self.bump() {
                        None => lit.push('\\'),
                        Some(e) => {
                            flush!();
                            parts.push(WordPart::Escaped(e.to_string()));
                        }
                    }
                }
                '$' => {
                    self.bump();
                    match self.read_dollar(false)? {
                        Some(part) => {
                            flush!();
                            parts.push(part);
                        }
                        None => lit.push('$'),
                    }
                }
                _ => {
                    self.bump();
                    lit.push(c);
                }
            }
        }
        if !lit.is_empty() {
            parts.push(WordPart::Literal(lit));
        }
        if parts.is_empty() {
            return Err(ParseError::unexpected("]]".to_string(), self.line));
        }
        Ok(Word { parts })
    }
}

/// Parse a here-doc body for deferred expansion: like double-quoted content,
/// but `"` is an ordinary character and only ``$ ` \``/newline are escapable.
pub(crate) fn parse_heredoc_text(text: &str) -> Result<Word, ParseError> {
    let mut lx = Lexer::new(text);
    let mut parts: Vec<WordPart> = Vec::new();
    let mut lit = String::new();

    macro_rules! flush {
        () => {
            if !lit.is_empty() {
                parts.push(WordPart::Literal(std::mem::take(&mut lit)));
            }
        };
    }

    loop {
        match lx.bump() {
            None => break,
            Some('\\') => match lx.peek() {
                Some(e @ ('$' | '`' | '\\')) => {
                    lx.bump();
                    flush!();
                    parts.push(WordPart::Escaped(e.to_string()));
                }
                Some('\n') => {
                    lx.bump();
                }
                _ => lit.push('\\'),
            },
            Some('$') => match lx.read_dollar(true)? {
                Some(part) => {
                    flush!();
                    parts.push(part);
                }
                None => lit.push('$'),
            },
            Some('`') => {
                flush!();
                parts.push(lx.read_backquote()?);
            }
            Some(c) => lit.push(c),
        }
    }
    flush!();
    if parts.is_empty() {
        parts.push(WordPart::Literal(String::new()));
    }
    Ok(Word { parts })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lx = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lx.next_token().unwrap();
            let done = t == Token::Eof;
            out.push(t);
            if done {
                break;
            }
        }
        out
    }

    fn word_text(t: &Token) -> &str {
        match t {
            Token::Word(w) => w.as_plain_literal().unwrap_or("<complex>"),
            _ => panic!("not a word: {:?}", t),
        }
    }

    #[test]
    fn test_simple_tokens() {
        let ts = tokens("echo hello world");
        assert_eq!(ts.len(), 4);
        assert_eq!(word_text(&ts[0]), "echo");
        assert_eq!(word_text(&ts[1]), "hello");
        assert_eq!(word_text(&ts[2]), "world");
    }

    #[test]
    fn test_operators_maximal_munch() {
        let ts = tokens("a && b || c; d | e |& f");
        let ops: Vec<_> = ts
            .iter()
            .filter_map(|t| match t {
                Token::Op(op) => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![Op::AndAnd, Op::OrOr, Op::Semi, Op::Pipe, Op::PipeAnd]);
    }

    #[test]
    fn test_io_number() {
        let ts = tokens("cmd 2>&1");
        assert!(matches!(ts[1], Token::IoNumber(2)));
        assert!(matches!(ts[2], Token::Op(Op::GreatAnd)));
        assert_eq!(word_text(&ts[3]), "1");
    }

    #[test]
    fn test_io_number_not_part_of_word() {
        // `echo 2` keeps the 2 as a word.
        let ts = tokens("echo 2");
        assert_eq!(word_text(&ts[1]), "2");
    }

    #[test]
    fn test_single_quotes() {
        let ts = tokens("echo 'a b'");
        match &ts[1] {
            Token::Word(w) => {
                assert_eq!(w.parts, vec![WordPart::SingleQuoted("a b".into())]);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_double_quotes_with_var() {
        let ts = tokens(r#"echo "x $y z""#);
        match &ts[1] {
            Token::Word(w) => match &w.parts[0] {
                WordPart::DoubleQuoted(inner) => {
                    assert_eq!(inner.len(), 3);
                    assert!(matches!(&inner[1], WordPart::Parameter(p) if p.name == "y"));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_ansi_c_quoting_bytes() {
        let ts = tokens(r"echo $'\xff\n'");
        match &ts[1] {
            Token::Word(w) => {
                assert_eq!(w.parts, vec![WordPart::Bytes(vec![0xff, b'\n'])]);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_command_substitution_nested() {
        let ts = tokens(r#"echo $(echo "$(pwd)")"#);
        match &ts[1] {
            Token::Word(w) => assert!(matches!(&w.parts[0], WordPart::CommandSubst(_))),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_arith_subst() {
        let ts = tokens("echo $((1 + 2))");
        match &ts[1] {
            Token::Word(w) => assert!(matches!(&w.parts[0], WordPart::ArithSubst(_))),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_double_paren_command() {
        let ts = tokens("((x = 1 + 2))");
        assert!(matches!(&ts[0], Token::DLParen(t) if t.contains("x = 1 + 2")));
    }

    #[test]
    fn test_comment_skipped() {
        let ts = tokens("echo hi # comment\n");
        assert_eq!(ts.len(), 4); // echo, hi, newline, eof
        assert!(matches!(ts[2], Token::Newline));
    }

    #[test]
    fn test_escaped_char() {
        let ts = tokens(r"echo a\ b");
        match &ts[1] {
            Token::Word(w) => {
                assert_eq!(w.parts.len(), 3);
                assert!(matches!(&w.parts[1], WordPart::Escaped(s) if s == " "));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_heredoc_capture() {
        let mut lx = Lexer::new("<<EOF\nline1\nline2\nEOF\n");
        let t = lx.next_token().unwrap();
        assert!(matches!(t, Token::Op(Op::DLess)));
        let delim = lx.next_token().unwrap();
        assert_eq!(word_text(&delim), "EOF");
        lx.register_heredoc("EOF".into(), false, false);
        let t = lx.next_token().unwrap();
        assert!(matches!(t, Token::Newline));
        let body = lx.heredoc_bodies.pop_front().unwrap();
        assert_eq!(body.body.as_plain_literal(), Some("line1\nline2\n"));
    }

    #[test]
    fn test_heredoc_strip_tabs() {
        let mut lx = Lexer::new("<<-EOF\n\tindented\n\tEOF\n");
        lx.next_token().unwrap();
        lx.next_token().unwrap();
        lx.register_heredoc("EOF".into(), true, true);
        lx.next_token().unwrap();
        let body = lx.heredoc_bodies.pop_front().unwrap();
        match &body.body.parts[0] {
            WordPart::SingleQuoted(s) => assert_eq!(s, "indented\n"),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_process_subst() {
        let ts = tokens("diff <(sort a) <(sort b)");
        match &ts[1] {
            Token::Word(w) => {
                assert!(matches!(&w.parts[0], WordPart::ProcessSubst(p) if p.direction == SubstDirection::Read));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_tilde_prefix() {
        let ts = tokens("cd ~/src ~user/x");
        match &ts[1] {
            Token::Word(w) => assert!(matches!(&w.parts[0], WordPart::Tilde(None))),
            other => panic!("{:?}", other),
        }
        match &ts[2] {
            Token::Word(w) => {
                assert!(matches!(&w.parts[0], WordPart::Tilde(Some(u)) if u == "user"));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_extglob_group_in_word() {
        let ts = tokens("ls @(a|b).txt");
        match &ts[1] {
            Token::Word(w) => {
                assert_eq!(w.as_plain_literal(), Some("@(a|b).txt"));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_backquote_subst() {
        let ts = tokens("echo `pwd`");
        match &ts[1] {
            Token::Word(w) => {
                assert!(matches!(&w.parts[0], WordPart::CommandSubst(c) if c.backquoted));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_line_continuation() {
        let ts = tokens("echo a\\\nb");
        assert_eq!(word_text(&ts[1]), "ab");
    }
}
