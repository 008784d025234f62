//! Statement Parser
//!
//! Recursive descent over the token stream. Reserved words are recognized
//! only at command position; and/or lists are left-associative at equal
//! precedence, separated from `;` and `&`; assignments are only recognized
//! before the first command word. Here-doc bodies captured by the lexer are
//! patched into their redirect nodes in one pass when parsing finishes.

use crate::ast::types::*;
use crate::parser::lexer::{Lexer, Op, Token};
use crate::parser::ParseError;

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Script, ParseError> {
    let mut parser = Parser::new(source);
    let mut script = Script { statements: parser.parse_statements(&StopSet::none())? };
    match parser.peek()? {
        Token::Eof => {}
        other => return Err(ParseError::unexpected(other.describe(), parser.line())),
    }
    fill_heredocs(&mut script.statements, &mut parser.lexer.heredoc_bodies);
    Ok(script)
}

/// Reserved words, recognized only at command position.
const RESERVED: &[&str] = &[
    "if", "then", "elif", "else", "fi", "while", "until", "for", "do", "done", "case", "esac",
    "in", "select", "function", "{", "}", "[[", "]]", "!", "time",
];

/// Where a statement list stops (caller consumes the stopper).
struct StopSet {
    words: &'static [&'static str],
    ops: &'static [Op],
}

impl StopSet {
    fn none() -> Self {
        StopSet { words: &[], ops: &[] }
    }
    fn words(words: &'static [&'static str]) -> Self {
        StopSet { words, ops: &[] }
    }
}

pub struct Parser {
    lexer: Lexer,
    tok: Option<Token>,
    tok_line: u32,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self { lexer: Lexer::new(source), tok: None, tok_line: 1 }
    }

    fn line(&self) -> u32 {
        self.tok_line
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.tok.is_none() {
            self.tok_line = self.lexer.line();
            self.tok = Some(self.lexer.next_token()?);
        }
        Ok(self.tok.as_ref().expect("lookahead just filled"))
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        match self.tok.take() {
            Some(t) => Ok(t),
            None => {
                self.tok_line = self.lexer.line();
                self.lexer.next_token()
            }
        }
    }

    fn peek_op(&mut self) -> Result<Option<Op>, ParseError> {
        Ok(match self.peek()? {
            Token::Op(op) => Some(*op),
            _ => None,
        })
    }

    fn eat_op(&mut self, op: Op) -> Result<bool, ParseError> {
        if self.peek_op()? == Some(op) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Plain-literal text of the lookahead word, if it is one.
    fn peek_word_text(&mut self) -> Result<Option<String>, ParseError> {
        Ok(match self.peek()? {
            Token::Word(w) => w.as_plain_literal().map(|s| s.to_string()),
            _ => None,
        })
    }

    fn peek_reserved(&mut self) -> Result<Option<String>, ParseError> {
        Ok(self
            .peek_word_text()?
            .filter(|t| RESERVED.contains(&t.as_str())))
    }

    fn eat_reserved(&mut self, word: &str) -> Result<bool, ParseError> {
        if self.peek_word_text()?.as_deref() == Some(word) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_reserved(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_reserved(word)? {
            Ok(())
        } else {
            let desc = self.peek()?.describe();
            Err(ParseError::unexpected(desc, self.line()))
        }
    }

    fn expect_op(&mut self, op: Op) -> Result<(), ParseError> {
        if self.eat_op(op)? {
            Ok(())
        } else {
            let desc = self.peek()?.describe();
            Err(ParseError::unexpected(desc, self.line()))
        }
    }

    fn expect_word(&mut self) -> Result<Word, ParseError> {
        match self.advance()? {
            Token::Word(w) => Ok(w),
            other => Err(ParseError::unexpected(other.describe(), self.line())),
        }
    }

    fn skip_newlines(&mut self) -> Result<(), ParseError> {
        while matches!(self.peek()?, Token::Newline) {
            self.advance()?;
        }
        Ok(())
    }

    // =========================================================================
    // Statement lists
    // =========================================================================

    fn parse_statements(&mut self, stop: &StopSet) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines()?;
            match self.peek()? {
                Token::Eof => break,
                Token::Op(op) if stop.ops.contains(op) => break,
                Token::Op(Op::RParen) if stop.ops.is_empty() && !statements.is_empty() => break,
                Token::Word(w) => {
                    if let Some(text) = w.as_plain_literal() {
                        if stop.words.contains(&text) {
                            break;
                        }
                    }
                }
                _ => {}
            }
            // Case bodies stop at their terminators even without explicit ops.
            if matches!(self.peek()?, Token::Op(Op::DSemi | Op::SemiAnd | Op::DSemiAnd)) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        self.peek()?;
        let line = self.line();
        let mut pipelines = vec![self.parse_pipeline()?];
        let mut operators = Vec::new();
        loop {
            match self.peek_op()? {
                Some(Op::AndAnd) => {
                    self.advance()?;
                    self.skip_newlines()?;
                    operators.push(AndOr::And);
                    pipelines.push(self.parse_pipeline()?);
                }
                Some(Op::OrOr) => {
                    self.advance()?;
                    self.skip_newlines()?;
                    operators.push(AndOr::Or);
                    pipelines.push(self.parse_pipeline()?);
                }
                _ => break,
            }
        }
        let mut background = false;
        if self.eat_op(Op::Amp)? {
            background = true;
        } else {
            let _ = self.eat_op(Op::Semi)?;
        }
        Ok(Statement { pipelines, operators, background, line })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut negated = false;
        let mut timed = false;
        loop {
            if self.peek_word_text()?.as_deref() == Some("!") {
                self.advance()?;
                negated = !negated;
            } else if self.peek_word_text()?.as_deref() == Some("time") {
                self.advance()?;
                timed = true;
                if self.peek_word_text()?.as_deref() == Some("-p") {
                    self.advance()?;
                }
            } else {
                break;
            }
        }

        let mut elements = vec![PipelineElement {
            command: self.parse_command()?,
            stderr_piped: false,
        }];
        loop {
            match self.peek_op()? {
                Some(Op::Pipe) => {
                    self.advance()?;
                    self.skip_newlines()?;
                    elements.push(PipelineElement {
                        command: self.parse_command()?,
                        stderr_piped: false,
                    });
                }
                Some(Op::PipeAnd) => {
                    self.advance()?;
                    self.skip_newlines()?;
                    if let Some(prev) = elements.last_mut() {
                        prev.stderr_piped = true;
                    }
                    elements.push(PipelineElement {
                        command: self.parse_command()?,
                        stderr_piped: false,
                    });
                }
                _ => break,
            }
        }
        Ok(Pipeline { elements, negated, timed })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn parse_command(&mut self) -> Result<CommandNode, ParseError> {
        match self.peek()? {
            Token::DLParen(_) => {
                let text = match self.advance()? {
                    Token::DLParen(t) => t,
                    _ => unreachable!(),
                };
                let expr = crate::parser::arith::parse_arith(&text);
                // `((a); (b))` lexes like arithmetic but is a subshell whose
                // first statement is parenthesized.
                if matches!(expr, ArithExpr::SyntaxError { .. })
                    && text.trim_start().starts_with('(')
                {
                    if let Ok(script) = parse(&text) {
                        let redirects = self.parse_trailing_redirects()?;
                        return Ok(CommandNode::Compound(CompoundCommand::Subshell(Subshell {
                            body: script.statements,
                            redirects,
                        })));
                    }
                }
                let redirects = self.parse_trailing_redirects()?;
                return Ok(CommandNode::Compound(CompoundCommand::Arithmetic(ArithCommand {
                    expr,
                    redirects,
                })));
            }
            Token::Op(Op::LParen) => {
                self.advance()?;
                let body = self.parse_statements(&StopSet { words: &[], ops: &[Op::RParen] })?;
                self.expect_op(Op::RParen)?;
                let redirects = self.parse_trailing_redirects()?;
                return Ok(CommandNode::Compound(CompoundCommand::Subshell(Subshell {
                    body,
                    redirects,
                })));
            }
            _ => {}
        }

        if let Some(word) = self.peek_reserved()? {
            match word.as_str() {
                "if" => return self.parse_if().map(CommandNode::Compound),
                "while" => return self.parse_while(false).map(CommandNode::Compound),
                "until" => return self.parse_while(true).map(CommandNode::Compound),
                "for" => return self.parse_for().map(CommandNode::Compound),
                "select" => return self.parse_select().map(CommandNode::Compound),
                "case" => return self.parse_case().map(CommandNode::Compound),
                "{" => {
                    self.advance()?;
                    let body = self.parse_statements(&StopSet::words(&["}"]))?;
                    self.expect_reserved("}")?;
                    let redirects = self.parse_trailing_redirects()?;
                    return Ok(CommandNode::Compound(CompoundCommand::Group(Group {
                        body,
                        redirects,
                    })));
                }
                "[[" => return self.parse_cond_command().map(CommandNode::Compound),
                "function" => {
                    self.advance()?;
                    let name_word = self.expect_word()?;
                    let name = word_literal_text(&name_word);
                    if self.eat_op(Op::LParen)? {
                        self.expect_op(Op::RParen)?;
                    }
                    self.skip_newlines()?;
                    let body = self.parse_function_body()?;
                    let redirects = self.parse_trailing_redirects()?;
                    return Ok(CommandNode::FunctionDef(FunctionDef {
                        name,
                        body: Box::new(body),
                        redirects,
                    }));
                }
                _ => {
                    // `then`, `done`, … at command position: caller's problem.
                    return Err(ParseError::unexpected(word, self.line()));
                }
            }
        }

        // `name () compound` function definition?
        if let Some(text) = self.peek_word_text()? {
            if is_identifier(&text) {
                let word = self.expect_word()?;
                if self.eat_op(Op::LParen)? {
                    self.expect_op(Op::RParen)?;
                    self.skip_newlines()?;
                    let body = self.parse_function_body()?;
                    let redirects = self.parse_trailing_redirects()?;
                    return Ok(CommandNode::FunctionDef(FunctionDef {
                        name: text,
                        body: Box::new(body),
                        redirects,
                    }));
                }
                return self.parse_simple_command(Some(word)).map(CommandNode::Simple);
            }
        }

        match self.peek()? {
            Token::Word(_) | Token::IoNumber(_) => {
                self.parse_simple_command(None).map(CommandNode::Simple)
            }
            Token::Op(op) if is_redirect_op(*op) => {
                self.parse_simple_command(None).map(CommandNode::Simple)
            }
            other => Err(ParseError::unexpected(other.describe(), self.line())),
        }
    }

    fn parse_function_body(&mut self) -> Result<CompoundCommand, ParseError> {
        match self.parse_command()? {
            CommandNode::Compound(c) => Ok(c),
            _ => Err(ParseError::unexpected("function body".to_string(), self.line())),
        }
    }

    fn parse_simple_command(&mut self, first: Option<Word>) -> Result<SimpleCommand, ParseError> {
        let line = self.line();
        let mut assignments: Vec<Assignment> = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut redirects: Vec<Redirect> = Vec::new();

        let mut pending = first;
        loop {
            if let Some(word) = pending.take() {
                self.absorb_command_word(word, &mut assignments, &mut words)?;
                continue;
            }
            match self.peek()? {
                Token::IoNumber(_) => {
                    let fd = match self.advance()? {
                        Token::IoNumber(n) => n,
                        _ => unreachable!(),
                    };
                    redirects.push(self.parse_redirect(Some(fd))?);
                }
                Token::Op(op) if is_redirect_op(*op) => {
                    redirects.push(self.parse_redirect(None)?);
                }
                Token::Word(_) => {
                    let word = self.expect_word()?;
                    self.absorb_command_word(word, &mut assignments, &mut words)?;
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            let desc = self.peek()?.describe();
            return Err(ParseError::unexpected(desc, self.line()));
        }
        Ok(SimpleCommand { assignments, words, redirects, line })
    }

    fn absorb_command_word(
        &mut self,
        word: Word,
        assignments: &mut Vec<Assignment>,
        words: &mut Vec<Word>,
    ) -> Result<(), ParseError> {
        if words.is_empty() {
            if let Some(mut assignment) = split_assignment(&word) {
                if assignment.value.is_none() && self.peek_op()? == Some(Op::LParen) {
                    assignment.array = Some(self.parse_array_literal()?);
                }
                assignments.push(assignment);
                return Ok(());
            }
        }
        words.push(word);
        Ok(())
    }

    fn parse_array_literal(&mut self) -> Result<Vec<Word>, ParseError> {
        self.expect_op(Op::LParen)?;
        let mut elements = Vec::new();
        loop {
            self.skip_newlines()?;
            if self.eat_op(Op::RParen)? {
                return Ok(elements);
            }
            elements.push(self.expect_word()?);
        }
    }

    fn parse_trailing_redirects(&mut self) -> Result<Vec<Redirect>, ParseError> {
        let mut redirects = Vec::new();
        loop {
            match self.peek()? {
                Token::IoNumber(_) => {
                    let fd = match self.advance()? {
                        Token::IoNumber(n) => n,
                        _ => unreachable!(),
                    };
                    redirects.push(self.parse_redirect(Some(fd))?);
                }
                Token::Op(op) if is_redirect_op(*op) => {
                    redirects.push(self.parse_redirect(None)?);
                }
                _ => return Ok(redirects),
            }
        }
    }

    fn parse_redirect(&mut self, fd: Option<i32>) -> Result<Redirect, ParseError> {
        let op_tok = match self.advance()? {
            Token::Op(op) => op,
            other => return Err(ParseError::unexpected(other.describe(), self.line())),
        };
        let op = match op_tok {
            Op::Less => RedirectOp::Read,
            Op::Great => RedirectOp::Write,
            Op::Clobber => RedirectOp::Clobber,
            Op::DGreat => RedirectOp::Append,
            Op::LessGreat => RedirectOp::ReadWrite,
            Op::LessAnd => RedirectOp::DupIn,
            Op::GreatAnd => RedirectOp::DupOut,
            Op::TLess => RedirectOp::HereString,
            Op::AndGreat => RedirectOp::AndWrite,
            Op::AndDGreat => RedirectOp::AndAppend,
            Op::DLess | Op::DLessDash => {
                let delim_word = self.expect_word()?;
                let delimiter = word_literal_text(&delim_word);
                let quoted = delim_word.has_quoting();
                let strip_tabs = op_tok == Op::DLessDash;
                self.lexer.register_heredoc(delimiter.clone(), strip_tabs, quoted);
                return Ok(Redirect {
                    fd,
                    op: RedirectOp::HereDoc { strip_tabs },
                    target: RedirectTarget::HereDoc(HereDocBody {
                        delimiter,
                        body: Word { parts: Vec::new() },
                        quoted,
                    }),
                });
            }
            other => return Err(ParseError::unexpected(other.symbol().to_string(), self.line())),
        };
        let target = self.expect_word()?;
        Ok(Redirect { fd, op, target: RedirectTarget::Word(target) })
    }

    // =========================================================================
    // Compound commands
    // =========================================================================

    fn parse_body(&mut self, stop: &'static [&'static str]) -> Result<Vec<Statement>, ParseError> {
        let body = self.parse_statements(&StopSet::words(stop))?;
        if body.is_empty() {
            let desc = self.peek()?.describe();
            return Err(ParseError::unexpected(desc, self.line()));
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> Result<CompoundCommand, ParseError> {
        self.expect_reserved("if")?;
        let condition = self.parse_body(&["then"])?;
        self.expect_reserved("then")?;
        let body = self.parse_body(&["elif", "else", "fi"])?;
        let mut clauses = vec![IfClause { condition, body }];
        let mut else_body = None;
        loop {
            if self.eat_reserved("elif")? {
                let condition = self.parse_body(&["then"])?;
                self.expect_reserved("then")?;
                let body = self.parse_body(&["elif", "else", "fi"])?;
                clauses.push(IfClause { condition, body });
            } else if self.eat_reserved("else")? {
                else_body = Some(self.parse_body(&["fi"])?);
            } else {
                break;
            }
        }
        self.expect_reserved("fi")?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommand::If(IfCommand { clauses, else_body, redirects }))
    }

    fn parse_while(&mut self, until: bool) -> Result<CompoundCommand, ParseError> {
        self.advance()?; // while / until
        let condition = self.parse_body(&["do"])?;
        self.expect_reserved("do")?;
        let body = self.parse_body(&["done"])?;
        self.expect_reserved("done")?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommand::While(WhileCommand { condition, body, until, redirects }))
    }

    fn parse_for(&mut self) -> Result<CompoundCommand, ParseError> {
        self.expect_reserved("for")?;

        if let Token::DLParen(_) = self.peek()? {
            let text = match self.advance()? {
                Token::DLParen(t) => t,
                _ => unreachable!(),
            };
            let (init, condition, step) = split_cstyle_header(&text, self.line())?;
            let _ = self.eat_op(Op::Semi)?;
            self.skip_newlines()?;
            self.expect_reserved("do")?;
            let body = self.parse_body(&["done"])?;
            self.expect_reserved("done")?;
            let redirects = self.parse_trailing_redirects()?;
            return Ok(CompoundCommand::CStyleFor(CStyleForCommand {
                init,
                condition,
                step,
                body,
                redirects,
            }));
        }

        let name_word = self.expect_word()?;
        let var = word_literal_text(&name_word);
        if !is_identifier(&var) {
            return Err(ParseError::unexpected(var, self.line()));
        }
        let words = self.parse_in_words()?;
        self.expect_reserved("do")?;
        let body = self.parse_body(&["done"])?;
        self.expect_reserved("done")?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommand::For(ForCommand { var, words, body, redirects }))
    }

    fn parse_select(&mut self) -> Result<CompoundCommand, ParseError> {
        self.expect_reserved("select")?;
        let name_word = self.expect_word()?;
        let var = word_literal_text(&name_word);
        if !is_identifier(&var) {
            return Err(ParseError::unexpected(var, self.line()));
        }
        let words = self.parse_in_words()?;
        self.expect_reserved("do")?;
        let body = self.parse_body(&["done"])?;
        self.expect_reserved("done")?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommand::Select(SelectCommand { var, words, body, redirects }))
    }

    /// The `[in words…]` clause of for/select, up to and not including `do`.
    fn parse_in_words(&mut self) -> Result<Option<Vec<Word>>, ParseError> {
        let _ = self.eat_op(Op::Semi)?;
        self.skip_newlines()?;
        if !self.eat_reserved("in")? {
            return Ok(None);
        }
        let mut words = Vec::new();
        loop {
            match self.peek()? {
                Token::Word(_) => words.push(self.expect_word()?),
                _ => break,
            }
        }
        let _ = self.eat_op(Op::Semi)?;
        self.skip_newlines()?;
        Ok(Some(words))
    }

    fn parse_case(&mut self) -> Result<CompoundCommand, ParseError> {
        self.expect_reserved("case")?;
        let word = self.expect_word()?;
        self.skip_newlines()?;
        self.expect_reserved("in")?;
        self.skip_newlines()?;

        let mut arms = Vec::new();
        loop {
            if self.eat_reserved("esac")? {
                break;
            }
            let _ = self.eat_op(Op::LParen)?;
            let mut patterns = vec![self.expect_word()?];
            while self.eat_op(Op::Pipe)? {
                patterns.push(self.expect_word()?);
            }
            self.expect_op(Op::RParen)?;
            self.skip_newlines()?;
            let body = self.parse_statements(&StopSet::words(&["esac"]))?;
            let terminator = match self.peek_op()? {
                Some(Op::DSemi) => {
                    self.advance()?;
                    CaseTerminator::Break
                }
                Some(Op::SemiAnd) => {
                    self.advance()?;
                    CaseTerminator::FallThrough
                }
                Some(Op::DSemiAnd) => {
                    self.advance()?;
                    CaseTerminator::Continue
                }
                _ => CaseTerminator::Break,
            };
            self.skip_newlines()?;
            arms.push(CaseArm { patterns, body, terminator });
        }
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommand::Case(CaseCommand { word, arms, redirects }))
    }

    // =========================================================================
    // [[ … ]]
    // =========================================================================

    fn parse_cond_command(&mut self) -> Result<CompoundCommand, ParseError> {
        self.expect_reserved("[[")?;
        self.skip_newlines()?;
        let expr = self.parse_cond_or()?;
        self.expect_reserved("]]")?;
        let redirects = self.parse_trailing_redirects()?;
        Ok(CompoundCommand::Conditional(CondCommand { expr, redirects }))
    }

    fn parse_cond_or(&mut self) -> Result<CondExpr, ParseError> {
        let mut lhs = self.parse_cond_and()?;
        while self.eat_op(Op::OrOr)? {
            self.skip_newlines()?;
            let rhs = self.parse_cond_and()?;
            lhs = CondExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cond_and(&mut self) -> Result<CondExpr, ParseError> {
        let mut lhs = self.parse_cond_primary()?;
        while self.eat_op(Op::AndAnd)? {
            self.skip_newlines()?;
            let rhs = self.parse_cond_primary()?;
            lhs = CondExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cond_primary(&mut self) -> Result<CondExpr, ParseError> {
        if self.peek_word_text()?.as_deref() == Some("!") {
            self.advance()?;
            return Ok(CondExpr::Not(Box::new(self.parse_cond_primary()?)));
        }
        if self.eat_op(Op::LParen)? {
            let inner = self.parse_cond_or()?;
            self.expect_op(Op::RParen)?;
            return Ok(inner);
        }

        if let Some(text) = self.peek_word_text()? {
            if is_cond_unary_op(&text) {
                self.advance()?;
                let operand = self.parse_cond_word()?;
                return Ok(CondExpr::UnaryTest { op: text, operand });
            }
        }

        let lhs = self.parse_cond_word()?;

        // Binary operator?
        let op = match self.peek()? {
            Token::Op(Op::Less) => Some(CondBinaryOp::StrLt),
            Token::Op(Op::Great) => Some(CondBinaryOp::StrGt),
            Token::Word(w) => match w.as_plain_literal() {
                Some("=") | Some("==") => Some(CondBinaryOp::StrEq),
                Some("!=") => Some(CondBinaryOp::StrNe),
                Some("=~") => Some(CondBinaryOp::Match),
                Some("-eq") => Some(CondBinaryOp::NumEq),
                Some("-ne") => Some(CondBinaryOp::NumNe),
                Some("-lt") => Some(CondBinaryOp::NumLt),
                Some("-le") => Some(CondBinaryOp::NumLe),
                Some("-gt") => Some(CondBinaryOp::NumGt),
                Some("-ge") => Some(CondBinaryOp::NumGe),
                Some("-nt") => Some(CondBinaryOp::NewerThan),
                Some("-ot") => Some(CondBinaryOp::OlderThan),
                Some("-ef") => Some(CondBinaryOp::SameFile),
                _ => None,
            },
            _ => None,
        };

        match op {
            None => Ok(CondExpr::Word(lhs)),
            Some(CondBinaryOp::Match) => {
                self.advance()?;
                // The lookahead is empty now, so the lexer can read the
                // pattern raw: parens and pipes are regex characters here.
                let rhs = self.lexer.next_regex_word()?;
                Ok(CondExpr::BinaryTest { op: CondBinaryOp::Match, lhs, rhs })
            }
            Some(op) => {
                self.advance()?;
                let rhs = self.parse_cond_word()?;
                Ok(CondExpr::BinaryTest { op, lhs, rhs })
            }
        }
    }

    fn parse_cond_word(&mut self) -> Result<Word, ParseError> {
        match self.peek()? {
            Token::Word(w) => {
                if w.as_plain_literal() == Some("]]") {
                    return Err(ParseError::unexpected("]]".to_string(), self.line()));
                }
                self.expect_word()
            }
            other => Err(ParseError::unexpected(other.describe(), self.line())),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn is_redirect_op(op: Op) -> bool {
    matches!(
        op,
        Op::Less
            | Op::Great
            | Op::DGreat
            | Op::Clobber
            | Op::LessGreat
            | Op::LessAnd
            | Op::GreatAnd
            | Op::TLess
            | Op::AndGreat
            | Op::AndDGreat
            | Op::DLess
            | Op::DLessDash
    )
}

fn is_cond_unary_op(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (
            Some('-'),
            Some(
                'a' | 'b' | 'c' | 'd' | 'e' | 'f' | 'g' | 'h' | 'k' | 'n' | 'o' | 'p' | 'r' | 's'
                    | 't' | 'u' | 'v' | 'w' | 'x' | 'z' | 'G' | 'L' | 'N' | 'O' | 'R' | 'S',
            ),
            None,
        )
    )
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The word's text with quoting stripped (here-doc delimiters, names).
pub(crate) fn word_literal_text(word: &Word) -> String {
    fn push_parts(parts: &[WordPart], out: &mut String) {
        for part in parts {
            match part {
                WordPart::Literal(s) | WordPart::SingleQuoted(s) | WordPart::Escaped(s) => {
                    out.push_str(s)
                }
                WordPart::DoubleQuoted(inner) => push_parts(inner, out),
                WordPart::Bytes(b) => out.push_str(&String::from_utf8_lossy(b)),
                WordPart::Tilde(user) => {
                    out.push('~');
                    if let Some(u) = user {
                        out.push_str(u);
                    }
                }
                _ => {}
            }
        }
    }
    let mut out = String::new();
    push_parts(&word.parts, &mut out);
    out
}

/// Recognize `name=value` / `name+=value` / `name[sub]=value` at command
/// position. Returns None for ordinary words.
fn split_assignment(word: &Word) -> Option<Assignment> {
    let text = match word.parts.first()? {
        WordPart::Literal(s) => s.as_str(),
        _ => return None,
    };
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    match chars.first() {
        Some(c) if c.is_ascii_alphabetic() || *c == '_' => i += 1,
        _ => return None,
    }
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        i += 1;
    }
    let name: String = chars[..i].iter().collect();

    let mut subscript = None;
    if i < chars.len() && chars[i] == '[' {
        let start = i + 1;
        let mut depth = 1;
        let mut j = start;
        while j < chars.len() {
            match chars[j] {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if j >= chars.len() {
            return None;
        }
        subscript = Some(chars[start..j].iter().collect::<String>());
        i = j + 1;
    }

    let append = i < chars.len() && chars[i] == '+';
    if append {
        i += 1;
    }
    if i >= chars.len() || chars[i] != '=' {
        return None;
    }
    i += 1;

    let remainder: String = chars[i..].iter().collect();
    let mut value_parts: Vec<WordPart> = Vec::new();
    if !remainder.is_empty() {
        value_parts.push(WordPart::Literal(remainder));
    }
    value_parts.extend(word.parts.iter().skip(1).cloned());

    let value = if value_parts.is_empty() { None } else { Some(Word { parts: value_parts }) };
    Some(Assignment { name, subscript, value, append, array: None })
}

/// Split `init; cond; step` of a C-style for header at top level.
fn split_cstyle_header(
    text: &str,
    line: u32,
) -> Result<(Option<ArithExpr>, Option<ArithExpr>, Option<ArithExpr>), ParseError> {
    let mut sections: Vec<String> = vec![String::new()];
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                sections.last_mut().expect("sections never empty").push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                sections.last_mut().expect("sections never empty").push(c);
            }
            ';' if depth == 0 => sections.push(String::new()),
            _ => sections.last_mut().expect("sections never empty").push(c),
        }
    }
    if sections.len() != 3 {
        return Err(ParseError::unexpected("((".to_string(), line));
    }
    let parse_opt = |s: &str| {
        if s.trim().is_empty() {
            None
        } else {
            Some(crate::parser::arith::parse_arith(s))
        }
    };
    Ok((parse_opt(&sections[0]), parse_opt(&sections[1]), parse_opt(&sections[2])))
}

/// Patch captured here-doc bodies into redirect nodes, in parse order.
fn fill_heredocs(
    statements: &mut [Statement],
    bodies: &mut std::collections::VecDeque<HereDocBody>,
) {
    for stmt in statements {
        for pipeline in &mut stmt.pipelines {
            for element in &mut pipeline.elements {
                fill_command(&mut element.command, bodies);
            }
        }
    }
}

fn fill_command(cmd: &mut CommandNode, bodies: &mut std::collections::VecDeque<HereDocBody>) {
    match cmd {
        CommandNode::Simple(simple) => fill_redirects(&mut simple.redirects, bodies),
        CommandNode::FunctionDef(def) => {
            fill_compound(&mut def.body, bodies);
            fill_redirects(&mut def.redirects, bodies);
        }
        CommandNode::Compound(compound) => fill_compound(compound, bodies),
    }
}

fn fill_compound(c: &mut CompoundCommand, bodies: &mut std::collections::VecDeque<HereDocBody>) {
    match c {
        CompoundCommand::If(n) => {
            for clause in &mut n.clauses {
                fill_heredocs(&mut clause.condition, bodies);
                fill_heredocs(&mut clause.body, bodies);
            }
            if let Some(e) = &mut n.else_body {
                fill_heredocs(e, bodies);
            }
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::While(n) => {
            fill_heredocs(&mut n.condition, bodies);
            fill_heredocs(&mut n.body, bodies);
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::For(n) => {
            fill_heredocs(&mut n.body, bodies);
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::CStyleFor(n) => {
            fill_heredocs(&mut n.body, bodies);
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::Case(n) => {
            for arm in &mut n.arms {
                fill_heredocs(&mut arm.body, bodies);
            }
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::Select(n) => {
            fill_heredocs(&mut n.body, bodies);
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::Subshell(n) => {
            fill_heredocs(&mut n.body, bodies);
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::Group(n) => {
            fill_heredocs(&mut n.body, bodies);
            fill_redirects(&mut n.redirects, bodies);
        }
        CompoundCommand::Arithmetic(n) => fill_redirects(&mut n.redirects, bodies),
        CompoundCommand::Conditional(n) => fill_redirects(&mut n.redirects, bodies),
    }
}

fn fill_redirects(
    redirects: &mut [Redirect],
    bodies: &mut std::collections::VecDeque<HereDocBody>,
) {
    for redirect in redirects {
        if let RedirectTarget::HereDoc(slot) = &mut redirect.target {
            if slot.body.parts.is_empty() {
                if let Some(body) = bodies.pop_front() {
                    *slot = body;
                } else {
                    slot.body = Word::empty();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(src: &str) -> Statement {
        let script = parse(src).unwrap();
        assert_eq!(script.statements.len(), 1, "expected one statement in {:?}", src);
        script.statements.into_iter().next().unwrap()
    }

    fn simple(stmt: &Statement) -> &SimpleCommand {
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Simple(s) => s,
            other => panic!("not simple: {:?}", other),
        }
    }

    #[test]
    fn test_simple_command() {
        let stmt = parse_one("echo hello world");
        let cmd = simple(&stmt);
        assert_eq!(cmd.words.len(), 3);
        assert_eq!(cmd.words[0].as_plain_literal(), Some("echo"));
    }

    #[test]
    fn test_and_or_list() {
        let stmt = parse_one("a && b || c");
        assert_eq!(stmt.pipelines.len(), 3);
        assert_eq!(stmt.operators, vec![AndOr::And, AndOr::Or]);
    }

    #[test]
    fn test_semicolon_splits_statements() {
        let script = parse("a; b").unwrap();
        assert_eq!(script.statements.len(), 2);
    }

    #[test]
    fn test_background() {
        let script = parse("a & b").unwrap();
        assert_eq!(script.statements.len(), 2);
        assert!(script.statements[0].background);
        assert!(!script.statements[1].background);
    }

    #[test]
    fn test_pipeline() {
        let stmt = parse_one("a | b | c");
        assert_eq!(stmt.pipelines[0].elements.len(), 3);
    }

    #[test]
    fn test_negated_pipeline() {
        let stmt = parse_one("! true");
        assert!(stmt.pipelines[0].negated);
    }

    #[test]
    fn test_assignment_recognition() {
        let stmt = parse_one("FOO=bar cmd x=y");
        let cmd = simple(&stmt);
        assert_eq!(cmd.assignments.len(), 1);
        assert_eq!(cmd.assignments[0].name, "FOO");
        // x=y after the command name is an ordinary argument.
        assert_eq!(cmd.words.len(), 2);
    }

    #[test]
    fn test_assignment_append_and_subscript() {
        let stmt = parse_one("a+=x");
        let cmd = simple(&stmt);
        assert!(cmd.assignments[0].append);

        let stmt = parse_one("arr[2]=v");
        let cmd = simple(&stmt);
        assert_eq!(cmd.assignments[0].subscript.as_deref(), Some("2"));
    }

    #[test]
    fn test_array_literal() {
        let stmt = parse_one("arr=(a b c)");
        let cmd = simple(&stmt);
        let arr = cmd.assignments[0].array.as_ref().unwrap();
        assert_eq!(arr.len(), 3);
    }

    #[test]
    fn test_redirections() {
        let stmt = parse_one("cmd <in >out 2>&1 >>log");
        let cmd = simple(&stmt);
        assert_eq!(cmd.redirects.len(), 4);
        assert_eq!(cmd.redirects[2].fd, Some(2));
        assert!(matches!(cmd.redirects[2].op, RedirectOp::DupOut));
    }

    #[test]
    fn test_if_statement() {
        let stmt = parse_one("if true; then echo yes; fi");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::If(n)) => {
                assert_eq!(n.clauses.len(), 1);
                assert!(n.else_body.is_none());
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_if_elif_else() {
        let stmt = parse_one("if a; then b; elif c; then d; else e; fi");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::If(n)) => {
                assert_eq!(n.clauses.len(), 2);
                assert!(n.else_body.is_some());
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_while_until() {
        let stmt = parse_one("while true; do x; done");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::Compound(CompoundCommand::While(w)) if !w.until
        ));
        let stmt = parse_one("until false; do x; done");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::Compound(CompoundCommand::While(w)) if w.until
        ));
    }

    #[test]
    fn test_for_loop() {
        let stmt = parse_one("for i in 1 2 3; do echo $i; done");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::For(f)) => {
                assert_eq!(f.var, "i");
                assert_eq!(f.words.as_ref().unwrap().len(), 3);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_for_without_in() {
        let stmt = parse_one("for arg; do echo $arg; done");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::For(f)) => assert!(f.words.is_none()),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_cstyle_for() {
        let stmt = parse_one("for ((i=0; i<3; i++)); do echo $i; done");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::CStyleFor(f)) => {
                assert!(f.init.is_some());
                assert!(f.condition.is_some());
                assert!(f.step.is_some());
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_case_statement() {
        let stmt = parse_one("case $x in a|b) echo ab ;; *) echo other ;; esac");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::Case(c)) => {
                assert_eq!(c.arms.len(), 2);
                assert_eq!(c.arms[0].patterns.len(), 2);
                assert_eq!(c.arms[0].terminator, CaseTerminator::Break);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_case_fallthrough_terminators() {
        let stmt = parse_one("case x in a) b ;& c) d ;;& e) f ;; esac");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::Case(c)) => {
                assert_eq!(c.arms[0].terminator, CaseTerminator::FallThrough);
                assert_eq!(c.arms[1].terminator, CaseTerminator::Continue);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_function_definition() {
        let stmt = parse_one("greet() { echo hi; }");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::FunctionDef(f) => {
                assert_eq!(f.name, "greet");
                assert!(matches!(*f.body, CompoundCommand::Group(_)));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_function_keyword_form() {
        let stmt = parse_one("function greet { echo hi; }");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::FunctionDef(f) if f.name == "greet"
        ));
    }

    #[test]
    fn test_subshell_and_group() {
        let stmt = parse_one("(a; b)");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::Compound(CompoundCommand::Subshell(s)) if s.body.len() == 2
        ));
        let stmt = parse_one("{ a; b; }");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::Compound(CompoundCommand::Group(g)) if g.body.len() == 2
        ));
    }

    #[test]
    fn test_arith_command() {
        let stmt = parse_one("((x = 1 + 2))");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::Compound(CompoundCommand::Arithmetic(_))
        ));
    }

    #[test]
    fn test_cond_command() {
        let stmt = parse_one("[[ -f /etc/passwd && $x == y* ]]");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::Conditional(c)) => {
                assert!(matches!(&c.expr, CondExpr::And(_, _)));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_cond_regex() {
        let stmt = parse_one("[[ $x =~ ^(a|b)+$ ]]");
        match &stmt.pipelines[0].elements[0].command {
            CommandNode::Compound(CompoundCommand::Conditional(c)) => match &c.expr {
                CondExpr::BinaryTest { op: CondBinaryOp::Match, rhs, .. } => {
                    assert_eq!(rhs.as_plain_literal(), Some("^(a|b)+$"));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_heredoc_parsing() {
        let script = parse("cat <<EOF\nhello\nworld\nEOF\necho done\n").unwrap();
        assert_eq!(script.statements.len(), 2);
        let cmd = match &script.statements[0].pipelines[0].elements[0].command {
            CommandNode::Simple(s) => s,
            other => panic!("{:?}", other),
        };
        match &cmd.redirects[0].target {
            RedirectTarget::HereDoc(h) => {
                assert_eq!(h.body.as_plain_literal(), Some("hello\nworld\n"));
                assert!(!h.quoted);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_heredoc_quoted_delimiter() {
        let script = parse("cat <<'EOF'\n$x `y`\nEOF\n").unwrap();
        let cmd = match &script.statements[0].pipelines[0].elements[0].command {
            CommandNode::Simple(s) => s,
            other => panic!("{:?}", other),
        };
        match &cmd.redirects[0].target {
            RedirectTarget::HereDoc(h) => {
                assert!(h.quoted);
                assert!(matches!(&h.body.parts[0], WordPart::SingleQuoted(s) if s == "$x `y`\n"));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_unclosed_is_error() {
        assert!(parse("if true; then echo").is_err());
        assert!(parse("while x; do y").is_err());
        assert!(parse("echo 'unclosed").is_err());
        assert!(parse("(a; b").is_err());
    }

    #[test]
    fn test_syntax_error_message() {
        let err = parse("if then").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("syntax error"), "{}", text);
    }

    #[test]
    fn test_select_statement() {
        let stmt = parse_one("select opt in a b; do echo $opt; done");
        assert!(matches!(
            &stmt.pipelines[0].elements[0].command,
            CommandNode::Compound(CompoundCommand::Select(s)) if s.var == "opt"
        ));
    }

    #[test]
    fn test_stderr_pipe() {
        let stmt = parse_one("a |& b");
        assert!(stmt.pipelines[0].elements[0].stderr_piped);
        assert!(!stmt.pipelines[0].elements[1].stderr_piped);
    }
}
