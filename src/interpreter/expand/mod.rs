//! Word Expansion
//!
//! The staged pipeline: brace → tilde → parameter/command/arithmetic →
//! field splitting → pathname expansion → quote removal. Everything is
//! byte-oriented and every produced byte carries an "is quoted" bit so
//! splitting and globbing can tell quoted content apart; `$'\xff'` survives
//! verbatim from source to argv.

pub mod brace;
pub mod param;
pub mod tilde;

use crate::ast::types::{HereDocBody, ProcessSubst, Script, SubstDirection, Word, WordPart};
use crate::bytes::{lossy, trim_trailing_newlines};
use crate::interpreter::engine::Executor;
use crate::interpreter::errors::{ControlFlow, LimitKind};
use crate::interpreter::state::ShellState;
use crate::pattern::glob::{expand as glob_expand, GlobFlags};
use crate::pattern::has_glob_meta;

/// One post-split field: bytes plus the parallel quoting bitmap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    pub bytes: Vec<u8>,
    pub quoted: Vec<bool>,
}

impl Field {
    fn push(&mut self, bytes: &[u8], quoted: bool) {
        self.bytes.extend_from_slice(bytes);
        self.quoted.extend(std::iter::repeat(quoted).take(bytes.len()));
    }

    /// Pattern rendering: quoted metacharacters get a protecting backslash.
    pub fn pattern_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len());
        for (i, b) in self.bytes.iter().enumerate() {
            let quoted = self.quoted.get(i).copied().unwrap_or(false);
            if quoted && matches!(b, b'*' | b'?' | b'[' | b']' | b'\\' | b'(' | b')' | b'|' | b'!' | b'@' | b'+') {
                out.push(b'\\');
            }
            out.push(*b);
        }
        out
    }

    /// Quoted metacharacters are escaped in the pattern rendering, so any
    /// meta surviving there is unquoted.
    fn has_unquoted_glob_meta(&self, extglob: bool) -> bool {
        has_glob_meta(&self.pattern_bytes(), extglob)
    }
}

/// Expansion segments before field splitting.
#[derive(Debug, Clone)]
enum Seg {
    Text { bytes: Vec<u8>, quoted: bool, splittable: bool },
    /// Hard field boundary from `"$@"` / `"${a[@]}"`.
    Sep,
}

/// Staged word expansion against interpreter state. Accumulates stderr from
/// command substitutions; the caller drains it into its own stream.
pub struct Expander<'e, 's> {
    pub exec: &'e Executor<'e>,
    pub state: &'s mut ShellState,
    pub stderr: Vec<u8>,
}

impl<'e, 's> Expander<'e, 's> {
    pub fn new(exec: &'e Executor<'e>, state: &'s mut ShellState) -> Self {
        Self { exec, state, stderr: Vec::new() }
    }

    /// Full pipeline for command words: argv bytes out.
    pub fn expand_words(&mut self, words: &[Word]) -> Result<Vec<Vec<u8>>, ControlFlow> {
        let mut argv = Vec::new();
        for word in words {
            for braced in brace::expand_braces(word)? {
                let fields = self.word_fields(&braced)?;
                let globbed = self.glob_fields(fields)?;
                argv.extend(globbed);
            }
        }
        let total: usize = argv.iter().map(|a| a.len()).sum();
        self.check_expansion_len(total)?;
        Ok(argv)
    }

    /// Expansion without splitting or globbing (redirect targets, case
    /// scrutinees, here-strings). Multi-field expansions join with spaces.
    pub fn expand_word_single(&mut self, word: &Word) -> Result<Vec<u8>, ControlFlow> {
        Ok(self.expand_word_single_field(word)?.bytes)
    }

    /// Like [`expand_word_single`], keeping the quoting bitmap (assignment
    /// values need it for tilde handling).
    pub fn expand_word_single_field(&mut self, word: &Word) -> Result<Field, ControlFlow> {
        let mut segs = Vec::new();
        self.expand_parts(&word.parts, false, &mut segs)?;
        let mut field = Field::default();
        for seg in segs {
            match seg {
                Seg::Sep => field.push(b" ", false),
                Seg::Text { bytes, quoted, .. } => field.push(&bytes, quoted),
            }
        }
        self.check_expansion_len(field.bytes.len())?;
        Ok(field)
    }

    /// Pattern position (case patterns, `[[ == ]]` right sides, parameter
    /// operator patterns): quoted content is escaped against matching.
    pub fn expand_pattern(&mut self, word: &Word) -> Result<Vec<u8>, ControlFlow> {
        let mut segs = Vec::new();
        self.expand_parts(&word.parts, false, &mut segs)?;
        let mut field = Field::default();
        for seg in segs {
            match seg {
                Seg::Sep => field.push(b" ", false),
                Seg::Text { bytes, quoted, .. } => field.push(&bytes, quoted),
            }
        }
        Ok(field.pattern_bytes())
    }

    /// Here-doc body: quoted delimiter short-circuits to the verbatim text.
    pub fn expand_heredoc(&mut self, heredoc: &HereDocBody) -> Result<Vec<u8>, ControlFlow> {
        if heredoc.quoted {
            if let [WordPart::SingleQuoted(text)] = heredoc.body.parts.as_slice() {
                return Ok(text.clone().into_bytes());
            }
        }
        self.expand_word_single(&heredoc.body)
    }

    /// Words of a `for` loop / array literal: split and globbed like argv.
    pub fn expand_word_list(&mut self, words: &[Word]) -> Result<Vec<Vec<u8>>, ControlFlow> {
        self.expand_words(words)
    }

    // =========================================================================
    // Parts → segments
    // =========================================================================

    fn expand_parts(
        &mut self,
        parts: &[WordPart],
        in_dq: bool,
        segs: &mut Vec<Seg>,
    ) -> Result<(), ControlFlow> {
        if in_dq && parts.is_empty() {
            // "" is one empty (quoted) field.
            segs.push(Seg::Text { bytes: Vec::new(), quoted: true, splittable: false });
            return Ok(());
        }
        for part in parts {
            match part {
                WordPart::Literal(s) => {
                    segs.push(Seg::Text {
                        bytes: s.clone().into_bytes(),
                        quoted: in_dq,
                        splittable: false,
                    });
                }
                WordPart::SingleQuoted(s) => {
                    segs.push(Seg::Text { bytes: s.clone().into_bytes(), quoted: true, splittable: false });
                }
                WordPart::Escaped(s) => {
                    segs.push(Seg::Text { bytes: s.clone().into_bytes(), quoted: true, splittable: false });
                }
                WordPart::Bytes(b) => {
                    segs.push(Seg::Text { bytes: b.clone(), quoted: true, splittable: false });
                }
                WordPart::DoubleQuoted(inner) => {
                    self.expand_parts(inner, true, segs)?;
                }
                WordPart::Tilde(user) => {
                    let bytes = tilde::resolve(self.exec.fs, self.state, user.as_deref())
                        .unwrap_or_else(|| tilde::literal(user.as_deref()));
                    segs.push(Seg::Text { bytes, quoted: false, splittable: false });
                }
                WordPart::Parameter(p) => {
                    match param::expand_parameter(self, p, in_dq)? {
                        param::ParamValue::Single(bytes) => {
                            segs.push(Seg::Text { bytes, quoted: in_dq, splittable: !in_dq });
                        }
                        param::ParamValue::Fields(values) => {
                            for (i, bytes) in values.into_iter().enumerate() {
                                if i > 0 {
                                    segs.push(Seg::Sep);
                                }
                                segs.push(Seg::Text { bytes, quoted: in_dq, splittable: !in_dq });
                            }
                        }
                    }
                }
                WordPart::CommandSubst(cs) => {
                    let bytes = self.command_substitution(&cs.script)?;
                    segs.push(Seg::Text { bytes, quoted: in_dq, splittable: !in_dq });
                }
                WordPart::ArithSubst(expr) => {
                    let value =
                        crate::interpreter::arith::eval(self.state, self.exec.limits, expr)?;
                    segs.push(Seg::Text {
                        bytes: value.to_string().into_bytes(),
                        quoted: in_dq,
                        splittable: !in_dq,
                    });
                }
                WordPart::ProcessSubst(ps) => {
                    let path = self.process_substitution(ps)?;
                    segs.push(Seg::Text { bytes: path, quoted: false, splittable: false });
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Field splitting
    // =========================================================================

    fn word_fields(&mut self, word: &Word) -> Result<Vec<Field>, ControlFlow> {
        let mut segs = Vec::new();
        self.expand_parts(&word.parts, false, &mut segs)?;
        Ok(split_fields(segs, &self.state.ifs()))
    }

    // =========================================================================
    // Pathname expansion
    // =========================================================================

    fn glob_fields(&mut self, fields: Vec<Field>) -> Result<Vec<Vec<u8>>, ControlFlow> {
        let mut out = Vec::new();
        for field in fields {
            if self.state.flags.noglob
                || !field.has_unquoted_glob_meta(self.state.shopt.extglob)
            {
                out.push(field.bytes);
                continue;
            }
            let pattern = field.pattern_bytes();
            let flags = GlobFlags {
                extglob: self.state.shopt.extglob,
                dotglob: self.state.shopt.dotglob,
                globstar: self.state.shopt.globstar,
                nocaseglob: self.state.shopt.nocaseglob,
            };
            let mut remaining = self
                .exec
                .limits
                .max_glob_ops
                .saturating_sub(self.state.counters.glob_ops);
            let before = remaining;
            let result = glob_expand(self.exec.fs, &self.state.cwd, &pattern, &flags, &mut remaining);
            self.state.counters.glob_ops += before.saturating_sub(remaining);
            match result {
                Err(_) => {
                    return Err(ControlFlow::limit(
                        LimitKind::GlobOps,
                        "maximum glob operations exceeded",
                    ))
                }
                Ok(Some(paths)) => out.extend(paths),
                Ok(None) => {
                    if self.state.shopt.failglob {
                        return Err(ControlFlow::no_glob_match(lossy(&field.bytes).into_owned()));
                    }
                    if !self.state.shopt.nullglob {
                        out.push(field.bytes);
                    }
                }
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Substitutions
    // =========================================================================

    fn command_substitution(&mut self, script: &Script) -> Result<Vec<u8>, ControlFlow> {
        if self.state.counters.subst_depth >= self.exec.limits.max_subst_depth {
            return Err(ControlFlow::limit(
                LimitKind::Substitution,
                "maximum substitution depth exceeded",
            ));
        }
        // `$(< file)` reads the file directly.
        if let Some(path_word) = read_file_substitution(script) {
            let path_bytes = self.expand_word_single(&path_word)?;
            let path = self
                .exec
                .fs
                .resolve_path(&self.state.cwd, &lossy(&path_bytes));
            return match self.exec.fs.read_file(&path) {
                Ok(mut bytes) => {
                    trim_trailing_newlines(&mut bytes);
                    self.state.last_exit_code = 0;
                    Ok(bytes)
                }
                Err(e) => {
                    self.stderr
                        .extend_from_slice(format!("bash: {}\n", e).as_bytes());
                    self.state.last_exit_code = 1;
                    Ok(Vec::new())
                }
            };
        }

        self.state.counters.subst_depth += 1;
        let captured = self.exec.capture_subshell(self.state, script, b"");
        self.state.counters.subst_depth -= 1;

        let captured = captured?;
        self.stderr.extend_from_slice(&captured.stderr);
        self.state.last_exit_code = captured.exit_code;
        let mut bytes = captured.stdout;
        trim_trailing_newlines(&mut bytes);
        self.check_expansion_len(bytes.len())?;
        Ok(bytes)
    }

    /// Fifo-like stand-in: the substituted text is a `/dev/fd/N` path in the
    /// virtual filesystem. For `<(…)` the command's output is materialized
    /// there; for `>(…)` the path exists and collects whatever is written.
    fn process_substitution(&mut self, ps: &ProcessSubst) -> Result<Vec<u8>, ControlFlow> {
        let fd = self.state.fresh_subst_fd();
        let path = format!("/dev/fd/{}", fd);
        let _ = self.exec.fs.mkdir(
            "/dev/fd",
            &crate::fs::types::MkdirOptions { recursive: true },
        );
        match ps.direction {
            SubstDirection::Read => {
                let captured = self.exec.capture_subshell(self.state, &ps.script, b"")?;
                self.stderr.extend_from_slice(&captured.stderr);
                if let Err(e) = self.exec.fs.write_file(&path, &captured.stdout) {
                    self.stderr
                        .extend_from_slice(format!("bash: {}\n", e).as_bytes());
                }
            }
            SubstDirection::Write => {
                let _ = self.exec.fs.write_file(&path, b"");
            }
        }
        Ok(path.into_bytes())
    }

    fn check_expansion_len(&self, len: usize) -> Result<(), ControlFlow> {
        if len > self.exec.limits.max_expansion_length {
            return Err(ControlFlow::limit(
                LimitKind::Expansion,
                "maximum expansion length exceeded",
            ));
        }
        Ok(())
    }
}

/// Detect the `$(< path)` form: one statement, one simple command with no
/// words and a single `<` redirect.
fn read_file_substitution(script: &Script) -> Option<Word> {
    use crate::ast::types::{CommandNode, RedirectOp, RedirectTarget};
    let [stmt] = script.statements.as_slice() else {
        return None;
    };
    let [pipeline] = stmt.pipelines.as_slice() else {
        return None;
    };
    let [element] = pipeline.elements.as_slice() else {
        return None;
    };
    let CommandNode::Simple(simple) = &element.command else {
        return None;
    };
    if !simple.words.is_empty() || !simple.assignments.is_empty() {
        return None;
    }
    let [redirect] = simple.redirects.as_slice() else {
        return None;
    };
    if redirect.op != RedirectOp::Read {
        return None;
    }
    match &redirect.target {
        RedirectTarget::Word(w) => Some(w.clone()),
        _ => None,
    }
}

// =============================================================================
// IFS splitting
// =============================================================================

fn split_fields(segs: Vec<Seg>, ifs: &[u8]) -> Vec<Field> {
    let ws: Vec<u8> = ifs.iter().copied().filter(|b| matches!(b, b' ' | b'\t' | b'\n')).collect();
    let hard: Vec<u8> = ifs.iter().copied().filter(|b| !matches!(b, b' ' | b'\t' | b'\n')).collect();

    let mut fields: Vec<Field> = Vec::new();
    let mut current: Option<Field> = None;

    for seg in segs {
        match seg {
            Seg::Sep => {
                fields.push(current.take().unwrap_or_default());
            }
            Seg::Text { bytes, quoted, splittable } => {
                if !splittable || ifs.is_empty() {
                    current.get_or_insert_with(Field::default).push(&bytes, quoted);
                    continue;
                }
                let mut i = 0;
                while i < bytes.len() {
                    let b = bytes[i];
                    if ws.contains(&b) {
                        let had_field = current.is_some();
                        if let Some(f) = current.take() {
                            fields.push(f);
                        }
                        while i < bytes.len() && ws.contains(&bytes[i]) {
                            i += 1;
                        }
                        // Whitespace adjacent to one hard separator is
                        // absorbed into it.
                        if had_field && i < bytes.len() && hard.contains(&bytes[i]) {
                            i += 1;
                            while i < bytes.len() && ws.contains(&bytes[i]) {
                                i += 1;
                            }
                        }
                    } else if hard.contains(&b) {
                        fields.push(current.take().unwrap_or_default());
                        i += 1;
                    } else {
                        current.get_or_insert_with(Field::default).push(&[b], quoted);
                        i += 1;
                    }
                }
            }
        }
    }
    if let Some(f) = current.take() {
        fields.push(f);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_seg(s: &str, splittable: bool) -> Seg {
        Seg::Text { bytes: s.as_bytes().to_vec(), quoted: false, splittable }
    }

    fn field_strs(fields: Vec<Field>) -> Vec<String> {
        fields.into_iter().map(|f| String::from_utf8_lossy(&f.bytes).into_owned()).collect()
    }

    #[test]
    fn test_default_ifs_split() {
        let fields = split_fields(vec![text_seg("  a  b\tc \n", true)], b" \t\n");
        assert_eq!(field_strs(fields), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_unquoted_yields_zero_fields() {
        let fields = split_fields(vec![text_seg("", true)], b" \t\n");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_quoted_empty_yields_one_field() {
        let segs = vec![Seg::Text { bytes: Vec::new(), quoted: true, splittable: false }];
        let fields = split_fields(segs, b" \t\n");
        assert_eq!(fields.len(), 1);
        assert!(fields[0].bytes.is_empty());
    }

    #[test]
    fn test_hard_separator_empty_fields() {
        let fields = split_fields(vec![text_seg("a,,b", true)], b",");
        assert_eq!(field_strs(fields), vec!["a", "", "b"]);
    }

    #[test]
    fn test_trailing_hard_separator_no_empty_field() {
        let fields = split_fields(vec![text_seg("a,", true)], b",");
        assert_eq!(field_strs(fields), vec!["a"]);
    }

    #[test]
    fn test_ws_absorbed_around_hard_separator() {
        let fields = split_fields(vec![text_seg("a , b", true)], b", \t\n");
        assert_eq!(field_strs(fields), vec!["a", "b"]);
    }

    #[test]
    fn test_unsplittable_joins_across_segments() {
        let segs = vec![text_seg("pre", false), text_seg("x y", true), text_seg("post", false)];
        let fields = split_fields(segs, b" \t\n");
        assert_eq!(field_strs(fields), vec!["prex", "ypost"]);
    }

    #[test]
    fn test_sep_forces_field_boundary() {
        let segs = vec![text_seg("a", false), Seg::Sep, text_seg("b", false)];
        let fields = split_fields(segs, b" \t\n");
        assert_eq!(field_strs(fields), vec!["a", "b"]);
    }

    #[test]
    fn test_pattern_bytes_escapes_quoted() {
        let mut f = Field::default();
        f.push(b"*", false);
        f.push(b"*", true);
        assert_eq!(f.pattern_bytes(), b"*\\*");
    }
}
