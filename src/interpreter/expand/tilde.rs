//! Tilde Expansion
//!
//! `~` → `$HOME`, `~+` → `$PWD`, `~-` → `$OLDPWD`, `~user` → that user's
//! home directory if it exists in the sandbox. An unresolvable prefix stays
//! literal. Assignment values additionally expand tildes after `=` and `:`.

use crate::fs::sync::SyncFs;
use crate::interpreter::state::ShellState;

/// Resolve a tilde prefix; None means "keep the literal text".
pub fn resolve(fs: &dyn SyncFs, state: &ShellState, user: Option<&str>) -> Option<Vec<u8>> {
    match user {
        None => state.get_scalar("HOME"),
        Some("+") => Some(state.cwd.clone().into_bytes()),
        Some("-") => state.get_scalar("OLDPWD").or_else(|| Some(state.previous_dir.clone().into_bytes())),
        Some(name) => {
            let candidate = format!("/home/{}", name);
            if fs.is_dir(&candidate) {
                Some(candidate.into_bytes())
            } else {
                None
            }
        }
    }
}

/// The literal rendering of an unresolved prefix.
pub fn literal(user: Option<&str>) -> Vec<u8> {
    match user {
        None => b"~".to_vec(),
        Some(u) => format!("~{}", u).into_bytes(),
    }
}

/// Tilde expansion inside an assignment value: a `~` prefix at the start and
/// after every unquoted `:` (PATH-style lists). `quoted` is the parallel
/// quoting bitmap of `bytes`.
pub fn expand_in_assignment(
    fs: &dyn SyncFs,
    state: &ShellState,
    bytes: &[u8],
    quoted: &[bool],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut at_component_start = true;
    while i < bytes.len() {
        let b = bytes[i];
        let is_quoted = quoted.get(i).copied().unwrap_or(false);
        if at_component_start && b == b'~' && !is_quoted {
            // Prefix runs to the next unquoted `:` or `/` or end.
            let mut j = i + 1;
            while j < bytes.len() {
                let c = bytes[j];
                let q = quoted.get(j).copied().unwrap_or(false);
                if q || c == b':' || c == b'/' {
                    break;
                }
                j += 1;
            }
            let user_bytes = &bytes[i + 1..j];
            let user = if user_bytes.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(user_bytes).into_owned())
            };
            match resolve(fs, state, user.as_deref()) {
                Some(home) => out.extend_from_slice(&home),
                None => out.extend_from_slice(&bytes[i..j]),
            }
            i = j;
            at_component_start = false;
            continue;
        }
        at_component_start = b == b':' && !is_quoted;
        out.push(b);
        i += 1;
    }
    out
}
