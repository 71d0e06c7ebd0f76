//! Banned-path guard for shell commands.
//!
//! Rejects any command that deletes, moves, copies, re-permissions or links
//! into a protected root, or redirects output into one. Targets are resolved
//! (`~`, `$HOME`, `..` and symlinks) before comparison, so a symlink that
//! points into a protected root is caught too. This runs before risk
//! classification and is a hard block regardless of tier.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Verbs whose arguments are treated as write targets.
const TARGET_VERBS: &[&str] = &["rm", "mv", "cp", "chmod", "chown", "ln"];

/// Verdict of [`BannedPathGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathVerdict {
    pub blocked: bool,
    pub reason: String,
}

impl PathVerdict {
    fn allowed() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
        }
    }

    fn blocked(reason: String) -> Self {
        Self {
            blocked: true,
            reason,
        }
    }
}

#[derive(Debug, Clone)]
struct BannedRoot {
    label: String,
    /// The expanded root plus its canonical form when that differs
    paths: Vec<PathBuf>,
}

/// Protected filesystem roots that shell commands may never modify.
#[derive(Debug, Clone)]
pub struct BannedPathGuard {
    roots: Vec<BannedRoot>,
}

impl Default for BannedPathGuard {
    fn default() -> Self {
        Self::new(&["/System", "/Library", "~/Library", "/usr"])
    }
}

impl BannedPathGuard {
    pub fn new<S: AsRef<str>>(roots: &[S]) -> Self {
        let roots = roots
            .iter()
            .map(|root| {
                let label = root.as_ref().to_string();
                let expanded = normalize(Path::new(&expand_tilde(&label)));
                let mut paths = vec![expanded.clone()];
                if let Ok(canonical) = expanded.canonicalize() {
                    if canonical != expanded {
                        paths.push(canonical);
                    }
                }
                BannedRoot { label, paths }
            })
            .collect();
        Self { roots }
    }

    /// Check a command. `blocked` is true when any target lands under a protected root.
    pub fn check(&self, command: &str) -> PathVerdict {
        let tokens = tokenize(command);
        let mut verb_active = false;
        let mut iter = tokens.iter().peekable();

        while let Some(token) = iter.next() {
            match token {
                Token::Separator => verb_active = false,
                Token::Redirect => {
                    if let Some(Token::Word(target)) = iter.peek() {
                        if let Some(label) = self.banned_root_for(target) {
                            warn!(command, target = %target, "Blocked write to banned path");
                            return PathVerdict::blocked(format!("Write to banned path: {label}"));
                        }
                    }
                }
                Token::Word(word) => {
                    if verb_active {
                        if word.starts_with('-') {
                            continue;
                        }
                        if let Some(label) = self.banned_root_for(word) {
                            warn!(command, target = %word, "Blocked banned path target");
                            return PathVerdict::blocked(format!("Banned path target: {label}"));
                        }
                    } else if TARGET_VERBS.contains(&command_name(word)) {
                        verb_active = true;
                    }
                }
            }
        }

        PathVerdict::allowed()
    }

    fn banned_root_for(&self, target: &str) -> Option<&str> {
        let lexical = absolute(Path::new(&expand_tilde(target)));
        let resolved = resolve_symlinks(&lexical);

        self.roots
            .iter()
            .find(|root| {
                root.paths
                    .iter()
                    .any(|p| lexical.starts_with(p) || resolved.starts_with(p))
            })
            .map(|root| root.label.as_str())
    }
}

/// `/usr/bin/rm` and `rm` name the same verb.
fn command_name(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Redirect,
    Separator,
}

/// Split a command into words, redirects and separators, honouring quotes.
fn tokenize(command: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    fn flush(current: &mut String, tokens: &mut Vec<Token>) {
        if !current.is_empty() {
            tokens.push(Token::Word(std::mem::take(current)));
        }
    }

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            '&' if chars.peek() == Some(&'>') => {
                flush(&mut current, &mut tokens);
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                }
                tokens.push(Token::Redirect);
            }
            ';' | '&' | '|' | '(' | ')' => {
                flush(&mut current, &mut tokens);
                if tokens.last() != Some(&Token::Separator) {
                    tokens.push(Token::Separator);
                }
            }
            '>' => {
                // "2>" redirects too; drop the fd number
                if current.chars().all(|ch| ch.is_ascii_digit()) {
                    current.clear();
                } else {
                    flush(&mut current, &mut tokens);
                }
                if chars.peek() == Some(&'>') {
                    chars.next();
                }
                tokens.push(Token::Redirect);
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

/// Expand `~`, `$HOME` and `${HOME}` to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    let Some(home) = home_dir() else {
        return path.to_string();
    };
    if path == "~" || path.starts_with("~/") {
        return path.replacen('~', &home, 1);
    }
    if let Some(rest) = path.strip_prefix("${HOME}") {
        return format!("{home}{rest}");
    }
    if let Some(rest) = path.strip_prefix("$HOME") {
        return format!("{home}{rest}");
    }
    path.to_string()
}

pub fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        match std::env::current_dir() {
            Ok(cwd) => normalize(&cwd.join(path)),
            Err(_) => normalize(path),
        }
    }
}

/// Lexically drop `.` and resolve `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so
/// targets that do not exist yet still have their symlinked parents resolved.
fn resolve_symlinks(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in rest.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Check `command` against `roots`.
pub fn check_banned_paths<S: AsRef<str>>(command: &str, roots: &[S]) -> PathVerdict {
    BannedPathGuard::new(roots).check(command)
}
