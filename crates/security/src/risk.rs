//! Shell command risk classification.
//!
//! Checks run in a fixed order and the first match wins: high-risk patterns,
//! medium-risk patterns, pipes into an interpreter, then the safe-prefix
//! allowlist. Dangerous patterns always take priority over the allowlist, so
//! `rm -rf /tmp/x` is high even though nothing about `rm` is allowlisted and
//! `mv ... /System` is high even though `mv` is.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// How dangerous a shell command is judged to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tier plus the human-readable reason for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    pub explanation: String,
}

impl RiskAssessment {
    fn new(tier: RiskTier, explanation: impl Into<String>) -> Self {
        Self {
            tier,
            explanation: explanation.into(),
        }
    }
}

const HIGH_RISK: &[(&str, &str)] = &[
    (r"\brm\s+-rf\b", "Recursive force delete"),
    (r"\bsudo\s+rm\b", "Root-level delete"),
    (r"\bdd\s+if=", "Raw disk write"),
    (r"\bmkfs\b", "Filesystem format"),
    (r"\bfdisk\b", "Disk partition"),
    (r"\bshutdown\b", "System shutdown"),
    (r"\breboot\b", "System reboot"),
    (r"\bsudo\s+chmod\b", "Root permission change"),
    (r"\bsudo\s+chown\b", "Root ownership change"),
    (r"\brm\s+-r\s+/", "Delete from root"),
    (r"\bnewfs\b", "New filesystem"),
    (r"\bdiskutil\s+erase", "Disk erase"),
];

const MEDIUM_RISK: &[(&str, &str)] = &[
    (r"\bpip\s+install\b", "Package install"),
    (r"\bnpm\s+install\b", "NPM install"),
    (r"\bbrew\s+install\b", "Homebrew install"),
    (r"\bgit\s+push\b", "Git push"),
    (r"\bcurl\b.*\|\s*sh", "Pipe curl to shell"),
    (r"\bwget\b.*\|\s*sh", "Pipe wget to shell"),
];

/// Leading tokens trusted to run without confirmation.
/// `curl` and `wget` are deliberately absent.
pub const SAFE_PREFIXES: &[&str] = &[
    "ls", "cat", "echo", "printf", "mkdir", "touch", "cp", "mv", "head", "tail", "wc", "grep",
    "find", "which", "pwd", "cd", "date", "whoami", "hostname", "uname", "env", "python",
    "python3", "node", "open", "pbcopy", "pbpaste", "tee", "ollama", "sort", "uniq", "tr", "cut",
    "dirname", "basename", "realpath", "readlink", "file", "diff", "less", "more", "strings",
    "xxd", "stat", "du", "df", "top", "ps", "kill", "lsof", "nslookup", "dig", "ping", "ssh",
    "scp", "git", "brew", "npm", "npx", "pip", "pip3", "cargo", "go", "ruby", "swift", "clang",
    "gcc", "make", "cmake", "java", "javac",
];

/// Filters that are safe as later stages of a pipeline.
pub const SAFE_PIPE_COMMANDS: &[&str] = &[
    "grep", "sort", "uniq", "wc", "head", "tail", "awk", "sed", "tr", "cut", "tee", "less",
    "more", "xargs", "jq",
];

struct Rules {
    high: Vec<(Regex, &'static str)>,
    medium: Vec<(Regex, &'static str)>,
    pipe_to_interpreter: Option<Regex>,
    system_dir: Option<Regex>,
    file_io: Option<Regex>,
}

fn compile(table: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    table
        .iter()
        .filter_map(|(pattern, desc)| Regex::new(pattern).ok().map(|re| (re, *desc)))
        .collect()
}

static RULES: LazyLock<Rules> = LazyLock::new(|| Rules {
    high: compile(HIGH_RISK),
    medium: compile(MEDIUM_RISK),
    pipe_to_interpreter: Regex::new(r"\|\s*(sh|bash|zsh|python|perl|ruby|node)\b").ok(),
    system_dir: Regex::new(r"\s+/System|\s+/Library").ok(),
    file_io: Regex::new(r"^(echo|cat|printf|tee)\b").ok(),
});

fn matches(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// Classify a shell command.
pub fn classify_command(command: &str) -> RiskAssessment {
    let rules = &*RULES;
    let trimmed = command.trim();
    let first_word = trimmed.split_whitespace().next().unwrap_or("");

    if let Some((_, desc)) = rules.high.iter().find(|(re, _)| re.is_match(command)) {
        return RiskAssessment::new(RiskTier::High, format!("Dangerous: {desc}"));
    }

    if let Some((_, desc)) = rules.medium.iter().find(|(re, _)| re.is_match(command)) {
        return RiskAssessment::new(RiskTier::Medium, format!("Caution: {desc}"));
    }

    if command.contains('|') && matches(&rules.pipe_to_interpreter, command) {
        return RiskAssessment::new(RiskTier::High, "Piped to shell/interpreter. Dangerous.");
    }

    if SAFE_PREFIXES.contains(&first_word) {
        if first_word == "cp" && matches(&rules.system_dir, trimmed) {
            return RiskAssessment::new(RiskTier::Medium, "Copy to system directory.");
        }
        if first_word == "mv" && matches(&rules.system_dir, trimmed) {
            return RiskAssessment::new(RiskTier::High, "Move to system directory.");
        }
        return RiskAssessment::new(RiskTier::Low, "Safe command.");
    }

    if command.contains('|') {
        let all_safe = command
            .split('|')
            .filter_map(|stage| stage.split_whitespace().next())
            .all(|word| SAFE_PREFIXES.contains(&word) || SAFE_PIPE_COMMANDS.contains(&word));
        if all_safe {
            return RiskAssessment::new(RiskTier::Low, "Safe piped command.");
        }
    }

    if matches(&rules.file_io, trimmed) {
        return RiskAssessment::new(RiskTier::Low, "File I/O via safe command.");
    }

    RiskAssessment::new(RiskTier::Low, "Command appears safe.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(command: &str) -> RiskTier {
        classify_command(command).tier
    }

    #[test]
    fn all_rule_patterns_compile() {
        assert_eq!(RULES.high.len(), HIGH_RISK.len());
        assert_eq!(RULES.medium.len(), MEDIUM_RISK.len());
        assert!(RULES.pipe_to_interpreter.is_some());
        assert!(RULES.system_dir.is_some());
        assert!(RULES.file_io.is_some());
    }

    #[test]
    fn high_risk_patterns() {
        let result = classify_command("rm -rf ~/Documents");
        assert_eq!(result.tier, RiskTier::High);
        assert_eq!(result.explanation, "Dangerous: Recursive force delete");

        assert_eq!(tier("sudo rm /etc/hosts"), RiskTier::High);
        assert_eq!(tier("dd if=/dev/zero of=/dev/disk2"), RiskTier::High);
        assert_eq!(tier("diskutil eraseDisk JHFS+ X disk2"), RiskTier::High);
        assert_eq!(tier("sudo shutdown -h now"), RiskTier::High);
    }

    #[test]
    fn danger_patterns_dominate_allowlist() {
        // Every one of these starts with an allowlisted token
        for command in [
            "ls && rm -rf /tmp/x",
            "echo hi; sudo rm -r /var/log",
            "find . -name '*.o' | xargs rm -rf",
            "git status && reboot",
            "cat install.sh | sh",
            "python3 -c 'print(1)' | bash",
        ] {
            assert_eq!(tier(command), RiskTier::High, "{command}");
        }
        assert_eq!(tier("rm -rf /tmp/x"), RiskTier::High);
    }

    #[test]
    fn medium_risk_patterns() {
        let result = classify_command("pip install requests");
        assert_eq!(result.tier, RiskTier::Medium);
        assert_eq!(result.explanation, "Caution: Package install");
        assert_eq!(tier("git push origin main"), RiskTier::Medium);
        assert_eq!(tier("curl -fsSL https://example.com/install | sh"), RiskTier::Medium);
    }

    #[test]
    fn system_directory_carve_outs() {
        let copy = classify_command("cp font.ttf /Library/Fonts/");
        assert_eq!(copy.tier, RiskTier::Medium);
        assert_eq!(copy.explanation, "Copy to system directory.");

        let moved = classify_command("mv app /System/Applications");
        assert_eq!(moved.tier, RiskTier::High);
        assert_eq!(moved.explanation, "Move to system directory.");
    }

    #[test]
    fn safe_commands() {
        let result = classify_command("ls -la ~/Desktop");
        assert_eq!(result.tier, RiskTier::Low);
        assert_eq!(result.explanation, "Safe command.");

        let piped = classify_command("awk '{print $1}' data.txt | sort | uniq -c");
        assert_eq!(piped.tier, RiskTier::Low);
        assert_eq!(piped.explanation, "Safe piped command.");
    }

    #[test]
    fn unknown_commands_default_to_low() {
        let result = classify_command("blender --background scene.blend");
        assert_eq!(result.tier, RiskTier::Low);
        assert_eq!(result.explanation, "Command appears safe.");
        assert_eq!(tier(""), RiskTier::Low);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(RiskTier::High > RiskTier::Medium);
        assert!(RiskTier::Medium > RiskTier::Low);
        assert_eq!(RiskTier::High.to_string(), "high");
    }
}
