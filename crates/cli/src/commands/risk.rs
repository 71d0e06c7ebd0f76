//! `deskpilot risk`: classify a command the way the shell tool would.

use deskpilot_security::{BannedPathGuard, RiskTier, classify_command};

use super::load_config;

pub fn run(command: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let guard = BannedPathGuard::new(config.risk.banned_paths.as_slice());
    println!("{}", report(&guard, command));
    Ok(())
}

fn report(guard: &BannedPathGuard, command: &str) -> String {
    let verdict = guard.check(command);
    let risk = classify_command(command);

    let mut lines = vec![format!("  Command:  {command}")];
    if verdict.blocked {
        lines.push(format!("  Paths:    BLOCKED ({})", verdict.reason));
    } else {
        lines.push("  Paths:    ok".to_string());
    }
    lines.push(format!("  Tier:     {}", risk.tier.as_str().to_uppercase()));
    lines.push(format!("  Reason:   {}", risk.explanation));

    let action = if verdict.blocked {
        "never runs"
    } else {
        match risk.tier {
            RiskTier::Low => "runs immediately",
            RiskTier::Medium => "needs one confirmation",
            RiskTier::High => "needs three confirmations",
        }
    };
    lines.push(format!("  Action:   {action}"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destructive_command_is_high() {
        let out = report(&BannedPathGuard::default(), "rm -rf ~/Documents");
        assert!(out.contains("Tier:     HIGH"));
        assert!(out.contains("needs three confirmations"));
    }

    #[test]
    fn banned_path_wins_over_tier() {
        let out = report(&BannedPathGuard::default(), "rm -rf /usr/local/bin/tool");
        assert!(out.contains("Paths:    BLOCKED"));
        assert!(out.contains("never runs"));
    }

    #[test]
    fn listing_is_low() {
        let out = report(&BannedPathGuard::default(), "ls -la");
        assert!(out.contains("Paths:    ok"));
        assert!(out.contains("Tier:     LOW"));
        assert!(out.contains("runs immediately"));
    }
}
