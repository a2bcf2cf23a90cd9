//! Config CLI subcommands: show, defaults.
//!
//! These commands read configuration directly from environment variables.

use crate::config::{self, EffectiveConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print!("{}", render(&cfg));
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    let cfg = config::defaults().effective_config();
    print!("{}", render(&cfg));
}

fn render(cfg: &EffectiveConfig) -> String {
    let peer_bin = cfg
        .peer_bin
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let mut out = String::new();
    out.push_str(&format!("CTESTER_LEDGER_CAPACITY={}\n", cfg.ledger_capacity));
    out.push_str(&format!("CTESTER_CHECK_RESOLUTIONS={}\n", cfg.check_resolutions));
    out.push_str(&format!("CTESTER_PEER_BIN={}\n", peer_bin));
    out.push_str(&format!("CTESTER_PEER_CONNECT_ATTEMPTS={}\n", cfg.peer_connect_attempts));
    out.push_str(&format!("CTESTER_PEER_CONNECT_DELAY_MS={}\n", cfg.peer_connect_delay_ms));
    out.push_str(&format!("CTESTER_PEER_OVERFLOW_WINDOW={}\n", cfg.peer_overflow_window));
    out.push_str(&format!("CTESTER_LOG_LEVEL={}\n", cfg.log_level));
    out.push_str(&format!("CTESTER_LOG_FORMAT={}\n", cfg.log_format));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_render_every_key() {
        let text = render(&config::defaults().effective_config());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines.contains(&"CTESTER_LEDGER_CAPACITY=4096"));
        assert!(lines.contains(&"CTESTER_CHECK_RESOLUTIONS=true"));
        assert!(lines.contains(&"CTESTER_PEER_BIN="));
        assert!(lines.contains(&"CTESTER_PEER_OVERFLOW_WINDOW=255"));
        assert!(lines.contains(&"CTESTER_LOG_FORMAT=pretty"));
    }

    #[test]
    fn test_render_shows_peer_bin() {
        let mut cfg = config::defaults().effective_config();
        cfg.peer_bin = Some("/usr/bin/ctester-peer".into());
        assert!(render(&cfg).contains("CTESTER_PEER_BIN=/usr/bin/ctester-peer\n"));
    }
}
