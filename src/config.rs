//! Configuration loading from environment variables.
//!
//! All values come from `CTESTER_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CTESTER_LEDGER_CAPACITY` | 4096 | Allocation ledger capacity (blocks) |
//! | `CTESTER_CHECK_RESOLUTIONS` | true | Check `freeaddrinfo` against registered results |
//! | `CTESTER_PEER_BIN` | unset | Path of the `ctester-peer` program |
//! | `CTESTER_PEER_CONNECT_ATTEMPTS` | 1 | Client connect attempts |
//! | `CTESTER_PEER_CONNECT_DELAY_MS` | 50 | Delay between connect attempts (ms) |
//! | `CTESTER_PEER_OVERFLOW_WINDOW` | 255 | Bytes read past an expected chunk |
//! | `CTESTER_LOG_LEVEL` | info | Log filter directive |
//! | `CTESTER_LOG_FORMAT` | pretty | `json` or `pretty` |

use std::path::PathBuf;

use crate::intercept::{ContextConfig, DEFAULT_CAPACITY};
use crate::peer::PeerOptions;
use crate::telemetry::{LogConfig, LogFormat};

/// Effective configuration summary.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub ledger_capacity: usize,
    pub check_resolutions: bool,
    pub peer_bin: Option<PathBuf>,
    pub peer_connect_attempts: u32,
    pub peer_connect_delay_ms: u64,
    pub peer_overflow_window: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub context: ContextConfig,
    pub peer_bin: Option<PathBuf>,
    pub peer: PeerOptions,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var (`1/0`, `true/false`, `yes/no`, `on/off`).
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn load_context_config() -> ContextConfig {
    let ledger_capacity = parse_usize("CTESTER_LEDGER_CAPACITY", DEFAULT_CAPACITY);
    let ledger_capacity = ledger_capacity.max(1);
    let check_resolutions = parse_bool("CTESTER_CHECK_RESOLUTIONS", true);
    ContextConfig {
        ledger_capacity,
        check_resolutions,
    }
}

fn load_peer_options() -> PeerOptions {
    let defaults = PeerOptions::default();
    let connect_attempts = parse_u32("CTESTER_PEER_CONNECT_ATTEMPTS", defaults.connect_attempts);
    let connect_delay_ms = parse_u64("CTESTER_PEER_CONNECT_DELAY_MS", defaults.connect_delay_ms);
    let overflow_window = parse_usize("CTESTER_PEER_OVERFLOW_WINDOW", defaults.overflow_window);
    PeerOptions {
        connect_attempts: connect_attempts.max(1),
        connect_delay_ms,
        overflow_window: overflow_window.clamp(1, u8::MAX as usize),
    }
}

fn load_log_config() -> LogConfig {
    let level = std::env::var("CTESTER_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let format = std::env::var("CTESTER_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig {
        format,
        level,
        output_path: None,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let peer_bin = std::env::var_os("CTESTER_PEER_BIN")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    EnvConfig {
        context: load_context_config(),
        peer_bin,
        peer: load_peer_options(),
        log: load_log_config(),
    }
}

/// Configuration with no environment applied.
pub fn defaults() -> EnvConfig {
    EnvConfig {
        context: ContextConfig::default(),
        peer_bin: None,
        peer: PeerOptions::default(),
        log: LogConfig::default(),
    }
}

impl EnvConfig {
    /// Return a flat summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            ledger_capacity: self.context.ledger_capacity,
            check_resolutions: self.context.check_resolutions,
            peer_bin: self.peer_bin.clone(),
            peer_connect_attempts: self.peer.connect_attempts,
            peer_connect_delay_ms: self.peer.connect_delay_ms,
            peer_overflow_window: self.peer.overflow_window,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}
