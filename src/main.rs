//! ctester-peer entry point.
//!
//! A scripted mock network peer. Normally spawned by `PeerLauncher`, which
//! writes a launch request on stdin and reads outcome records from stdout.
//!
//! ## CLI Subcommands
//!
//! - `ctester-peer` or `ctester-peer run` - Play a launch request (default)
//! - `ctester-peer check FILE` - Validate a TOML script (exit 0/1)
//! - `ctester-peer config show|defaults` - Print configuration

use std::path::Path;
use std::process::ExitCode;

use ctester::cli::{config_cmd, run, run_check};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => run().await.into(),
        "check" => match args.get(2) {
            Some(path) => ExitCode::from(run_check(Path::new(path)) as u8),
            None => {
                eprintln!("check needs a script file");
                print_command_help("check");
                ExitCode::FAILURE
            }
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("ctester-peer {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "ctester-peer - scripted mock network peer v{}

USAGE:
    ctester-peer [COMMAND]

COMMANDS:
    run          Play the launch request read from stdin (default)
    check FILE   Validate a TOML transaction script
    config       Show configuration (show, defaults)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    CTESTER_LEDGER_CAPACITY        Allocation ledger slots (default: 4096)
    CTESTER_CHECK_RESOLUTIONS      Check freeaddrinfo heads (default: true)
    CTESTER_PEER_BIN               Path of this program for PeerLauncher
    CTESTER_PEER_CONNECT_ATTEMPTS  Client connect attempts (default: 1)
    CTESTER_PEER_CONNECT_DELAY_MS  Delay between attempts (default: 50)
    CTESTER_PEER_OVERFLOW_WINDOW   Surplus bytes read past a chunk (default: 255)
    CTESTER_LOG_LEVEL              Log filter (default: info)
    CTESTER_LOG_FORMAT             json or pretty (default: pretty)

EXIT CODES (run):
    0  Every transaction played
    1  Socket could not be created, bound, connected or accepted
    2  Invalid launch request or report channel failure
    3  Stopped on request
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "ctester-peer run - Play a launch request

USAGE:
    ctester-peer run

DESCRIPTION:
    Reads one length-prefixed launch request from stdin, opens the
    requested endpoint and plays its transactions. stdout carries the
    local port followed by one outcome record per chunk. Any byte on
    stdin after the request stops the peer at its next check point.
"
            );
        }
        "check" => {
            eprintln!(
                "ctester-peer check - Validate a transaction script

USAGE:
    ctester-peer check FILE

DESCRIPTION:
    Parses FILE as a TOML transaction script, rejects empty or oversized
    chunks and prints a per-transaction summary.

EXIT CODES:
    0  Script is valid
    1  Script could not be read or is invalid
"
            );
        }
        "config" => {
            eprintln!(
                "ctester-peer config - Show configuration

USAGE:
    ctester-peer config [show|defaults]

DESCRIPTION:
    show      Print effective values after environment overrides
    defaults  Print built-in defaults
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}
