#![deny(missing_docs)]

//! # Overview
//!
//! `xcp_cli` is the thin outer layer both binaries share: `clap` argument
//! definitions for `xcp` and `xcpd`, `[user@]host:path` operand parsing,
//! the `-v`/`-q` logging sink (spec §6, "mapped to log level by an
//! external collaborator"), and the `run(...)`/`exit_code_from(...)` entry
//! points the `bin/` crates call.
//!
//! # Design
//!
//! Mirrors the teacher's `cli` crate: an argument struct per binary,
//! a `run` function taking an argument iterator plus injectable
//! stdout/stderr so the binary crate's own tests can exercise `--version`
//! and friends without touching the real process streams, and a final
//! `exit_code_from` converting the returned status into
//! [`std::process::ExitCode`].
//!
//! # Invariants
//!
//! - [`run_client`] and [`run_server`] never call `std::process::exit`;
//!   they return a status code and let the caller decide when to leave
//!   the process.
//! - A `clap` parse failure (including `--help`/`--version`) is rendered
//!   to the caller-supplied stdout/stderr, never the real process
//!   streams directly, so it is testable the same way as a transfer
//!   failure.

mod args;
mod client;
mod error;
mod logging;
mod operand;
mod server;

use std::ffi::OsString;
use std::io::Write;

use clap::Parser;

pub use args::{ClientArgs, ServerArgs};
pub use error::CliError;
pub use logging::init_tracing;
pub use operand::parse_operand;

/// Largest value [`exit_code_from`] will pass through; matches the
/// platform's `ExitCode` byte range.
const MAX_EXIT_CODE: i32 = 255;

/// Converts a numeric status (0 = success, per spec §6 "Exit codes") into
/// an [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    std::process::ExitCode::from(status.clamp(0, MAX_EXIT_CODE) as u8)
}

/// Parses `arguments` as [`ClientArgs`], unless `--help`/`--version` or a
/// parse error short-circuits first, in which case clap's own rendering is
/// written to `stdout` (help/version) or `stderr` (error) and a status is
/// returned directly.
fn parse_or_report<A, Out, Err>(arguments: Vec<OsString>, stdout: &mut Out, stderr: &mut Err) -> Result<A, i32>
where
    A: Parser,
    Out: Write,
    Err: Write,
{
    match A::try_parse_from(arguments) {
        Ok(parsed) => Ok(parsed),
        Err(e) => {
            let is_display = matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp
                    | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                    | clap::error::ErrorKind::DisplayVersion
            );
            let rendered = e.render();
            if is_display {
                let _ = write!(stdout, "{rendered}");
                Err(0)
            } else {
                let _ = write!(stderr, "{rendered}");
                Err(1)
            }
        }
    }
}

/// Runs the `xcp` client: parses `arguments`, runs the transfer, and
/// returns the process exit status (spec §6, "Exit codes: 0 success, 1
/// any error").
pub fn run_client<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let arguments: Vec<OsString> = arguments.into_iter().map(Into::into).collect();
    let args: ClientArgs = match parse_or_report(arguments, stdout, stderr) {
        Ok(args) => args,
        Err(status) => return status,
    };

    init_tracing(args.verbosity());

    match client::run_transfer(&args) {
        Ok(()) => 0,
        Err(err) => {
            let _ = writeln!(stderr, "xcp: {err}");
            tracing::error!(error = %err, "transfer failed");
            1
        }
    }
}

/// Runs the `xcpd` server: parses `arguments`, binds every configured
/// listener, and serves forever (until the process is killed).
pub fn run_server<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let arguments: Vec<OsString> = arguments.into_iter().map(Into::into).collect();
    let args: ServerArgs = match parse_or_report(arguments, stdout, stderr) {
        Ok(args) => args,
        Err(status) => return status,
    };

    init_tracing(args.verbosity());

    match server::run_daemon(&args) {
        Ok(()) => 0,
        Err(err) => {
            let _ = writeln!(stderr, "xcpd: {err}");
            tracing::error!(error = %err, "server exited with an error");
            1
        }
    }
}
