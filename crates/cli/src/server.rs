//! Binds and runs the `xcpd` server for the lifetime of the process.

use xcp_daemon::Server;

use crate::args::ServerArgs;
use crate::error::CliError;

/// Registers `SIGINT`/`SIGTERM` handlers that call `request_shutdown` on
/// `handle` the moment either arrives, so a graceful `Ctrl-C` or `kill`
/// drains in-flight transfers instead of severing connections mid-write.
/// Unix-only: no handler is installed elsewhere, matching the platform
/// split the rest of the workspace follows for OS-specific glue.
#[cfg(unix)]
fn install_signal_handlers(handle: xcp_daemon::ShutdownHandle) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            tracing::warn!(%err, "could not install signal handlers, relying on process kill");
            return;
        }
    };
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::info!(signal, "received shutdown signal, draining transfers");
            handle.request_shutdown();
        }
    });
}

#[cfg(not(unix))]
fn install_signal_handlers(_handle: xcp_daemon::ShutdownHandle) {}

/// Binds every listener `args` describes and serves until every accept
/// loop thread exits — on `SIGINT`/`SIGTERM` that happens as soon as the
/// next connection each listener accepts is woken and observed to be a
/// shutdown probe; otherwise only a process kill ends the loop.
pub fn run_daemon(args: &ServerArgs) -> Result<(), CliError> {
    let config = args.to_config()?;
    let server = Server::bind(&config)?;
    tracing::info!(portal = %server.portal_addr(), "xcpd listening");

    install_signal_handlers(server.shutdown_handle());

    for handle in server.serve() {
        let _ = handle.join();
    }
    Ok(())
}
