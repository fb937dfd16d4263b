//! Resolves a parsed [`ClientArgs`] into a transfer direction and hands it
//! to [`xcp_client::run`].

use std::path::Path;
use std::sync::Arc;

use xcp_config::{ClientConfig, Endpoint};
use xcp_engine::ProgressCallback;
use xcp_identity::RequestedEndpoint;

use crate::args::ClientArgs;
use crate::error::CliError;

/// Runs the transfer `args` describes end to end.
pub fn run_transfer(args: &ClientArgs) -> Result<(), CliError> {
    let config = args.to_config();
    let resolved = resolve_direction(&config)?;

    let addrs = RequestedEndpoint::parse(&resolved.server_host)?
        .resolve(config.port)
        .map_err(|source| CliError::Resolution {
            host: resolved.server_host.clone(),
            source,
        })?;
    if addrs.is_empty() {
        return Err(CliError::Resolution {
            host: resolved.server_host.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses"),
        });
    }

    let user_name = resolved.operand_user.or(config.user.clone());
    let progress = progress_callback();

    let request = xcp_client::TransferRequest {
        server_addrs: &addrs,
        is_from_server_to_client: resolved.is_from_server_to_client,
        server_path: &resolved.server_path,
        local_path: Path::new(&resolved.local_path),
        block_size: config.block_size,
        recursive: config.recursive,
        user_name: user_name.as_deref(),
        progress: Some(progress),
    };

    xcp_client::run(&request).map_err(CliError::from)
}

struct Direction {
    is_from_server_to_client: bool,
    server_host: String,
    operand_user: Option<String>,
    server_path: String,
    local_path: String,
}

/// Classifies `from`/`to` into a direction: exactly one operand must name
/// a remote host (spec §6; remote-to-remote and local-to-local are both
/// configuration errors, not transfers this engine can run).
fn resolve_direction(config: &ClientConfig) -> Result<Direction, CliError> {
    match (&config.from, &config.to) {
        (Endpoint::Local(local), Endpoint::Remote { user, host, path }) => Ok(Direction {
            is_from_server_to_client: false,
            server_host: host.clone(),
            operand_user: user.clone(),
            server_path: path.clone(),
            local_path: local.clone(),
        }),
        (Endpoint::Remote { user, host, path }, Endpoint::Local(local)) => Ok(Direction {
            is_from_server_to_client: true,
            server_host: host.clone(),
            operand_user: user.clone(),
            server_path: path.clone(),
            local_path: local.clone(),
        }),
        (Endpoint::Local(_), Endpoint::Local(_)) => Err(CliError::InvalidArgument(
            "both operands are local paths; xcp copies between a local path and a remote host".to_string(),
        )),
        (Endpoint::Remote { .. }, Endpoint::Remote { .. }) => Err(CliError::InvalidArgument(
            "both operands name a remote host; remote-to-remote copies are not supported".to_string(),
        )),
    }
}

/// Builds the progress callback passed through to the transfer engine,
/// which already rate-limits and coalesces calls (spec §4.3 "Progress
/// reporting"); this just renders one.
fn progress_callback() -> ProgressCallback {
    Arc::new(|transferred: u64, total: u64| {
        tracing::info!(transferred, total, "transfer progress");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(from: Endpoint, to: Endpoint) -> ClientConfig {
        ClientConfig {
            from,
            to,
            port: 62_581,
            user: None,
            block_size: 0,
            recursive: false,
            verbosity: 0,
        }
    }

    #[test]
    fn upload_direction_is_client_to_server() {
        let cfg = config(
            Endpoint::Local("/tmp/a".to_string()),
            Endpoint::Remote {
                user: None,
                host: "server".to_string(),
                path: "/tmp/b".to_string(),
            },
        );
        let dir = resolve_direction(&cfg).unwrap();
        assert!(!dir.is_from_server_to_client);
        assert_eq!(dir.server_host, "server");
        assert_eq!(dir.local_path, "/tmp/a");
    }

    #[test]
    fn download_direction_is_server_to_client() {
        let cfg = config(
            Endpoint::Remote {
                user: Some("alice".to_string()),
                host: "server".to_string(),
                path: "reports/q3.dat".to_string(),
            },
            Endpoint::Local("/tmp/q3".to_string()),
        );
        let dir = resolve_direction(&cfg).unwrap();
        assert!(dir.is_from_server_to_client);
        assert_eq!(dir.operand_user.as_deref(), Some("alice"));
    }

    #[test]
    fn both_local_is_rejected() {
        let cfg = config(
            Endpoint::Local("/tmp/a".to_string()),
            Endpoint::Local("/tmp/b".to_string()),
        );
        assert!(resolve_direction(&cfg).is_err());
    }

    #[test]
    fn both_remote_is_rejected() {
        let remote = |path: &str| Endpoint::Remote {
            user: None,
            host: "server".to_string(),
            path: path.to_string(),
        };
        let cfg = config(remote("/tmp/a"), remote("/tmp/b"));
        assert!(resolve_direction(&cfg).is_err());
    }
}
