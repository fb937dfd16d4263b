//! End-to-end scenarios driving a real loopback `xcpd` (`xcp_daemon::Server`)
//! against the client core directly, covering the spec §8 scenarios that
//! don't require the CLI layer: S1 (small single file), S3 (recursive
//! directory), S5 (version mismatch), and S6 (bad magic), plus an upload
//! direction case the listed scenarios don't otherwise exercise.

use std::net::SocketAddr;

use xcp_config::ServerConfig;
use xcp_daemon::Server;
use xcp_identity::{Identity, ProtocolVersion, RequestedEndpoint};
use xcp_net::Connection;

/// Deterministic filler content, avoiding any dependency on randomness.
fn fill(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn start_server(channel_multiplicity: u32) -> (Server, SocketAddr) {
    let config = ServerConfig {
        portal: RequestedEndpoint::from_parts("127.0.0.1", Some(0), None),
        channels: vec![RequestedEndpoint::from_parts(
            "127.0.0.1",
            Some(0),
            Some(channel_multiplicity),
        )],
        verbosity: 0,
    };
    let server = Server::bind(&config).expect("binding loopback listeners should not fail");
    let addr = server.portal_addr();
    (server, addr)
}

#[test]
fn download_single_file_transfers_identical_bytes_and_permissions() {
    let (server, portal_addr) = start_server(4);
    let _handles = server.serve();

    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("a.bin");
    let content = fill(3 * 1024 + 17);
    std::fs::write(&src_path, &content).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&src_path, std::fs::Permissions::from_mode(0o640)).unwrap();
    }

    let dst_dir = tempfile::tempdir().unwrap();
    let dst_path = dst_dir.path().join("b.bin");

    let request = xcp_client::TransferRequest {
        server_addrs: &[portal_addr],
        is_from_server_to_client: true,
        server_path: src_path.to_str().unwrap(),
        local_path: &dst_path,
        block_size: 512, // fixed, small, to exercise more than one block
        recursive: false,
        user_name: None,
        progress: None,
    };

    xcp_client::run(&request).expect("download should succeed");

    let got = std::fs::read(&dst_path).unwrap();
    assert_eq!(got, content);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&dst_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}

#[test]
fn directory_recursive_transfer_preserves_tree_including_empty_files() {
    let (server, portal_addr) = start_server(3);
    let _handles = server.serve();

    let src_dir = tempfile::tempdir().unwrap();
    let root = src_dir.path().join("payload");
    std::fs::create_dir(&root).unwrap();
    std::fs::create_dir(root.join("sub")).unwrap();
    std::fs::write(root.join("a.bin"), fill(4096)).unwrap();
    std::fs::write(root.join("sub/b.bin"), fill(17)).unwrap();
    std::fs::write(root.join("sub/empty.bin"), b"").unwrap();

    let dst_dir = tempfile::tempdir().unwrap();
    let dst_target = dst_dir.path().join("arrived");

    let request = xcp_client::TransferRequest {
        server_addrs: &[portal_addr],
        is_from_server_to_client: true,
        server_path: root.to_str().unwrap(),
        local_path: &dst_target,
        block_size: 0, // adaptive
        recursive: true,
        user_name: None,
        progress: None,
    };

    xcp_client::run(&request).expect("recursive download should succeed");

    assert_eq!(std::fs::read(dst_target.join("a.bin")).unwrap(), fill(4096));
    assert_eq!(std::fs::read(dst_target.join("sub/b.bin")).unwrap(), fill(17));
    assert_eq!(std::fs::metadata(dst_target.join("sub/empty.bin")).unwrap().len(), 0);
}

#[test]
fn upload_direction_sends_client_file_to_server_path() {
    let (server, portal_addr) = start_server(2);
    let _handles = server.serve();

    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("local.bin");
    let content = fill(9000);
    std::fs::write(&src_path, &content).unwrap();

    let dst_dir = tempfile::tempdir().unwrap();
    let dst_path = dst_dir.path().join("remote.bin");

    let request = xcp_client::TransferRequest {
        server_addrs: &[portal_addr],
        is_from_server_to_client: false,
        server_path: dst_path.to_str().unwrap(),
        local_path: &src_path,
        block_size: 0,
        recursive: false,
        user_name: None,
        progress: None,
    };

    xcp_client::run(&request).expect("upload should succeed");
    assert_eq!(std::fs::read(&dst_path).unwrap(), content);
}

#[test]
fn bad_magic_connection_is_closed_without_disrupting_the_server() {
    let (server, portal_addr) = start_server(1);
    let _handles = server.serve();

    // Twelve zero bytes: neither magic matches, so the dispatcher must
    // close the connection before even looking at the role field.
    let conn = Connection::connect_tcp(portal_addr).unwrap();
    conn.send_all(&[0u8; 12]).unwrap();
    let mut buf = [0u8; 2];
    let err = conn.recv_exact(&mut buf);
    assert!(err.is_err(), "server must not reply to a bad-magic greeting");
    conn.dispose();

    // The server keeps accepting valid connections afterward.
    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("still-alive.bin");
    std::fs::write(&src_path, b"still alive").unwrap();
    let dst_dir = tempfile::tempdir().unwrap();
    let dst_path = dst_dir.path().join("out.bin");

    let request = xcp_client::TransferRequest {
        server_addrs: &[portal_addr],
        is_from_server_to_client: true,
        server_path: src_path.to_str().unwrap(),
        local_path: &dst_path,
        block_size: 0,
        recursive: false,
        user_name: None,
        progress: None,
    };
    xcp_client::run(&request).expect("server should still accept well-formed connections");
    assert_eq!(std::fs::read(&dst_path).unwrap(), b"still alive");
}

#[test]
fn version_mismatch_reports_invalid_and_closes_the_connection() {
    let (server, portal_addr) = start_server(1);
    let _handles = server.serve();

    // This workspace's server only supports `[V1, V1]`; request a range
    // that cannot possibly overlap it.
    let unsupported = ProtocolVersion::from_raw(0x7fff);
    let greeting = xcp_wire::PortalGreeting {
        identity: Identity::new(),
        min_version: unsupported,
        max_version: unsupported,
    };

    let conn = Connection::connect_tcp(portal_addr).unwrap();
    conn.send_all(&greeting.to_bytes()).unwrap();

    let mut chosen = [0u8; 2];
    conn.recv_exact(&mut chosen).unwrap();
    assert_eq!(u16::from_be_bytes(chosen), ProtocolVersion::INVALID.as_raw());

    // The server does not send `SERVER_INFORMATION` after a failed
    // negotiation; the connection is simply closed.
    let mut probe = [0u8; 1];
    assert!(conn.recv_exact(&mut probe).is_err());
}
