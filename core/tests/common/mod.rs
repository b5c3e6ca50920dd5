//! Shared helpers for dirbridge core integration tests.
//!
//! Filesystem tests build fixtures in temp directories. The SSH tests need
//! an SFTP server on `127.0.0.1:2222` (user `testuser`, password
//! `testpass`) and skip at runtime when it is not reachable.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module.
#![allow(dead_code)]

use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use dirbridge_core::config::{AuthMethod, SshConfig};

pub const SSH_TEST_PORT: u16 = 2222;

/// Check if a TCP port is reachable on the given host within 2 seconds.
pub fn is_port_reachable(host: &str, port: u16) -> bool {
    let addr = format!("{host}:{port}");
    if let Ok(addr) = addr.parse() {
        TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok()
    } else {
        false
    }
}

/// Skip the current test if the SSH test server is not reachable.
macro_rules! require_ssh {
    () => {
        if !common::is_port_reachable("127.0.0.1", common::SSH_TEST_PORT) {
            eprintln!(
                "SKIPPED: SSH test server not reachable on port {}",
                common::SSH_TEST_PORT
            );
            return;
        }
    };
}
pub(crate) use require_ssh;

pub fn ssh_test_config() -> SshConfig {
    SshConfig {
        host: "127.0.0.1".into(),
        port: SSH_TEST_PORT,
        username: "testuser".into(),
        auth_method: AuthMethod::Password,
        password: Some("testpass".into()),
        key_path: None,
    }
}

/// Forward-slash string form of a path.
pub fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Create `files` (relative path, contents) and `dirs` under `root`.
pub fn build_tree(root: &Path, files: &[(&str, &[u8])], dirs: &[&str]) {
    for dir in dirs {
        std::fs::create_dir_all(root.join(dir)).expect("create fixture dir");
    }
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture parent");
        }
        std::fs::write(path, contents).expect("write fixture file");
    }
}
