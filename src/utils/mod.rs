//! Small filesystem and address helpers shared by the merger and the web
//! layer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};

/// Sibling path the writers stream into before the atomic rename.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically replace `dst` with `tmp`. Concurrent readers see either the
/// old file or the fully-new file, never a partial one.
pub fn replace_file_atomic(tmp: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::rename(tmp, dst)
}

/// Best-effort removal of a stale temp file; missing files are fine.
pub fn remove_file_quiet(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Host to advertise in discovery URLs for a bound listener.
///
/// A wildcard bind is resolved to the address the default route would use,
/// falling back to loopback when no route is available.
pub fn advertised_host(addr: SocketAddr) -> IpAddr {
    if !addr.ip().is_unspecified() {
        return addr.ip();
    }

    // Connecting a UDP socket picks a local address without sending traffic.
    let probed = UdpSocket::bind(("0.0.0.0", 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .map(|local| local.ip());

    probed.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
