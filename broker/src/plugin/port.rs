//! Local port allocation for plugin gRPC servers

use std::net::TcpListener;

use tracing::debug;

use crate::errors::{PluginError, PluginResult};

/// Find the first port in `[start, start + max_attempts)` that can be bound
/// on the loopback interface
///
/// The probe listener is dropped before returning, so another process may
/// claim the port before the plugin binds it.
pub fn find_available_port(start: u16, max_attempts: u16) -> PluginResult<u16> {
    let end = u32::from(start) + u32::from(max_attempts);

    for candidate in u32::from(start)..end.min(u32::from(u16::MAX) + 1) {
        let port = candidate as u16;
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                drop(listener);
                debug!(port = port, "Found available plugin port");
                return Ok(port);
            }
            Err(e) => {
                debug!(port = port, error = %e, "Port unavailable");
            }
        }
    }

    Err(PluginError::NoPortAvailable { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_port() -> u16 {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_returns_start_when_free() {
        let port = free_port();
        assert_eq!(find_available_port(port, 1).unwrap(), port);
    }

    #[test]
    fn test_skips_occupied_port() {
        // Hold a port and make sure the next free candidate is returned
        let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let busy = held.local_addr().unwrap().port();
        if busy == u16::MAX {
            return;
        }

        let found = find_available_port(busy, 50).unwrap();
        assert_ne!(found, busy);
        assert!(found > busy);
    }

    #[test]
    fn test_exhausted_range() {
        let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let busy = held.local_addr().unwrap().port();

        let err = find_available_port(busy, 1).unwrap_err();
        assert!(matches!(err, PluginError::NoPortAvailable { start, .. } if start == busy));
    }

    #[test]
    fn test_zero_attempts_fails() {
        assert!(find_available_port(50051, 0).is_err());
    }
}
