use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Per-client connection state.
#[derive(Debug)]
pub struct ClientState {
    pub id: u64,
    pub peer: SocketAddr,
    pub should_close: bool,
    /// Commands executed on this connection.
    pub commands: u64,
}

impl ClientState {
    pub fn new(peer: SocketAddr) -> Self {
        ClientState {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            should_close: false,
            commands: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_unique() {
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let a = ClientState::new(peer);
        let b = ClientState::new(peer);
        assert_ne!(a.id, b.id);
        assert!(!a.should_close);
    }
}
