use crate::pool::{ConnectionError, PooledConnection};
use crate::protocol::{Command, Packet, ResponseTracker};

/// Execution context for one db group within one statement.
///
/// Pairs a backend socket with its own response tracker, so a fan-out can
/// drive N shards that are each at a different point of their reply. The
/// whole fan-out is complete only when every context's tracker is done.
pub struct GroupContext {
    pub group: String,
    pub conn: PooledConnection,
    pub tracker: ResponseTracker,
}

impl GroupContext {
    pub fn new(group: String, conn: PooledConnection) -> Self {
        let tracker = ResponseTracker::new(conn.capabilities());
        Self {
            group,
            conn,
            tracker,
        }
    }

    /// Send a command packet and arm the tracker for its reply
    pub async fn send_command(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        let command = packet
            .payload
            .first()
            .map(|&b| Command::from(b))
            .unwrap_or(Command::Unknown);
        self.tracker.start(command);
        self.conn.send(packet).await
    }

    pub fn is_done(&self) -> bool {
        self.tracker.is_done()
    }
}
