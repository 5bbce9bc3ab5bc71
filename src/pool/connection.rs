use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error};

use crate::config::AuthConfig;
use crate::protocol::{
    capabilities, compute_auth_response, is_err_packet, is_ok_packet, Command, ErrPacket,
    HandshakeResponse, InitialHandshake, Packet, PacketCodec,
};

/// One authenticated socket to a backend MySQL server
pub struct PooledConnection {
    framed: Framed<TcpStream, PacketCodec>,
    addr: String,
    capabilities: u32,
    created_at: Instant,
    last_used_at: Instant,
    /// Current default database on the backend side
    database: Option<String>,
    /// Session variables already applied to this socket
    session_vars: HashMap<String, String>,
    /// Cleared when the socket carries state the pool cannot reconcile
    /// (open transaction, mid-response error)
    reusable: bool,
}

impl PooledConnection {
    /// Open a socket to `addr` and run the mysql_native_password login.
    pub async fn connect(
        addr: &str,
        auth: &AuthConfig,
        database: Option<String>,
    ) -> Result<Self, ConnectionError> {
        debug!(addr, "connecting to backend");

        let stream = TcpStream::connect(addr).await.map_err(|e| {
            error!(addr, error = %e, "backend connect failed");
            ConnectionError::Connect(e.to_string())
        })?;

        let mut framed = Framed::new(stream, PacketCodec);

        let handshake_packet = framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let handshake = InitialHandshake::parse(&handshake_packet.payload)
            .ok_or_else(|| ConnectionError::Protocol("invalid backend handshake".into()))?;

        let auth_response = compute_auth_response(&auth.backend_password, &handshake.scramble);

        let mut caps = capabilities::DEFAULT_CAPABILITIES & handshake.capability_flags;
        if database.is_some() {
            caps |= capabilities::CLIENT_CONNECT_WITH_DB;
        }

        let response = HandshakeResponse {
            capability_flags: caps,
            max_packet_size: 16 * 1024 * 1024,
            character_set: 0x21,
            username: auth.backend_user.clone(),
            auth_response,
            database: database.clone(),
            auth_plugin_name: handshake.auth_plugin_name.clone(),
        };

        framed
            .send(response.encode(1))
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let reply = framed
            .next()
            .await
            .ok_or(ConnectionError::Disconnected)?
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if is_err_packet(&reply.payload) {
            let err = ErrPacket::parse(&reply.payload, caps)
                .unwrap_or_else(|| ErrPacket::new(1045, "28000", "access denied"));
            error!(addr, code = err.error_code, message = %err.error_message,
                "backend authentication failed");
            return Err(ConnectionError::Auth(err.error_message));
        }
        if !is_ok_packet(&reply.payload) {
            return Err(ConnectionError::Protocol(
                "expected OK after handshake response".into(),
            ));
        }

        let now = Instant::now();
        Ok(Self {
            framed,
            addr: addr.to_string(),
            capabilities: caps,
            created_at: now,
            last_used_at: now,
            database,
            session_vars: HashMap::new(),
            reusable: true,
        })
    }

    pub async fn send(&mut self, packet: Packet) -> Result<(), ConnectionError> {
        self.last_used_at = Instant::now();
        self.framed.send(packet).await.map_err(|e| {
            self.reusable = false;
            ConnectionError::Io(e.to_string())
        })
    }

    pub async fn recv(&mut self) -> Result<Packet, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(packet)) => {
                self.last_used_at = Instant::now();
                Ok(packet)
            }
            Some(Err(e)) => {
                self.reusable = false;
                Err(ConnectionError::Io(e.to_string()))
            }
            None => {
                self.reusable = false;
                Err(ConnectionError::Disconnected)
            }
        }
    }

    /// COM_PING; used by the health checker and by pool validation
    pub async fn ping(&mut self) -> bool {
        let packet = Packet::new(0, vec![Command::Ping as u8]);
        if self.send(packet).await.is_err() {
            return false;
        }
        match self.recv().await {
            Ok(reply) => is_ok_packet(&reply.payload),
            Err(_) => false,
        }
    }

    /// COM_INIT_DB to move the socket to another default database
    pub async fn init_db(&mut self, database: &str) -> Result<(), ConnectionError> {
        self.send(Packet::init_db(database)).await?;
        let reply = self.recv().await?;
        if is_err_packet(&reply.payload) {
            let err = ErrPacket::parse(&reply.payload, self.capabilities)
                .unwrap_or_else(|| ErrPacket::new(1049, "42000", "unknown database"));
            return Err(ConnectionError::Database(err.error_message));
        }
        self.database = Some(database.to_string());
        Ok(())
    }

    /// Replay the client's SET variables onto the socket. Applied values are
    /// remembered per socket, so a pooled connection only round-trips for
    /// variables that changed since it last served this session state.
    pub async fn sync_session_vars(
        &mut self,
        vars: &HashMap<String, String>,
    ) -> Result<(), ConnectionError> {
        for (name, value) in vars {
            if self.session_vars.get(name) == Some(value) {
                continue;
            }
            self.send(Packet::query(&set_statement_sql(name, value)))
                .await?;
            let reply = self.recv().await?;
            if is_err_packet(&reply.payload) {
                let err = ErrPacket::parse(&reply.payload, self.capabilities)
                    .unwrap_or_else(|| ErrPacket::new(1193, "HY000", "unknown system variable"));
                return Err(ConnectionError::Database(err.error_message));
            }
            self.session_vars.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn capabilities(&self) -> u32 {
        self.capabilities
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Flag the socket as carrying irreconcilable session state; the pool
    /// will close it instead of keeping it.
    pub fn mark_unreusable(&mut self) {
        self.reusable = false;
    }

    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() > max_age
    }

    pub fn is_idle_too_long(&self, max_idle: Duration) -> bool {
        self.last_used_at.elapsed() > max_idle
    }
}

/// Rebuild the SET statement for one recorded session variable. NAMES and
/// the charset shorthand keep their own syntax.
fn set_statement_sql(name: &str, value: &str) -> String {
    match name {
        "names" => format!("SET NAMES {}", quote_set_value(value)),
        "charset" => format!("SET CHARACTER SET {}", quote_set_value(value)),
        _ => format!("SET {name} = {}", quote_set_value(value)),
    }
}

fn quote_set_value(value: &str) -> String {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if bare {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection closed by backend")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_statement_sql() {
        assert_eq!(set_statement_sql("names", "utf8mb4"), "SET NAMES utf8mb4");
        assert_eq!(
            set_statement_sql("charset", "latin1"),
            "SET CHARACTER SET latin1"
        );
        assert_eq!(set_statement_sql("autocommit", "1"), "SET autocommit = 1");
        assert_eq!(
            set_statement_sql("sql_mode", "STRICT_TRANS_TABLES,NO_ZERO_DATE"),
            "SET sql_mode = 'STRICT_TRANS_TABLES,NO_ZERO_DATE'"
        );
    }

    #[test]
    fn test_quote_set_value_escapes_quotes() {
        assert_eq!(quote_set_value("it's"), "'it''s'");
        assert_eq!(quote_set_value(""), "''");
    }
}
