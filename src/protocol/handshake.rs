use bytes::{Buf, BufMut, BytesMut};
use sha1::{Digest, Sha1};

use super::packet::{capabilities::*, Packet};

/// MySQL initial handshake packet (server -> client)
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    /// 20-byte auth scramble (8 + 12 on the wire)
    pub scramble: Vec<u8>,
    pub capability_flags: u32,
    pub character_set: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

impl InitialHandshake {
    /// Create the handshake the proxy presents to clients
    pub fn new(connection_id: u32) -> Self {
        use rand::RngCore;
        let mut scramble = vec![0u8; 20];
        rand::thread_rng().fill_bytes(&mut scramble);
        // scramble bytes must not be NUL, clients treat 0 as a terminator
        for b in &mut scramble {
            if *b == 0 {
                *b = b'*';
            }
        }

        Self {
            protocol_version: 10,
            server_version: "8.0.0-artemis".to_string(),
            connection_id,
            scramble,
            capability_flags: DEFAULT_CAPABILITIES,
            character_set: 0x21, // utf8_general_ci
            status_flags: 0x0002,
            auth_plugin_name: "mysql_native_password".to_string(),
        }
    }

    pub fn encode(&self) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u8(self.protocol_version);
        buf.extend_from_slice(self.server_version.as_bytes());
        buf.put_u8(0);
        buf.put_u32_le(self.connection_id);

        // scramble part 1 (8 bytes) + filler
        buf.extend_from_slice(&self.scramble[..8]);
        buf.put_u8(0);

        buf.put_u16_le((self.capability_flags & 0xFFFF) as u16);
        buf.put_u8(self.character_set);
        buf.put_u16_le(self.status_flags);
        buf.put_u16_le(((self.capability_flags >> 16) & 0xFFFF) as u16);

        if self.capability_flags & CLIENT_PLUGIN_AUTH != 0 {
            buf.put_u8(self.scramble.len() as u8 + 1);
        } else {
            buf.put_u8(0);
        }
        buf.extend_from_slice(&[0u8; 10]);

        // scramble part 2 + terminator
        if self.capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            buf.extend_from_slice(&self.scramble[8..]);
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_PLUGIN_AUTH != 0 {
            buf.extend_from_slice(self.auth_plugin_name.as_bytes());
            buf.put_u8(0);
        }

        Packet::new(0, buf.freeze())
    }

    /// Parse a handshake received from a backend server
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 32 {
            return None;
        }
        let mut buf = payload;

        let protocol_version = buf.get_u8();
        let null_pos = buf.iter().position(|&b| b == 0)?;
        let server_version = String::from_utf8_lossy(&buf[..null_pos]).to_string();
        buf.advance(null_pos + 1);

        let connection_id = buf.get_u32_le();

        let mut scramble = buf[..8].to_vec();
        buf.advance(9); // 8 scramble bytes + filler

        let capability_low = buf.get_u16_le() as u32;
        let character_set = buf.get_u8();
        let status_flags = buf.get_u16_le();
        let capability_high = buf.get_u16_le() as u32;
        let capability_flags = capability_low | (capability_high << 16);

        let scramble_len = buf.get_u8() as usize;
        buf.advance(10);

        if capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            let part2_len = scramble_len.max(21).saturating_sub(9);
            if buf.len() < part2_len {
                return None;
            }
            let taken = buf[..part2_len]
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(part2_len);
            scramble.extend_from_slice(&buf[..taken]);
            buf.advance(part2_len);
        }

        let auth_plugin_name = if capability_flags & CLIENT_PLUGIN_AUTH != 0 && !buf.is_empty() {
            let null_pos = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            String::from_utf8_lossy(&buf[..null_pos]).to_string()
        } else {
            "mysql_native_password".to_string()
        };

        Some(Self {
            protocol_version,
            server_version,
            connection_id,
            scramble,
            capability_flags,
            character_set,
            status_flags,
            auth_plugin_name,
        })
    }
}

/// MySQL handshake response packet (client -> server)
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin_name: String,
}

impl HandshakeResponse {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 32 {
            return None;
        }
        let mut buf = payload;

        let capability_flags = buf.get_u32_le();
        let max_packet_size = buf.get_u32_le();
        let character_set = buf.get_u8();
        buf.advance(23);

        let null_pos = buf.iter().position(|&b| b == 0)?;
        let username = String::from_utf8_lossy(&buf[..null_pos]).to_string();
        buf.advance(null_pos + 1);

        let auth_response = if capability_flags
            & (CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA | CLIENT_SECURE_CONNECTION)
            != 0
        {
            let len = buf.get_u8() as usize;
            if buf.len() < len {
                return None;
            }
            let data = buf[..len].to_vec();
            buf.advance(len);
            data
        } else {
            let null_pos = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            let data = buf[..null_pos].to_vec();
            buf.advance((null_pos + 1).min(buf.len()));
            data
        };

        let database = if capability_flags & CLIENT_CONNECT_WITH_DB != 0 && !buf.is_empty() {
            let null_pos = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            let db = String::from_utf8_lossy(&buf[..null_pos]).to_string();
            buf.advance((null_pos + 1).min(buf.len()));
            (!db.is_empty()).then_some(db)
        } else {
            None
        };

        let auth_plugin_name = if capability_flags & CLIENT_PLUGIN_AUTH != 0 && !buf.is_empty() {
            let null_pos = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            String::from_utf8_lossy(&buf[..null_pos]).to_string()
        } else {
            "mysql_native_password".to_string()
        };

        Some(Self {
            capability_flags,
            max_packet_size,
            character_set,
            username,
            auth_response,
            database,
            auth_plugin_name,
        })
    }

    /// Encode the response the proxy sends when logging into a backend
    pub fn encode(&self, sequence_id: u8) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u32_le(self.capability_flags);
        buf.put_u32_le(self.max_packet_size);
        buf.put_u8(self.character_set);
        buf.extend_from_slice(&[0u8; 23]);

        buf.extend_from_slice(self.username.as_bytes());
        buf.put_u8(0);

        if self.capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            buf.put_u8(self.auth_response.len() as u8);
            buf.extend_from_slice(&self.auth_response);
        } else {
            buf.extend_from_slice(&self.auth_response);
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_CONNECT_WITH_DB != 0 {
            if let Some(ref db) = self.database {
                buf.extend_from_slice(db.as_bytes());
            }
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_PLUGIN_AUTH != 0 {
            buf.extend_from_slice(self.auth_plugin_name.as_bytes());
            buf.put_u8(0);
        }

        Packet::new(sequence_id, buf.freeze())
    }
}

/// Compute the mysql_native_password auth response:
/// `SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))`
pub fn compute_auth_response(password: &str, scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hash1 = Sha1::digest(password.as_bytes());
    let hash2 = Sha1::digest(hash1);

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(hash2);
    let hash3 = hasher.finalize();

    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}
