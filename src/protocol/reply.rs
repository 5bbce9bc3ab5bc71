use bytes::{Buf, BufMut, BytesMut};

use super::packet::{capabilities::*, put_lenenc_int, read_lenenc_int, status_flags, Packet};

/// OK packet
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

impl OkPacket {
    pub fn new() -> Self {
        Self {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: status_flags::SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
        }
    }

    pub fn with_affected_rows(affected_rows: u64, warnings: u16) -> Self {
        Self {
            affected_rows,
            warnings,
            ..Self::new()
        }
    }

    pub fn encode(&self, sequence_id: u8, capabilities: u32) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u8(0x00);
        put_lenenc_int(&mut buf, self.affected_rows);
        put_lenenc_int(&mut buf, self.last_insert_id);

        if capabilities & CLIENT_PROTOCOL_41 != 0 {
            buf.put_u16_le(self.status_flags);
            buf.put_u16_le(self.warnings);
        }

        Packet::new(sequence_id, buf.freeze())
    }

    /// Parse from an OK payload (first byte 0x00)
    pub fn parse(payload: &[u8], capabilities: u32) -> Option<Self> {
        if payload.first() != Some(&0x00) {
            return None;
        }
        let mut rest = &payload[1..];

        let (affected_rows, n) = read_lenenc_int(rest)?;
        rest = &rest[n..];
        let (last_insert_id, n) = read_lenenc_int(rest)?;
        rest = &rest[n..];

        let (status_flags, warnings) = if capabilities & CLIENT_PROTOCOL_41 != 0 && rest.len() >= 4
        {
            let mut buf = rest;
            (buf.get_u16_le(), buf.get_u16_le())
        } else {
            (0, 0)
        };

        Some(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
        })
    }

    pub fn has_more_results(&self) -> bool {
        self.status_flags & status_flags::SERVER_MORE_RESULTS_EXISTS != 0
    }
}

/// ERR packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    pub fn new(error_code: u16, sql_state: &str, error_message: &str) -> Self {
        Self {
            error_code,
            sql_state: sql_state.to_string(),
            error_message: error_message.to_string(),
        }
    }

    pub fn encode(&self, sequence_id: u8, capabilities: u32) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u8(0xFF);
        buf.put_u16_le(self.error_code);

        if capabilities & CLIENT_PROTOCOL_41 != 0 {
            buf.put_u8(b'#');
            buf.extend_from_slice(self.sql_state.as_bytes());
        }

        buf.extend_from_slice(self.error_message.as_bytes());

        Packet::new(sequence_id, buf.freeze())
    }

    /// Parse from an ERR payload (first byte 0xFF)
    pub fn parse(payload: &[u8], capabilities: u32) -> Option<Self> {
        if payload.first() != Some(&0xFF) {
            return None;
        }

        let mut buf = &payload[1..];
        if buf.len() < 2 {
            return None;
        }
        let error_code = buf.get_u16_le();

        let (sql_state, error_message) = if capabilities & CLIENT_PROTOCOL_41 != 0
            && buf.first() == Some(&b'#')
            && buf.len() >= 6
        {
            buf.advance(1);
            let sql_state = String::from_utf8_lossy(&buf[..5]).to_string();
            buf.advance(5);
            (sql_state, String::from_utf8_lossy(buf).to_string())
        } else {
            ("HY000".to_string(), String::from_utf8_lossy(buf).to_string())
        };

        Some(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

/// EOF packet (non-DEPRECATE_EOF protocol)
#[derive(Debug, Clone, Default)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

impl EofPacket {
    pub fn new() -> Self {
        Self {
            warnings: 0,
            status_flags: status_flags::SERVER_STATUS_AUTOCOMMIT,
        }
    }

    pub fn encode(&self, sequence_id: u8) -> Packet {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(0xFE);
        buf.put_u16_le(self.warnings);
        buf.put_u16_le(self.status_flags);
        Packet::new(sequence_id, buf.freeze())
    }

    /// Parse from an EOF payload (first byte 0xFE, shorter than 9 bytes)
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.first() != Some(&0xFE) || payload.len() >= 9 {
            return None;
        }
        let mut buf = &payload[1..];
        let (warnings, status_flags) = if buf.len() >= 4 {
            (buf.get_u16_le(), buf.get_u16_le())
        } else {
            (0, 0)
        };
        Some(Self {
            warnings,
            status_flags,
        })
    }

    pub fn has_more_results(&self) -> bool {
        self.status_flags & status_flags::SERVER_MORE_RESULTS_EXISTS != 0
    }
}
