use bytes::{Buf, BufMut, Bytes, BytesMut};

/// MySQL packet header size: 3 bytes length + 1 byte sequence
pub const PACKET_HEADER_SIZE: usize = 4;
/// Maximum packet payload size (16MB - 1)
pub const MAX_PACKET_SIZE: usize = 0xFF_FF_FF;

/// MySQL wire protocol packet
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence_id,
            payload: payload.into(),
        }
    }

    /// Build a COM_QUERY packet for the given SQL text
    pub fn query(sql: &str) -> Self {
        let mut payload = BytesMut::with_capacity(sql.len() + 1);
        payload.put_u8(Command::Query as u8);
        payload.extend_from_slice(sql.as_bytes());
        Self::new(0, payload.freeze())
    }

    /// Build a COM_INIT_DB packet
    pub fn init_db(database: &str) -> Self {
        let mut payload = BytesMut::with_capacity(database.len() + 1);
        payload.put_u8(Command::InitDb as u8);
        payload.extend_from_slice(database.as_bytes());
        Self::new(0, payload.freeze())
    }

    /// Encode packet to bytes (header + payload)
    pub fn encode(&self, dst: &mut BytesMut) {
        let len = self.payload.len();
        // 3 bytes for length (little endian)
        dst.put_u8((len & 0xFF) as u8);
        dst.put_u8(((len >> 8) & 0xFF) as u8);
        dst.put_u8(((len >> 16) & 0xFF) as u8);
        dst.put_u8(self.sequence_id);
        dst.extend_from_slice(&self.payload);
    }

    /// Try to decode a packet from the buffer, returns None if not enough data
    pub fn decode(src: &mut BytesMut) -> Option<Self> {
        if src.len() < PACKET_HEADER_SIZE {
            return None;
        }

        let len = src[0] as usize | ((src[1] as usize) << 8) | ((src[2] as usize) << 16);
        let total_len = PACKET_HEADER_SIZE + len;
        if src.len() < total_len {
            return None;
        }

        let sequence_id = src[3];
        src.advance(PACKET_HEADER_SIZE);
        let payload = src.split_to(len).freeze();

        Some(Self {
            sequence_id,
            payload,
        })
    }
}

/// MySQL capability flags
#[allow(dead_code)]
pub mod capabilities {
    pub const CLIENT_LONG_PASSWORD: u32 = 1;
    pub const CLIENT_FOUND_ROWS: u32 = 1 << 1;
    pub const CLIENT_LONG_FLAG: u32 = 1 << 2;
    pub const CLIENT_CONNECT_WITH_DB: u32 = 1 << 3;
    pub const CLIENT_LOCAL_FILES: u32 = 1 << 7;
    pub const CLIENT_PROTOCOL_41: u32 = 1 << 9;
    pub const CLIENT_SSL: u32 = 1 << 11;
    pub const CLIENT_TRANSACTIONS: u32 = 1 << 14;
    pub const CLIENT_SECURE_CONNECTION: u32 = 1 << 15;
    pub const CLIENT_MULTI_STATEMENTS: u32 = 1 << 16;
    pub const CLIENT_MULTI_RESULTS: u32 = 1 << 17;
    pub const CLIENT_PLUGIN_AUTH: u32 = 1 << 19;
    pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 1 << 21;
    pub const CLIENT_DEPRECATE_EOF: u32 = 1 << 24;

    /// Default capabilities advertised by the proxy.
    ///
    /// CLIENT_MULTI_STATEMENTS is not included: the router handles exactly one
    /// statement per COM_QUERY. CLIENT_DEPRECATE_EOF is not included because
    /// some backends negotiate it and still send EOF packets.
    pub const DEFAULT_CAPABILITIES: u32 = CLIENT_LONG_PASSWORD
        | CLIENT_FOUND_ROWS
        | CLIENT_LONG_FLAG
        | CLIENT_CONNECT_WITH_DB
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH;
}

/// Server status flags carried in OK/EOF packets
#[allow(dead_code)]
pub mod status_flags {
    pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
    pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;
    pub const SERVER_MORE_RESULTS_EXISTS: u16 = 0x0008;
    pub const SERVER_STATUS_CURSOR_EXISTS: u16 = 0x0040;
    pub const SERVER_STATUS_LAST_ROW_SENT: u16 = 0x0080;
}

/// Commands the proxy cares about (subset of the COM_* space)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Quit = 0x01,
    InitDb = 0x02,
    Query = 0x03,
    FieldList = 0x04,
    Statistics = 0x09,
    Ping = 0x0e,
    ChangeUser = 0x11,
    StmtPrepare = 0x16,
    StmtExecute = 0x17,
    StmtClose = 0x19,
    SetOption = 0x1b,
    ResetConnection = 0x1f,
    Unknown = 0xff,
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Command::Quit,
            0x02 => Command::InitDb,
            0x03 => Command::Query,
            0x04 => Command::FieldList,
            0x09 => Command::Statistics,
            0x0e => Command::Ping,
            0x11 => Command::ChangeUser,
            0x16 => Command::StmtPrepare,
            0x17 => Command::StmtExecute,
            0x19 => Command::StmtClose,
            0x1b => Command::SetOption,
            0x1f => Command::ResetConnection,
            _ => Command::Unknown,
        }
    }
}

/// Check if a payload is an OK packet
pub fn is_ok_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == 0x00
}

/// Check if a payload is an ERR packet
pub fn is_err_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == 0xFF
}

/// Check if a payload is an EOF packet (always shorter than 9 bytes)
pub fn is_eof_packet(payload: &[u8], capabilities: u32) -> bool {
    if capabilities & capabilities::CLIENT_DEPRECATE_EOF != 0 {
        false
    } else {
        !payload.is_empty() && payload[0] == 0xFE && payload.len() < 9
    }
}

/// Check if a payload is the LOCAL INFILE request marker
pub fn is_local_infile_packet(payload: &[u8]) -> bool {
    !payload.is_empty() && payload[0] == 0xFB
}

/// Read a length-encoded integer, returning the value and bytes consumed
pub fn read_lenenc_int(data: &[u8]) -> Option<(u64, usize)> {
    match *data.first()? {
        v @ 0x00..=0xFA => Some((v as u64, 1)),
        0xFC if data.len() >= 3 => Some((u16::from_le_bytes([data[1], data[2]]) as u64, 3)),
        0xFD if data.len() >= 4 => {
            Some((u32::from_le_bytes([data[1], data[2], data[3], 0]) as u64, 4))
        }
        0xFE if data.len() >= 9 => Some((
            u64::from_le_bytes([
                data[1], data[2], data[3], data[4], data[5], data[6], data[7], data[8],
            ]),
            9,
        )),
        _ => None,
    }
}

/// Append a length-encoded integer
pub fn put_lenenc_int(buf: &mut BytesMut, value: u64) {
    if value < 251 {
        buf.put_u8(value as u8);
    } else if value < 65536 {
        buf.put_u8(0xFC);
        buf.put_u16_le(value as u16);
    } else if value < 16777216 {
        buf.put_u8(0xFD);
        buf.put_u8((value & 0xFF) as u8);
        buf.put_u8(((value >> 8) & 0xFF) as u8);
        buf.put_u8(((value >> 16) & 0xFF) as u8);
    } else {
        buf.put_u8(0xFE);
        buf.put_u64_le(value);
    }
}
