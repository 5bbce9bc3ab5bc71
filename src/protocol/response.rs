//! Per-backend response tracking.
//!
//! Every dbgroup execution context owns one `ResponseTracker`, so shards
//! queried by the same fan-out statement can each be at a different point in
//! their own reply. A fan-out is complete only when every tracker is done.

use super::packet::{
    is_eof_packet, is_err_packet, is_local_infile_packet, is_ok_packet, read_lenenc_int,
    capabilities::CLIENT_DEPRECATE_EOF, Command,
};
use super::reply::{EofPacket, ErrPacket, OkPacket};

/// Where the backend is in its reply to the outstanding command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// No command outstanding
    Idle,
    /// Command sent, first reply packet not yet seen
    AwaitingResponse,
    /// Consuming column definitions
    FieldDefs,
    /// Consuming row packets
    Rows,
    /// Backend requested LOCAL INFILE data, waiting for the closing OK/ERR
    LocalInfile,
    /// Reply fully consumed
    Done,
}

/// Classification of one fed reply packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Ok,
    Err,
    /// EOF separating column definitions from rows
    FieldsTerminated,
    /// EOF (or terminal OK under DEPRECATE_EOF) ending a row phase
    RowsTerminated,
    ColumnCount(u64),
    FieldDef,
    Row,
    LocalInfileRequest,
    /// Single free-form payload (COM_STATISTICS)
    Plain,
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("unexpected packet in state {state:?} (first byte {first_byte:#04x})")]
    UnexpectedPacket {
        state: ResponseState,
        first_byte: u8,
    },
    #[error("reply packet fed while no command is outstanding")]
    NoCommandOutstanding,
}

/// Response state machine, one instance per dbgroup context
#[derive(Debug)]
pub struct ResponseTracker {
    command: Command,
    state: ResponseState,
    capabilities: u32,
    columns: u64,
    columns_seen: u64,
    rows_seen: u64,
    /// Last OK (or terminal EOF status) seen, for affected-rows/warning merge
    last_ok: Option<OkPacket>,
    last_err: Option<ErrPacket>,
}

impl ResponseTracker {
    pub fn new(capabilities: u32) -> Self {
        Self {
            command: Command::Unknown,
            state: ResponseState::Idle,
            capabilities,
            columns: 0,
            columns_seen: 0,
            rows_seen: 0,
            last_ok: None,
            last_err: None,
        }
    }

    /// Arm the tracker for a freshly sent command
    pub fn start(&mut self, command: Command) {
        self.command = command;
        self.columns = 0;
        self.columns_seen = 0;
        self.rows_seen = 0;
        self.last_ok = None;
        self.last_err = None;
        // COM_QUIT and COM_STMT_CLOSE have no reply at all
        self.state = match command {
            Command::Quit | Command::StmtClose => ResponseState::Done,
            _ => ResponseState::AwaitingResponse,
        };
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ResponseState::Done
    }

    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    pub fn last_ok(&self) -> Option<&OkPacket> {
        self.last_ok.as_ref()
    }

    pub fn last_err(&self) -> Option<&ErrPacket> {
        self.last_err.as_ref()
    }

    /// Feed one reply payload, advancing the state machine
    pub fn feed(&mut self, payload: &[u8]) -> Result<ResponseEvent, ResponseError> {
        match self.state {
            ResponseState::Idle | ResponseState::Done => Err(ResponseError::NoCommandOutstanding),
            ResponseState::AwaitingResponse => self.feed_first(payload),
            ResponseState::FieldDefs => self.feed_field_def(payload),
            ResponseState::Rows => self.feed_row(payload),
            ResponseState::LocalInfile => self.feed_infile_result(payload),
        }
    }

    fn feed_first(&mut self, payload: &[u8]) -> Result<ResponseEvent, ResponseError> {
        if is_err_packet(payload) {
            self.last_err = ErrPacket::parse(payload, self.capabilities);
            self.state = ResponseState::Done;
            return Ok(ResponseEvent::Err);
        }

        match self.command {
            Command::Query | Command::StmtExecute => {
                if is_ok_packet(payload) {
                    let ok = OkPacket::parse(payload, self.capabilities);
                    let more = ok.as_ref().is_some_and(OkPacket::has_more_results);
                    self.accumulate_ok(ok);
                    self.state = if more {
                        ResponseState::AwaitingResponse
                    } else {
                        ResponseState::Done
                    };
                    Ok(ResponseEvent::Ok)
                } else if is_local_infile_packet(payload) {
                    self.state = ResponseState::LocalInfile;
                    Ok(ResponseEvent::LocalInfileRequest)
                } else if let Some((count, _)) = read_lenenc_int(payload) {
                    self.columns = count;
                    self.columns_seen = 0;
                    self.state = ResponseState::FieldDefs;
                    Ok(ResponseEvent::ColumnCount(count))
                } else {
                    Err(self.unexpected(payload))
                }
            }
            Command::FieldList => {
                if is_eof_packet(payload, self.capabilities) {
                    self.state = ResponseState::Done;
                    Ok(ResponseEvent::FieldsTerminated)
                } else {
                    // stays in AwaitingResponse: defs keep arriving until EOF
                    Ok(ResponseEvent::FieldDef)
                }
            }
            Command::Statistics => {
                self.state = ResponseState::Done;
                Ok(ResponseEvent::Plain)
            }
            // InitDb, Ping, ChangeUser, SetOption, ResetConnection, ...
            _ => {
                if is_ok_packet(payload) || is_eof_packet(payload, self.capabilities) {
                    self.accumulate_ok(OkPacket::parse(payload, self.capabilities));
                    self.state = ResponseState::Done;
                    Ok(ResponseEvent::Ok)
                } else {
                    Err(self.unexpected(payload))
                }
            }
        }
    }

    fn feed_field_def(&mut self, payload: &[u8]) -> Result<ResponseEvent, ResponseError> {
        if is_eof_packet(payload, self.capabilities) {
            self.state = ResponseState::Rows;
            return Ok(ResponseEvent::FieldsTerminated);
        }

        self.columns_seen += 1;
        // under DEPRECATE_EOF there is no separator, the row phase starts
        // right after the promised number of definitions
        if self.capabilities & CLIENT_DEPRECATE_EOF != 0 && self.columns_seen >= self.columns {
            self.state = ResponseState::Rows;
        }
        Ok(ResponseEvent::FieldDef)
    }

    fn feed_row(&mut self, payload: &[u8]) -> Result<ResponseEvent, ResponseError> {
        if is_err_packet(payload) {
            self.last_err = ErrPacket::parse(payload, self.capabilities);
            self.state = ResponseState::Done;
            return Ok(ResponseEvent::Err);
        }

        let terminal = if self.capabilities & CLIENT_DEPRECATE_EOF != 0 {
            // terminal marker is an OK packet with 0xFE header
            is_ok_packet(payload) || (payload.first() == Some(&0xFE) && payload.len() < 0xFF_FF_FF)
        } else {
            is_eof_packet(payload, self.capabilities)
        };

        if terminal {
            let more = if let Some(eof) = EofPacket::parse(payload) {
                let more = eof.has_more_results();
                self.accumulate_eof(&eof);
                more
            } else if let Some(ok) = OkPacket::parse(payload, self.capabilities) {
                let more = ok.has_more_results();
                self.accumulate_ok(Some(ok));
                more
            } else {
                false
            };
            self.state = if more {
                ResponseState::AwaitingResponse
            } else {
                ResponseState::Done
            };
            return Ok(ResponseEvent::RowsTerminated);
        }

        self.rows_seen += 1;
        Ok(ResponseEvent::Row)
    }

    fn feed_infile_result(&mut self, payload: &[u8]) -> Result<ResponseEvent, ResponseError> {
        if is_err_packet(payload) {
            self.last_err = ErrPacket::parse(payload, self.capabilities);
            self.state = ResponseState::Done;
            Ok(ResponseEvent::Err)
        } else if is_ok_packet(payload) {
            self.accumulate_ok(OkPacket::parse(payload, self.capabilities));
            self.state = ResponseState::Done;
            Ok(ResponseEvent::Ok)
        } else {
            Err(self.unexpected(payload))
        }
    }

    fn accumulate_ok(&mut self, ok: Option<OkPacket>) {
        if let Some(ok) = ok {
            match &mut self.last_ok {
                Some(acc) => {
                    // multi-resultset: totals add up, flags follow the latest
                    acc.affected_rows += ok.affected_rows;
                    acc.warnings += ok.warnings;
                    acc.last_insert_id = ok.last_insert_id;
                    acc.status_flags = ok.status_flags;
                }
                None => self.last_ok = Some(ok),
            }
        }
    }

    fn accumulate_eof(&mut self, eof: &EofPacket) {
        let acc = self.last_ok.get_or_insert_with(OkPacket::new);
        acc.warnings += eof.warnings;
        acc.status_flags = eof.status_flags;
    }

    fn unexpected(&self, payload: &[u8]) -> ResponseError {
        ResponseError::UnexpectedPacket {
            state: self.state,
            first_byte: payload.first().copied().unwrap_or(0),
        }
    }
}
