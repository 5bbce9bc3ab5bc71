use bytes::Bytes;

use super::packet::Command;

/// Parsed command from the client
#[derive(Debug, Clone)]
pub enum ClientCommand {
    Query(String),
    InitDb(String),
    Quit,
    Ping,
    FieldList { table: String, wildcard: String },
    Unknown(u8, Bytes),
}

impl ClientCommand {
    /// Parse command from packet payload
    pub fn parse(payload: &Bytes) -> Self {
        if payload.is_empty() {
            return ClientCommand::Unknown(0, Bytes::new());
        }

        let cmd = Command::from(payload[0]);
        let data = payload.slice(1..);

        match cmd {
            Command::Query => ClientCommand::Query(String::from_utf8_lossy(&data).to_string()),
            Command::InitDb => ClientCommand::InitDb(String::from_utf8_lossy(&data).to_string()),
            Command::Quit => ClientCommand::Quit,
            Command::Ping => ClientCommand::Ping,
            Command::FieldList => {
                // table name is null-terminated, wildcard follows
                let null_pos = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                let table = String::from_utf8_lossy(&data[..null_pos]).to_string();
                let wildcard = if null_pos + 1 < data.len() {
                    String::from_utf8_lossy(&data[null_pos + 1..]).to_string()
                } else {
                    String::new()
                };
                ClientCommand::FieldList { table, wildcard }
            }
            _ => ClientCommand::Unknown(payload[0], data),
        }
    }

    pub fn command(&self) -> Command {
        match self {
            ClientCommand::Query(_) => Command::Query,
            ClientCommand::InitDb(_) => Command::InitDb,
            ClientCommand::Quit => Command::Quit,
            ClientCommand::Ping => Command::Ping,
            ClientCommand::FieldList { .. } => Command::FieldList,
            ClientCommand::Unknown(byte, _) => Command::from(*byte),
        }
    }
}

/// Check whether the statement carries a leading `/*MASTER*/` hint,
/// forcing master routing even for reads.
pub fn has_master_hint(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let prefix = "/*MASTER*/";
    trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let payload = Bytes::from_static(b"\x03SELECT 1");
        match ClientCommand::parse(&payload) {
            ClientCommand::Query(sql) => assert_eq!(sql, "SELECT 1"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_init_db() {
        let payload = Bytes::from_static(b"\x02orders");
        match ClientCommand::parse(&payload) {
            ClientCommand::InitDb(db) => assert_eq!(db, "orders"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_field_list() {
        let payload = Bytes::from_static(b"\x04users\0%");
        match ClientCommand::parse(&payload) {
            ClientCommand::FieldList { table, wildcard } => {
                assert_eq!(table, "users");
                assert_eq!(wildcard, "%");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_master_hint() {
        assert!(has_master_hint("/*MASTER*/ SELECT * FROM t"));
        assert!(has_master_hint("  /*master*/ select 1"));
        assert!(!has_master_hint("SELECT /*MASTER*/ 1"));
        assert!(!has_master_hint("SELECT 1"));
    }
}
