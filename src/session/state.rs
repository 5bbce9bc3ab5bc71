use std::collections::HashMap;

/// Where the session is in its transaction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransStage {
    /// No transaction open
    #[default]
    Idle,
    /// BEGIN acknowledged to the client, no group pinned yet
    Pending,
    /// Transaction running on a pinned group
    Pinned,
}

/// Transaction pinning. BEGIN is acknowledged locally and the backend
/// transaction starts lazily, on the first statement that actually routes;
/// from then on every statement goes to the pinned group until
/// COMMIT/ROLLBACK.
#[derive(Debug, Clone, Default)]
pub struct TransactionState {
    stage: TransStage,
    pinned_group: Option<String>,
}

impl TransactionState {
    pub fn stage(&self) -> TransStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != TransStage::Idle
    }

    pub fn pinned_group(&self) -> Option<&str> {
        self.pinned_group.as_deref()
    }

    pub fn begin(&mut self) {
        self.stage = TransStage::Pending;
        self.pinned_group = None;
    }

    pub fn pin(&mut self, group: String) {
        self.stage = TransStage::Pinned;
        self.pinned_group = Some(group);
    }

    pub fn end(&mut self) {
        self.stage = TransStage::Idle;
        self.pinned_group = None;
    }
}

/// Client-visible session state
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub username: String,
    pub database: Option<String>,
    pub capability_flags: u32,
    pub character_set: u8,
    /// SET variables answered locally; replayed onto backend sockets at
    /// checkout so pooled connections see what the client configured
    session_vars: HashMap<String, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_from_handshake(
        &mut self,
        username: String,
        database: Option<String>,
        capabilities: u32,
        charset: u8,
    ) {
        self.username = username;
        self.database = database;
        self.capability_flags = capabilities;
        self.character_set = charset;
    }

    pub fn set_session_var(&mut self, name: String, value: String) {
        self.session_vars.insert(name.to_lowercase(), value);
    }

    pub fn session_vars(&self) -> &HashMap<String, String> {
        &self.session_vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_lifecycle() {
        let mut trans = TransactionState::default();
        assert!(!trans.is_active());

        trans.begin();
        assert!(trans.is_active());
        assert_eq!(trans.stage(), TransStage::Pending);
        assert!(trans.pinned_group().is_none());

        trans.pin("group-2".into());
        assert_eq!(trans.stage(), TransStage::Pinned);
        assert_eq!(trans.pinned_group(), Some("group-2"));

        trans.end();
        assert!(!trans.is_active());
        assert!(trans.pinned_group().is_none());
    }

    #[test]
    fn test_begin_clears_previous_pin() {
        let mut trans = TransactionState::default();
        trans.begin();
        trans.pin("group-1".into());
        trans.end();
        trans.begin();
        assert!(trans.pinned_group().is_none());
    }

    #[test]
    fn test_session_vars_case_insensitive() {
        let mut state = SessionState::new();
        state.set_session_var("AUTOCOMMIT".into(), "1".into());
        assert_eq!(
            state.session_vars().get("autocommit"),
            Some(&"1".to_string())
        );
    }
}
