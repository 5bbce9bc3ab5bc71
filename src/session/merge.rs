use crate::protocol::OkPacket;

/// Result merge state for one fan-out statement.
///
/// Field definitions come from the first shard only, rows stream from every
/// shard, and a single terminator goes to the client after the last shard
/// finishes. Write-style replies collapse into one OK with summed
/// affected-rows and warning counts.
#[derive(Debug)]
pub struct ResultMerge {
    shard_count: usize,
    completed: usize,
    affected_rows: u64,
    warnings: u16,
    last_insert_id: u64,
    /// Statement LIMIT; rows beyond it are dropped instead of forwarded
    limit: Option<u64>,
    rows_forwarded: u64,
    sequence_id: u8,
}

impl ResultMerge {
    pub fn new(shard_count: usize, limit: Option<u64>) -> Self {
        Self {
            shard_count,
            completed: 0,
            affected_rows: 0,
            warnings: 0,
            last_insert_id: 0,
            limit,
            rows_forwarded: 0,
            sequence_id: 1,
        }
    }

    /// Next client-side sequence id
    pub fn next_seq(&mut self) -> u8 {
        let seq = self.sequence_id;
        self.sequence_id = self.sequence_id.wrapping_add(1);
        seq
    }

    /// Whether the next row still fits under the LIMIT; counts it if so
    pub fn take_row(&mut self) -> bool {
        if let Some(limit) = self.limit {
            if self.rows_forwarded >= limit {
                return false;
            }
        }
        self.rows_forwarded += 1;
        true
    }

    pub fn rows_forwarded(&self) -> u64 {
        self.rows_forwarded
    }

    /// Fold one shard's final OK into the merged totals
    pub fn record_ok(&mut self, ok: &OkPacket) {
        self.affected_rows += ok.affected_rows;
        self.warnings = self.warnings.saturating_add(ok.warnings);
        if ok.last_insert_id != 0 {
            self.last_insert_id = ok.last_insert_id;
        }
    }

    /// Mark one shard's reply as fully consumed
    pub fn shard_done(&mut self) {
        self.completed += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.shard_count
    }

    /// The single OK sent to the client after every shard reported one
    pub fn merged_ok(&self) -> OkPacket {
        let mut ok = OkPacket::with_affected_rows(self.affected_rows, self.warnings);
        ok.last_insert_id = self.last_insert_id;
        ok
    }
}
