//! Reporting snapshot for one child.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tm_process_state::ProcessState;

/// Point-in-time view of a supervised child, shaped for the supervisor
/// layer's reporting surface. Signals are carried as raw numbers so the
/// snapshot serializes without pulling OS types across the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub id: usize,
    pub pid: Option<i32>,
    pub state: ProcessState,
    pub exit_code: Option<u8>,
    pub exit_signal: Option<i32>,
    pub failed_start: bool,
    pub retries: u32,
    pub uptime_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_snake_case_state() {
        let status = ProcessStatus {
            id: 1,
            pid: Some(42),
            state: ProcessState::Running,
            exit_code: None,
            exit_signal: None,
            failed_start: false,
            retries: 2,
            uptime_secs: 7,
            started_at: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"state\":\"running\""));
        assert!(json.contains("\"retries\":2"));
    }
}
