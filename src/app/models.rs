use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Pass,
    Fail,
}

/// One measured iteration of a jank test body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationRecord {
    pub index: u32,
    pub status: IterationStatus,
    pub duration_ms: u128,
    pub total_frames: u64,
    pub janky_frames: u64,
    pub jank_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JankReport {
    pub test: String,
    pub serial: String,
    pub expected_frames: u64,
    pub iterations: Vec<IterationRecord>,
    pub passed: bool,
    pub started_at_utc: String,
}

impl JankReport {
    pub fn failures(&self) -> usize {
        self.iterations
            .iter()
            .filter(|record| record.status == IterationStatus::Fail)
            .count()
    }
}
