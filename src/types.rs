use serde::{Deserialize, Serialize};

// Point-in-time copy of a client's rate state, safe to hand out to callers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RateSnapshot {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: Option<String>,
    pub discovering: bool,
    pub dynamic_rate: u32,
    pub safe_rate: u32,
}
