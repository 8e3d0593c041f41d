use serde::{Deserialize, Serialize};

/// Workflow scheduling priority.
///
/// Ordering follows scheduler rank: `High < Normal < Low`, so an ascending
/// sort places high-priority workflows first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// Get numeric rank for storage and sorting.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::High => 1,
            Self::Normal => 5,
            Self::Low => 10,
        }
    }

    /// Parse from numeric rank.
    pub fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=2 => Self::High,
            3..=7 => Self::Normal,
            _ => Self::Low,
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Normal,
        }
    }

    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}
