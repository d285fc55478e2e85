//! Ranked priority and status values.
//!
//! Both enumerations carry a total `rank()`. Strings that match no known
//! variant are kept verbatim in `Other` and rank lowest, so a new label coming
//! from a generator or a manual edit never breaks a comparison.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    /// Critical / P0.
    Critical,
    /// High / P1.
    High,
    /// Medium / P2.
    Medium,
    /// Low / P3.
    Low,
    /// Any unrecognised label.
    Other(String),
}

impl Priority {
    /// Parse a priority label, case-insensitively.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "critical" | "p0" => Priority::Critical,
            "high" | "p1" => Priority::High,
            "medium" | "p2" => Priority::Medium,
            "low" | "p3" => Priority::Low,
            _ => Priority::Other(value.to_string()),
        }
    }

    /// Severity rank, higher is more severe. Unknown labels rank 0.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Other(_) => 0,
        }
    }

    /// Label used when persisting.
    pub fn as_str(&self) -> &str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Other(label) => label,
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        Priority::parse(&value)
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// The test failed. Most urgent.
    Failed,
    /// The test could not run.
    Blocked,
    /// The test passed.
    Passed,
    /// The test was deliberately skipped.
    Skipped,
    /// Not yet executed. Least urgent.
    Pending,
    /// Any unrecognised label.
    Other(String),
}

impl Status {
    /// Parse a status label, case-insensitively.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "failed" | "fail" => Status::Failed,
            "blocked" => Status::Blocked,
            "passed" | "pass" => Status::Passed,
            "skipped" | "skip" => Status::Skipped,
            "pending" | "not run" | "not_run" => Status::Pending,
            _ => Status::Other(value.to_string()),
        }
    }

    /// Urgency rank, higher is more urgent. Unknown labels rank 0.
    pub fn rank(&self) -> u8 {
        match self {
            Status::Failed => 5,
            Status::Blocked => 4,
            Status::Passed => 3,
            Status::Skipped => 2,
            Status::Pending => 1,
            Status::Other(_) => 0,
        }
    }

    /// Label used when persisting.
    pub fn as_str(&self) -> &str {
        match self {
            Status::Failed => "Failed",
            Status::Blocked => "Blocked",
            Status::Passed => "Passed",
            Status::Skipped => "Skipped",
            Status::Pending => "Pending",
            Status::Other(label) => label,
        }
    }
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        Status::parse(&value)
    }
}

impl From<Status> for String {
    fn from(value: Status) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_aliases() {
        assert_eq!(Priority::parse("P0"), Priority::Critical);
        assert_eq!(Priority::parse("critical"), Priority::Critical);
        assert_eq!(Priority::parse(" High "), Priority::High);
        assert_eq!(Priority::parse("p2"), Priority::Medium);
        assert_eq!(Priority::parse("LOW"), Priority::Low);
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::Critical.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert!(Priority::Low.rank() > Priority::parse("someday").rank());
    }

    #[test]
    fn test_unknown_priority_preserved() {
        let p = Priority::parse("Nice-to-have");
        assert_eq!(p.rank(), 0);
        assert_eq!(p.as_str(), "Nice-to-have");
    }

    #[test]
    fn test_status_rank_order() {
        let ordered = [
            Status::Failed,
            Status::Blocked,
            Status::Passed,
            Status::Skipped,
            Status::Pending,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].rank() > pair[1].rank());
        }
        assert_eq!(Status::parse("In Review").rank(), 0);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&Priority::Critical).unwrap();
        assert_eq!(json, "\"Critical\"");

        let status: Status = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, Status::Failed);

        let other: Status = serde_json::from_str("\"Deferred\"").unwrap();
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"Deferred\"");
    }
}
