//! Shared data types for bookpair-import

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Review status of an inbox row
///
/// `good` and `approved` are terminal for the import pipeline: a re-import
/// never moves a row out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxStatus {
    Pending,
    Suspect,
    Good,
    Approved,
    Rejected,
    Bad,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::Pending => "pending",
            InboxStatus::Suspect => "suspect",
            InboxStatus::Good => "good",
            InboxStatus::Approved => "approved",
            InboxStatus::Rejected => "rejected",
            InboxStatus::Bad => "bad",
        }
    }

    /// Statuses an import may never downgrade
    pub fn is_protected(&self) -> bool {
        matches!(self, InboxStatus::Good | InboxStatus::Approved)
    }
}

impl fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InboxStatus::Pending),
            "suspect" => Ok(InboxStatus::Suspect),
            "good" => Ok(InboxStatus::Good),
            "approved" => Ok(InboxStatus::Approved),
            "rejected" => Ok(InboxStatus::Rejected),
            "bad" => Ok(InboxStatus::Bad),
            other => Err(format!("unknown inbox status '{}'", other)),
        }
    }
}

/// Sample pair reported back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamplePair {
    pub src: String,
    pub tgt: String,
    pub quality: f64,
}

/// Result of one book-pair import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Candidates staged (before merge dedup)
    pub inserted: u64,
    /// Pairs dropped by normalization, dedup or rule gates
    pub skipped: u64,
    /// Mean rule quality over `inserted`
    pub avg_quality: f64,
    /// Distinct source chapters among staged candidates
    pub chapter_count: usize,
    pub examples: Vec<ExamplePair>,
    /// Durable rows created or updated by the merge
    pub merged: u64,
    /// Oracle chunks that fell back to neutral values
    pub degraded_chunks: usize,
}
