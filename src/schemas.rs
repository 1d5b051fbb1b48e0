//! Data schemas for the member export.
//!
//! Raw records mirror what the remote directory returns; normalized records
//! are the stable shape written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version for tracking changes
pub const SCHEMA_VERSION: &str = "1.0.0";

// ============================================================================
// PART A: Remote Schemas
// ============================================================================

/// One channel member as returned by the remote directory.
///
/// Only `id` is guaranteed; everything else depends on the account's privacy
/// settings and on what the directory chooses to expose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberRecord {
    /// Account identifier, unique within the channel
    pub id: i64,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    /// Bot flag; some directories call it `bot`
    #[serde(default, alias = "bot")]
    pub is_bot: Option<bool>,
}

impl MemberRecord {
    /// Record carrying nothing but an id.
    pub fn bare(id: i64) -> Self {
        Self {
            id,
            first_name: None,
            last_name: None,
            username: None,
            phone: None,
            is_bot: None,
        }
    }
}

/// One page of the member listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageResult {
    #[serde(default, alias = "users")]
    pub records: Vec<MemberRecord>,
}

impl PageResult {
    pub fn new(records: Vec<MemberRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Resolved channel entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i64,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    /// Server-reported member total. Best effort: may differ from what the
    /// listing actually yields.
    #[serde(default)]
    pub participants_count: Option<u64>,
}

// ============================================================================
// PART B: Output Schema
// ============================================================================

/// Flat member record written to the export file.
///
/// Every field is always serialized; absent values are written as `null`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub is_bot: bool,
}

// ============================================================================
// Metadata Schema
// ============================================================================

/// Run metadata for auditing an export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Schema version used
    pub schema_version: String,

    /// Export run timestamp
    pub run_timestamp: DateTime<Utc>,

    /// Channel the members were fetched from
    pub channel: ChannelInfo,

    /// Number of members actually retrieved
    pub fetched_members: usize,

    /// Git commit hash (if available)
    pub git_commit: Option<String>,

    /// Tool version
    pub tool_version: String,
}

impl RunMetadata {
    pub fn new(channel: ChannelInfo, fetched_members: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_timestamp: Utc::now(),
            channel,
            fetched_members,
            git_commit: get_git_commit(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Whether the listing yielded fewer members than the channel reports.
    pub fn is_short_of_reported(&self) -> bool {
        self.channel
            .participants_count
            .is_some_and(|reported| (self.fetched_members as u64) < reported)
    }

    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn get_git_commit() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
}
