//! Sharing counters.
//!
//! Counters are plain atomics bumped from producer threads; a consistent
//! [`SharingStatsSnapshot`] can be taken at any time, rendered as JSON, or
//! saved to a file for post-run analysis.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by every sharing strategy. Import-side counters are bumped
/// from producer threads, hence atomics.
#[derive(Default)]
pub struct SharingStats {
    /// Clauses accepted at import.
    pub received: AtomicU64,
    /// Clauses pushed out to clients.
    pub shared: AtomicU64,
    /// Clauses rejected by the import filter.
    pub filtered_at_import: AtomicU64,
}

/// Extra counters for inter-process strategies.
#[derive(Default)]
pub struct GlobalSharingStats {
    pub base: SharingStats,
    /// Duplicates dropped before sending.
    pub shared_duplicates_avoided: AtomicU64,
    /// Duplicates detected in received buffers.
    pub received_duplicates: AtomicU64,
    /// Messages sent over the transport.
    pub messages_sent: AtomicU64,
}

/// Serializable snapshot of [`SharingStats`].
#[derive(Debug, Clone, Serialize)]
pub struct SharingStatsSnapshot {
    pub received: u64,
    pub shared: u64,
    pub filtered_at_import: u64,
}

/// Serializable snapshot of [`GlobalSharingStats`].
#[derive(Debug, Clone, Serialize)]
pub struct GlobalSharingStatsSnapshot {
    #[serde(flatten)]
    pub base: SharingStatsSnapshot,
    pub shared_duplicates_avoided: u64,
    pub received_duplicates: u64,
    pub messages_sent: u64,
}

fn write_json(path: &Path, json: &Value) -> Result<()> {
    let mut file = File::create(path)?;
    let formatted = serde_json::to_string_pretty(json)?;
    file.write_all(formatted.as_bytes())?;
    Ok(())
}

impl SharingStats {
    pub fn snapshot(&self) -> SharingStatsSnapshot {
        SharingStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            shared: self.shared.load(Ordering::Relaxed),
            filtered_at_import: self.filtered_at_import.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.snapshot()).expect("stats snapshot serialises")
    }

    /// Save the current counters to a pretty-printed JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        write_json(path, &self.to_json())
    }

    pub fn add_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_shared(&self, n: u64) {
        self.shared.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_filtered(&self, n: u64) {
        self.filtered_at_import.fetch_add(n, Ordering::Relaxed);
    }
}

impl GlobalSharingStats {
    pub fn snapshot(&self) -> GlobalSharingStatsSnapshot {
        GlobalSharingStatsSnapshot {
            base: self.base.snapshot(),
            shared_duplicates_avoided: self.shared_duplicates_avoided.load(Ordering::Relaxed),
            received_duplicates: self.received_duplicates.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.snapshot()).expect("stats snapshot serialises")
    }

    /// Save the current counters to a pretty-printed JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        write_json(path, &self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_snapshot_carries_every_counter() {
        let stats = GlobalSharingStats::default();
        stats.base.add_received(3);
        stats.base.add_shared(2);
        stats.messages_sent.fetch_add(5, Ordering::Relaxed);

        let json = stats.to_json();
        assert_eq!(json["received"], 3);
        assert_eq!(json["shared"], 2);
        assert_eq!(json["filtered_at_import"], 0);
        assert_eq!(json["messages_sent"], 5);
        assert_eq!(json["received_duplicates"], 0);
    }

    #[test]
    fn save_to_file_writes_readable_json() {
        let stats = SharingStats::default();
        stats.add_received(7);
        stats.add_filtered(1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        stats.save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["received"], 7);
        assert_eq!(parsed["filtered_at_import"], 1);
    }
}
