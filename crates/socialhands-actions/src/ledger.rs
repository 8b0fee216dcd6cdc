//! Local ledger of content already written to a platform.
//!
//! A retry after a post that succeeded but was never reported must not post
//! again. Writers hash what they are about to publish and consult the
//! ledger first; entries expire after the dedupe window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use socialhands_state::{ControlStore, StateError, StateKey};

const POST_LEDGER: StateKey<Vec<LedgerEntry>> = StateKey::fixed("post:ledger");

/// Collapse whitespace so cosmetic differences hash alike.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 of the normalized text, scoped by action and target.
pub fn content_hash(action: &str, target: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_bytes());
    hasher.update([0]);
    hasher.update(target.as_bytes());
    hasher.update([0]);
    hasher.update(normalize(text).as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hash: String,
    pub action: String,
    pub recorded_at: DateTime<Utc>,
}

/// Ledger stored under the `post:ledger` settings key.
pub struct PostLedger {
    control: ControlStore,
    window: Duration,
    write_lock: Mutex<()>,
}

impl PostLedger {
    pub fn new(control: ControlStore, window_minutes: i64) -> Self {
        Self {
            control,
            window: Duration::minutes(window_minutes.max(1)),
            write_lock: Mutex::new(()),
        }
    }

    /// Whether `hash` was recorded within the window before `now`.
    pub async fn contains(&self, hash: &str, now: DateTime<Utc>) -> Result<bool, StateError> {
        let entries = self.control.load(&POST_LEDGER).await?.unwrap_or_default();
        Ok(entries
            .iter()
            .any(|e| e.hash == hash && now - e.recorded_at < self.window))
    }

    /// Record `hash`, dropping expired entries.
    pub async fn record(
        &self,
        hash: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.control.load(&POST_LEDGER).await?.unwrap_or_default();
        entries.retain(|e| now - e.recorded_at < self.window);
        entries.push(LedgerEntry {
            hash: hash.to_string(),
            action: action.to_string(),
            recorded_at: now,
        });
        self.control.save(&POST_LEDGER, &entries).await
    }

    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, StateError> {
        Ok(self.control.load(&POST_LEDGER).await?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialhands_state::MemorySettingsStore;
    use std::sync::Arc;

    fn ledger() -> PostLedger {
        PostLedger::new(ControlStore::new(Arc::new(MemorySettingsStore::new())), 60)
    }

    #[test]
    fn test_hash_ignores_whitespace() {
        assert_eq!(
            content_hash("post", "", "hello   world\n"),
            content_hash("post", "", " hello world")
        );
    }

    #[test]
    fn test_hash_is_scoped() {
        let text = "thanks!";
        assert_ne!(content_hash("post", "", text), content_hash("reply", "", text));
        assert_ne!(
            content_hash("reply", "https://x.com/a/status/1", text),
            content_hash("reply", "https://x.com/b/status/2", text)
        );
        assert_eq!(content_hash("post", "", text).len(), 64);
    }

    #[tokio::test]
    async fn test_record_then_contains() {
        let ledger = ledger();
        let now = Utc::now();
        let hash = content_hash("post", "", "gm");

        assert!(!ledger.contains(&hash, now).await.unwrap());
        ledger.record(&hash, "post", now).await.unwrap();
        assert!(ledger.contains(&hash, now + Duration::minutes(59)).await.unwrap());
        assert!(!ledger.contains(&hash, now + Duration::minutes(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_prunes_expired() {
        let ledger = ledger();
        let start = Utc::now();
        ledger.record("old", "post", start).await.unwrap();
        ledger
            .record("new", "post", start + Duration::minutes(90))
            .await
            .unwrap();

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hash, "new");
    }
}
