//! Short-lived store of synthesized audio, served by `GET /api/speech/{id}`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

struct Entry {
    audio: Arc<Vec<u8>>,
    expires_at: Instant,
}

/// Audio keyed by speech id, each entry living for a fixed TTL.
///
/// Uses `std::sync::RwLock`: every critical section is a single map operation
/// and never spans an `.await`.
#[derive(Clone)]
pub struct SpeechCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl SpeechCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Stores `audio` and returns its new id.
    pub fn insert(&self, audio: Vec<u8>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let entry = Entry {
            audio: Arc::new(audio),
            expires_at: Instant::now() + self.ttl,
        };
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(id.clone(), entry);
            }
            Err(e) => tracing::error!("speech cache lock poisoned on insert: {}", e),
        }
        id
    }

    /// Returns the audio for `id` unless it is unknown or expired.
    pub fn get(&self, id: &str) -> Option<Arc<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().ok()?;
            match entries.get(id) {
                Some(entry) if entry.expires_at > now => return Some(entry.audio.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // expired: purge lazily
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(id);
        }
        None
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| entry.expires_at > now);
                before - entries.len()
            }
            Err(e) => {
                tracing::error!("speech cache lock poisoned on purge: {}", e);
                0
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a task that purges expired entries every `period`.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let purged = cache.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = cache.len(), "purged expired speech");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = SpeechCache::new(Duration::from_secs(10));
        let id = cache.insert(vec![1, 2, 3]);
        assert_eq!(cache.get(&id).unwrap().as_slice(), &[1, 2, 3]);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get(&id).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_in_background() {
        let cache = SpeechCache::new(Duration::from_secs(5));
        cache.insert(vec![0; 4]);
        cache.insert(vec![0; 4]);
        let sweeper = cache.spawn_sweeper(Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(cache.is_empty());
        sweeper.abort();
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let cache = SpeechCache::new(Duration::from_secs(5));
        assert!(cache.get("missing").is_none());
    }
}
