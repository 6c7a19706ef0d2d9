use crate::metrics::CACHE_SIZE;
use crate::models::TokenMetadata;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid(TokenMetadata),
    Invalid,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid(_))
    }
}

// Cache entry with timestamp
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub verdict: Verdict,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

// Cache key is the token's SHA-256, raw tokens never sit in the map
pub fn make_cache_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// Short fingerprint safe to put in logs
pub fn fingerprint(token: &str) -> String {
    make_cache_key(token)[..12].to_string()
}

/// Token -> verdict map shared by every in-flight request.
///
/// An entry whose ttl has elapsed is a miss, exactly like an absent one.
pub struct CredentialCache {
    entries: DashMap<String, CacheEntry>,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, token: &str) -> Option<Verdict> {
        let key = make_cache_key(token);
        let now = Instant::now();

        match self.entries.get(&key) {
            Some(entry) if entry.is_live(now) => return Some(entry.verdict.clone()),
            Some(_) => {}
            None => return None,
        }

        // expired; only remove it if no fresher put landed in between
        self.entries.remove_if(&key, |_, entry| !entry.is_live(now));
        CACHE_SIZE.set(self.entries.len() as f64);
        None
    }

    pub fn put(&self, token: &str, verdict: Verdict, ttl: Duration) {
        self.entries.insert(
            make_cache_key(token),
            CacheEntry {
                verdict,
                inserted_at: Instant::now(),
                ttl,
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    pub fn invalidate(&self, token: &str) -> bool {
        let removed = self.entries.remove(&make_cache_key(token)).is_some();
        CACHE_SIZE.set(self.entries.len() as f64);
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        CACHE_SIZE.set(self.entries.len() as f64);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
