//! Test doubles for the directory seams and shared fixtures

use crate::auth::{
    DirectoryError, Principal, PrincipalDirectory, ProfileDirectory, ProfileLink, SigningKey,
    TokenCodec,
};
use crate::clock::ManualClock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// 32-byte key accepted by [`SigningKey::from_bytes`].
pub const TEST_KEY: &[u8] = b"carelink-test-signing-key-000001";

/// Codec on a manual clock starting at `start_secs`.
pub fn test_codec(ttl: Duration, start_secs: u64) -> (TokenCodec, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_secs));
    let key = match SigningKey::from_bytes(TEST_KEY) {
        Ok(key) => key,
        Err(e) => panic!("test key rejected: {e}"),
    };
    (TokenCodec::with_clock(key, ttl, clock.clone()), clock)
}

/// Directory backed by a map, keyed by subject.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: Mutex<HashMap<String, (Principal, ProfileLink)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, principal: Principal, link: ProfileLink) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(principal.subject_id().to_string(), (principal, link));
    }

    fn get(&self, subject: &str) -> Option<(Principal, ProfileLink)> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(subject).cloned()
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryDirectory {
    async fn resolve(&self, subject: &str) -> Result<Option<Principal>, DirectoryError> {
        Ok(self.get(subject).map(|(principal, _)| principal))
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryDirectory {
    async fn link(&self, principal: &Principal) -> Result<ProfileLink, DirectoryError> {
        Ok(self
            .get(principal.subject_id())
            .map(|(_, link)| link)
            .unwrap_or_default())
    }
}

/// Directory whose lookups never complete.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingDirectory;

#[async_trait]
impl PrincipalDirectory for PendingDirectory {
    async fn resolve(&self, _subject: &str) -> Result<Option<Principal>, DirectoryError> {
        std::future::pending().await
    }
}

#[async_trait]
impl ProfileDirectory for PendingDirectory {
    async fn link(&self, _principal: &Principal) -> Result<ProfileLink, DirectoryError> {
        std::future::pending().await
    }
}

/// Directory that always fails and counts how often it was asked.
#[derive(Debug, Default)]
pub struct FailingDirectory {
    calls: AtomicUsize,
}

impl FailingDirectory {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> DirectoryError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DirectoryError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl PrincipalDirectory for FailingDirectory {
    async fn resolve(&self, _subject: &str) -> Result<Option<Principal>, DirectoryError> {
        Err(self.fail())
    }
}

#[async_trait]
impl ProfileDirectory for FailingDirectory {
    async fn link(&self, _principal: &Principal) -> Result<ProfileLink, DirectoryError> {
        Err(self.fail())
    }
}

/// Latency samples with percentile queries.
#[derive(Debug, Default)]
pub struct PerfAssert {
    samples: Vec<Duration>,
}

impl PerfAssert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.samples.push(start.elapsed());
        result
    }

    pub fn percentile(&mut self, p: f64) -> Duration {
        assert!((0.0..=100.0).contains(&p), "Percentile must be between 0 and 100");
        assert!(!self.samples.is_empty(), "No samples recorded");

        self.samples.sort();
        let index = ((p / 100.0) * (self.samples.len() - 1) as f64).round() as usize;
        self.samples[index]
    }

    pub fn p99(&mut self) -> Duration {
        self.percentile(99.0)
    }

    pub fn assert_p99_under(&mut self, threshold: Duration) {
        let p99 = self.p99();
        assert!(p99 < threshold, "P99 latency {:?} exceeds threshold {:?}", p99, threshold);
    }
}
