//! Bounded in-memory cache for provider responses.
//!
//! Map and recency state share one `Mutex`; recency is a monotonic use
//! counter per entry, evicting the minimum on overflow. TTL is checked
//! lazily on read and swept periodically by a background task. A circuit
//! breaker turns every operation into a no-op miss after repeated internal
//! failures; cache trouble never reaches a caller, the worst case is a
//! forced miss.

use promptguard_types::TokenUsage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Tuning for the response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held.
    pub capacity: usize,
    /// Entry lifetime.
    pub ttl: Duration,
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open.
    pub cooldown: Duration,
    /// Background sweep period.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl: Duration::from_secs(3_600),
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// A cached provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub content: String,
    pub model: String,
    pub token_usage: TokenUsage,
    pub cost_usd: f64,
}

/// Observability counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cost_saved_usd: f64,
    pub tokens_saved: u64,
    pub breaker_open: bool,
}

struct CacheEntry {
    response: CachedResponse,
    task_type: String,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
    evictions: u64,
    cost_saved_usd: f64,
    tokens_saved: u64,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Bounded LRU+TTL cache with fail-open degradation.
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
                evictions: 0,
                cost_saved_usd: 0.0,
                tokens_saved: 0,
                consecutive_failures: 0,
                open_until: None,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Deterministic fingerprint over task type, normalized prompt, and options.
    pub fn fingerprint(task_type: &str, prompt: &str, options: &str) -> String {
        let normalized: String = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(task_type.as_bytes());
        hasher.update([0]);
        hasher.update(normalized.to_lowercase().as_bytes());
        hasher.update([0]);
        hasher.update(options.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a response. Expired entries are removed and count as misses.
    pub fn get(&self, task_type: &str, prompt: &str, options: &str) -> Option<CachedResponse> {
        let key = Self::fingerprint(task_type, prompt, options);
        let result = self.with_inner(|inner| {
            inner.tick += 1;
            let tick = inner.tick;

            let expired = match inner.entries.get(&key) {
                Some(entry) => entry.inserted_at.elapsed() > self.config.ttl,
                None => return None,
            };
            if expired {
                inner.entries.remove(&key);
                return None;
            }

            let entry = inner.entries.get_mut(&key)?;
            entry.last_used = tick;
            let response = entry.response.clone();
            inner.cost_saved_usd += response.cost_usd;
            inner.tokens_saved += response.token_usage.total();
            Some(response)
        });

        match result {
            Some(Some(response)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(target: "promptguard::cache", "Cache hit for task {}", task_type);
                Some(response)
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a response, evicting the least recently used entry at capacity.
    pub fn set(
        &self,
        task_type: &str,
        prompt: &str,
        options: &str,
        response: CachedResponse,
    ) {
        let key = Self::fingerprint(task_type, prompt, options);
        let task_type = task_type.to_string();
        self.with_inner(move |inner| {
            inner.tick += 1;
            let tick = inner.tick;

            if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.capacity {
                if let Some(lru_key) = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(k, _)| k.clone())
                {
                    inner.entries.remove(&lru_key);
                    inner.evictions += 1;
                }
            }

            inner.entries.insert(
                key,
                CacheEntry {
                    response,
                    task_type,
                    inserted_at: Instant::now(),
                    last_used: tick,
                },
            );
        });
    }

    /// Drop entries for one task type, or everything.
    pub fn invalidate(&self, task_type: Option<&str>) {
        self.with_inner(|inner| match task_type {
            Some(task) => inner.entries.retain(|_, entry| entry.task_type != task),
            None => inner.entries.clear(),
        });
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        let (entries, evictions, cost_saved_usd, tokens_saved, breaker_open) = self
            .with_inner(|inner| {
                (
                    inner.entries.len(),
                    inner.evictions,
                    inner.cost_saved_usd,
                    inner.tokens_saved,
                    inner.open_until.is_some_and(|until| Instant::now() < until),
                )
            })
            .unwrap_or((0, 0, 0.0, 0, true));

        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions,
            cost_saved_usd,
            tokens_saved,
            breaker_open,
        }
    }

    /// Spawn the periodic TTL sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cache.config.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                cache.sweep_expired();
            }
        })
    }

    /// Remove expired entries eagerly.
    pub fn sweep_expired(&self) {
        let ttl = self.config.ttl;
        let removed = self.with_inner(|inner| {
            let before = inner.entries.len();
            inner
                .entries
                .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
            before - inner.entries.len()
        });
        if let Some(removed) = removed {
            if removed > 0 {
                debug!(target: "promptguard::cache", "Swept {} expired entries", removed);
            }
        }
    }

    /// Run an operation against the inner state under the breaker.
    ///
    /// Returns `None` (a forced miss / no-op) when the breaker is open or
    /// the lock is unusable. A successful pass through closes the breaker.
    fn with_inner<R>(&self, op: impl FnOnce(&mut CacheInner) -> R) -> Option<R> {
        let mut guard: MutexGuard<'_, CacheInner> = match self.inner.lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.record_failure();
                return None;
            }
        };

        if let Some(until) = guard.open_until {
            if Instant::now() < until {
                return None;
            }
        }

        let result = op(&mut guard);

        guard.consecutive_failures = 0;
        guard.open_until = None;
        Some(result)
    }

    fn record_failure(&self) {
        // The lock is poisoned here, so recover the inner state directly.
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.consecutive_failures += 1;
        if guard.consecutive_failures >= self.config.failure_threshold {
            warn!(
                target: "promptguard::cache",
                "Circuit breaker open after {} failures, degrading to miss for {:?}",
                guard.consecutive_failures, self.config.cooldown
            );
            guard.open_until = Some(Instant::now() + self.config.cooldown);
            guard.consecutive_failures = 0;
        }
    }
}
