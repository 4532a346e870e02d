//! Token-bucket admission control
//!
//! Every distinct model endpoint gets a pair of buckets — one counting
//! requests, one counting prompt tokens — sized from the endpoint's published
//! per-minute limits. All interviews in a run that reference the same model
//! share one pair, so the aggregate call rate cannot exceed the limits no
//! matter how many interviews are concurrently runnable.
//!
//! Buckets never reject, they only delay: `get_tokens` computes how long the
//! caller must wait for capacity and sleeps exactly that long. The single
//! error path is a request larger than the bucket's capacity, which could
//! never be admitted.

use sdk::errors::EngineError;
use sdk::types::ModelSpec;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// What a bucket counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// One unit per model call
    Requests,
    /// One unit per estimated prompt token
    Tokens,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKind::Requests => write!(f, "requests"),
            BucketKind::Tokens => write!(f, "tokens"),
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A lazily refilled token bucket.
///
/// Invariant: after any refill step, `0 <= tokens <= capacity`. Refill is
/// computed on access from elapsed monotonic time times the refill rate,
/// capped at capacity.
pub struct TokenBucket {
    name: String,
    kind: BucketKind,
    capacity: f64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// `refill_rate` is in units per second.
    pub fn new(name: impl Into<String>, kind: BucketKind, capacity: f64, refill_rate: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Bucket name (the model endpoint it throttles)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What this bucket counts
    pub fn kind(&self) -> BucketKind {
        self.kind
    }

    /// Maximum token count
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate in units per second
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BucketState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn refill_locked(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Currently available tokens, after a lazy refill step
    pub fn available(&self) -> f64 {
        let mut state = self.lock_state();
        self.refill_locked(&mut state);
        state.tokens
    }

    /// Add tokens back (e.g. returning an over-estimate), capped at capacity
    pub fn add_tokens(&self, amount: f64) {
        let mut state = self.lock_state();
        state.tokens = (state.tokens + amount).min(self.capacity);
    }

    /// How long a caller would have to wait right now for `amount` tokens
    pub fn wait_time(&self, amount: f64) -> Duration {
        let mut state = self.lock_state();
        self.refill_locked(&mut state);
        if state.tokens >= amount {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((amount - state.tokens) / self.refill_rate)
    }

    /// Acquire `amount` tokens, suspending until capacity is available.
    ///
    /// Fails only if `amount` exceeds the bucket's capacity — the bucket
    /// never overflows, so the request could never be satisfied.
    pub async fn get_tokens(&self, amount: f64) -> Result<(), EngineError> {
        if amount > self.capacity {
            return Err(EngineError::BucketRequestTooLarge {
                requested: amount,
                capacity: self.capacity,
            });
        }
        loop {
            let wait = {
                let mut state = self.lock_state();
                self.refill_locked(&mut state);
                if state.tokens >= amount {
                    state.tokens -= amount;
                    trace!(
                        bucket = %self.name,
                        kind = %self.kind,
                        remaining = state.tokens,
                        "acquired {} tokens",
                        amount
                    );
                    return Ok(());
                }
                Duration::from_secs_f64((amount - state.tokens) / self.refill_rate)
            };
            debug!(
                bucket = %self.name,
                kind = %self.kind,
                "waiting {:.2}s for {} tokens",
                wait.as_secs_f64(),
                amount
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Combine two buckets into one with the minimum capacity and refill
    /// rate. Useful when two model selections resolve to the same endpoint
    /// with different configured limits: the stricter limit wins.
    pub fn combine(&self, other: &TokenBucket) -> TokenBucket {
        TokenBucket::new(
            self.name.clone(),
            self.kind,
            self.capacity.min(other.capacity),
            self.refill_rate.min(other.refill_rate),
        )
    }
}

impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .finish()
    }
}

/// The request/token bucket pair for one model endpoint
#[derive(Debug)]
pub struct ModelBuckets {
    /// Caps model calls per minute
    pub requests: TokenBucket,
    /// Caps prompt tokens per minute
    pub tokens: TokenBucket,
}

impl ModelBuckets {
    /// Build the pair from a model's published per-minute limits
    pub fn for_model(spec: &ModelSpec) -> Self {
        Self {
            requests: TokenBucket::new(
                spec.name.clone(),
                BucketKind::Requests,
                spec.limits.rpm,
                spec.limits.rpm / 60.0,
            ),
            tokens: TokenBucket::new(
                spec.name.clone(),
                BucketKind::Tokens,
                spec.limits.tpm,
                spec.limits.tpm / 60.0,
            ),
        }
    }

    fn combine(&self, other: &ModelBuckets) -> ModelBuckets {
        ModelBuckets {
            requests: self.requests.combine(&other.requests),
            tokens: self.tokens.combine(&other.tokens),
        }
    }
}

/// One bucket pair per distinct model in a run, shared by every interview
/// referencing that model. Lifetime = the run.
#[derive(Debug, Default)]
pub struct BucketCollection {
    buckets: HashMap<String, Arc<ModelBuckets>>,
}

impl BucketCollection {
    /// Build the collection for a run's models. Duplicate names combine to
    /// the stricter limits.
    pub fn from_models<'a>(models: impl IntoIterator<Item = &'a ModelSpec>) -> Self {
        let mut buckets: HashMap<String, Arc<ModelBuckets>> = HashMap::new();
        for spec in models {
            let pair = ModelBuckets::for_model(spec);
            match buckets.get(&spec.name) {
                Some(existing) => {
                    let combined = existing.combine(&pair);
                    buckets.insert(spec.name.clone(), Arc::new(combined));
                }
                None => {
                    buckets.insert(spec.name.clone(), Arc::new(pair));
                }
            }
        }
        Self { buckets }
    }

    /// The shared bucket pair for a model name
    pub fn get(&self, model: &str) -> Option<Arc<ModelBuckets>> {
        self.buckets.get(model).map(Arc::clone)
    }

    /// Model names with buckets in this collection
    pub fn model_names(&self) -> Vec<String> {
        self.buckets.keys().cloned().collect()
    }

    /// Number of distinct models
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
