//! Configuration for replicators.

use crate::error::{ReplicatorError, ReplicatorResult};
use crate::transport::PeerTransport;
use docsync_store::{Document, DocumentId, DocumentStore};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which way documents flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicatorType {
    /// Local changes are sent to the peer.
    Push,
    /// Peer changes are applied locally.
    Pull,
    /// Both.
    PushAndPull,
}

impl ReplicatorType {
    /// Returns true if local documents are sent to the peer.
    pub fn includes_push(self) -> bool {
        matches!(self, ReplicatorType::Push | ReplicatorType::PushAndPull)
    }

    /// Returns true if peer documents are applied locally.
    pub fn includes_pull(self) -> bool {
        matches!(self, ReplicatorType::Pull | ReplicatorType::PushAndPull)
    }
}

/// Predicate deciding whether a document is replicated.
pub type DocumentFilter = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// The other side of a replication.
#[derive(Clone)]
pub enum Endpoint {
    /// Another store in the same process.
    Database(Arc<dyn DocumentStore>),
    /// A remote peer reached through a transport.
    Remote(Arc<dyn PeerTransport>),
}

impl Endpoint {
    /// Returns a human-readable name for logs.
    pub fn name(&self) -> String {
        match self {
            Endpoint::Database(store) => format!("db:{}", store.name()),
            Endpoint::Remote(transport) => transport.name().to_string(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Endpoint").field(&self.name()).finish()
    }
}

/// Configuration for a replicator.
#[derive(Clone)]
pub struct ReplicatorConfig {
    /// Local store.
    pub database: Arc<dyn DocumentStore>,
    /// Peer.
    pub endpoint: Endpoint,
    /// Replication direction.
    pub replicator_type: ReplicatorType,
    /// Keep running after the first pass.
    pub continuous: bool,
    /// Optional document predicate.
    pub filter: Option<DocumentFilter>,
    /// Optional allow-list of document identifiers.
    pub document_ids: Option<BTreeSet<DocumentId>>,
    /// Reconnect behavior.
    pub retry: RetryConfig,
    /// How often an idle continuous session checks for work.
    pub poll_interval: Duration,
    /// Maximum documents per pull request.
    pub batch_size: usize,
}

impl ReplicatorConfig {
    /// Creates a one-shot push-and-pull configuration.
    pub fn new(database: Arc<dyn DocumentStore>, endpoint: Endpoint) -> Self {
        Self {
            database,
            endpoint,
            replicator_type: ReplicatorType::PushAndPull,
            continuous: false,
            filter: None,
            document_ids: None,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_millis(100),
            batch_size: 100,
        }
    }

    /// Sets the replication direction.
    pub fn with_type(mut self, replicator_type: ReplicatorType) -> Self {
        self.replicator_type = replicator_type;
        self
    }

    /// Sets whether the session keeps running after the first pass.
    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Sets the document filter.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Restricts replication to the given identifiers.
    pub fn with_document_ids<I, D>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DocumentId>,
    {
        self.document_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the idle poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the pull batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Checks the configuration for values a session cannot run with.
    pub fn validate(&self) -> ReplicatorResult<()> {
        if self.batch_size == 0 {
            return Err(ReplicatorError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ReplicatorError::InvalidConfig(
                "poll_interval must be greater than zero".into(),
            ));
        }
        self.retry.validate()?;
        if let Endpoint::Database(peer) = &self.endpoint {
            if Arc::ptr_eq(peer, &self.database) {
                return Err(ReplicatorError::InvalidConfig(
                    "a store cannot replicate with itself".into(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ReplicatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatorConfig")
            .field("database", &self.database.name())
            .field("endpoint", &self.endpoint)
            .field("replicator_type", &self.replicator_type)
            .field("continuous", &self.continuous)
            .field("filter", &self.filter.is_some())
            .field("document_ids", &self.document_ids)
            .field("retry", &self.retry)
            .field("poll_interval", &self.poll_interval)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// Longest reconnect delay a configuration may ask for.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Reconnect behavior after a connectivity failure.
///
/// Continuous sessions reconnect forever; `max_attempts` only bounds
/// one-shot sessions.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Connection attempts a one-shot session makes before stopping.
    pub max_attempts: u32,
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Fraction of the delay added as jitter (0.0 disables it).
    pub jitter: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: 0.25,
        }
    }

    /// Creates a configuration with a single attempt and no delay.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    /// Rejects values the backoff computation cannot use.
    pub fn validate(&self) -> ReplicatorResult<()> {
        if self.max_attempts == 0 {
            return Err(ReplicatorError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0) {
            return Err(ReplicatorError::InvalidConfig(format!(
                "retry.backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(self.jitter.is_finite() && self.jitter >= 0.0) {
            return Err(ReplicatorError::InvalidConfig(format!(
                "retry.jitter must be a finite value >= 0.0, got {}",
                self.jitter
            )));
        }
        if self.max_delay > MAX_RETRY_DELAY {
            return Err(ReplicatorError::InvalidConfig(format!(
                "retry.max_delay must not exceed {MAX_RETRY_DELAY:?}"
            )));
        }
        Ok(())
    }

    /// Delay before reconnect number `attempt` (1-based; 0 means no delay).
    ///
    /// Never exceeds `max_delay` plus jitter. Values that do not form a
    /// valid duration fall back to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped + capped * self.jitter * jitter_fraction())
            .unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

// Cheap pseudo-random value in [0, 1) taken from the clock.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_store::MemoryStore;

    fn stores() -> (Arc<dyn DocumentStore>, Arc<dyn DocumentStore>) {
        (
            Arc::new(MemoryStore::new("local")),
            Arc::new(MemoryStore::new("peer")),
        )
    }

    #[test]
    fn direction_components() {
        assert!(ReplicatorType::Push.includes_push());
        assert!(!ReplicatorType::Push.includes_pull());
        assert!(!ReplicatorType::Pull.includes_push());
        assert!(ReplicatorType::PushAndPull.includes_push());
        assert!(ReplicatorType::PushAndPull.includes_pull());
    }

    #[test]
    fn config_builder() {
        let (local, peer) = stores();
        let config = ReplicatorConfig::new(local, Endpoint::Database(peer))
            .with_type(ReplicatorType::Push)
            .with_continuous(true)
            .with_document_ids(["doc-1", "doc-2"])
            .with_batch_size(10);

        assert_eq!(config.replicator_type, ReplicatorType::Push);
        assert!(config.continuous);
        assert_eq!(config.document_ids.as_ref().map(BTreeSet::len), Some(2));
        assert_eq!(config.batch_size, 10);
        assert!(config.validate().is_ok());
        assert!(format!("{config:?}").contains("db:peer"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let (local, peer) = stores();
        let config = ReplicatorConfig::new(local.clone(), Endpoint::Database(peer));
        assert!(config.clone().with_batch_size(0).validate().is_err());
        assert!(config.with_poll_interval(Duration::ZERO).validate().is_err());

        let looped = ReplicatorConfig::new(local.clone(), Endpoint::Database(local));
        assert!(matches!(
            looped.validate(),
            Err(ReplicatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(0.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max_and_jitter_bound() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(6250));
    }

    #[test]
    fn validation_rejects_unusable_backoff() {
        let (local, peer) = stores();
        let config = ReplicatorConfig::new(local, Endpoint::Database(peer));
        let with_retry = |retry: RetryConfig| config.clone().with_retry(retry).validate();

        assert!(with_retry(RetryConfig::new(3).with_backoff_multiplier(-2.0)).is_err());
        assert!(with_retry(RetryConfig::new(3).with_backoff_multiplier(0.5)).is_err());
        assert!(with_retry(RetryConfig::new(3).with_backoff_multiplier(f64::NAN)).is_err());
        assert!(with_retry(RetryConfig::new(3).with_backoff_multiplier(f64::INFINITY)).is_err());
        assert!(with_retry(RetryConfig {
            jitter: f64::NAN,
            ..RetryConfig::new(3)
        })
        .is_err());
        assert!(with_retry(RetryConfig {
            jitter: -0.5,
            ..RetryConfig::new(3)
        })
        .is_err());
        assert!(with_retry(RetryConfig::new(3).with_max_delay(Duration::MAX)).is_err());
        assert!(with_retry(RetryConfig::new(0)).is_err());
        assert!(with_retry(RetryConfig::new(3)).is_ok());
        assert!(with_retry(RetryConfig::no_retry()).is_ok());
    }

    #[test]
    fn delay_never_panics_on_bad_values() {
        let negative = RetryConfig::new(3).with_backoff_multiplier(-2.0);
        assert_eq!(negative.delay_for_attempt(2), negative.max_delay);

        let unbounded = RetryConfig::new(3)
            .with_max_delay(Duration::MAX)
            .with_backoff_multiplier(1e300);
        assert_eq!(unbounded.delay_for_attempt(u32::MAX), Duration::MAX);

        let nan_jitter = RetryConfig {
            jitter: f64::NAN,
            ..RetryConfig::new(3)
        };
        assert_eq!(nan_jitter.delay_for_attempt(1), nan_jitter.max_delay);
    }

    #[test]
    fn no_retry_has_single_attempt() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
    }
}
