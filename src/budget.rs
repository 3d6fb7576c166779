//! Resource limits of a decision-diagram session.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::SolverError;

/// Configuration of one [`Bdd`][crate::bdd::Bdd] session.
///
/// ```
/// use std::time::Duration;
/// use fw_equiv::budget::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_timeout(Duration::from_secs(5))
///     .with_max_nodes(1 << 20);
/// assert_eq!(config.max_nodes, 1 << 20);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wall-clock limit for the whole session, measured from its creation.
    pub timeout: Option<Duration>,
    /// Upper bound on the number of nodes in the unique table.
    pub max_nodes: usize,
    /// The computed table has `2^cache_bits` slots, at most `2^MAX_BITS`.
    pub cache_bits: usize,
    /// Initial number of unique-table buckets, as a power of two, at most `2^MAX_BITS`.
    pub table_bits: usize,
    /// Raising this flag makes the session fail with [`SolverError::Cancelled`].
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_nodes: 1 << 24,
            cache_bits: 16,
            table_bits: 16,
            cancel: None,
        }
    }
}

impl SessionConfig {
    /// Largest accepted `cache_bits` and `table_bits`; larger values are clamped.
    pub const MAX_BITS: usize = 22;

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_cache_bits(mut self, bits: usize) -> Self {
        self.cache_bits = bits.min(Self::MAX_BITS);
        self
    }

    pub fn with_table_bits(mut self, bits: usize) -> Self {
        self.table_bits = bits.min(Self::MAX_BITS);
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }
}

/// How often (in ITE steps) the clock and the cancellation flag are polled.
const POLL_INTERVAL: u32 = 256;

/// Live limits of a session, derived from a [`SessionConfig`] when the session starts.
#[derive(Debug)]
pub struct Budget {
    deadline: Option<Instant>,
    max_nodes: usize,
    cancel: Option<Arc<AtomicBool>>,
    ticks: Cell<u32>,
}

impl Budget {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            deadline: config.timeout.map(|t| Instant::now() + t),
            max_nodes: config.max_nodes,
            cancel: config.cancel.clone(),
            ticks: Cell::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            deadline: None,
            max_nodes: usize::MAX,
            cancel: None,
            ticks: Cell::new(0),
        }
    }

    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    /// Called before a new node is stored; `live` is the current table size.
    pub fn charge_node(&self, live: usize) -> Result<(), SolverError> {
        if live >= self.max_nodes {
            return Err(SolverError::NodeLimit(self.max_nodes));
        }
        Ok(())
    }

    /// Called on every ITE step; polls the clock every [`POLL_INTERVAL`] steps,
    /// starting with the very first one.
    pub fn tick(&self) -> Result<(), SolverError> {
        let t = self.ticks.get();
        self.ticks.set(t.wrapping_add(1));
        if t % POLL_INTERVAL != 0 {
            return Ok(());
        }
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(SolverError::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SolverError::Timeout);
            }
        }
        Ok(())
    }
}
