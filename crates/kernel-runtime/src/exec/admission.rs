//! Queue admission policies.
//!
//! A pool asks its policy whether a task that could not get a core thread
//! may wait in the queue. A refused offer makes the pool grow (up to max)
//! or, when already at max, run the task on the caller.

/// Pool counters seen by an admission decision, taken under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLoad {
    pub queued: usize,
    pub pool_size: usize,
    pub active: usize,
    pub core_size: usize,
    pub max_size: usize,
}

/// How a pool decides between queueing and growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queue first: accept while fewer than `capacity` tasks wait.
    Bounded { capacity: usize },

    /// Grow first: once `up_threshold` tasks wait, refuse the offer while
    /// every live thread is busy and the pool can still grow.
    Threshold { up_threshold: usize },
}

impl Admission {
    pub fn accepts(&self, load: &PoolLoad) -> bool {
        match *self {
            Self::Bounded { capacity } => load.queued < capacity,
            Self::Threshold { up_threshold } => {
                load.queued < up_threshold
                    || load.pool_size < load.core_size
                    || load.active < load.pool_size
                    || load.pool_size >= load.max_size
            }
        }
    }
}
