//! Error types for the kernel runtime.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use kernel_bus::DispatchError;
use thiserror::Error;

use crate::kernel::Phase;

/// Errors returned by kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Kernel already left the inited phase (now {0})")]
    AlreadyStarted(Phase),

    #[error("Timed out after {timeout:?} waiting for phase {phase}")]
    PhaseTimeout { phase: Phase, timeout: Duration },
}

/// Failures while reading a configuration source.
///
/// These never abort loading; the store logs them and moves on.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },
}

/// Outcome of a task submitted for a result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task was dropped before it produced a result")]
    Lost,
}
