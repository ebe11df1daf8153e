//! Library-facing error types.
//!
//! Binary-facing glue in `main` collects these into `anyhow::Result` and
//! prints a diagnostic before exiting non-zero, matching §7's "fatal at
//! startup; print a diagnostic and exit" rule for configuration errors.

use thiserror::Error;

use crate::core::memory::AllocError;

/// Configuration problems detected before a run starts: an unknown CLI
/// value, an out-of-range numeric flag, or a malformed config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown rideable `{0}`; expected `of-deque` or `mm-deque`")]
    UnknownRideable(String),
    #[error("unknown test `{0}`; expected one of queue-verify, stack-verify, potato, insert-remove")]
    UnknownTest(String),
    #[error("unknown access type `{0}`; expected queue, stack, or random")]
    UnknownAccessType(String),
    #[error("thread count must be at least 1")]
    ZeroThreads,
    #[error("buffer size {0} is invalid; expected one of 512, 1024, 4096, 8192")]
    InvalidBufferSize(usize),
    #[error("failed to load configuration file {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: config::ConfigError,
    },
}

/// Top-level harness error. Verification failures are *not* represented
/// here — they're reported as data (`TestReport::notes`), per §7, since the
/// test runner is expected to run to completion and report a failure count
/// rather than abort.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("allocation failed: {0}")]
    Alloc(#[from] AllocError),
}
