//! The hot path and the administrative channel report failure differently:
//! a translation failure usually isn't exceptional (it just means "hand the
//! packet back" or "drop it"), so the pipeline returns a [`Verdict`] rather
//! than a bare `Result`. Administrative requests, by contrast, always want
//! a definite yes/no, so they get [`AdminError`] codes instead.

/// Outcome of running a packet through the translation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Processing should proceed to the next pipeline stage.
    Continue,
    /// Not a packet this core translates; hand it back to the host stack.
    Accept,
    /// Silently discard. The core may already have emitted an ICMP error
    /// on the caller's behalf.
    Drop,
    /// The core retained the packet for later processing (packet store).
    /// The caller must not access or free it.
    Stolen,
}

/// Error codes surfaced to the administrative channel. These never
/// influence a [`Verdict`] — they're a separate reporting path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("entry already exists")]
    Exists,
    #[error("entry not found")]
    NotFound,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("rejected by address-dependent filtering")]
    AddressDependentFilterRejected,
}

/// Logs a condition that should be impossible under correct operation
/// (e.g. a session indexed in only one of the two lookup trees). The
/// caller is expected to drop the defective entry and carry on rather
/// than panic.
macro_rules! log_bug {
    ($($arg:tt)*) => {
        log::error!("BUG: {}", format!($($arg)*))
    };
}

pub(crate) use log_bug;
