//! Cooperative cancellation shared by the fetch and classify fan-outs.

pub use tokio_util::sync::CancellationToken;

/// Returned by a fan-out that observed its token being cancelled.
/// In-flight requests are dropped (and thereby aborted) before this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("run cancelled")]
pub struct Cancelled;
