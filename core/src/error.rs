//! Error taxonomy for effect execution.
//!
//! Effects either complete, are cancelled, or fail. Only the last one is an
//! error: cancellation is a control signal that simply stops delivery.

use std::fmt::Display;
use thiserror::Error;

/// Errors produced while running an effect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    /// The underlying asynchronous computation failed
    #[error("Effect computation failed: {0}")]
    ComputationFailed(String),

    /// The task running the effect panicked
    ///
    /// The panic is contained to the effect's task; the runtime keeps going.
    #[error("Effect task panicked: {0}")]
    Panicked(String),
}

impl EffectError {
    /// Wrap any displayable error as a computation failure
    pub fn computation(error: impl Display) -> Self {
        Self::ComputationFailed(error.to_string())
    }
}

/// Terminal event of a running effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome {
    /// Every value was delivered and the effect finished
    Completed,

    /// Delivery stopped because cancellation was requested
    Cancelled,

    /// The effect failed; no further values are delivered
    Failed(EffectError),
}

impl EffectOutcome {
    /// Check if the effect ran to completion
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if the effect was cancelled
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if the effect failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Fold two outcomes of concurrently running effects
    ///
    /// A failure dominates a cancellation, which dominates completion.
    /// Between two failures the first one is kept.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (failed @ Self::Failed(_), _) | (_, failed @ Self::Failed(_)) => failed,
            (Self::Cancelled, _) | (_, Self::Cancelled) => Self::Cancelled,
            _ => Self::Completed,
        }
    }
}
