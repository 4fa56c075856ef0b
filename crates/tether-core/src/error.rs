use thiserror::Error;

use crate::runtime::InstanceId;
use crate::slot::SlotKind;

/// Error type carried by reducers, effects and component renders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum HookError {
    #[error(
        "hook order violated: this render registered {actual} hooks, the first render registered {expected}"
    )]
    HookCountMismatch { expected: usize, actual: usize },

    #[error("hook order violated: slot {index} was a {expected} hook, this render asked for a {found} hook")]
    SlotKindMismatch {
        index: usize,
        expected: SlotKind,
        found: SlotKind,
    },

    #[error("hook order violated: {kind} slot {index} changed its value type between renders")]
    SlotTypeMismatch { index: usize, kind: SlotKind },

    #[error("invalid context: {0}")]
    InvalidContext(&'static str),

    #[error("dependency list of slot {index} changed length from {previous} to {current}")]
    DepsLengthChanged {
        index: usize,
        previous: usize,
        current: usize,
    },

    #[error("reducer in slot {slot} failed")]
    Reducer {
        slot: usize,
        #[source]
        source: BoxError,
    },

    #[error("effect in slot {slot} failed")]
    Effect {
        slot: usize,
        #[source]
        source: BoxError,
    },

    #[error("instance {0:?} is not mounted")]
    UnknownInstance(InstanceId),

    #[error("too many re-renders: `{name}` was still dirty after {limit} passes")]
    TooManyRenders { name: String, limit: usize },

    #[error("render failed")]
    Render(#[source] BoxError),
}

impl HookError {
    /// Wraps a component-defined failure so it can be returned from a render function.
    pub fn render(err: impl Into<BoxError>) -> Self {
        HookError::Render(err.into())
    }

    /// True for every variant caused by conditional or reordered hook calls.
    pub fn is_order_violation(&self) -> bool {
        matches!(
            self,
            HookError::HookCountMismatch { .. }
                | HookError::SlotKindMismatch { .. }
                | HookError::SlotTypeMismatch { .. }
        )
    }
}
