//! Engine lifecycle states.
//!

use serde::Serialize;

/// Message emitted the moment loading begins, before the engine reports anything.
pub const CREATING_ENGINE_MESSAGE: &str = "Creating engine...";

/// Lifecycle of one model engine, as rendered by the UI.
///
/// Serializes to the tagged form `{"status": "loading", "progress": 0.5, "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LifecycleState<H> {
    Uninitialized,
    /// Waiting for the user to consent to the download.
    Pending,
    Loading {
        progress: f64,
        message: String,
    },
    Ready {
        handle: H,
    },
    /// Initialization failed. Terminal.
    Error {
        error: String,
    },
}

impl<H> LifecycleState<H> {
    pub fn loading(progress: f64, message: impl Into<String>) -> Self {
        LifecycleState::Loading {
            progress,
            message: message.into(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LifecycleState::Loading { .. })
    }

    /// `true` for `Ready` and `Error`; nothing leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Ready { .. } | LifecycleState::Error { .. }
        )
    }

    /// `start` is only honoured from these states.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            LifecycleState::Uninitialized | LifecycleState::Pending
        )
    }

    pub fn status(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Pending => "pending",
            LifecycleState::Loading { .. } => "loading",
            LifecycleState::Ready { .. } => "ready",
            LifecycleState::Error { .. } => "error",
        }
    }

    pub fn handle(&self) -> Option<&H> {
        match self {
            LifecycleState::Ready { handle } => Some(handle),
            _ => None,
        }
    }

    /// Converts the engine handle, leaving every other variant untouched.
    pub fn map_handle<T>(&self, f: impl FnOnce(&H) -> T) -> LifecycleState<T> {
        match self {
            LifecycleState::Uninitialized => LifecycleState::Uninitialized,
            LifecycleState::Pending => LifecycleState::Pending,
            LifecycleState::Loading { progress, message } => LifecycleState::Loading {
                progress: *progress,
                message: message.clone(),
            },
            LifecycleState::Ready { handle } => LifecycleState::Ready { handle: f(handle) },
            LifecycleState::Error { error } => LifecycleState::Error {
                error: error.clone(),
            },
        }
    }
}

// Written out: `#[derive(Default)]` would demand `H: Default` of every handle.
impl<H> Default for LifecycleState<H> {
    fn default() -> Self {
        LifecycleState::Uninitialized
    }
}

/// A progress notification from the engine while it is being created.
#[derive(Debug, Clone, PartialEq)]
pub struct InitProgressReport {
    /// Overall fraction, nominally 0.0 to 1.0.
    pub progress: f64,
    pub text: String,
}

impl InitProgressReport {
    pub fn new(progress: f64, text: impl Into<String>) -> Self {
        Self {
            progress,
            text: text.into(),
        }
    }
}

/// How progress reports are folded into the `Loading` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressPolicy {
    /// Report exactly what the engine says.
    #[default]
    PassThrough,
    /// Clamp to `[0, 1]` and never move backwards.
    Monotonic,
}

impl ProgressPolicy {
    pub fn apply(self, previous: f64, reported: f64) -> f64 {
        match self {
            ProgressPolicy::PassThrough => reported,
            // NaN falls through clamp and loses to `previous` in max.
            ProgressPolicy::Monotonic => reported.clamp(0.0, 1.0).max(previous),
        }
    }
}

impl std::str::FromStr for ProgressPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "pass-through" => Ok(ProgressPolicy::PassThrough),
            "monotonic" => Ok(ProgressPolicy::Monotonic),
            other => Err(format!("unknown progress policy `{other}`")),
        }
    }
}
