// src/resolver.rs
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::watch;

use crate::source::FlagSource;
use crate::FlagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverPhase {
    Initializing,
    Resolved,
    Failed,
    Toggling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Http,
    Api,
    Config,
    InvalidName,
    NotFound,
}

impl From<&FlagError> for FailureKind {
    fn from(error: &FlagError) -> Self {
        match error {
            FlagError::HttpError(_) => FailureKind::Http,
            FlagError::ApiError(_) => FailureKind::Api,
            FlagError::ConfigError(_) => FailureKind::Config,
            FlagError::InvalidName(_) => FailureKind::InvalidName,
            FlagError::NotFound(_) => FailureKind::NotFound,
        }
    }
}

/// A failed read or toggle, as recorded in [`ResolverState::error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Failure {
    fn record(error: &FlagError) -> Self {
        Self {
            kind: FailureKind::from(error),
            message: error.to_string(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ResolverState {
    pub flag_name: String,
    /// Only meaningful once `loading` is false.
    pub enabled: bool,
    pub loading: bool,
    pub error: Option<Failure>,
    pub phase: ResolverPhase,
    epoch: u64,
    toggles: u32,
    toggle_seq: u64,
    applied_seq: u64,
}

impl ResolverState {
    pub fn initializing(flag_name: impl Into<String>) -> Self {
        Self {
            flag_name: flag_name.into(),
            enabled: false,
            loading: true,
            error: None,
            phase: ResolverPhase::Initializing,
            epoch: 0,
            toggles: 0,
            toggle_seq: 0,
            applied_seq: 0,
        }
    }

    pub fn settled(flag_name: impl Into<String>, enabled: bool) -> Self {
        Self {
            enabled,
            loading: false,
            phase: ResolverPhase::Resolved,
            ..Self::initializing(flag_name)
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.loading
    }

    // Phase follows from the rest of the state.
    fn refresh_phase(&mut self) {
        self.phase = if self.loading {
            ResolverPhase::Initializing
        } else if self.toggles > 0 {
            ResolverPhase::Toggling
        } else if self.error.is_some() {
            ResolverPhase::Failed
        } else {
            ResolverPhase::Resolved
        };
    }
}

// Accounts for one in-flight toggle; releases it if the toggle future is
// dropped before the write settles.
struct PendingToggle<'a> {
    state: &'a watch::Sender<ResolverState>,
    epoch: u64,
    armed: bool,
}

impl PendingToggle<'_> {
    fn settle(mut self, apply: impl FnOnce(&mut ResolverState)) -> bool {
        self.armed = false;
        let epoch = self.epoch;
        self.state.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            state.toggles = state.toggles.saturating_sub(1);
            apply(state);
            state.refresh_phase();
            true
        })
    }
}

impl Drop for PendingToggle<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let epoch = self.epoch;
        self.state.send_if_modified(|state| {
            if state.epoch != epoch {
                return false;
            }
            let before = state.phase;
            state.toggles = state.toggles.saturating_sub(1);
            state.refresh_phase();
            state.phase != before
        });
    }
}

pub struct FlagResolver<S: ?Sized> {
    source: Arc<S>,
    state: Arc<watch::Sender<ResolverState>>,
}

impl<S> FlagResolver<S>
where
    S: FlagSource + ?Sized + 'static,
{
    /// Starts resolving `flag_name`. Must be called inside a tokio runtime;
    /// the read runs as a spawned task.
    pub fn new(source: Arc<S>, flag_name: impl Into<String>) -> Self {
        let flag_name = flag_name.into();
        let (state, _) = watch::channel(ResolverState::initializing(flag_name.clone()));
        let resolver = Self {
            source,
            state: Arc::new(state),
        };
        resolver.spawn_read(flag_name, 0);
        resolver
    }

    pub fn flag_name(&self) -> String {
        self.state.borrow().flag_name.clone()
    }

    pub fn state(&self) -> ResolverState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolverState> {
        self.state.subscribe()
    }

    pub async fn settled(&self) -> ResolverState {
        let mut updates = self.state.subscribe();
        let state = match updates.wait_for(ResolverState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Rebinds the resolver to another flag. Passing the current name does
    /// nothing; any other name discards the old state and resolves afresh.
    pub fn set_flag_name(&self, flag_name: impl Into<String>) {
        let flag_name = flag_name.into();
        let mut epoch = None;
        self.state.send_if_modified(|state| {
            if state.flag_name == flag_name {
                return false;
            }
            let next = state.epoch + 1;
            *state = ResolverState {
                epoch: next,
                ..ResolverState::initializing(flag_name.clone())
            };
            epoch = Some(next);
            true
        });

        if let Some(epoch) = epoch {
            self.spawn_read(flag_name, epoch);
        }
    }

    /// Writes `enabled` for the current flag.
    ///
    /// `loading` is never raised. On success the local value follows the
    /// write; on failure it is left as it was, the failure is recorded and
    /// returned. A write confirmed while the initial read is still in flight
    /// settles the state and makes that read stale. When toggles overlap,
    /// the most recently issued one that succeeded decides `enabled`.
    pub async fn toggle(&self, enabled: bool) -> Result<(), FlagError> {
        let (mut flag_name, mut epoch, mut seq) = (String::new(), 0, 0);
        self.state.send_if_modified(|state| {
            flag_name = state.flag_name.clone();
            epoch = state.epoch;
            state.toggle_seq += 1;
            seq = state.toggle_seq;
            state.toggles += 1;
            let before = state.phase;
            state.refresh_phase();
            state.phase != before
        });
        let pending = PendingToggle {
            state: &self.state,
            epoch,
            armed: true,
        };

        let outcome = self.source.write_flag(&flag_name, enabled).await;

        let committed = pending.settle(|state| {
            if seq <= state.applied_seq {
                debug!("Superseded toggle of feature flag {}", state.flag_name);
                return;
            }
            match &outcome {
                Ok(()) => {
                    state.applied_seq = seq;
                    state.enabled = enabled;
                    state.loading = false;
                    state.error = None;
                }
                Err(e) => state.error = Some(Failure::record(e)),
            }
        });
        if !committed {
            debug!("Discarded stale toggle of feature flag {}", flag_name);
        }

        outcome
    }

    fn spawn_read(&self, flag_name: String, epoch: u64) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let outcome = source.fetch_flag(&flag_name).await;
            if let Err(e) = &outcome {
                warn!("Failed to resolve feature flag {}: {}", flag_name, e);
            }

            let committed = state.send_if_modified(|current| {
                if current.epoch != epoch || !current.loading {
                    return false;
                }
                match &outcome {
                    Ok(enabled) => {
                        current.enabled = *enabled;
                        current.error = None;
                    }
                    Err(e) => current.error = Some(Failure::record(e)),
                }
                current.loading = false;
                current.refresh_phase();
                true
            });

            if committed {
                debug!("Resolved feature flag {}", flag_name);
            } else {
                debug!("Discarded stale read of feature flag {}", flag_name);
            }
        });
    }
}
