//! Shared run-state handle: pause, resume, stop

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Lifecycle of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Paused,
    Stopping,
    Finished,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
        };
        f.write_str(text)
    }
}

/// What a worker should do when it reaches a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Stop,
}

/// Cloneable handle over a batch's [`RunState`].
///
/// Transitions: `Running <-> Paused`, `Running | Paused -> Stopping`,
/// anything `-> Finished` (scheduler only). Stopping and Finished are never
/// left again.
#[derive(Clone)]
pub struct BatchControl {
    state: Arc<watch::Sender<RunState>>,
}

impl BatchControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Returns true if the batch moved from Running to Paused
    pub fn pause(&self) -> bool {
        self.transition(|s| (s == RunState::Running).then_some(RunState::Paused))
    }

    /// Returns true if the batch moved from Paused to Running
    pub fn resume(&self) -> bool {
        self.transition(|s| (s == RunState::Paused).then_some(RunState::Running))
    }

    pub fn toggle_pause(&self) -> bool {
        self.transition(|s| match s {
            RunState::Running => Some(RunState::Paused),
            RunState::Paused => Some(RunState::Running),
            _ => None,
        })
    }

    /// Request a stop. Returns false if already stopping or finished.
    pub fn stop(&self) -> bool {
        self.transition(|s| {
            matches!(s, RunState::Running | RunState::Paused).then_some(RunState::Stopping)
        })
    }

    pub fn is_stopping(&self) -> bool {
        matches!(self.state(), RunState::Stopping | RunState::Finished)
    }

    pub(crate) fn finish(&self) {
        self.state.send_replace(RunState::Finished);
    }

    fn transition<F>(&self, next: F) -> bool
    where
        F: Fn(RunState) -> Option<RunState>,
    {
        let mut changed = None;
        self.state.send_if_modified(|state| match next(*state) {
            Some(new_state) => {
                changed = Some((*state, new_state));
                *state = new_state;
                true
            }
            None => false,
        });

        if let Some((from, to)) = changed {
            info!("Batch {} -> {}", from, to);
        }
        changed.is_some()
    }

    /// Wait out a pause. Proceed when running, Stop once a stop was requested.
    pub async fn gate(&self) -> GateDecision {
        let mut rx = self.state.subscribe();
        let proceed = rx
            .wait_for(|s| *s != RunState::Paused)
            .await
            .is_ok_and(|s| *s == RunState::Running);

        if proceed {
            GateDecision::Proceed
        } else {
            GateDecision::Stop
        }
    }

    /// Resolves once a stop was requested
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|s| matches!(s, RunState::Stopping | RunState::Finished))
            .await;
    }
}

impl Default for BatchControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transitions() {
        let control = BatchControl::new();
        assert_eq!(control.state(), RunState::Running);

        assert!(control.pause());
        assert!(!control.pause());
        assert_eq!(control.state(), RunState::Paused);

        assert!(control.toggle_pause());
        assert_eq!(control.state(), RunState::Running);

        assert!(control.stop());
        assert!(!control.stop());
        assert!(!control.resume());
        assert!(!control.toggle_pause());
        assert_eq!(control.state(), RunState::Stopping);

        control.finish();
        assert_eq!(control.state(), RunState::Finished);
        assert!(control.is_stopping());
    }

    #[tokio::test]
    async fn test_gate_blocks_while_paused() {
        let control = BatchControl::new();
        control.pause();

        let gate = tokio::spawn({
            let control = control.clone();
            async move { control.gate().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!gate.is_finished());

        control.resume();
        assert_eq!(gate.await.unwrap(), GateDecision::Proceed);
    }

    #[tokio::test]
    async fn test_stop_releases_paused_gate() {
        let control = BatchControl::new();
        control.pause();

        let gate = tokio::spawn({
            let control = control.clone();
            async move { control.gate().await }
        });

        control.stop();
        let decision = tokio::time::timeout(Duration::from_secs(1), gate)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(decision, GateDecision::Stop);
    }

    #[tokio::test]
    async fn test_stopped_resolves_on_stop() {
        let control = BatchControl::new();
        let waiter = tokio::spawn({
            let control = control.clone();
            async move { control.stopped().await }
        });

        control.pause();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
