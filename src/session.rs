//! Session boundary
//!
//! A successful logout flips the session to [`SessionState::LoggedOut`]. Every
//! cluster-scoped channel holds a [`SessionGate`] and stops on that transition.

use std::sync::Arc;
use strum::Display;
use tokio::sync::watch;
use tracing::info;

use crate::backend::Backend;
use crate::channel::{self, ActionChannel, ResultChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    LoggedIn,
    LoggedOut,
}

/// Read side of the session state, used to cancel dependent work
#[derive(Debug, Clone)]
pub struct SessionGate {
    rx: Option<watch::Receiver<SessionState>>,
}

impl SessionGate {
    /// A gate that never closes
    pub fn ungated() -> Self {
        Self { rx: None }
    }

    pub fn is_active(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow() == SessionState::LoggedIn && rx.has_changed().is_ok(),
            None => true,
        }
    }

    /// Resolves once the session has ended or its owner was dropped
    pub async fn ended(&mut self) {
        match &mut self.rx {
            Some(rx) => {
                let _ = rx.wait_for(|state| *state == SessionState::LoggedOut).await;
            }
            None => futures::future::pending().await,
        }
    }
}

pub type LogoutAction = ActionChannel<()>;
pub type LogoutResult = ResultChannel<(), ()>;

/// Login state plus the logout channel pair
pub struct Session {
    state: Arc<watch::Sender<SessionState>>,
    logout: LogoutAction,
    logout_result: LogoutResult,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, capacity: usize) -> Self {
        let (state, _) = watch::channel(SessionState::LoggedIn);
        let state = Arc::new(state);

        let flip = state.clone();
        let (logout, logout_result) =
            channel::pair("logout", capacity, SessionGate::ungated(), move |()| {
                let call = backend.logout();
                let flip = flip.clone();
                async move {
                    call.await?;
                    info!("Logged out");
                    flip.send_replace(SessionState::LoggedOut);
                    Ok(())
                }
            });

        Self {
            state,
            logout,
            logout_result,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::LoggedIn
    }

    pub fn gate(&self) -> SessionGate {
        SessionGate {
            rx: Some(self.state.subscribe()),
        }
    }

    pub fn logout(&self) -> &LogoutAction {
        &self.logout
    }

    pub fn logout_result(&self) -> &LogoutResult {
        &self.logout_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ungated_is_always_active() {
        let gate = SessionGate::ungated();
        assert!(gate.is_active());
    }

    #[tokio::test]
    async fn test_gate_closes_when_owner_dropped() {
        let (tx, rx) = watch::channel(SessionState::LoggedIn);
        let mut gate = SessionGate { rx: Some(rx) };
        assert!(gate.is_active());
        drop(tx);
        assert!(!gate.is_active());
        gate.ended().await;
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::LoggedIn.to_string(), "logged_in");
        assert_eq!(SessionState::LoggedOut.to_string(), "logged_out");
    }
}
