use crate::lock;
use std::sync::Mutex;

/// Lifecycle of a [`SecretStoreClient`](crate::SecretStoreClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Authenticating,
    Ready,
    Renewing,
    ReAuthenticating,
    /// Renewal and re-authentication both failed; no renewal timer is armed.
    Degraded,
    ShutDown,
}

impl ClientState {
    /// Whether a session has been established and secret calls can go out as-is.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready | Self::Renewing | Self::ReAuthenticating)
    }
}

pub(crate) struct StateCell {
    state: Mutex<ClientState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ClientState::Uninitialized),
        }
    }

    pub(crate) fn get(&self) -> ClientState {
        *lock(&self.state)
    }

    /// Moves to `next` unless the client is shut down. Returns whether it moved.
    pub(crate) fn advance(&self, next: ClientState) -> bool {
        let mut state = lock(&self.state);
        if *state == ClientState::ShutDown {
            return false;
        }
        *state = next;
        true
    }

    pub(crate) fn shut_down(&self) {
        *lock(&self.state) = ClientState::ShutDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shut_down_is_terminal() {
        let cell = StateCell::new();
        assert!(cell.advance(ClientState::Ready));
        cell.shut_down();
        assert!(!cell.advance(ClientState::Ready));
        assert_eq!(cell.get(), ClientState::ShutDown);
    }

    #[test]
    fn test_ready_states() {
        assert!(ClientState::Renewing.is_ready());
        assert!(!ClientState::Degraded.is_ready());
        assert!(!ClientState::Uninitialized.is_ready());
    }
}
