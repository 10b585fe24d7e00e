use super::Authenticator;
use crate::clock::Clock;
use crate::error::SecretStoreError;
use crate::lock;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::state::{ClientState, StateCell};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Portion of the remaining token lifetime to wait before renewing.
pub const RENEWAL_FRACTION: f64 = 0.8;
pub const MIN_RENEWAL_DELAY: Duration = Duration::from_secs(60);

/// Invoked when renewal and the follow-up re-authentication both fail.
pub type ErrorCallback = Arc<dyn Fn(&SecretStoreError) + Send + Sync>;

/// `max(0.8 * (expires_at - now), 60s)`
pub fn renewal_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
    remaining.mul_f64(RENEWAL_FRACTION).max(MIN_RENEWAL_DELAY)
}

/// Keeps at most one renewal timer armed and drives renew / re-auth when it fires.
pub(crate) struct TokenRenewalScheduler {
    authenticator: Arc<Authenticator>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    state: Arc<StateCell>,
    timer: Mutex<Option<TimerHandle>>,
    on_renewal_error: Option<ErrorCallback>,
    debug: bool,
}

impl TokenRenewalScheduler {
    pub(crate) fn new(
        authenticator: Arc<Authenticator>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        state: Arc<StateCell>,
        on_renewal_error: Option<ErrorCallback>,
        debug: bool,
    ) -> Self {
        Self {
            authenticator,
            scheduler,
            clock,
            state,
            timer: Mutex::new(None),
            on_renewal_error,
            debug,
        }
    }

    /// Arms the renewal timer for a token expiring at `expires_at`.
    /// Non-expiring tokens arm nothing.
    pub(crate) fn schedule(self: &Arc<Self>, expires_at: Option<DateTime<Utc>>) {
        let Some(expires_at) = expires_at else {
            if self.debug {
                tracing::debug!("token does not expire, renewal not scheduled");
            }
            self.disarm();
            return;
        };

        let delay = renewal_delay(expires_at, self.clock.now());
        if self.debug {
            tracing::debug!(delay_secs = delay.as_secs(), "scheduling token renewal");
        }

        let this = Arc::clone(self);
        let handle = self.scheduler.after(delay, Box::pin(this.fire()));
        let mut timer = lock(&self.timer);
        if self.state.get() == ClientState::ShutDown {
            handle.cancel();
            return;
        }
        // The previous handle belongs to the timer now firing, if any; detach it.
        *timer = Some(handle);
    }

    /// Stops the pending renewal, if one is armed.
    pub(crate) fn cancel(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.cancel();
        }
    }

    fn disarm(&self) {
        lock(&self.timer).take();
    }

    async fn fire(self: Arc<Self>) {
        if !self.state.advance(ClientState::Renewing) {
            return;
        }

        let outcome = match self.authenticator.renew().await {
            Ok(info) => Ok(info),
            Err(error) => {
                if self.debug {
                    tracing::warn!(error = %error, "token renewal failed, re-authenticating");
                }
                if !self.state.advance(ClientState::ReAuthenticating) {
                    return;
                }
                self.authenticator.authenticate().await
            }
        };

        match outcome {
            Ok(info) => {
                if self.state.advance(ClientState::Ready) {
                    self.schedule(info.expires_at);
                }
            }
            Err(error) => {
                if self.debug {
                    tracing::error!(error = %error, "re-authentication failed, token renewal stopped");
                }
                self.disarm();
                if self.state.advance(ClientState::Degraded) {
                    if let Some(callback) = &self.on_renewal_error {
                        callback(&error);
                    }
                }
            }
        }
    }
}
