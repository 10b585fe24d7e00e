use chrono::{DateTime, TimeDelta, Utc};

/// The current session token and when it stops being valid.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub token: String,
    /// `None` for tokens that never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenInfo {
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Token whose lifetime the backend reported as a lease duration in seconds.
    /// A zero lease means the token does not expire.
    pub fn with_lease(token: String, now: DateTime<Utc>, lease_duration_secs: u64) -> Self {
        let expires_at = if lease_duration_secs == 0 {
            None
        } else {
            i64::try_from(lease_duration_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|lease| now.checked_add_signed(lease))
        };
        Self { token, expires_at }
    }
}
