use super::{SharedSession, TokenInfo};
use crate::error::{Result, SecretStoreError};
use crate::executor::RequestExecutor;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Method;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct LookupResponse {
    data: Option<LookupData>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupData {
    expire_time: Option<String>,
    #[serde(default)]
    ttl: u64,
}

/// Installs the static token, then asks the backend when it expires.
/// A failed lookup puts the previous session back.
pub(super) async fn login(
    executor: &RequestExecutor,
    session: &SharedSession,
    token: &str,
    now: DateTime<Utc>,
) -> Result<TokenInfo> {
    // lookup-self authenticates with the token it is asked about
    let previous = session
        .write()
        .await
        .replace(TokenInfo::new(token.to_string(), None));

    match lookup(executor, token, now).await {
        Ok(info) => Ok(info),
        Err(e) => {
            *session.write().await = previous;
            Err(e)
        }
    }
}

async fn lookup(executor: &RequestExecutor, token: &str, now: DateTime<Utc>) -> Result<TokenInfo> {
    let response = executor
        .execute(Method::GET, "/v1/auth/token/lookup-self", None)
        .await?;
    let parsed: LookupResponse = serde_json::from_value(response)
        .map_err(|e| SecretStoreError::InvalidResponse(format!("Invalid lookup-self response: {}", e)))?;

    Ok(TokenInfo::new(
        token.to_string(),
        expiry(parsed.data.unwrap_or_default(), now)?,
    ))
}

fn expiry(data: LookupData, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    if let Some(expire_time) = data.expire_time.filter(|s| !s.is_empty()) {
        let parsed = DateTime::parse_from_rfc3339(&expire_time)
            .map_err(|e| SecretStoreError::InvalidResponse(format!("Invalid expire_time: {}", e)))?;
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    if data.ttl > 0 {
        let ttl = i64::try_from(data.ttl).ok().and_then(TimeDelta::try_seconds);
        return Ok(ttl.and_then(|ttl| now.checked_add_signed(ttl)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_time_preferred() {
        let now = Utc::now();
        let data = LookupData {
            expire_time: Some("2030-01-01T00:00:00Z".to_string()),
            ttl: 60,
        };
        let expected = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z").unwrap();
        assert_eq!(expiry(data, now).unwrap(), Some(expected.with_timezone(&Utc)));
    }

    #[test]
    fn test_ttl_fallback() {
        let now = Utc::now();
        let data = LookupData {
            expire_time: None,
            ttl: 120,
        };
        assert_eq!(expiry(data, now).unwrap(), Some(now + TimeDelta::seconds(120)));
    }

    #[test]
    fn test_root_token_never_expires() {
        assert_eq!(expiry(LookupData::default(), Utc::now()).unwrap(), None);
    }

    #[test]
    fn test_invalid_expire_time() {
        let data = LookupData {
            expire_time: Some("tomorrow".to_string()),
            ttl: 0,
        };
        assert!(matches!(
            expiry(data, Utc::now()),
            Err(SecretStoreError::InvalidResponse(_))
        ));
    }
}
