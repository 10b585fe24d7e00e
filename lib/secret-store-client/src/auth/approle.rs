use super::{TokenInfo, parse_auth};
use crate::error::Result;
use crate::executor::RequestExecutor;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;

#[derive(Serialize)]
struct LoginRequest<'a> {
    role_id: &'a str,
    secret_id: &'a str,
}

/// Exchanges a role ID and secret ID for a client token.
pub(super) async fn login(
    executor: &RequestExecutor,
    mount_path: &str,
    role_id: &str,
    secret_id: &str,
    now: DateTime<Utc>,
) -> Result<TokenInfo> {
    let body = serde_json::to_value(LoginRequest { role_id, secret_id })?;
    let response = executor
        .execute(Method::POST, &format!("/v1/auth/{}/login", mount_path), Some(body))
        .await?;
    let auth = parse_auth(response)?;

    Ok(TokenInfo::with_lease(auth.client_token, now, auth.lease_duration))
}
