use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::SyncError;
use crate::core::credentials::Credentials;

static PAIRING_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").unwrap());

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairResponse {
    api_key: String,
    channel_key: String,
    channel_id: String,
}

/// Trim and validate a six-digit pairing code.
pub fn normalize_code(code: &str) -> Result<&str, SyncError> {
    let code = code.trim();
    if PAIRING_CODE_RE.is_match(code) {
        Ok(code)
    } else {
        Err(SyncError::Pairing(format!(
            "pairing code must be six digits, got '{}'",
            code
        )))
    }
}

/// Exchange a short pairing code for durable relay credentials.
pub async fn redeem_pairing_code(worker_url: &str, code: &str) -> Result<Credentials, SyncError> {
    let code = normalize_code(code)?;
    let worker_url = worker_url.trim().trim_end_matches('/');
    if worker_url.is_empty() {
        return Err(SyncError::Pairing("no worker URL".into()));
    }

    let resp = reqwest::Client::new()
        .post(format!("{}/pair", worker_url))
        .json(&serde_json::json!({ "code": code }))
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(SyncError::Pairing(format!("{}: {}", status, text)));
    }

    let body: PairResponse = resp
        .json()
        .await
        .map_err(|e| SyncError::Pairing(format!("invalid pairing response: {}", e)))?;

    log::info!("Paired with channel {}", body.channel_id);

    Ok(Credentials {
        worker_url: worker_url.to_string(),
        api_key: body.api_key,
        channel_key: body.channel_key,
        channel_id: body.channel_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_digits_with_whitespace() {
        assert_eq!(normalize_code(" 123456\n").unwrap(), "123456");
    }

    #[test]
    fn rejects_short_or_non_numeric_codes() {
        assert!(normalize_code("12345").is_err());
        assert!(normalize_code("1234567").is_err());
        assert!(normalize_code("12a456").is_err());
        assert!(normalize_code("").is_err());
    }

    #[tokio::test]
    async fn invalid_code_fails_before_any_request() {
        let err = redeem_pairing_code("http://127.0.0.1:9", "abc").await.unwrap_err();
        assert!(matches!(err, SyncError::Pairing(_)));
    }
}
