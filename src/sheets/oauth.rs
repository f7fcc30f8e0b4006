//! Service-account authentication for the Sheets API: sign a short-lived
//! JWT with the account's RSA key, exchange it for a bearer token.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Subset of the downloaded service-account JSON we actually need.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    exp: i64,
    iat: i64,
}

/// Read the service-account JSON and exchange a signed assertion for an
/// access token. Tokens are valid for ~1h; callers re-fetch per API call
/// rather than caching across the token boundary.
pub async fn fetch_access_token(client: &reqwest::Client, key_path: &str) -> Result<String> {
    let bytes = tokio::fs::read(key_path)
        .await
        .with_context(|| format!("Could not read service account file {}", key_path))?;
    let key: ServiceAccountKey =
        serde_json::from_slice(&bytes).context("Malformed service account JSON")?;

    let iat = Utc::now();
    let exp = iat + Duration::minutes(55);
    let claims = Claims {
        iss: key.client_email.clone(),
        scope: SPREADSHEETS_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        exp: exp.timestamp(),
        iat: iat.timestamp(),
    };

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .context("Service account private key is not valid RSA PEM")?;
    let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .context("Failed to sign token assertion")?;

    #[derive(Debug, Deserialize)]
    struct TokenResponse {
        access_token: String,
    }

    let resp: TokenResponse = client
        .post(&key.token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await
        .context("Token endpoint unreachable")?
        .error_for_status()
        .context("Token exchange rejected")?
        .json()
        .await
        .context("Token exchange response was not JSON")?;

    Ok(resp.access_token)
}
