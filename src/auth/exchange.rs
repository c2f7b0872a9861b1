// Assertion -> bearer token exchange (JWT-bearer grant)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::assertion::{AssertionSigner, SignedAssertion};
use crate::error::{PublishError, Result};
use crate::transport::{HttpRequest, HttpTransport};

pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    assertion: &'a str,
}

/// Successful token endpoint response
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "access_token")]
    pub token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// OAuth error body, e.g. `{"error":"invalid_grant","error_description":"..."}`
#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges signed assertions for access tokens
pub struct TokenExchanger {
    signer: AssertionSigner,
    transport: Arc<dyn HttpTransport>,
}

impl TokenExchanger {
    pub fn new(signer: AssertionSigner, transport: Arc<dyn HttpTransport>) -> Self {
        Self { signer, transport }
    }

    /// Sign a fresh assertion and exchange it. Tokens are never cached.
    pub async fn fetch_access_token(&self) -> Result<AccessToken> {
        let assertion = self.signer.create()?;
        self.exchange(&assertion).await
    }

    pub async fn exchange(&self, assertion: &SignedAssertion) -> Result<AccessToken> {
        let token_url = &self.signer.settings().token_url;
        let assertion = assertion.to_string();
        let form = serde_urlencoded::to_string(TokenRequest {
            grant_type: JWT_BEARER_GRANT_TYPE,
            assertion: &assertion,
        })
        .map_err(|e| PublishError::protocol(token_url, format!("Failed to encode form: {}", e)))?;

        let request = HttpRequest::new(token_url, form.into_bytes())
            .header("Content-Type", "application/x-www-form-urlencoded");

        let response = self.transport.post(request).await?;
        info!("POST : {} -> {}", token_url, response.status);

        if !response.is_success() {
            let message = match response.json::<TokenErrorResponse>() {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => response.text(),
            };
            return Err(PublishError::protocol(
                token_url,
                format!("Token endpoint returned status {}: {}", response.status, message),
            ));
        }

        let token: AccessToken = response.json().map_err(|e| {
            PublishError::protocol(token_url, format!("Failed to parse token response: {}", e))
        })?;
        debug!(
            "Obtained {} token (expires in {:?}s)",
            token.token_type.as_deref().unwrap_or("bearer"),
            token.expires_in
        );

        Ok(token)
    }
}
