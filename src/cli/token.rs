use anyhow::{Context, Result};
use std::sync::Arc;

use crate::auth::{AssertionSigner, TokenExchanger};
use crate::config::Settings;
use crate::transport::ReqwestTransport;

/// Fetch an access token and print it
pub async fn token_command(settings: &Settings) -> Result<()> {
    let exchanger = TokenExchanger::new(
        AssertionSigner::new(settings.identity(), settings.assertion_settings()),
        Arc::new(ReqwestTransport::new(settings.request_timeout())),
    );

    let token = exchanger
        .fetch_access_token()
        .await
        .context("Failed to fetch access token")?;

    println!("access_token is {}", token.token);
    if let Some(expires_in) = token.expires_in {
        println!("expires in {} seconds", expires_in);
    }

    Ok(())
}
