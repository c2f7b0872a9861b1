use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::auth::{AssertionSigner, Claims};
use crate::config::Settings;

/// Build a signed assertion, check it against the key's public half and print it
pub fn assertion_command(settings: &Settings) -> Result<()> {
    let signer = AssertionSigner::new(settings.identity(), settings.assertion_settings());

    let assertion = signer.create().context("Failed to create signed assertion")?;
    let public_key = signer.public_key()?;
    if !assertion.verify(&public_key) {
        bail!("Signed assertion does not verify against the configured key");
    }

    let claims = assertion.decode_claims()?;

    println!("{}", assertion);
    println!();
    print_claims(&claims);
    println!("  Signature:  valid (RS256)");

    Ok(())
}

fn print_claims(claims: &Claims) {
    println!("  Issuer:     {}", claims.iss);
    println!("  Scope:      {}", claims.scope);
    println!("  Audience:   {}", claims.aud);
    println!("  Issued at:  {}", format_timestamp(claims.iat));
    println!(
        "  Expires at: {} (after {} minutes)",
        format_timestamp(claims.exp),
        (claims.exp - claims.iat) / 60
    );
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%B %d, %Y at %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(
            format_timestamp(1_700_000_000),
            "November 14, 2023 at 22:13:20 UTC"
        );
    }

    #[test]
    fn test_format_timestamp_out_of_range_falls_back_to_number() {
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }
}
