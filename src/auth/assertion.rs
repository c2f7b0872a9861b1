// Signed service-account assertions (compact JWS, RS256)

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::key::Identity;
use crate::error::{PublishError, Result};

/// Claim values shared by every assertion a signer produces
#[derive(Debug, Clone)]
pub struct AssertionSettings {
    /// Token endpoint; also the assertion audience
    pub token_url: String,
    pub scope: String,
    pub lifetime: Duration,
}

#[derive(Serialize)]
struct AssertionHeader {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: AssertionHeader = AssertionHeader {
    alg: "RS256",
    typ: "JWT",
};

/// Assertion claims. Field order is the serialization order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(issuer: &str, settings: &AssertionSettings, issued_at: i64) -> Self {
        Self {
            iss: issuer.to_string(),
            scope: settings.scope.clone(),
            aud: settings.token_url.clone(),
            exp: issued_at + settings.lifetime.as_secs() as i64,
            iat: issued_at,
        }
    }
}

/// URL-safe base64 without padding
pub fn base64url_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn base64url_decode(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(encoded)
}

/// Three encoded segments: header, claims, signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAssertion {
    pub header: String,
    pub claims: String,
    pub signature: String,
}

impl SignedAssertion {
    /// Encode header and claims, then sign `header.claims` with RSASSA-PKCS1-v1_5 over SHA-256
    pub fn sign(claims: &Claims, private_key: &RsaPrivateKey) -> Result<Self> {
        let header_json = serde_json::to_vec(&HEADER)
            .map_err(|e| PublishError::Signing(format!("Failed to serialize header: {}", e)))?;
        let claims_json = serde_json::to_vec(claims)
            .map_err(|e| PublishError::Signing(format!("Failed to serialize claims: {}", e)))?;

        let header = base64url_encode(header_json);
        let claims = base64url_encode(claims_json);
        let signing_input = format!("{}.{}", header, claims);

        let signing_key = SigningKey::<Sha256>::new(private_key.clone());
        let signature = signing_key
            .try_sign(signing_input.as_bytes())
            .map_err(|e| PublishError::Signing(e.to_string()))?;

        Ok(Self {
            header,
            claims,
            signature: base64url_encode(signature.to_bytes()),
        })
    }

    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.claims)
    }

    /// Check the signature segment against the signing input
    pub fn verify(&self, public_key: &RsaPublicKey) -> bool {
        let Ok(signature_bytes) = base64url_decode(&self.signature) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(signature_bytes.as_slice()) else {
            return false;
        };

        VerifyingKey::<Sha256>::new(public_key.clone())
            .verify(self.signing_input().as_bytes(), &signature)
            .is_ok()
    }

    pub fn decode_claims(&self) -> Result<Claims> {
        let bytes = base64url_decode(&self.claims)
            .map_err(|e| PublishError::Signing(format!("Claims segment is not base64url: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PublishError::Signing(format!("Claims segment is not valid JSON: {}", e)))
    }
}

impl fmt::Display for SignedAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.header, self.claims, self.signature)
    }
}

/// Builds a fresh signed assertion for every token request
pub struct AssertionSigner {
    identity: Identity,
    settings: AssertionSettings,
}

impl AssertionSigner {
    pub fn new(identity: Identity, settings: AssertionSettings) -> Self {
        Self { identity, settings }
    }

    pub fn settings(&self) -> &AssertionSettings {
        &self.settings
    }

    /// Sign an assertion issued now
    pub fn create(&self) -> Result<SignedAssertion> {
        self.create_at(chrono::Utc::now().timestamp())
    }

    /// Sign an assertion issued at `issued_at` (unix seconds).
    ///
    /// The key is reloaded on every call so a key problem surfaces on the
    /// request that needs it.
    pub fn create_at(&self, issued_at: i64) -> Result<SignedAssertion> {
        let key = self.identity.load_key()?;
        let claims = Claims::new(&key.email, &self.settings, issued_at);
        debug!(
            "Signing assertion for {} (iat={}, exp={})",
            claims.iss, claims.iat, claims.exp
        );
        SignedAssertion::sign(&claims, &key.private_key)
    }

    /// Public half of the configured key
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        let key = self.identity.load_key()?;
        Ok(RsaPublicKey::from(&key.private_key))
    }
}
