// Service-account identity and private key loading

use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo, SecretDocument};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::{PublishError, Result};

/// Where the private key material comes from
#[derive(Clone)]
pub enum KeySource {
    Path(PathBuf),
    Inline(String),
}

impl KeySource {
    /// Human-readable name used in error messages (never the key itself)
    pub fn describe(&self) -> String {
        match self {
            KeySource::Path(path) => path.display().to_string(),
            KeySource::Inline(_) => "inline private key".to_string(),
        }
    }

    fn read(&self) -> Result<String> {
        match self {
            KeySource::Path(path) => std::fs::read_to_string(path)
                .map_err(|e| PublishError::key_load(self.describe(), e)),
            KeySource::Inline(pem) => Ok(pem.clone()),
        }
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            KeySource::Inline(_) => f.write_str("Inline(<redacted>)"),
        }
    }
}

/// The non-interactive identity uploads are performed as
#[derive(Clone)]
pub struct Identity {
    /// Service account email. Falls back to `client_email` of a JSON key file.
    pub email: Option<String>,
    pub key_source: KeySource,
    pub passphrase: Option<String>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("key_source", &self.key_source)
            .field(
                "passphrase",
                &self.passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Decoded key plus the email it signs for
pub struct LoadedKey {
    pub email: String,
    pub private_key: RsaPrivateKey,
}

/// Google service-account JSON key file (only the fields we use)
#[derive(Deserialize)]
struct ServiceAccountKeyFile {
    client_email: Option<String>,
    private_key: String,
}

impl Identity {
    /// Read and decode the private key.
    ///
    /// Accepts PKCS#1 PEM, PKCS#8 PEM, encrypted PKCS#8 PEM (with the
    /// passphrase) and Google JSON key files. Non-RSA keys are rejected with a
    /// signing error since they cannot produce RS256 signatures.
    pub fn load_key(&self) -> Result<LoadedKey> {
        let source_name = self.key_source.describe();
        let contents = self.key_source.read()?;

        let (pem, file_email) = if contents.trim_start().starts_with('{') {
            let key_file: ServiceAccountKeyFile = serde_json::from_str(&contents)
                .map_err(|e| {
                    PublishError::key_load(&source_name, format!("Invalid JSON key file: {}", e))
                })?;
            (key_file.private_key, key_file.client_email)
        } else {
            (contents, None)
        };

        let private_key = decode_pem(&pem, self.passphrase.as_deref(), &source_name)?;

        let email = self
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .or(file_email)
            .ok_or_else(|| {
                PublishError::key_load(
                    &source_name,
                    "No service account email configured and the key file has no client_email",
                )
            })?;

        Ok(LoadedKey { email, private_key })
    }
}

fn decode_pem(pem: &str, passphrase: Option<&str>, source_name: &str) -> Result<RsaPrivateKey> {
    if pem.contains("BEGIN RSA PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| PublishError::key_load(source_name, format!("Invalid PKCS#1 key: {}", e)));
    }

    if pem.contains("BEGIN ENCRYPTED PRIVATE KEY") {
        let passphrase = passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
            PublishError::key_load(source_name, "Key is encrypted but no passphrase is configured")
        })?;

        let (_, document) = SecretDocument::from_pem(pem)
            .map_err(|e| PublishError::key_load(source_name, format!("Invalid PEM: {}", e)))?;
        let encrypted = EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| {
            PublishError::key_load(source_name, format!("Invalid encrypted key: {}", e))
        })?;
        let decrypted = encrypted.decrypt(passphrase).map_err(|e| {
            PublishError::key_load(
                source_name,
                format!("Failed to decrypt key (wrong passphrase?): {}", e),
            )
        })?;

        return rsa_from_pkcs8_der(decrypted.as_bytes(), source_name);
    }

    if pem.contains("BEGIN PRIVATE KEY") {
        let (_, document) = SecretDocument::from_pem(pem)
            .map_err(|e| PublishError::key_load(source_name, format!("Invalid PEM: {}", e)))?;
        return rsa_from_pkcs8_der(document.as_bytes(), source_name);
    }

    Err(PublishError::key_load(
        source_name,
        "Unsupported private key format. Expected PEM with one of: \
         BEGIN PRIVATE KEY, BEGIN ENCRYPTED PRIVATE KEY, BEGIN RSA PRIVATE KEY. \
         Convert a PKCS#12 bundle with: openssl pkcs12 -in key.p12 -nodes -nocerts | openssl pkcs8 -topk8 -nocrypt",
    ))
}

fn rsa_from_pkcs8_der(der: &[u8], source_name: &str) -> Result<RsaPrivateKey> {
    let info = PrivateKeyInfo::try_from(der)
        .map_err(|e| PublishError::key_load(source_name, format!("Invalid PKCS#8 key: {}", e)))?;

    if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
        return Err(PublishError::Signing(format!(
            "Private key in {} is not an RSA key (algorithm {})",
            source_name, info.algorithm.oid
        )));
    }

    RsaPrivateKey::try_from(info)
        .map_err(|e| PublishError::key_load(source_name, format!("Invalid RSA key: {}", e)))
}
