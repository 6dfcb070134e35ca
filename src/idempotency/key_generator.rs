use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const DELIMITER: char = '|';
const ESCAPE: char = '\\';

/// Configuration for client key validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGeneratorConfig {
    pub min_key_length: usize,
    pub max_key_length: usize,
}

impl Default for KeyGeneratorConfig {
    fn default() -> Self {
        Self {
            min_key_length: 16,
            max_key_length: 128,
        }
    }
}

/// Builds composite keys and request fingerprints for idempotent writes.
#[derive(Debug, Clone)]
pub struct IdempotencyKeyGenerator {
    config: KeyGeneratorConfig,
}

impl IdempotencyKeyGenerator {
    pub fn new(config: KeyGeneratorConfig) -> Self {
        Self { config }
    }

    pub fn with_default_config() -> Self {
        Self::new(KeyGeneratorConfig::default())
    }

    /// Joins key, operation and body hash into the dedup identity.
    ///
    /// Order-sensitive. Delimiters and escapes inside components are escaped,
    /// so distinct triples never collide.
    pub fn composite_key(&self, key: &str, operation: &str, body_hash: &str) -> String {
        let mut out = String::with_capacity(key.len() + operation.len() + body_hash.len() + 2);
        push_escaped(&mut out, key);
        out.push(DELIMITER);
        push_escaped(&mut out, operation);
        out.push(DELIMITER);
        push_escaped(&mut out, body_hash);
        out
    }

    /// Checks that the three composite-key inputs are usable.
    pub fn validate_components(&self, key: &str, operation: &str, body_hash: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(AppError::Validation("Idempotency key cannot be empty".to_string()));
        }
        if operation.trim().is_empty() {
            return Err(AppError::Validation("Operation cannot be empty".to_string()));
        }
        if body_hash.trim().is_empty() {
            return Err(AppError::Validation("Body hash cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Validates a client-supplied idempotency key.
    pub fn validate_client_key(&self, client_key: &str) -> Result<()> {
        let len = client_key.chars().count();
        if len < self.config.min_key_length || len > self.config.max_key_length {
            return Err(AppError::Validation(format!(
                "Idempotency key must be between {} and {} characters",
                self.config.min_key_length, self.config.max_key_length
            )));
        }
        if !client_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
        {
            return Err(AppError::Validation(
                "Idempotency key contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }

    /// SHA-256 of the raw request body, hex encoded.
    pub fn hash_body(&self, body: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(body);
        hex::encode(hasher.finalize())
    }

    /// Logical operation name, e.g. `POST /api/v1/products`.
    pub fn operation_name(&self, method: &str, path: &str) -> String {
        format!("{} {}", method.to_uppercase(), path)
    }
}

fn push_escaped(out: &mut String, component: &str) {
    for c in component.chars() {
        if c == DELIMITER || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}
