use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::error::{DeployError, DeployResult};

const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Fixed application salt. Provides domain separation for the derived
/// key, not per-record randomness; stored ciphertexts remain tied to
/// this application.
const KEY_SALT: &[u8] = b"estivador-platform-salt";

/// Symmetric codec for credential material stored at rest.
///
/// The operator secret is stretched once with PBKDF2-HMAC-SHA256 into
/// a 256-bit AES-GCM key. Each `encrypt` call draws a fresh 96-bit
/// nonce; the stored form is `base64(nonce || ciphertext || tag)`.
///
/// # Example
///
/// ```
/// use estivador::SecretCodec;
///
/// let codec = SecretCodec::new("operator-secret").unwrap();
/// let stored = codec.encrypt("hunter2").unwrap();
/// assert_eq!(codec.decrypt(&stored).unwrap(), "hunter2");
/// ```
pub struct SecretCodec {
    key: [u8; KEY_LEN],
}

impl SecretCodec {
    /// Derive the symmetric key from the operator secret.
    ///
    /// An empty secret is a configuration error and fails before any
    /// cryptographic operation takes place.
    pub fn new(secret: &str) -> DeployResult<Self> {
        if secret.is_empty() {
            return Err(DeployError::MissingEncryptionSecret);
        }

        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), KEY_SALT, PBKDF2_ITERATIONS, &mut key);
        Ok(Self { key })
    }

    /// Encrypt a plaintext for storage. `encrypt("")` is `""`.
    pub fn encrypt(&self, plaintext: &str) -> DeployResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| DeployError::DecryptionFailed(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a stored value. `decrypt("")` is `""`.
    ///
    /// Fails with [`DeployError::DecryptionFailed`] on invalid base64,
    /// input shorter than the nonce, or an authentication tag
    /// mismatch. Callers holding possibly-legacy plaintext values
    /// should treat this as recoverable.
    pub fn decrypt(&self, ciphertext_b64: &str) -> DeployResult<String> {
        if ciphertext_b64.is_empty() {
            return Ok(String::new());
        }

        let combined = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| DeployError::DecryptionFailed(format!("invalid base64: {e}")))?;

        if combined.len() <= NONCE_LEN {
            return Err(DeployError::DecryptionFailed(format!(
                "ciphertext too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DeployError::DecryptionFailed("authentication tag mismatch".into()))?;

        String::from_utf8(plaintext)
            .map_err(|e| DeployError::DecryptionFailed(format!("not valid UTF-8: {e}")))
    }
}
