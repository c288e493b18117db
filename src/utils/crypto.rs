use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::utils::error::{AppError, Result};

/// Reversible secret storage for platform account passwords.
///
/// Automation has to replay the plaintext password into a login form, so a
/// one-way hash is not an option; secrets are sealed with AES-256-GCM and
/// stored as base64(nonce || ciphertext || tag).
pub struct SecretCipher {
    key_bytes: [u8; 32],
    rng: SystemRandom,
}

impl SecretCipher {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.len() < 16 {
            return Err(AppError::Crypto(
                "encryption key must be at least 16 characters".to_string(),
            ));
        }

        // Derive a fixed-size key from the configured secret
        let hash = digest(&SHA256, secret.as_bytes());
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(hash.as_ref());

        Ok(Self {
            key_bytes,
            rng: SystemRandom::new(),
        })
    }

    fn sealing_key(&self) -> Result<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key_bytes)
            .map_err(|_| AppError::Crypto("failed to build AES key".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }

    pub fn encrypt(&self, plain: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Crypto("failed to generate nonce".to_string()))?;

        let key = self.sealing_key()?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plain.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AppError::Crypto("encryption failed".to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + in_out.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&in_out);

        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| AppError::Crypto(format!("invalid base64 ciphertext: {}", e)))?;

        if combined.len() <= NONCE_LEN {
            return Err(AppError::Crypto("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let mut nonce_arr = [0u8; NONCE_LEN];
        nonce_arr.copy_from_slice(nonce_bytes);

        let key = self.sealing_key()?;
        let nonce = Nonce::assume_unique_for_key(nonce_arr);

        let mut in_out = ciphertext.to_vec();
        let plain = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| AppError::Crypto("decryption failed".to_string()))?;

        String::from_utf8(plain.to_vec())
            .map_err(|e| AppError::Crypto(format!("decrypted data is not UTF-8: {}", e)))
    }
}
