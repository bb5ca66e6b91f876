//! Deterministic, reversible encoding of account numbers.
//!
//! AES-CBC with PKCS#7 padding under a fixed key and a fixed IV, rendered as standard
//! base64. A fixed IV makes encryption deterministic, which is what allows equality
//! lookups on the encoded number. The trade-off: equal plaintexts produce equal
//! ciphertexts, and the scheme is weaker than randomized-IV encryption. Account numbers
//! are unique, so the equality leak carries no extra information here.
//!
//! Outside the owner's `AccountOpened` notification the plaintext is never persisted;
//! that event's outbox row has its number cleared once delivered.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use corebank_banking::{AccountNumber, EncodedAccountNumber};
use corebank_core::{DomainError, DomainResult};

const IV_LEN: usize = 16;

#[derive(Clone)]
enum Key {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl Key {
    fn from_slice(key: &[u8]) -> DomainResult<Self> {
        let invalid = || {
            DomainError::crypto(format!(
                "encryption key must be 16, 24 or 32 bytes, got {}",
                key.len()
            ))
        };
        match key.len() {
            16 => Ok(Key::Aes128(key.try_into().map_err(|_| invalid())?)),
            24 => Ok(Key::Aes192(key.try_into().map_err(|_| invalid())?)),
            32 => Ok(Key::Aes256(key.try_into().map_err(|_| invalid())?)),
            _ => Err(invalid()),
        }
    }
}

/// Account number cipher configured once at process start.
#[derive(Clone)]
pub struct AccountNumberCipher {
    key: Key,
    iv: [u8; IV_LEN],
}

impl core::fmt::Debug for AccountNumberCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccountNumberCipher").finish_non_exhaustive()
    }
}

impl AccountNumberCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> DomainResult<Self> {
        let key = Key::from_slice(key)?;
        let iv: [u8; IV_LEN] = iv.try_into().map_err(|_| {
            DomainError::crypto(format!(
                "initialization vector must be {IV_LEN} bytes, got {}",
                iv.len()
            ))
        })?;
        Ok(Self { key, iv })
    }

    /// Build from base64-encoded key and IV (the configuration format).
    pub fn from_base64(key: &str, iv: &str) -> DomainResult<Self> {
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| DomainError::crypto(format!("encryption key is not valid base64: {e}")))?;
        let iv = STANDARD
            .decode(iv.trim())
            .map_err(|e| DomainError::crypto(format!("initialization vector is not valid base64: {e}")))?;
        Self::new(&key, &iv)
    }

    pub fn encrypt(&self, plaintext: &str) -> DomainResult<String> {
        let bytes = plaintext.as_bytes();
        let ciphertext = match &self.key {
            Key::Aes128(k) => cbc::Encryptor::<aes::Aes128>::new_from_slices(k, &self.iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(bytes)),
            Key::Aes192(k) => cbc::Encryptor::<aes::Aes192>::new_from_slices(k, &self.iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(bytes)),
            Key::Aes256(k) => cbc::Encryptor::<aes::Aes256>::new_from_slices(k, &self.iv)
                .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(bytes)),
        }
        .map_err(|_| DomainError::crypto("invalid key or initialization vector length"))?;
        Ok(STANDARD.encode(ciphertext))
    }

    pub fn decrypt(&self, ciphertext: &str) -> DomainResult<String> {
        let bytes = STANDARD
            .decode(ciphertext)
            .map_err(|e| DomainError::crypto(format!("ciphertext is not valid base64: {e}")))?;

        let invalid_length =
            |_| DomainError::crypto("invalid key or initialization vector length");
        let plaintext = match &self.key {
            Key::Aes128(k) => cbc::Decryptor::<aes::Aes128>::new_from_slices(k, &self.iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(&bytes),
            Key::Aes192(k) => cbc::Decryptor::<aes::Aes192>::new_from_slices(k, &self.iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(&bytes),
            Key::Aes256(k) => cbc::Decryptor::<aes::Aes256>::new_from_slices(k, &self.iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(&bytes),
        }
        .map_err(|_| DomainError::crypto("decryption failed: bad padding or wrong key"))?;

        String::from_utf8(plaintext)
            .map_err(|_| DomainError::crypto("decrypted account number is not valid UTF-8"))
    }

    pub fn encode(&self, number: &AccountNumber) -> DomainResult<EncodedAccountNumber> {
        self.encrypt(number.as_str()).map(EncodedAccountNumber::new)
    }

    pub fn decode(&self, encoded: &EncodedAccountNumber) -> DomainResult<AccountNumber> {
        let plaintext = self.decrypt(encoded.as_str())?;
        AccountNumber::parse(&plaintext)
    }
}
