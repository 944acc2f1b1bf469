//! Authenticated encryption of cookie tokens.
//!
//! A [`Crypter`] turns a plaintext string into an opaque base64 token and back. Two constructions
//! are available, selected when the crypter is built:
//!
//! - [`Crypter::gcm`]: AES-256-GCM. Wire layout `nonce(12) || ciphertext || tag(16)`.
//! - [`Crypter::ctr_hmac`]: AES-256-CTR with a detached HMAC-SHA256 computed over
//!   `iv || ciphertext`. Wire layout `iv(16) || mac(32) || ciphertext`.
//!
//! Both use the standard base64 alphabet with padding. Every decryption failure is reported as
//! [`Error::AuthenticationFailed`]; the underlying reason is only visible in `debug` traces.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
    aes::Aes256,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{Key, error::Error, error::Result};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
pub const CTR_IV_LEN: usize = 16;
pub const HMAC_LEN: usize = 32;
const KEY_LEN: usize = 32;

/// Encrypts and authenticates cookie tokens.
///
/// Cloning is cheap enough to do once per store or layer; the crypter only holds immutable key
/// material and can be shared across concurrent requests.
#[derive(Clone)]
pub enum Crypter {
    Gcm(GcmCrypter),
    CtrHmac(CtrHmacCrypter),
}

impl Crypter {
    /// AES-256-GCM keyed by the encryption half of `key`.
    pub fn gcm(key: &Key) -> Result<Self> {
        GcmCrypter::new(key).map(Self::Gcm)
    }

    /// AES-256-CTR keyed by the encryption half of `key`, authenticated with HMAC-SHA256 keyed by
    /// the signing half.
    pub fn ctr_hmac(key: &Key) -> Result<Self> {
        CtrHmacCrypter::new(key).map(Self::CtrHmac)
    }

    /// Encrypt `plaintext` under a fresh nonce and return the base64 token.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        match self {
            Self::Gcm(c) => c.encrypt(plaintext),
            Self::CtrHmac(c) => Ok(c.encrypt(plaintext)),
        }
    }

    /// Authenticate and decrypt a token produced by [`Crypter::encrypt`].
    ///
    /// No plaintext is returned unless authentication succeeded.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        let outcome = match self {
            Self::Gcm(c) => c.decrypt(token),
            Self::CtrHmac(c) => c.decrypt(token),
        };
        outcome.map_err(|reason| {
            tracing::debug!(reason = reason.as_str(), "session token rejected");
            Error::AuthenticationFailed
        })
    }
}

impl fmt::Debug for Crypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcm(_) => f.write_str("Crypter::Gcm(..)"),
            Self::CtrHmac(_) => f.write_str("Crypter::CtrHmac(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Base64,
    Truncated,
    Forged,
    NotUtf8,
}

impl Rejection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Base64 => "invalid base64",
            Self::Truncated => "token shorter than header",
            Self::Forged => "authentication tag mismatch",
            Self::NotUtf8 => "plaintext is not utf-8",
        }
    }
}

#[derive(Clone)]
pub struct GcmCrypter {
    cipher: Aes256Gcm,
}

impl GcmCrypter {
    fn new(key: &Key) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.encryption())
            .map_err(|_| Error::ConfigInvalid("encryption key must be 32 bytes"))?;
        Ok(Self { cipher })
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Format("plaintext too large to seal".into()))?;

        let mut token = Vec::with_capacity(GCM_NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&sealed);
        Ok(STANDARD.encode(token))
    }

    fn decrypt(&self, token: &str) -> std::result::Result<String, Rejection> {
        let bytes = STANDARD.decode(token).map_err(|_| Rejection::Base64)?;
        if bytes.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
            return Err(Rejection::Truncated);
        }

        let (nonce, sealed) = bytes.split_at(GCM_NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Rejection::Forged)?;
        String::from_utf8(plaintext).map_err(|_| Rejection::NotUtf8)
    }
}

#[derive(Clone)]
pub struct CtrHmacCrypter {
    cipher_key: Zeroizing<[u8; KEY_LEN]>,
    // Keyed but never updated; every call works on its own clone.
    mac: HmacSha256,
}

impl CtrHmacCrypter {
    fn new(key: &Key) -> Result<Self> {
        let cipher_key: [u8; KEY_LEN] = key
            .encryption()
            .try_into()
            .map_err(|_| Error::ConfigInvalid("encryption key must be 32 bytes"))?;
        let mac = <HmacSha256 as Mac>::new_from_slice(key.signing())
            .map_err(|_| Error::ConfigInvalid("signing key is unusable for HMAC"))?;
        Ok(Self {
            cipher_key: Zeroizing::new(cipher_key),
            mac,
        })
    }

    fn mac(&self, iv: &[u8], ciphertext: &[u8]) -> [u8; HMAC_LEN] {
        let mut mac = self.mac.clone();
        mac.update(iv);
        mac.update(ciphertext);
        mac.finalize().into_bytes().into()
    }

    fn keystream(&self, iv: &[u8; CTR_IV_LEN]) -> Aes256Ctr {
        Aes256Ctr::new((&*self.cipher_key).into(), iv.into())
    }

    fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; CTR_IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut ciphertext = plaintext.as_bytes().to_vec();
        self.keystream(&iv).apply_keystream(&mut ciphertext);
        let tag = self.mac(&iv, &ciphertext);

        let mut token = Vec::with_capacity(CTR_IV_LEN + HMAC_LEN + ciphertext.len());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&tag);
        token.extend_from_slice(&ciphertext);
        STANDARD.encode(token)
    }

    fn decrypt(&self, token: &str) -> std::result::Result<String, Rejection> {
        let bytes = STANDARD.decode(token).map_err(|_| Rejection::Base64)?;
        if bytes.len() < CTR_IV_LEN + HMAC_LEN {
            return Err(Rejection::Truncated);
        }

        let (iv, rest) = bytes.split_at(CTR_IV_LEN);
        let (tag, ciphertext) = rest.split_at(HMAC_LEN);
        let expected = self.mac(iv, ciphertext);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(Rejection::Forged);
        }

        let iv: &[u8; CTR_IV_LEN] = iv.try_into().map_err(|_| Rejection::Truncated)?;
        let mut plaintext = ciphertext.to_vec();
        self.keystream(iv).apply_keystream(&mut plaintext);
        String::from_utf8(plaintext).map_err(|_| Rejection::NotUtf8)
    }
}
