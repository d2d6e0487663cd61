//! RSA private keys for signed token requests
//!
//! Keys are PKCS#8, given either as PEM or as the bare base64 body with the
//! armour and line breaks stripped. Signatures use PKCS#1 v1.5 padding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ddns_core::{Error, Result};
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;
use std::fmt;

pub(crate) struct RsaKey(PKey<Private>);

impl fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RsaKey(<REDACTED>)")
    }
}

impl RsaKey {
    pub(crate) fn parse(provider: &str, raw: &str) -> Result<Self> {
        let body: String = raw
            .replace("\\n", "\n")
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .flat_map(|line| line.chars())
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = STANDARD
            .decode(body)
            .map_err(|e| Error::config(format!("{provider}: private key is not base64: {e}")))?;
        let key = PKey::private_key_from_pkcs8(&der)
            .map_err(|_| Error::config(format!("{provider}: private key is not PKCS#8")))?;
        if key.id() != Id::RSA {
            return Err(Error::config(format!("{provider}: private key is not an RSA key")));
        }
        Ok(Self(key))
    }

    fn sign(&self, digest: MessageDigest, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(digest, &self.0).map_err(signing_failed)?;
        signer.update(data).map_err(signing_failed)?;
        signer.sign_to_vec().map_err(signing_failed)
    }

    pub(crate) fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign(MessageDigest::sha256(), data)
    }

    pub(crate) fn sign_sha512(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign(MessageDigest::sha512(), data)
    }
}

fn signing_failed(e: openssl::error::ErrorStack) -> Error {
    Error::config(format!("signing with private key: {e}"))
}
