//! Account addresses and signing keys.
//!
//! A signing key is derived from an account's BIP-39 recovery phrase. The
//! address is the base58 encoding of `public_key || checksum`, where the
//! checksum is the last four bytes of SHA-512/256 over the public key.

use core::fmt;
use core::str::FromStr;

use bip39::Mnemonic;
use ed25519_dalek::{Signature, Signer, SigningKey};
use sha2::{Digest, Sha512_256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{RequestError, Result};

/// Length of the address checksum.
pub const CHECKSUM_LEN: usize = 4;

/// Public key length.
pub const PUBLIC_KEY_LEN: usize = 32;

/// An account address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address([u8; PUBLIC_KEY_LEN]);

impl Address {
    pub fn from_public_key(public_key: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(public_key)
    }

    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    fn checksum(public_key: &[u8]) -> [u8; CHECKSUM_LEN] {
        let digest = Sha512_256::digest(public_key);
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
        out
    }

    /// Decode an address, rejecting bad encodings and checksums.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| RequestError::invalid_params(format!("Invalid address: {}", e)))?;

        if bytes.len() != PUBLIC_KEY_LEN + CHECKSUM_LEN {
            return Err(RequestError::invalid_params("Invalid address: wrong length"));
        }

        let (key, checksum) = bytes.split_at(PUBLIC_KEY_LEN);
        if !bool::from(Self::checksum(key)[..].ct_eq(checksum)) {
            return Err(RequestError::invalid_params("Invalid address: checksum mismatch"));
        }

        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(key);
        Ok(Self(public_key))
    }

    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(PUBLIC_KEY_LEN + CHECKSUM_LEN);
        raw.extend_from_slice(&self.0);
        raw.extend_from_slice(&Self::checksum(&self.0));
        bs58::encode(raw).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Signing key and the address it controls.
///
/// The secret half is zeroized on drop.
pub struct SigningIdentity {
    key: SigningKey,
    address: Address,
}

impl SigningIdentity {
    /// Derive the signing key from a BIP-39 recovery phrase.
    ///
    /// The first 32 bytes of the BIP-39 seed (empty passphrase) are the
    /// Ed25519 secret.
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse(phrase).map_err(|e| RequestError::KeyDerivation {
            reason: format!("Invalid mnemonic: {}", e),
        })?;

        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&seed[..32]);

        let key = SigningKey::from_bytes(&secret);
        let address = Address::from_public_key(key.verifying_key().to_bytes());
        Ok(Self { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Whether this identity controls `address`. Comparison is constant time.
    pub fn controls(&self, address: &str) -> bool {
        match Address::parse(address) {
            Ok(parsed) => bool::from(parsed.public_key()[..].ct_eq(&self.address.public_key()[..])),
            Err(_) => false,
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Verifier, VerifyingKey};

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_address_roundtrip() {
        let address = Address::from_public_key([0xAB; 32]);
        let encoded = address.to_string();
        assert_eq!(encoded.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_address_checksum_rejected() {
        let address = Address::from_public_key([0x11; 32]);
        let mut raw = bs58::decode(address.encode()).into_vec().unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = bs58::encode(raw).into_string();
        assert!(Address::parse(&tampered).is_err());
    }

    #[test]
    fn test_mnemonic_derivation_is_deterministic() {
        let a = SigningIdentity::from_mnemonic(PHRASE).unwrap();
        let b = SigningIdentity::from_mnemonic(PHRASE).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.controls(&b.address().to_string()));
    }

    #[test]
    fn test_signature_verifies() {
        let identity = SigningIdentity::from_mnemonic(PHRASE).unwrap();
        let sig = identity.sign(b"payload");
        let vk = VerifyingKey::from_bytes(identity.address().public_key()).unwrap();
        assert!(vk.verify(b"payload", &sig).is_ok());
    }

    #[test]
    fn test_invalid_mnemonic() {
        let err = SigningIdentity::from_mnemonic("not a real recovery phrase").unwrap_err();
        assert_eq!(err.code(), "KeyDerivation");
    }
}
