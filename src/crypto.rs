//! Signing primitives shared by client and server.
//!
//! # Algorithms
//!
//! - **Keys**: ECDSA over NIST P-256
//! - **Signatures**: ECDSA-SHA256, ASN.1 DER encoded
//! - **Public key encoding**: SubjectPublicKeyInfo DER (base64 on the wire)
//! - **Private key encoding**: PKCS#8 DER (only ever written encrypted)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::types::{KnockError, Result};

/// Generate cryptographically secure random bytes.
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

// =============================================================================
// Public keys
// =============================================================================

/// A P-256 public key bound to an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Decode a SubjectPublicKeyInfo DER encoding
    pub fn from_der(der: &[u8]) -> Result<Self> {
        VerifyingKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| KnockError::BadRequest(format!("Malformed public key: {e}")))
    }

    /// Decode the base64 text form used in requests
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let der = BASE64
            .decode(encoded.trim())
            .map_err(|e| KnockError::BadRequest(format!("Malformed public key: {e}")))?;
        Self::from_der(&der)
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| KnockError::Internal(format!("Public key encoding failed: {e}")))
    }

    pub fn to_base64(&self) -> Result<String> {
        Ok(BASE64.encode(self.to_der()?))
    }

    /// Base64 SHA-256 digest of the encoded key, for out-of-band comparison
    pub fn fingerprint(&self) -> Result<String> {
        Ok(BASE64.encode(Sha256::digest(self.to_der()?)))
    }

    /// Verify a DER signature over `message`.
    pub fn verify(&self, message: &[u8], signature_der: &[u8]) -> Result<()> {
        let signature = Signature::from_der(signature_der)
            .map_err(|_| KnockError::InvalidSignature("Invalid signature".into()))?;

        self.0
            .verify(message, &signature)
            .map_err(|_| KnockError::InvalidSignature("Invalid signature".into()))
    }

    /// Verify a base64 DER signature over the exact bytes of a challenge string.
    pub fn verify_challenge(&self, challenge: &str, signature_base64: &str) -> Result<()> {
        let signature = BASE64
            .decode(signature_base64.trim())
            .map_err(|_| KnockError::InvalidSignature("Invalid signature".into()))?;
        self.verify(challenge.as_bytes(), &signature)
    }
}

// =============================================================================
// Keypairs
// =============================================================================

/// A P-256 signing keypair held in memory.
///
/// The secret scalar is zeroized when the keypair is dropped.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().clone())
    }

    /// Sign `message`, returning the DER signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    /// Sign the exact bytes of a challenge string, base64 encoding the signature
    pub fn sign_challenge(&self, challenge: &str) -> String {
        BASE64.encode(self.sign(challenge.as_bytes()))
    }

    pub fn to_pkcs8_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.signing_key
            .to_pkcs8_der()
            .map(|doc| Zeroizing::new(doc.as_bytes().to_vec()))
            .map_err(|e| KnockError::Internal(format!("Private key encoding failed: {e}")))
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        SigningKey::from_pkcs8_der(der)
            .map(|signing_key| Self { signing_key })
            .map_err(|e| KnockError::DecryptionFailed(format!("Malformed private key: {e}")))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes1: [u8; 32] = generate_random_bytes();
        let bytes2: [u8; 32] = generate_random_bytes();
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_sign_and_verify_challenge() {
        let keypair = Keypair::generate();
        let challenge = "c29tZS1jaGFsbGVuZ2U=";

        let signature = keypair.sign_challenge(challenge);
        assert!(keypair.public_key().verify_challenge(challenge, &signature).is_ok());

        // Different message must not verify
        let result = keypair.public_key().verify_challenge("other", &signature);
        assert!(matches!(result, Err(KnockError::InvalidSignature(_))));
    }

    #[test]
    fn test_signature_from_other_key_rejected() {
        let alice = Keypair::generate();
        let mallory = Keypair::generate();

        let signature = mallory.sign_challenge("nonce");
        assert!(alice.public_key().verify_challenge("nonce", &signature).is_err());
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let keypair = Keypair::generate();
        let pk = keypair.public_key();
        assert!(matches!(
            pk.verify_challenge("nonce", "!!not-base64!!"),
            Err(KnockError::InvalidSignature(_))
        ));
        assert!(matches!(
            pk.verify_challenge("nonce", &BASE64.encode(b"not der")),
            Err(KnockError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let keypair = Keypair::generate();
        let encoded = keypair.public_key().to_base64().unwrap();
        let decoded = PublicKey::from_base64(&encoded).unwrap();
        assert_eq!(decoded, keypair.public_key());
    }

    #[test]
    fn test_malformed_public_key() {
        assert!(matches!(
            PublicKey::from_base64("bm90IGEga2V5"),
            Err(KnockError::BadRequest(_))
        ));
        assert!(PublicKey::from_base64("%%%").is_err());
    }

    #[test]
    fn test_pkcs8_roundtrip_signs_identically() {
        let keypair = Keypair::generate();
        let der = keypair.to_pkcs8_der().unwrap();
        let restored = Keypair::from_pkcs8_der(&der).unwrap();

        assert_eq!(restored.public_key(), keypair.public_key());
        let signature = restored.sign(b"payload");
        assert!(keypair.public_key().verify(b"payload", &signature).is_ok());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let keypair = Keypair::generate();
        let fp1 = keypair.public_key().fingerprint().unwrap();
        let fp2 = keypair.public_key().fingerprint().unwrap();
        assert_eq!(fp1, fp2);
        // SHA-256 -> 32 bytes -> 44 base64 chars
        assert_eq!(fp1.len(), 44);
        assert_ne!(fp1, Keypair::generate().public_key().fingerprint().unwrap());
    }
}
