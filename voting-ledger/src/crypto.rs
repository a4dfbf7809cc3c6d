//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - SHA-256 hashing for events
//! - Hash-chain verification of the audit log

use crate::types::{ChainHead, LedgerEvent, Signature};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Ed25519 key pair for signing
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signature = self.signing_key.sign(message);
        Signature::from_bytes(signature.to_bytes())
    }

    /// Sign an event's hash in place
    pub fn sign_event(&self, event: &mut LedgerEvent) {
        event.signature = Some(self.sign(&event.hash));
    }

    /// Load the 32-byte seed at `path`, or generate one and store it there
    pub fn load_or_generate(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let bytes = std::fs::read(path)?;
            let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                Error::Config(format!(
                    "Signing key {} must hold 32 bytes, found {}",
                    path.display(),
                    bytes.len()
                ))
            })?;
            return Ok(Self::from_seed(&seed));
        }

        let keypair = Self::generate();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, keypair.signing_key.to_bytes())?;
        tracing::info!(path = %path.display(), "Generated signing key");

        Ok(keypair)
    }
}

/// Verify a signature with a public key
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &[u8; 32]) -> bool {
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    let verifying_key = match VerifyingKey::from_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Walk an event log and check sequence continuity, hash linkage and
/// (when `public_key` is given) signatures.
///
/// Returns the head of the verified chain.
pub fn verify_chain(events: &[LedgerEvent], public_key: Option<&[u8; 32]>) -> Result<ChainHead> {
    let mut head = ChainHead::default();

    for event in events {
        if event.sequence != head.sequence + 1 {
            return Err(Error::InvariantViolation(format!(
                "Sequence gap: expected {}, found {}",
                head.sequence + 1,
                event.sequence
            )));
        }

        if event.previous_hash != head.hash {
            return Err(Error::InvariantViolation(format!(
                "Broken hash link at sequence {}",
                event.sequence
            )));
        }

        if event.compute_hash()? != event.hash {
            return Err(Error::InvariantViolation(format!(
                "Hash mismatch at sequence {}",
                event.sequence
            )));
        }

        if let Some(key) = public_key {
            if !event.verify_signature(key) {
                return Err(Error::SignatureError(format!(
                    "Invalid signature at sequence {}",
                    event.sequence
                )));
            }
        }

        head = ChainHead::advance(event);
    }

    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateId, EventKind, Identity};

    fn vote(head: &ChainHead, voter: &str) -> LedgerEvent {
        LedgerEvent::next(
            head,
            EventKind::VoteCast {
                identity: Identity::new(voter),
                candidate_id: CandidateId::new(1),
            },
        )
        .unwrap()
    }

    fn chain(len: usize, keypair: Option<&KeyPair>) -> Vec<LedgerEvent> {
        let mut head = ChainHead::default();
        let mut events = Vec::new();
        for i in 0..len {
            let mut event = vote(&head, &format!("0x{:04x}", i));
            if let Some(keypair) = keypair {
                keypair.sign_event(&mut event);
            }
            head = ChainHead::advance(&event);
            events.push(event);
        }
        events
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let keypair1 = KeyPair::from_seed(&seed);
        let keypair2 = KeyPair::from_seed(&seed);

        // Same seed should produce same keys
        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"ballot";

        let signature = keypair.sign(message);
        assert!(verify_signature(message, &signature, &keypair.public_key()));
        assert!(!verify_signature(b"other ballot", &signature, &keypair.public_key()));

        let other = KeyPair::generate();
        assert!(!verify_signature(message, &signature, &other.public_key()));
    }

    #[test]
    fn test_load_or_generate_persists_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("node.key");

        let generated = KeyPair::load_or_generate(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);

        let loaded = KeyPair::load_or_generate(&path).unwrap();
        assert_eq!(loaded.public_key(), generated.public_key());
    }

    #[test]
    fn test_load_rejects_short_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.key");
        std::fs::write(&path, [1u8; 16]).unwrap();

        let err = KeyPair::load_or_generate(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_hash_bytes() {
        let hash1 = hash_bytes(b"tally");
        let hash2 = hash_bytes(b"tally");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash_bytes(b"tallies"));
    }

    #[test]
    fn test_verify_chain_accepts_valid_log() {
        let events = chain(5, None);
        let head = verify_chain(&events, None).unwrap();
        assert_eq!(head.sequence, 5);
        assert_eq!(head.hash, events[4].hash);
    }

    #[test]
    fn test_verify_chain_empty() {
        assert_eq!(verify_chain(&[], None).unwrap(), ChainHead::default());
    }

    #[test]
    fn test_verify_chain_detects_gap() {
        let mut events = chain(3, None);
        events.remove(1);
        let err = verify_chain(&events, None).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_verify_chain_detects_rewrite() {
        let mut events = chain(3, None);
        events[1].kind = EventKind::VoteCast {
            identity: Identity::new("0xmallory"),
            candidate_id: CandidateId::new(2),
        };
        assert!(verify_chain(&events, None).is_err());
    }

    #[test]
    fn test_verify_chain_signatures() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let events = chain(3, Some(&keypair));
        assert!(verify_chain(&events, Some(&keypair.public_key())).is_ok());

        let other = KeyPair::from_seed(&[8u8; 32]);
        let err = verify_chain(&events, Some(&other.public_key())).unwrap_err();
        assert!(matches!(err, Error::SignatureError(_)));
    }
}
