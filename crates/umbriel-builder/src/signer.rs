//! wallet signer interface
//!
//! the wallet extension is opaque to the core: it signs short utf-8 messages
//! (key derivation), transaction envelopes and auth entries. the fake signer
//! derives signatures deterministically from a seed so tests never round-trip
//! through a browser.

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("user rejected the signing request")]
    UserRejected,

    #[error("wallet error: {0}")]
    Wallet(String),
}

/// options forwarded with envelope signing requests
#[derive(Clone, Debug, Default)]
pub struct SignOptions {
    pub network_passphrase: Option<String>,
    pub address: Option<String>,
}

/// an opaque wallet
pub trait Signer {
    /// sign a utf-8 message, returning the raw 64-byte signature
    fn sign_message(&self, message: &str) -> Result<[u8; 64], SignerError>;

    /// sign a base64 transaction envelope
    fn sign_transaction(&self, xdr_b64: &str, opts: &SignOptions) -> Result<String, SignerError>;

    /// sign a base64 authorization entry
    fn sign_auth_entry(&self, xdr_b64: &str, opts: &SignOptions) -> Result<String, SignerError>;

    /// the signer's public stellar address
    fn address(&self) -> String;
}

/// deterministic in-process signer for tests
///
/// signatures are two chained sha256 blocks over `(seed, payload)` - stable
/// across runs, unrelated to any real wallet key.
#[derive(Clone, Debug)]
pub struct FakeSigner {
    seed: [u8; 32],
    address: String,
    reject: bool,
}

impl FakeSigner {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            address: "GDUMMYSIGNERADDRESS".into(),
            reject: false,
        }
    }

    pub fn with_address(seed: [u8; 32], address: impl Into<String>) -> Self {
        Self {
            seed,
            address: address.into(),
            reject: false,
        }
    }

    /// a signer whose user cancels every request
    pub fn rejecting() -> Self {
        Self {
            seed: [0u8; 32],
            address: String::new(),
            reject: true,
        }
    }

    fn derive(&self, domain: &str, payload: &[u8]) -> [u8; 64] {
        let mut out = [0u8; 64];
        for (i, half) in out.chunks_exact_mut(32).enumerate() {
            let mut hasher = Sha256::new();
            hasher.update(self.seed);
            hasher.update(domain.as_bytes());
            hasher.update(payload);
            hasher.update([i as u8]);
            half.copy_from_slice(&hasher.finalize());
        }
        out
    }
}

impl Signer for FakeSigner {
    fn sign_message(&self, message: &str) -> Result<[u8; 64], SignerError> {
        if self.reject {
            return Err(SignerError::UserRejected);
        }
        Ok(self.derive("msg", message.as_bytes()))
    }

    fn sign_transaction(&self, xdr_b64: &str, _opts: &SignOptions) -> Result<String, SignerError> {
        if self.reject {
            return Err(SignerError::UserRejected);
        }
        // append a marker; real wallets return the countersigned envelope
        Ok(format!("{xdr_b64}.signed"))
    }

    fn sign_auth_entry(&self, xdr_b64: &str, _opts: &SignOptions) -> Result<String, SignerError> {
        if self.reject {
            return Err(SignerError::UserRejected);
        }
        Ok(format!("{xdr_b64}.auth"))
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_signer_deterministic() {
        let a = FakeSigner::new([1u8; 32]);
        let b = FakeSigner::new([1u8; 32]);
        assert_eq!(a.sign_message("hello").unwrap(), b.sign_message("hello").unwrap());
        assert_ne!(
            a.sign_message("hello").unwrap(),
            a.sign_message("world").unwrap()
        );
    }

    #[test]
    fn test_distinct_seeds_distinct_signatures() {
        let a = FakeSigner::new([1u8; 32]);
        let b = FakeSigner::new([2u8; 32]);
        assert_ne!(a.sign_message("m").unwrap(), b.sign_message("m").unwrap());
    }

    #[test]
    fn test_rejecting_signer() {
        let signer = FakeSigner::rejecting();
        assert!(matches!(
            signer.sign_message("m"),
            Err(SignerError::UserRejected)
        ));
        assert!(matches!(
            signer.sign_transaction("tx", &SignOptions::default()),
            Err(SignerError::UserRejected)
        ));
    }
}
