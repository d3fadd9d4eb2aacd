//! note encryption for recipients
//!
//! when a transaction creates an output note for someone else, the sensitive
//! fields (amount and blinding) are sealed to the recipient's X25519 public
//! key: ephemeral sender key, ECDH, then XSalsa20-Poly1305. the circuit never
//! sees the scheme - only the fixed ciphertext length is observable on-chain.
//!
//! wire format:
//!
//! ```text
//! [ephemeral pk (32)] [nonce (24)] [ciphertext (40) + tag (16)]  = 112 bytes
//! ```

use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use xsalsa20poly1305::aead::Aead;
use xsalsa20poly1305::{KeyInit, Nonce, XSalsa20Poly1305};

use crate::error::{CryptoError, Result};
use crate::field::FieldElement;
use crate::keys::EncryptionKeypair;

/// sealed note ciphertext length
pub const ENC_LEN: usize = 112;

/// plaintext layout: amount (8 bytes LE) then blinding (32 bytes LE)
const PLAINTEXT_LEN: usize = 40;

/// seal `(amount, blinding)` to a recipient's X25519 public key
pub fn encrypt_note(
    recipient_public: &[u8; 32],
    amount: u64,
    blinding: FieldElement,
) -> Result<Vec<u8>> {
    let mut ephemeral_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut ephemeral_bytes);
    let ephemeral_secret = StaticSecret::from(ephemeral_bytes);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(&PublicKey::from(*recipient_public));
    let cipher = XSalsa20Poly1305::new(shared.as_bytes().into());

    let mut nonce_bytes = [0u8; 24];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let mut plaintext = [0u8; PLAINTEXT_LEN];
    plaintext[..8].copy_from_slice(&amount.to_le_bytes());
    plaintext[8..].copy_from_slice(&blinding.to_le_bytes());

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|e| CryptoError::Encryption(format!("{e:?}")))?;

    let mut out = Vec::with_capacity(ENC_LEN);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// try to open a sealed note with our encryption key
///
/// returns `None` when the ciphertext is not addressed to us - the normal
/// outcome while scanning other users' outputs.
pub fn decrypt_note(
    keypair: &EncryptionKeypair,
    ciphertext: &[u8],
) -> Option<(u64, FieldElement)> {
    if ciphertext.len() < ENC_LEN {
        return None;
    }

    let ephemeral_public: [u8; 32] = ciphertext[..32].try_into().ok()?;
    let nonce_bytes: [u8; 24] = ciphertext[32..56].try_into().ok()?;
    let sealed = &ciphertext[56..];

    let shared = keypair
        .secret()
        .diffie_hellman(&PublicKey::from(ephemeral_public));
    let cipher = XSalsa20Poly1305::new(shared.as_bytes().into());

    let plaintext = cipher.decrypt(&Nonce::from(nonce_bytes), sealed).ok()?;
    if plaintext.len() != PLAINTEXT_LEN {
        return None;
    }

    let amount = u64::from_le_bytes(plaintext[..8].try_into().ok()?);
    let blinding = FieldElement::from_le_bytes(&plaintext[8..]).ok()?;
    Some((amount, blinding))
}
