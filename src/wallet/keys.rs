// Key management: one P-256 key pair per wallet

use crate::core::{sha256, Address, TxId, Witness};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

/// A single ECDSA key pair over NIST P-256. The address is the SHA-256 of
/// the compressed SEC1 public key.
#[derive(Clone)]
pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    /// Generate a fresh key pair.
    pub fn new() -> Self {
        Self { signing_key: SigningKey::random(&mut OsRng) }
    }

    /// Compressed SEC1 encoding of the public key (33 bytes).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn address(&self) -> Address {
        sha256(&self.public_key_bytes())
    }

    /// ASN.1-encoded signature over the tx id, bundled with the public key.
    pub fn witness(&self, tx_id: TxId) -> Witness {
        let sig: Signature = self.signing_key.sign(tx_id.as_bytes());
        Witness {
            sig: sig.to_der().as_bytes().to_vec(),
            pub_key: self.public_key_bytes(),
        }
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
