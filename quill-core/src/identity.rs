//! Session identity: X25519 keypair, nospam tag, own address derivation.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::address::{Address, PublicKey, NOSPAM_SIZE};

/// The cryptographic identity a session owns: secret key, public key, and
/// the nospam tag folded into the published address. Keep the secret
/// private; expose only the public key and derived address.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
    nospam: [u8; NOSPAM_SIZE],
}

impl Identity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from_bytes(X25519PublicKey::from(&secret).to_bytes());
        let mut nospam = [0u8; NOSPAM_SIZE];
        OsRng.fill_bytes(&mut nospam);
        Self {
            secret,
            public,
            nospam,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn nospam(&self) -> [u8; NOSPAM_SIZE] {
        self.nospam
    }

    /// Change the nospam tag. The public key stays the same, so existing
    /// friends are unaffected; only the published address changes.
    pub fn set_nospam(&mut self, nospam: [u8; NOSPAM_SIZE]) {
        self.nospam = nospam;
    }

    /// The full published address: public key + nospam + checksum.
    pub fn address(&self) -> Address {
        Address::new(&self.public, self.nospam)
    }

    /// Shared secret with a peer's public key. Consumed by the transport
    /// collaborator for its handshake.
    pub fn shared_secret(&self, peer_public: &PublicKey) -> [u8; 32] {
        let other = X25519PublicKey::from(*peer_public.as_bytes());
        self.secret.diffie_hellman(&other).to_bytes()
    }

    /// Short hash of the public key, for log lines.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.public.as_bytes());
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}
