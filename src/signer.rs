//! ECDSA and BIP-340 Schnorr signing over precomputed digests.

use std::fmt;

use bitcoin::secp256k1::rand::{thread_rng, RngCore};
use bitcoin::secp256k1::{
    self, ecdsa, schnorr, All, Message, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey,
};

use crate::error::{Error, Result};
use crate::script::taproot_tweak;
use crate::sighash::SighashType;

/// A secp256k1 private key together with its compressed public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

// Never print the secret half.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Fails with `InvalidKey` for zero or out-of-range scalars.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| Error::InvalidKey(format!("private key: {}", e)))?;
        Ok(Self::from_secret_key(secret))
    }

    pub fn from_secret_key(secret: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public = PublicKey::from_secret_key(&secp, &secret);
        KeyPair { secret, public }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Compressed SEC encoding, the form pushed into scriptSigs and witnesses.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public.serialize()
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.public.x_only_public_key().0
    }

    /// The key-path signing key for a P2TR output with no script tree. The
    /// internal key is lifted to even y before the tweak is added.
    pub fn taproot_tweaked(&self, secp: &Secp256k1<All>) -> Result<secp256k1::KeyPair> {
        let keypair = secp256k1::KeyPair::from_seckey_slice(secp, &self.secret.secret_bytes())
            .map_err(|e| Error::InvalidKey(format!("keypair: {}", e)))?;
        let tweak = taproot_tweak(&self.x_only_public_key())?;
        keypair
            .add_xonly_tweak(secp, &tweak)
            .map_err(|e| Error::InvalidKey(format!("tweaking keypair: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Ecdsa,
    /// BIP-340 over the taproot-tweaked key.
    SchnorrKeyPath,
}

/// What to sign with. `aux_rand` only matters for Schnorr; without it fresh
/// randomness is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignRequest {
    pub scheme: SignatureScheme,
    pub sighash_type: SighashType,
    pub aux_rand: Option<[u8; 32]>,
}

impl SignRequest {
    pub fn ecdsa(sighash_type: SighashType) -> Self {
        SignRequest {
            scheme: SignatureScheme::Ecdsa,
            sighash_type,
            aux_rand: None,
        }
    }

    pub fn schnorr(sighash_type: SighashType) -> Self {
        SignRequest {
            scheme: SignatureScheme::SchnorrKeyPath,
            sighash_type,
            aux_rand: None,
        }
    }

    pub fn with_aux_rand(mut self, aux_rand: [u8; 32]) -> Self {
        self.aux_rand = Some(aux_rand);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// Strict DER, low-S.
    Ecdsa {
        der: Vec<u8>,
        sighash_type: SighashType,
    },
    Schnorr {
        bytes: [u8; 64],
        sighash_type: SighashType,
    },
}

impl Signature {
    /// The element pushed on the stack: `DER || type` for ECDSA, the 64-byte
    /// signature for Schnorr with the type byte appended unless it is
    /// `Default`.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Signature::Ecdsa { der, sighash_type } => {
                let mut out = Vec::with_capacity(der.len() + 1);
                out.extend_from_slice(der);
                out.push(sighash_type.to_u8());
                out
            }
            Signature::Schnorr {
                bytes,
                sighash_type,
            } => {
                let mut out = Vec::with_capacity(65);
                out.extend_from_slice(bytes);
                if *sighash_type != SighashType::Default {
                    out.push(sighash_type.to_u8());
                }
                out
            }
        }
    }

    pub fn sighash_type(&self) -> SighashType {
        match self {
            Signature::Ecdsa { sighash_type, .. } | Signature::Schnorr { sighash_type, .. } => {
                *sighash_type
            }
        }
    }
}

/// Sign `digest` with a fresh context.
pub fn sign(digest: &[u8; 32], key: &KeyPair, request: &SignRequest) -> Result<Signature> {
    let secp = Secp256k1::new();
    sign_with_context(&secp, digest, key, request)
}

/// Sign `digest` and check the result against the matching public key
/// before returning it.
pub fn sign_with_context(
    secp: &Secp256k1<All>,
    digest: &[u8; 32],
    key: &KeyPair,
    request: &SignRequest,
) -> Result<Signature> {
    let msg = Message::from_slice(digest)
        .map_err(|e| Error::SigningError(format!("digest: {}", e)))?;

    match request.scheme {
        SignatureScheme::Ecdsa => {
            if request.sighash_type == SighashType::Default {
                return Err(Error::UnsupportedSighashType(request.sighash_type.to_u32()));
            }
            // RFC6979 nonce; libsecp256k1 always emits low-S.
            let mut sig = secp.sign_ecdsa(&msg, &key.secret);
            sig.normalize_s();
            verify_ecdsa(secp, &msg, &sig, &key.public)?;
            Ok(Signature::Ecdsa {
                der: sig.serialize_der().to_vec(),
                sighash_type: request.sighash_type,
            })
        }
        SignatureScheme::SchnorrKeyPath => {
            let tweaked = key.taproot_tweaked(secp)?;
            let aux_rand = match request.aux_rand {
                Some(aux) => aux,
                None => {
                    let mut aux = [0u8; 32];
                    thread_rng().fill_bytes(&mut aux);
                    aux
                }
            };
            let sig = secp.sign_schnorr_with_aux_rand(&msg, &tweaked, &aux_rand);
            let (output_key, _parity) = XOnlyPublicKey::from_keypair(&tweaked);
            verify_schnorr(secp, &msg, &sig, &output_key)?;
            let mut bytes = [0u8; 64];
            bytes.copy_from_slice(&sig[..]);
            Ok(Signature::Schnorr {
                bytes,
                sighash_type: request.sighash_type,
            })
        }
    }
}

fn verify_ecdsa(
    secp: &Secp256k1<All>,
    msg: &Message,
    sig: &ecdsa::Signature,
    public: &PublicKey,
) -> Result<()> {
    secp.verify_ecdsa(msg, sig, public)
        .map_err(|e| Error::SigningError(format!("ECDSA signature does not verify: {}", e)))
}

fn verify_schnorr(
    secp: &Secp256k1<All>,
    msg: &Message,
    sig: &schnorr::Signature,
    output_key: &XOnlyPublicKey,
) -> Result<()> {
    secp.verify_schnorr(sig, msg, output_key)
        .map_err(|e| Error::SigningError(format!("Schnorr signature does not verify: {}", e)))
}
