//! scriptPubKey and redeem-script templates.
//!
//! Every builder is a pure function of its key. Network selection only
//! matters when rendering an address, and is passed in explicitly.

use bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, Verification, XOnlyPublicKey};
use bitcoin::Network;

use crate::error::{Error, Result};
use crate::hashes::{hash160, tagged_hash};

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// Output templates this crate knows how to build and recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2tr,
}

/// Append `data` with the smallest push opcode that fits it.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= 0xffff {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// Parse a SEC-encoded public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_slice(bytes).map_err(|e| Error::InvalidKey(format!("public key: {}", e)))
}

pub fn p2pkh_script_from_hash(public_key_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    push_data(&mut script, public_key_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// `OP_DUP OP_HASH160 <hash160(pubkey)> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(public_key: &PublicKey) -> Vec<u8> {
    p2pkh_script_from_hash(&hash160(&public_key.serialize()))
}

/// `OP_HASH160 <hash160(redeem_script)> OP_EQUAL`
pub fn p2sh_script(redeem_script: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    push_data(&mut script, &hash160(redeem_script));
    script.push(OP_EQUAL);
    script
}

/// `OP_0 <hash160(pubkey)>`
pub fn p2wpkh_script(public_key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(OP_0);
    push_data(&mut script, &hash160(&public_key.serialize()));
    script
}

/// The redeem script of a P2SH-P2PKH output is a plain P2PKH template.
pub fn p2sh_p2pkh_redeem_script(public_key: &PublicKey) -> Vec<u8> {
    p2pkh_script(public_key)
}

pub fn p2sh_p2pkh_script(public_key: &PublicKey) -> Vec<u8> {
    p2sh_script(&p2sh_p2pkh_redeem_script(public_key))
}

/// The redeem script of a nested segwit output is the P2WPKH program.
pub fn p2sh_p2wpkh_redeem_script(public_key: &PublicKey) -> Vec<u8> {
    p2wpkh_script(public_key)
}

pub fn p2sh_p2wpkh_script(public_key: &PublicKey) -> Vec<u8> {
    p2sh_script(&p2sh_p2wpkh_redeem_script(public_key))
}

/// BIP-341 tweak for a key-path-only output: `TapTweak(internal_key)`.
pub fn taproot_tweak(internal_key: &XOnlyPublicKey) -> Result<Scalar> {
    let tweak = tagged_hash("TapTweak", &internal_key.serialize());
    Scalar::from_be_bytes(tweak)
        .map_err(|_| Error::InvalidKey("taproot tweak is out of range".to_string()))
}

/// Output key `Q = P + TapTweak(P)·G` where `P` is the even-y lift of the
/// internal key.
pub fn taproot_output_key<C: Verification>(
    secp: &Secp256k1<C>,
    internal_key: &XOnlyPublicKey,
) -> Result<XOnlyPublicKey> {
    let tweak = taproot_tweak(internal_key)?;
    let (output_key, _parity) = internal_key
        .add_tweak(secp, &tweak)
        .map_err(|e| Error::InvalidKey(format!("tweaking internal key: {}", e)))?;
    Ok(output_key)
}

/// `OP_1 <32-byte tweaked x-only key>`
pub fn p2tr_script<C: Verification>(
    secp: &Secp256k1<C>,
    public_key: &PublicKey,
) -> Result<Vec<u8>> {
    let (internal_key, _parity) = public_key.x_only_public_key();
    let output_key = taproot_output_key(secp, &internal_key)?;
    let mut script = Vec::with_capacity(34);
    script.push(OP_1);
    push_data(&mut script, &output_key.serialize());
    Ok(script)
}

/// Recognise one of the standard output templates.
pub fn classify(script_pubkey: &[u8]) -> Option<ScriptKind> {
    match script_pubkey {
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            Some(ScriptKind::P2pkh)
        }
        [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == 20 => Some(ScriptKind::P2sh),
        [OP_0, 20, program @ ..] if program.len() == 20 => Some(ScriptKind::P2wpkh),
        [OP_1, 32, program @ ..] if program.len() == 32 => Some(ScriptKind::P2tr),
        _ => None,
    }
}

/// Render the address for `script_pubkey` on `network`.
pub fn address(script_pubkey: &[u8], network: Network) -> Result<String> {
    let script = bitcoin::Script::from(script_pubkey.to_vec());
    bitcoin::Address::from_script(&script, network)
        .map(|address| address.to_string())
        .map_err(|e| Error::MalformedData(format!("no address for script: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::SecretKey;

    fn key(byte: u8) -> PublicKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        PublicKey::from_secret_key(&secp, &secret)
    }

    #[test]
    fn push_data_picks_minimal_opcode() {
        let mut script = Vec::new();
        push_data(&mut script, &[0xab; 75]);
        assert_eq!(script[0], 75);
        let mut script = Vec::new();
        push_data(&mut script, &[0xab; 76]);
        assert_eq!(&script[..2], &[OP_PUSHDATA1, 76]);
        let mut script = Vec::new();
        push_data(&mut script, &[0xab; 256]);
        assert_eq!(&script[..3], &[OP_PUSHDATA2, 0x00, 0x01]);
    }

    #[test]
    fn templates_match_bitcoin_crate() {
        let secp = Secp256k1::new();
        let pk = key(7);
        let btc_pk = bitcoin::PublicKey::new(pk);
        let network = Network::Signet;

        assert_eq!(
            p2pkh_script(&pk),
            bitcoin::Address::p2pkh(&btc_pk, network).script_pubkey().to_bytes()
        );
        assert_eq!(
            p2wpkh_script(&pk),
            bitcoin::Address::p2wpkh(&btc_pk, network)
                .unwrap()
                .script_pubkey()
                .to_bytes()
        );
        assert_eq!(
            p2sh_p2wpkh_script(&pk),
            bitcoin::Address::p2shwpkh(&btc_pk, network)
                .unwrap()
                .script_pubkey()
                .to_bytes()
        );
        let redeem = bitcoin::Script::from(p2sh_p2pkh_redeem_script(&pk));
        assert_eq!(
            p2sh_p2pkh_script(&pk),
            bitcoin::Address::p2sh(&redeem, network)
                .unwrap()
                .script_pubkey()
                .to_bytes()
        );
        let (internal, _) = pk.x_only_public_key();
        assert_eq!(
            p2tr_script(&secp, &pk).unwrap(),
            bitcoin::Address::p2tr(&secp, internal, None, network)
                .script_pubkey()
                .to_bytes()
        );
    }

    #[test]
    fn p2tr_ignores_public_key_parity() {
        let secp = Secp256k1::new();
        let pk = key(9);
        let negated = pk.negate(&secp);
        assert_eq!(
            p2tr_script(&secp, &pk).unwrap(),
            p2tr_script(&secp, &negated).unwrap()
        );
    }

    #[test]
    fn classify_recognises_templates() {
        let secp = Secp256k1::new();
        let pk = key(3);
        assert_eq!(classify(&p2pkh_script(&pk)), Some(ScriptKind::P2pkh));
        assert_eq!(classify(&p2sh_p2pkh_script(&pk)), Some(ScriptKind::P2sh));
        assert_eq!(classify(&p2wpkh_script(&pk)), Some(ScriptKind::P2wpkh));
        assert_eq!(
            classify(&p2tr_script(&secp, &pk).unwrap()),
            Some(ScriptKind::P2tr)
        );
        assert_eq!(classify(&[OP_1]), None);
    }

    #[test]
    fn addresses_follow_network() {
        let pk = key(5);
        let script = p2wpkh_script(&pk);
        assert!(address(&script, Network::Bitcoin).unwrap().starts_with("bc1q"));
        assert!(address(&script, Network::Signet).unwrap().starts_with("tb1q"));
        assert!(address(&p2pkh_script(&pk), Network::Bitcoin)
            .unwrap()
            .starts_with('1'));
    }

    #[test]
    fn invalid_public_key_bytes() {
        assert!(matches!(parse_public_key(&[0x05; 33]), Err(Error::InvalidKey(_))));
        assert!(matches!(parse_public_key(&[0x02; 12]), Err(Error::InvalidKey(_))));
    }
}
