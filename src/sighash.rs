//! Signature hash computation.
//!
//! Three algorithms, chosen by the kind of output an input spends:
//!
//! * legacy: double-SHA256 of a modified copy of the transaction,
//! * segwit v0 (BIP-143): double-SHA256 of a fixed preimage committing to
//!   the spent amount,
//! * taproot key path (BIP-341): `TapSighash` tagged hash of an extended
//!   preimage committing to every spent amount and scriptPubKey.

use std::fmt;

use tracing::debug;

use crate::codec::{encode_without_witness, Writer};
use crate::error::{Error, Result};
use crate::hashes::{sha256, sha256d, tagged_hash};
use crate::types::{InputKind, PrevOutSet, Transaction, TxInput, TxOutput};

pub const SIGHASH_DEFAULT: u32 = 0x00;
pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Digest returned by the legacy algorithm for SIGHASH_SINGLE without a
/// matching output.
const UINT256_ONE: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SighashAlgorithm {
    Legacy,
    SegwitV0,
    Taproot,
}

impl fmt::Display for SighashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SighashAlgorithm::Legacy => "legacy sighash",
            SighashAlgorithm::SegwitV0 => "BIP-143 sighash",
            SighashAlgorithm::Taproot => "BIP-341 sighash",
        };
        f.write_str(name)
    }
}

impl InputKind {
    pub fn sighash_algorithm(&self) -> SighashAlgorithm {
        match self {
            InputKind::P2pkh | InputKind::P2shP2pkh => SighashAlgorithm::Legacy,
            InputKind::P2wpkh | InputKind::P2shP2wpkh => SighashAlgorithm::SegwitV0,
            InputKind::P2trKeyPath => SighashAlgorithm::Taproot,
        }
    }

    /// `Default` for taproot, `All` for the ECDSA kinds.
    pub fn default_sighash_type(&self) -> SighashType {
        match self.sighash_algorithm() {
            SighashAlgorithm::Taproot => SighashType::Default,
            _ => SighashType::All,
        }
    }
}

/// Sighash flag. `Default` only exists for taproot, where it commits like
/// `All` but is not appended to the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SighashType {
    Default,
    All,
    None,
    Single,
    AllPlusAnyoneCanPay,
    NonePlusAnyoneCanPay,
    SinglePlusAnyoneCanPay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseType {
    All,
    None,
    Single,
}

impl SighashType {
    pub fn from_u32(n: u32) -> Result<Self> {
        Ok(match n {
            SIGHASH_DEFAULT => SighashType::Default,
            SIGHASH_ALL => SighashType::All,
            SIGHASH_NONE => SighashType::None,
            SIGHASH_SINGLE => SighashType::Single,
            0x81 => SighashType::AllPlusAnyoneCanPay,
            0x82 => SighashType::NonePlusAnyoneCanPay,
            0x83 => SighashType::SinglePlusAnyoneCanPay,
            other => return Err(Error::UnsupportedSighashType(other)),
        })
    }

    pub fn to_u32(self) -> u32 {
        match self {
            SighashType::Default => SIGHASH_DEFAULT,
            SighashType::All => SIGHASH_ALL,
            SighashType::None => SIGHASH_NONE,
            SighashType::Single => SIGHASH_SINGLE,
            SighashType::AllPlusAnyoneCanPay => SIGHASH_ALL | SIGHASH_ANYONECANPAY,
            SighashType::NonePlusAnyoneCanPay => SIGHASH_NONE | SIGHASH_ANYONECANPAY,
            SighashType::SinglePlusAnyoneCanPay => SIGHASH_SINGLE | SIGHASH_ANYONECANPAY,
        }
    }

    /// The byte appended to a signature.
    pub fn to_u8(self) -> u8 {
        self.to_u32() as u8
    }

    fn split_anyonecanpay(self) -> (BaseType, bool) {
        match self {
            SighashType::Default | SighashType::All => (BaseType::All, false),
            SighashType::None => (BaseType::None, false),
            SighashType::Single => (BaseType::Single, false),
            SighashType::AllPlusAnyoneCanPay => (BaseType::All, true),
            SighashType::NonePlusAnyoneCanPay => (BaseType::None, true),
            SighashType::SinglePlusAnyoneCanPay => (BaseType::Single, true),
        }
    }

    fn check_ecdsa(self) -> Result<()> {
        if self == SighashType::Default {
            return Err(Error::UnsupportedSighashType(SIGHASH_DEFAULT));
        }
        Ok(())
    }
}

impl Default for SighashType {
    fn default() -> Self {
        SighashType::All
    }
}

fn check_index(tx: &Transaction, input_index: usize) -> Result<()> {
    if input_index >= tx.inputs.len() {
        return Err(Error::InputOutOfRange {
            index: input_index,
            inputs: tx.inputs.len(),
        });
    }
    Ok(())
}

fn serialize_prevouts(inputs: &[TxInput]) -> Vec<u8> {
    let mut writer = Writer::with_capacity(inputs.len() * 36);
    for input in inputs {
        input.previous_output.write_to(&mut writer);
    }
    writer.into_bytes()
}

fn serialize_sequences(inputs: &[TxInput]) -> Vec<u8> {
    let mut writer = Writer::with_capacity(inputs.len() * 4);
    for input in inputs {
        writer.write_u32_le(input.sequence);
    }
    writer.into_bytes()
}

fn serialize_outputs(outputs: &[TxOutput]) -> Vec<u8> {
    let mut writer = Writer::new();
    for output in outputs {
        output.write_to(&mut writer);
    }
    writer.into_bytes()
}

fn serialize_amounts(prevouts: &PrevOutSet) -> Vec<u8> {
    let mut writer = Writer::with_capacity(prevouts.len() * 8);
    for amount in prevouts.amounts() {
        writer.write_u64_le(*amount);
    }
    writer.into_bytes()
}

fn serialize_script_pubkeys(prevouts: &PrevOutSet) -> Vec<u8> {
    let mut writer = Writer::new();
    for script_pubkey in prevouts.script_pubkeys() {
        writer.write_var_bytes(script_pubkey);
    }
    writer.into_bytes()
}

/// Legacy (pre-segwit) digest for P2PKH and P2SH inputs.
///
/// `script_code` replaces the scriptSig of the signed input: the spent
/// scriptPubKey for P2PKH, the redeem script for P2SH.
pub fn legacy_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    sighash_type: SighashType,
) -> Result<[u8; 32]> {
    check_index(tx, input_index)?;
    sighash_type.check_ecdsa()?;
    let (base, anyone_can_pay) = sighash_type.split_anyonecanpay();

    if base == BaseType::Single && input_index >= tx.outputs.len() {
        return Ok(UINT256_ONE);
    }

    let inputs = if anyone_can_pay {
        let input = &tx.inputs[input_index];
        vec![TxInput {
            previous_output: input.previous_output,
            script_sig: script_code.to_vec(),
            sequence: input.sequence,
            witness: Vec::new(),
        }]
    } else {
        tx.inputs
            .iter()
            .enumerate()
            .map(|(n, input)| TxInput {
                previous_output: input.previous_output,
                script_sig: if n == input_index {
                    script_code.to_vec()
                } else {
                    Vec::new()
                },
                sequence: if n != input_index && base != BaseType::All {
                    0
                } else {
                    input.sequence
                },
                witness: Vec::new(),
            })
            .collect()
    };

    let outputs = match base {
        BaseType::All => tx.outputs.clone(),
        BaseType::None => Vec::new(),
        // Every output before the signed one is blanked to value -1 and an
        // empty script.
        BaseType::Single => tx.outputs[..=input_index]
            .iter()
            .enumerate()
            .map(|(n, output)| {
                if n == input_index {
                    output.clone()
                } else {
                    TxOutput::new(u64::MAX, Vec::new())
                }
            })
            .collect(),
    };

    let stripped = Transaction {
        version: tx.version,
        inputs,
        outputs,
        lock_time: tx.lock_time,
        segwit: false,
    };
    let mut preimage = encode_without_witness(&stripped);
    preimage.extend_from_slice(&sighash_type.to_u32().to_le_bytes());
    Ok(sha256d(&preimage))
}

/// BIP-143 preimage for segwit v0 inputs (native or P2SH-nested).
pub fn segwit_v0_preimage(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: u64,
    sighash_type: SighashType,
) -> Result<Vec<u8>> {
    check_index(tx, input_index)?;
    sighash_type.check_ecdsa()?;
    let (base, anyone_can_pay) = sighash_type.split_anyonecanpay();
    let input = &tx.inputs[input_index];

    let hash_prevouts = if !anyone_can_pay {
        sha256d(&serialize_prevouts(&tx.inputs))
    } else {
        [0u8; 32]
    };

    let hash_sequence = if !anyone_can_pay && base == BaseType::All {
        sha256d(&serialize_sequences(&tx.inputs))
    } else {
        [0u8; 32]
    };

    let hash_outputs = match base {
        BaseType::All => sha256d(&serialize_outputs(&tx.outputs)),
        BaseType::Single if input_index < tx.outputs.len() => {
            sha256d(&serialize_outputs(&tx.outputs[input_index..=input_index]))
        }
        _ => [0u8; 32],
    };

    let mut writer = Writer::with_capacity(160 + script_code.len());
    writer.write_i32_le(tx.version);
    writer.write_bytes(&hash_prevouts);
    writer.write_bytes(&hash_sequence);
    input.previous_output.write_to(&mut writer);
    writer.write_var_bytes(script_code);
    writer.write_u64_le(amount);
    writer.write_u32_le(input.sequence);
    writer.write_bytes(&hash_outputs);
    writer.write_u32_le(tx.lock_time);
    writer.write_u32_le(sighash_type.to_u32());
    Ok(writer.into_bytes())
}

/// BIP-143 digest. For P2WPKH (native or nested) the script code is the
/// P2PKH template of the key hash.
pub fn segwit_v0_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: u64,
    sighash_type: SighashType,
) -> Result<[u8; 32]> {
    let preimage = segwit_v0_preimage(tx, input_index, script_code, amount, sighash_type)?;
    Ok(sha256d(&preimage))
}

/// BIP-341 signature message for a key-path spend (no annex).
pub fn taproot_key_spend_preimage(
    tx: &Transaction,
    input_index: usize,
    prevouts: &PrevOutSet,
    sighash_type: SighashType,
) -> Result<Vec<u8>> {
    check_index(tx, input_index)?;
    prevouts.check_covers(tx)?;
    let (base, anyone_can_pay) = sighash_type.split_anyonecanpay();

    let mut writer = Writer::with_capacity(256);
    // epoch
    writer.write_u8(0);
    writer.write_u8(sighash_type.to_u8());
    writer.write_i32_le(tx.version);
    writer.write_u32_le(tx.lock_time);

    if !anyone_can_pay {
        writer.write_bytes(&sha256(&serialize_prevouts(&tx.inputs)));
        writer.write_bytes(&sha256(&serialize_amounts(prevouts)));
        writer.write_bytes(&sha256(&serialize_script_pubkeys(prevouts)));
        writer.write_bytes(&sha256(&serialize_sequences(&tx.inputs)));
    }

    if base == BaseType::All {
        writer.write_bytes(&sha256(&serialize_outputs(&tx.outputs)));
    }

    // spend_type: key path, no annex
    writer.write_u8(0);

    if anyone_can_pay {
        let input = &tx.inputs[input_index];
        input.previous_output.write_to(&mut writer);
        writer.write_u64_le(prevouts.amounts()[input_index]);
        writer.write_var_bytes(&prevouts.script_pubkeys()[input_index]);
        writer.write_u32_le(input.sequence);
    } else {
        writer.write_u32_le(input_index as u32);
    }

    if base == BaseType::Single {
        let output = tx
            .outputs
            .get(input_index)
            .ok_or(Error::SighashSingleWithoutOutput {
                index: input_index,
                outputs: tx.outputs.len(),
            })?;
        writer.write_bytes(&sha256(&serialize_outputs(std::slice::from_ref(output))));
    }

    Ok(writer.into_bytes())
}

/// BIP-341 digest for a key-path spend. Needs the prevout of every input,
/// not only the one being signed.
pub fn taproot_key_spend_sighash(
    tx: &Transaction,
    input_index: usize,
    prevouts: &PrevOutSet,
    sighash_type: SighashType,
) -> Result<[u8; 32]> {
    let preimage = taproot_key_spend_preimage(tx, input_index, prevouts, sighash_type)?;
    Ok(tagged_hash("TapSighash", &preimage))
}

/// Compute the digest for one input with the algorithm its kind requires.
///
/// `script_code` is ignored for taproot; the segwit amount is taken from
/// `prevouts`.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    algorithm: SighashAlgorithm,
    script_code: &[u8],
    prevouts: &PrevOutSet,
    sighash_type: SighashType,
) -> Result<[u8; 32]> {
    let digest = match algorithm {
        SighashAlgorithm::Legacy => legacy_sighash(tx, input_index, script_code, sighash_type)?,
        SighashAlgorithm::SegwitV0 => {
            let amount = prevouts
                .amount(input_index)
                .ok_or(Error::IncompletePrevOutSet {
                    expected: tx.inputs.len(),
                    provided: prevouts.len(),
                })?;
            segwit_v0_sighash(tx, input_index, script_code, amount, sighash_type)?
        }
        SighashAlgorithm::Taproot => {
            taproot_key_spend_sighash(tx, input_index, prevouts, sighash_type)?
        }
    };
    debug!(
        input = input_index,
        algorithm = %algorithm,
        sighash_type = sighash_type.to_u32(),
        digest = %hex::encode(digest),
        "computed signature hash"
    );
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_hex;

    // BIP-143 native P2WPKH example, unsigned.
    const BIP143_UNSIGNED: &str = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";
    const BIP143_SCRIPT_CODE: &str = "76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac";

    fn two_input_tx() -> Transaction {
        decode_hex(BIP143_UNSIGNED).unwrap()
    }

    fn prevouts() -> PrevOutSet {
        PrevOutSet::new(
            vec![
                hex::decode("2103c9f4836b9a4f77fc0d81f7bcb01b7f1b35916864b9476c241ce9fc198bd25432ac")
                    .unwrap(),
                hex::decode("00141d0f172a0ecb48aee1be1f2687d2963ae33f71a1").unwrap(),
            ],
            vec![625_000_000, 600_000_000],
        )
        .unwrap()
    }

    #[test]
    fn bip143_native_p2wpkh_vector() {
        let tx = two_input_tx();
        let script_code = hex::decode(BIP143_SCRIPT_CODE).unwrap();
        let digest =
            segwit_v0_sighash(&tx, 1, &script_code, 600_000_000, SighashType::All).unwrap();
        assert_eq!(
            hex::encode(digest),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );

        let preimage =
            segwit_v0_preimage(&tx, 1, &script_code, 600_000_000, SighashType::All).unwrap();
        assert_eq!(
            hex::encode(&preimage[4..36]),
            "96b827c8483d4e9b96712b6713a7b68d6e8003a781feba36c31143470b4efd37"
        );
        assert_eq!(
            hex::encode(&preimage[36..68]),
            "52b0a642eea2fb7ae638c36f6252b6750293dbe574a806984b8e4d8548339a3b"
        );
    }

    #[test]
    fn sighash_type_parsing() {
        for n in [0x00, 0x01, 0x02, 0x03, 0x81, 0x82, 0x83] {
            assert_eq!(SighashType::from_u32(n).unwrap().to_u32(), n);
        }
        for n in [0x04, 0x80, 0x84, 0x41, 0xff] {
            assert!(matches!(
                SighashType::from_u32(n),
                Err(Error::UnsupportedSighashType(v)) if v == n
            ));
        }
    }

    #[test]
    fn ecdsa_algorithms_reject_default_type() {
        let tx = two_input_tx();
        let script_code = hex::decode(BIP143_SCRIPT_CODE).unwrap();
        assert!(matches!(
            legacy_sighash(&tx, 0, &script_code, SighashType::Default),
            Err(Error::UnsupportedSighashType(0))
        ));
        assert!(matches!(
            segwit_v0_sighash(&tx, 1, &script_code, 1, SighashType::Default),
            Err(Error::UnsupportedSighashType(0))
        ));
    }

    #[test]
    fn taproot_rejects_incomplete_prevouts() {
        let tx = two_input_tx();
        let mut truncated = PrevOutSet::default();
        truncated.push(vec![0x51, 0x20], 1000);
        let err = taproot_key_spend_sighash(&tx, 0, &truncated, SighashType::Default).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompletePrevOutSet {
                expected: 2,
                provided: 1
            }
        ));
    }

    #[test]
    fn taproot_commits_to_every_prevout() {
        let tx = two_input_tx();
        let base = taproot_key_spend_sighash(&tx, 0, &prevouts(), SighashType::Default).unwrap();

        let mut other_amount = prevouts().amounts().to_vec();
        other_amount[1] += 1;
        let changed = PrevOutSet::new(prevouts().script_pubkeys().to_vec(), other_amount).unwrap();
        assert_ne!(
            base,
            taproot_key_spend_sighash(&tx, 0, &changed, SighashType::Default).unwrap()
        );

        let mut other_scripts = prevouts().script_pubkeys().to_vec();
        other_scripts[1][2] ^= 0x01;
        let changed = PrevOutSet::new(other_scripts, prevouts().amounts().to_vec()).unwrap();
        assert_ne!(
            base,
            taproot_key_spend_sighash(&tx, 0, &changed, SighashType::Default).unwrap()
        );
    }

    #[test]
    fn taproot_default_and_all_differ_only_in_type_byte() {
        let tx = two_input_tx();
        let default =
            taproot_key_spend_preimage(&tx, 0, &prevouts(), SighashType::Default).unwrap();
        let all = taproot_key_spend_preimage(&tx, 0, &prevouts(), SighashType::All).unwrap();
        assert_eq!(default[1], 0x00);
        assert_eq!(all[1], 0x01);
        assert_eq!(default[2..], all[2..]);
    }

    #[test]
    fn taproot_single_without_output() {
        let mut tx = two_input_tx();
        tx.outputs.truncate(1);
        assert!(matches!(
            taproot_key_spend_sighash(&tx, 1, &prevouts(), SighashType::Single),
            Err(Error::SighashSingleWithoutOutput { index: 1, outputs: 1 })
        ));
    }

    #[test]
    fn legacy_single_without_output_signs_one() {
        let mut tx = two_input_tx();
        tx.outputs.truncate(1);
        let digest = legacy_sighash(&tx, 1, &[], SighashType::Single).unwrap();
        assert_eq!(digest, UINT256_ONE);
    }

    #[test]
    fn out_of_range_index() {
        let tx = two_input_tx();
        assert!(matches!(
            legacy_sighash(&tx, 2, &[], SighashType::All),
            Err(Error::InputOutOfRange { index: 2, inputs: 2 })
        ));
    }

    #[test]
    fn dispatcher_needs_amount_for_segwit() {
        let tx = two_input_tx();
        let script_code = hex::decode(BIP143_SCRIPT_CODE).unwrap();
        assert!(matches!(
            signature_hash(
                &tx,
                1,
                SighashAlgorithm::SegwitV0,
                &script_code,
                &PrevOutSet::default(),
                SighashType::All
            ),
            Err(Error::IncompletePrevOutSet { .. })
        ));
        let digest = signature_hash(
            &tx,
            1,
            SighashAlgorithm::SegwitV0,
            &script_code,
            &prevouts(),
            SighashType::All,
        )
        .unwrap();
        assert_eq!(
            hex::encode(digest),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
    }
}
