use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::signer::KeyPair;

/// Default sequence: final, opted out of replacement.
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;
/// Sequence signalling replace-by-fee (what the reference spends use).
pub const RBF_SEQUENCE: u32 = 0xffff_fffd;

/// A previous output being spent.
///
/// `txid` is kept in internal (hash) byte order, which is the reverse of the
/// hex shown by block explorers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// Build an outpoint from the explorer (display order) txid hex.
    pub fn from_display_hex(txid_hex: &str, vout: u32) -> Result<Self> {
        let bytes = hex::decode(txid_hex)?;
        if bytes.len() != 32 {
            return Err(Error::MalformedData(format!(
                "txid must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&bytes);
        txid.reverse();
        Ok(OutPoint { txid, vout })
    }

    pub fn txid_display_hex(&self) -> String {
        let mut id = self.txid;
        id.reverse();
        hex::encode(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub previous_output: OutPoint,
    /// Empty for pure segwit / taproot spends.
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Witness stack; empty when the input carries no witness data.
    pub witness: Vec<Vec<u8>>,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, sequence: u32) -> Self {
        TxInput {
            previous_output,
            script_sig: Vec::new(),
            sequence,
            witness: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        TxOutput {
            value,
            script_pubkey,
        }
    }
}

/// A bitcoin transaction. Input and output order is significant for both
/// serialization and every sighash algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    /// Serialize with the BIP-144 marker/flag and per-input witnesses.
    pub segwit: bool,
}

impl Transaction {
    pub fn new(version: i32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, lock_time: u32) -> Self {
        Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            segwit: false,
        }
    }

    pub fn has_witness_data(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }
}

/// The scriptPubKeys and amounts of every output spent by a transaction,
/// in input order. Taproot digests commit to all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrevOutSet {
    script_pubkeys: Vec<Vec<u8>>,
    amounts: Vec<u64>,
}

impl PrevOutSet {
    pub fn new(script_pubkeys: Vec<Vec<u8>>, amounts: Vec<u64>) -> Result<Self> {
        if script_pubkeys.len() != amounts.len() {
            return Err(Error::MalformedData(format!(
                "{} prevout scripts but {} amounts",
                script_pubkeys.len(),
                amounts.len()
            )));
        }
        Ok(PrevOutSet {
            script_pubkeys,
            amounts,
        })
    }

    pub fn from_outputs(outputs: &[TxOutput]) -> Self {
        PrevOutSet {
            script_pubkeys: outputs.iter().map(|o| o.script_pubkey.clone()).collect(),
            amounts: outputs.iter().map(|o| o.value).collect(),
        }
    }

    pub fn push(&mut self, script_pubkey: Vec<u8>, amount: u64) {
        self.script_pubkeys.push(script_pubkey);
        self.amounts.push(amount);
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn script_pubkey(&self, index: usize) -> Option<&[u8]> {
        self.script_pubkeys.get(index).map(Vec::as_slice)
    }

    pub fn amount(&self, index: usize) -> Option<u64> {
        self.amounts.get(index).copied()
    }

    pub fn script_pubkeys(&self) -> &[Vec<u8>] {
        &self.script_pubkeys
    }

    pub fn amounts(&self) -> &[u64] {
        &self.amounts
    }

    /// Fail unless there is exactly one entry per input of `tx`.
    pub fn check_covers(&self, tx: &Transaction) -> Result<()> {
        if self.len() != tx.inputs.len() {
            return Err(Error::IncompletePrevOutSet {
                expected: tx.inputs.len(),
                provided: self.len(),
            });
        }
        Ok(())
    }
}

/// The kind of output an input spends. Picks both the sighash algorithm
/// and where the signature ends up (scriptSig or witness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    P2pkh,
    /// P2SH wrapping a P2PKH redeem script.
    P2shP2pkh,
    /// P2SH wrapping a P2WPKH redeem script (nested segwit).
    P2shP2wpkh,
    P2wpkh,
    /// Taproot key-path spend with an empty script tree.
    P2trKeyPath,
}

impl InputKind {
    pub fn is_segwit(&self) -> bool {
        !matches!(self, InputKind::P2pkh | InputKind::P2shP2pkh)
    }
}

/// A UTXO to spend, as handed over by the key/UTXO provider.
#[derive(Debug, Clone)]
pub struct PayFrom {
    /// Display-order txid hex.
    pub transaction: String,
    pub vout_index: u32,
    pub kind: InputKind,
    pub script_pub_key_of_vout: Vec<u8>,
    pub vout_amount_in_sats: u64,
}

#[derive(Debug, Clone)]
pub struct PayTo {
    pub script_pub_key: Vec<u8>,
    pub amount_in_sats: u64,
}

/// Signing keys by input index.
pub type Keys = HashMap<usize, KeyPair>;
