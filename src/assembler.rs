//! Builds a transaction from typed inputs, signs each input with the
//! algorithm its kind requires and attaches the result to the scriptSig or
//! witness in the order the template expects.
//!
//! Signing is split in two passes. [`Assembler::compute_signatures`] only
//! reads the frozen transaction and prevouts, so inputs may be signed in any
//! order (or in parallel); [`Assembler::attach_all`] then writes every
//! result in a single serial pass.

use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use tracing::debug;

use crate::codec::encode_without_witness;
use crate::error::{Error, Result};
use crate::script::{
    p2pkh_script, p2sh_p2pkh_redeem_script, p2sh_p2pkh_script, p2sh_p2wpkh_redeem_script,
    p2sh_p2wpkh_script, p2tr_script, p2wpkh_script, push_data,
};
use crate::sighash::{signature_hash, SighashAlgorithm, SighashType};
use crate::signer::{sign_with_context, KeyPair, SignRequest, Signature, SignatureScheme};
use crate::types::{InputKind, Keys, OutPoint, PrevOutSet, Transaction, TxInput, TxOutput};

/// How one input is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPlan {
    pub kind: InputKind,
    pub sighash_type: SighashType,
}

impl InputPlan {
    pub fn new(kind: InputKind) -> Self {
        InputPlan {
            kind,
            sighash_type: kind.default_sighash_type(),
        }
    }
}

/// A signature computed for one input, waiting to be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInput {
    pub index: usize,
    pub signature: Signature,
    pub public_key: PublicKey,
}

/// Collects inputs and outputs. Nothing can be added once [`build`] has
/// frozen them into an [`Assembler`].
///
/// [`build`]: TransactionBuilder::build
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    version: i32,
    lock_time: u32,
    inputs: Vec<TxInput>,
    plans: Vec<InputPlan>,
    prevouts: PrevOutSet,
    outputs: Vec<TxOutput>,
}

impl TransactionBuilder {
    pub fn new(version: i32) -> Self {
        TransactionBuilder {
            version,
            lock_time: 0,
            inputs: Vec::new(),
            plans: Vec::new(),
            prevouts: PrevOutSet::default(),
            outputs: Vec::new(),
        }
    }

    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Spend `outpoint`, which locks `amount` sats to `script_pubkey`.
    pub fn add_input(
        &mut self,
        outpoint: OutPoint,
        sequence: u32,
        kind: InputKind,
        script_pubkey: Vec<u8>,
        amount: u64,
    ) -> &mut Self {
        self.add_input_with_sighash_type(
            outpoint,
            sequence,
            InputPlan::new(kind),
            script_pubkey,
            amount,
        )
    }

    pub fn add_input_with_sighash_type(
        &mut self,
        outpoint: OutPoint,
        sequence: u32,
        plan: InputPlan,
        script_pubkey: Vec<u8>,
        amount: u64,
    ) -> &mut Self {
        self.inputs.push(TxInput::new(outpoint, sequence));
        self.plans.push(plan);
        self.prevouts.push(script_pubkey, amount);
        self
    }

    pub fn add_output(&mut self, value: u64, script_pubkey: Vec<u8>) -> &mut Self {
        self.outputs.push(TxOutput::new(value, script_pubkey));
        self
    }

    pub fn build(self) -> Result<Assembler> {
        let tx = Transaction::new(self.version, self.inputs, self.outputs, self.lock_time);
        Assembler::new(tx, self.plans, self.prevouts)
    }
}

/// Owns the transaction being signed.
#[derive(Debug, Clone)]
pub struct Assembler {
    secp: Secp256k1<All>,
    tx: Transaction,
    plans: Vec<InputPlan>,
    prevouts: PrevOutSet,
    attached: Vec<bool>,
    aux_rand: Option<[u8; 32]>,
}

impl Assembler {
    /// Wrap an unsigned transaction. `plans` and `prevouts` need one entry
    /// per input.
    pub fn new(
        mut tx: Transaction,
        plans: Vec<InputPlan>,
        prevouts: PrevOutSet,
    ) -> Result<Self> {
        if tx.inputs.is_empty() {
            return Err(Error::MalformedData(
                "transaction has no inputs".to_string(),
            ));
        }
        if plans.len() != tx.inputs.len() {
            return Err(Error::MalformedData(format!(
                "{} input plans for {} inputs",
                plans.len(),
                tx.inputs.len()
            )));
        }
        prevouts.check_covers(&tx)?;
        for plan in &plans {
            if plan.sighash_type == SighashType::Default
                && plan.kind.sighash_algorithm() != SighashAlgorithm::Taproot
            {
                return Err(Error::UnsupportedSighashType(plan.sighash_type.to_u32()));
            }
        }
        tx.segwit = plans.iter().any(|plan| plan.kind.is_segwit());
        let attached = vec![false; tx.inputs.len()];
        Ok(Assembler {
            secp: Secp256k1::new(),
            tx,
            plans,
            prevouts,
            attached,
            aux_rand: None,
        })
    }

    /// Fix the Schnorr auxiliary randomness instead of drawing it per
    /// signature.
    pub fn with_aux_rand(mut self, aux_rand: [u8; 32]) -> Self {
        self.aux_rand = Some(aux_rand);
        self
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn prevouts(&self) -> &PrevOutSet {
        &self.prevouts
    }

    pub fn plan(&self, index: usize) -> Result<InputPlan> {
        self.plans.get(index).copied().ok_or(Error::InputOutOfRange {
            index,
            inputs: self.plans.len(),
        })
    }

    /// The transaction without signatures or witness data, as hex.
    pub fn unsigned_hex(&self) -> String {
        let mut unsigned = self.tx.clone();
        for input in &mut unsigned.inputs {
            input.script_sig.clear();
            input.witness.clear();
        }
        hex::encode(encode_without_witness(&unsigned))
    }

    /// The scriptPubKey `public_key` locks to for the template of `kind`.
    pub fn expected_script_pubkey(
        &self,
        kind: InputKind,
        public_key: &PublicKey,
    ) -> Result<Vec<u8>> {
        Ok(match kind {
            InputKind::P2pkh => p2pkh_script(public_key),
            InputKind::P2shP2pkh => p2sh_p2pkh_script(public_key),
            InputKind::P2shP2wpkh => p2sh_p2wpkh_script(public_key),
            InputKind::P2wpkh => p2wpkh_script(public_key),
            InputKind::P2trKeyPath => p2tr_script(&self.secp, public_key)?,
        })
    }

    /// Digest input `index` commits to when signed by `public_key`.
    pub fn digest_for(&self, index: usize, public_key: &PublicKey) -> Result<[u8; 32]> {
        let plan = self.plan(index)?;
        let script_code = match plan.kind {
            // The redeem script stands in for the scriptSig of a P2SH spend.
            InputKind::P2shP2pkh => p2sh_p2pkh_redeem_script(public_key),
            // BIP-143 script code for P2WPKH, nested or not.
            InputKind::P2pkh | InputKind::P2wpkh | InputKind::P2shP2wpkh => {
                p2pkh_script(public_key)
            }
            InputKind::P2trKeyPath => Vec::new(),
        };
        signature_hash(
            &self.tx,
            index,
            plan.kind.sighash_algorithm(),
            &script_code,
            &self.prevouts,
            plan.sighash_type,
        )
    }

    /// Sign input `index`. Read-only: the transaction is not touched.
    pub fn compute_signature(&self, index: usize, key: &KeyPair) -> Result<SignedInput> {
        let plan = self.plan(index)?;
        let algorithm = plan.kind.sighash_algorithm();
        self.sign_input(index, plan, key)
            .map_err(|source| Error::InputSigning {
                index,
                algorithm,
                source: Box::new(source),
            })
    }

    fn sign_input(&self, index: usize, plan: InputPlan, key: &KeyPair) -> Result<SignedInput> {
        let public_key = key.public_key();
        let expected = self.expected_script_pubkey(plan.kind, &public_key)?;
        let committed = self
            .prevouts
            .script_pubkey(index)
            .ok_or(Error::IncompletePrevOutSet {
                expected: self.tx.inputs.len(),
                provided: self.prevouts.len(),
            })?;
        if expected != committed {
            return Err(Error::InvalidKey(format!(
                "key does not match the {:?} scriptPubKey being spent",
                plan.kind
            )));
        }

        let digest = self.digest_for(index, &public_key)?;
        let mut request = match plan.kind.sighash_algorithm() {
            SighashAlgorithm::Taproot => SignRequest::schnorr(plan.sighash_type),
            SighashAlgorithm::Legacy | SighashAlgorithm::SegwitV0 => {
                SignRequest::ecdsa(plan.sighash_type)
            }
        };
        request.aux_rand = self.aux_rand;
        let signature = sign_with_context(&self.secp, &digest, key, &request)?;
        Ok(SignedInput {
            index,
            signature,
            public_key,
        })
    }

    /// Sign every input that has a key in `keys`.
    pub fn compute_signatures(&self, keys: &Keys) -> Result<Vec<SignedInput>> {
        let mut indices: Vec<usize> = keys.keys().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|index| self.compute_signature(index, &keys[&index]))
            .collect()
    }

    /// Place `signature` (and the key, where the template needs it) into
    /// input `index`.
    pub fn attach(
        &mut self,
        index: usize,
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<()> {
        let plan = self.plan(index)?;
        let algorithm = plan.kind.sighash_algorithm();
        self.check_attachable(index, plan, signature, public_key)
            .map_err(|source| Error::InputSigning {
                index,
                algorithm,
                source: Box::new(source),
            })?;

        let sig = signature.to_bytes();
        let pubkey = public_key.serialize().to_vec();
        let input = &mut self.tx.inputs[index];
        match plan.kind {
            InputKind::P2pkh => {
                input.script_sig = script_sig_of(&[&sig, &pubkey]);
                input.witness.clear();
            }
            InputKind::P2shP2pkh => {
                let redeem_script = p2sh_p2pkh_redeem_script(public_key);
                input.script_sig = script_sig_of(&[&sig, &pubkey, &redeem_script]);
                input.witness.clear();
            }
            InputKind::P2shP2wpkh => {
                let redeem_script = p2sh_p2wpkh_redeem_script(public_key);
                input.script_sig = script_sig_of(&[&redeem_script]);
                input.witness = vec![sig, pubkey];
            }
            InputKind::P2wpkh => {
                input.script_sig.clear();
                input.witness = vec![sig, pubkey];
            }
            InputKind::P2trKeyPath => {
                input.script_sig.clear();
                input.witness = vec![sig];
            }
        }
        self.attached[index] = true;
        debug!(
            input = index,
            kind = ?plan.kind,
            script_sig_len = input.script_sig.len(),
            witness_items = input.witness.len(),
            "attached signature"
        );
        Ok(())
    }

    /// A signature fits input `index` only if its scheme and sighash type are
    /// the planned ones and `public_key` locks the prevout being spent.
    fn check_attachable(
        &self,
        index: usize,
        plan: InputPlan,
        signature: &Signature,
        public_key: &PublicKey,
    ) -> Result<()> {
        let scheme = match signature {
            Signature::Ecdsa { .. } => SignatureScheme::Ecdsa,
            Signature::Schnorr { .. } => SignatureScheme::SchnorrKeyPath,
        };
        let expected_scheme = match plan.kind.sighash_algorithm() {
            SighashAlgorithm::Taproot => SignatureScheme::SchnorrKeyPath,
            _ => SignatureScheme::Ecdsa,
        };
        if scheme != expected_scheme {
            return Err(Error::SigningError(format!(
                "{:?} signature cannot spend a {:?} input",
                scheme, plan.kind
            )));
        }
        if signature.sighash_type() != plan.sighash_type {
            return Err(Error::SigningError(format!(
                "signature commits to {:?}, input was planned with {:?}",
                signature.sighash_type(),
                plan.sighash_type
            )));
        }
        let expected = self.expected_script_pubkey(plan.kind, public_key)?;
        if Some(expected.as_slice()) != self.prevouts.script_pubkey(index) {
            return Err(Error::InvalidKey(format!(
                "public key does not lock the prevout of input {}",
                index
            )));
        }
        Ok(())
    }

    pub fn attach_all(&mut self, signed: Vec<SignedInput>) -> Result<()> {
        for SignedInput {
            index,
            signature,
            public_key,
        } in signed
        {
            self.attach(index, &signature, &public_key)?;
        }
        Ok(())
    }

    pub fn sign_all(&mut self, keys: &Keys) -> Result<()> {
        let signed = self.compute_signatures(keys)?;
        self.attach_all(signed)
    }

    pub fn is_complete(&self) -> bool {
        self.attached.iter().all(|done| *done)
    }

    /// Serialize the transaction in its current state.
    pub fn to_hex(&self) -> String {
        self.tx.to_hex()
    }

    /// The signed transaction. Fails if any input is still unsigned.
    pub fn finish(self) -> Result<Transaction> {
        if let Some(index) = self.attached.iter().position(|done| !done) {
            return Err(Error::MalformedData(format!("input {} is not signed", index)));
        }
        Ok(self.tx)
    }
}

fn script_sig_of(elements: &[&[u8]]) -> Vec<u8> {
    let mut script = Vec::new();
    for element in elements {
        push_data(&mut script, element);
    }
    script
}
