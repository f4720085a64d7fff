pub mod assembler;
pub mod broadcast;
pub mod codec;
pub mod config;
pub mod error;
pub mod hashes;
pub mod provider;
pub mod script;
pub mod sighash;
pub mod signer;
pub mod types;


pub use crate::assembler::{Assembler, InputPlan, SignedInput, TransactionBuilder};
pub use crate::error::{Error, Result};
pub use crate::sighash::{SighashAlgorithm, SighashType};
pub use crate::signer::{KeyPair, Signature};
pub use crate::types::{
    InputKind, Keys, OutPoint, PayFrom, PayTo, PrevOutSet, Transaction, TxInput, TxOutput,
    RBF_SEQUENCE,
};

fn builder_for(inputs: &[PayFrom], outputs: &[PayTo], version: i32) -> Result<TransactionBuilder> {
    let mut builder = TransactionBuilder::new(version);
    for input in inputs {
        let outpoint = OutPoint::from_display_hex(&input.transaction, input.vout_index)?;
        builder.add_input(
            outpoint,
            RBF_SEQUENCE,
            input.kind,
            input.script_pub_key_of_vout.clone(),
            input.vout_amount_in_sats,
        );
    }
    for output in outputs {
        builder.add_output(output.amount_in_sats, output.script_pub_key.clone());
    }
    Ok(builder)
}

/// Hex of the transaction spending `inputs` into `outputs`, without
/// signatures or witness data.
pub fn get_unsigned_transaction_hex(
    inputs: &[PayFrom],
    outputs: &[PayTo],
    version: i32,
) -> Result<String> {
    Ok(builder_for(inputs, outputs, version)?.build()?.unsigned_hex())
}

/// Sign every input with the key stored under its index and return the
/// network-ready hex.
pub fn get_signed_transaction_hex(
    inputs: &[PayFrom],
    outputs: &[PayTo],
    keys: &Keys,
    version: i32,
) -> Result<String> {
    let mut assembler = builder_for(inputs, outputs, version)?.build()?;
    assembler.sign_all(keys)?;
    Ok(assembler.finish()?.to_hex())
}
