//! Transaction wire format.
//!
//! version(4 LE) | [marker 0x00, flag 0x01] | input count | inputs |
//! output count | outputs | [witness per input] | locktime(4 LE)
//!
//! Counts and lengths use the compact-size varint; every other integer is
//! fixed-width little-endian.

use crate::error::{Error, Result};
use crate::hashes::sha256d;
use crate::types::{OutPoint, Transaction, TxInput, TxOutput};

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

/// Compact-size unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInt(pub u64);

impl VarInt {
    /// Wire length in bytes: 1, 3, 5 or 9.
    pub fn size(&self) -> usize {
        match self.0 {
            0..=0xfc => 1,
            0xfd..=0xffff => 3,
            0x1_0000..=0xffff_ffff => 5,
            _ => 9,
        }
    }
}

impl From<usize> for VarInt {
    fn from(v: usize) -> Self {
        VarInt(v as u64)
    }
}

/// Append-only byte sink for wire data.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32_le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_varint(&mut self, v: VarInt) {
        match v.size() {
            1 => self.buf.push(v.0 as u8),
            3 => {
                self.buf.push(0xfd);
                self.buf.extend_from_slice(&(v.0 as u16).to_le_bytes());
            }
            5 => {
                self.buf.push(0xfe);
                self.buf.extend_from_slice(&(v.0 as u32).to_le_bytes());
            }
            _ => {
                self.buf.push(0xff);
                self.buf.extend_from_slice(&v.0.to_le_bytes());
            }
        }
    }

    /// Length-prefixed byte string.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(VarInt::from(bytes.len()));
        self.write_bytes(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over wire data. Every read fails with `MalformedData` instead of
/// running past the end.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::MalformedData(format!(
                "reading {}: need {} bytes, {} left",
                what,
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.read_bytes(1, what)?[0])
    }

    pub fn read_u16_le(&mut self, what: &str) -> Result<u16> {
        let b = self.read_bytes(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self, what: &str) -> Result<u32> {
        let b = self.read_bytes(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32_le(&mut self, what: &str) -> Result<i32> {
        Ok(self.read_u32_le(what)? as i32)
    }

    pub fn read_u64_le(&mut self, what: &str) -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.read_bytes(8, what)?);
        Ok(u64::from_le_bytes(b))
    }

    pub fn read_array32(&mut self, what: &str) -> Result<[u8; 32]> {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.read_bytes(32, what)?);
        Ok(out)
    }

    /// Read a compact size, rejecting non-minimal encodings.
    pub fn read_varint(&mut self, what: &str) -> Result<VarInt> {
        let (value, min) = match self.read_u8(what)? {
            0xff => (self.read_u64_le(what)?, 0x1_0000_0000),
            0xfe => (self.read_u32_le(what)? as u64, 0x1_0000),
            0xfd => (self.read_u16_le(what)? as u64, 0xfd),
            b => return Ok(VarInt(b as u64)),
        };
        if value < min {
            return Err(Error::MalformedData(format!(
                "reading {}: non-canonical varint {}",
                what, value
            )));
        }
        Ok(VarInt(value))
    }

    /// Read a count of items that each occupy at least `min_item_size`
    /// bytes, refusing counts that cannot fit in the remaining data.
    pub fn read_count(&mut self, min_item_size: usize, what: &str) -> Result<usize> {
        let count = self.read_varint(what)?.0;
        let max = (self.remaining() / min_item_size.max(1)) as u64;
        if count > max {
            return Err(Error::MalformedData(format!(
                "{} states {} items but only {} bytes remain",
                what,
                count,
                self.remaining()
            )));
        }
        Ok(count as usize)
    }

    pub fn read_var_bytes(&mut self, what: &str) -> Result<Vec<u8>> {
        let len = self.read_count(1, what)?;
        Ok(self.read_bytes(len, what)?.to_vec())
    }
}

impl OutPoint {
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_bytes(&self.txid);
        writer.write_u32_le(self.vout);
    }

    pub fn read_from(reader: &mut Reader) -> Result<Self> {
        let txid = reader.read_array32("outpoint txid")?;
        let vout = reader.read_u32_le("outpoint index")?;
        Ok(OutPoint { txid, vout })
    }
}

impl TxInput {
    /// Wire form without the witness, which is serialized separately.
    pub fn write_to(&self, writer: &mut Writer) {
        self.previous_output.write_to(writer);
        writer.write_var_bytes(&self.script_sig);
        writer.write_u32_le(self.sequence);
    }

    pub fn read_from(reader: &mut Reader) -> Result<Self> {
        let previous_output = OutPoint::read_from(reader)?;
        let script_sig = reader.read_var_bytes("scriptSig")?;
        let sequence = reader.read_u32_le("sequence")?;
        Ok(TxInput {
            previous_output,
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }
}

impl TxOutput {
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_u64_le(self.value);
        writer.write_var_bytes(&self.script_pubkey);
    }

    pub fn read_from(reader: &mut Reader) -> Result<Self> {
        let value = reader.read_u64_le("output value")?;
        let script_pubkey = reader.read_var_bytes("scriptPubKey")?;
        Ok(TxOutput {
            value,
            script_pubkey,
        })
    }
}

// Smallest possible encodings, used to bound stated counts.
const MIN_INPUT_SIZE: usize = 32 + 4 + 1 + 4;
const MIN_OUTPUT_SIZE: usize = 8 + 1;

fn write_witness(stack: &[Vec<u8>], writer: &mut Writer) {
    writer.write_varint(VarInt::from(stack.len()));
    for item in stack {
        writer.write_var_bytes(item);
    }
}

fn read_witness(reader: &mut Reader) -> Result<Vec<Vec<u8>>> {
    let count = reader.read_count(1, "witness item count")?;
    let mut stack = Vec::with_capacity(count);
    for _ in 0..count {
        stack.push(reader.read_var_bytes("witness item")?);
    }
    Ok(stack)
}

fn write_transaction(tx: &Transaction, include_witness: bool, writer: &mut Writer) {
    let with_witness = include_witness && tx.segwit;
    writer.write_i32_le(tx.version);
    if with_witness {
        writer.write_u8(SEGWIT_MARKER);
        writer.write_u8(SEGWIT_FLAG);
    }
    writer.write_varint(VarInt::from(tx.inputs.len()));
    for input in &tx.inputs {
        input.write_to(writer);
    }
    writer.write_varint(VarInt::from(tx.outputs.len()));
    for output in &tx.outputs {
        output.write_to(writer);
    }
    if with_witness {
        for input in &tx.inputs {
            write_witness(&input.witness, writer);
        }
    }
    writer.write_u32_le(tx.lock_time);
}

/// Serialize `tx`, including witnesses when its segwit flag is set.
pub fn encode(tx: &Transaction) -> Vec<u8> {
    let mut writer = Writer::with_capacity(256);
    write_transaction(tx, true, &mut writer);
    writer.into_bytes()
}

/// Serialize `tx` in the pre-segwit form (no marker, flag or witnesses).
pub fn encode_without_witness(tx: &Transaction) -> Vec<u8> {
    let mut writer = Writer::with_capacity(256);
    write_transaction(tx, false, &mut writer);
    writer.into_bytes()
}

pub fn encode_hex(tx: &Transaction) -> String {
    hex::encode(encode(tx))
}

/// Parse exactly one transaction from `bytes`; trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = Reader::new(bytes);
    let tx = read_transaction(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(Error::MalformedData(format!(
            "trailing {} bytes after transaction",
            reader.remaining()
        )));
    }
    Ok(tx)
}

pub fn decode_hex(hex_str: &str) -> Result<Transaction> {
    decode(&hex::decode(hex_str.trim())?)
}

fn read_inputs(reader: &mut Reader) -> Result<Vec<TxInput>> {
    let count = reader.read_count(MIN_INPUT_SIZE, "input count")?;
    let mut inputs = Vec::with_capacity(count);
    for _ in 0..count {
        inputs.push(TxInput::read_from(reader)?);
    }
    Ok(inputs)
}

fn read_outputs(reader: &mut Reader) -> Result<Vec<TxOutput>> {
    let count = reader.read_count(MIN_OUTPUT_SIZE, "output count")?;
    let mut outputs = Vec::with_capacity(count);
    for _ in 0..count {
        outputs.push(TxOutput::read_from(reader)?);
    }
    Ok(outputs)
}

fn read_transaction(reader: &mut Reader) -> Result<Transaction> {
    let version = reader.read_i32_le("version")?;

    // A zero input count doubles as the segwit marker.
    let segwit = reader.peek_u8() == Some(SEGWIT_MARKER);
    if segwit {
        reader.read_u8("segwit marker")?;
        let flag = reader.read_u8("segwit flag")?;
        if flag != SEGWIT_FLAG {
            return Err(Error::MalformedData(format!(
                "unsupported segwit flag 0x{:02x}",
                flag
            )));
        }
    }

    let mut inputs = read_inputs(reader)?;
    let outputs = read_outputs(reader)?;

    if segwit {
        for input in inputs.iter_mut() {
            input.witness = read_witness(reader)?;
        }
        if !inputs.is_empty() && inputs.iter().all(|input| input.witness.is_empty()) {
            return Err(Error::MalformedData(
                "witness flag set but no witnesses present".to_string(),
            ));
        }
    }

    let lock_time = reader.read_u32_le("lock time")?;

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
        segwit,
    })
}

impl Transaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn to_hex(&self) -> String {
        encode_hex(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_hex(hex_str)
    }

    /// Transaction id in display (reversed) hex.
    pub fn txid(&self) -> String {
        let mut id = sha256d(&encode_without_witness(self));
        id.reverse();
        hex::encode(id)
    }

    /// Witness transaction id in display hex; equals `txid` without witnesses.
    pub fn wtxid(&self) -> String {
        let mut id = sha256d(&encode(self));
        id.reverse();
        hex::encode(id)
    }

    /// BIP-141 weight: base size * 3 + total size.
    pub fn weight(&self) -> usize {
        encode_without_witness(self).len() * 3 + encode(self).len()
    }

    pub fn vsize(&self) -> usize {
        (self.weight() + 3) / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Signed P2PKH spend (one input, two outputs).
    const LEGACY_TX: &str = "0100000001c997a5e56e104102fa209c6a852dd90660a20b2d9c352423edce25857fcd3704000000004847304402204e45e16932b8af514961a1d3a1a25fdf3f4f7732e9d624c6c61548ab5fb8cd410220181522ec8eca07de4860a4acdd12909d831cc56cbbac4622082221a8768d1d0901ffffffff0200ca9a3b00000000434104ae1a62fe09c5f51b13905f07f06b99a2f7159b2225f374cd378d71302fa28414e7aab37397f554a7df5f142c21c1b7303b8a0626f1baded5c72a704f7e6cd84cac00286bee0000000043410411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3ac00000000";

    #[test]
    fn varint_boundaries() {
        for (value, len) in [
            (0u64, 1usize),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x1_0000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ] {
            let mut writer = Writer::new();
            writer.write_varint(VarInt(value));
            assert_eq!(writer.as_bytes().len(), len, "length of {}", value);
            let bytes = writer.into_bytes();
            let mut reader = Reader::new(&bytes);
            assert_eq!(reader.read_varint("test").unwrap(), VarInt(value));
        }
    }

    #[test]
    fn non_canonical_varint_is_rejected() {
        let bytes = [0xfd, 0x10, 0x00];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            reader.read_varint("test"),
            Err(Error::MalformedData(_))
        ));
    }

    #[test]
    fn legacy_transaction_roundtrip_and_txid() {
        let tx = Transaction::from_hex(LEGACY_TX).unwrap();
        assert!(!tx.segwit);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].value, 1_000_000_000);
        assert_eq!(tx.to_hex(), LEGACY_TX);
        assert_eq!(
            tx.txid(),
            "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16"
        );
        assert_eq!(tx.txid(), tx.wtxid());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = hex::decode(LEGACY_TX).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(Error::MalformedData(_))));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = hex::decode(LEGACY_TX).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(Error::MalformedData(_))
        ));
    }

    #[test]
    fn oversized_count_is_rejected() {
        // version, input count claiming 200 inputs, then nothing.
        let bytes = hex::decode("01000000c8").unwrap();
        assert!(matches!(decode(&bytes), Err(Error::MalformedData(_))));
    }

    #[test]
    fn segwit_roundtrip_keeps_witnesses() {
        let mut tx = Transaction::from_hex(LEGACY_TX).unwrap();
        tx.inputs[0].script_sig.clear();
        tx.inputs[0].witness = vec![vec![0xaa; 71], vec![0x02; 33]];
        tx.segwit = true;

        let bytes = encode(&tx);
        assert_eq!(&bytes[4..6], &[0x00, 0x01]);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_ne!(tx.txid(), tx.wtxid());
        assert!(tx.weight() > encode_without_witness(&tx).len() * 4);
    }

    #[test]
    fn segwit_flag_without_witnesses_is_rejected() {
        let mut tx = Transaction::from_hex(LEGACY_TX).unwrap();
        tx.segwit = true;
        assert!(matches!(
            decode(&encode(&tx)),
            Err(Error::MalformedData(_))
        ));
    }
}
