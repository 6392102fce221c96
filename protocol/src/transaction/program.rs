//! Control programs and the small assembler that produces them.
//!
//! Programs are opaque byte strings to most of the wallet. This module is
//! the one place that knows their shape: pay-to-witness-pubkey-hash,
//! pay-to-witness-script-hash, the multisig witness script, retirement,
//! and the signature programs that witnesses commit to.

use thiserror::Error;

use crate::crypto::{hash::PUBKEY_HASH_LEN, sha256};
use crate::transaction::{AssetId, Hash};

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

pub const OP_0: u8 = 0x00;
pub const OP_DATA_1: u8 = 0x01;
pub const OP_DATA_20: u8 = 0x14;
pub const OP_DATA_32: u8 = 0x20;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_FAIL: u8 = 0x6a;
pub const OP_TOALTSTACK: u8 = 0x6b;
pub const OP_FROMALTSTACK: u8 = 0x6c;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_SHA3: u8 = 0xaa;
pub const OP_CHECKMULTISIG: u8 = 0xad;
pub const OP_TXSIGHASH: u8 = 0xae;
pub const OP_CHECKPREDICATE: u8 = 0xc0;
pub const OP_CHECKOUTPUT: u8 = 0xc1;
pub const OP_OUTPUTID: u8 = 0xcb;

/// Length of a tx-sighash commitment program:
/// `OP_DATA_32 <32-byte sighash> OP_TXSIGHASH OP_EQUAL`.
pub const TXSIGHASH_PROGRAM_LEN: usize = 35;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("bad multisig parameters: {required} of {keys}")]
    BadMultiSig { required: usize, keys: usize },
}

// ---------------------------------------------------------------------------
// Scalar encodings
// ---------------------------------------------------------------------------

/// Minimal little-endian encoding of an integer; zero is the empty string.
pub fn int64_bytes(n: i64) -> Vec<u8> {
    let mut out = (n as u64).to_le_bytes().to_vec();
    while out.last() == Some(&0) {
        out.pop();
    }
    out
}

/// `true` is `[1]`, `false` is the empty string.
pub fn bool_bytes(b: bool) -> Vec<u8> {
    if b {
        vec![1]
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// ProgramBuilder
// ---------------------------------------------------------------------------

/// Appends opcodes and pushes, consuming and returning `self`.
///
/// ```
/// use vela_protocol::transaction::program::{ProgramBuilder, OP_EQUAL};
///
/// let prog = ProgramBuilder::new().add_data(&[7; 3]).add_op(OP_EQUAL).build();
/// assert_eq!(prog, vec![0x03, 7, 7, 7, OP_EQUAL]);
/// ```
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Vec<u8>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_op(mut self, op: u8) -> Self {
        self.program.push(op);
        self
    }

    /// Push `data` with the shortest push opcode that fits.
    pub fn add_data(mut self, data: &[u8]) -> Self {
        let len = data.len();
        match len {
            0 => self.program.push(OP_0),
            1..=75 => self.program.push(OP_DATA_1 + (len as u8) - 1),
            76..=0xff => {
                self.program.push(OP_PUSHDATA1);
                self.program.push(len as u8);
            }
            0x100..=0xffff => {
                self.program.push(OP_PUSHDATA2);
                self.program.extend_from_slice(&(len as u16).to_le_bytes());
            }
            _ => {
                self.program.push(OP_PUSHDATA4);
                self.program.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        self.program.extend_from_slice(data);
        self
    }

    /// Push a small integer as an opcode, larger ones as data.
    pub fn add_int64(self, n: i64) -> Self {
        match n {
            0 => self.add_op(OP_0),
            1..=16 => self.add_op(OP_1 + (n as u8) - 1),
            _ => self.add_data(&int64_bytes(n)),
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.program
    }
}

// ---------------------------------------------------------------------------
// Standard programs
// ---------------------------------------------------------------------------

/// Version-0 witness program committing to a 20-byte public-key hash.
pub fn p2wpkh_program(pubkey_hash: &[u8]) -> Vec<u8> {
    ProgramBuilder::new().add_int64(0).add_data(pubkey_hash).build()
}

/// Version-0 witness program committing to a 32-byte script hash.
pub fn p2wsh_program(script_hash: &[u8]) -> Vec<u8> {
    ProgramBuilder::new().add_int64(0).add_data(script_hash).build()
}

pub fn is_p2wpkh(program: &[u8]) -> bool {
    program.len() == 2 + PUBKEY_HASH_LEN && program[0] == OP_0 && program[1] == OP_DATA_20
}

pub fn is_p2wsh(program: &[u8]) -> bool {
    program.len() == 34 && program[0] == OP_0 && program[1] == OP_DATA_32
}

/// A program nobody can satisfy, optionally carrying an arbitrary comment.
pub fn retire_program(comment: &[u8]) -> Vec<u8> {
    let builder = ProgramBuilder::new().add_op(OP_FAIL);
    if comment.is_empty() {
        builder.build()
    } else {
        builder.add_data(comment).build()
    }
}

/// The m-of-n witness script behind P2WSH account programs and the
/// federation program.
///
/// Expected stack: `[... NARGS SIG.. PREDICATE]`.
pub fn multisig_program(pubkeys: &[[u8; 32]], required: usize) -> Result<Vec<u8>, ProgramError> {
    if required > pubkeys.len() || (required == 0 && !pubkeys.is_empty()) {
        return Err(ProgramError::BadMultiSig {
            required,
            keys: pubkeys.len(),
        });
    }

    let mut builder = ProgramBuilder::new()
        .add_op(OP_DUP)
        .add_op(OP_TOALTSTACK)
        .add_op(OP_SHA3);
    for key in pubkeys {
        builder = builder.add_data(key);
    }
    Ok(builder
        .add_int64(required as i64)
        .add_int64(pubkeys.len() as i64)
        .add_op(OP_CHECKMULTISIG)
        .add_op(OP_VERIFY)
        .add_op(OP_FROMALTSTACK)
        .add_int64(0)
        .add_op(OP_CHECKPREDICATE)
        .build())
}

/// P2WSH program for a witness script.
pub fn p2wsh_for_script(script: &[u8]) -> Vec<u8> {
    p2wsh_program(&sha256(script))
}

// ---------------------------------------------------------------------------
// Signature programs
// ---------------------------------------------------------------------------

/// `OP_DATA_32 <sighash> OP_TXSIGHASH OP_EQUAL`: satisfied only by the
/// exact transaction it was built for.
pub fn txsighash_program(sighash: &Hash) -> Vec<u8> {
    ProgramBuilder::new()
        .add_data(sighash.as_bytes())
        .add_op(OP_TXSIGHASH)
        .add_op(OP_EQUAL)
        .build()
}

/// Extract the sighash a tx-sighash program commits to, if `program` is one.
pub fn committed_sighash(program: &[u8]) -> Option<&[u8]> {
    if program.len() != TXSIGHASH_PROGRAM_LEN
        || program[0] != OP_DATA_32
        || program[33..] != [OP_TXSIGHASH, OP_EQUAL]
    {
        return None;
    }
    Some(&program[1..33])
}

/// A clause of an output-constraint signature program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// The input being signed spends exactly this output.
    OutputId(Hash),
    /// Output `index` pays `amount` of `asset_id` to `program`.
    Pay {
        index: usize,
        asset_id: AssetId,
        amount: u64,
        program: Vec<u8>,
    },
}

impl Constraint {
    fn code(&self) -> Vec<u8> {
        match self {
            Constraint::OutputId(id) => ProgramBuilder::new()
                .add_data(id.as_bytes())
                .add_op(OP_OUTPUTID)
                .add_op(OP_EQUAL)
                .build(),
            Constraint::Pay {
                index,
                asset_id,
                amount,
                program,
            } => ProgramBuilder::new()
                .add_int64(*index as i64)
                .add_int64(*amount as i64)
                .add_data(asset_id.as_bytes())
                .add_int64(1)
                .add_data(program)
                .add_op(OP_CHECKOUTPUT)
                .build(),
        }
    }
}

/// Joins constraints with `OP_VERIFY`, leaving the last result on the stack.
pub fn constraint_program(constraints: &[Constraint]) -> Vec<u8> {
    let mut program = Vec::new();
    for (i, c) in constraints.iter().enumerate() {
        program.extend(c.code());
        if i + 1 < constraints.len() {
            program.push(OP_VERIFY);
        }
    }
    program
}
