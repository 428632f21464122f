//! Native SOL transfer construction and legacy wire encoding.
//!
//! The session only ever builds one kind of transaction: a single System
//! Program `Transfer` instruction from the connected account. Wallets that
//! sign in the page (extensions) take the unsigned [`TransferTransaction`];
//! wallets that sign locally compile it against a recent blockhash with
//! [`TransferTransaction::compile`] and sign [`CompiledMessage::serialize`].
//!
//! ```text
//! message:
//!   num_required_sigs     u8
//!   num_readonly_signed   u8
//!   num_readonly_unsigned u8
//!   num_accounts          compact-u16
//!   account_keys          32 bytes * num_accounts
//!   recent_blockhash      32 bytes
//!   num_instructions      compact-u16
//!   instructions[]        program_id_index u8, compact-u16 + account indices,
//!                         compact-u16 + data
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::AccountId;
use crate::ports::PortError;

/// `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: AccountId = AccountId::new([0u8; 32]);

const SYSTEM_TRANSFER_IX_INDEX: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: AccountId,
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: AccountId,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Unsigned transfer: fee payer plus its instructions. The blockhash is bound
/// at signing time by whichever wallet signs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTransaction {
    pub fee_payer: AccountId,
    pub instructions: Vec<Instruction>,
}

impl TransferTransaction {
    pub fn system_transfer(from: AccountId, to: AccountId, lamports: u64) -> Self {
        Self {
            fee_payer: from,
            instructions: vec![system_transfer_instruction(from, to, lamports)],
        }
    }

    /// Lamports moved by the System Program transfers in this transaction.
    pub fn transfer_lamports(&self) -> u64 {
        self.instructions
            .iter()
            .filter(|ix| ix.program_id == SYSTEM_PROGRAM_ID && ix.data.len() == 12)
            .filter_map(|ix| {
                let index = u32::from_le_bytes(ix.data[..4].try_into().ok()?);
                let lamports = u64::from_le_bytes(ix.data[4..].try_into().ok()?);
                (index == SYSTEM_TRANSFER_IX_INDEX).then_some(lamports)
            })
            .sum()
    }

    pub fn compile(&self, recent_blockhash: [u8; 32]) -> Result<CompiledMessage, PortError> {
        struct Entry {
            pubkey: AccountId,
            is_signer: bool,
            is_writable: bool,
        }

        let mut entries: Vec<Entry> = Vec::new();
        let mut upsert = |pubkey: AccountId, signer: bool, writable: bool| {
            if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
                entry.is_signer |= signer;
                entry.is_writable |= writable;
            } else {
                entries.push(Entry {
                    pubkey,
                    is_signer: signer,
                    is_writable: writable,
                });
            }
        };

        upsert(self.fee_payer, true, true);
        for ix in &self.instructions {
            for meta in &ix.accounts {
                upsert(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        // Stable sort keeps the fee payer first among writable signers.
        entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        if entries.len() > u8::MAX as usize {
            return Err(PortError::Validation(format!(
                "too many accounts: {}",
                entries.len()
            )));
        }

        let num_required_signatures = entries.iter().filter(|e| e.is_signer).count() as u8;
        let num_readonly_signed = entries
            .iter()
            .filter(|e| e.is_signer && !e.is_writable)
            .count() as u8;
        let num_readonly_unsigned = entries
            .iter()
            .filter(|e| !e.is_signer && !e.is_writable)
            .count() as u8;

        let account_keys: Vec<AccountId> = entries.iter().map(|e| e.pubkey).collect();
        let index_of = |key: &AccountId| -> Result<u8, PortError> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| PortError::Validation(format!("account {key} not in message")))
        };

        let mut instructions = Vec::with_capacity(self.instructions.len());
        for ix in &self.instructions {
            let account_indices = ix
                .accounts
                .iter()
                .map(|meta| index_of(&meta.pubkey))
                .collect::<Result<Vec<_>, _>>()?;
            instructions.push(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                account_indices,
                data: ix.data.clone(),
            });
        }

        Ok(CompiledMessage {
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMessage {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    pub account_keys: Vec<AccountId>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
}

impl CompiledMessage {
    /// The bytes every required signer signs.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);

        buf.extend_from_slice(&encode_compact_u16(self.account_keys.len() as u16));
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }
        buf.extend_from_slice(&self.recent_blockhash);

        buf.extend_from_slice(&encode_compact_u16(self.instructions.len() as u16));
        for ix in &self.instructions {
            buf.push(ix.program_id_index);
            buf.extend_from_slice(&encode_compact_u16(ix.account_indices.len() as u16));
            buf.extend_from_slice(&ix.account_indices);
            buf.extend_from_slice(&encode_compact_u16(ix.data.len() as u16));
            buf.extend_from_slice(&ix.data);
        }
        buf
    }
}

/// Signatures followed by the serialized message, ready for `sendTransaction`.
pub fn wire_transaction(signatures: &[[u8; 64]], message: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(3 + signatures.len() * 64 + message.len());
    wire.extend_from_slice(&encode_compact_u16(signatures.len() as u16));
    for sig in signatures {
        wire.extend_from_slice(sig);
    }
    wire.extend_from_slice(message);
    wire
}

pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);
    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }
    out
}

fn system_transfer_instruction(from: AccountId, to: AccountId, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_IX_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            AccountMeta {
                pubkey: from,
                is_signer: true,
                is_writable: true,
            },
            AccountMeta {
                pubkey: to,
                is_signer: false,
                is_writable: true,
            },
        ],
        data,
    }
}
