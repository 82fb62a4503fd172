//! The wire/hash representation of a DAG transaction.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::hash::{Hash, Hashable};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const SIGNATURE_SIZE: usize = 64;

/// The tag selects which registered processor runs a transaction.
/// `Nop` is handled directly by the execution engine and never reaches
/// a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionTag {
    Nop,
    Transfer,
    CreateContract,
    Stake,
}

impl TransactionTag {
    pub fn as_byte(&self) -> u8 {
        match self {
            TransactionTag::Nop => 0,
            TransactionTag::Transfer => 1,
            TransactionTag::CreateContract => 2,
            TransactionTag::Stake => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ReaderError> {
        match byte {
            0 => Ok(TransactionTag::Nop),
            1 => Ok(TransactionTag::Transfer),
            2 => Ok(TransactionTag::CreateContract),
            3 => Ok(TransactionTag::Stake),
            other => Err(ReaderError::InvalidValue(other)),
        }
    }
}

/// A DAG transaction: referencing one or more parents instead of a
/// single predecessor, per the glossary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: Hash,
    pub sender: [u8; 32],
    pub creator: [u8; 32],
    pub creator_signature: [u8; SIGNATURE_SIZE],
    pub tag: TransactionTag,
    pub payload: Vec<u8>,
    pub nonce: u64,
    pub view_id: u64,
    pub parents: Vec<Hash>,
    pub depth: u64,
}

impl Transaction {
    /// The message a creator signs and a verifier checks against:
    /// every wire field except `id` and `creator_signature` itself
    /// (`sender | creator | tag | payload_len | payload | nonce |
    /// view_id | parent_count | parent_ids... | depth`). A wallet
    /// builds these bytes from the same unsigned fields it will pass
    /// to `Transaction::new`, signs them, and only then constructs the
    /// transaction with the resulting signature.
    pub fn signing_bytes(
        sender: &[u8; 32],
        creator: &[u8; 32],
        tag: TransactionTag,
        payload: &[u8],
        nonce: u64,
        view_id: u64,
        parents: &[Hash],
        depth: u64,
    ) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_bytes(sender);
        writer.write_bytes(creator);
        writer.write_u8(tag.as_byte());
        writer.write_vec_u8(payload);
        writer.write_u64(nonce);
        writer.write_u64(view_id);
        writer.write_varint(parents.len() as u64);
        for parent in parents {
            writer.write_hash(parent);
        }
        writer.write_u64(depth);
        writer.into_bytes()
    }

    /// Builds a transaction and derives its id from the canonical
    /// encoding of everything but the id itself.
    pub fn new(
        sender: [u8; 32],
        creator: [u8; 32],
        creator_signature: [u8; SIGNATURE_SIZE],
        tag: TransactionTag,
        payload: Vec<u8>,
        nonce: u64,
        view_id: u64,
        parents: Vec<Hash>,
        depth: u64,
    ) -> Self {
        let id = crate::hash::hash(&Self::signing_bytes(
            &sender, &creator, tag, &payload, nonce, view_id, &parents, depth,
        ));
        Self {
            id,
            sender,
            creator,
            creator_signature,
            tag,
            payload,
            nonce,
            view_id,
            parents,
            depth,
        }
    }

    /// Recomputes the id from the current fields and compares it to
    /// `self.id` — used to reject a transaction whose id does not
    /// match its content.
    pub fn id_matches_content(&self) -> bool {
        let expected = crate::hash::hash(&Self::signing_bytes(
            &self.sender,
            &self.creator,
            self.tag,
            &self.payload,
            self.nonce,
            self.view_id,
            &self.parents,
            self.depth,
        ));
        expected == self.id
    }

    /// Verifies `creator_signature` over the signing bytes using the
    /// creator's Ed25519 public key.
    pub fn verify_signature(&self) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.creator) else {
            return false;
        };
        let signature = Signature::from_bytes(&self.creator_signature);
        let message = Self::signing_bytes(
            &self.sender,
            &self.creator,
            self.tag,
            &self.payload,
            self.nonce,
            self.view_id,
            &self.parents,
            self.depth,
        );
        verifying_key.verify(&message, &signature).is_ok()
    }
}

impl Serializer for Transaction {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let id = reader.read_hash()?;
        let sender = reader.read_fixed::<32>()?;
        let creator = reader.read_fixed::<32>()?;
        let creator_signature = reader.read_fixed::<SIGNATURE_SIZE>()?;
        let tag = TransactionTag::from_byte(reader.read_u8()?)?;
        let payload = reader.read_vec_u8()?;
        let nonce = reader.read_u64()?;
        let view_id = reader.read_u64()?;
        let parent_count = reader.read_varint()? as usize;
        let mut parents = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            parents.push(reader.read_hash()?);
        }
        let depth = reader.read_u64()?;

        Ok(Self {
            id,
            sender,
            creator,
            creator_signature,
            tag,
            payload,
            nonce,
            view_id,
            parents,
            depth,
        })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.id);
        writer.write_bytes(&self.sender);
        writer.write_bytes(&self.creator);
        writer.write_bytes(&self.creator_signature);
        writer.write_u8(self.tag.as_byte());
        writer.write_vec_u8(&self.payload);
        writer.write_u64(self.nonce);
        writer.write_u64(self.view_id);
        writer.write_varint(self.parents.len() as u64);
        for parent in &self.parents {
            writer.write_hash(parent);
        }
        writer.write_u64(self.depth);
    }
}

impl Hashable for Transaction {}

/// A single `(account, key, new_value)` change emitted by a processor
/// during transaction execution. Meaningful only within the scope of
/// applying one transaction (glossary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub account: [u8; 32],
    pub key: Vec<u8>,
    pub old_value: Option<Vec<u8>>,
    pub new_value: Vec<u8>,
}
