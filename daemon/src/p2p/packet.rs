//! The six request/response opcodes the peer dispatcher multiplexes
//! over one connection.

use ledger_common::{
    serializer::{Reader, ReaderError, Serializer, Writer},
    Hash, Transaction,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipRequest {
    pub tx: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipResponse {
    pub vote: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub tx: Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub preferred: Option<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncViewRequest {
    pub root: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncViewResponse {
    pub root: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiffMetadataRequest {
    pub view_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiffMetadataResponse {
    pub latest_view_id: u64,
    pub chunk_hashes: Vec<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiffChunkRequest {
    pub chunk_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDiffChunkResponse {
    pub found: bool,
    pub diff: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTransactionRequest {
    pub ids: Vec<Hash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTransactionResponse {
    pub transactions: Vec<Transaction>,
}

/// One peer-protocol message. Each handler in `p2p::handlers`
/// consumes exactly one request variant and produces its matching
/// response variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    GossipRequest(GossipRequest),
    GossipResponse(GossipResponse),
    QueryRequest(QueryRequest),
    QueryResponse(QueryResponse),
    SyncViewRequest(SyncViewRequest),
    SyncViewResponse(SyncViewResponse),
    SyncDiffMetadataRequest(SyncDiffMetadataRequest),
    SyncDiffMetadataResponse(SyncDiffMetadataResponse),
    SyncDiffChunkRequest(SyncDiffChunkRequest),
    SyncDiffChunkResponse(SyncDiffChunkResponse),
    SyncTransactionRequest(SyncTransactionRequest),
    SyncTransactionResponse(SyncTransactionResponse),
}

macro_rules! opcode_table {
    ($($variant:ident = $opcode:expr),+ $(,)?) => {
        impl Packet {
            pub fn opcode(&self) -> u8 {
                match self {
                    $(Packet::$variant(_) => $opcode,)+
                }
            }
        }
    };
}

opcode_table! {
    GossipRequest = 0,
    GossipResponse = 1,
    QueryRequest = 2,
    QueryResponse = 3,
    SyncViewRequest = 4,
    SyncViewResponse = 5,
    SyncDiffMetadataRequest = 6,
    SyncDiffMetadataResponse = 7,
    SyncDiffChunkRequest = 8,
    SyncDiffChunkResponse = 9,
    SyncTransactionRequest = 10,
    SyncTransactionResponse = 11,
}

impl Serializer for Packet {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let opcode = reader.read_u8()?;
        Ok(match opcode {
            0 => Packet::GossipRequest(GossipRequest {
                tx: Transaction::read(reader)?,
            }),
            1 => Packet::GossipResponse(GossipResponse {
                vote: reader.read_u8()? != 0,
            }),
            2 => Packet::QueryRequest(QueryRequest {
                tx: Transaction::read(reader)?,
            }),
            3 => {
                let has_preferred = reader.read_u8()? != 0;
                let preferred = if has_preferred {
                    Some(Transaction::read(reader)?)
                } else {
                    None
                };
                Packet::QueryResponse(QueryResponse { preferred })
            }
            4 => Packet::SyncViewRequest(SyncViewRequest {
                root: reader.read_hash()?,
            }),
            5 => Packet::SyncViewResponse(SyncViewResponse {
                root: reader.read_hash()?,
            }),
            6 => Packet::SyncDiffMetadataRequest(SyncDiffMetadataRequest {
                view_id: reader.read_u64()?,
            }),
            7 => {
                let latest_view_id = reader.read_u64()?;
                let count = reader.read_varint()? as usize;
                let mut chunk_hashes = Vec::with_capacity(count);
                for _ in 0..count {
                    chunk_hashes.push(reader.read_hash()?);
                }
                Packet::SyncDiffMetadataResponse(SyncDiffMetadataResponse {
                    latest_view_id,
                    chunk_hashes,
                })
            }
            8 => Packet::SyncDiffChunkRequest(SyncDiffChunkRequest {
                chunk_hash: reader.read_hash()?,
            }),
            9 => {
                let found = reader.read_u8()? != 0;
                let diff = reader.read_vec_u8()?;
                Packet::SyncDiffChunkResponse(SyncDiffChunkResponse { found, diff })
            }
            10 => {
                let count = reader.read_varint()? as usize;
                let mut ids = Vec::with_capacity(count);
                for _ in 0..count {
                    ids.push(reader.read_hash()?);
                }
                Packet::SyncTransactionRequest(SyncTransactionRequest { ids })
            }
            11 => {
                let count = reader.read_varint()? as usize;
                let mut transactions = Vec::with_capacity(count);
                for _ in 0..count {
                    transactions.push(Transaction::read(reader)?);
                }
                Packet::SyncTransactionResponse(SyncTransactionResponse { transactions })
            }
            other => return Err(ReaderError::InvalidValue(other)),
        })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.opcode());
        match self {
            Packet::GossipRequest(p) => p.tx.write(writer),
            Packet::GossipResponse(p) => writer.write_u8(p.vote as u8),
            Packet::QueryRequest(p) => p.tx.write(writer),
            Packet::QueryResponse(p) => {
                writer.write_u8(p.preferred.is_some() as u8);
                if let Some(tx) = &p.preferred {
                    tx.write(writer);
                }
            }
            Packet::SyncViewRequest(p) => writer.write_hash(&p.root),
            Packet::SyncViewResponse(p) => writer.write_hash(&p.root),
            Packet::SyncDiffMetadataRequest(p) => writer.write_u64(p.view_id),
            Packet::SyncDiffMetadataResponse(p) => {
                writer.write_u64(p.latest_view_id);
                writer.write_varint(p.chunk_hashes.len() as u64);
                for hash in &p.chunk_hashes {
                    writer.write_hash(hash);
                }
            }
            Packet::SyncDiffChunkRequest(p) => writer.write_hash(&p.chunk_hash),
            Packet::SyncDiffChunkResponse(p) => {
                writer.write_u8(p.found as u8);
                writer.write_vec_u8(&p.diff);
            }
            Packet::SyncTransactionRequest(p) => {
                writer.write_varint(p.ids.len() as u64);
                for id in &p.ids {
                    writer.write_hash(id);
                }
            }
            Packet::SyncTransactionResponse(p) => {
                writer.write_varint(p.transactions.len() as u64);
                for tx in &p.transactions {
                    tx.write(writer);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gossip_response_round_trips() {
        let packet = Packet::GossipResponse(GossipResponse { vote: true });
        let bytes = packet.to_bytes();
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn sync_diff_metadata_round_trips() {
        let packet = Packet::SyncDiffMetadataResponse(SyncDiffMetadataResponse {
            latest_view_id: 7,
            chunk_hashes: vec![Hash::zero(), Hash::zero()],
        });
        let bytes = packet.to_bytes();
        assert_eq!(Packet::from_bytes(&bytes).unwrap(), packet);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let bytes = vec![200u8];
        assert_eq!(Packet::from_bytes(&bytes), Err(ReaderError::InvalidValue(200)));
    }
}
