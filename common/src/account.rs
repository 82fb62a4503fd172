//! The in-memory account model: a public key, a nonce, and a
//! persistent key→value state map.

use im::OrdMap;

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const PUBLIC_KEY_SIZE: usize = 32;

/// An account's versioned state trie. `store` never mutates `self`;
/// it returns a new version that shares structure with the old one,
/// so a caller can build a proposed next state and discard it on
/// failure without ever touching the one that's already committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    entries: OrdMap<Vec<u8>, Vec<u8>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self {
            entries: OrdMap::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.entries.get(key)
    }

    /// Returns a new state with `key` set to `value`; `self` is left
    /// untouched and remains a valid, independent version.
    #[must_use]
    pub fn store(&self, key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            entries: self.entries.update(key, value),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in canonical (sorted-by-key) order, as required by the
    /// account's bit-stable encoding.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.entries.iter()
    }
}

/// An account as the execution engine sees it: identity, replay-guard
/// nonce, and state. Accounts are value types during execution — they
/// are loaded, mutated in a working set, and written back as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub nonce: u64,
    pub state: AccountState,
}

impl Account {
    /// A freshly synthesized account for a sender seen for the first
    /// time transacting with `nonce == 0`.
    pub fn new(public_key: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            public_key,
            nonce: 0,
            state: AccountState::new(),
        }
    }
}

/// Bit-stable encoding: public key (32 B), varint nonce, then state
/// as a canonical list of (k, v) pairs sorted by key.
impl Serializer for Account {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let public_key = reader.read_fixed::<PUBLIC_KEY_SIZE>()?;
        let nonce = reader.read_varint()?;
        let count = reader.read_varint()? as usize;
        let mut state = AccountState::new();
        for _ in 0..count {
            let key = reader.read_vec_u8()?;
            let value = reader.read_vec_u8()?;
            state = state.store(key, value);
        }
        Ok(Self {
            public_key,
            nonce,
            state,
        })
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.public_key);
        writer.write_varint(self.nonce);
        writer.write_varint(self.state.len() as u64);
        // `OrdMap::iter` already yields entries sorted by key.
        for (key, value) in self.state.iter() {
            writer.write_vec_u8(key);
            writer.write_vec_u8(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn account_encoding_round_trips_for_any_nonce_and_entries(
            public_key: [u8; PUBLIC_KEY_SIZE],
            nonce: u64,
            entries in prop::collection::vec((prop::collection::vec(any::<u8>(), 0..16), prop::collection::vec(any::<u8>(), 0..16)), 0..8),
        ) {
            let mut account = Account::new(public_key);
            account.nonce = nonce;
            for (key, value) in entries {
                account.state = account.state.store(key, value);
            }

            let bytes = account.to_bytes();
            let decoded = Account::read(&mut Reader::new(&bytes)).unwrap();
            prop_assert_eq!(decoded, account);
        }
    }

    #[test]
    fn store_does_not_mutate_old_version() {
        let v1 = AccountState::new().store(b"k".to_vec(), b"v1".to_vec());
        let v2 = v1.store(b"k".to_vec(), b"v2".to_vec());
        assert_eq!(v1.get(b"k"), Some(&b"v1".to_vec()));
        assert_eq!(v2.get(b"k"), Some(&b"v2".to_vec()));
    }

    #[test]
    fn account_encoding_round_trips() {
        let mut account = Account::new([9u8; PUBLIC_KEY_SIZE]);
        account.nonce = 7;
        account.state = account.state.store(b"b".to_vec(), b"2".to_vec());
        account.state = account.state.store(b"a".to_vec(), b"1".to_vec());

        let bytes = account.to_bytes();
        let decoded = Account::read(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(decoded, account);
    }

    #[test]
    fn account_encoding_is_sorted_by_key() {
        let mut account = Account::new([1u8; PUBLIC_KEY_SIZE]);
        account.state = account.state.store(b"z".to_vec(), b"1".to_vec());
        account.state = account.state.store(b"a".to_vec(), b"2".to_vec());

        let mut writer = Writer::new();
        account.write(&mut writer);
        let mut reader = Reader::new(writer.bytes());
        let _ = reader.read_fixed::<PUBLIC_KEY_SIZE>().unwrap();
        let _ = reader.read_varint().unwrap();
        let count = reader.read_varint().unwrap();
        assert_eq!(count, 2);
        let first_key = reader.read_vec_u8().unwrap();
        assert_eq!(first_key, b"a".to_vec());
    }
}
