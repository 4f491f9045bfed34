//! Key-value storage contract for tree persistence.
//!
//! The tree never talks to a database directly; it depends on [`KvStore`],
//! a minimal transactional interface: point gets with a distinguished
//! not-found result, and write transactions whose buffered operations are
//! applied atomically on commit. Dropping a transaction without committing
//! discards it.
//!
//! [`MemoryStore`] is the reference backend, intended for tests and
//! development. Production deployments plug in a database-backed
//! implementation of the same traits.

use std::{collections::BTreeMap, sync::RwLock};

use thiserror::Error;

/// Error reported by a [`KvStore`] backend, propagated verbatim.
#[derive(Debug, Clone, Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Transactional key-value store.
///
/// `write_tx` takes `&self`: writes go through a transaction object with
/// interior buffering, so a store handle can be shared behind an `Arc`.
pub trait KvStore: Send + Sync {
    /// Point lookup. `Ok(None)` is the distinguished not-found result.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Start a write transaction.
    fn write_tx(&self) -> Box<dyn WriteTx + '_>;
}

/// A pending write transaction. Operations are buffered until [`commit`]
/// applies them atomically; dropping the transaction discards them.
///
/// [`commit`]: WriteTx::commit
pub trait WriteTx {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// In-memory implementation of [`KvStore`] over a `BTreeMap`.
///
/// All operations are thread-safe through a `RwLock`; a transaction applies
/// its buffered operations under a single write lock, so commits are atomic
/// with respect to concurrent readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.data.read().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read().get(key).cloned())
    }

    fn write_tx(&self) -> Box<dyn WriteTx + '_> {
        Box::new(MemoryTx {
            store: self,
            ops: Vec::new(),
        })
    }
}

enum TxOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Buffered transaction over a [`MemoryStore`].
struct MemoryTx<'a> {
    store: &'a MemoryStore,
    ops: Vec<TxOp>,
}

impl WriteTx for MemoryTx<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ops.push(TxOp::Set(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.ops.push(TxOp::Delete(key.to_vec()));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut data = self
            .store
            .data
            .write()
            .unwrap_or_else(|poison| poison.into_inner());
        for op in self.ops {
            match op {
                TxOp::Set(key, value) => {
                    data.insert(key, value);
                }
                TxOp::Delete(key) => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_returns_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"missing").expect("get"), None);
    }

    #[test]
    fn tx_commit_applies_all_ops() {
        let store = MemoryStore::new();
        let mut tx = store.write_tx();
        tx.set(b"a", b"1").expect("set a");
        tx.set(b"b", b"2").expect("set b");
        tx.commit().expect("commit");

        assert_eq!(store.get(b"a").expect("get a"), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").expect("get b"), Some(b"2".to_vec()));
    }

    #[test]
    fn tx_drop_discards_ops() {
        let store = MemoryStore::new();
        {
            let mut tx = store.write_tx();
            tx.set(b"a", b"1").expect("set a");
            // dropped without commit
        }
        assert_eq!(store.get(b"a").expect("get a"), None);
    }

    #[test]
    fn tx_is_not_visible_before_commit() {
        let store = MemoryStore::new();
        let mut tx = store.write_tx();
        tx.set(b"a", b"1").expect("set a");
        assert_eq!(store.get(b"a").expect("get a"), None);
        tx.commit().expect("commit");
        assert_eq!(store.get(b"a").expect("get a"), Some(b"1".to_vec()));
    }

    #[test]
    fn tx_delete_removes_key() {
        let store = MemoryStore::new();
        let mut tx = store.write_tx();
        tx.set(b"a", b"1").expect("set a");
        tx.commit().expect("commit");

        let mut tx = store.write_tx();
        tx.delete(b"a").expect("delete a");
        tx.commit().expect("commit");
        assert_eq!(store.get(b"a").expect("get a"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn tx_ops_apply_in_order() {
        let store = MemoryStore::new();
        let mut tx = store.write_tx();
        tx.set(b"a", b"1").expect("set");
        tx.delete(b"a").expect("delete");
        tx.set(b"a", b"2").expect("set again");
        tx.commit().expect("commit");
        assert_eq!(store.get(b"a").expect("get"), Some(b"2".to_vec()));
    }
}
