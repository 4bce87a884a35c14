//! The bounded transaction-input reference cache.
//!
//! Vote cancellation needs the output an input spends; the cache resolves
//! inputs through an external transaction store and remembers the result.
//! Inputs are compared by value, so two inputs naming the same previous
//! output collide in the map - which is exactly the memoization wanted.
//! Insertion order is tracked and the oldest references are evicted once the
//! configured bound is exceeded.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use vertex_types::{H256, Input, Output, Transaction};

use crate::error::{Result, StateError};

/// Resolves transaction ids to transactions, typically backed by the chain
/// database.
pub trait TransactionStore: Send + Sync {
    /// Returns the transaction and the height it was packed at.
    fn get_transaction(&self, tx_id: &H256) -> std::result::Result<(Transaction, u64), String>;
}

struct CacheInner {
    reference: HashMap<Input, Output>,
    // Insertion order of `reference` keys, oldest first.
    inputs: VecDeque<Input>,
    tx_cache: HashMap<H256, Transaction>,
}

/// The bounded input-to-output reference cache.
pub struct UtxoCache<S> {
    store: Arc<S>,
    max_reference_size: usize,
    inner: Mutex<CacheInner>,
}

impl<S: TransactionStore> UtxoCache<S> {
    /// Creates a cache over the given store, retaining at most
    /// `max_reference_size` references.
    pub fn new(store: Arc<S>, max_reference_size: usize) -> Self {
        Self {
            store,
            max_reference_size,
            inner: Mutex::new(CacheInner {
                reference: HashMap::new(),
                inputs: VecDeque::new(),
                tx_cache: HashMap::new(),
            }),
        }
    }

    /// Fetches a transaction, memoizing it until [`UtxoCache::clean_tx_cache`].
    pub fn get_transaction(&self, tx_id: &H256) -> Result<Transaction> {
        let mut inner = self.inner.lock();
        Self::get_transaction_locked(&self.store, &mut inner, tx_id)
    }

    fn get_transaction_locked(
        store: &S,
        inner: &mut CacheInner,
        tx_id: &H256,
    ) -> Result<Transaction> {
        if let Some(tx) = inner.tx_cache.get(tx_id) {
            return Ok(tx.clone());
        }
        let (tx, _height) = store
            .get_transaction(tx_id)
            .map_err(|e| StateError::ReferenceNotFound(format!("transaction not found, {e}")))?;
        inner.tx_cache.insert(*tx_id, tx.clone());
        Ok(tx)
    }

    /// Resolves every input of `tx` to the output it spends.
    ///
    /// Misses consult the store; failures abort the whole resolution so the
    /// caller never sees a partial map.
    pub fn get_tx_reference(&self, tx: &Transaction) -> Result<HashMap<Input, Output>> {
        let mut inner = self.inner.lock();
        let mut result = HashMap::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if let Some(output) = inner.reference.get(input) {
                result.insert(*input, output.clone());
                continue;
            }

            let prev_tx =
                Self::get_transaction_locked(&self.store, &mut inner, &input.previous.tx_id)
                    .map_err(|e| {
                        StateError::ReferenceNotFound(format!("GetTxReference failed, {e}"))
                    })?;
            let output = prev_tx
                .outputs
                .get(input.previous.index as usize)
                .cloned()
                .ok_or_else(|| {
                    StateError::ReferenceNotFound(format!(
                        "GetTxReference failed, output index {} out of range for {}",
                        input.previous.index, input.previous.tx_id
                    ))
                })?;

            Self::insert_reference_locked(
                &mut inner,
                self.max_reference_size,
                *input,
                output.clone(),
            );
            result.insert(*input, output);
        }
        Ok(result)
    }

    fn insert_reference_locked(
        inner: &mut CacheInner,
        max_reference_size: usize,
        input: Input,
        output: Output,
    ) {
        if inner.reference.len() >= max_reference_size {
            // Evict oldest-inserted references until back under the bound.
            while inner.reference.len() >= max_reference_size {
                match inner.inputs.pop_front() {
                    Some(oldest) => {
                        inner.reference.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        inner.inputs.push_back(input);
        inner.reference.insert(input, output);
    }

    /// Inserts a resolved reference directly.
    pub fn insert_reference(&self, input: Input, output: Output) {
        let mut inner = self.inner.lock();
        Self::insert_reference_locked(&mut inner, self.max_reference_size, input, output);
    }

    /// Number of retained references.
    pub fn reference_len(&self) -> usize {
        self.inner.lock().reference.len()
    }

    /// Drops the per-transaction memoization, keeping resolved references.
    pub fn clean_tx_cache(&self) {
        self.inner.lock().tx_cache.clear();
    }

    /// Empties the cache entirely.
    pub fn clean_cache(&self) {
        let mut inner = self.inner.lock();
        inner.reference.clear();
        inner.inputs.clear();
        inner.tx_cache.clear();
    }

    /// The oldest retained input, if any.
    pub fn oldest_input(&self) -> Option<Input> {
        self.inner.lock().inputs.front().copied()
    }

    /// The most recently inserted input, if any.
    pub fn newest_input(&self) -> Option<Input> {
        self.inner.lock().inputs.back().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use vertex_types::{Amount, OutPoint, Payload, ProgramHash, TxType};

    struct MemoryStore {
        transactions: RwLock<HashMap<H256, Transaction>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                transactions: RwLock::new(HashMap::new()),
            }
        }

        fn put(&self, tx: Transaction) -> H256 {
            let hash = tx.hash();
            self.transactions.write().insert(hash, tx);
            hash
        }

        fn remove(&self, tx_id: &H256) {
            self.transactions.write().remove(tx_id);
        }
    }

    impl TransactionStore for MemoryStore {
        fn get_transaction(
            &self,
            tx_id: &H256,
        ) -> std::result::Result<(Transaction, u64), String> {
            self.transactions
                .read()
                .get(tx_id)
                .cloned()
                .map(|tx| (tx, 0))
                .ok_or_else(|| "db: not found".to_string())
        }
    }

    fn refer_tx(value: i64) -> Transaction {
        let mut tx = Transaction::new(TxType::TransferAsset, Payload::TransferAsset);
        tx.outputs.push(Output::plain(
            Amount::from_sela(value),
            ProgramHash::standard_from_public_key(&vertex_types::PublicKey::new([0x02; 33])),
        ));
        tx
    }

    fn spend_of(tx_id: H256, index: u16) -> Transaction {
        let mut tx = Transaction::new(TxType::TransferAsset, Payload::TransferAsset);
        tx.inputs.push(Input::new(OutPoint::new(tx_id, index), 0));
        tx
    }

    #[test]
    fn test_reference_resolution_and_caching() {
        let store = Arc::new(MemoryStore::new());
        let refer = refer_tx(100);
        let refer_id = store.put(refer);
        let cache = UtxoCache::new(store.clone(), 1_000);

        let spend = spend_of(refer_id, 0);
        let reference = cache.get_tx_reference(&spend).unwrap();
        assert_eq!(reference.len(), 1);
        let output = &reference[&spend.inputs[0]];
        assert_eq!(output.value, Amount::from_sela(100));

        // Once cached, the store is no longer consulted.
        store.remove(&refer_id);
        let reference = cache.get_tx_reference(&spend).unwrap();
        assert_eq!(reference[&spend.inputs[0]].value, Amount::from_sela(100));
    }

    #[test]
    fn test_clean_cache_forces_store_misses_to_error() {
        let store = Arc::new(MemoryStore::new());
        let refer = refer_tx(100);
        let refer_id = store.put(refer);
        let cache = UtxoCache::new(store.clone(), 1_000);

        let spend = spend_of(refer_id, 0);
        cache.get_tx_reference(&spend).unwrap();

        store.remove(&refer_id);
        cache.clean_cache();
        let err = cache.get_tx_reference(&spend).unwrap_err();
        assert!(matches!(err, StateError::ReferenceNotFound(_)));
        assert!(err.to_string().contains("db: not found"));
    }

    #[test]
    fn test_clean_tx_cache_clears_memoized_transactions() {
        let store = Arc::new(MemoryStore::new());
        let refer_id = store.put(refer_tx(100));
        let cache = UtxoCache::new(store.clone(), 1_000);

        cache.get_transaction(&refer_id).unwrap();
        store.remove(&refer_id);
        // Still memoized.
        cache.get_transaction(&refer_id).unwrap();

        cache.clean_tx_cache();
        assert!(cache.get_transaction(&refer_id).is_err());
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        const MAX: usize = 64;
        let store = Arc::new(MemoryStore::new());
        let cache = UtxoCache::new(store, MAX);

        let output = refer_tx(1).outputs[0].clone();
        let input_at = |seq: u32| Input::new(OutPoint::new(H256::NIL, 0), seq);

        for seq in 0..MAX as u32 {
            cache.insert_reference(input_at(seq), output.clone());
        }
        assert_eq!(cache.reference_len(), MAX);
        assert_eq!(cache.oldest_input().unwrap().sequence, 0);
        assert_eq!(cache.newest_input().unwrap().sequence, MAX as u32 - 1);

        for seq in MAX as u32..(MAX as u32 + 500) {
            cache.insert_reference(input_at(seq), output.clone());
        }
        assert_eq!(cache.reference_len(), MAX);
        assert_eq!(cache.oldest_input().unwrap().sequence, 500);
        assert_eq!(cache.newest_input().unwrap().sequence, MAX as u32 + 499);
    }
}
