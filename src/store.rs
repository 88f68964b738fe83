//! In-memory memo store.
//!
//! An append-only, ordered list of memos shared by every connection
//! handler. Entries appear in the order their reads completed, which is
//! not necessarily the order connections were accepted.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, trace};

/// Anything that accepts completed memos.
///
/// Handlers only ever append; a persistence layer can sit behind this
/// trait in place of (or in front of) [`MemoStore`].
pub trait MemoSink: Send + Sync {
    fn append(&self, memo: String);
}

/// Thread-safe, append-only memo list
#[derive(Debug, Default)]
pub struct MemoStore {
    memos: Mutex<Vec<String>>,
}

impl MemoStore {
    /// Create an empty store behind an `Arc` for sharing with handlers
    pub fn new() -> Arc<Self> {
        info!("Initializing memo store");
        Arc::new(Self::default())
    }

    /// Add one memo to the end of the list
    pub fn append(&self, memo: String) {
        let mut memos = self.lock();
        trace!(index = memos.len(), bytes = memo.len(), "Appending memo");
        memos.push(memo);
    }

    /// Copy of every memo received so far, in arrival order
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A push either happened or it didn't, so a poisoned list is still whole.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.memos.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoSink for MemoStore {
    fn append(&self, memo: String) {
        MemoStore::append(self, memo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_starts_empty() {
        let store = MemoStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let store = MemoStore::new();
        store.append("first".to_string());
        store.append("second".to_string());
        store.append("third".to_string());

        assert_eq!(store.snapshot(), vec!["first", "second", "third"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = MemoStore::new();
        store.append("before".to_string());

        let snapshot = store.snapshot();
        store.append("after".to_string());

        assert_eq!(snapshot, vec!["before"]);
        assert_eq!(store.snapshot(), vec!["before", "after"]);
    }

    #[test]
    fn test_concurrent_appends() {
        let store = MemoStore::new();
        let mut handles = vec![];

        for t in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    store.append(format!("memo-{t}-{i}"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 800);

        let unique: HashSet<_> = snapshot.iter().collect();
        assert_eq!(unique.len(), 800);
    }

    #[test]
    fn test_survives_poisoned_lock() {
        let store = MemoStore::new();
        store.append("kept".to_string());

        let poisoner = Arc::clone(&store);
        let _ = thread::spawn(move || {
            let _guard = poisoner.memos.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        store.append("still works".to_string());
        assert_eq!(store.snapshot(), vec!["kept", "still works"]);
    }

    #[test]
    fn test_sink_trait_object() {
        let store = MemoStore::new();
        let sink: Arc<dyn MemoSink> = store.clone();
        sink.append("via sink".to_string());
        assert_eq!(store.snapshot(), vec!["via sink"]);
    }
}
