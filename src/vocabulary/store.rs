//! Versioned, atomically replaceable vocabulary store.
//!
//! Readers take an `Arc` snapshot and keep using it for as long as they
//! like; a reload builds a complete new `Vocabulary` off to the side and
//! swaps the pointer under a short write lock. Nobody ever sees a table that
//! is half old, half new.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::notify::{NoopNotifier, NoticeLevel, Notifier};

use super::loader::{load_vocabulary_dir, VocabularyError};
use super::Vocabulary;

/// One immutable generation of the vocabulary.
#[derive(Debug, Default)]
pub struct VocabularySnapshot {
    pub generation: u64,
    pub vocabulary: Vocabulary,
}

pub struct VocabularyStore {
    current: RwLock<Arc<VocabularySnapshot>>,
    notifier: Arc<dyn Notifier>,
}

impl Default for VocabularyStore {
    fn default() -> Self {
        Self::new(Vocabulary::empty())
    }
}

impl VocabularyStore {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self::with_notifier(vocabulary, Arc::new(NoopNotifier))
    }

    pub fn with_notifier(vocabulary: Vocabulary, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            current: RwLock::new(Arc::new(VocabularySnapshot {
                generation: 0,
                vocabulary,
            })),
            notifier,
        }
    }

    /// Load from a directory; missing tables are left empty.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self::new(load_vocabulary_dir(dir))
    }

    /// Current generation. Cheap; holds the read lock only for the clone.
    pub fn snapshot(&self) -> Arc<VocabularySnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A writer only ever swaps a fully built Arc, so the value behind
            // a poisoned lock is still a complete snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Swap in a new vocabulary and return its generation.
    pub fn replace(&self, vocabulary: Vocabulary) -> u64 {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let generation = guard.generation + 1;
        *guard = Arc::new(VocabularySnapshot {
            generation,
            vocabulary,
        });
        drop(guard);
        self.notifier.notify(
            NoticeLevel::Info,
            &format!("vocabulary reloaded (generation {generation})"),
        );
        generation
    }

    /// Synchronous reload from `dir`.
    pub fn reload_from_dir(&self, dir: impl AsRef<Path>) -> u64 {
        self.replace(load_vocabulary_dir(dir))
    }

    /// Reload on a blocking worker with a deadline.
    ///
    /// The store is untouched if the load times out, the worker fails, or
    /// `cancel` is set by the time the load completes.
    pub async fn reload_with_timeout(
        &self,
        dir: impl Into<PathBuf>,
        timeout: Duration,
        cancel: Option<&AtomicBool>,
    ) -> Result<u64, VocabularyError> {
        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            return Err(VocabularyError::Cancelled);
        }
        let dir = dir.into();
        let task = tokio::task::spawn_blocking(move || load_vocabulary_dir(dir));
        let loaded = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(vocabulary)) => vocabulary,
            Ok(Err(e)) => return Err(VocabularyError::Join(e.to_string())),
            Err(_) => {
                self.notifier
                    .notify(NoticeLevel::Warning, "vocabulary unavailable: load timed out");
                return Err(VocabularyError::Timeout(timeout));
            }
        };
        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            return Err(VocabularyError::Cancelled);
        }
        Ok(self.replace(loaded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::{VocabularyEntry, VocabularyTable};

    fn vocab_with(name: &str) -> Vocabulary {
        Vocabulary {
            activities: VocabularyTable::new(vec![
                VocabularyEntry::new("A", "HEADER", 1),
                VocabularyEntry::new("A1", name, 2),
            ]),
            ..Vocabulary::empty()
        }
    }

    #[test]
    fn old_snapshots_survive_replace() {
        let store = VocabularyStore::new(vocab_with("Dredging"));
        let before = store.snapshot();
        let generation = store.replace(vocab_with("Trawling"));

        assert_eq!(generation, 1);
        assert_eq!(before.generation, 0);
        assert!(before.vocabulary.activities.find_by_name("Dredging").is_some());
        let after = store.snapshot();
        assert!(after.vocabulary.activities.find_by_name("Trawling").is_some());
        assert!(after.vocabulary.activities.find_by_name("Dredging").is_none());
    }

    #[tokio::test]
    async fn cancelled_reload_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = VocabularyStore::new(vocab_with("Dredging"));
        let cancel = AtomicBool::new(true);
        let err = store
            .reload_with_timeout(dir.path(), Duration::from_secs(5), Some(&cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, VocabularyError::Cancelled));
        assert_eq!(store.generation(), 0);
    }

    #[tokio::test]
    async fn reload_swaps_in_new_generation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("activities.csv"),
            "level,id,name\n1,A,HEADER\n2,A1,Trawling\n",
        )
        .unwrap();
        let store = VocabularyStore::new(vocab_with("Dredging"));
        let generation = store
            .reload_with_timeout(dir.path(), Duration::from_secs(5), None)
            .await
            .unwrap();
        assert_eq!(generation, 1);
        let snap = store.snapshot();
        assert!(snap.vocabulary.activities.find_by_name("Trawling").is_some());
        assert!(snap.vocabulary.pressures.is_empty());
    }
}
