//! Versioned index cache with at-most-one build per version.
//!
//! Each requested version owns a slot holding its build state. The first
//! caller to find a slot `Unbuilt` builds outside the lock; concurrent callers
//! for the same version wait on the slot's condvar and share the result.
//! Slots live in an insertion-ordered map that doubles as the LRU order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DictionaryConfig;
use crate::dictionary::index::HlaMetadataIndex;
use crate::errors::{HlaError, HlaResult};
use crate::models::{Locus, MatchingDictionaryEntry};
use crate::source::{FileSystemSource, NomenclatureSource};

/// Externally visible build state of a version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BuildState {
    Unbuilt,
    Building,
    Rebuilding,
    Ready,
    Failed,
}

#[derive(Default)]
enum SlotState {
    #[default]
    Unbuilt,
    Building,
    /// A requested rebuild is running; `previous` keeps serving readers.
    Rebuilding { previous: Arc<HlaMetadataIndex> },
    Ready(Arc<HlaMetadataIndex>),
    Failed {
        reason: String,
        previous: Option<Arc<HlaMetadataIndex>>,
    },
}

impl SlotState {
    fn build_state(&self) -> BuildState {
        match self {
            SlotState::Unbuilt => BuildState::Unbuilt,
            SlotState::Building => BuildState::Building,
            SlotState::Rebuilding { .. } => BuildState::Rebuilding,
            SlotState::Ready(_) => BuildState::Ready,
            SlotState::Failed { .. } => BuildState::Failed,
        }
    }

    fn is_in_flight(&self) -> bool {
        matches!(self, SlotState::Building | SlotState::Rebuilding { .. })
    }
}

#[derive(Default)]
struct VersionSlot {
    state: Mutex<SlotState>,
    settled: Condvar,
}

pub struct MetadataDictionary {
    source: Arc<dyn NomenclatureSource>,
    config: DictionaryConfig,
    slots: Mutex<IndexMap<String, Arc<VersionSlot>>>,
}

impl MetadataDictionary {
    pub fn new(source: Arc<dyn NomenclatureSource>, config: DictionaryConfig) -> Self {
        Self {
            source,
            config: config.normalized(),
            slots: Mutex::new(IndexMap::new()),
        }
    }

    /// Dictionary over flat files under `config.data_root`.
    pub fn from_config(config: DictionaryConfig) -> Self {
        let source = Arc::new(FileSystemSource::new(config.data_root.clone()));
        Self::new(source, config)
    }

    pub fn config(&self) -> &DictionaryConfig {
        &self.config
    }

    pub fn available_versions(&self) -> HlaResult<Vec<String>> {
        self.source.available_versions()
    }

    /// Slot for `version`, marked most recently used.
    fn slot(&self, version: &str) -> Arc<VersionSlot> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.shift_remove(version) {
            slots.insert(version.to_string(), Arc::clone(&slot));
            return slot;
        }
        let slot = Arc::new(VersionSlot::default());
        slots.insert(version.to_string(), Arc::clone(&slot));
        slot
    }

    fn load_and_build(&self, version: &str) -> HlaResult<Arc<HlaMetadataIndex>> {
        let dataset = self.source.get_dataset(version)?;
        HlaMetadataIndex::build(&dataset, &self.config).map(Arc::new)
    }

    /// Return the index for `version`, building it on first request.
    ///
    /// A version whose first build failed stays failed until [`retry`]; its
    /// callers get `BuildFailed`. After a failed rebuild the previous index
    /// keeps being served.
    ///
    /// [`retry`]: MetadataDictionary::retry
    pub fn build_or_get_index(&self, version: &str) -> HlaResult<Arc<HlaMetadataIndex>> {
        let slot = self.slot(version);
        {
            let mut state = slot.state.lock();
            loop {
                match &*state {
                    SlotState::Ready(index) => {
                        debug!("Index cache hit for version {}", version);
                        return Ok(Arc::clone(index));
                    }
                    SlotState::Rebuilding { previous } => return Ok(Arc::clone(previous)),
                    SlotState::Failed {
                        previous: Some(previous),
                        ..
                    } => return Ok(Arc::clone(previous)),
                    SlotState::Failed {
                        reason,
                        previous: None,
                    } => {
                        return Err(HlaError::BuildFailed {
                            version: version.to_string(),
                            reason: reason.clone(),
                        })
                    }
                    SlotState::Building => {}
                    SlotState::Unbuilt => break,
                }
                debug!("Waiting for in-flight build of version {}", version);
                slot.settled.wait(&mut state);
            }
            *state = SlotState::Building;
        }
        self.run_build(version, &slot, None)
    }

    /// Build outside the slot lock, then publish the outcome and wake waiters.
    /// A panicking source or build settles the slot as `Failed` like any
    /// other error, so waiters are never left on a `Building` slot.
    fn run_build(
        &self,
        version: &str,
        slot: &VersionSlot,
        previous: Option<Arc<HlaMetadataIndex>>,
    ) -> HlaResult<Arc<HlaMetadataIndex>> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.load_and_build(version)))
            .unwrap_or_else(|payload| {
                Err(HlaError::BuildFailed {
                    version: version.to_string(),
                    reason: format!("index build panicked: {}", panic_message(payload.as_ref())),
                })
            });
        {
            let mut state = slot.state.lock();
            *state = match &result {
                Ok(index) => SlotState::Ready(Arc::clone(index)),
                Err(err) => {
                    warn!("Index build failed for version {}: {}", version, err);
                    SlotState::Failed {
                        reason: err.to_string(),
                        previous,
                    }
                }
            };
            slot.settled.notify_all();
        }
        if result.is_ok() {
            self.evict_over_capacity();
        }
        result
    }

    /// Build `version` again from its source. Readers keep the current index
    /// until the new one is ready; on failure the slot turns `Failed` and the
    /// old index stays available.
    pub fn rebuild(&self, version: &str) -> HlaResult<Arc<HlaMetadataIndex>> {
        let slot = self.slot(version);
        let previous = {
            let mut state = slot.state.lock();
            while state.is_in_flight() {
                slot.settled.wait(&mut state);
            }
            let previous = match std::mem::take(&mut *state) {
                SlotState::Ready(index) => Some(index),
                SlotState::Failed { previous, .. } => previous,
                _ => None,
            };
            *state = match &previous {
                Some(index) => SlotState::Rebuilding {
                    previous: Arc::clone(index),
                },
                None => SlotState::Building,
            };
            previous
        };
        info!("Rebuilding HLA metadata index for version {}", version);
        self.run_build(version, &slot, previous)
    }

    /// Rebuild a failed version; any other state behaves like
    /// [`build_or_get_index`](MetadataDictionary::build_or_get_index).
    pub fn retry(&self, version: &str) -> HlaResult<Arc<HlaMetadataIndex>> {
        if self.state(version) == BuildState::Failed {
            return self.rebuild(version);
        }
        self.build_or_get_index(version)
    }

    pub fn state(&self, version: &str) -> BuildState {
        let slot = self.slots.lock().get(version).cloned();
        match slot {
            Some(slot) => slot.state.lock().build_state(),
            None => BuildState::Unbuilt,
        }
    }

    /// Versions holding a `Ready` index, least recently used first.
    pub fn cached_versions(&self) -> Vec<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.state.lock().build_state() == BuildState::Ready)
            .map(|(version, _)| version.clone())
            .collect()
    }

    /// Drop a version's slot. In-flight builds are never evicted. Callers
    /// already holding the index keep it.
    pub fn evict(&self, version: &str) -> bool {
        let mut slots = self.slots.lock();
        let in_flight = match slots.get(version) {
            Some(slot) => slot.state.lock().is_in_flight(),
            None => return false,
        };
        if in_flight {
            return false;
        }
        slots.shift_remove(version);
        info!("Evicted HLA metadata index for version {}", version);
        true
    }

    fn evict_over_capacity(&self) {
        let mut slots = self.slots.lock();
        let ready: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.state.lock().build_state() == BuildState::Ready)
            .map(|(version, _)| version.clone())
            .collect();
        let excess = ready.len().saturating_sub(self.config.max_cached_versions);
        for version in ready.into_iter().take(excess) {
            slots.shift_remove(&version);
            info!("Evicted HLA metadata index for version {}", version);
        }
    }

    // -----------------------------------------------------------------------
    // Versioned lookups
    // -----------------------------------------------------------------------

    pub fn lookup(
        &self,
        version: &str,
        locus: Locus,
        raw_typing: &str,
    ) -> HlaResult<Option<MatchingDictionaryEntry>> {
        self.build_or_get_index(version)?.lookup(locus, raw_typing)
    }

    pub fn expand_ambiguous_typing(
        &self,
        version: &str,
        locus: Locus,
        raw_typing: &str,
    ) -> HlaResult<Vec<String>> {
        self.build_or_get_index(version)?
            .expand_ambiguous_typing(locus, raw_typing)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
