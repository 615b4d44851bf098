//! In-memory entity storage.
//!
//! Each entity instance lives behind its own lock, so commands against the
//! same entity serialize while commands against different entities run
//! independently. Mutations are transactional: the updater runs against a
//! clone and the result is written back only when it returns `Ok`, so no
//! error path ever commits partial state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;

use crate::billing::BilledService;
use crate::config::CoreConfig;
use crate::dispatch::ReportDispatch;
use crate::encounter::Encounter;
use crate::referral::Referral;
use crate::report::MedicalReport;
use crate::{CoreError, CoreResult};

pub(crate) struct EntityStore<T> {
    entity: &'static str,
    entries: RwLock<HashMap<Uuid, Arc<Mutex<T>>>>,
}

impl<T: Clone> EntityStore<T> {
    pub(crate) fn new(entity: &'static str) -> Self {
        Self {
            entity,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a new entity under its identity.
    ///
    /// A duplicate id means the id allocator handed out the same identity
    /// twice, which is an integrity failure rather than a user error.
    pub(crate) fn insert(&self, id: Uuid, value: T) -> CoreResult<()> {
        let mut entries = write_lock(&self.entries);
        if entries.contains_key(&id) {
            return Err(CoreError::SequenceIntegrity(format!(
                "duplicate {} id {}",
                self.entity, id
            )));
        }
        entries.insert(id, Arc::new(Mutex::new(value)));
        Ok(())
    }

    /// Returns a snapshot (clone) of the entity.
    pub(crate) fn snapshot(&self, id: Uuid) -> CoreResult<T> {
        let entry = self.entry(id)?;
        let guard = lock(&entry);
        Ok(guard.clone())
    }

    /// Runs a transactional mutation against the entity.
    ///
    /// The updater receives a clone; only when it returns `Ok` is the clone
    /// committed back. The entity's lock is held for the whole
    /// read-validate-commit cycle, so concurrent commands against the same
    /// entity serialize and the loser revalidates against the winner's
    /// committed state.
    pub(crate) fn update<R>(
        &self,
        id: Uuid,
        updater: impl FnOnce(&mut T) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let entry = self.entry(id)?;
        let mut guard = lock(&entry);

        let mut staged = guard.clone();
        let result = updater(&mut staged)?;
        *guard = staged;

        Ok(result)
    }

    /// Removes the entity, returning its final state.
    pub(crate) fn remove(&self, id: Uuid) -> CoreResult<T> {
        self.remove_where(id, |_| Ok(()))
    }

    /// Removes the entity after the guard approves its current state.
    ///
    /// The map's write lock is held across guard and removal, so no other
    /// command can slip a mutation in between.
    pub(crate) fn remove_where(
        &self,
        id: Uuid,
        guard: impl FnOnce(&T) -> CoreResult<()>,
    ) -> CoreResult<T> {
        let mut entries = write_lock(&self.entries);
        let entry = entries.get(&id).cloned().ok_or(CoreError::NotFound {
            entity: self.entity,
            id,
        })?;
        let value = {
            let locked = lock(&entry);
            guard(&locked)?;
            locked.clone()
        };
        entries.remove(&id);
        Ok(value)
    }

    /// Snapshots of every entity matching the predicate.
    pub(crate) fn filtered(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let entries = read_lock(&self.entries);
        let mut matches = Vec::new();
        for entry in entries.values() {
            let guard = lock(entry);
            if predicate(&guard) {
                matches.push(guard.clone());
            }
        }
        matches
    }

    fn entry(&self, id: Uuid) -> CoreResult<Arc<Mutex<T>>> {
        let entries = read_lock(&self.entries);
        entries.get(&id).cloned().ok_or(CoreError::NotFound {
            entity: self.entity,
            id,
        })
    }
}

// Mutations commit whole (clone-then-swap), so a poisoned lock still guards
// a consistent value and can be recovered rather than propagated.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<K, V>(lock: &RwLock<HashMap<K, V>>) -> std::sync::RwLockReadGuard<'_, HashMap<K, V>> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<K, V>(
    lock: &RwLock<HashMap<K, V>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<K, V>> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The durable record set behind the praxis services.
///
/// One instance is shared (via `Arc`) by every service; each entity family
/// gets its own store so cross-entity commands never contend on a global
/// lock.
pub struct CoreStores {
    pub(crate) encounters: EntityStore<Encounter>,
    pub(crate) billed_services: EntityStore<BilledService>,
    pub(crate) referrals: EntityStore<Referral>,
    pub(crate) reports: EntityStore<MedicalReport>,
    pub(crate) dispatches: EntityStore<ReportDispatch>,
    report_sequence: AtomicU64,
}

impl CoreStores {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            encounters: EntityStore::new("encounter"),
            billed_services: EntityStore::new("billed_service"),
            referrals: EntityStore::new("referral"),
            reports: EntityStore::new("report"),
            dispatches: EntityStore::new("dispatch"),
            report_sequence: AtomicU64::new(cfg.report_sequence_start()),
        }
    }

    /// Allocates the next report sequence number. Strictly increasing for
    /// the lifetime of the store; never reused, even when report creation
    /// later fails.
    pub(crate) fn next_report_sequence(&self) -> u64 {
        self.report_sequence.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Dummy {
        version: u64,
        label: String,
    }

    fn store() -> EntityStore<Dummy> {
        EntityStore::new("dummy")
    }

    #[test]
    fn insert_then_snapshot_round_trips() {
        let store = store();
        let id = Uuid::new_v4();
        store
            .insert(
                id,
                Dummy {
                    version: 1,
                    label: "one".into(),
                },
            )
            .expect("insert should succeed");

        let snap = store.snapshot(id).expect("snapshot should succeed");
        assert_eq!(snap.label, "one");
    }

    #[test]
    fn duplicate_insert_is_an_integrity_failure() {
        let store = store();
        let id = Uuid::new_v4();
        let value = Dummy {
            version: 1,
            label: "one".into(),
        };
        store.insert(id, value.clone()).expect("first insert");
        let err = store.insert(id, value).expect_err("second insert");
        assert!(matches!(err, CoreError::SequenceIntegrity(_)));
    }

    #[test]
    fn failed_update_commits_nothing() {
        let store = store();
        let id = Uuid::new_v4();
        store
            .insert(
                id,
                Dummy {
                    version: 1,
                    label: "before".into(),
                },
            )
            .expect("insert");

        let err = store
            .update(id, |dummy| {
                dummy.label = "after".into();
                dummy.version = 2;
                Err::<(), _>(CoreError::validation("label", "rejected"))
            })
            .expect_err("update should fail");
        assert!(matches!(err, CoreError::Validation(_)));

        let snap = store.snapshot(id).expect("snapshot");
        assert_eq!(snap.label, "before");
        assert_eq!(snap.version, 1);
    }

    #[test]
    fn successful_update_commits_whole() {
        let store = store();
        let id = Uuid::new_v4();
        store
            .insert(
                id,
                Dummy {
                    version: 1,
                    label: "before".into(),
                },
            )
            .expect("insert");

        store
            .update(id, |dummy| {
                dummy.label = "after".into();
                dummy.version += 1;
                Ok(())
            })
            .expect("update should succeed");

        let snap = store.snapshot(id).expect("snapshot");
        assert_eq!(snap.label, "after");
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn missing_ids_surface_not_found() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.snapshot(id).expect_err("missing"),
            CoreError::NotFound { entity: "dummy", .. }
        ));
        assert!(matches!(
            store.remove(id).expect_err("missing"),
            CoreError::NotFound { .. }
        ));
    }

    #[test]
    fn guarded_removal_leaves_rejected_entities_in_place() {
        let store = store();
        let id = Uuid::new_v4();
        store
            .insert(
                id,
                Dummy {
                    version: 1,
                    label: "keep".into(),
                },
            )
            .expect("insert");

        let err = store
            .remove_where(id, |_| Err(CoreError::validation("label", "not removable")))
            .expect_err("guard should reject");
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(store.snapshot(id).is_ok(), "entity must survive a rejected removal");

        store
            .remove_where(id, |_| Ok(()))
            .expect("approved removal should succeed");
        assert!(store.snapshot(id).is_err());
    }

    #[test]
    fn filtered_returns_matching_snapshots() {
        let store = store();
        for label in ["a", "b", "a"] {
            store
                .insert(
                    Uuid::new_v4(),
                    Dummy {
                        version: 1,
                        label: label.into(),
                    },
                )
                .expect("insert");
        }

        let matches = store.filtered(|d| d.label == "a");
        assert_eq!(matches.len(), 2);
    }
}
