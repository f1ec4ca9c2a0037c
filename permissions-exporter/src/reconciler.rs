//! Snapshot-to-registry reconciliation.
//!
//! Each cycle the [`Reconciler`] makes the registry match a new [`Snapshot`]:
//!
//! 1. every (record, privilege) sample of the snapshot is upserted, zero
//!    values included;
//! 2. keys published last cycle that the snapshot no longer produces are
//!    removed.
//!
//! Upserts always happen before removals, so a concurrent scrape sees a
//! superset of the current grants, never a subset.
//!
//! The published key set only advances when the whole cycle applied. A
//! failed cycle keeps the previous set; keys it managed to add are tracked as
//! orphans and swept by the next successful cycle.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::record::{LabelKey, Snapshot};
use crate::registry::PermissionRegistry;

/// Counts describing one applied reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records in the snapshot.
    pub records: usize,
    /// Samples written to the registry.
    pub samples_upserted: usize,
    /// Keys published now that were not published before.
    pub series_added: usize,
    /// Stale keys removed from the registry.
    pub series_removed: usize,
    /// Keys published after this cycle.
    pub series_published: usize
}

/// Owns the published label set and keeps a registry in line with it.
pub struct Reconciler<R: ?Sized> {
    registry: Arc<R>,
    published: BTreeSet<LabelKey>,
    orphaned: BTreeSet<LabelKey>
}

impl<R: PermissionRegistry + ?Sized> Reconciler<R> {
    /// A reconciler that has not published anything yet.
    pub fn new(registry: Arc<R>) -> Self {
        Self::with_published(registry, BTreeSet::new())
    }

    /// A reconciler resuming from a known published key set.
    pub fn with_published(registry: Arc<R>, published: BTreeSet<LabelKey>) -> Self {
        Self {
            registry,
            published,
            orphaned: BTreeSet::new()
        }
    }

    /// Keys published by the last successful cycle.
    pub fn published(&self) -> &BTreeSet<LabelKey> {
        &self.published
    }

    /// Keys written by failed cycles that are not part of [`Self::published`].
    pub fn orphaned(&self) -> &BTreeSet<LabelKey> {
        &self.orphaned
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    /// Applies `snapshot` to the registry.
    ///
    /// On error the published set is left as it was before the call.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> Result<ReconcileReport> {
        let mut wanted = BTreeSet::new();
        let mut samples_upserted = 0;

        for (key, value) in snapshot.samples() {
            if let Err(e) = self.registry.set_sample(&key, value) {
                warn!(key = %key, error = %e, "Failed to publish permission sample");
                self.remember_orphans(wanted);
                return Err(e);
            }
            samples_upserted += 1;
            wanted.insert(key);
        }

        let series_added = wanted.difference(&self.published).count();
        let stale: Vec<LabelKey> = self
            .published
            .union(&self.orphaned)
            .filter(|key| !wanted.contains(*key))
            .cloned()
            .collect();

        let mut series_removed = 0;
        for key in &stale {
            match self.registry.remove_sample(key) {
                Ok(true) => {
                    trace!(key = %key, "Removed stale permission sample");
                    series_removed += 1;
                }
                Ok(false) => debug!(key = %key, "Stale permission sample already absent"),
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to remove stale permission sample");
                    self.remember_orphans(wanted);
                    return Err(e);
                }
            }
        }

        let report = ReconcileReport {
            records: snapshot.len(),
            samples_upserted,
            series_added,
            series_removed,
            series_published: wanted.len()
        };

        self.published = wanted;
        self.orphaned.clear();

        Ok(report)
    }

    fn remember_orphans(&mut self, applied: BTreeSet<LabelKey>) {
        for key in applied {
            if !self.published.contains(&key) {
                self.orphaned.insert(key);
            }
        }
    }
}
