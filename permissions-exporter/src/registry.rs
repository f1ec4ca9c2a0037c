//! Registries the reconciler publishes permission samples into.
//!
//! A registry owns its own locking: samples may be set and removed by the
//! cycle driver while HTTP scrapes read the registry concurrently.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{ExporterError, Result};
use crate::record::LabelKey;

/// Name of the published gauge family.
pub const PERMISSION_METRIC: &str = "mysql_permission";

/// Help text of the published gauge family.
pub const PERMISSION_HELP: &str = "Permissions";

/// Label names of the published gauge family, in key order.
pub const PERMISSION_LABELS: [&str; 4] = ["user", "host", "db", "permission"];

/// Sink for permission samples.
pub trait PermissionRegistry: Send + Sync {
    /// Creates or overwrites the sample for `key`.
    fn set_sample(&self, key: &LabelKey, value: i64) -> Result<()>;

    /// Removes the sample for `key`. Returns `false` if there was none.
    fn remove_sample(&self, key: &LabelKey) -> Result<bool>;
}

/// `mysql_permission` gauge family backed by a Prometheus registry.
#[derive(Clone)]
pub struct PrometheusPermissionRegistry {
    registry: Registry,
    gauge: IntGaugeVec
}

impl PrometheusPermissionRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let gauge = IntGaugeVec::new(
            Opts::new(PERMISSION_METRIC, PERMISSION_HELP),
            &PERMISSION_LABELS
        )?;
        registry.register(Box::new(gauge.clone()))?;

        Ok(Self { registry, gauge })
    }

    /// Encodes the gauge family in Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| ExporterError::RegistryUpdate(format!("Failed to encode: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| ExporterError::RegistryUpdate(format!("Failed to encode: {e}")))
    }
}

impl PermissionRegistry for PrometheusPermissionRegistry {
    fn set_sample(&self, key: &LabelKey, value: i64) -> Result<()> {
        self.gauge
            .get_metric_with_label_values(&key.label_values())?
            .set(value);
        Ok(())
    }

    fn remove_sample(&self, key: &LabelKey) -> Result<bool> {
        match self.gauge.remove_label_values(&key.label_values()) {
            Ok(()) => Ok(true),
            Err(e @ prometheus::Error::InconsistentCardinality { .. }) => Err(e.into()),
            // Any other error means the label set is not registered.
            Err(_) => Ok(false)
        }
    }
}

/// A registry mutation, as observed by [`MemoryRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryOp {
    Set(LabelKey, i64),
    Remove(LabelKey)
}

/// In-process registry that keeps samples in a map and journals every
/// mutation in order.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    samples: RwLock<BTreeMap<LabelKey, i64>>,
    journal: Mutex<Vec<RegistryOp>>
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LabelKey) -> Option<i64> {
        self.samples.read().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Copy of the current samples.
    pub fn samples(&self) -> BTreeMap<LabelKey, i64> {
        self.samples.read().clone()
    }

    /// Drains the mutation journal.
    pub fn take_journal(&self) -> Vec<RegistryOp> {
        std::mem::take(&mut *self.journal.lock())
    }
}

impl PermissionRegistry for MemoryRegistry {
    fn set_sample(&self, key: &LabelKey, value: i64) -> Result<()> {
        self.samples.write().insert(key.clone(), value);
        self.journal.lock().push(RegistryOp::Set(key.clone(), value));
        Ok(())
    }

    fn remove_sample(&self, key: &LabelKey) -> Result<bool> {
        let removed = self.samples.write().remove(key).is_some();
        self.journal.lock().push(RegistryOp::Remove(key.clone()));
        Ok(removed)
    }
}
