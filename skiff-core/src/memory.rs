//! In-memory store and operation tracker
//!
//! Useful for tests and for hosts that do not need persistence across
//! restarts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::operation::Operation;
use crate::traits::{Clock, KeyValueStore, OperationTracker, SystemClock, UpdateFn};
use crate::{Error, Result};

/// `KeyValueStore` held in a process-local map
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("memory store lock poisoned".to_string())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let values = self.values.read().map_err(poisoned)?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut values = self.values.write().map_err(poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().map_err(poisoned)?;
        values.remove(key);
        Ok(())
    }

    async fn update(&self, key: &str, apply: &UpdateFn<'_>) -> Result<()> {
        let mut values = self.values.write().map_err(poisoned)?;
        let next = apply(values.get(key).cloned())?;
        values.insert(key.to_string(), next);
        Ok(())
    }
}

/// `OperationTracker` keeping every operation in memory
pub struct InMemoryTracker {
    operations: Mutex<HashMap<String, Operation>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Look up an operation by id
    pub fn get(&self, id: &str) -> Option<Operation> {
        self.lock().get(id).cloned()
    }

    /// All operations, oldest first
    pub fn list(&self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self.lock().values().cloned().collect();
        ops.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        ops
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Operation>> {
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTracker")
            .field("operations", &self.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OperationTracker for InMemoryTracker {
    async fn start_operation(
        &self,
        id: &str,
        op_type: &str,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let op = Operation::started(id, op_type, description, metadata, self.clock.now_millis());
        debug!(id, op_type, "Operation started");
        self.lock().insert(id.to_string(), op);
    }

    async fn complete_operation(&self, id: &str) {
        let now = self.clock.now_millis();
        match self.lock().get_mut(id) {
            Some(op) => {
                if !op.complete(now) {
                    warn!(id, status = %op.status, "Operation already finished");
                }
            }
            None => warn!(id, "Completing unknown operation"),
        }
    }

    async fn fail_operation(&self, id: &str, error: &str) {
        let now = self.clock.now_millis();
        match self.lock().get_mut(id) {
            Some(op) => {
                if !op.fail(error, now) {
                    warn!(id, status = %op.status, "Operation already finished");
                }
            }
            None => warn!(id, "Failing unknown operation"),
        }
    }
}
