//! The boundary between the engine and the object a graph is attached to.
//!
//! The engine does not know how the host stores state or schedules work; it
//! only requires the operations below. [`InMemoryHost`] is a complete
//! stand-alone implementation used by the tests and the CLI.

use crate::value::{Exception, Value};
use ahash::AHashMap;

/// Host owner interface consumed by the interpreter.
///
/// All methods are called from a single thread; the scheduler serializes
/// resumption, so implementations need no internal synchronization.
pub trait Host {
    /// Resolves a member path (a variable or host property).
    fn get_member(&self, path: &str) -> Option<Value>;

    /// Writes a variable on the host.
    fn set_variable(&mut self, name: &str, value: Value);

    /// Acquires the named lock for the duration of a Lock body. The engine
    /// guarantees a matching `release_lock` on every exit path.
    fn acquire_lock(&mut self, key: &str);

    fn release_lock(&mut self, key: &str);

    /// Opens a scoped resource for a Using body, returning its handle. The
    /// engine guarantees a matching `dispose_resource` on every exit path.
    fn open_resource(&mut self, descriptor: &Value) -> Result<Value, Exception>;

    fn dispose_resource(&mut self, handle: &Value);

    /// Materializes the sequence a Foreach node iterates.
    ///
    /// The sequence must be finite; the engine materializes it once at
    /// iteration start and never restarts it mid-iteration. Supplying an
    /// unbounded source is a contract violation by the caller.
    fn sequence(&mut self, source: &Value) -> Result<Vec<Value>, Exception> {
        match source {
            Value::List(items) => Ok(items.clone()),
            other => Err(Exception::new(
                "InvalidSequence",
                format!("value '{}' is not iterable", other),
            )),
        }
    }
}

/// A self-contained host backed by hash maps.
///
/// Tracks lock depth and open resources so tests can assert the
/// release-on-all-exit-paths discipline.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    variables: AHashMap<String, Value>,
    locks: AHashMap<String, u32>,
    next_resource: u64,
    open_resources: AHashMap<u64, Value>,
    disposed: Vec<u64>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: &str, value: Value) -> Self {
        self.variables.insert(name.to_string(), value);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Current acquisition depth of a lock. Zero when fully released.
    pub fn lock_depth(&self, key: &str) -> u32 {
        self.locks.get(key).copied().unwrap_or(0)
    }

    /// Handles of resources that were opened but not yet disposed.
    pub fn open_resource_count(&self) -> usize {
        self.open_resources.len()
    }

    pub fn disposed_resources(&self) -> &[u64] {
        &self.disposed
    }
}

impl Host for InMemoryHost {
    fn get_member(&self, path: &str) -> Option<Value> {
        self.variables.get(path).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn acquire_lock(&mut self, key: &str) {
        *self.locks.entry(key.to_string()).or_insert(0) += 1;
    }

    fn release_lock(&mut self, key: &str) {
        if let Some(depth) = self.locks.get_mut(key) {
            *depth = depth.saturating_sub(1);
        }
    }

    fn open_resource(&mut self, descriptor: &Value) -> Result<Value, Exception> {
        let handle = self.next_resource;
        self.next_resource += 1;
        self.open_resources.insert(handle, descriptor.clone());
        Ok(Value::Number(handle as f64))
    }

    fn dispose_resource(&mut self, handle: &Value) {
        if let Some(id) = handle.as_number() {
            let id = id as u64;
            if self.open_resources.remove(&id).is_some() {
                self.disposed.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_depth_tracks_acquire_release() {
        let mut host = InMemoryHost::new();
        host.acquire_lock("door");
        host.acquire_lock("door");
        assert_eq!(host.lock_depth("door"), 2);
        host.release_lock("door");
        assert_eq!(host.lock_depth("door"), 1);
        host.release_lock("door");
        assert_eq!(host.lock_depth("door"), 0);
    }

    #[test]
    fn default_sequence_rejects_non_lists() {
        let mut host = InMemoryHost::new();
        let err = host.sequence(&Value::Number(3.0)).unwrap_err();
        assert_eq!(err.type_name, "InvalidSequence");
    }

    #[test]
    fn resources_round_trip() {
        let mut host = InMemoryHost::new();
        let handle = host.open_resource(&Value::Str("file".into())).unwrap();
        assert_eq!(host.open_resource_count(), 1);
        host.dispose_resource(&handle);
        assert_eq!(host.open_resource_count(), 0);
        assert_eq!(host.disposed_resources().len(), 1);
    }
}
