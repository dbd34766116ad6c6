use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Devices already announced to the broker during this process lifetime.
///
/// Reads take a shared lock and run in parallel; marking takes the exclusive lock. Entries
/// are never evicted, so a device stays announced until the process exits.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    announced: RwLock<HashMap<String, bool>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `device_id` has been marked announced.
    pub fn is_announced(&self, device_id: &str) -> bool {
        self.announced
            .read()
            .get(device_id)
            .copied()
            .unwrap_or(false)
    }

    /// Mark `device_id` announced. Marking twice is harmless.
    pub fn mark_announced(&self, device_id: &str) {
        let mut announced = self.announced.write();
        if announced.insert(device_id.to_string(), true).is_none() {
            debug!(device_id, total = announced.len(), "device marked announced");
        }
    }

    /// Atomically mark `device_id` and return whether it was already announced.
    ///
    /// The first call for a device returns `false`; every later call returns `true`.
    pub fn check_and_mark_announced(&self, device_id: &str) -> bool {
        let mut announced = self.announced.write();
        let previous = announced.insert(device_id.to_string(), true);
        previous.unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.announced.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.announced.read().is_empty()
    }

    /// Sorted snapshot of the announced device ids.
    pub fn announced_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .announced
            .read()
            .iter()
            .filter(|(_, announced)| **announced)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_check_and_mark_first_call_false_then_true() {
        let reg = DeviceRegistry::new();
        assert!(!reg.check_and_mark_announced("867322035135813"));
        for _ in 0..5 {
            assert!(reg.check_and_mark_announced("867322035135813"));
        }
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_separate_read_and_mark() {
        let reg = DeviceRegistry::new();
        assert!(reg.is_empty());
        assert!(!reg.is_announced("a"));
        reg.mark_announced("a");
        reg.mark_announced("a");
        assert!(reg.is_announced("a"));
        assert!(!reg.is_announced("b"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_announced_devices_snapshot_sorted() {
        let reg = DeviceRegistry::new();
        reg.mark_announced("c");
        reg.mark_announced("a");
        assert!(!reg.check_and_mark_announced("b"));
        assert_eq!(reg.announced_devices(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_concurrent_check_and_mark_has_single_winner() {
        let reg = Arc::new(DeviceRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.check_and_mark_announced("shared"))
            })
            .collect();
        let first_seen = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|already| !already)
            .count();
        assert_eq!(first_seen, 1);
        assert!(reg.is_announced("shared"));
    }
}
