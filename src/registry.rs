use parking_lot::RwLock;
use std::collections::HashMap;

/// Shared per-connection up/down registry.
///
/// The manager is the sole writer for its own connection name's slot; slots
/// are independent, so no cross-entry coordination is needed. Injected at
/// construction rather than living in a process-wide global, which keeps it
/// swappable for test doubles.
pub trait StatusRegistry: Send + Sync {
    /// Record the connectivity state for a connection name.
    fn set_status(&self, connection_name: &str, connected: bool);
}

/// Default in-memory registry backed by a shared map.
#[derive(Debug, Default)]
pub struct InMemoryStatusRegistry {
    entries: RwLock<HashMap<String, bool>>,
}

impl InMemoryStatusRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded state for a connection name, if any manager has
    /// reported one.
    pub fn get(&self, connection_name: &str) -> Option<bool> {
        self.entries.read().get(connection_name).copied()
    }

    /// Whether a connection name is currently recorded as up.
    pub fn is_connected(&self, connection_name: &str) -> bool {
        self.get(connection_name).unwrap_or(false)
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.entries.read().clone()
    }
}

impl StatusRegistry for InMemoryStatusRegistry {
    fn set_status(&self, connection_name: &str, connected: bool) {
        self.entries
            .write()
            .insert(connection_name.to_string(), connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let registry = InMemoryStatusRegistry::new();
        assert_eq!(registry.get("prices"), None);
        assert!(!registry.is_connected("prices"));

        registry.set_status("prices", true);
        assert_eq!(registry.get("prices"), Some(true));
        assert!(registry.is_connected("prices"));

        registry.set_status("prices", false);
        assert_eq!(registry.get("prices"), Some(false));
    }

    #[test]
    fn test_slots_are_independent() {
        let registry = InMemoryStatusRegistry::new();
        registry.set_status("prices", true);
        registry.set_status("orders", false);

        assert!(registry.is_connected("prices"));
        assert!(!registry.is_connected("orders"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["prices"], true);
        assert_eq!(snapshot["orders"], false);
    }
}
