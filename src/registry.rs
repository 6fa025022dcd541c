//! In-memory namespace of published lanes.

use crate::{LaneReader, PublishError, Publisher, RingBuffer, Source};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

/// An in-memory stand-in for a virtual filesystem.
///
/// Publishing a lane makes it openable by name, removing it makes the name
/// disappear. Readers already holding a [`LaneReader`] keep reading from the
/// ring buffer after its name is removed.
///
/// Cloning a registry yields another reference to the same namespace, so the
/// producer side can publish into it while the consumer side opens from it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<BTreeMap<String, Arc<RingBuffer>>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently published, in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// true if a handle with this name is published.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }
}

impl Publisher for Registry {
    type Handle = String;

    fn create(
        &self,
        lane: usize,
        name: &str,
        buffer: Arc<RingBuffer>,
    ) -> Result<Self::Handle, PublishError> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(PublishError::AlreadyExists(name.to_string()));
        }

        entries.insert(name.to_string(), buffer);
        tracing::debug!(lane, name, "Published lane");
        Ok(name.to_string())
    }

    fn remove(&self, handle: Self::Handle) {
        if self.entries.write().remove(&handle).is_none() {
            tracing::warn!(name = %handle, "Removing a lane that was not published");
        }
    }
}

impl Source for Registry {
    type Reader = LaneReader;

    fn open(&self, name: &str) -> io::Result<Self::Reader> {
        self.entries
            .read()
            .get(name)
            .map(RingBuffer::reader)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("No such lane {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppendOutcome;
    use std::io::Read;
    use tracing_test::traced_test;

    fn buffer() -> Arc<RingBuffer> {
        Arc::new(RingBuffer::try_new(256, 2).unwrap())
    }

    #[test]
    fn publish_open_remove() -> io::Result<()> {
        let registry = Registry::new();
        let ring = buffer();

        let handle = registry.create(0, "cpu_arp0", Arc::clone(&ring)).unwrap();
        assert_eq!(registry.names(), vec!["cpu_arp0".to_string()]);

        assert_eq!(ring.append(b"hello"), AppendOutcome::Written);
        let mut reader = registry.open("cpu_arp0")?;

        registry.remove(handle);
        assert!(!registry.contains("cpu_arp0"));

        // Open handles outlive the name.
        let mut buf = [0; 16];
        assert_eq!(reader.read(&mut buf)?, 5);
        assert_eq!(&buf[..5], b"hello");

        // But the name is gone.
        let error = registry.open("cpu_arp0").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = Registry::new();
        registry.create(0, "cpu_arp0", buffer()).unwrap();

        match registry.create(1, "cpu_arp0", buffer()) {
            Err(PublishError::AlreadyExists(name)) => assert_eq!(name, "cpu_arp0"),
            other => panic!("Unexpected result: {other:?}"),
        }
    }

    #[traced_test]
    #[test]
    fn removing_unknown_handle_is_logged() {
        Registry::new().remove("cpu_arp7".to_string());
        assert!(logs_contain("Removing a lane that was not published"));
    }
}
