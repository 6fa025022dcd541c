//! Definition of a channel, one ring buffer per producer lane.

use crate::{
    AppendOutcome, ChannelConfig, ConfigError, PublishError, Publisher, Record, RingBuffer,
    lane_name,
};
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Different types of error that can happen when a [`Channel`] is opened.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Invalid channel configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot allocate memory for lane {lane}: {source}")]
    Alloc {
        lane: usize,
        #[source]
        source: io::Error,
    },

    #[error("Cannot publish lane {lane}: {source}")]
    Publish {
        lane: usize,
        #[source]
        source: PublishError,
    },
}

/// One producer's ring buffer along with its published handle.
struct Lane<H> {
    buffer: Arc<RingBuffer>,
    handle: H,
}

/// A set of lanes that stream records of type R to consumers.
///
/// * Opening either succeeds with every lane allocated and published, or fails
///   leaving nothing published. Lanes are published one at a time, so a
///   concurrent consumer may find some lanes missing while the channel opens.
/// * Writes are fire and forget. A write that cannot be buffered is dropped,
///   producers never block and never learn about drops.
/// * Each lane must only be written to by its own producer. Concurrent writes to
///   the same lane are safe, but all except one of them are dropped.
/// * Closing, or dropping, the channel unpublishes every lane.
pub struct Channel<R, P: Publisher> {
    publisher: P,
    lanes: Vec<Lane<P::Handle>>,
    phantom: PhantomData<fn(&R)>,
}

impl<R: Record, P: Publisher> Channel<R, P> {
    /// Open a new channel.
    ///
    /// Allocates one ring buffer per lane and publishes it under
    /// `<base_name><lane index>`. If any lane fails, lanes created so far are
    /// unpublished and released before the error is returned.
    ///
    /// # Arguments
    ///
    /// * `config` - Geometry and naming of lanes.
    /// * `publisher` - Adapter that makes lanes externally readable.
    pub fn open(config: &ChannelConfig, publisher: P) -> Result<Self, OpenError> {
        config.validate::<R>()?;

        let mut channel = Self {
            publisher,
            lanes: Vec::with_capacity(config.lanes),
            phantom: PhantomData,
        };

        for lane in 0..config.lanes {
            // Dropping the partially open channel rolls back created lanes.
            let lane = channel.open_lane(config, lane).inspect_err(|error| {
                tracing::warn!(%error, "Rolling back partially opened channel");
            })?;
            channel.lanes.push(lane);
        }

        tracing::info!(
            lanes = config.lanes,
            capacity = config.capacity,
            sub_buffers = config.sub_buffers,
            base_name = %config.base_name,
            "Opened channel"
        );

        Ok(channel)
    }

    fn open_lane(
        &self,
        config: &ChannelConfig,
        lane: usize,
    ) -> Result<Lane<P::Handle>, OpenError> {
        let buffer = RingBuffer::try_new(config.capacity, config.sub_buffers)
            .map(Arc::new)
            .map_err(|source| OpenError::Alloc { lane, source })?;

        let name = lane_name(&config.base_name, lane);
        let handle = self
            .publisher
            .create(lane, &name, Arc::clone(&buffer))
            .map_err(|source| OpenError::Publish { lane, source })?;

        Ok(Lane { buffer, handle })
    }

    /// Write a record into a lane.
    ///
    /// Silently dropped if the lane does not exist, the channel is closed or the
    /// lane's ring buffer has no space left.
    ///
    /// # Arguments
    ///
    /// * `lane` - Index of the lane of the calling producer.
    /// * `record` - Record to write.
    #[inline]
    pub fn write(&self, lane: usize, record: &R) {
        let Some(lane) = self.lanes.get(lane) else {
            tracing::trace!(lane, "Dropped write to unknown lane");
            return;
        };

        if lane.buffer.append(record.encode().as_ref()) == AppendOutcome::Dropped {
            tracing::trace!("Dropped write under buffer pressure");
        }
    }

    /// Seal the active sub-buffer of every lane, if it holds any records.
    pub fn flush(&self) {
        for lane in &self.lanes {
            lane.buffer.flush();
        }
    }

    /// Ring buffer of a lane, if the lane exists and the channel is open.
    pub fn lane(&self, lane: usize) -> Option<&Arc<RingBuffer>> {
        self.lanes.get(lane).map(|lane| &lane.buffer)
    }

    /// Number of open lanes, 0 once closed.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// true if the channel has not been closed yet.
    pub fn is_open(&self) -> bool {
        !self.lanes.is_empty()
    }

}

impl<R, P: Publisher> Channel<R, P> {
    /// Unpublish and release every lane.
    ///
    /// Closing an already closed channel is a no-op.
    pub fn close(&mut self) {
        if self.lanes.is_empty() {
            return;
        }

        // Unpublish in reverse order of creation.
        let lanes = self.lanes.len();
        while let Some(lane) = self.lanes.pop() {
            self.publisher.remove(lane.handle);
        }

        tracing::info!(lanes, "Closed channel");
    }
}

impl<R, P: Publisher> fmt::Debug for Channel<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("lanes", &self.lanes.len())
            .finish_non_exhaustive()
    }
}

impl<R, P: Publisher> Drop for Channel<R, P> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ARP_RECORD_SIZE, ArpRecord, OP_REPLY, OP_REQUEST, Registry, Source, decode_all};
    use parking_lot::Mutex;
    use rstest::rstest;
    use std::io::Read;

    fn arp(opcode: u16) -> ArpRecord {
        ArpRecord {
            opcode,
            ..Default::default()
        }
    }

    /// Publisher that fails to publish a specific lane and remembers everything.
    #[derive(Default)]
    struct FlakyPublisher {
        fail_on: Option<usize>,
        published: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    impl Publisher for FlakyPublisher {
        type Handle = String;

        fn create(
            &self,
            lane: usize,
            name: &str,
            _buffer: Arc<RingBuffer>,
        ) -> Result<Self::Handle, PublishError> {
            if self.fail_on == Some(lane) {
                return Err(PublishError::AlreadyExists(name.to_string()));
            }

            self.published.lock().push(name.to_string());
            Ok(name.to_string())
        }

        fn remove(&self, handle: Self::Handle) {
            self.removed.lock().push(handle);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    fn open_publishes_every_lane(#[case] lanes: usize) -> Result<(), OpenError> {
        let registry = Registry::new();
        let config = ChannelConfig::new(lanes, 8192, 2);
        let channel = Channel::<ArpRecord, _>::open(&config, registry.clone())?;

        assert!(channel.is_open());
        assert_eq!(channel.lane_count(), lanes);
        let expected: Vec<_> = (0..lanes).map(|lane| lane_name("cpu_arp", lane)).collect();
        assert_eq!(registry.names(), expected);

        drop(channel);
        assert!(registry.names().is_empty());
        Ok(())
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    #[case(3)]
    fn open_rolls_back_on_publish_failure(#[case] fail_on: usize) {
        let publisher = FlakyPublisher {
            fail_on: Some(fail_on),
            ..Default::default()
        };

        let config = ChannelConfig::new(4, 8192, 2);
        match Channel::<ArpRecord, _>::open(&config, &publisher) {
            Err(OpenError::Publish { lane, .. }) => assert_eq!(lane, fail_on),
            other => panic!("Unexpected result: {other:?}"),
        }

        // Everything that was published got removed, newest first.
        let mut published = publisher.published.lock().clone();
        assert_eq!(published.len(), fail_on);
        published.reverse();
        assert_eq!(*publisher.removed.lock(), published);
    }

    #[test]
    fn open_rejects_invalid_config() {
        let registry = Registry::new();
        let config = ChannelConfig::new(2, 8192, 1);

        match Channel::<ArpRecord, _>::open(&config, registry.clone()) {
            Err(OpenError::Config(ConfigError::TooFewSubBuffers(1))) => {}
            other => panic!("Unexpected result: {other:?}"),
        }

        assert!(registry.names().is_empty());
    }

    #[test]
    fn open_rolls_back_on_name_collision() {
        let registry = Registry::new();
        let squatter = Arc::new(RingBuffer::try_new(256, 2).unwrap());
        let handle = registry.create(9, "cpu_arp1", squatter).unwrap();

        let config = ChannelConfig::new(3, 8192, 2);
        assert!(matches!(
            Channel::<ArpRecord, _>::open(&config, registry.clone()),
            Err(OpenError::Publish { lane: 1, .. })
        ));

        // Only the pre-existing handle remains.
        assert_eq!(registry.names(), vec![handle]);
    }

    #[test]
    fn write_then_read_lane() -> Result<(), Box<dyn std::error::Error>> {
        let registry = Registry::new();
        let config = ChannelConfig::new(2, 8192, 2);
        let channel = Channel::open(&config, registry.clone())?;

        channel.write(0, &arp(OP_REQUEST));
        channel.write(0, &arp(OP_REPLY));

        let mut bytes = Vec::new();
        registry.open("cpu_arp0")?.read_to_end(&mut bytes)?;
        let records = decode_all::<ArpRecord>(&bytes)?;
        assert_eq!(records, vec![arp(OP_REQUEST), arp(OP_REPLY)]);

        let mut bytes = Vec::new();
        registry.open("cpu_arp1")?.read_to_end(&mut bytes)?;
        assert!(bytes.is_empty());
        Ok(())
    }

    #[test]
    fn writes_are_fire_and_forget() -> Result<(), OpenError> {
        let config = ChannelConfig::new(1, 2 * ARP_RECORD_SIZE, 2);
        let mut channel = Channel::open(&config, Registry::new())?;

        // One record per sub-buffer, the second sub-buffer can't be rotated into.
        for _ in 0..5 {
            channel.write(0, &arp(OP_REQUEST));
        }

        // Unknown lanes are silently ignored.
        channel.write(7, &arp(OP_REQUEST));

        let stats = channel.lane(0).map(|ring| ring.stats()).unwrap_or_default();
        assert_eq!(stats.written, 2);
        assert_eq!(stats.dropped, 3);

        // Writes after close go nowhere.
        channel.close();
        channel.write(0, &arp(OP_REQUEST));
        assert!(channel.lane(0).is_none());
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<(), OpenError> {
        let publisher = FlakyPublisher::default();
        let config = ChannelConfig::new(3, 8192, 2);
        let mut channel = Channel::<ArpRecord, _>::open(&config, &publisher)?;

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        drop(channel);

        assert_eq!(publisher.removed.lock().len(), 3);
        Ok(())
    }

    #[test]
    fn flush_seals_every_lane() -> Result<(), OpenError> {
        let registry = Registry::new();
        let config = ChannelConfig::new(1, 8192, 2);
        let channel = Channel::open(&config, registry.clone())?;
        channel.write(0, &arp(OP_REQUEST));
        channel.flush();

        let stats = channel.lane(0).map(|ring| ring.stats()).unwrap_or_default();
        assert_eq!(stats.produced, 1);
        Ok(())
    }
}
