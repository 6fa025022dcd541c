//! Definition of the consumer loop that drains lanes and recovers records.

use crate::{ConfigError, ConsumerConfig, FramingError, Record, decode_all, lane_name};
use std::fs::File;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::path::PathBuf;
use thiserror::Error;

/// Opens lane handles by name, the consumer's view of the environment.
pub trait Source {
    /// Read handle of a single lane.
    type Reader: Read;

    /// Open the handle with this name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the handle, see [`lane_name`].
    fn open(&self, name: &str) -> io::Result<Self::Reader>;
}

impl<S: Source> Source for &S {
    type Reader = S::Reader;

    fn open(&self, name: &str) -> io::Result<Self::Reader> {
        (**self).open(name)
    }
}

/// Opens lane handles as files, e.g. relay files under debugfs.
///
/// Names are taken as paths, relative names are resolved under `root`.
#[derive(Debug, Clone, Default)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    /// Create a new file system source.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory relative names are resolved against.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Source for FsSource {
    type Reader = File;

    fn open(&self, name: &str) -> io::Result<Self::Reader> {
        File::open(self.root.join(name))
    }
}

/// Different types of error that can happen when a lane is drained.
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("Open failure for {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Read failure for {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Broken records from {name}: {source}")]
    Framing {
        name: String,
        #[source]
        source: FramingError,
    },
}

/// Outcome of draining a single lane during a pass.
#[derive(Debug)]
pub struct LaneReport {
    /// Index of the lane.
    pub lane: usize,

    /// Number of records decoded and emitted.
    pub records: usize,

    /// Error that ended this lane's turn, if any.
    pub error: Option<LaneError>,
}

/// Outcome of a pass over every lane.
#[derive(Debug, Default)]
pub struct PassReport {
    /// One entry per lane, in lane order.
    pub lanes: Vec<LaneReport>,
}

impl PassReport {
    /// Total number of records emitted during the pass.
    pub fn records(&self) -> usize {
        self.lanes.iter().map(|lane| lane.records).sum()
    }

    /// Lanes that failed during the pass.
    pub fn errors(&self) -> impl Iterator<Item = &LaneReport> {
        self.lanes.iter().filter(|lane| lane.error.is_some())
    }
}

/// Drains every lane of a channel from outside the producers.
///
/// Each lane is opened, read once into a bounded buffer, validated, decoded and
/// closed. Failure on one lane never stops the others from being drained.
#[derive(Debug)]
pub struct Consumer<R, S> {
    source: S,
    config: ConsumerConfig,
    buf: Vec<u8>,
    phantom: PhantomData<fn() -> R>,
}

impl<R: Record, S: Source> Consumer<R, S> {
    /// Create a new consumer.
    ///
    /// # Arguments
    ///
    /// * `config` - Lanes to drain and size of reads.
    /// * `source` - Where lane handles are opened from.
    pub fn new(config: ConsumerConfig, source: S) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            buf: vec![0; config.records_per_read * R::SIZE],
            config,
            source,
            phantom: PhantomData,
        })
    }

    /// Number of lanes drained per pass.
    pub fn lanes(&self) -> usize {
        self.config.lanes
    }

    /// Drain every lane once, emitting records in stream order per lane.
    ///
    /// # Arguments
    ///
    /// * `emit` - Called with the lane index and each decoded record.
    pub fn drain<F: FnMut(usize, R)>(&mut self, mut emit: F) -> PassReport {
        let mut report = PassReport::default();

        for lane in 0..self.config.lanes {
            let (records, error) = match self.drain_lane(lane, |record| emit(lane, record)) {
                Ok(records) => (records, None),
                Err(error) => {
                    tracing::warn!(lane, %error, "Skipping lane");
                    (0, Some(error))
                }
            };

            report.lanes.push(LaneReport {
                lane,
                records,
                error,
            });
        }

        report
    }

    /// Drain a single lane once.
    ///
    /// * Performs exactly one bounded read.
    /// * If the number of bytes read is not a multiple of the record size, the
    ///   whole read is discarded and no record is emitted.
    /// * Returns the number of records emitted.
    ///
    /// # Arguments
    ///
    /// * `lane` - Index of the lane to drain.
    /// * `emit` - Called with each decoded record, in stream order.
    pub fn drain_lane<F: FnMut(R)>(
        &mut self,
        lane: usize,
        mut emit: F,
    ) -> Result<usize, LaneError> {
        let name = lane_name(&self.config.base_name, lane);

        let mut reader = match self.source.open(&name) {
            Ok(reader) => reader,
            Err(source) => return Err(LaneError::Open { name, source }),
        };

        let read = match reader.read(&mut self.buf) {
            Ok(read) => read,
            Err(source) => return Err(LaneError::Read { name, source }),
        };

        // Handle is closed here, before any record is handed out.
        drop(reader);

        let records = match decode_all::<R>(&self.buf[..read]) {
            Ok(records) => records,
            Err(source) => return Err(LaneError::Framing { name, source }),
        };

        tracing::debug!(lane, bytes = read, records = records.len(), "Drained lane");

        let count = records.len();
        records.into_iter().for_each(&mut emit);
        Ok(count)
    }
}
