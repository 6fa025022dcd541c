//! # Arpstream
//!
//! Arpstream streams fixed size binary records from independent producers into
//! per-producer ring buffers, and lets a separate consumer drain them by name.
//!
//! ## Record
//!
//! A [`Record`] is a fixed size element with a known wire size. [`ArpRecord`] is
//! the 28 byte ARP message carried by default. Because records never vary in
//! size, a consumer can recover record boundaries from a plain byte stream.
//!
//! ## Channel
//!
//! A [`Channel`] owns one [`RingBuffer`] per lane, usually one lane per CPU. Each
//! ring buffer is split into rotating sub-buffers. Producers append without ever
//! blocking, appends are dropped when all sub-buffers hold unread data.
//!
//! Lanes are made readable through a [`Publisher`], under `<base_name><index>`.
//! [`Registry`] is an in-memory publisher that consumers can open lanes from.
//!
//! ## Consumer
//!
//! A [`Consumer`] opens each lane through a [`Source`], performs one bounded read,
//! discards reads that are not a whole number of records, and decodes the rest.
//! [`FsSource`] opens lanes as files, e.g. kernel relay files under debugfs.

pub(crate) mod arp;
pub(crate) mod channel;
pub(crate) mod config;
pub(crate) mod consumer;
pub(crate) mod publish;
pub(crate) mod record;
pub(crate) mod registry;
pub(crate) mod ring;
pub(crate) mod storage;

// Externally exposed types.
pub use arp::{
    ARP_RECORD_SIZE, ArpRecord, ETH_ALEN, HW_ETHERNET, OP_REPLY, OP_REQUEST, PROTO_IPV4,
};
pub use channel::{Channel, OpenError};
pub use config::{
    ChannelConfig, ConfigError, ConsumerConfig, DEFAULT_BASE_NAME, DEFAULT_CAPACITY,
    DEFAULT_RECORDS_PER_READ, DEFAULT_SUB_BUFFERS,
};
pub use consumer::{Consumer, FsSource, LaneError, LaneReport, PassReport, Source};
pub use publish::{PublishError, Publisher, lane_name};
pub use record::{FramingError, Record, decode_all};
pub use registry::Registry;
pub use ring::{AppendOutcome, LaneReader, RingBuffer, RingStats};
