//! Channel and consumer configuration.

use crate::{ARP_RECORD_SIZE, Record};
use thiserror::Error;

/// Default total capacity of a lane in bytes.
pub const DEFAULT_CAPACITY: usize = 8192;

/// Default number of sub-buffers per lane.
pub const DEFAULT_SUB_BUFFERS: usize = 2;

/// Default base name of lane handles.
pub const DEFAULT_BASE_NAME: &str = "cpu_arp";

/// Default number of whole records a consumer reads per lane per pass.
pub const DEFAULT_RECORDS_PER_READ: usize = 256 / ARP_RECORD_SIZE;

/// Different types of invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("A channel must have at least 1 lane")]
    NoLanes,

    #[error("A lane must have at least 2 sub-buffers, got {0}")]
    TooFewSubBuffers(usize),

    #[error("Sub-buffers of {sub_buffer_size} bytes cannot hold a {record_size} byte record")]
    SubBufferTooSmall {
        sub_buffer_size: usize,
        record_size: usize,
    },

    #[error("Base name must not be empty")]
    EmptyBaseName,

    #[error("A consumer must read at least 1 record at a time")]
    EmptyRead,
}

/// Configuration of a [`Channel`](crate::Channel), fixed at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Number of lanes, usually one per logical CPU.
    pub lanes: usize,

    /// Total capacity of each lane in bytes, split evenly between sub-buffers.
    pub capacity: usize,

    /// Number of sub-buffers in each lane.
    pub sub_buffers: usize,

    /// Lane handles are named `<base_name><lane index>`.
    pub base_name: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            lanes: 1,
            capacity: DEFAULT_CAPACITY,
            sub_buffers: DEFAULT_SUB_BUFFERS,
            base_name: DEFAULT_BASE_NAME.to_string(),
        }
    }
}

impl ChannelConfig {
    /// Create a new configuration with default base name.
    ///
    /// # Arguments
    ///
    /// * `lanes` - Number of lanes.
    /// * `capacity` - Total capacity of each lane in bytes.
    /// * `sub_buffers` - Number of sub-buffers in each lane.
    pub fn new(lanes: usize, capacity: usize, sub_buffers: usize) -> Self {
        Self {
            lanes,
            capacity,
            sub_buffers,
            ..Default::default()
        }
    }

    /// Set the base name of lane handles.
    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = base_name.into();
        self
    }

    /// Number of bytes in a single sub-buffer.
    pub fn sub_buffer_size(&self) -> usize {
        self.capacity.checked_div(self.sub_buffers).unwrap_or(0)
    }

    /// Make sure every sub-buffer can hold at least one record of type R.
    pub fn validate<R: Record>(&self) -> Result<(), ConfigError> {
        if self.lanes == 0 {
            return Err(ConfigError::NoLanes);
        }

        if self.sub_buffers < 2 {
            return Err(ConfigError::TooFewSubBuffers(self.sub_buffers));
        }

        if self.sub_buffer_size() < R::SIZE {
            return Err(ConfigError::SubBufferTooSmall {
                sub_buffer_size: self.sub_buffer_size(),
                record_size: R::SIZE,
            });
        }

        if self.base_name.is_empty() {
            return Err(ConfigError::EmptyBaseName);
        }

        Ok(())
    }
}

/// Configuration of a [`Consumer`](crate::Consumer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Number of lanes to drain.
    pub lanes: usize,

    /// Lane handles are named `<base_name><lane index>`.
    pub base_name: String,

    /// Maximum number of whole records read from a lane in one read.
    pub records_per_read: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            lanes: 1,
            base_name: DEFAULT_BASE_NAME.to_string(),
            records_per_read: DEFAULT_RECORDS_PER_READ,
        }
    }
}

impl ConsumerConfig {
    /// Make sure the configuration describes at least one lane and one record.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes == 0 {
            return Err(ConfigError::NoLanes);
        }

        if self.records_per_read == 0 {
            return Err(ConfigError::EmptyRead);
        }

        if self.base_name.is_empty() {
            return Err(ConfigError::EmptyBaseName);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArpRecord;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ChannelConfig::default().validate::<ArpRecord>(), Ok(()));
        assert_eq!(ConsumerConfig::default().validate(), Ok(()));
        assert_eq!(DEFAULT_RECORDS_PER_READ, 9);
    }

    #[rstest]
    #[case(ChannelConfig::new(0, 8192, 2), ConfigError::NoLanes)]
    #[case(ChannelConfig::new(2, 8192, 1), ConfigError::TooFewSubBuffers(1))]
    #[case(ChannelConfig::new(2, 8192, 0), ConfigError::TooFewSubBuffers(0))]
    #[case(
        ChannelConfig::new(2, 54, 2),
        ConfigError::SubBufferTooSmall { sub_buffer_size: 27, record_size: 28 }
    )]
    #[case(ChannelConfig::new(2, 8192, 2).with_base_name(""), ConfigError::EmptyBaseName)]
    fn invalid_channel_config(#[case] config: ChannelConfig, #[case] error: ConfigError) {
        assert_eq!(config.validate::<ArpRecord>(), Err(error));
    }

    #[test]
    fn sub_buffer_size_rounds_down() {
        assert_eq!(ChannelConfig::new(1, 8192, 3).sub_buffer_size(), 2730);
        assert_eq!(ChannelConfig::new(1, 8192, 0).sub_buffer_size(), 0);
    }

    #[test]
    fn invalid_consumer_config() {
        let config = ConsumerConfig {
            records_per_read: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyRead));
    }
}
