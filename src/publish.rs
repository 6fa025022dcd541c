//! Definition of the adapter that makes lanes externally readable.

use crate::RingBuffer;
use std::sync::Arc;
use thiserror::Error;

/// Different types of error that can happen when a lane is published.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("A handle named {0} is already published")]
    AlreadyExists(String),
}

/// Name of the handle of a lane, `<base><index>`.
///
/// Shared by publishers and consumers so that both sides agree on where a lane lives.
///
/// # Arguments
///
/// * `base` - Base name of lane handles.
/// * `index` - Index of the lane.
pub fn lane_name(base: &str, index: usize) -> String {
    format!("{base}{index}")
}

/// Creates and removes the externally readable handle of each lane.
///
/// This is the environment's half of a [`Channel`](crate::Channel). The channel
/// calls [`Publisher::create`] once per lane when it opens, and
/// [`Publisher::remove`] once per published lane when it closes.
pub trait Publisher {
    /// Reference to a published handle, returned back on removal.
    type Handle;

    /// Expose the committed bytes of a lane as a sequentially readable stream.
    ///
    /// # Arguments
    ///
    /// * `lane` - Index of the lane.
    /// * `name` - Name of the handle, see [`lane_name`].
    /// * `buffer` - Ring buffer of the lane.
    fn create(
        &self,
        lane: usize,
        name: &str,
        buffer: Arc<RingBuffer>,
    ) -> Result<Self::Handle, PublishError>;

    /// Unpublish a handle.
    ///
    /// Best effort, implementations log failures rather than returning them.
    ///
    /// # Arguments
    ///
    /// * `handle` - Handle returned from [`Publisher::create`].
    fn remove(&self, handle: Self::Handle);
}

impl<P: Publisher> Publisher for &P {
    type Handle = P::Handle;

    fn create(
        &self,
        lane: usize,
        name: &str,
        buffer: Arc<RingBuffer>,
    ) -> Result<Self::Handle, PublishError> {
        (**self).create(lane, name, buffer)
    }

    fn remove(&self, handle: Self::Handle) {
        (**self).remove(handle)
    }
}
