//! # Mesh Radio HAL Error Handling
//!
//! This module defines the `HwError` enum, which represents the different error
//! types returned by the hardware controller.

use crate::platform::Resource;
use thiserror::Error;

/// Represents the different error types that can occur in the mesh radio HAL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HwError {
    /// An operation was attempted before attach completed or after detach.
    #[error("Device not present")]
    DeviceAbsent,

    /// A platform handle could not be acquired or brought up during attach.
    #[error("{resource} unavailable: {reason}")]
    ResourceUnavailable { resource: Resource, reason: String },

    /// Payload length out of range or a parameter the device cannot encode.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The transmitter was still busy after the short pre-transmit wait.
    #[error("Transmitter busy")]
    Busy,

    /// The transmitter did not finish within the completion wait.
    #[error("Transmit timed out")]
    Timeout,

    /// Receive was attempted while the FIFO was empty.
    #[error("No data available")]
    NoData,

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HwError {
    /// Busy, Timeout and NoData are ordinary outcomes the caller is expected
    /// to handle by retrying or backing off. Everything else needs the caller
    /// to fix its input or re-attach.
    pub fn is_transient(&self) -> bool {
        matches!(self, HwError::Busy | HwError::Timeout | HwError::NoData)
    }

    pub(crate) fn unavailable(resource: Resource, reason: impl ToString) -> Self {
        HwError::ResourceUnavailable {
            resource,
            reason: reason.to_string(),
        }
    }
}
