//! # Platform Resource Boundary
//!
//! This module defines the traits through which the platform resource
//! provider hands the HAL its already-discovered handles: the mapped register
//! block, the clock, the supply regulator, the reset and IRQ GPIO lines, the
//! IRQ number and a delay source.
//!
//! GPIO lines and delays use the `embedded-hal` 1.0 traits so any board
//! support crate can supply them directly.

use crate::registers::RegisterBlock;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use std::fmt;
use thiserror::Error;

/// A platform resource acquired during attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    RegisterBlock,
    Clock,
    Regulator,
    ResetLine,
    IrqLine,
    Irq,
}

impl Resource {
    /// Acquisition order used by the attach sequence.
    pub const ACQUISITION_ORDER: [Resource; 6] = [
        Resource::RegisterBlock,
        Resource::Clock,
        Resource::Regulator,
        Resource::ResetLine,
        Resource::IrqLine,
        Resource::Irq,
    ];
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::RegisterBlock => "register block",
            Resource::Clock => "clock",
            Resource::Regulator => "regulator",
            Resource::ResetLine => "reset line",
            Resource::IrqLine => "irq line",
            Resource::Irq => "irq",
        };
        f.write_str(name)
    }
}

/// Failure reported by the platform provider or a resource handle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Device clock handle
pub trait Clock: Send {
    /// Prepare and enable the clock
    fn prepare_enable(&mut self) -> Result<(), PlatformError>;

    /// Disable and unprepare the clock
    fn disable_unprepare(&mut self);
}

/// Supply regulator handle
pub trait Regulator: Send {
    /// Switch the supply on
    fn enable(&mut self) -> Result<(), PlatformError>;

    /// Switch the supply off
    fn disable(&mut self) -> Result<(), PlatformError>;
}

/// Platform resource provider consumed by [`MeshHw::attach`].
///
/// Each accessor is called once during attach, in
/// [`Resource::ACQUISITION_ORDER`]. Handles returned before a failing call are
/// dropped, so providers should release the underlying resource on drop.
///
/// [`MeshHw::attach`]: crate::controller::MeshHw::attach
pub trait Platform {
    type Registers: RegisterBlock;
    type Clock: Clock;
    type Regulator: Regulator;
    type ResetLine: OutputPin + Send;
    type IrqLine: InputPin + Send;
    type Delay: DelayNs + Send;

    /// Mapped register block
    fn registers(&mut self) -> Result<Self::Registers, PlatformError>;

    /// Device clock
    fn clock(&mut self) -> Result<Self::Clock, PlatformError>;

    /// Supply regulator
    fn regulator(&mut self) -> Result<Self::Regulator, PlatformError>;

    /// Reset GPIO, configured as an output driven low
    fn reset_line(&mut self) -> Result<Self::ResetLine, PlatformError>;

    /// IRQ GPIO, configured as an input
    fn irq_line(&mut self) -> Result<Self::IrqLine, PlatformError>;

    /// Interrupt number routed from the IRQ line
    fn irq_number(&mut self) -> Result<u32, PlatformError>;

    /// Busy-wait delay source used for reset holds and status polling
    fn delay(&mut self) -> Self::Delay;
}
