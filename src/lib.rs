//! # mesh-net-hw - Hardware Abstraction Layer for a 915 MHz Mesh Radio
//!
//! The mesh-net-hw crate drives a 915 MHz radio transceiver attached through a
//! memory-mapped register block, GPIO reset and IRQ lines, a clock and a supply
//! regulator. It gives a network driver a small synchronous command surface.
//!
//! ## Features
//!
//! - Attach/detach sequencing: resource acquisition, power-up, reset pulse and
//!   default configuration (915 MHz, 700 kbps, 20 dBm, 30 dB)
//! - Frequency, data rate, transmit power and receive gain configuration
//! - Frame transmit with bounded busy-wait polling
//! - Non-blocking frame receive from the hardware FIFO
//! - One mutex per device, held across every register sequence
//! - A register-level simulator for testing without hardware
//!
//! ## Usage
//!
//! ```rust
//! use mesh_net_hw::{HwConfig, HwError, MeshHw};
//! use mesh_net_hw::sim::SimPlatform;
//!
//! let platform = SimPlatform::new();
//! platform.registers.queue_rx_frame(&[0xCA, 0xFE]);
//!
//! let hw = MeshHw::attach(platform, HwConfig::default())?;
//! hw.enable()?;
//! hw.tx(b"hello")?;
//!
//! let frame = hw.rx()?;
//! assert_eq!(&frame[..], &[0xCA, 0xFE]);
//! assert_eq!(hw.rx(), Err(HwError::NoData));
//! # Ok::<(), HwError>(())
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod platform;
pub mod poll;
pub mod registers;
pub mod sim;

pub use crate::config::{DataRatePolicy, HwConfig};
pub use crate::controller::{HwStats, MeshHw, MAX_FRAME_LEN};
pub use crate::error::HwError;
pub use crate::logging::init_logger;
pub use crate::platform::{Clock, Platform, PlatformError, Regulator, Resource};
pub use crate::poll::PollPolicy;
pub use crate::registers::{Control, MmioRegisterBlock, Register, RegisterBlock, Status};
