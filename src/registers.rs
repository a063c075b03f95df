//! # Transceiver Register Definitions
//!
//! Register offsets and bit field definitions for the 915 MHz transceiver's
//! control block, plus the [`RegisterBlock`] primitive used to access it.
//!
//! ## Register Map
//!
//! The control block is eleven 8-bit registers at offsets 0x00-0x0A:
//! - 0x00-0x01: Control and status
//! - 0x02-0x06: RF settings (frequency, data rate, power, gain)
//! - 0x07-0x08: FIFO data port and FIFO status
//! - 0x09-0x0A: Interrupt status and mask
//!
//! The offsets are the binary contract with the physical device and must not
//! change.

use bitflags::bitflags;
use std::fmt;
use std::ptr::NonNull;

/// A register in the transceiver's control block.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Operating mode control (enable, TX/RX enable, reset, sleep)
    Control = 0x00,
    /// Device status (ready, busy, FIFO state)
    Status = 0x01,
    /// Carrier frequency word, low byte
    FreqLow = 0x02,
    /// Carrier frequency word, high byte
    FreqHigh = 0x03,
    /// Data rate in kbps
    DataRate = 0x04,
    /// Transmit power in dBm
    TxPower = 0x05,
    /// Receive gain in dB
    RxGain = 0x06,
    /// Single-byte FIFO port for payload streaming
    FifoData = 0x07,
    /// FIFO fill state
    FifoStatus = 0x08,
    /// Pending interrupt sources
    IrqStatus = 0x09,
    /// Enabled interrupt sources
    IrqMask = 0x0A,
}

impl Register {
    /// All registers in address order.
    pub const ALL: [Register; 11] = [
        Register::Control,
        Register::Status,
        Register::FreqLow,
        Register::FreqHigh,
        Register::DataRate,
        Register::TxPower,
        Register::RxGain,
        Register::FifoData,
        Register::FifoStatus,
        Register::IrqStatus,
        Register::IrqMask,
    ];

    /// Byte offset of the register from the block base.
    pub const fn offset(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@0x{:02X}", self, *self as u8)
    }
}

/// Number of registers in the control block.
pub const REGISTER_COUNT: usize = Register::ALL.len();

bitflags! {
    /// Control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u8 {
        /// Device enabled
        const ENABLE = 0x01;
        /// Transmitter enabled
        const TX_EN = 0x02;
        /// Receiver enabled
        const RX_EN = 0x04;
        /// Soft reset
        const RESET = 0x08;
        /// Low-power sleep
        const SLEEP = 0x10;
    }
}

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Device ready for commands
        const READY = 0x01;
        /// Transmitter mid-operation
        const TX_BUSY = 0x02;
        /// Receiver mid-operation
        const RX_BUSY = 0x04;
        /// FIFO full
        const FIFO_FULL = 0x08;
        /// FIFO empty
        const FIFO_EMPTY = 0x10;
    }
}

/// Single 8-bit read/write access to the control block.
///
/// Implementations perform exactly one bus access per call, with no retries
/// and no interpretation of the value.
pub trait RegisterBlock: Send {
    /// Read one register
    fn read(&mut self, reg: Register) -> u8;

    /// Write one register
    fn write(&mut self, reg: Register, value: u8);
}

/// Memory-mapped register block.
///
/// Accesses are volatile 8-bit loads and stores at `base + offset`.
#[derive(Debug)]
pub struct MmioRegisterBlock {
    base: NonNull<u8>,
}

impl MmioRegisterBlock {
    /// Wrap an already-mapped register block.
    ///
    /// Returns `None` for a null base.
    ///
    /// # Safety
    ///
    /// `base` must point to a mapping of at least [`REGISTER_COUNT`] bytes of
    /// device memory that stays valid for the lifetime of the returned value,
    /// and no other code may access that mapping concurrently.
    pub unsafe fn new(base: *mut u8) -> Option<Self> {
        NonNull::new(base).map(|base| Self { base })
    }
}

// SAFETY: the mapping is exclusively owned per the `new` contract, so moving
// the handle to another thread cannot create aliased access.
unsafe impl Send for MmioRegisterBlock {}

impl RegisterBlock for MmioRegisterBlock {
    fn read(&mut self, reg: Register) -> u8 {
        // SAFETY: offset is below REGISTER_COUNT and the mapping covers it.
        unsafe { self.base.as_ptr().add(reg.offset()).read_volatile() }
    }

    fn write(&mut self, reg: Register, value: u8) {
        // SAFETY: as for `read`.
        unsafe { self.base.as_ptr().add(reg.offset()).write_volatile(value) }
    }
}
