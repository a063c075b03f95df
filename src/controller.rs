//! # Mesh Radio Hardware Controller
//!
//! [`MeshHw`] owns the one live transceiver instance and runs every stateful
//! hardware sequence: attach (power-up, reset, default configuration),
//! parameter configuration, enable/disable, transmit, receive, status and
//! detach.
//!
//! ## Locking
//!
//! All register access goes through a single mutex owned by the instance. Each
//! public operation takes the lock once and holds it for its whole register
//! sequence, so two callers' writes never interleave. Polling waits hold the
//! lock too: a transmit can block other callers for up to the completion
//! budget (about one second by default).
//!
//! ## Usage
//!
//! ```rust
//! use mesh_net_hw::{HwConfig, MeshHw};
//! use mesh_net_hw::sim::SimPlatform;
//!
//! let platform = SimPlatform::new();
//! let hw = MeshHw::attach(platform, HwConfig::default())?;
//!
//! hw.enable()?;
//! hw.tx(&[0x01, 0x02, 0x03])?;
//! hw.detach();
//! # Ok::<(), mesh_net_hw::HwError>(())
//! ```

use crate::config::{DataRatePolicy, HwConfig};
use crate::error::HwError;
use crate::logging::log_frame;
use crate::platform::{Clock, Platform, PlatformError, Regulator, Resource};
use crate::poll::PollPolicy;
use crate::registers::{Control, Register, RegisterBlock, Status};
use bytes::{BufMut, Bytes, BytesMut};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::{debug, error, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Largest payload a single frame can carry (the length prefix is one byte).
pub const MAX_FRAME_LEN: usize = 255;

/// Reference clock used by the frequency word conversion.
const FREQ_REF_HZ: u64 = 100_000_000;

/// Frequency word for a carrier frequency: `(freq_hz * 1000) / 100_000_000`.
///
/// Computed in 64-bit so the intermediate product cannot overflow; the result
/// always fits 16 bits for a `u32` input.
pub fn frequency_register(freq_hz: u32) -> u16 {
    ((freq_hz as u64 * 1_000) / FREQ_REF_HZ) as u16
}

/// Data rate register value (kbps) for a rate in bits per second.
pub fn data_rate_register(rate_bps: u32, policy: DataRatePolicy) -> Result<u8, HwError> {
    let kbps = rate_bps / 1_000;
    match u8::try_from(kbps) {
        Ok(value) => Ok(value),
        Err(_) => match policy {
            DataRatePolicy::Truncate => {
                debug!("Data rate {kbps} kbps truncated to 0x{:02X}", kbps as u8);
                Ok(kbps as u8)
            }
            DataRatePolicy::Reject => Err(HwError::InvalidArgument(format!(
                "data rate {rate_bps} bps exceeds the 255 kbps register range"
            ))),
        },
    }
}

/// Counters kept across the life of a [`MeshHw`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwStats {
    /// Frames transmitted to completion
    pub tx_frames: u64,
    /// Payload bytes in completed transmissions
    pub tx_bytes: u64,
    /// Frames received
    pub rx_frames: u64,
    /// Payload bytes received
    pub rx_bytes: u64,
    /// Transmits refused because the transmitter stayed busy
    pub tx_busy: u64,
    /// Transmits that did not complete in time
    pub tx_timeouts: u64,
    /// Receive polls that found the FIFO empty
    pub rx_empty: u64,
}

/// Resources held while the device is attached.
struct Device<P: Platform> {
    regs: P::Registers,
    clock: P::Clock,
    regulator: P::Regulator,
    reset: P::ResetLine,
    irq_line: P::IrqLine,
    irq: u32,
    delay: P::Delay,
}

struct Shared<P: Platform> {
    device: Option<Device<P>>,
    stats: HwStats,
}

/// Handle to the attached transceiver.
///
/// Built by [`MeshHw::attach`], which consumes the platform provider, so only
/// one instance can exist per set of platform resources. The handle is
/// `Sync` when the platform's handles are `Send`; share it by reference or
/// behind an `Arc`.
pub struct MeshHw<P: Platform> {
    shared: Mutex<Shared<P>>,
    config: HwConfig,
}

impl<P: Platform> MeshHw<P> {
    /// Attach to the device: acquire resources, power up, pulse reset and
    /// apply `config`.
    ///
    /// On any failure everything acquired so far is released and no instance
    /// is returned.
    pub fn attach(mut platform: P, config: HwConfig) -> Result<Self, HwError> {
        config.validate()?;

        let mut device = Device::<P>::acquire(&mut platform)?;
        device.power_up()?;

        let brought_up = device
            .reset_pulse(config.reset_hold_us)
            .and_then(|()| device.apply_config(&config));
        if let Err(e) = brought_up {
            error!("Mesh hardware attach failed: {e}");
            device.power_down();
            return Err(e);
        }

        info!(
            "Mesh hardware attached: {} Hz, {} bps, {} dBm, {} dB, irq {}",
            config.frequency_hz,
            config.data_rate_bps,
            config.tx_power_dbm,
            config.rx_gain_db,
            device.irq
        );

        Ok(Self {
            shared: Mutex::new(Shared {
                device: Some(device),
                stats: HwStats::default(),
            }),
            config,
        })
    }

    /// Disable the device and release the clock, regulator and handles.
    ///
    /// Calling it again, or dropping the handle afterwards, does nothing.
    pub fn detach(&self) {
        let mut shared = self.lock();
        if let Some(mut device) = shared.device.take() {
            device.regs.write(Register::Control, 0);
            device.power_down();
            info!("Mesh hardware detached");
        }
    }

    /// Whether the device is attached and operations can run.
    pub fn is_attached(&self) -> bool {
        self.lock().device.is_some()
    }

    /// Configuration the device was attached with.
    pub fn config(&self) -> &HwConfig {
        &self.config
    }

    /// Set the carrier frequency in Hz.
    pub fn set_frequency(&self, freq_hz: u32) -> Result<(), HwError> {
        self.with_device(|device, _| {
            device.write_frequency(freq_hz);
            Ok(())
        })
    }

    /// Set the data rate in bits per second.
    ///
    /// Rates above 255 kbps follow the configured [`DataRatePolicy`].
    pub fn set_data_rate(&self, rate_bps: u32) -> Result<(), HwError> {
        let policy = self.config.data_rate_policy;
        self.with_device(|device, _| device.write_data_rate(rate_bps, policy))
    }

    /// Set the transmit power in dBm.
    pub fn set_tx_power(&self, power_dbm: u8) -> Result<(), HwError> {
        self.with_device(|device, _| {
            device.write_tx_power(power_dbm);
            Ok(())
        })
    }

    /// Set the receive gain in dB.
    pub fn set_rx_gain(&self, gain_db: u8) -> Result<(), HwError> {
        self.with_device(|device, _| {
            device.write_rx_gain(gain_db);
            Ok(())
        })
    }

    /// Enable the device.
    pub fn enable(&self) -> Result<(), HwError> {
        self.with_device(|device, _| {
            device.regs.write(Register::Control, Control::ENABLE.bits());
            debug!("Hardware enabled");
            Ok(())
        })
    }

    /// Disable the device.
    pub fn disable(&self) -> Result<(), HwError> {
        self.with_device(|device, _| {
            device.regs.write(Register::Control, 0);
            debug!("Hardware disabled");
            Ok(())
        })
    }

    /// Transmit one frame.
    ///
    /// Blocks until the transmitter reports completion or the completion
    /// budget runs out. The control register is cleared before returning
    /// whenever a transmission was started.
    ///
    /// # Errors
    ///
    /// * `DeviceAbsent` - not attached
    /// * `InvalidArgument` - empty payload or more than 255 bytes; nothing is
    ///   written
    /// * `Busy` - transmitter still busy after the ready wait; nothing is
    ///   written
    /// * `Timeout` - transmission did not complete in time
    pub fn tx(&self, data: &[u8]) -> Result<(), HwError> {
        let ready_wait = self.config.ready_wait;
        let complete_wait = self.config.tx_complete_wait;

        self.with_device(|device, stats| {
            let len = frame_len(data)?;
            let result = device.transmit(len, data, &ready_wait, &complete_wait);
            match &result {
                Ok(()) => {
                    stats.tx_frames += 1;
                    stats.tx_bytes += data.len() as u64;
                }
                Err(HwError::Busy) => stats.tx_busy += 1,
                Err(HwError::Timeout) => stats.tx_timeouts += 1,
                Err(_) => {}
            }
            result
        })
    }

    /// Read one frame from the receive FIFO.
    ///
    /// Does not wait: an empty FIFO returns `NoData` straight away.
    pub fn rx(&self) -> Result<Bytes, HwError> {
        self.with_device(|device, stats| {
            let result = device.receive();
            match &result {
                Ok(payload) => {
                    stats.rx_frames += 1;
                    stats.rx_bytes += payload.len() as u64;
                }
                Err(HwError::NoData) => stats.rx_empty += 1,
                Err(_) => {}
            }
            result
        })
    }

    /// Raw status register, or 0 when not attached.
    pub fn get_status(&self) -> u8 {
        let mut shared = self.lock();
        shared
            .device
            .as_mut()
            .map_or(0, |device| device.regs.read(Register::Status))
    }

    /// Whether the status register reports the device ready.
    pub fn is_ready(&self) -> bool {
        Status::from_bits_retain(self.get_status()).contains(Status::READY)
    }

    /// Write the interrupt mask register.
    pub fn set_irq_mask(&self, mask: u8) -> Result<(), HwError> {
        self.with_device(|device, _| {
            device.regs.write(Register::IrqMask, mask);
            debug!("IRQ mask set to 0x{mask:02X}");
            Ok(())
        })
    }

    /// Read the interrupt status register.
    pub fn irq_status(&self) -> Result<u8, HwError> {
        self.with_device(|device, _| Ok(device.regs.read(Register::IrqStatus)))
    }

    /// Read the FIFO status register.
    pub fn fifo_status(&self) -> Result<u8, HwError> {
        self.with_device(|device, _| Ok(device.regs.read(Register::FifoStatus)))
    }

    /// Sample the IRQ line.
    pub fn irq_line_asserted(&self) -> Result<bool, HwError> {
        self.with_device(|device, _| {
            device
                .irq_line
                .is_high()
                .map_err(|e| HwError::unavailable(Resource::IrqLine, format!("{e:?}")))
        })
    }

    /// Interrupt number routed from the IRQ line.
    pub fn irq_number(&self) -> Result<u32, HwError> {
        self.with_device(|device, _| Ok(device.irq))
    }

    /// Snapshot of the transfer counters.
    pub fn stats(&self) -> HwStats {
        self.lock().stats
    }

    /// Zero the transfer counters.
    pub fn reset_stats(&self) {
        self.lock().stats = HwStats::default();
    }

    fn lock(&self) -> MutexGuard<'_, Shared<P>> {
        // Register sequences always finish their writes before returning, so
        // the state behind a poisoned lock is still consistent.
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_device<T>(
        &self,
        op: impl FnOnce(&mut Device<P>, &mut HwStats) -> Result<T, HwError>,
    ) -> Result<T, HwError> {
        let mut shared = self.lock();
        let Shared { device, stats } = &mut *shared;
        let device = device.as_mut().ok_or(HwError::DeviceAbsent)?;
        op(device, stats)
    }
}

impl<P: Platform> Drop for MeshHw<P> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn frame_len(data: &[u8]) -> Result<u8, HwError> {
    match data.len() {
        0 => Err(HwError::InvalidArgument("empty payload".to_string())),
        len @ 1..=MAX_FRAME_LEN => Ok(len as u8),
        len => Err(HwError::InvalidArgument(format!(
            "payload of {len} bytes exceeds {MAX_FRAME_LEN}"
        ))),
    }
}

fn acquire_failed(resource: Resource) -> impl FnOnce(PlatformError) -> HwError {
    move |e| {
        error!("Failed to get {resource}: {e}");
        HwError::unavailable(resource, e)
    }
}

impl<P: Platform> Device<P> {
    fn acquire(platform: &mut P) -> Result<Self, HwError> {
        let regs = platform
            .registers()
            .map_err(acquire_failed(Resource::RegisterBlock))?;
        let clock = platform.clock().map_err(acquire_failed(Resource::Clock))?;
        let regulator = platform
            .regulator()
            .map_err(acquire_failed(Resource::Regulator))?;
        let reset = platform
            .reset_line()
            .map_err(acquire_failed(Resource::ResetLine))?;
        let irq_line = platform
            .irq_line()
            .map_err(acquire_failed(Resource::IrqLine))?;
        let irq = platform.irq_number().map_err(acquire_failed(Resource::Irq))?;
        let delay = platform.delay();

        Ok(Self {
            regs,
            clock,
            regulator,
            reset,
            irq_line,
            irq,
            delay,
        })
    }

    /// Regulator first, then clock. A clock failure switches the regulator
    /// back off.
    fn power_up(&mut self) -> Result<(), HwError> {
        self.regulator.enable().map_err(|e| {
            error!("Failed to enable regulator: {e}");
            HwError::unavailable(Resource::Regulator, e)
        })?;

        if let Err(e) = self.clock.prepare_enable() {
            error!("Failed to enable clock: {e}");
            if let Err(off) = self.regulator.disable() {
                warn!("Failed to disable regulator after clock failure: {off}");
            }
            return Err(HwError::unavailable(Resource::Clock, e));
        }
        Ok(())
    }

    fn power_down(&mut self) {
        self.clock.disable_unprepare();
        if let Err(e) = self.regulator.disable() {
            warn!("Failed to disable regulator: {e}");
        }
    }

    fn reset_pulse(&mut self, hold_us: u32) -> Result<(), HwError> {
        let line_error = |e: <P::ResetLine as ErrorType>::Error| {
            error!("Reset line error: {e:?}");
            HwError::unavailable(Resource::ResetLine, format!("{e:?}"))
        };

        self.reset.set_low().map_err(line_error)?;
        self.delay.delay_us(hold_us);
        self.reset.set_high().map_err(line_error)?;
        self.delay.delay_us(hold_us);
        Ok(())
    }

    fn apply_config(&mut self, config: &HwConfig) -> Result<(), HwError> {
        self.write_frequency(config.frequency_hz);
        self.write_data_rate(config.data_rate_bps, config.data_rate_policy)?;
        self.write_tx_power(config.tx_power_dbm);
        self.write_rx_gain(config.rx_gain_db);
        Ok(())
    }

    fn write_frequency(&mut self, freq_hz: u32) {
        let [low, high] = frequency_register(freq_hz).to_le_bytes();
        self.regs.write(Register::FreqLow, low);
        self.regs.write(Register::FreqHigh, high);
        debug!(
            "Set frequency to {freq_hz} Hz (reg: 0x{:04X})",
            u16::from_le_bytes([low, high])
        );
    }

    fn write_data_rate(&mut self, rate_bps: u32, policy: DataRatePolicy) -> Result<(), HwError> {
        let value = data_rate_register(rate_bps, policy)?;
        self.regs.write(Register::DataRate, value);
        debug!("Set data rate to {rate_bps} bps (reg: 0x{value:02X})");
        Ok(())
    }

    fn write_tx_power(&mut self, power_dbm: u8) {
        self.regs.write(Register::TxPower, power_dbm);
        debug!("Set TX power to {power_dbm} dBm");
    }

    fn write_rx_gain(&mut self, gain_db: u8) {
        self.regs.write(Register::RxGain, gain_db);
        debug!("Set RX gain to {gain_db} dB");
    }

    fn transmit(
        &mut self,
        len: u8,
        data: &[u8],
        ready_wait: &PollPolicy,
        complete_wait: &PollPolicy,
    ) -> Result<(), HwError> {
        let Device { regs, delay, .. } = self;

        ready_wait
            .run(delay, || !tx_busy(&mut *regs))
            .map_err(|exhausted| {
                debug!("Transmitter busy after {} polls", exhausted.attempts);
                HwError::Busy
            })?;

        regs.write(Register::Control, Control::TX_EN.bits());
        regs.write(Register::FifoData, len);
        for &byte in data {
            regs.write(Register::FifoData, byte);
        }

        let completed = complete_wait.run(delay, || !tx_busy(&mut *regs));
        regs.write(Register::Control, 0);

        match completed {
            Ok(polls) => {
                debug!("TX completed: {len} bytes after {polls} polls");
                log_frame("TX frame", data);
                Ok(())
            }
            Err(exhausted) => {
                debug!("TX timeout after {} polls", exhausted.attempts);
                Err(HwError::Timeout)
            }
        }
    }

    fn receive(&mut self) -> Result<Bytes, HwError> {
        let status = Status::from_bits_retain(self.regs.read(Register::Status));
        if status.contains(Status::FIFO_EMPTY) {
            return Err(HwError::NoData);
        }

        self.regs.write(Register::Control, Control::RX_EN.bits());
        let len = self.regs.read(Register::FifoData) as usize;
        let mut payload = BytesMut::with_capacity(len);
        for _ in 0..len {
            payload.put_u8(self.regs.read(Register::FifoData));
        }
        self.regs.write(Register::Control, 0);

        debug!("RX completed: {len} bytes");
        log_frame("RX frame", &payload);
        Ok(payload.freeze())
    }
}

fn tx_busy<R: RegisterBlock>(regs: &mut R) -> bool {
    Status::from_bits_retain(regs.read(Register::Status)).contains(Status::TX_BUSY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frequency_register_915mhz() {
        assert_eq!(frequency_register(915_000_000), 9_150);
        assert_eq!(frequency_register(915_000_000).to_le_bytes(), [0xBE, 0x23]);
    }

    #[test]
    fn test_frequency_register_does_not_overflow() {
        assert_eq!(frequency_register(u32::MAX), 42_949);
        assert_eq!(frequency_register(99_999), 0);
    }

    #[test]
    fn test_data_rate_in_range() {
        assert_eq!(data_rate_register(250_000, DataRatePolicy::Reject), Ok(250));
        assert_eq!(data_rate_register(255_999, DataRatePolicy::Reject), Ok(255));
        assert_eq!(data_rate_register(999, DataRatePolicy::Truncate), Ok(0));
    }

    #[test]
    fn test_data_rate_out_of_range() {
        // 700 kbps = 0x2BC, low byte 0xBC
        assert_eq!(data_rate_register(700_000, DataRatePolicy::Truncate), Ok(0xBC));
        assert!(matches!(
            data_rate_register(700_000, DataRatePolicy::Reject),
            Err(HwError::InvalidArgument(_))
        ));
        assert!(matches!(
            data_rate_register(256_000, DataRatePolicy::Reject),
            Err(HwError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_frame_len_bounds() {
        assert!(matches!(frame_len(&[]), Err(HwError::InvalidArgument(_))));
        assert_eq!(frame_len(&[0; 1]), Ok(1));
        assert_eq!(frame_len(&[0; 255]), Ok(255));
        assert!(matches!(frame_len(&[0; 256]), Err(HwError::InvalidArgument(_))));
    }

    proptest! {
        #[test]
        fn prop_frequency_register_is_floor_of_hundred_khz_steps(freq in any::<u32>()) {
            let value = frequency_register(freq);
            prop_assert_eq!(value as u32, freq / 100_000);
        }
    }
}
