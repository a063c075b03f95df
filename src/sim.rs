//! Simulated transceiver platform for testing
//!
//! This module provides register, GPIO, clock, regulator and delay doubles
//! that can be used to exercise the hardware controller without the physical
//! device. Every handle is cheaply cloneable and shares its state, so a test
//! keeps a clone to inspect what the controller did after handing the
//! platform to [`MeshHw::attach`].
//!
//! The register double journals every access in order and models the status
//! register: the transmitter busy bit follows a scripted [`BusyModel`], and
//! the FIFO empty bit tracks a queue of bytes waiting to be received.
//!
//! [`MeshHw::attach`]: crate::controller::MeshHw::attach

use crate::platform::{Clock, Platform, PlatformError, Regulator, Resource};
use crate::registers::{Control, Register, RegisterBlock, Status, REGISTER_COUNT};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Direction of a journaled register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// One journaled register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAccess {
    pub kind: AccessKind,
    pub reg: Register,
    pub value: u8,
}

/// How the transmitter busy bit behaves over successive status reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyModel {
    /// Never busy
    Idle,
    /// Busy for the next `n` status reads, then idle
    Polls(u32),
    /// Busy on every read
    Forever,
}

impl BusyModel {
    /// Report the bit for one status read and advance the model.
    fn sample(&mut self) -> bool {
        match *self {
            BusyModel::Idle => false,
            BusyModel::Forever => true,
            BusyModel::Polls(0) => {
                *self = BusyModel::Idle;
                false
            }
            BusyModel::Polls(n) => {
                *self = BusyModel::Polls(n - 1);
                true
            }
        }
    }
}

#[derive(Debug)]
struct SimState {
    regs: [u8; REGISTER_COUNT],
    journal: Vec<RegisterAccess>,
    rx_fifo: VecDeque<u8>,
    tx_fifo: Vec<u8>,
    tx_busy: BusyModel,
    on_tx_start: BusyModel,
    ready: bool,
}

/// Simulated register block
#[derive(Debug, Clone)]
pub struct SimRegisters {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRegisters {
    /// A ready, idle device with an empty receive FIFO.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                regs: [0; REGISTER_COUNT],
                journal: Vec::new(),
                rx_fifo: VecDeque::new(),
                tx_fifo: Vec::new(),
                tx_busy: BusyModel::Idle,
                on_tx_start: BusyModel::Idle,
                ready: true,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the busy behavior from the next status read on
    pub fn set_tx_busy(&self, model: BusyModel) {
        self.state().tx_busy = model;
    }

    /// Busy behavior armed whenever TX_EN is written to the control register
    pub fn set_busy_on_tx_start(&self, model: BusyModel) {
        self.state().on_tx_start = model;
    }

    /// Drive the READY status bit
    pub fn set_ready(&self, ready: bool) {
        self.state().ready = ready;
    }

    /// Queue a received frame: its length byte followed by the payload
    pub fn queue_rx_frame(&self, payload: &[u8]) {
        let mut state = self.state();
        state.rx_fifo.push_back(payload.len() as u8);
        state.rx_fifo.extend(payload);
    }

    /// Queue raw bytes into the receive FIFO
    pub fn queue_rx_bytes(&self, bytes: &[u8]) {
        self.state().rx_fifo.extend(bytes);
    }

    /// Bytes still waiting in the receive FIFO
    pub fn rx_pending(&self) -> usize {
        self.state().rx_fifo.len()
    }

    /// Set a register value without journaling
    pub fn poke(&self, reg: Register, value: u8) {
        self.state().regs[reg.offset()] = value;
    }

    /// Last value written to a register, without journaling
    pub fn peek(&self, reg: Register) -> u8 {
        self.state().regs[reg.offset()]
    }

    /// Every access so far, in order
    pub fn journal(&self) -> Vec<RegisterAccess> {
        self.state().journal.clone()
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<(Register, u8)> {
        self.state()
            .journal
            .iter()
            .filter(|a| a.kind == AccessKind::Write)
            .map(|a| (a.reg, a.value))
            .collect()
    }

    /// Number of reads of one register
    pub fn read_count(&self, reg: Register) -> usize {
        self.state()
            .journal
            .iter()
            .filter(|a| a.kind == AccessKind::Read && a.reg == reg)
            .count()
    }

    /// Bytes written to the FIFO data port so far
    pub fn transmitted(&self) -> Vec<u8> {
        self.state().tx_fifo.clone()
    }

    /// Forget all journaled accesses and transmitted bytes
    pub fn clear_journal(&self) {
        let mut state = self.state();
        state.journal.clear();
        state.tx_fifo.clear();
    }
}

impl RegisterBlock for SimRegisters {
    fn read(&mut self, reg: Register) -> u8 {
        let mut state = self.state();
        let value = match reg {
            Register::Status => {
                let mut status = Status::empty();
                status.set(Status::READY, state.ready);
                status.set(Status::TX_BUSY, state.tx_busy.sample());
                status.set(Status::FIFO_EMPTY, state.rx_fifo.is_empty());
                status.bits()
            }
            Register::FifoData => state.rx_fifo.pop_front().unwrap_or(0),
            other => state.regs[other.offset()],
        };
        state.journal.push(RegisterAccess {
            kind: AccessKind::Read,
            reg,
            value,
        });
        value
    }

    fn write(&mut self, reg: Register, value: u8) {
        let mut state = self.state();
        match reg {
            Register::FifoData => state.tx_fifo.push(value),
            Register::Control => {
                if Control::from_bits_retain(value).contains(Control::TX_EN) {
                    state.tx_busy = state.on_tx_start;
                }
            }
            _ => {}
        }
        state.regs[reg.offset()] = value;
        state.journal.push(RegisterAccess {
            kind: AccessKind::Write,
            reg,
            value,
        });
    }
}

/// Delay that records requested time instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct SimDelay {
    elapsed_ns: Arc<AtomicU64>,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total simulated time waited
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Relaxed))
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns.fetch_add(ns as u64, Ordering::Relaxed);
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_ns
            .fetch_add(us as u64 * 1_000, Ordering::Relaxed);
    }
}

/// Error reported by a failing [`SimLine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimLineError;

impl digital::Error for SimLineError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Default)]
struct LineState {
    level: bool,
    history: Vec<bool>,
    failing: bool,
}

/// Simulated GPIO line, usable as an output or an input
#[derive(Debug, Clone, Default)]
pub struct SimLine {
    state: Arc<Mutex<LineState>>,
}

impl SimLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current level
    pub fn level(&self) -> bool {
        self.state().level
    }

    /// Drive the level from outside, as the device would drive an input
    pub fn drive(&self, level: bool) {
        self.state().level = level;
    }

    /// Levels written through the output interface, in order
    pub fn history(&self) -> Vec<bool> {
        self.state().history.clone()
    }

    /// Make every subsequent operation fail
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    fn set(&self, level: bool) -> Result<(), SimLineError> {
        let mut state = self.state();
        if state.failing {
            return Err(SimLineError);
        }
        state.level = level;
        state.history.push(level);
        Ok(())
    }

    fn get(&self) -> Result<bool, SimLineError> {
        let state = self.state();
        if state.failing {
            return Err(SimLineError);
        }
        Ok(state.level)
    }
}

impl ErrorType for SimLine {
    type Error = SimLineError;
}

impl OutputPin for SimLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true)
    }
}

impl InputPin for SimLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.get()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.get().map(|level| !level)
    }
}

#[derive(Debug, Default)]
struct SwitchState {
    enabled: bool,
    enable_calls: u32,
    disable_calls: u32,
    fail_enable: bool,
}

/// Simulated on/off resource, usable as a clock or a regulator
#[derive(Debug, Clone, Default)]
pub struct SimSwitch {
    state: Arc<Mutex<SwitchState>>,
}

impl SimSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SwitchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn enable_calls(&self) -> u32 {
        self.state().enable_calls
    }

    pub fn disable_calls(&self) -> u32 {
        self.state().disable_calls
    }

    /// Make subsequent enable attempts fail
    pub fn set_fail_enable(&self, fail: bool) {
        self.state().fail_enable = fail;
    }

    fn switch_on(&self) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.enable_calls += 1;
        if state.fail_enable {
            return Err(PlatformError::new("simulated enable failure"));
        }
        state.enabled = true;
        Ok(())
    }

    fn switch_off(&self) {
        let mut state = self.state();
        state.disable_calls += 1;
        state.enabled = false;
    }
}

impl Clock for SimSwitch {
    fn prepare_enable(&mut self) -> Result<(), PlatformError> {
        self.switch_on()
    }

    fn disable_unprepare(&mut self) {
        self.switch_off();
    }
}

impl Regulator for SimSwitch {
    fn enable(&mut self) -> Result<(), PlatformError> {
        self.switch_on()
    }

    fn disable(&mut self) -> Result<(), PlatformError> {
        self.switch_off();
        Ok(())
    }
}

/// IRQ number reported by a default [`SimPlatform`]
pub const SIM_IRQ_NUMBER: u32 = 42;

/// Simulated platform resource provider
///
/// The fields are the handles the provider gives out; clone them before
/// attaching to keep inspecting the simulated hardware.
#[derive(Debug, Clone)]
pub struct SimPlatform {
    pub registers: SimRegisters,
    pub clock: SimSwitch,
    pub regulator: SimSwitch,
    pub reset: SimLine,
    pub irq: SimLine,
    pub delay: SimDelay,
    pub irq_number: u32,
    unavailable: Option<Resource>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            registers: SimRegisters::new(),
            clock: SimSwitch::new(),
            regulator: SimSwitch::new(),
            reset: SimLine::new(),
            irq: SimLine::new(),
            delay: SimDelay::new(),
            irq_number: SIM_IRQ_NUMBER,
            unavailable: None,
        }
    }

    /// Make acquisition of `resource` fail during attach
    pub fn with_unavailable(mut self, resource: Resource) -> Self {
        self.unavailable = Some(resource);
        self
    }

    fn check(&self, resource: Resource) -> Result<(), PlatformError> {
        if self.unavailable == Some(resource) {
            Err(PlatformError::new(format!("no {resource} in platform data")))
        } else {
            Ok(())
        }
    }
}

impl Platform for SimPlatform {
    type Registers = SimRegisters;
    type Clock = SimSwitch;
    type Regulator = SimSwitch;
    type ResetLine = SimLine;
    type IrqLine = SimLine;
    type Delay = SimDelay;

    fn registers(&mut self) -> Result<SimRegisters, PlatformError> {
        self.check(Resource::RegisterBlock)?;
        Ok(self.registers.clone())
    }

    fn clock(&mut self) -> Result<SimSwitch, PlatformError> {
        self.check(Resource::Clock)?;
        Ok(self.clock.clone())
    }

    fn regulator(&mut self) -> Result<SimSwitch, PlatformError> {
        self.check(Resource::Regulator)?;
        Ok(self.regulator.clone())
    }

    fn reset_line(&mut self) -> Result<SimLine, PlatformError> {
        self.check(Resource::ResetLine)?;
        Ok(self.reset.clone())
    }

    fn irq_line(&mut self) -> Result<SimLine, PlatformError> {
        self.check(Resource::IrqLine)?;
        Ok(self.irq.clone())
    }

    fn irq_number(&mut self) -> Result<u32, PlatformError> {
        self.check(Resource::Irq)?;
        Ok(self.irq_number)
    }

    fn delay(&mut self) -> SimDelay {
        self.delay.clone()
    }
}
