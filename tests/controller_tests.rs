//! Integration tests for the hardware controller
//!
//! Drives attach/detach, configuration, transmit and receive against the
//! register simulator and checks the exact register traffic.

use mesh_net_hw::controller::frequency_register;
use mesh_net_hw::sim::{AccessKind, BusyModel, SimPlatform, SIM_IRQ_NUMBER};
use mesh_net_hw::{
    Control, DataRatePolicy, HwConfig, HwError, MeshHw, Register, Resource, Status,
};
use proptest::prelude::*;
use std::time::Duration;

/// Attach with defaults and clear the journal, returning shared handles to
/// the simulated hardware.
fn attach_sim() -> (MeshHw<SimPlatform>, SimPlatform) {
    attach_with(HwConfig::default())
}

fn attach_with(config: HwConfig) -> (MeshHw<SimPlatform>, SimPlatform) {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    let hw = MeshHw::attach(platform, config).expect("attach failed");
    handles.registers.clear_journal();
    (hw, handles)
}

/// Status reads journaled after the first write of `value` to `reg`.
fn status_reads_after(handles: &SimPlatform, reg: Register, value: u8) -> usize {
    handles
        .registers
        .journal()
        .iter()
        .skip_while(|a| !(a.kind == AccessKind::Write && a.reg == reg && a.value == value))
        .filter(|a| a.kind == AccessKind::Read && a.reg == Register::Status)
        .count()
}

#[test]
fn test_attach_applies_reset_and_defaults() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    let hw = MeshHw::attach(platform, HwConfig::default()).unwrap();

    assert!(hw.is_attached());
    assert!(handles.clock.is_enabled());
    assert!(handles.regulator.is_enabled());
    assert_eq!(handles.reset.history(), vec![false, true]);
    assert!(handles.delay.elapsed() >= Duration::from_micros(2_000));

    assert_eq!(
        handles.registers.writes(),
        vec![
            (Register::FreqLow, 0xBE),
            (Register::FreqHigh, 0x23),
            (Register::DataRate, 0xBC),
            (Register::TxPower, 20),
            (Register::RxGain, 30),
        ]
    );
}

#[test]
fn test_attach_fails_for_each_missing_resource() {
    for resource in Resource::ACQUISITION_ORDER {
        let platform = SimPlatform::new().with_unavailable(resource);
        let handles = platform.clone();

        match MeshHw::attach(platform, HwConfig::default()) {
            Err(HwError::ResourceUnavailable { resource: failed, .. }) => {
                assert_eq!(failed, resource)
            }
            Err(other) => panic!("unexpected error for {resource}: {other:?}"),
            Ok(_) => panic!("attach succeeded without {resource}"),
        }
        assert!(handles.registers.journal().is_empty());
        assert_eq!(handles.regulator.enable_calls(), 0);
        assert_eq!(handles.clock.enable_calls(), 0);
        assert!(handles.reset.history().is_empty());
    }
}

#[test]
fn test_attach_regulator_failure() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    handles.regulator.set_fail_enable(true);

    let result = MeshHw::attach(platform, HwConfig::default());
    assert!(matches!(
        result,
        Err(HwError::ResourceUnavailable { resource: Resource::Regulator, .. })
    ));
    assert_eq!(handles.clock.enable_calls(), 0);
    assert!(handles.registers.journal().is_empty());
}

#[test]
fn test_attach_clock_failure_switches_regulator_off() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    handles.clock.set_fail_enable(true);

    let result = MeshHw::attach(platform, HwConfig::default());
    assert!(matches!(
        result,
        Err(HwError::ResourceUnavailable { resource: Resource::Clock, .. })
    ));
    assert!(!handles.regulator.is_enabled());
    assert_eq!(handles.regulator.disable_calls(), 1);
    assert!(handles.reset.history().is_empty());
}

#[test]
fn test_attach_reset_line_failure_unwinds() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    handles.reset.set_failing(true);

    let result = MeshHw::attach(platform, HwConfig::default());
    assert!(matches!(
        result,
        Err(HwError::ResourceUnavailable { resource: Resource::ResetLine, .. })
    ));
    assert!(!handles.clock.is_enabled());
    assert!(!handles.regulator.is_enabled());
    assert!(handles.registers.journal().is_empty());
}

#[test]
fn test_attach_configuration_failure_unwinds() {
    let config = HwConfig {
        data_rate_policy: DataRatePolicy::Reject,
        ..HwConfig::default()
    };
    let platform = SimPlatform::new();
    let handles = platform.clone();

    let result = MeshHw::attach(platform, config);
    assert!(matches!(result, Err(HwError::InvalidArgument(_))));
    assert!(!handles.clock.is_enabled());
    assert!(!handles.regulator.is_enabled());
    assert_eq!(handles.clock.disable_calls(), 1);
    // Frequency goes out before the data rate is rejected
    assert_eq!(
        handles.registers.writes(),
        vec![(Register::FreqLow, 0xBE), (Register::FreqHigh, 0x23)]
    );
}

#[test]
fn test_attach_rejects_invalid_config_before_acquiring() {
    let config = HwConfig {
        reset_hold_us: 10,
        ..HwConfig::default()
    };
    let platform = SimPlatform::new();
    let handles = platform.clone();

    assert!(matches!(
        MeshHw::attach(platform, config),
        Err(HwError::Config(_))
    ));
    assert_eq!(handles.regulator.enable_calls(), 0);
}

#[test]
fn test_set_frequency_readback() {
    let (hw, handles) = attach_sim();
    hw.set_frequency(868_950_000).unwrap();

    let low = handles.registers.peek(Register::FreqLow);
    let high = handles.registers.peek(Register::FreqHigh);
    assert_eq!(u16::from_le_bytes([low, high]), 8_689);
    assert_eq!(
        handles.registers.writes(),
        vec![(Register::FreqLow, 0xF1), (Register::FreqHigh, 0x21)]
    );
}

proptest! {
    #[test]
    fn prop_set_frequency_round_trips_through_registers(freq in any::<u32>()) {
        let (hw, handles) = attach_sim();
        hw.set_frequency(freq).unwrap();

        let low = handles.registers.peek(Register::FreqLow);
        let high = handles.registers.peek(Register::FreqHigh);
        prop_assert_eq!(u16::from_le_bytes([low, high]), frequency_register(freq));
        prop_assert_eq!(u16::from_le_bytes([low, high]) as u64, freq as u64 * 1_000 / 100_000_000);
    }
}

#[test]
fn test_set_data_rate() {
    let (hw, handles) = attach_sim();

    hw.set_data_rate(250_000).unwrap();
    assert_eq!(handles.registers.peek(Register::DataRate), 250);

    // Default policy keeps the low byte, as deployed devices expect
    hw.set_data_rate(700_000).unwrap();
    assert_eq!(handles.registers.peek(Register::DataRate), 0xBC);
}

#[test]
fn test_set_data_rate_reject_policy() {
    let config = HwConfig {
        data_rate_bps: 250_000,
        data_rate_policy: DataRatePolicy::Reject,
        ..HwConfig::default()
    };
    let (hw, handles) = attach_with(config);

    assert!(matches!(
        hw.set_data_rate(300_000),
        Err(HwError::InvalidArgument(_))
    ));
    assert!(handles.registers.writes().is_empty());
    assert_eq!(handles.registers.peek(Register::DataRate), 250);
}

#[test]
fn test_power_and_gain_written_verbatim() {
    let (hw, handles) = attach_sim();
    hw.set_tx_power(0xFF).unwrap();
    hw.set_rx_gain(0).unwrap();

    assert_eq!(
        handles.registers.writes(),
        vec![(Register::TxPower, 0xFF), (Register::RxGain, 0)]
    );
}

#[test]
fn test_enable_disable() {
    let (hw, handles) = attach_sim();
    hw.enable().unwrap();
    assert_eq!(handles.registers.peek(Register::Control), Control::ENABLE.bits());
    hw.disable().unwrap();

    assert_eq!(
        handles.registers.writes(),
        vec![(Register::Control, 0x01), (Register::Control, 0x00)]
    );
}

#[test]
fn test_tx_rejects_bad_lengths_without_touching_hardware() {
    let (hw, handles) = attach_sim();

    assert!(matches!(hw.tx(&[]), Err(HwError::InvalidArgument(_))));
    assert!(matches!(hw.tx(&[0u8; 256]), Err(HwError::InvalidArgument(_))));
    assert!(handles.registers.journal().is_empty());
}

#[test]
fn test_tx_accepts_max_length() {
    let (hw, handles) = attach_sim();
    let payload: Vec<u8> = (0..=254).collect();
    hw.tx(&payload).unwrap();

    let fifo = handles.registers.transmitted();
    assert_eq!(fifo[0], 255);
    assert_eq!(&fifo[1..], &payload[..]);
}

#[test]
fn test_tx_busy_after_ready_wait() {
    let (hw, handles) = attach_sim();
    handles.registers.set_tx_busy(BusyModel::Forever);
    let start = handles.delay.elapsed();

    assert_eq!(hw.tx(&[0x01]), Err(HwError::Busy));
    assert_eq!(handles.registers.read_count(Register::Status), 1_000);
    assert!(handles.registers.writes().is_empty());
    assert_eq!(handles.delay.elapsed() - start, Duration::from_millis(100));
    assert_eq!(hw.stats().tx_busy, 1);
}

#[test]
fn test_tx_timeout_after_exactly_ten_thousand_polls() {
    let (hw, handles) = attach_sim();
    handles.registers.set_busy_on_tx_start(BusyModel::Forever);

    assert_eq!(hw.tx(&[0xAA, 0xBB]), Err(HwError::Timeout));

    let tx_en = Control::TX_EN.bits();
    assert_eq!(status_reads_after(&handles, Register::Control, tx_en), 10_000);
    assert_eq!(handles.registers.read_count(Register::Status), 10_001);
    assert_eq!(
        handles.registers.writes().last(),
        Some(&(Register::Control, 0))
    );
    assert_eq!(handles.registers.peek(Register::Control), 0);
    assert_eq!(hw.stats().tx_timeouts, 1);
}

#[test]
fn test_end_to_end_transmit_sequence() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    let hw = MeshHw::attach(platform, HwConfig::default()).unwrap();

    hw.set_frequency(915_000_000).unwrap();
    hw.set_data_rate(700_000).unwrap();
    handles.registers.clear_journal();
    handles.registers.set_busy_on_tx_start(BusyModel::Polls(3));

    hw.tx(&[0x01, 0x02, 0x03]).unwrap();

    assert_eq!(
        handles.registers.writes(),
        vec![
            (Register::Control, Control::TX_EN.bits()),
            (Register::FifoData, 3),
            (Register::FifoData, 0x01),
            (Register::FifoData, 0x02),
            (Register::FifoData, 0x03),
            (Register::Control, 0),
        ]
    );
    // One ready check, then three busy polls and the one that sees it clear
    assert_eq!(handles.registers.read_count(Register::Status), 5);

    let stats = hw.stats();
    assert_eq!((stats.tx_frames, stats.tx_bytes), (1, 3));
}

#[test]
fn test_rx_empty_fifo_returns_no_data() {
    let (hw, handles) = attach_sim();

    assert_eq!(hw.rx(), Err(HwError::NoData));
    assert_eq!(handles.registers.read_count(Register::FifoData), 0);
    assert_eq!(handles.registers.read_count(Register::Status), 1);
    assert!(handles.registers.writes().is_empty());
    assert_eq!(hw.stats().rx_empty, 1);
}

#[test]
fn test_rx_reads_one_frame() {
    let (hw, handles) = attach_sim();
    handles.registers.queue_rx_frame(&[0x09, 0x08, 0x07]);
    handles.registers.queue_rx_frame(&[0x42]);

    let frame = hw.rx().unwrap();
    assert_eq!(&frame[..], &[0x09, 0x08, 0x07]);
    assert_eq!(handles.registers.read_count(Register::FifoData), 4);
    assert_eq!(
        handles.registers.writes(),
        vec![
            (Register::Control, Control::RX_EN.bits()),
            (Register::Control, 0),
        ]
    );

    assert_eq!(&hw.rx().unwrap()[..], &[0x42]);
    assert_eq!(hw.rx(), Err(HwError::NoData));

    let stats = hw.stats();
    assert_eq!((stats.rx_frames, stats.rx_bytes), (2, 4));
}

#[test]
fn test_rx_zero_length_frame() {
    let (hw, handles) = attach_sim();
    handles.registers.queue_rx_frame(&[]);

    assert!(hw.rx().unwrap().is_empty());
    assert_eq!(handles.registers.peek(Register::Control), 0);
}

#[test]
fn test_status_and_ready() {
    let (hw, handles) = attach_sim();

    let status = hw.get_status();
    assert_eq!(status, (Status::READY | Status::FIFO_EMPTY).bits());
    assert!(hw.is_ready());

    handles.registers.set_ready(false);
    assert!(!hw.is_ready());
}

#[test]
fn test_detach_makes_device_absent() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    let hw = MeshHw::attach(platform, HwConfig::default()).unwrap();
    hw.enable().unwrap();

    hw.detach();
    assert!(!hw.is_attached());
    assert_eq!(handles.registers.peek(Register::Control), 0);
    assert!(!handles.clock.is_enabled());
    assert!(!handles.regulator.is_enabled());

    handles.registers.clear_journal();
    assert_eq!(hw.enable(), Err(HwError::DeviceAbsent));
    assert_eq!(hw.disable(), Err(HwError::DeviceAbsent));
    assert_eq!(hw.set_frequency(915_000_000), Err(HwError::DeviceAbsent));
    assert_eq!(hw.set_data_rate(100_000), Err(HwError::DeviceAbsent));
    assert_eq!(hw.set_tx_power(10), Err(HwError::DeviceAbsent));
    assert_eq!(hw.set_rx_gain(10), Err(HwError::DeviceAbsent));
    assert_eq!(hw.tx(&[]), Err(HwError::DeviceAbsent));
    assert_eq!(hw.tx(&[1]), Err(HwError::DeviceAbsent));
    assert_eq!(hw.rx(), Err(HwError::DeviceAbsent));
    assert_eq!(hw.set_irq_mask(0xFF), Err(HwError::DeviceAbsent));
    assert_eq!(hw.irq_status(), Err(HwError::DeviceAbsent));
    assert_eq!(hw.get_status(), 0);
    assert!(!hw.is_ready());
    assert!(handles.registers.journal().is_empty());
}

#[test]
fn test_detach_is_idempotent() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    let hw = MeshHw::attach(platform, HwConfig::default()).unwrap();

    hw.detach();
    hw.detach();
    drop(hw);

    assert_eq!(handles.clock.disable_calls(), 1);
    assert_eq!(handles.regulator.disable_calls(), 1);
}

#[test]
fn test_drop_detaches() {
    let platform = SimPlatform::new();
    let handles = platform.clone();
    let hw = MeshHw::attach(platform, HwConfig::default()).unwrap();
    hw.enable().unwrap();

    drop(hw);
    assert!(!handles.regulator.is_enabled());
    assert_eq!(handles.registers.peek(Register::Control), 0);
}

#[test]
fn test_irq_and_fifo_accessors() {
    let (hw, handles) = attach_sim();

    hw.set_irq_mask(0x03).unwrap();
    assert_eq!(handles.registers.writes(), vec![(Register::IrqMask, 0x03)]);

    handles.registers.poke(Register::IrqStatus, 0x01);
    handles.registers.poke(Register::FifoStatus, 0x10);
    assert_eq!(hw.irq_status(), Ok(0x01));
    assert_eq!(hw.fifo_status(), Ok(0x10));

    assert_eq!(hw.irq_line_asserted(), Ok(false));
    handles.irq.drive(true);
    assert_eq!(hw.irq_line_asserted(), Ok(true));

    assert_eq!(hw.irq_number(), Ok(SIM_IRQ_NUMBER));
}

#[test]
fn test_stats_survive_detach_and_reset() {
    let (hw, _handles) = attach_sim();
    hw.tx(&[1, 2]).unwrap();
    hw.detach();

    assert_eq!(hw.stats().tx_frames, 1);
    hw.reset_stats();
    assert_eq!(hw.stats(), Default::default());
}
