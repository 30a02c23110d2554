//! M0/M1 operating-mode control
//!
//! The module samples two input lines to pick its operating mode. Which
//! level pair means "configuration" differs between hardware revisions, so
//! the mapping is data ([`ModeMap`]) rather than hardwired.

use crate::config::timing;
use embedded_hal::digital::{OutputPin, PinState, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;

/// Module operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Transparent / fixed-point transmission
    Normal,
    /// Transmit with wake-up preamble
    WakeUp,
    /// Register access (configuration), also the power-save mode
    ConfigOrPowerSave,
    /// Deep sleep
    Sleep,
}

/// Levels driven onto M0 and M1 for one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    pub m0: PinState,
    pub m1: PinState,
}

impl Levels {
    pub const fn new(m0: PinState, m1: PinState) -> Self {
        Self { m0, m1 }
    }
}

/// Mode to pin-level mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeMap {
    pub normal: Levels,
    pub wake_up: Levels,
    pub config: Levels,
    pub sleep: Levels,
}

impl ModeMap {
    /// E22 / Waveshare SX126x HAT wiring: configuration is M0=LOW, M1=HIGH
    pub const E22: Self = Self {
        normal: Levels::new(PinState::Low, PinState::Low),
        wake_up: Levels::new(PinState::High, PinState::Low),
        config: Levels::new(PinState::Low, PinState::High),
        sleep: Levels::new(PinState::High, PinState::High),
    };

    /// Older revisions that enter configuration with both lines HIGH
    pub const CONFIG_BOTH_HIGH: Self = Self {
        normal: Levels::new(PinState::Low, PinState::Low),
        wake_up: Levels::new(PinState::High, PinState::Low),
        config: Levels::new(PinState::High, PinState::High),
        sleep: Levels::new(PinState::High, PinState::High),
    };

    /// Levels for `mode`
    pub fn levels(&self, mode: Mode) -> Levels {
        match mode {
            Mode::Normal => self.normal,
            Mode::WakeUp => self.wake_up,
            Mode::ConfigOrPowerSave => self.config,
            Mode::Sleep => self.sleep,
        }
    }
}

impl Default for ModeMap {
    fn default() -> Self {
        Self::E22
    }
}

/// Drives the M0/M1 lines and owns the delay used by the driver
///
/// Not `Clone`: one controller per physical module.
pub struct ModeController<M0, M1, D>
where
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    m0: M0,
    m1: M1,
    delay: D,
    map: ModeMap,
    settle_ms: u32,
    current: Option<Mode>,
}

impl<M0, M1, D> ModeController<M0, M1, D>
where
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    /// Create a controller using the E22 mapping
    pub fn new(m0: M0, m1: M1, delay: D) -> Self {
        Self::with_map(m0, m1, delay, ModeMap::default())
    }

    /// Create a controller with an explicit mode mapping
    pub fn with_map(m0: M0, m1: M1, delay: D, map: ModeMap) -> Self {
        Self {
            m0,
            m1,
            delay,
            map,
            settle_ms: timing::MODE_SETTLE_MS,
            current: None,
        }
    }

    /// Override the settle interval applied after every mode change
    pub fn set_settle_ms(&mut self, settle_ms: u32) {
        self.settle_ms = settle_ms;
    }

    /// Last mode set, `None` until the first `set` after power-up
    pub fn current(&self) -> Option<Mode> {
        self.current
    }

    /// Mapping in use
    pub fn map(&self) -> &ModeMap {
        &self.map
    }

    /// Drive the lines for `mode` and wait for the module to settle
    pub async fn set(&mut self, mode: Mode) {
        let levels = self.map.levels(mode);
        let _ = self.m0.set_state(levels.m0);
        let _ = self.m1.set_state(levels.m1);
        self.delay.delay_ms(self.settle_ms).await;
        self.current = Some(mode);
        log::debug!("Mode: {:?} (M0={:?}, M1={:?})", mode, levels.m0, levels.m1);
    }

    /// Set `mode` unless it is already the tracked mode
    pub async fn ensure(&mut self, mode: Mode) {
        if self.current != Some(mode) {
            self.set(mode).await;
        }
    }

    /// Wait on the controller's delay
    pub async fn wait_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }

    /// Release the pins and delay
    pub fn release(self) -> (M0, M1, D) {
        (self.m0, self.m1, self.delay)
    }
}

impl<M0, M1, D> ModeController<M0, M1, D>
where
    M0: StatefulOutputPin,
    M1: StatefulOutputPin,
    D: DelayNs,
{
    /// Set `mode`, then read the lines back
    ///
    /// Returns false and logs a warning if either line disagrees. A mismatch
    /// is a wiring fault, so the mode is still recorded as set.
    pub async fn set_verified(&mut self, mode: Mode) -> bool {
        self.set(mode).await;

        let expected = self.map.levels(mode);
        let m0_ok = read_back(&mut self.m0) == Some(expected.m0);
        let m1_ok = read_back(&mut self.m1) == Some(expected.m1);

        if !(m0_ok && m1_ok) {
            log::warn!(
                "Mode {:?}: read-back mismatch (M0 ok={}, M1 ok={})",
                mode,
                m0_ok,
                m1_ok
            );
        }
        m0_ok && m1_ok
    }
}

fn read_back<P: StatefulOutputPin>(pin: &mut P) -> Option<PinState> {
    pin.is_set_high().ok().map(PinState::from)
}
