//! Runtime session options.
//!
//! Every variant of the controller integration (slot or legacy reporting,
//! stylus support, panel keys, gesture wake, ESD protection, interrupt or
//! polled decode) is selected here at session start instead of at build
//! time, so one binary can drive any panel wiring.

use crate::reg::ADDR;

/// Hard upper bound on simultaneous contacts supported by the controller.
pub const MAX_CONTACTS: usize = 10;
/// Number of panel keys encoded in the key byte.
pub const MAX_KEYS: usize = 4;

/// Coordinate range reported by the panel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Resolution {
  pub x_max: u16,
  pub y_max: u16,
}

impl Resolution {
  pub const fn new(x_max: u16, y_max: u16) -> Self {
    Self { x_max, y_max }
  }

  pub const fn is_unset(&self) -> bool {
    self.x_max == 0 && self.y_max == 0
  }
}

/// Interrupt trigger encoded in bits 0..1 of the config module switch byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
  Rising = 0,
  #[default]
  Falling = 1,
  Low = 2,
  High = 3,
}

impl From<u8> for Trigger {
  fn from(bits: u8) -> Self {
    match bits & 0x03 {
      0 => Self::Rising,
      1 => Self::Falling,
      2 => Self::Low,
      _ => Self::High,
    }
  }
}

/// How contacts are delivered to the event sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportMode {
  /// Per-slot contact tracking with explicit lifts.
  #[default]
  Slots,
  /// Anonymous contacts with a single release once every finger is gone.
  Legacy,
}

/// Strategy used to bring the controller out of sleep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeMode {
  /// A plain reset; always available.
  #[default]
  Reset,
  /// Pulse INT, reset, and probe the bus until the chip answers.
  Probe,
}

/// Stimulus that drives the decode task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
  #[default]
  Interrupt,
  Polling,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
  pub address: u8,
  pub max_touch: u8,
  pub report: ReportMode,
  pub pen: bool,
  pub pen_buttons: bool,
  /// Key codes for bits 0..3 of the key byte. Empty disables panel keys.
  pub keys: &'static [u16],
  pub gesture_wakeup: bool,
  pub esd: bool,
  pub send_config: bool,
  /// Resolution and trigger forced into the config blob before it is sent.
  pub custom: Option<(Resolution, Trigger)>,
  pub fallback_resolution: Resolution,
  pub fallback_trigger: Trigger,
  pub swap_xy: bool,
  pub wake: WakeMode,
  pub power_cycle_recovery: bool,
  pub source: Source,
  pub poll_ms: u32,
  pub esd_ms: u32,
}

impl Default for Options {
  fn default() -> Self {
    Self::new()
  }
}

impl Options {
  pub const fn new() -> Self {
    Self {
      address: ADDR,
      max_touch: 5,
      report: ReportMode::Slots,
      pen: false,
      pen_buttons: false,
      keys: &[],
      gesture_wakeup: true,
      esd: false,
      send_config: true,
      custom: None,
      fallback_resolution: Resolution::new(4096, 4096),
      fallback_trigger: Trigger::Falling,
      swap_xy: false,
      wake: WakeMode::Reset,
      power_cycle_recovery: false,
      source: Source::Interrupt,
      poll_ms: 16,
      esd_ms: 2000,
    }
  }

  pub const fn with_address(mut self, address: u8) -> Self {
    self.address = address;
    self
  }

  /// Contacts beyond [`MAX_CONTACTS`] are clamped.
  pub const fn with_max_touch(mut self, max_touch: u8) -> Self {
    self.max_touch = if max_touch as usize > MAX_CONTACTS { MAX_CONTACTS as u8 } else { max_touch };
    self
  }

  pub const fn with_report(mut self, report: ReportMode) -> Self {
    self.report = report;
    self
  }

  pub const fn with_pen(mut self, pen: bool, buttons: bool) -> Self {
    self.pen = pen;
    self.pen_buttons = buttons;
    self
  }

  pub const fn with_keys(mut self, keys: &'static [u16]) -> Self {
    self.keys = keys;
    self
  }

  pub const fn with_gesture_wakeup(mut self, enabled: bool) -> Self {
    self.gesture_wakeup = enabled;
    self
  }

  pub const fn with_esd(mut self, enabled: bool, period_ms: u32) -> Self {
    self.esd = enabled;
    self.esd_ms = period_ms;
    self
  }

  pub const fn with_send_config(mut self, send: bool) -> Self {
    self.send_config = send;
    self
  }

  pub const fn with_custom(mut self, resolution: Resolution, trigger: Trigger) -> Self {
    self.custom = Some((resolution, trigger));
    self
  }

  pub const fn with_fallback(mut self, resolution: Resolution, trigger: Trigger) -> Self {
    self.fallback_resolution = resolution;
    self.fallback_trigger = trigger;
    self
  }

  pub const fn with_swap_xy(mut self, swap: bool) -> Self {
    self.swap_xy = swap;
    self
  }

  pub const fn with_wake(mut self, wake: WakeMode) -> Self {
    self.wake = wake;
    self
  }

  pub const fn with_power_cycle_recovery(mut self, enabled: bool) -> Self {
    self.power_cycle_recovery = enabled;
    self
  }

  pub const fn with_source(mut self, source: Source, poll_ms: u32) -> Self {
    self.source = source;
    self.poll_ms = poll_ms;
    self
  }

  pub(crate) fn key_count(&self) -> usize {
    self.keys.len().min(MAX_KEYS)
  }

  pub(crate) fn has_key_byte(&self) -> bool {
    self.pen_buttons || self.key_count() > 0
  }

  /// The INT level held during reset selects the bus address.
  pub(crate) fn int_level_for_address(&self) -> bool {
    self.address == crate::reg::ALT_ADDR
  }
}
