#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Async, `no_std` protocol and state core for Goodix GT9xx capacitive touch
//! controllers (GT911, GT9110, GT927, GT928, GT967 and relatives).
//!
//! The crate turns an interrupt edge or poll tick into a decoded multi-touch
//! frame delivered to an [`EventSink`], while keeping the chip alive:
//!
//! - Retry-wrapped register access with reset-on-failure escalation
//! - The reset, sleep, doze and wake timing sequences
//! - Configuration blob selection by sensor id, checksum and delivery
//! - Per-slot contact tracking with lifts inferred from absence
//! - Gesture wake decoding while the panel dozes
//! - Suspend/resume with a firmware-update veto
//! - An ESD watchdog that forces a full recovery when the chip hangs
//!
//! Stimuli, the decode queue and the watchdog switch live in a [`Dispatcher`]
//! that can be placed in a `static` and shared with interrupt handlers.
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use embassy_sync::mutex::Mutex;
//! use embedded_hal_async::{delay::DelayNs, i2c::{I2c, SevenBitAddress}};
//! use gt9xx::{ConfigGroups, Dispatcher, Event, Gt9xx, Lines, Options};
//!
//! static DISPATCHER: Dispatcher = Dispatcher::new();
//! static PANEL: [u8; 186] = [0x41; 186];
//!
//! async fn example<I, L, D, E>(i2c: I, lines: L, delay: D) -> Result<(), gt9xx::Error<E>>
//! where
//!   I: I2c<SevenBitAddress, Error = E>,
//!   L: Lines,
//!   D: DelayNs,
//!   E: embedded_hal_async::i2c::Error,
//! {
//!   let mut touch = Gt9xx::new(i2c, lines, delay, &DISPATCHER, Options::new());
//!   let version = touch.attach(&ConfigGroups::single(&PANEL)).await?;
//!   log::info!("attached {:?}", version);
//!
//!   let session: Mutex<CriticalSectionRawMutex, _> = Mutex::new(touch);
//!   let mut events: heapless::Vec<Event, 64> = heapless::Vec::new();
//!   gt9xx::run_decoder(&DISPATCHER, &session, &mut events).await
//! }
//! ```
mod config;
mod control;
mod dispatch;
mod event;
mod lifecycle;
mod lines;
mod options;
mod power;
mod reg;
mod rw;
mod touch;
mod watchdog;

#[cfg(test)]
mod mock;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

pub use config::{ConfigBlob, ConfigGroups, ConfigSnapshot, ConfigSource, CONFIG_MAX_LEN, CONFIG_MIN_LEN};
pub use control::Version;
pub use dispatch::{run_decoder, run_poll_timer, run_watchdog, Dispatcher, Stimulus};
pub use event::{Batch, Contact, Event, EventSink, Gesture, Key, Surface, SwipeDirection, UnknownGesture};
pub use lifecycle::PowerState;
pub use lines::{Lines, OpenDrainLines, PinState};
pub use options::*;
pub use reg::{ADDR, ALT_ADDR};
pub use touch::{Frame, Record, SlotTracker, Status};
pub use watchdog::Health;

use reg::*;

/// Reasons the panel configuration could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PanelFault {
  /// The sensor id register held a value outside 0..=5.
  InvalidSensorId(u8),
  /// The sensor id register never read back consistently.
  SensorIdUnreadable,
  /// No configuration group exists for the sensor id.
  MissingGroup(u8),
  /// The configuration group is shorter than [`CONFIG_MIN_LEN`] or longer
  /// than [`CONFIG_MAX_LEN`].
  BadGroupLength { group: u8, len: usize },
}

/// Errors that can occur while interacting with the controller.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I²C bus transaction failed after every retry.
  #[error("bus transaction failed")]
  I2c(E),
  /// A reset, interrupt or rail line could not be driven.
  #[error("control line fault")]
  Pin,
  /// Two consecutive reads of a register never agreed.
  #[error("register {reg:#06x} never read back consistently")]
  Unconfirmed { reg: u16 },
  /// The firmware marker is absent; the on-chip config cannot be trusted.
  #[error("firmware marker missing")]
  Firmware,
  /// The configuration for this panel could not be built.
  #[error("panel init failed: {0:?}")]
  PanelInit(PanelFault),
  /// An operation attempted to write a buffer larger than the protocol allows.
  #[error("buffer exceeds protocol limit")]
  BufferOverflow,
  /// The chip did not answer after the wake sequence.
  #[error("chip did not wake")]
  WakeFailed,
}

/// Protocol and state core for one attached GT9xx controller.
///
/// The session owns the bus, the control lines and a delay provider, and
/// borrows the [`Dispatcher`] through which stimuli reach the decode task.
/// Create it with [`Gt9xx::new`], then call [`Gt9xx::attach`].
pub struct Gt9xx<'d, I, L, D> {
  i2c: I,
  lines: L,
  delay: D,
  dispatcher: &'d Dispatcher,
  options: Options,
  config: ConfigBlob,
  resolution: Resolution,
  trigger: Trigger,
  power: PowerState,
  suspended: bool,
  gesture_wakeup: bool,
  firmware_update: bool,
  panel_fault: bool,
  firmware_fault: bool,
  tracker: SlotTracker,
}

impl<'d, I, L, D, E> Gt9xx<'d, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Create a session. Nothing is sent to the chip until
  /// [`Gt9xx::attach`] runs.
  pub fn new(i2c: I, lines: L, delay: D, dispatcher: &'d Dispatcher, options: Options) -> Self {
    let options = options.with_max_touch(options.max_touch);
    Self {
      i2c,
      lines,
      delay,
      dispatcher,
      options,
      config: ConfigBlob::empty(),
      resolution: Resolution::default(),
      trigger: options.fallback_trigger,
      power: PowerState::Active,
      suspended: false,
      gesture_wakeup: false,
      firmware_update: false,
      panel_fault: false,
      firmware_fault: false,
      tracker: SlotTracker::new(),
    }
  }

  pub fn options(&self) -> &Options {
    &self.options
  }

  pub fn power_state(&self) -> PowerState {
    self.power
  }

  /// Negotiated interrupt trigger.
  pub fn trigger(&self) -> Trigger {
    self.trigger
  }

  /// `true` when the panel configuration could not be built for this session.
  pub fn panel_fault(&self) -> bool {
    self.panel_fault
  }

  /// `true` when the firmware marker check failed.
  pub fn firmware_fault(&self) -> bool {
    self.firmware_fault
  }
}
