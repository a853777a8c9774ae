//! Session lifecycle: attach, suspend/resume and the firmware-update veto.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, error, info, warn};

use crate::power::pin;
use crate::{ConfigSource, Error, Gt9xx, Lines, PinState, Resolution, Version};

/// Settle time after suspend so the chip does not immediately re-wake.
const SUSPEND_SETTLE_MS: u32 = 58;

/// Device power state as seen by the decode path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
  /// Normal decode.
  Active,
  /// Sleeping with the decode stimulus released.
  Asleep,
  /// Powered and armed for gesture wake; decode cycles read gesture codes.
  Doze,
  /// A gesture fired; waiting for an explicit resume.
  Woken,
}

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Bring up the chip and arm the decode stimulus.
  ///
  /// Fails only when the chip does not answer on the bus. Panel
  /// configuration faults are logged and leave the session on its fallback
  /// geometry. Returns the firmware version when it could be read.
  pub async fn attach<S: ConfigSource + ?Sized>(&mut self, source: &S) -> Result<Option<Version>, Error<E>> {
    self.reset(20).await?;
    self.i2c_test().await.inspect_err(|_| error!("controller not answering"))?;

    let version = match self.version().await {
      Ok(version) => {
        info!("IC version: {}", version);
        Some(version)
      }
      Err(e) => {
        warn!("reading version failed: {}", e);
        None
      }
    };

    if let Err(e) = self.init_panel(source).await {
      warn!("panel init failed ({}), using default resolution and trigger", e);
      self.use_fallback_geometry();
    }

    self.power = PowerState::Active;
    self.dispatcher.arm(self.options.source);
    self.esd_switch(true);
    Ok(version)
  }

  /// Release the decode stimulus, stop the watchdog and hand back the peripherals.
  pub fn detach(self) -> (I, L, D) {
    self.dispatcher.disarm(self.options.source);
    self.dispatcher.esd_switch(false);
    (self.i2c, self.lines, self.delay)
  }

  /// Put the chip to sleep, or into gesture doze when gesture wake is on.
  ///
  /// Redundant calls are no-ops, as are calls during a firmware update.
  pub async fn suspend(&mut self) -> Result<(), Error<E>> {
    if self.suspended || self.firmware_update {
      debug!("suspend skipped");
      return Ok(());
    }
    info!("suspend");
    self.suspended = true;
    self.esd_switch(false);

    let result = if self.gesture_wakeup {
      self.enter_doze().await
    } else {
      self.dispatcher.disarm(self.options.source);
      let slept = self.enter_sleep().await;
      self.power = PowerState::Asleep;
      let lines = pin(self.lines.set_power(false)).and_then(|_| pin(self.lines.select_pins(PinState::Suspend)));
      slept.and(lines)
    };
    if let Err(e) = &result {
      error!("suspend failed: {}", e);
    }

    self.delay.delay_ms(SUSPEND_SETTLE_MS).await;
    result
  }

  /// Wake the chip, resend its configuration and re-arm decode.
  ///
  /// Redundant calls are no-ops, as are calls during a firmware update.
  pub async fn resume(&mut self) -> Result<(), Error<E>> {
    if !self.suspended || self.firmware_update {
      debug!("resume skipped");
      return Ok(());
    }
    info!("resume");

    let dozing = matches!(self.power, PowerState::Doze | PowerState::Woken);
    if !dozing {
      pin(self.lines.set_power(true))?;
      pin(self.lines.select_pins(PinState::Active))?;
    }

    let woke = self.wake().await;
    if let Err(e) = &woke {
      error!("resume failed: {}", e);
    }
    // the chip may have lost its volatile config
    if let Err(e) = self.send_config().await {
      error!("resending config failed: {}", e);
    }

    self.dispatcher.arm(self.options.source);
    self.suspended = false;
    self.esd_switch(true);
    woke
  }

  /// Veto decode and health checks while firmware is being replaced.
  pub fn begin_firmware_update(&mut self) {
    info!("firmware update started");
    self.firmware_update = true;
    self.esd_switch(false);
    self.dispatcher.irq_disable();
  }

  pub fn end_firmware_update(&mut self) {
    info!("firmware update finished");
    self.firmware_update = false;
    self.dispatcher.rearm(self.options.source);
    if !self.suspended {
      self.esd_switch(true);
    }
  }

  pub fn firmware_update_in_progress(&self) -> bool {
    self.firmware_update
  }

  /// Enable or disable gesture wake for the next suspend.
  ///
  /// Returns `false` when the panel was set up without gesture support.
  pub fn set_gesture_wakeup(&mut self, enabled: bool) -> bool {
    if enabled && !self.options.gesture_wakeup {
      return false;
    }
    info!("gesture wakeup {}", if enabled { "enabled" } else { "disabled" });
    self.gesture_wakeup = enabled;
    true
  }

  pub fn gesture_wakeup(&self) -> bool {
    self.gesture_wakeup
  }

  pub fn is_suspended(&self) -> bool {
    self.suspended
  }

  /// Coordinate range of reported contacts, after any X/Y swap.
  pub fn axes(&self) -> Resolution {
    if self.options.swap_xy {
      Resolution::new(self.resolution.y_max, self.resolution.x_max)
    } else {
      self.resolution
    }
  }

  /// Switch the watchdog. Returns `true` when its state changed.
  pub fn esd_switch(&mut self, on: bool) -> bool {
    if !self.options.esd {
      return false;
    }
    let changed = self.dispatcher.esd_switch(on);
    if changed {
      debug!("esd {}", if on { "on" } else { "off" });
    }
    changed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mock::*;
  use crate::{ConfigGroups, Dispatcher, Options, Source, CONFIG_MAX_LEN, CONFIG_MIN_LEN};
  use embassy_futures::block_on;

  fn group() -> Vec<u8> {
    let mut g = vec![0u8; CONFIG_MIN_LEN];
    g[0] = 0x41;
    g[1..5].copy_from_slice(&[0x20, 0x03, 0xE0, 0x01]);
    g
  }

  fn chip() -> MockBus {
    let mut bus = MockBus::new();
    bus.poke(0x8140, b"911\0");
    bus.poke(0x8144, &[0x60, 0x10]);
    bus.poke(0x41E4, &[0xBE]);
    bus.poke(0x8047, &[0x41]);
    bus
  }

  fn attached<'d>(dispatcher: &'d Dispatcher, options: Options, g: &[u8]) -> MockSession<'d> {
    let mut touch = session(chip(), dispatcher, options);
    let version = block_on(touch.attach(&ConfigGroups::single(g))).unwrap();
    assert_eq!(version.map(|v| v.firmware), Some(0x1060));
    settle(&mut touch);
    touch
  }

  fn config_writes(touch: &MockSession<'_>) -> usize {
    touch.i2c.writes().iter().filter(|(reg, data)| *reg == 0x8047 && data.len() == CONFIG_MAX_LEN).count()
  }

  #[test]
  fn attach_arms_decode() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let touch = attached(&dispatcher, Options::new(), &g);

    assert!(dispatcher.irq_enabled());
    assert_eq!(touch.axes(), Resolution::new(800, 480));
    assert_eq!(touch.power_state(), PowerState::Active);
  }

  #[test]
  fn attach_falls_back_on_panel_fault() {
    let dispatcher = Dispatcher::new();
    let mut bus = chip();
    bus.poke(0x814A, &[0x07]);
    let mut touch = session(bus, &dispatcher, Options::new());
    let g = group();

    block_on(touch.attach(&ConfigGroups::new([&g, &g, &[], &[], &[], &[]]))).unwrap();
    assert!(touch.panel_fault());
    assert_eq!(touch.axes(), Resolution::new(4096, 4096));
    assert_eq!(config_writes(&touch), 0);
    assert!(dispatcher.irq_enabled());
  }

  #[test]
  fn attach_fails_without_chip() {
    let dispatcher = Dispatcher::new();
    let mut bus = MockBus::new();
    bus.fail_next(usize::MAX);
    let mut touch = session(bus, &dispatcher, Options::new());

    assert!(block_on(touch.attach(&ConfigGroups::single(&[]))).is_err());
    assert!(!dispatcher.irq_enabled());
  }

  #[test]
  fn swapped_axes() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let touch = attached(&dispatcher, Options::new().with_swap_xy(true), &g);
    assert_eq!(touch.axes(), Resolution::new(480, 800));
  }

  #[test]
  fn suspend_sleeps_and_is_idempotent() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let mut touch = attached(&dispatcher, Options::new(), &g);

    block_on(touch.suspend()).unwrap();
    let writes = touch.i2c.writes().to_vec();
    let trace = touch.lines.trace().to_vec();
    assert_eq!(writes, vec![(0x8040, vec![0x05])]);
    assert_eq!(trace, vec![LineOp::Int(false), LineOp::Power(false), LineOp::Pins(PinState::Suspend)]);
    assert_eq!(touch.delay.log(), &[5, 58]);
    assert_eq!(touch.power_state(), PowerState::Asleep);
    assert!(touch.is_suspended());
    assert!(!dispatcher.irq_enabled());

    block_on(touch.suspend()).unwrap();
    assert_eq!(touch.i2c.writes(), writes.as_slice());
    assert_eq!(touch.lines.trace(), trace.as_slice());
    assert_eq!(touch.delay.log(), &[5, 58]);
  }

  #[test]
  fn resume_resends_config() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let mut touch = attached(&dispatcher, Options::new(), &g);
    block_on(touch.suspend()).unwrap();
    settle(&mut touch);

    block_on(touch.resume()).unwrap();
    assert_eq!(&touch.lines.trace()[..3], &[LineOp::Power(true), LineOp::Pins(PinState::Active), LineOp::Reset(false)]);
    assert_eq!(config_writes(&touch), 1);
    assert!(dispatcher.irq_enabled());
    assert!(!touch.is_suspended());
    assert_eq!(touch.power_state(), PowerState::Active);

    settle(&mut touch);
    block_on(touch.resume()).unwrap();
    assert!(touch.i2c.writes().is_empty());
  }

  #[test]
  fn gesture_suspend_dozes_and_keeps_irq() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let mut touch = attached(&dispatcher, Options::new(), &g);
    assert!(touch.set_gesture_wakeup(true));

    block_on(touch.suspend()).unwrap();
    assert_eq!(touch.power_state(), PowerState::Doze);
    assert_eq!(touch.i2c.writes(), &[(0x8046, vec![0x08]), (0x8040, vec![0x08])]);
    assert!(dispatcher.irq_enabled());
    assert_eq!(touch.delay.log(), &[58]);

    block_on(touch.resume()).unwrap();
    assert_eq!(touch.power_state(), PowerState::Active);
    assert!(dispatcher.irq_enabled());
  }

  #[test]
  fn gesture_toggle_needs_support() {
    let dispatcher = Dispatcher::new();
    let mut touch = session(MockBus::new(), &dispatcher, Options::new().with_gesture_wakeup(false));
    assert!(!touch.set_gesture_wakeup(true));
    assert!(!touch.gesture_wakeup());
  }

  #[test]
  fn firmware_update_vetoes_power_changes() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let mut touch = attached(&dispatcher, Options::new().with_esd(true, 2000), &g);
    assert!(dispatcher.esd_running());

    touch.begin_firmware_update();
    assert!(!dispatcher.esd_running());
    assert!(!dispatcher.irq_enabled());

    block_on(touch.suspend()).unwrap();
    assert!(!touch.is_suspended());
    assert!(touch.i2c.writes().is_empty());

    touch.end_firmware_update();
    assert!(dispatcher.esd_running());
    assert!(dispatcher.irq_enabled());
  }

  #[test]
  fn polled_session_uses_timer() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let mut touch = attached(&dispatcher, Options::new().with_source(Source::Polling, 16), &g);
    assert!(dispatcher.timer_running());

    block_on(touch.suspend()).unwrap();
    assert!(!dispatcher.timer_running());
    block_on(touch.resume()).unwrap();
    assert!(dispatcher.timer_running());
  }

  #[test]
  fn suspend_stops_watchdog_and_resume_restarts_it() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let mut touch = attached(&dispatcher, Options::new().with_esd(true, 2000), &g);

    block_on(touch.suspend()).unwrap();
    assert!(!dispatcher.esd_running());
    block_on(touch.resume()).unwrap();
    assert!(dispatcher.esd_running());
  }

  #[test]
  fn detach_releases_everything() {
    let dispatcher = Dispatcher::new();
    let g = group();
    let touch = attached(&dispatcher, Options::new().with_esd(true, 2000), &g);

    let (bus, _lines, _delay) = touch.detach();
    assert!(!dispatcher.irq_enabled());
    assert!(!dispatcher.esd_running());
    assert_eq!(bus.peek(0x8140, 3), b"911");
  }
}
