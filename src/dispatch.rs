//! Stimulus routing between interrupt handlers, timers and the decode task.
//!
//! Interrupt edges and poll ticks are producers feeding a single-slot queue
//! drained by exactly one decode task. An interrupt edge closes the IRQ gate
//! before it enqueues, and the gate only reopens once the decode cycle has
//! finished, so a stalled bus can never pile up work.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{error, trace, warn};

use crate::{EventSink, Gt9xx, Health, Lines, Source};

/// Origin of one unit of decode work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stimulus {
  Interrupt,
  Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gate {
  irq_enabled: bool,
  irq_freed: bool,
  timer: bool,
  esd: bool,
}

impl Gate {
  const CLOSED: Self = Self { irq_enabled: false, irq_freed: true, timer: false, esd: false };
}

/// Shared stimulus state for one session. Place it in a `static`.
pub struct Dispatcher {
  queue: Channel<CriticalSectionRawMutex, Stimulus, 1>,
  gate: BlockingMutex<CriticalSectionRawMutex, Cell<Gate>>,
  esd_wake: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for Dispatcher {
  fn default() -> Self {
    Self::new()
  }
}

impl Dispatcher {
  pub const fn new() -> Self {
    Self {
      queue: Channel::new(),
      gate: BlockingMutex::new(Cell::new(Gate::CLOSED)),
      esd_wake: Signal::new(),
    }
  }

  fn update<R>(&self, f: impl FnOnce(&mut Gate) -> R) -> R {
    self.gate.lock(|cell| {
      let mut gate = cell.get();
      let out = f(&mut gate);
      cell.set(gate);
      out
    })
  }

  fn gate(&self) -> Gate {
    self.gate.lock(Cell::get)
  }

  /// Call from the INT edge handler. Closes the gate and queues a decode.
  ///
  /// Returns `false` when the edge was ignored because the gate was closed.
  pub fn interrupt(&self) -> bool {
    let open = self.update(|gate| {
      let open = gate.irq_enabled && !gate.irq_freed;
      gate.irq_enabled = false;
      open
    });
    if open && self.queue.try_send(Stimulus::Interrupt).is_err() {
      trace!("decode already pending");
    }
    open
  }

  /// Call from the poll timer. Coalesces with a decode that is still pending.
  pub fn tick(&self) -> bool {
    if !self.gate().timer {
      return false;
    }
    self.queue.try_send(Stimulus::Timer).is_ok()
  }

  /// Next unit of decode work.
  pub async fn next(&self) -> Stimulus {
    self.queue.receive().await
  }

  pub fn irq_enabled(&self) -> bool {
    let gate = self.gate();
    gate.irq_enabled && !gate.irq_freed
  }

  pub fn irq_disable(&self) {
    self.update(|gate| gate.irq_enabled = false);
  }

  /// Reopen the gate unless the interrupt has been released.
  pub fn irq_enable(&self) {
    self.update(|gate| gate.irq_enabled = !gate.irq_freed);
  }

  /// Release the interrupt entirely; only [`Dispatcher::irq_request`] reopens it.
  pub fn irq_free(&self) {
    self.update(|gate| {
      gate.irq_enabled = false;
      gate.irq_freed = true;
    });
  }

  pub fn irq_request(&self) {
    self.update(|gate| {
      gate.irq_freed = false;
      gate.irq_enabled = true;
    });
  }

  pub fn timer_running(&self) -> bool {
    self.gate().timer
  }

  pub fn timer_start(&self) {
    self.update(|gate| gate.timer = true);
  }

  pub fn timer_cancel(&self) {
    self.update(|gate| gate.timer = false);
  }

  /// Register the decode stimulus for `source`.
  pub(crate) fn arm(&self, source: Source) {
    match source {
      Source::Interrupt => self.irq_request(),
      Source::Polling => self.timer_start(),
    }
  }

  /// Unregister the decode stimulus for `source`.
  pub(crate) fn disarm(&self, source: Source) {
    match source {
      Source::Interrupt => self.irq_free(),
      Source::Polling => self.timer_cancel(),
    }
  }

  /// Re-enable the stimulus after a decode cycle. The poll timer re-arms itself.
  pub(crate) fn rearm(&self, source: Source) {
    if source == Source::Interrupt {
      self.irq_enable();
    }
  }

  /// Switch the watchdog. Returns `true` when the state changed.
  pub fn esd_switch(&self, on: bool) -> bool {
    let changed = self.update(|gate| {
      let changed = gate.esd != on;
      gate.esd = on;
      changed
    });
    if changed && on {
      self.esd_wake.signal(());
    }
    changed
  }

  pub fn esd_running(&self) -> bool {
    self.gate().esd
  }

  async fn esd_wait(&self) {
    while !self.esd_running() {
      self.esd_wake.wait().await;
    }
  }
}

/// Decode task: drains the queue and services one stimulus at a time.
pub async fn run_decoder<M, I, E, L, D, S>(dispatcher: &Dispatcher, session: &Mutex<M, Gt9xx<'_, I, L, D>>, sink: &mut S) -> !
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  S: EventSink + ?Sized,
{
  loop {
    let stimulus = dispatcher.next().await;
    trace!("decode on {:?}", stimulus);
    let mut touch = session.lock().await;
    // errors are logged by the cycle itself; the next stimulus retries
    let _ = touch.service(sink).await;
  }
}

/// Poll timer task for sessions without a usable interrupt line.
///
/// Ticks every [`Options::poll_ms`](crate::Options::poll_ms) of the session.
pub async fn run_poll_timer<M, I, E, L, D, T>(dispatcher: &Dispatcher, session: &Mutex<M, Gt9xx<'_, I, L, D>>, mut delay: T) -> !
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  T: DelayNs,
{
  let period_ms = session.lock().await.options().poll_ms;
  loop {
    delay.delay_ms(period_ms).await;
    dispatcher.tick();
  }
}

/// Watchdog task: health-checks the chip every
/// [`Options::esd_ms`](crate::Options::esd_ms) while switched on.
pub async fn run_watchdog<M, I, E, L, D, T>(dispatcher: &Dispatcher, session: &Mutex<M, Gt9xx<'_, I, L, D>>, mut delay: T) -> !
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
  T: DelayNs,
{
  let period_ms = session.lock().await.options().esd_ms;
  loop {
    dispatcher.esd_wait().await;
    delay.delay_ms(period_ms).await;
    if !dispatcher.esd_running() {
      continue;
    }
    let mut touch = session.lock().await;
    match touch.esd_check().await {
      Ok(Health::Recovered) => warn!("controller recovered by watchdog"),
      Ok(_) => {}
      Err(e) => error!("watchdog cycle failed: {}", e),
    }
  }
}
