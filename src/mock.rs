//! Host-side doubles for the bus, control lines and delay provider.

use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, Operation};

use std::cell::RefCell;

use crate::{Dispatcher, Gt9xx, Lines, Options, PinState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

impl embedded_hal::i2c::Error for MockError {
  fn kind(&self) -> ErrorKind {
    ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
  }
}

/// Register memory behind a 16-bit pointer.
pub struct MockBus {
  mem: Vec<u8>,
  fail: usize,
  failing: Vec<(u16, usize)>,
  unstable: Vec<(u16, usize)>,
  reads: Vec<u16>,
  writes: Vec<(u16, Vec<u8>)>,
  script: Vec<(u16, Vec<u8>)>,
}

impl MockBus {
  pub fn new() -> Self {
    Self {
      mem: vec![0; 0x1_0000],
      fail: 0,
      failing: Vec::new(),
      unstable: Vec::new(),
      reads: Vec::new(),
      writes: Vec::new(),
      script: Vec::new(),
    }
  }

  pub fn poke(&mut self, addr: u16, bytes: &[u8]) {
    let at = addr as usize;
    self.mem[at..at + bytes.len()].copy_from_slice(bytes);
  }

  pub fn peek(&self, addr: u16, len: usize) -> &[u8] {
    &self.mem[addr as usize..addr as usize + len]
  }

  /// Fail the next `n` transactions of any kind.
  pub fn fail_next(&mut self, n: usize) {
    self.fail = n;
  }

  /// Fail the next `n` transactions addressed at `addr`.
  pub fn fail_at(&mut self, addr: u16, n: usize) {
    self.failing.push((addr, n));
  }

  /// Every read at `addr` returns different bytes.
  pub fn unstable(&mut self, addr: u16) {
    self.unstable_for(addr, usize::MAX);
  }

  pub fn unstable_for(&mut self, addr: u16, reads: usize) {
    self.unstable.push((addr, reads));
  }

  /// Queue bytes that the next read at `addr` returns, ahead of memory.
  pub fn script(&mut self, addr: u16, bytes: &[u8]) {
    self.script.push((addr, bytes.to_vec()));
  }

  pub fn writes(&self) -> &[(u16, Vec<u8>)] {
    &self.writes
  }

  pub fn clear_writes(&mut self) {
    self.writes.clear();
  }

  pub fn reads_of(&self, addr: u16) -> usize {
    self.reads.iter().filter(|r| **r == addr).count()
  }

  fn should_fail(&mut self, addr: u16) -> bool {
    if self.fail > 0 {
      self.fail -= 1;
      return true;
    }
    if let Some(entry) = self.failing.iter_mut().find(|(a, n)| *a == addr && *n > 0) {
      entry.1 -= 1;
      return true;
    }
    false
  }
}

impl ErrorType for MockBus {
  type Error = MockError;
}

impl I2c for MockBus {
  async fn transaction(&mut self, _address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
    let mut pointer = None;
    for op in operations.iter_mut() {
      match op {
        Operation::Write(bytes) => {
          let addr = u16::from_be_bytes([bytes[0], bytes[1]]);
          if self.should_fail(addr) {
            return Err(MockError);
          }
          pointer = Some(addr);
          if bytes.len() > 2 {
            self.poke(addr, &bytes[2..]);
            self.writes.push((addr, bytes[2..].to_vec()));
          }
        }
        Operation::Read(buf) => {
          let addr = pointer.ok_or(MockError)?;
          self.reads.push(addr);
          if let Some(i) = self.script.iter().position(|(a, _)| *a == addr) {
            let (_, bytes) = self.script.remove(i);
            buf.copy_from_slice(&bytes[..buf.len()]);
            continue;
          }
          buf.copy_from_slice(&self.mem[addr as usize..addr as usize + buf.len()]);
          let count = self.reads.len() as u8;
          if let Some(entry) = self.unstable.iter_mut().find(|(a, n)| *a == addr && *n > 0) {
            entry.1 -= 1;
            buf.iter_mut().for_each(|b| *b ^= count | 0x80);
          }
        }
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
  Reset(bool),
  ReleaseReset,
  Int(bool),
  ListenInt,
  Power(bool),
  Pins(PinState),
}

#[derive(Default)]
pub struct MockLines {
  trace: Vec<LineOp>,
  rails: bool,
  broken_reset: bool,
}

impl MockLines {
  pub fn with_rails() -> Self {
    Self { rails: true, ..Self::default() }
  }

  /// Make every RST transition fail until repaired.
  pub fn break_reset(&mut self, broken: bool) {
    self.broken_reset = broken;
  }

  pub fn trace(&self) -> &[LineOp] {
    &self.trace
  }

  pub fn clear(&mut self) {
    self.trace.clear();
  }

  pub fn resets(&self) -> usize {
    self.trace.iter().filter(|op| **op == LineOp::Reset(false)).count()
  }
}

impl Lines for MockLines {
  type Error = ();

  fn drive_reset(&mut self, high: bool) -> Result<(), ()> {
    if self.broken_reset {
      return Err(());
    }
    self.trace.push(LineOp::Reset(high));
    Ok(())
  }

  fn release_reset(&mut self) -> Result<(), ()> {
    self.trace.push(LineOp::ReleaseReset);
    Ok(())
  }

  fn drive_int(&mut self, high: bool) -> Result<(), ()> {
    self.trace.push(LineOp::Int(high));
    Ok(())
  }

  fn listen_int(&mut self) -> Result<(), ()> {
    self.trace.push(LineOp::ListenInt);
    Ok(())
  }

  fn set_power(&mut self, on: bool) -> Result<bool, ()> {
    self.trace.push(LineOp::Power(on));
    Ok(self.rails)
  }

  fn select_pins(&mut self, state: PinState) -> Result<(), ()> {
    self.trace.push(LineOp::Pins(state));
    Ok(())
  }
}

/// Records requested delays in milliseconds; never waits.
#[derive(Default)]
pub struct MockDelay(Vec<u32>);

impl MockDelay {
  pub fn log(&self) -> &[u32] {
    &self.0
  }

  pub fn clear(&mut self) {
    self.0.clear();
  }
}

impl DelayNs for MockDelay {
  async fn delay_ns(&mut self, ns: u32) {
    self.0.push(ns / 1_000_000);
  }

  async fn delay_ms(&mut self, ms: u32) {
    self.0.push(ms);
  }
}

pub type MockSession<'d> = Gt9xx<'d, MockBus, MockLines, MockDelay>;

pub fn session(bus: MockBus, dispatcher: &Dispatcher, options: Options) -> MockSession<'_> {
  Gt9xx::new(bus, MockLines::default(), MockDelay::default(), dispatcher, options)
}

/// Wipe recorded traffic so a test only sees what follows.
pub fn settle(touch: &mut MockSession<'_>) {
  touch.i2c.clear_writes();
  touch.lines.clear();
  touch.delay.clear();
}

thread_local! {
  static LOGGED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Keeps log lines per test thread.
struct Capture;

impl log::Log for Capture {
  fn enabled(&self, _: &log::Metadata<'_>) -> bool {
    true
  }

  fn log(&self, record: &log::Record<'_>) {
    LOGGED.with(|lines| lines.borrow_mut().push(record.args().to_string()));
  }

  fn flush(&self) {}
}

static CAPTURE: Capture = Capture;

/// Start recording log lines emitted on the current thread.
pub fn capture_logs() {
  let _ = log::set_logger(&CAPTURE);
  log::set_max_level(log::LevelFilter::Trace);
  LOGGED.with(|lines| lines.borrow_mut().clear());
}

pub fn logged() -> Vec<String> {
  LOGGED.with(|lines| lines.borrow().clone())
}
