//! Reset/interrupt lines and the board-level collaborators around them.

use embedded_hal::digital::{Error as _, ErrorKind, OutputPin};

/// Pin-control state selected around suspend and resume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinState {
  Active,
  Suspend,
}

/// Board wiring used by the reset and wake sequences.
///
/// The INT line is shared: it is driven as an output while sequencing the
/// chip and handed back as an interrupt input afterwards. Rail control and
/// pin-control states are optional; the defaults report them as absent.
pub trait Lines {
  type Error: core::fmt::Debug;

  fn drive_reset(&mut self, high: bool) -> Result<(), Self::Error>;

  /// Stop driving RST and leave it floating.
  fn release_reset(&mut self) -> Result<(), Self::Error>;

  fn drive_int(&mut self, high: bool) -> Result<(), Self::Error>;

  /// Return INT to its role as interrupt input.
  fn listen_int(&mut self) -> Result<(), Self::Error>;

  /// Switch the supply rails. Returns `false` when the board has no rail control.
  fn set_power(&mut self, on: bool) -> Result<bool, Self::Error> {
    let _ = on;
    Ok(false)
  }

  fn select_pins(&mut self, state: PinState) -> Result<(), Self::Error> {
    let _ = state;
    Ok(())
  }
}

/// [`Lines`] over two open-drain outputs.
///
/// Releasing a line means letting the pull-up take it high, which suits
/// MCUs whose INT pin doubles as an open-drain output and an EXTI input.
pub struct OpenDrainLines<RST, INT> {
  rst: RST,
  int: INT,
}

impl<RST, INT> OpenDrainLines<RST, INT>
where
  RST: OutputPin,
  INT: OutputPin,
{
  pub fn new(rst: RST, int: INT) -> Self {
    Self { rst, int }
  }

  pub fn release(self) -> (RST, INT) {
    (self.rst, self.int)
  }
}

fn level<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), ErrorKind> {
  let result = if high { pin.set_high() } else { pin.set_low() };
  result.map_err(|e| e.kind())
}

impl<RST, INT> Lines for OpenDrainLines<RST, INT>
where
  RST: OutputPin,
  INT: OutputPin,
{
  type Error = ErrorKind;

  fn drive_reset(&mut self, high: bool) -> Result<(), Self::Error> {
    level(&mut self.rst, high)
  }

  fn release_reset(&mut self) -> Result<(), Self::Error> {
    level(&mut self.rst, true)
  }

  fn drive_int(&mut self, high: bool) -> Result<(), Self::Error> {
    level(&mut self.int, high)
  }

  fn listen_int(&mut self) -> Result<(), Self::Error> {
    level(&mut self.int, true)
  }
}
