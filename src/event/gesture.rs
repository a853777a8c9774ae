use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, info};

use crate::{Batch, Error, EventSink, Gt9xx, Key, Lines, PowerState, Reg};

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Decode one gesture code while dozing.
  ///
  /// A recognised gesture emits its wake pulse and leaves the session
  /// [`PowerState::Woken`] until resume. Anything else is noise: the code is
  /// cleared and doze re-armed.
  pub(crate) async fn service_gesture<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), Error<E>> {
    let code = self.read_u8(Reg::Gesture).await?;
    match Gesture::try_from(code) {
      Ok(gesture) => {
        info!("wakeup by {:?}", gesture);
        self.power = PowerState::Woken;
        Batch::pulse(gesture.wake_key()).deliver(sink);
        self.write_u8(Reg::Gesture, 0).await
      }
      Err(e) => {
        debug!("{}", e);
        self.write_u8(Reg::Gesture, 0).await?;
        self.enter_doze().await
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gesture {
  /// A letter or the `^` symbol drawn on the panel.
  Shape(char),
  Swipe(SwipeDirection),
  DoubleTap,
}

impl Gesture {
  /// Key pulsed to wake the host.
  pub fn wake_key(&self) -> Key {
    match self {
      Gesture::DoubleTap => Key::DoubleTap,
      Gesture::Shape(_) | Gesture::Swipe(_) => Key::Power,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwipeDirection {
  Right,
  Down,
  Up,
  Left,
}

/// Gesture register value outside the recognised set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown gesture code {0:#04x}")]
pub struct UnknownGesture(pub u8);

const SHAPES: &[u8] = b"abcdeghmoqsvwyz^";
const DOUBLE_TAP: u8 = 0xCC;

impl TryFrom<u8> for Gesture {
  type Error = UnknownGesture;

  fn try_from(code: u8) -> Result<Self, Self::Error> {
    match code {
      _ if SHAPES.contains(&code) => Ok(Self::Shape(code as char)),
      0xAA | 0xAB | 0xBA | 0xBB => {
        // low nibble picks within a pair, high nibble picks the pair
        let index = ((code & 0x0F) - 0x0A) + ((code >> 4) - 0x0A) * 2;
        let direction = match index {
          0 => SwipeDirection::Right,
          1 => SwipeDirection::Down,
          2 => SwipeDirection::Up,
          _ => SwipeDirection::Left,
        };
        Ok(Self::Swipe(direction))
      }
      DOUBLE_TAP => Ok(Self::DoubleTap),
      _ => Err(UnknownGesture(code)),
    }
  }
}
