use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, trace, warn};

use crate::{Error, EventSink, Gt9xx, Lines, PowerState, Reg};

mod frame;
mod tracker;

pub use frame::*;
pub use tracker::*;

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Run one decode cycle and re-arm the stimulus that triggered it.
  ///
  /// Events reach `sink` only once the whole frame has been read; a bus
  /// error aborts the cycle without partial output. The stimulus is re-armed
  /// on every path except the firmware-update veto, whose end re-arms it.
  pub async fn service<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), Error<E>> {
    if self.firmware_update {
      debug!("decode vetoed during firmware update");
      return Ok(());
    }

    let result = self.decode(sink).await;
    if let Err(e) = &result {
      warn!("decode aborted: {}", e);
    }
    self.dispatcher.rearm(self.options.source);
    result
  }

  async fn decode<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), Error<E>> {
    match self.power {
      PowerState::Asleep => return Ok(()),
      PowerState::Doze | PowerState::Woken => return self.service_gesture(sink).await,
      PowerState::Active => {}
    }

    let mut frame = Frame::new();
    self.read_bytes(Reg::Status, frame.head_mut()).await?;

    let status = frame.status();
    if status.is_idle() {
      return Ok(());
    }

    if status.ready() && status.count() <= self.options.max_touch {
      if status.count() > 1 {
        self.read_bytes(Reg::PointsTail, frame.tail_mut()).await?;
      }
      trace!("{:?}", frame);
      self.tracker.update(&frame, &self.options).deliver(sink);
    } else {
      debug!("discarding frame, status {:#04x}", status.0);
    }

    // hand the buffer back to the chip
    self.write_u8(Reg::Status, 0).await
  }
}
