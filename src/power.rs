//! Reset, sleep, doze and wake sequencing.
//!
//! The orderings and minimum delays below are a hardware contract with the
//! chip: the INT level sampled while RST rises selects the bus address, and
//! the INT pulse afterwards re-synchronises the interrupt logic.

use core::fmt::Debug;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, error, info, warn};

use crate::{Error, Gt9xx, Lines, PowerState, Reg, WakeMode, CMD_DOZE, CMD_SLEEP, ESD_ALIVE};

/// Attempts of the sleep and doze command sequences.
const COMMAND_RETRIES: usize = 5;
/// Attempts of the probing wake sequence.
const WAKE_RETRIES: usize = 10;
/// Attempts of the single-byte bus test.
const TEST_RETRIES: usize = 5;

pub(crate) fn pin<T, P: Debug, E>(result: Result<T, P>) -> Result<T, Error<E>> {
  result.map_err(|e| {
    warn!("control line fault: {:?}", e);
    Error::Pin
  })
}

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Hardware reset holding RST low for `hold_ms`.
  ///
  /// Slot state is dropped: the chip forgets its contacts across a reset.
  pub(crate) async fn reset(&mut self, hold_ms: u32) -> Result<(), Error<E>> {
    debug!("reset, hold {} ms", hold_ms);
    self.tracker.clear();

    pin(self.lines.drive_reset(false))?;
    self.delay.delay_ms(hold_ms).await;
    pin(self.lines.drive_int(self.options.int_level_for_address()))?;
    self.delay.delay_ms(2).await;
    pin(self.lines.drive_reset(true))?;
    self.delay.delay_ms(6).await;
    pin(self.lines.release_reset())?;

    self.int_sync(50).await?;

    if self.options.esd {
      if let Err(e) = self.init_ext_watchdog().await {
        warn!("arming ext watchdog failed: {}", e);
      }
    }
    Ok(())
  }

  /// Hold INT low for `ms`, then hand it back as an interrupt input.
  pub(crate) async fn int_sync(&mut self, ms: u32) -> Result<(), Error<E>> {
    pin(self.lines.drive_int(false))?;
    self.delay.delay_ms(ms).await;
    pin(self.lines.listen_int())
  }

  pub(crate) async fn init_ext_watchdog(&mut self) -> Result<(), Error<E>> {
    self.write_raw(Reg::EsdCheck, &[ESD_ALIVE]).await
  }

  pub(crate) async fn enter_sleep(&mut self) -> Result<(), Error<E>> {
    pin(self.lines.drive_int(false))?;
    self.delay.delay_ms(5).await;

    let mut attempt = 1;
    loop {
      match self.write_bytes(Reg::Command, &[CMD_SLEEP]).await {
        Ok(()) => {
          info!("entered sleep");
          return Ok(());
        }
        Err(e) if attempt >= COMMAND_RETRIES => {
          error!("sleep command failed");
          return Err(e);
        }
        Err(_) => {
          attempt += 1;
          self.delay.delay_ms(10).await;
        }
      }
    }
  }

  /// Arm gesture detection. The chip stays powered and scans at a low rate.
  pub(crate) async fn enter_doze(&mut self) -> Result<(), Error<E>> {
    let mut last = Error::WakeFailed;
    for _ in 0..COMMAND_RETRIES {
      if let Err(e) = self.write_bytes(Reg::CommandCheck, &[CMD_DOZE]).await {
        last = e;
        continue;
      }
      match self.write_bytes(Reg::Command, &[CMD_DOZE]).await {
        Ok(()) => {
          self.power = PowerState::Doze;
          info!("gesture doze armed");
          return Ok(());
        }
        Err(e) => last = e,
      }
      self.delay.delay_ms(10).await;
    }
    error!("doze command failed");
    Err(last)
  }

  /// Bring the chip out of sleep or doze.
  pub(crate) async fn wake(&mut self) -> Result<(), Error<E>> {
    let dozing = matches!(self.power, PowerState::Doze | PowerState::Woken);

    if self.gesture_wakeup && dozing {
      for _ in 0..WAKE_RETRIES {
        info!("{} wakeup", if self.power == PowerState::Woken { "gesture" } else { "power key" });
        self.power = PowerState::Active;
        self.dispatcher.irq_free();
        self.reset(10).await?;
        if self.i2c_test().await.is_ok() {
          return Ok(());
        }
        self.reset(20).await?;
      }
      error!("wakeup failed");
      return Err(Error::WakeFailed);
    }

    match self.options.wake {
      WakeMode::Reset => {
        self.reset(20).await?;
        self.power = PowerState::Active;
        Ok(())
      }
      WakeMode::Probe => {
        for _ in 0..WAKE_RETRIES {
          pin(self.lines.drive_int(true))?;
          self.reset(20).await?;
          self.delay.delay_ms(5).await;
          if self.i2c_test().await.is_ok() {
            self.int_sync(25).await?;
            if self.options.esd {
              self.init_ext_watchdog().await?;
            }
            self.power = PowerState::Active;
            return Ok(());
          }
          self.reset(20).await?;
        }
        error!("wakeup failed");
        Err(Error::WakeFailed)
      }
    }
  }

  /// Check the chip answers on the bus by reading the config version byte.
  pub(crate) async fn i2c_test(&mut self) -> Result<u8, Error<E>> {
    let mut attempt = 1;
    loop {
      match self.read_u8(Reg::Config).await {
        Ok(v) => return Ok(v),
        Err(e) if attempt >= TEST_RETRIES => return Err(e),
        Err(_) => {
          attempt += 1;
          self.delay.delay_ms(10).await;
        }
      }
    }
  }
}
