//! ESD watchdog: liveness check and forced recovery.
//!
//! The chip answers `0xAA` in the second byte of the command pair while it is
//! alive and the host feeds it by writing `0xAA` back. A hung chip either stops
//! echoing the marker or latches it into the command byte.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, error, info, warn};

use crate::power::pin;
use crate::{Error, Gt9xx, Lines, PowerState, Reg, ESD_ALIVE};

const CHECK_ATTEMPTS: usize = 3;
/// Value written to the fault trigger register before a forced recovery.
const FAULT_TRIGGER: [u8; 3] = [0x01, 0x01, 0x01];

/// Outcome of one watchdog cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Health {
  /// Suspended or mid firmware update; nothing was touched.
  Skipped,
  Alive,
  /// The chip was found hung and has been reset and reconfigured.
  Recovered,
}

fn faulty(pair: [u8; 2]) -> bool {
  pair[0] == ESD_ALIVE || pair[1] != ESD_ALIVE
}

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Run one watchdog cycle.
  ///
  /// Reads bypass the reset escalation of the normal transport; a hang is
  /// only acted on once a second read confirms it.
  pub async fn esd_check(&mut self) -> Result<Health, Error<E>> {
    if self.suspended || self.firmware_update {
      return Ok(Health::Skipped);
    }

    for _ in 0..CHECK_ATTEMPTS {
      let mut pair = [0u8; 2];
      if self.read_raw(Reg::Command, &mut pair).await.is_err() {
        continue;
      }

      if !faulty(pair) {
        if let Err(e) = self.write_raw(Reg::Command, &[ESD_ALIVE]).await {
          warn!("feeding watchdog failed: {}", e);
        }
        return Ok(Health::Alive);
      }

      // a failed confirmation read keeps the faulty pair
      let _ = self.read_raw(Reg::Command, &mut pair).await;
      if faulty(pair) {
        break;
      }
      debug!("transient watchdog fault, rechecking");
    }

    error!("IC working abnormally, resetting");
    self.recover().await?;
    Ok(Health::Recovered)
  }

  /// Force the chip through a full reset and resend the configuration.
  ///
  /// The decode stimulus is re-armed even when the restart fails, so a
  /// later cycle can still recover the chip.
  pub(crate) async fn recover(&mut self) -> Result<(), Error<E>> {
    if let Err(e) = self.write_raw(Reg::EsdTrigger, &FAULT_TRIGGER).await {
      warn!("fault trigger write failed: {}", e);
    }
    self.delay.delay_ms(50).await;
    self.dispatcher.irq_free();

    let restarted = self.restart().await;
    match &restarted {
      Ok(()) => {
        if let Err(e) = self.send_config().await {
          error!("resending config failed: {}", e);
        }
        info!("recovered from watchdog fault");
      }
      Err(e) => error!("restart after watchdog fault failed: {}", e),
    }
    self.dispatcher.arm(self.options.source);
    restarted
  }

  async fn restart(&mut self) -> Result<(), Error<E>> {
    if self.options.power_cycle_recovery && pin(self.lines.set_power(false))? {
      self.delay.delay_ms(20).await;
      pin(self.lines.set_power(true))?;
      self.delay.delay_ms(20).await;
    }

    self.reset(50).await?;
    self.delay.delay_ms(50).await;
    self.power = PowerState::Active;
    Ok(())
  }
}
