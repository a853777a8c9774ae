use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, error};

use crate::{config::CONFIG_MAX_LEN, Error, Gt9xx, Lines, PowerState, Reg};

/// Attempts per transfer before the bus is declared faulty.
pub(crate) const BUS_RETRIES: usize = 5;
/// Attempts of the read-twice-and-compare sequence.
pub(crate) const CONFIRM_ATTEMPTS: usize = 3;

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Retry-wrapped read that never escalates to a reset.
  pub(crate) async fn read_raw(&mut self, reg: Reg, buf: &mut [u8]) -> Result<(), Error<E>> {
    let pointer = reg.pointer();
    let len = buf.len();
    let mut attempt = 1;
    loop {
      match self.i2c.write_read(self.options.address, &pointer, buf).await {
        Ok(()) => return Ok(()),
        Err(e) if attempt >= BUS_RETRIES => {
          error!("I2C read failed: reg={:#06x} len={}", reg.addr(), len);
          return Err(Error::I2c(e));
        }
        Err(_) => attempt += 1,
      }
    }
  }

  /// Retry-wrapped write that never escalates to a reset.
  pub(crate) async fn write_raw(&mut self, reg: Reg, data: &[u8]) -> Result<(), Error<E>> {
    let len = data.len();
    if len > CONFIG_MAX_LEN {
      return Err(Error::BufferOverflow);
    }
    let mut buf = [0u8; CONFIG_MAX_LEN + 2];
    buf[..2].copy_from_slice(&reg.pointer());
    buf[2..2 + len].copy_from_slice(data);

    let mut attempt = 1;
    loop {
      match self.i2c.write(self.options.address, &buf[..2 + len]).await {
        Ok(()) => return Ok(()),
        Err(e) if attempt >= BUS_RETRIES => {
          error!("I2C write failed: reg={:#06x} len={}", reg.addr(), len);
          return Err(Error::I2c(e));
        }
        Err(_) => attempt += 1,
      }
    }
  }

  /// Read `buf.len()` bytes at `reg`, resetting the chip if every retry fails.
  ///
  /// The reset is skipped while dozing: it would silently drop the chip out
  /// of gesture mode.
  pub(crate) async fn read_bytes(&mut self, reg: Reg, buf: &mut [u8]) -> Result<(), Error<E>> {
    let result = self.read_raw(reg, buf).await;
    if result.is_err() {
      self.escalate().await;
    }
    result
  }

  /// Write `data` at `reg`, resetting the chip if every retry fails.
  pub(crate) async fn write_bytes(&mut self, reg: Reg, data: &[u8]) -> Result<(), Error<E>> {
    let result = self.write_raw(reg, data).await;
    if matches!(result, Err(Error::I2c(_))) {
      self.escalate().await;
    }
    result
  }

  async fn escalate(&mut self) {
    if self.power == PowerState::Doze {
      debug!("dozing, reset skipped");
      return;
    }
    if let Err(e) = self.reset(10).await {
      error!("reset after bus failure failed: {}", e);
    }
  }

  /// Read `reg` twice and accept the bytes only when both reads agree.
  pub(crate) async fn read_confirmed<const N: usize>(&mut self, reg: Reg) -> Result<[u8; N], Error<E>> {
    for _ in 0..CONFIRM_ATTEMPTS {
      let mut first = [0u8; N];
      let mut second = [0u8; N];
      if self.read_bytes(reg, &mut first).await.is_err() || self.read_bytes(reg, &mut second).await.is_err() {
        continue;
      }
      if first == second {
        return Ok(first);
      }
      debug!("reg {:#06x} unstable: {:02x?} != {:02x?}", reg.addr(), first, second);
    }
    Err(Error::Unconfirmed { reg: reg.addr() })
  }

  pub(crate) async fn read_u8(&mut self, reg: Reg) -> Result<u8, Error<E>> {
    let mut b = [0u8; 1];
    self.read_bytes(reg, &mut b).await?;
    Ok(b[0])
  }

  pub(crate) async fn write_u8(&mut self, reg: Reg, v: u8) -> Result<(), Error<E>> {
    self.write_bytes(reg, &[v]).await
  }
}
