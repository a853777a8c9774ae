use core::fmt;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::{Error, Gt9xx, Lines, Reg};

/// Product id and firmware revision reported by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
  /// ASCII product id, e.g. `b"911\0"` or `b"9110"`.
  pub product: [u8; 4],
  pub firmware: u16,
}

impl Version {
  pub(crate) fn parse(raw: &[u8; 6]) -> Self {
    Self { product: [raw[0], raw[1], raw[2], raw[3]], firmware: u16::from_le_bytes([raw[4], raw[5]]) }
  }

  /// Product id without its trailing NUL.
  pub fn product(&self) -> &[u8] {
    let len = if self.product[3] == 0 { 3 } else { 4 };
    &self.product[..len]
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for &b in self.product() {
      write!(f, "{}", b as char)?;
    }
    write!(f, "_{:04x}", self.firmware)
  }
}

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  pub async fn version(&mut self) -> Result<Version, Error<E>> {
    let mut raw = [0u8; 6];
    self.read_bytes(Reg::Version, &mut raw).await?;
    Ok(Version::parse(&raw))
  }
}
