use crate::{Resolution, Trigger};

/// Size of the on-chip configuration region.
pub const CONFIG_MAX_LEN: usize = 240;
/// Shortest configuration group accepted for delivery.
pub const CONFIG_MIN_LEN: usize = 186;

const VERSION_LOC: usize = 0;
const RESOLUTION_LOC: usize = 1;
const TRIGGER_LOC: usize = 6;

/// Configuration body as stored at the config register.
///
/// Layout: version byte, resolution (x_max, y_max, little-endian), module
/// switches, then panel tuning. The byte at `len - 2` is the two's
/// complement checksum of everything before it, followed by the
/// "config fresh" flag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConfigBlob {
  body: [u8; CONFIG_MAX_LEN],
  len: usize,
}

impl Default for ConfigBlob {
  fn default() -> Self {
    Self::empty()
  }
}

impl core::fmt::Debug for ConfigBlob {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ConfigBlob")
      .field("len", &self.len)
      .field("version", &self.version())
      .field("resolution", &self.resolution())
      .finish()
  }
}

impl ConfigBlob {
  pub const fn empty() -> Self {
    Self { body: [0; CONFIG_MAX_LEN], len: 0 }
  }

  /// Copy `bytes` into a zero-padded blob. `None` if longer than the region.
  pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
    if bytes.len() > CONFIG_MAX_LEN {
      return None;
    }
    let mut blob = Self::empty();
    blob.body[..bytes.len()].copy_from_slice(bytes);
    blob.len = bytes.len();
    Some(blob)
  }

  /// Copy `bytes` over the start of the body, growing it when needed.
  ///
  /// Returns `false` and leaves the blob untouched if `bytes` does not fit.
  pub fn overlay(&mut self, bytes: &[u8]) -> bool {
    if bytes.len() > CONFIG_MAX_LEN {
      return false;
    }
    self.body[..bytes.len()].copy_from_slice(bytes);
    self.len = self.len.max(bytes.len());
    true
  }

  /// Two's complement checksum: `sum(body) + checksum == 0 (mod 256)`.
  pub fn checksum(body: &[u8]) -> u8 {
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
  }

  pub fn refresh_checksum(&mut self) {
    if self.len >= 2 {
      let at = self.len - 2;
      self.body[at] = Self::checksum(&self.body[..at]);
    }
  }

  pub fn checksum_ok(&self) -> bool {
    self.len >= 2 && Self::checksum(&self.body[..self.len - 2]) == self.body[self.len - 2]
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Meaningful bytes of the configuration group.
  pub fn as_bytes(&self) -> &[u8] {
    &self.body[..self.len]
  }

  /// The whole region as written to the chip.
  pub fn wire(&self) -> &[u8; CONFIG_MAX_LEN] {
    &self.body
  }

  pub fn version(&self) -> u8 {
    self.body[VERSION_LOC]
  }

  pub fn set_version(&mut self, version: u8) {
    self.body[VERSION_LOC] = version;
  }

  pub fn resolution(&self) -> Resolution {
    let b = &self.body[RESOLUTION_LOC..RESOLUTION_LOC + 4];
    Resolution::new(u16::from_le_bytes([b[0], b[1]]), u16::from_le_bytes([b[2], b[3]]))
  }

  pub fn set_resolution(&mut self, resolution: Resolution) {
    self.body[RESOLUTION_LOC..RESOLUTION_LOC + 2].copy_from_slice(&resolution.x_max.to_le_bytes());
    self.body[RESOLUTION_LOC + 2..RESOLUTION_LOC + 4].copy_from_slice(&resolution.y_max.to_le_bytes());
  }

  pub fn trigger(&self) -> Trigger {
    Trigger::from(self.body[TRIGGER_LOC])
  }

  /// Edge triggers only touch bit 0, leaving a level bit in place.
  pub fn set_trigger(&mut self, trigger: Trigger) {
    let b = &mut self.body[TRIGGER_LOC];
    match trigger {
      Trigger::Rising => *b &= 0xFE,
      Trigger::Falling => *b |= 0x01,
      Trigger::Low | Trigger::High => *b = (*b & !0x03) | trigger as u8,
    }
  }
}
