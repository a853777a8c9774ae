use crate::MAX_CONTACTS;

/// Bytes per contact record.
pub const RECORD_LEN: usize = 8;
/// First read of a cycle: status, one record and the key byte that follows it.
pub(crate) const HEAD_LEN: usize = 1 + RECORD_LEN + 1;
/// Status, a record per contact and the trailing key byte.
pub const FRAME_LEN: usize = 1 + RECORD_LEN * MAX_CONTACTS + 1;

/// Coordinate buffer status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(pub u8);

impl Status {
  /// Bit 7: the chip finished writing a frame.
  pub const fn ready(self) -> bool {
    self.0 & 0x80 != 0
  }

  /// Bits 0..3: reported contact count, not yet validated.
  pub const fn count(self) -> u8 {
    self.0 & 0x0F
  }

  /// Nothing to report and nothing to acknowledge.
  pub const fn is_idle(self) -> bool {
    self.0 == 0
  }
}

/// One contact record: id, x, y, size, reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Record {
  /// Raw id byte. Bit 7 marks a stylus on pen-capable panels.
  pub id: u8,
  pub x: u16,
  pub y: u16,
  pub size: u16,
}

impl Record {
  pub fn parse(b: &[u8; RECORD_LEN]) -> Self {
    Self {
      id: b[0],
      x: u16::from_le_bytes([b[1], b[2]]),
      y: u16::from_le_bytes([b[3], b[4]]),
      size: u16::from_le_bytes([b[5], b[6]]),
    }
  }

  pub const fn slot(&self) -> u8 {
    self.id & 0x0F
  }

  pub const fn is_stylus(&self) -> bool {
    self.id & 0x80 != 0
  }
}

/// Raw wire buffer of one decode cycle.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
  raw: [u8; FRAME_LEN],
}

impl Default for Frame {
  fn default() -> Self {
    Self::new()
  }
}

impl core::fmt::Debug for Frame {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    let end = (1 + RECORD_LEN * self.len() + 1).min(FRAME_LEN);
    write!(f, "Frame({:02x?})", &self.raw[..end])
  }
}

impl Frame {
  pub const fn new() -> Self {
    Self { raw: [0; FRAME_LEN] }
  }

  /// Build a frame from wire bytes starting at the status byte.
  pub fn from_bytes(bytes: &[u8]) -> Self {
    let mut frame = Self::new();
    let len = bytes.len().min(FRAME_LEN);
    frame.raw[..len].copy_from_slice(&bytes[..len]);
    frame
  }

  pub(crate) fn head_mut(&mut self) -> &mut [u8] {
    &mut self.raw[..HEAD_LEN]
  }

  /// Records 2..=N, fetched by a second read when more than one contact is down.
  pub(crate) fn tail_mut(&mut self) -> &mut [u8] {
    let extra = self.len().saturating_sub(1);
    &mut self.raw[HEAD_LEN..HEAD_LEN + RECORD_LEN * extra]
  }

  pub fn status(&self) -> Status {
    Status(self.raw[0])
  }

  /// Records held by the frame, bounded by [`MAX_CONTACTS`].
  pub fn len(&self) -> usize {
    (self.status().count() as usize).min(MAX_CONTACTS)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn record(&self, index: usize) -> Option<Record> {
    if index >= self.len() {
      return None;
    }
    let at = 1 + RECORD_LEN * index;
    let mut b = [0u8; RECORD_LEN];
    b.copy_from_slice(&self.raw[at..at + RECORD_LEN]);
    Some(Record::parse(&b))
  }

  pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
    (0..self.len()).filter_map(|i| self.record(i))
  }

  /// Key byte following the last record.
  pub fn key(&self) -> u8 {
    self.raw[1 + RECORD_LEN * self.len()]
  }
}
