/******************************************************************************
 * Goodix GT9xx - Registers & Memory Map                                      *
 * ========================================================================== *
 * Registers are addressed with a 16-bit big-endian pointer. All multi-byte   *
 * payload fields are little-endian.                                          *
*******************************************************************************/

/// Default 7-bit bus address.
pub const ADDR: u8 = 0x5D;
/// Alternate 7-bit bus address, selected by the INT level during reset.
pub const ALT_ADDR: u8 = 0x14;

/// Sleep command written to [`Reg::Command`].
pub(crate) const CMD_SLEEP: u8 = 0x05;
/// Gesture doze command written to [`Reg::CommandCheck`] then [`Reg::Command`].
pub(crate) const CMD_DOZE: u8 = 0x08;
/// Alive marker exchanged over the ESD register pair.
pub(crate) const ESD_ALIVE: u8 = 0xAA;
/// Value found at [`Reg::FirmwareMarker`] when the firmware is intact.
pub(crate) const FW_MARKER: u8 = 0xBE;

#[allow(dead_code)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reg {
  // Command and ESD handshake (0x8040..0x8046)
  Command = 0x8040,
  EsdCheck = 0x8041,
  CommandCheck = 0x8046,

  // Configuration region (0x8047..0x8136)
  Config = 0x8047,

  // Product id and firmware version (0x8140..0x8145)
  Version = 0x8140,

  // Sensor id and gesture code (0x814A..0x814B)
  SensorId = 0x814A,
  Gesture = 0x814B,

  // Coordinate buffer (0x814E..)
  Status = 0x814E,
  PointsTail = 0x8158,

  // Firmware integrity and fault injection
  FirmwareMarker = 0x41E4,
  EsdTrigger = 0x4226,
}

impl Reg {
  pub(crate) const fn addr(self) -> u16 {
    self as u16
  }

  pub(crate) const fn pointer(self) -> [u8; 2] {
    self.addr().to_be_bytes()
  }
}
