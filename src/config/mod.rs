//! Panel configuration: group selection, version reconciliation, delivery.

use core::fmt;

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use log::{debug, error, info, warn};

use crate::{rw::BUS_RETRIES, Error, Gt9xx, Lines, PanelFault, Reg, FW_MARKER};

mod blob;
mod source;

pub use blob::*;
pub use source::*;

/// Device-held versions at or above this use a numbering scheme that always
/// accepts the driver config.
const LEGACY_VERSION_CEILING: u8 = 90;

/// Driver-held and live on-chip configuration, for inspection.
#[derive(Clone, Copy)]
pub struct ConfigSnapshot {
  pub driver: ConfigBlob,
  pub device: [u8; CONFIG_MAX_LEN],
}

impl fmt::Display for ConfigSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "driver config ({} bytes):", self.driver.len())?;
    dump(f, self.driver.as_bytes())?;
    writeln!(f, "device config:")?;
    dump(f, &self.device)
  }
}

fn dump(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
  for row in bytes.chunks(10) {
    for (i, b) in row.iter().enumerate() {
      if i > 0 {
        f.write_str(" ")?;
      }
      write!(f, "0x{:02X}", b)?;
    }
    writeln!(f)?;
  }
  Ok(())
}

impl<I, E, L, D> Gt9xx<'_, I, L, D>
where
  I: I2c<SevenBitAddress, Error = E>,
  L: Lines,
  D: DelayNs,
{
  /// Build the configuration for this panel and push it to the chip.
  ///
  /// On a panel fault nothing is written and the session keeps the
  /// geometry the chip already holds.
  pub(crate) async fn init_panel<S: ConfigSource + ?Sized>(&mut self, source: &S) -> Result<(), Error<E>> {
    if !self.options.send_config {
      return self.adopt_device_config().await;
    }

    if let Ok([marker]) = self.read_confirmed::<1>(Reg::FirmwareMarker).await {
      if marker != FW_MARKER {
        error!("firmware marker {:#04x}, no config sent", marker);
        self.firmware_fault = true;
        return Err(Error::Firmware);
      }
    }

    let sensor_id = match self.read_confirmed::<1>(Reg::SensorId).await {
      Ok([id]) if (id as usize) < SENSOR_GROUPS => id,
      Ok([id]) => return Err(self.fail_panel(PanelFault::InvalidSensorId(id))),
      Err(_) => return Err(self.fail_panel(PanelFault::SensorIdUnreadable)),
    };
    info!("sensor id {}", sensor_id);

    let group_id = if source.is_single() { 0 } else { sensor_id };
    let Some(group) = source.group(group_id) else {
      return Err(self.fail_panel(PanelFault::MissingGroup(group_id)));
    };
    let blob = match ConfigBlob::from_bytes(group) {
      Some(blob) if blob.len() >= CONFIG_MIN_LEN => blob,
      _ => return Err(self.fail_panel(PanelFault::BadGroupLength { group: group_id, len: group.len() })),
    };
    info!("config group {} used, {} bytes", group_id, blob.len());
    self.config = blob;

    let [device_version] = self.read_confirmed::<1>(Reg::Config).await.inspect_err(|_| {
      error!("ic config version unreadable, no config sent");
    })?;
    let driver_version = self.config.version();
    let keep_device = device_version < LEGACY_VERSION_CEILING && device_version > driver_version;
    if keep_device {
      debug!("device config {:#04x} newer than driver {:#04x}", device_version, driver_version);
      self.config.set_version(0);
    }

    if let Some((resolution, trigger)) = self.options.custom {
      self.config.set_resolution(resolution);
      self.config.set_trigger(trigger);
    }
    self.config.refresh_checksum();
    self.adopt_geometry();

    if let Err(e) = self.send_config().await {
      error!("send config failed: {}", e);
    }
    if keep_device {
      self.config.set_version(driver_version);
      self.config.refresh_checksum();
    }

    info!("x_max {} y_max {} trigger {:?}", self.resolution.x_max, self.resolution.y_max, self.trigger);
    self.delay.delay_ms(10).await;
    Ok(())
  }

  /// Learn geometry from the chip's own configuration instead of sending one.
  async fn adopt_device_config(&mut self) -> Result<(), Error<E>> {
    let mut body = [0u8; CONFIG_MAX_LEN];
    match self.read_bytes(Reg::Config, &mut body).await {
      Ok(()) => self.config = ConfigBlob::from_bytes(&body).unwrap_or_default(),
      Err(_) => {
        warn!("reading config failed, using default resolution and trigger");
        self.use_fallback_geometry();
      }
    }
    self.adopt_geometry();
    info!("x_max {} y_max {} trigger {:?}", self.resolution.x_max, self.resolution.y_max, self.trigger);
    self.delay.delay_ms(10).await;
    Ok(())
  }

  fn fail_panel(&mut self, fault: PanelFault) -> Error<E> {
    error!("panel init failed: {:?}, no config sent", fault);
    self.panel_fault = true;
    Error::PanelInit(fault)
  }

  fn adopt_geometry(&mut self) {
    if self.resolution.is_unset() {
      self.resolution = self.config.resolution();
      self.trigger = self.config.trigger();
    }
  }

  pub(crate) fn use_fallback_geometry(&mut self) {
    self.resolution = self.options.fallback_resolution;
    self.trigger = self.options.fallback_trigger;
  }

  /// Push the driver-held configuration to the chip.
  ///
  /// Returns `false` when there is nothing trustworthy to send: the panel
  /// failed to initialise, the firmware is faulty, or the chip owns its
  /// config.
  pub async fn send_config(&mut self) -> Result<bool, Error<E>> {
    if !self.options.send_config || self.panel_fault || self.firmware_fault || self.config.is_empty() {
      debug!("config not sent");
      return Ok(false);
    }

    let wire = *self.config.wire();
    let mut attempt = 1;
    loop {
      match self.write_bytes(Reg::Config, &wire).await {
        Ok(()) => return Ok(true),
        Err(e) if attempt >= BUS_RETRIES => return Err(e),
        Err(_) => attempt += 1,
      }
    }
  }

  /// Driver-held configuration next to what the chip currently holds.
  pub async fn config_snapshot(&mut self) -> Result<ConfigSnapshot, Error<E>> {
    let mut device = [0u8; CONFIG_MAX_LEN];
    self.read_bytes(Reg::Config, &mut device).await?;
    Ok(ConfigSnapshot { driver: self.config, device })
  }

  /// Overlay `body` onto the start of the configuration and send it immediately.
  ///
  /// The bytes are sent as given; callers own the checksum. An explicit write
  /// clears earlier panel and firmware faults so later resumes resend it.
  pub async fn write_config(&mut self, body: &[u8]) -> Result<(), Error<E>> {
    let mut blob = self.config;
    if !blob.overlay(body) {
      return Err(Error::BufferOverflow);
    }
    self.write_bytes(Reg::Config, blob.wire()).await?;
    self.config = blob;
    self.panel_fault = false;
    self.firmware_fault = false;
    info!("config overwritten, {} bytes", body.len());
    Ok(())
  }
}
