/// Number of configuration groups a panel may choose from by sensor id.
pub(crate) const SENSOR_GROUPS: usize = 6;

/// Supplier of per-panel configuration groups, keyed by sensor id.
pub trait ConfigSource {
  /// Raw configuration bytes for `sensor_id`, or `None` when absent.
  fn group(&self, sensor_id: u8) -> Option<&[u8]>;

  /// A source with only group 0 serves every sensor id.
  fn is_single(&self) -> bool {
    (1..SENSOR_GROUPS as u8).all(|id| self.group(id).is_none())
  }
}

/// Fixed table of up to six groups; empty slices mark absent groups.
#[derive(Clone, Copy, Debug)]
pub struct ConfigGroups<'a> {
  groups: [&'a [u8]; SENSOR_GROUPS],
}

impl<'a> ConfigGroups<'a> {
  pub const fn new(groups: [&'a [u8]; SENSOR_GROUPS]) -> Self {
    Self { groups }
  }

  pub const fn single(group: &'a [u8]) -> Self {
    Self { groups: [group, &[], &[], &[], &[], &[]] }
  }
}

impl ConfigSource for ConfigGroups<'_> {
  fn group(&self, sensor_id: u8) -> Option<&[u8]> {
    self.groups.get(sensor_id as usize).copied().filter(|g| !g.is_empty())
  }
}
