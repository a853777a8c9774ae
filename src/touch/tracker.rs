//! Cross-cycle contact state.
//!
//! The chip does not send release records: a lifted finger simply stops
//! appearing. Liveness is inferred by diffing this cycle's ids against the
//! slots that were active in the previous cycle.

use log::{debug, trace};

use crate::{Batch, Contact, Event, Frame, Key, Options, Record, ReportMode, Surface, MAX_CONTACTS, MAX_KEYS};

const BUTTON_BOTH: u8 = 0x40;
const BUTTON_PRIMARY: u8 = 0x10;
const BUTTON_SECONDARY: u8 = 0x20;

const fn is_button(key: u8) -> bool {
  matches!(key, BUTTON_BOTH | BUTTON_PRIMARY | BUTTON_SECONDARY)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotTracker {
  /// Slots active last cycle. Legacy reporting keeps the contact count instead.
  touch: u16,
  /// Key byte seen last cycle.
  key: u8,
  /// Panel key bits last reported.
  keys: u8,
  /// Stylus buttons last reported: bit 0 primary, bit 1 secondary.
  buttons: u8,
  pen: bool,
}

impl SlotTracker {
  pub const fn new() -> Self {
    Self { touch: 0, key: 0, keys: 0, buttons: 0, pen: false }
  }

  /// Forget every contact without reporting lifts.
  pub fn clear(&mut self) {
    *self = Self::new();
  }

  /// Bitmask of finger slots active after the last update.
  pub fn active(&self) -> u16 {
    self.touch
  }

  pub fn pen_down(&self) -> bool {
    self.pen
  }

  /// Diff a validated frame against the previous cycle.
  ///
  /// The caller guarantees the frame is ready and its count is within
  /// [`Options::max_touch`].
  pub fn update(&mut self, frame: &Frame, options: &Options) -> Batch {
    let mut batch = Batch::new();
    let mut count = frame.len();

    if options.has_key_byte() {
      let key = frame.key();
      if key != 0 || self.key != 0 {
        let mut pen_active = false;
        if options.pen_buttons {
          pen_active = is_button(key) || is_button(self.key);
          self.report_buttons(key, &mut batch);
        }
        // keys and fingers are exclusive while no finger is down
        if options.key_count() > 0 && self.touch == 0 {
          self.report_keys(key, options, &mut batch);
          count = 0;
        }
        if pen_active {
          count = 0;
        }
      }
      self.key = key;
    }

    match options.report {
      ReportMode::Slots => self.track_slots(frame, count, options, &mut batch),
      ReportMode::Legacy => self.track_legacy(frame, count, options, &mut batch),
    }

    batch.close();
    batch
  }

  fn report_buttons(&mut self, key: u8, batch: &mut Batch) {
    let buttons = match key {
      BUTTON_BOTH => 0b11,
      BUTTON_PRIMARY => 0b01,
      BUTTON_SECONDARY => 0b10,
      _ => 0b00,
    };
    for (bit, key) in [(0b01, Key::StylusPrimary), (0b10, Key::StylusSecondary)] {
      if (buttons ^ self.buttons) & bit != 0 {
        batch.push(Event::Key { surface: Surface::Pen, key, pressed: buttons & bit != 0 });
      }
    }
    self.buttons = buttons;
  }

  fn report_keys(&mut self, key: u8, options: &Options, batch: &mut Batch) {
    for (i, code) in options.keys.iter().take(MAX_KEYS).enumerate() {
      let bit = 1 << i;
      if (key ^ self.keys) & bit != 0 {
        batch.push(Event::Key { surface: Surface::Touch, key: Key::Panel(*code), pressed: key & bit != 0 });
      }
    }
    self.keys = key & ((1 << options.key_count()) - 1);
  }

  fn track_slots(&mut self, frame: &Frame, count: usize, options: &Options, batch: &mut Batch) {
    let stylus = match frame.record(0) {
      Some(first) if options.pen && count > 0 && first.is_stylus() => Some(first),
      _ => None,
    };

    if self.pen && stylus.is_none() {
      trace!("pen up");
      batch.push(Event::Lift { surface: Surface::Pen, slot: 0 });
      self.pen = false;
    }

    if let Some(record) = stylus {
      // the pen and fingers are modal on this hardware
      self.lift_fingers(batch);
      batch.push(Event::Contact { surface: Surface::Pen, contact: contact(0, &record, options) });
      self.pen = true;
      return;
    }

    if self.touch == 0 && count == 0 {
      return;
    }

    let max = (options.max_touch as usize).min(MAX_CONTACTS);
    let mut present: [Option<Record>; MAX_CONTACTS] = [None; MAX_CONTACTS];
    for record in frame.records().take(count) {
      let slot = record.slot() as usize;
      if slot >= max {
        debug!("id {} beyond {} contacts", slot, max);
      } else if present[slot].is_some() {
        debug!("duplicate id {} in frame", slot);
      } else {
        present[slot] = Some(record);
      }
    }

    let mut current = 0u16;
    for (slot, entry) in present.iter().enumerate().take(max) {
      let bit = 1u16 << slot;
      match entry {
        Some(record) => {
          batch.push(Event::Contact { surface: Surface::Touch, contact: contact(slot as u8, record, options) });
          current |= bit;
        }
        None if self.touch & bit != 0 => batch.push(Event::Lift { surface: Surface::Touch, slot: slot as u8 }),
        None => {}
      }
    }
    self.touch = current;
  }

  fn lift_fingers(&mut self, batch: &mut Batch) {
    for slot in 0..MAX_CONTACTS as u8 {
      if self.touch & (1 << slot) != 0 {
        batch.push(Event::Lift { surface: Surface::Touch, slot });
      }
    }
    self.touch = 0;
  }

  fn track_legacy(&mut self, frame: &Frame, count: usize, options: &Options, batch: &mut Batch) {
    if count > 0 {
      for record in frame.records().take(count) {
        if options.pen && record.is_stylus() {
          batch.push(Event::Contact { surface: Surface::Pen, contact: contact(0, &record, options) });
          self.pen = true;
          break;
        }
        batch.push(Event::Contact { surface: Surface::Touch, contact: contact(record.slot(), &record, options) });
      }
    } else if self.touch != 0 {
      let surface = if self.pen { Surface::Pen } else { Surface::Touch };
      batch.push(Event::Release { surface });
      self.pen = false;
    }
    self.touch = count as u16;
  }
}

fn contact(slot: u8, record: &Record, options: &Options) -> Contact {
  let (x, y) = if options.swap_xy { (record.y, record.x) } else { (record.x, record.y) };
  Contact { slot, x, y, size: record.size }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame(records: &[(u8, u16, u16, u16)], key: u8) -> Frame {
    let mut bytes = vec![0x80 | records.len() as u8];
    for (id, x, y, size) in records {
      bytes.push(*id);
      bytes.extend_from_slice(&x.to_le_bytes());
      bytes.extend_from_slice(&y.to_le_bytes());
      bytes.extend_from_slice(&size.to_le_bytes());
      bytes.push(0);
    }
    bytes.push(key);
    Frame::from_bytes(&bytes)
  }

  fn down(slot: u8, x: u16, y: u16, size: u16) -> Event {
    Event::Contact { surface: Surface::Touch, contact: Contact { slot, x, y, size } }
  }

  fn lift(slot: u8) -> Event {
    Event::Lift { surface: Surface::Touch, slot }
  }

  const SYNC: Event = Event::Sync(Surface::Touch);

  #[test]
  fn single_contact_goes_down() {
    let mut tracker = SlotTracker::new();
    let batch = tracker.update(&frame(&[(0, 100, 200, 10)], 0), &Options::new());

    assert_eq!(batch.events(), &[down(0, 100, 200, 10), SYNC]);
    assert_eq!(tracker.active(), 0b1);
  }

  #[test]
  fn missing_contact_is_lifted() {
    let mut tracker = SlotTracker::new();
    tracker.update(&frame(&[(0, 100, 200, 10)], 0), &Options::new());

    let batch = tracker.update(&frame(&[], 0), &Options::new());
    assert_eq!(batch.events(), &[lift(0), SYNC]);
    assert_eq!(tracker.active(), 0);
  }

  #[test]
  fn idle_frame_emits_nothing() {
    let mut tracker = SlotTracker::new();
    assert!(tracker.update(&frame(&[], 0), &Options::new()).is_empty());
  }

  #[test]
  fn every_vanished_slot_lifts_once() {
    let options = Options::new();
    let mut tracker = SlotTracker::new();
    tracker.update(&frame(&[(0, 1, 1, 1), (2, 2, 2, 2), (3, 3, 3, 3)], 0), &options);

    let batch = tracker.update(&frame(&[(2, 5, 5, 2)], 0), &options);
    assert_eq!(batch.events(), &[lift(0), down(2, 5, 5, 2), lift(3), SYNC]);
    assert_eq!(tracker.active(), 0b100);

    let batch = tracker.update(&frame(&[(2, 5, 5, 2)], 0), &options);
    assert_eq!(batch.events(), &[down(2, 5, 5, 2), SYNC]);
  }

  #[test]
  fn out_of_order_ids_are_all_reported() {
    let mut tracker = SlotTracker::new();
    let batch = tracker.update(&frame(&[(3, 30, 30, 3), (1, 10, 10, 1)], 0), &Options::new());

    assert_eq!(batch.events(), &[down(1, 10, 10, 1), down(3, 30, 30, 3), SYNC]);
    assert_eq!(tracker.active(), 0b1010);
  }

  #[test]
  fn ids_beyond_max_touch_are_dropped() {
    let options = Options::new().with_max_touch(2);
    let mut tracker = SlotTracker::new();
    let batch = tracker.update(&frame(&[(0, 1, 1, 1), (7, 2, 2, 2)], 0), &options);

    assert_eq!(batch.events(), &[down(0, 1, 1, 1), SYNC]);
  }

  #[test]
  fn swap_exchanges_axes() {
    let mut tracker = SlotTracker::new();
    let batch = tracker.update(&frame(&[(0, 100, 200, 10)], 0), &Options::new().with_swap_xy(true));
    assert_eq!(batch.events()[0], down(0, 200, 100, 10));
  }

  #[test]
  fn panel_key_suppresses_fingers() {
    const KEYS: &[u16] = &[139, 172, 158];
    let options = Options::new().with_keys(KEYS);
    let mut tracker = SlotTracker::new();

    let batch = tracker.update(&frame(&[(0, 1, 1, 1)], 0b010), &options);
    assert_eq!(
      batch.events(),
      &[Event::Key { surface: Surface::Touch, key: Key::Panel(172), pressed: true }, SYNC]
    );
    assert_eq!(tracker.active(), 0);

    let batch = tracker.update(&frame(&[], 0), &options);
    assert_eq!(
      batch.events(),
      &[Event::Key { surface: Surface::Touch, key: Key::Panel(172), pressed: false }, SYNC]
    );
  }

  #[test]
  fn keys_wait_while_fingers_are_down() {
    const KEYS: &[u16] = &[139];
    let options = Options::new().with_keys(KEYS);
    let mut tracker = SlotTracker::new();
    tracker.update(&frame(&[(0, 1, 1, 1)], 0), &options);

    let batch = tracker.update(&frame(&[(0, 2, 2, 1)], 0b1), &options);
    assert_eq!(batch.events(), &[down(0, 2, 2, 1), SYNC]);
  }

  #[test]
  fn stylus_replaces_fingers() {
    let options = Options::new().with_pen(true, false);
    let mut tracker = SlotTracker::new();
    tracker.update(&frame(&[(1, 1, 1, 1)], 0), &options);

    let batch = tracker.update(&frame(&[(0x80, 40, 50, 6)], 0), &options);
    assert_eq!(
      batch.events(),
      &[
        lift(1),
        Event::Contact { surface: Surface::Pen, contact: Contact { slot: 0, x: 40, y: 50, size: 6 } },
        SYNC,
        Event::Sync(Surface::Pen),
      ]
    );
    assert!(tracker.pen_down());

    let batch = tracker.update(&frame(&[], 0), &options);
    assert_eq!(batch.events(), &[Event::Lift { surface: Surface::Pen, slot: 0 }, Event::Sync(Surface::Pen)]);
    assert!(!tracker.pen_down());
  }

  #[test]
  fn stylus_buttons_report_changes() {
    let options = Options::new().with_pen(true, true);
    let mut tracker = SlotTracker::new();

    let batch = tracker.update(&frame(&[(0, 1, 1, 1)], BUTTON_BOTH), &options);
    assert_eq!(
      batch.events(),
      &[
        Event::Key { surface: Surface::Pen, key: Key::StylusPrimary, pressed: true },
        Event::Key { surface: Surface::Pen, key: Key::StylusSecondary, pressed: true },
        Event::Sync(Surface::Pen),
      ]
    );

    let batch = tracker.update(&frame(&[], BUTTON_SECONDARY), &options);
    assert_eq!(
      batch.events(),
      &[Event::Key { surface: Surface::Pen, key: Key::StylusPrimary, pressed: false }, Event::Sync(Surface::Pen)]
    );
  }

  #[test]
  fn legacy_releases_all_at_once() {
    let options = Options::new().with_report(ReportMode::Legacy);
    let mut tracker = SlotTracker::new();

    let batch = tracker.update(&frame(&[(0, 1, 1, 1), (1, 2, 2, 2)], 0), &options);
    assert_eq!(batch.events(), &[down(0, 1, 1, 1), down(1, 2, 2, 2), SYNC]);

    let batch = tracker.update(&frame(&[], 0), &options);
    assert_eq!(batch.events(), &[Event::Release { surface: Surface::Touch }, SYNC]);

    assert!(tracker.update(&frame(&[], 0), &options).is_empty());
  }

  #[test]
  fn clear_forgets_without_lifts() {
    let mut tracker = SlotTracker::new();
    tracker.update(&frame(&[(0, 1, 1, 1)], 0), &Options::new());
    tracker.clear();
    assert!(tracker.update(&frame(&[], 0), &Options::new()).is_empty());
  }
}
