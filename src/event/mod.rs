use heapless::Vec;
use log::warn;

mod gesture;

pub use gesture::*;

/// Largest number of events one decode cycle can produce: every key and
/// stylus button, a contact and a lift per slot, the pen, and the syncs.
pub const BATCH_CAPACITY: usize = 32;

/// Input surface an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Surface {
  Touch,
  Pen,
}

/// One reported contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Contact {
  pub slot: u8,
  pub x: u16,
  pub y: u16,
  pub size: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
  /// Wake pulse produced by letter, symbol and swipe gestures.
  Power,
  /// Wake pulse produced by a double tap.
  DoubleTap,
  StylusPrimary,
  StylusSecondary,
  /// Panel key carrying the configured key code.
  Panel(u16),
}

/// Structured event handed to the [`EventSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
  /// A contact went down or moved. The slot keeps its tracking id until lifted.
  Contact { surface: Surface, contact: Contact },
  /// The contact in `slot` left the surface; its tracking id is cleared.
  Lift { surface: Surface, slot: u8 },
  /// Every contact left the surface (legacy reporting).
  Release { surface: Surface },
  Key { surface: Surface, key: Key, pressed: bool },
  /// Closes the events of one decode cycle for `surface`.
  Sync(Surface),
}

impl Event {
  pub fn surface(&self) -> Surface {
    match *self {
      Event::Contact { surface, .. }
      | Event::Lift { surface, .. }
      | Event::Release { surface }
      | Event::Key { surface, .. }
      | Event::Sync(surface) => surface,
    }
  }
}

/// Delivery surface for decoded events, typically an OS input layer.
pub trait EventSink {
  fn report(&mut self, event: Event);
}

impl<const N: usize> EventSink for Vec<Event, N> {
  fn report(&mut self, event: Event) {
    if self.push(event).is_err() {
      warn!("event sink full, dropping {:?}", event);
    }
  }
}

/// Ordered events of one decode cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
  events: Vec<Event, BATCH_CAPACITY>,
}

impl Batch {
  pub const fn new() -> Self {
    Self { events: Vec::new() }
  }

  /// Press and release of `key`, each followed by a sync.
  pub fn pulse(key: Key) -> Self {
    let mut batch = Self::new();
    for pressed in [true, false] {
      batch.push(Event::Key { surface: Surface::Touch, key, pressed });
      batch.push(Event::Sync(Surface::Touch));
    }
    batch
  }

  pub fn push(&mut self, event: Event) {
    if self.events.push(event).is_err() {
      warn!("event batch full, dropping {:?}", event);
    }
  }

  /// Append a sync for each surface that produced events.
  pub fn close(&mut self) {
    for surface in [Surface::Touch, Surface::Pen] {
      if self.events.iter().any(|e| e.surface() == surface) {
        self.push(Event::Sync(surface));
      }
    }
  }

  pub fn events(&self) -> &[Event] {
    &self.events
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn deliver<S: EventSink + ?Sized>(self, sink: &mut S) {
    for event in self.events {
      sink.report(event);
    }
  }
}
