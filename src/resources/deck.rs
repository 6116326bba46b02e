//! Deck layout: nominal positions of the twelve slots.

use crate::types::{DeckSlotName, Point};
use std::collections::HashMap;

const SLOT_PITCH_X: f64 = 132.5;
const SLOT_PITCH_Y: f64 = 90.5;

/// Fixed deck geometry. Slot 1 is the front-left origin; numbering runs
/// left-to-right, front-to-back in rows of three.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardDeck {
    slot_positions: HashMap<DeckSlotName, Point>,
}

impl StandardDeck {
    pub fn new() -> Self {
        let slot_positions = DeckSlotName::ALL
            .iter()
            .map(|slot| {
                let index = f64::from(slot.number() - 1);
                let column = index % 3.0;
                let row = (index / 3.0).floor();
                (
                    *slot,
                    Point::new(column * SLOT_PITCH_X, row * SLOT_PITCH_Y, 0.0),
                )
            })
            .collect();
        Self { slot_positions }
    }

    /// Override individual slot positions, e.g. for a calibrated deck.
    pub fn with_slot_position(mut self, slot: DeckSlotName, position: Point) -> Self {
        self.slot_positions.insert(slot, position);
        self
    }

    /// Position of the slot's front-left corner.
    pub fn slot_position(&self, slot: DeckSlotName) -> Point {
        self.slot_positions.get(&slot).copied().unwrap_or_default()
    }
}

impl Default for StandardDeck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_positions() {
        let deck = StandardDeck::new();
        assert_eq!(deck.slot_position(DeckSlotName::Slot1), Point::new(0.0, 0.0, 0.0));
        assert_eq!(deck.slot_position(DeckSlotName::Slot3), Point::new(265.0, 0.0, 0.0));
        assert_eq!(deck.slot_position(DeckSlotName::Slot4), Point::new(0.0, 90.5, 0.0));
        assert_eq!(
            deck.slot_position(DeckSlotName::Slot12),
            Point::new(265.0, 271.5, 0.0)
        );
    }

    #[test]
    fn test_slot_override() {
        let deck = StandardDeck::new().with_slot_position(DeckSlotName::Slot5, Point::new(1.0, 2.0, 3.0));
        assert_eq!(deck.slot_position(DeckSlotName::Slot5), Point::new(1.0, 2.0, 3.0));
    }
}
