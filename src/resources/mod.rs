//! Static resources the engine consults: labware definitions, the deck
//! layout, and id/timestamp generation.

pub mod deck;
pub mod labware_definition;
pub mod labware_provider;
pub mod model_utils;

pub use deck::StandardDeck;
pub use labware_definition::{
    definition_uri, LabwareDefinition, WellDefinition, CENTER_MULTICHANNEL_ON_WELLS, FIXED_TRASH,
};
pub use labware_provider::{InMemoryLabwareProvider, LabwareDataProvider};
pub use model_utils::ModelUtils;
