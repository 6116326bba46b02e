//! Source of labware definitions and calibration offsets.
//!
//! The engine never reads definitions from disk itself; it asks a
//! [`LabwareDataProvider`]. [`InMemoryLabwareProvider`] serves the built-in
//! definitions plus anything registered at runtime.

use super::labware_definition::{builtin_definitions, definition_uri, LabwareDefinition};
use crate::error::{EngineError, EngineResult};
use crate::types::{CalibrationOffset, DeckSlotName, LabwareLocation};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Lookup of labware definitions and per-slot calibration.
#[async_trait]
pub trait LabwareDataProvider: Send + Sync {
    /// Resolve a definition by its identity triple.
    async fn get_labware_definition(
        &self,
        load_name: &str,
        namespace: &str,
        version: u32,
    ) -> EngineResult<LabwareDefinition>;

    /// Calibration offset for a definition placed at a location.
    async fn get_labware_calibration(
        &self,
        definition: &LabwareDefinition,
        location: &LabwareLocation,
    ) -> EngineResult<CalibrationOffset>;
}

/// Provider backed by an in-process map.
#[derive(Debug, Default)]
pub struct InMemoryLabwareProvider {
    definitions: RwLock<HashMap<String, LabwareDefinition>>,
    calibrations: RwLock<HashMap<(String, DeckSlotName), CalibrationOffset>>,
}

impl InMemoryLabwareProvider {
    /// Empty provider; every lookup fails until definitions are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider preloaded with the built-in definitions.
    pub fn with_builtin() -> Self {
        let provider = Self::new();
        for definition in builtin_definitions() {
            provider.register(definition);
        }
        provider
    }

    pub fn register(&self, definition: LabwareDefinition) {
        self.definitions.write().insert(definition.uri(), definition);
    }

    pub fn set_calibration(&self, uri: &str, slot: DeckSlotName, offset: CalibrationOffset) {
        self.calibrations
            .write()
            .insert((uri.to_string(), slot), offset);
    }
}

#[async_trait]
impl LabwareDataProvider for InMemoryLabwareProvider {
    async fn get_labware_definition(
        &self,
        load_name: &str,
        namespace: &str,
        version: u32,
    ) -> EngineResult<LabwareDefinition> {
        let uri = definition_uri(namespace, load_name, version);
        self.definitions
            .read()
            .get(&uri)
            .cloned()
            .ok_or(EngineError::LabwareDefinitionNotFound(uri))
    }

    async fn get_labware_calibration(
        &self,
        definition: &LabwareDefinition,
        location: &LabwareLocation,
    ) -> EngineResult<CalibrationOffset> {
        Ok(self
            .calibrations
            .read()
            .get(&(definition.uri(), location.slot_name))
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::labware_definition::corning_96_wellplate_360ul_flat;

    #[tokio::test]
    async fn test_builtin_lookup() {
        let provider = InMemoryLabwareProvider::with_builtin();
        let definition = provider
            .get_labware_definition("corning_96_wellplate_360ul_flat", "opentrons", 1)
            .await
            .unwrap();
        assert_eq!(definition, corning_96_wellplate_360ul_flat());

        let missing = provider
            .get_labware_definition("corning_96_wellplate_360ul_flat", "opentrons", 2)
            .await;
        assert!(matches!(
            missing,
            Err(EngineError::LabwareDefinitionNotFound(uri)) if uri.ends_with("/2")
        ));
    }

    #[tokio::test]
    async fn test_calibration_defaults_to_zero() {
        let provider = InMemoryLabwareProvider::with_builtin();
        let definition = corning_96_wellplate_360ul_flat();
        let slot3 = LabwareLocation::slot(DeckSlotName::Slot3);

        let offset = provider
            .get_labware_calibration(&definition, &slot3)
            .await
            .unwrap();
        assert_eq!(offset, CalibrationOffset::default());

        let calibrated = CalibrationOffset { x: 0.5, y: -0.25, z: 1.0 };
        provider.set_calibration(&definition.uri(), DeckSlotName::Slot3, calibrated);
        let offset = provider
            .get_labware_calibration(&definition, &slot3)
            .await
            .unwrap();
        assert_eq!(offset, calibrated);
    }
}
