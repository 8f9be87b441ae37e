// SPDX-FileCopyrightText: 2025 vela contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware family → receiver factory table.

use std::collections::HashMap;

use vela_common::{HwFamily, RuntimeError, RuntimeResult};

use crate::command_stream_receiver::ReceiverParams;
use crate::hw::{Gen11, Gen12Lp, Gen9, HwCommandStreamReceiver, SubmissionEngine};

/// Builds the receiver for one family.
pub type ReceiverFactory = fn(ReceiverParams) -> Box<dyn SubmissionEngine>;

/// Receiver factories keyed by hardware family. Built once at startup and
/// passed to every device that needs one.
pub struct ReceiverRegistry {
    factories: HashMap<HwFamily, ReceiverFactory>,
}

impl ReceiverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every family the runtime supports.
    pub fn with_default_families() -> Self {
        let mut registry = Self::new();
        registry.register(HwFamily::Gen9, HwCommandStreamReceiver::<Gen9>::create);
        registry.register(HwFamily::Gen11, HwCommandStreamReceiver::<Gen11>::create);
        registry.register(HwFamily::Gen12Lp, HwCommandStreamReceiver::<Gen12Lp>::create);
        registry
    }

    /// Register `factory` for `family`, returning the one it replaced.
    pub fn register(&mut self, family: HwFamily, factory: ReceiverFactory) -> Option<ReceiverFactory> {
        self.factories.insert(family, factory)
    }

    pub fn contains(&self, family: HwFamily) -> bool {
        self.factories.contains_key(&family)
    }

    /// Registered families in a stable order.
    pub fn families(&self) -> Vec<HwFamily> {
        let mut families: Vec<_> = self.factories.keys().copied().collect();
        families.sort();
        families
    }

    /// Build the receiver for `family`.
    pub fn create(&self, family: HwFamily, params: ReceiverParams) -> RuntimeResult<Box<dyn SubmissionEngine>> {
        let factory = self
            .factories
            .get(&family)
            .ok_or_else(|| RuntimeError::UnsupportedFamily(family.name().to_string()))?;
        Ok(factory(params))
    }
}

impl Default for ReceiverRegistry {
    fn default() -> Self {
        Self::with_default_families()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::memory_manager::HostMemoryManager;
    use vela_common::Settings;

    fn params() -> ReceiverParams {
        let mm = HostMemoryManager::new().into_shared();
        let backend = Box::new(SimulatedBackend::new(mm.clone()));
        ReceiverParams::new(mm, backend, Settings::default())
    }

    #[test]
    fn test_default_families() {
        let registry = ReceiverRegistry::with_default_families();
        assert_eq!(registry.families(), HwFamily::ALL.to_vec());
        for family in HwFamily::ALL {
            let engine = registry.create(family, params()).unwrap();
            assert_eq!(engine.family(), family);
        }
    }

    #[test]
    fn test_unregistered_family_is_an_error() {
        let registry = ReceiverRegistry::new();
        let err = registry.create(HwFamily::Gen11, params()).err().unwrap();
        assert!(matches!(err, RuntimeError::UnsupportedFamily(ref name) if name == "gen11"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ReceiverRegistry::new();
        assert!(registry
            .register(HwFamily::Gen9, HwCommandStreamReceiver::<Gen9>::create)
            .is_none());
        assert!(registry
            .register(HwFamily::Gen9, HwCommandStreamReceiver::<Gen11>::create)
            .is_some());
        // The replacement decides the receiver's family.
        let engine = registry.create(HwFamily::Gen9, params()).unwrap();
        assert_eq!(engine.family(), HwFamily::Gen11);
    }
}
