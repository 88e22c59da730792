//! Sensor model registry
//!
//! Configuration names a sensor model by string. The registry maps those names
//! to decoder constructors and rejects anything it does not know, so a typo in
//! a config file fails at startup rather than at the first frame.
//!
//! | Name | Decoder |
//! |------|---------|
//! | `pce-aqd20` | [`PceAqd20Decoder`] |
//! | `plantower` | [`PlantowerDecoder`] |
//! | `xiaomi-mi` | [`XiaomiMiDecoder`] |

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::ToString;

use crate::decoder::{FrameDecoder, PceAqd20Decoder, PlantowerDecoder, SignCorrection, XiaomiMiDecoder};
use crate::errors::ConfigError;

/// Per-model settings taken from the reader configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelOptions {
    /// Sign handling for binary temperature readings
    pub sign_correction: SignCorrection,
}

/// Builds a decoder from its options
pub type DecoderFactory = fn(&ModelOptions) -> Box<dyn FrameDecoder>;

fn pce_aqd20(_: &ModelOptions) -> Box<dyn FrameDecoder> {
    Box::new(PceAqd20Decoder::new())
}

fn plantower(_: &ModelOptions) -> Box<dyn FrameDecoder> {
    Box::new(PlantowerDecoder::new())
}

fn xiaomi_mi(options: &ModelOptions) -> Box<dyn FrameDecoder> {
    Box::new(XiaomiMiDecoder::with_sign_correction(options.sign_correction))
}

/// Name → decoder constructor table
#[derive(Clone)]
pub struct ModelRegistry {
    factories: BTreeMap<&'static str, DecoderFactory>,
}

impl ModelRegistry {
    /// Registry without any models
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the bundled sensor models
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("pce-aqd20", pce_aqd20);
        registry.register("plantower", plantower);
        registry.register("xiaomi-mi", xiaomi_mi);
        registry
    }

    /// Add or replace a model
    pub fn register(&mut self, name: &'static str, factory: DecoderFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Build the decoder registered under `name`
    pub fn create(&self, name: &str, options: &ModelOptions) -> Result<Box<dyn FrameDecoder>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))?;
        Ok(factory(options))
    }
}

impl core::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
