//! Named engine lookup for configuration-time selection.

use heapless::{String, Vec};

use super::StepEngine;
use crate::error::{ConfigError, Error, Result};

/// Engines available on a board, selected by name from configuration.
pub struct EngineRegistry<'a, const N: usize> {
    engines: Vec<&'a mut dyn StepEngine, N>,
}

impl<'a, const N: usize> Default for EngineRegistry<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

fn engine_name(name: &str) -> String<32> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl<'a, const N: usize> EngineRegistry<'a, N> {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self { engines: Vec::new() }
    }

    /// Register an engine under its own [`StepEngine::name`].
    ///
    /// # Errors
    ///
    /// Returns an error if an engine with the same name is already registered
    /// or the registry is full.
    pub fn register(&mut self, engine: &'a mut dyn StepEngine) -> Result<()> {
        if self.contains(engine.name()) {
            error!("engine already registered");
            return Err(Error::Config(ConfigError::DuplicateEngine(engine_name(
                engine.name(),
            ))));
        }
        self.engines.push(engine).map_err(|_| {
            error!("engine registry full");
            Error::Config(ConfigError::RegistryFull)
        })
    }

    /// Check if an engine is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.engines.iter().any(|e| e.name() == name)
    }

    /// Borrow the engine registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEngine`] if no engine has that name.
    pub fn select(&mut self, name: &str) -> Result<&mut (dyn StepEngine + 'a)> {
        match self.engines.iter_mut().find(|e| e.name() == name) {
            Some(engine) => {
                debug!("selected step engine");
                Ok(&mut **engine)
            }
            None => {
                error!("unknown step engine");
                Err(Error::Config(ConfigError::UnknownEngine(engine_name(name))))
            }
        }
    }

    /// Consume the registry, keeping only the engine registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownEngine`] if no engine has that name.
    pub fn take(self, name: &str) -> Result<&'a mut dyn StepEngine> {
        self.engines
            .into_iter()
            .find(|e| e.name() == name)
            .ok_or_else(|| {
                error!("unknown step engine");
                Error::Config(ConfigError::UnknownEngine(engine_name(name)))
            })
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + use<'_, 'a, N> {
        self.engines.iter().map(|e| e.name())
    }

    /// Get the number of registered engines.
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
