use crate::dsl::{self, DslStrategy};
use crate::{RegistryError, Strategy, StrategyFactory};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

enum Entry {
    Native(Arc<dyn StrategyFactory>),
    Dsl(dsl::Program),
}

/// Maps a `strategy_id` to something that can produce a running
/// [`Strategy`] instance: either a pre-compiled Rust type registered by the
/// build step, or a parsed DSL program. Replaces the original's
/// write-to-disk-and-import trick per the Design Notes.
#[derive(Default)]
pub struct StrategyRegistry {
    entries: HashMap<Uuid, Entry>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_native(&mut self, strategy_id: Uuid, factory: Arc<dyn StrategyFactory>) {
        self.entries.insert(strategy_id, Entry::Native(factory));
    }

    /// Parses `source` as a DSL program and registers it under
    /// `strategy_id`. Returns the parse error rather than registering a
    /// broken entry.
    pub fn register_dsl_source(
        &mut self,
        strategy_id: Uuid,
        source: &str,
    ) -> Result<(), crate::DslError> {
        let program = dsl::parse(source)?;
        self.entries.insert(strategy_id, Entry::Dsl(program));
        Ok(())
    }

    pub fn instantiate(&self, strategy_id: Uuid) -> Result<Box<dyn Strategy>, RegistryError> {
        match self.entries.get(&strategy_id) {
            Some(Entry::Native(factory)) => Ok(factory.create()),
            Some(Entry::Dsl(program)) => Ok(Box::new(DslStrategy::new(program.clone()))),
            None => Err(RegistryError::NotFound(strategy_id)),
        }
    }

    pub fn contains(&self, strategy_id: Uuid) -> bool {
        self.entries.contains_key(&strategy_id)
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("registered", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_strategy_id_errors() {
        let registry = StrategyRegistry::new();
        let err = registry.instantiate(Uuid::nil()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn dsl_source_round_trips_into_an_instantiable_entry() {
        let mut registry = StrategyRegistry::new();
        let id = Uuid::nil();
        registry
            .register_dsl_source(id, "IF close > 100 THEN BUY 10")
            .unwrap();
        assert!(registry.contains(id));
        registry.instantiate(id).unwrap();
    }
}
