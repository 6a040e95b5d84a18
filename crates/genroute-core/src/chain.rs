use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::{ConfigError, ProviderAdapter, TaskType, ValidationError};

/// Priority-ordered adapter registry. Fixed once built.
#[derive(Clone, Default)]
pub struct FallbackChain {
    // Sorted by priority; ties keep registration order.
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl Debug for FallbackChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.adapters
                    .iter()
                    .map(|adapter| (adapter.name(), adapter.priority())),
            )
            .finish()
    }
}

impl FallbackChain {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(adapters.len());
        for adapter in &adapters {
            let name = adapter.name();
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyProviderName.into());
            }
            if !seen.insert(name.to_owned()) {
                return Err(ConfigError::DuplicateProvider {
                    name: name.to_owned(),
                });
            }
        }

        let mut adapters = adapters;
        adapters.sort_by_key(|adapter| adapter.priority());
        Ok(Self { adapters })
    }

    /// Adapters able to serve `task`, lowest priority value first.
    pub fn ordered_adapters(&self, task: TaskType) -> Vec<&dyn ProviderAdapter> {
        self.adapters
            .iter()
            .filter(|adapter| adapter.supported_tasks().supports(task))
            .map(as_dyn)
            .collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &dyn ProviderAdapter> {
        self.adapters.iter().map(as_dyn)
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn ProviderAdapter> {
        self.all().find(|adapter| adapter.name() == name)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn as_dyn(adapter: &Arc<dyn ProviderAdapter>) -> &dyn ProviderAdapter {
    adapter.as_ref()
}
