use crate::entity::EntityMetadata;
use crate::errors::{MetadataError, MetadataResult};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<EntityMetadata>>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, Arc<EntityMetadata>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Publishes built metadata for readers. Replaces any entry with the same entity name.
///
/// Entries are immutable once registered; to change an entity, build a new
/// `EntityMetadata` and register it again.
pub fn register_entity(metadata: EntityMetadata) -> MetadataResult<Arc<EntityMetadata>> {
    metadata.built_context()?;
    let metadata = Arc::new(metadata);
    registry()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(metadata.name().to_string(), Arc::clone(&metadata));
    Ok(metadata)
}

pub fn get_entity(name: &str) -> Option<Arc<EntityMetadata>> {
    registry()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(name)
        .cloned()
}

/// Like [`get_entity`] but reports a missing entry as an error.
pub fn require_entity(name: &str) -> MetadataResult<Arc<EntityMetadata>> {
    get_entity(name).ok_or_else(|| MetadataError::UnknownEntity { name: name.to_string() })
}

/// Names of every registered entity, sorted.
pub fn registered_entities() -> Vec<String> {
    let mut names: Vec<String> = registry()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

pub fn clear_registry() {
    registry()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clear();
}
