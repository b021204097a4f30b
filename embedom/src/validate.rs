//! Naming checks run over a built entity.
//!
//! - `duplicate_prefix`: two embeds on the same container resolve to the same prefix
//! - `duplicate_column`: two columns end up with the same storage name
//! - `array_embed_unsupported`: an array embed under a flattening backend

use std::collections::HashMap;

use crate::context::BackendContext;
use crate::embedded::EmbeddedId;
use crate::entity::EntityMetadata;
use crate::errors::{MetadataResult, ValidationError, ValidationIssue};

pub const DUPLICATE_PREFIX: &str = "duplicate_prefix";
pub const DUPLICATE_COLUMN: &str = "duplicate_column";
pub const ARRAY_EMBED_UNSUPPORTED: &str = "array_embed_unsupported";

/// Fails with every issue found in the entity's built embedded tree.
pub fn validate_entity(entity: &EntityMetadata, ctx: &BackendContext) -> MetadataResult<()> {
    let issues = collect_issues(entity, ctx)?;
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(issues).into())
    }
}

/// Collects naming issues without failing on them. The tree must already be built.
pub fn collect_issues(entity: &EntityMetadata, ctx: &BackendContext) -> MetadataResult<Vec<ValidationIssue>> {
    let mut issues = Vec::new();
    let tree = entity.embeddeds();

    if ctx.flattens_embeds() {
        check_sibling_prefixes(entity, tree.roots(), &mut issues)?;
        for node in tree.iter() {
            check_sibling_prefixes(entity, node.children(), &mut issues)?;
            if node.is_array() {
                issues.push(ValidationIssue::new(
                    node.display_path(),
                    ARRAY_EMBED_UNSUPPORTED,
                    "array embeds need a backend that stores nested documents",
                ));
            }
        }
    }

    // nested documents only clash inside the same embed
    let mut seen: HashMap<(Option<EmbeddedId>, String), String> = HashMap::new();
    for column in entity.resolve_columns(ctx)? {
        let scope = if ctx.flattens_embeds() { None } else { column.embedded };
        let key = (scope, column.database_name.clone());
        match seen.get(&key) {
            Some(first) => issues.push(ValidationIssue::new(
                column.property_path.clone(),
                DUPLICATE_COLUMN,
                format!("column name '{}' is already used by '{first}'", column.database_name),
            )),
            None => {
                seen.insert(key, column.property_path);
            }
        }
    }

    Ok(issues)
}

fn check_sibling_prefixes(
    entity: &EntityMetadata,
    siblings: &[EmbeddedId],
    issues: &mut Vec<ValidationIssue>,
) -> MetadataResult<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for id in siblings {
        let node = entity.embedded(*id)?;
        let prefix = node.prefix()?;
        match seen.get(prefix) {
            Some(first) => issues.push(ValidationIssue::new(
                node.display_path(),
                DUPLICATE_PREFIX,
                format!("prefix '{prefix}' is already used by '{first}'"),
            )),
            None => {
                seen.insert(prefix, node.display_path());
            }
        }
    }
    Ok(())
}
