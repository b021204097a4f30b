use log::{debug, warn};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::args::{EmbeddedArgs, EntityArgs};
use crate::context::{BackendContext, CollisionPolicy};
use crate::embedded::{EmbeddedId, EmbeddedMetadata, EmbeddedTree};
use crate::errors::{MetadataError, MetadataResult, ValidationError};
use crate::types::{ColumnMetadata, RelationCountMetadata, RelationIdMetadata, RelationMetadata};
use crate::validate;

/// Shared identity handle of an entity, held by every embed in its tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef(Arc<str>);

impl EntityRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// True when both handles were cloned from the same entity.
    pub fn same_entity(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A column of the entity with its final storage name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub column: ColumnMetadata,
    /// Embed the column is declared on, `None` for the entity's own columns.
    pub embedded: Option<EmbeddedId>,
    /// Storage name after embed prefixes are applied.
    pub database_name: String,
    /// Dotted path to the value on the entity object, e.g. `data.counters.likes`.
    pub property_path: String,
}

/// Entity descriptor owning the embedded tree.
///
/// Built metadata is meant to be shared read-only behind an `Arc`. Rebuilding takes
/// `&mut self`, so a rebuild can never overlap reads of the same value.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    entity: EntityRef,
    columns: Vec<ColumnMetadata>,
    embeddeds: EmbeddedTree,
    built_with: Option<BackendContext>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let entity = EntityRef::new(name);
        Self {
            embeddeds: EmbeddedTree::new(entity.clone()),
            entity,
            columns: Vec::new(),
            built_with: None,
        }
    }

    /// Assembles the entity and its embedded tree from raw declarations.
    pub fn from_args(args: EntityArgs) -> MetadataResult<Self> {
        if args.name.is_empty() {
            return Err(MetadataError::InvalidDeclaration {
                message: "entity name must not be empty".to_string(),
            });
        }
        let mut metadata = Self::new(args.name);
        metadata.columns = args.columns;
        for embedded in &args.embeddeds {
            metadata.attach(None, embedded)?;
        }
        Ok(metadata)
    }

    /// Attaches a declaration (and everything nested in it) under `parent`.
    pub fn attach(&mut self, parent: Option<EmbeddedId>, args: &EmbeddedArgs) -> MetadataResult<EmbeddedId> {
        let node = EmbeddedMetadata::new(self.entity.clone(), args)?;
        let id = self.embeddeds.insert(parent, node)?;
        for child in &args.embeddeds {
            self.attach(Some(id), child)?;
        }
        self.built_with = None;
        Ok(id)
    }

    /// Builds every top-level embed, then checks the result for naming collisions.
    pub fn build(&mut self, ctx: &BackendContext) -> MetadataResult<&Self> {
        self.built_with = None;
        debug!(
            "building entity '{}' ({} embeds, {:?})",
            self.entity,
            self.embeddeds.len(),
            ctx.embed_style
        );
        self.embeddeds.build_all(ctx)?;

        let issues = validate::collect_issues(self, ctx)?;
        if !issues.is_empty() {
            match ctx.collision_policy {
                CollisionPolicy::Reject => {
                    self.embeddeds.invalidate();
                    return Err(ValidationError::new(issues).into());
                }
                CollisionPolicy::Ignore => {
                    for issue in &issues {
                        warn!("entity '{}': {issue}", self.entity);
                    }
                }
            }
        }
        self.built_with = Some(ctx.clone());
        Ok(&*self)
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn name(&self) -> &str {
        self.entity.name()
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn add_column(&mut self, column: ColumnMetadata) {
        self.columns.push(column);
        self.built_with = None;
    }

    pub fn embeddeds(&self) -> &EmbeddedTree {
        &self.embeddeds
    }

    /// Mutable access to the tree. The entity must be rebuilt afterwards.
    pub fn embeddeds_mut(&mut self) -> &mut EmbeddedTree {
        self.built_with = None;
        &mut self.embeddeds
    }

    pub fn embedded(&self, id: EmbeddedId) -> MetadataResult<&EmbeddedMetadata> {
        self.embeddeds.get(id)
    }

    /// Finds an embed by dotted property path, e.g. `data.counters`.
    pub fn find_embedded(&self, path: &str) -> Option<&EmbeddedMetadata> {
        let segments: Vec<&str> = path.split('.').collect();
        self.embeddeds.find_by_path(&segments)
    }

    pub fn is_built(&self) -> bool {
        self.built_with.is_some()
    }

    pub fn built_context(&self) -> MetadataResult<&BackendContext> {
        self.built_with.as_ref().ok_or_else(|| MetadataError::NotBuilt {
            path: self.entity.name().to_string(),
        })
    }

    /// Creates a blank instance of the embed's type.
    pub fn create_embedded(&self, id: EmbeddedId) -> MetadataResult<Box<dyn Any + Send>> {
        self.embeddeds.get(id)?.instantiate()
    }

    /// Own columns followed by every embedded column, depth-first in declaration order.
    pub fn all_columns(&self) -> MetadataResult<Vec<ResolvedColumn>> {
        self.resolve_columns(self.built_context()?)
    }

    /// Relations declared anywhere in the embedded tree.
    pub fn embedded_relations(&self) -> MetadataResult<Vec<RelationMetadata>> {
        self.collect_from_roots(|node| node.relations_from_tree())
    }

    pub fn embedded_relation_ids(&self) -> MetadataResult<Vec<RelationIdMetadata>> {
        self.collect_from_roots(|node| node.relation_ids_from_tree())
    }

    pub fn embedded_relation_counts(&self) -> MetadataResult<Vec<RelationCountMetadata>> {
        self.collect_from_roots(|node| node.relation_counts_from_tree())
    }

    pub(crate) fn resolve_columns(&self, ctx: &BackendContext) -> MetadataResult<Vec<ResolvedColumn>> {
        let mut resolved: Vec<ResolvedColumn> = self
            .columns
            .iter()
            .map(|column| ResolvedColumn {
                column: column.clone(),
                embedded: None,
                database_name: column.given_name().to_string(),
                property_path: column.property_name.clone(),
            })
            .collect();
        for root in self.embeddeds.roots() {
            self.resolve_embedded_columns(*root, ctx, &mut resolved)?;
        }
        Ok(resolved)
    }

    fn resolve_embedded_columns(
        &self,
        id: EmbeddedId,
        ctx: &BackendContext,
        out: &mut Vec<ResolvedColumn>,
    ) -> MetadataResult<()> {
        let node = self.embeddeds.get(id)?;
        let prefix = node.prefix()?;
        let path = node.parent_property_names()?.join(".");
        for column in node.columns() {
            out.push(ResolvedColumn {
                column: column.clone(),
                embedded: Some(id),
                database_name: ctx.column_name(prefix, column.given_name()),
                property_path: format!("{path}.{}", column.property_name),
            });
        }
        for child in node.children() {
            self.resolve_embedded_columns(*child, ctx, out)?;
        }
        Ok(())
    }

    fn collect_from_roots<T, F>(&self, select: F) -> MetadataResult<Vec<T>>
    where
        T: Clone,
        F: Fn(&EmbeddedMetadata) -> MetadataResult<&[T]>,
    {
        self.built_context()?;
        let mut items = Vec::new();
        for root in self.embeddeds.roots() {
            items.extend_from_slice(select(self.embeddeds.get(*root)?)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationKind;

    fn post_args() -> EntityArgs {
        EntityArgs::new("Post").column(ColumnMetadata::new("id").primary()).embed(
            EmbeddedArgs::new("data")
                .column(ColumnMetadata::new("title"))
                .relation(RelationMetadata::new("author", "User", RelationKind::ManyToOne))
                .embed(
                    EmbeddedArgs::new("counters")
                        .with_prefix("cnt")
                        .column(ColumnMetadata::new("likes"))
                        .relation_count(RelationCountMetadata::new("commentCount", "comments")),
                ),
        )
    }

    #[test]
    fn nodes_share_the_entity_handle() {
        let post = EntityMetadata::from_args(post_args()).expect("assemble");
        for node in post.embeddeds().iter() {
            assert!(node.entity().same_entity(post.entity()));
        }
    }

    #[test]
    fn all_columns_applies_prefixes() {
        let mut post = EntityMetadata::from_args(post_args()).expect("assemble");
        post.build(&BackendContext::flattened()).expect("build");

        let columns = post.all_columns().expect("columns");
        let names: Vec<&str> = columns.iter().map(|column| column.database_name.as_str()).collect();
        assert_eq!(names, ["id", "data_title", "data_cnt_likes"]);
        let paths: Vec<&str> = columns.iter().map(|column| column.property_path.as_str()).collect();
        assert_eq!(paths, ["id", "data.title", "data.counters.likes"]);
    }

    #[test]
    fn nested_style_keeps_plain_column_names() {
        let mut post = EntityMetadata::from_args(post_args()).expect("assemble");
        post.build(&BackendContext::nested()).expect("build");

        let names: Vec<String> = post
            .all_columns()
            .expect("columns")
            .into_iter()
            .map(|column| column.database_name)
            .collect();
        assert_eq!(names, ["id", "title", "likes"]);
    }

    #[test]
    fn columns_require_a_build() {
        let post = EntityMetadata::from_args(post_args()).expect("assemble");
        assert!(matches!(post.all_columns(), Err(MetadataError::NotBuilt { .. })));
        assert!(matches!(post.embedded_relations(), Err(MetadataError::NotBuilt { .. })));
    }

    #[test]
    fn editing_the_tree_requires_a_rebuild() {
        let mut post = EntityMetadata::from_args(post_args()).expect("assemble");
        post.build(&BackendContext::flattened()).expect("build");
        let data = post.embeddeds().roots()[0];
        post.embeddeds_mut()
            .add_column(data, ColumnMetadata::new("body"))
            .expect("add column");
        assert!(!post.is_built());
        post.build(&BackendContext::flattened()).expect("rebuild");
        assert_eq!(post.all_columns().expect("columns").len(), 4);
    }

    #[test]
    fn relations_are_collected_across_roots() {
        let mut post = EntityMetadata::from_args(post_args()).expect("assemble");
        post.build(&BackendContext::flattened()).expect("build");
        assert_eq!(post.embedded_relations().expect("relations").len(), 1);
        assert_eq!(post.embedded_relation_counts().expect("counts")[0].relation_name, "comments");
        assert!(post.embedded_relation_ids().expect("ids").is_empty());
    }

    #[test]
    fn tree_only_accepts_nodes_of_its_entity() {
        let mut post = EntityMetadata::from_args(post_args()).expect("assemble");
        let other = EmbeddedMetadata::new(EntityRef::new("Other"), &EmbeddedArgs::new("extra")).expect("valid");
        let err = post.embeddeds_mut().insert(None, other).expect_err("foreign node");
        assert!(matches!(err, MetadataError::InvalidDeclaration { .. }));

        let own = EmbeddedMetadata::new(post.entity().clone(), &EmbeddedArgs::new("extra")).expect("valid");
        post.embeddeds_mut().insert(None, own).expect("own node");
        assert_eq!(post.embeddeds().roots().len(), 2);
    }

    #[test]
    fn empty_entity_name_is_rejected() {
        let err = EntityMetadata::from_args(EntityArgs::new("")).expect_err("empty name");
        assert!(matches!(err, MetadataError::InvalidDeclaration { .. }));
    }
}
