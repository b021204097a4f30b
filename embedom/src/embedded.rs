//! Embedded-object metadata and the arena tree that owns it.
//!
//! An entity owns one [`EmbeddedTree`]. Every node in it describes one embedded
//! property: the columns and relations declared directly on it, the embeds nested
//! inside it (owned, by id) and its parent (a non-owning id). Derived values such
//! as the flattened column prefix only exist after [`EmbeddedTree::build`] has run
//! for the node; reading them earlier returns [`MetadataError::NotBuilt`].

use log::debug;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::args::{EmbeddedArgs, PrefixOverride};
use crate::context::BackendContext;
use crate::entity::EntityRef;
use crate::errors::{MetadataError, MetadataResult};
use crate::types::{ColumnMetadata, RelationCountMetadata, RelationIdMetadata, RelationMetadata};

type FactoryFn = dyn Fn() -> Result<Box<dyn Any + Send>, String> + Send + Sync;

/// Zero-argument constructor producing a blank instance of an embedded type.
#[derive(Clone)]
pub struct Factory(Arc<FactoryFn>);

impl Factory {
    /// Wraps a fallible constructor. An `Err` surfaces as [`MetadataError::Construction`].
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Any + Send>, String> + Send + Sync + 'static,
    {
        Self(Arc::new(factory))
    }

    /// Factory calling `T::default()`.
    pub fn of<T>() -> Self
    where
        T: Any + Default + Send,
    {
        Self::new(|| Ok(Box::new(T::default()) as Box<dyn Any + Send>))
    }

    fn call(&self) -> Result<Box<dyn Any + Send>, String> {
        (self.0)()
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Factory(..)")
    }
}

/// The constructable shape an embed instantiates.
#[derive(Debug, Clone)]
pub struct EmbeddedType {
    type_name: String,
    factory: Option<Factory>,
}

impl EmbeddedType {
    /// A type known only by name. Instantiating it fails.
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            factory: None,
        }
    }

    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    pub fn instantiate(&self) -> MetadataResult<Box<dyn Any + Send>> {
        let factory = self.factory.as_ref().ok_or_else(|| MetadataError::Construction {
            type_name: self.type_name.clone(),
            message: "no factory registered".to_string(),
        })?;
        factory.call().map_err(|message| MetadataError::Construction {
            type_name: self.type_name.clone(),
            message,
        })
    }
}

/// Index of a node inside its [`EmbeddedTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EmbeddedId(usize);

impl EmbeddedId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EmbeddedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Values derived for a node by [`EmbeddedTree::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEmbedded {
    /// Prefix applied to the names of columns declared inside this embed.
    pub prefix: String,
    /// Property names from the outermost embed down to this one.
    ///
    /// For `post.data.information.counters` this is `["data", "information", "counters"]`.
    pub parent_property_names: Vec<String>,
    /// Nodes from the outermost embed down to and including this one.
    pub tree: Vec<EmbeddedId>,
    /// Own columns followed by every descendant's columns, depth-first.
    pub columns_from_tree: Vec<ColumnMetadata>,
    pub relations_from_tree: Vec<RelationMetadata>,
    pub relation_ids_from_tree: Vec<RelationIdMetadata>,
    pub relation_counts_from_tree: Vec<RelationCountMetadata>,
}

/// One embedded property of an entity.
#[derive(Debug, Clone)]
pub struct EmbeddedMetadata {
    id: EmbeddedId,
    entity: EntityRef,
    parent: Option<EmbeddedId>,
    embedded_type: EmbeddedType,
    property_name: String,
    prefix_override: PrefixOverride,
    is_array: bool,
    columns: Vec<ColumnMetadata>,
    relations: Vec<RelationMetadata>,
    relation_ids: Vec<RelationIdMetadata>,
    relation_counts: Vec<RelationCountMetadata>,
    children: Vec<EmbeddedId>,
    display_path: String,
    resolved: Option<ResolvedEmbedded>,
}

impl EmbeddedMetadata {
    /// Creates a detached node from its declaration. Nested declarations in
    /// `args.embeddeds` are ignored here; the assembler inserts them separately.
    pub fn new(entity: EntityRef, args: &EmbeddedArgs) -> MetadataResult<Self> {
        if args.property_name.is_empty() {
            return Err(MetadataError::InvalidDeclaration {
                message: format!("embedded property on '{}' has an empty name", entity.name()),
            });
        }
        let mut embedded_type = EmbeddedType::named(&args.type_name);
        if let Some(factory) = &args.factory {
            embedded_type = embedded_type.with_factory(factory.clone());
        }
        Ok(Self {
            id: EmbeddedId(0),
            entity,
            parent: None,
            embedded_type,
            property_name: args.property_name.clone(),
            prefix_override: args.prefix.clone(),
            is_array: args.is_array,
            columns: args.columns.clone(),
            relations: args.relations.clone(),
            relation_ids: args.relation_ids.clone(),
            relation_counts: args.relation_counts.clone(),
            children: Vec::new(),
            display_path: args.property_name.clone(),
            resolved: None,
        })
    }

    /// Creates a new blank instance of the embedded type.
    pub fn instantiate(&self) -> MetadataResult<Box<dyn Any + Send>> {
        self.embedded_type.instantiate()
    }

    /// Like [`instantiate`](Self::instantiate), downcast to a concrete type.
    pub fn instantiate_as<T: Any>(&self) -> MetadataResult<T> {
        self.instantiate()?
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| MetadataError::Construction {
                type_name: self.embedded_type.type_name().to_string(),
                message: format!("factory did not produce a {}", std::any::type_name::<T>()),
            })
    }

    pub fn id(&self) -> EmbeddedId {
        self.id
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn parent(&self) -> Option<EmbeddedId> {
        self.parent
    }

    pub fn embedded_type(&self) -> &EmbeddedType {
        &self.embedded_type
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn prefix_override(&self) -> &PrefixOverride {
        &self.prefix_override
    }

    /// True when the runtime value is a list of `embedded_type` instances.
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn relations(&self) -> &[RelationMetadata] {
        &self.relations
    }

    pub fn relation_ids(&self) -> &[RelationIdMetadata] {
        &self.relation_ids
    }

    pub fn relation_counts(&self) -> &[RelationCountMetadata] {
        &self.relation_counts
    }

    pub fn children(&self) -> &[EmbeddedId] {
        &self.children
    }

    /// Dotted property path from the entity, e.g. `data.counters`. Known before build.
    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    pub fn is_built(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn resolved(&self) -> MetadataResult<&ResolvedEmbedded> {
        self.resolved.as_ref().ok_or_else(|| MetadataError::NotBuilt {
            path: self.display_path.clone(),
        })
    }

    pub fn prefix(&self) -> MetadataResult<&str> {
        Ok(&self.resolved()?.prefix)
    }

    pub fn parent_property_names(&self) -> MetadataResult<&[String]> {
        Ok(&self.resolved()?.parent_property_names)
    }

    /// Ids of the nodes from the outermost embed down to this one.
    /// Use [`EmbeddedTree::node_chain`] to get the nodes themselves.
    pub fn embedded_metadata_tree(&self) -> MetadataResult<&[EmbeddedId]> {
        Ok(&self.resolved()?.tree)
    }

    pub fn columns_from_tree(&self) -> MetadataResult<&[ColumnMetadata]> {
        Ok(&self.resolved()?.columns_from_tree)
    }

    pub fn relations_from_tree(&self) -> MetadataResult<&[RelationMetadata]> {
        Ok(&self.resolved()?.relations_from_tree)
    }

    pub fn relation_ids_from_tree(&self) -> MetadataResult<&[RelationIdMetadata]> {
        Ok(&self.resolved()?.relation_ids_from_tree)
    }

    pub fn relation_counts_from_tree(&self) -> MetadataResult<&[RelationCountMetadata]> {
        Ok(&self.resolved()?.relation_counts_from_tree)
    }
}

/// Arena owning every embed of one entity.
///
/// Inserting or editing a node clears the derived state of the whole tree, so a
/// stale aggregate can never be read; call [`build`](Self::build) again afterwards.
#[derive(Debug, Clone)]
pub struct EmbeddedTree {
    entity: EntityRef,
    nodes: Vec<EmbeddedMetadata>,
    roots: Vec<EmbeddedId>,
}

impl EmbeddedTree {
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Entity every node of this tree belongs to.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Embeds declared directly on the entity, in declaration order.
    pub fn roots(&self) -> &[EmbeddedId] {
        &self.roots
    }

    pub fn get(&self, id: EmbeddedId) -> MetadataResult<&EmbeddedMetadata> {
        self.nodes
            .get(id.0)
            .ok_or(MetadataError::UnknownEmbedded { id: id.0 })
    }

    /// All nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &EmbeddedMetadata> {
        self.nodes.iter()
    }

    /// Attaches `node` under `parent` (or directly on the entity) and returns its id.
    ///
    /// The node must have been created for this tree's entity, and sibling property
    /// names must be unique.
    pub fn insert(&mut self, parent: Option<EmbeddedId>, mut node: EmbeddedMetadata) -> MetadataResult<EmbeddedId> {
        if !node.entity.same_entity(&self.entity) {
            return Err(MetadataError::InvalidDeclaration {
                message: format!(
                    "embedded '{}' belongs to entity '{}', not '{}'",
                    node.property_name, node.entity, self.entity
                ),
            });
        }
        let (container, siblings) = match parent {
            Some(parent_id) => {
                let parent_node = self.get(parent_id)?;
                (parent_node.display_path.clone(), parent_node.children.as_slice())
            }
            None => (self.entity.name().to_string(), self.roots.as_slice()),
        };
        if siblings
            .iter()
            .any(|sibling| self.nodes[sibling.0].property_name == node.property_name)
        {
            return Err(MetadataError::DuplicateProperty {
                container,
                property: node.property_name,
            });
        }

        let id = EmbeddedId(self.nodes.len());
        node.id = id;
        node.parent = parent;
        node.children.clear();
        node.display_path = match parent {
            Some(_) => format!("{container}.{}", node.property_name),
            None => node.property_name.clone(),
        };
        node.resolved = None;
        self.nodes.push(node);
        match parent {
            Some(parent_id) => self.nodes[parent_id.0].children.push(id),
            None => self.roots.push(id),
        }
        self.invalidate();
        Ok(id)
    }

    /// Appends a column declared directly on the node.
    pub fn add_column(&mut self, id: EmbeddedId, column: ColumnMetadata) -> MetadataResult<()> {
        self.get(id)?;
        self.nodes[id.0].columns.push(column);
        self.invalidate();
        Ok(())
    }

    /// Removes a column declared directly on the node by property name.
    pub fn remove_column(&mut self, id: EmbeddedId, property_name: &str) -> MetadataResult<Option<ColumnMetadata>> {
        self.get(id)?;
        let columns = &mut self.nodes[id.0].columns;
        let removed = columns
            .iter()
            .position(|column| column.property_name == property_name)
            .map(|index| columns.remove(index));
        if removed.is_some() {
            self.invalidate();
        }
        Ok(removed)
    }

    /// Builds the node and its whole subtree, returning the built node.
    ///
    /// Children are built first so their aggregates can be folded into this node's.
    /// The prefix and path depend only on the parent chain, so building any node
    /// gives the same result whatever order the tree is visited in.
    pub fn build(&mut self, id: EmbeddedId, ctx: &BackendContext) -> MetadataResult<&EmbeddedMetadata> {
        let children = self.get(id)?.children.clone();
        for child in children {
            self.build(child, ctx)?;
        }

        let resolved = self.resolve(id, ctx)?;
        debug!(
            "built embedded '{}' prefix='{}' columns={}",
            self.nodes[id.0].display_path,
            resolved.prefix,
            resolved.columns_from_tree.len()
        );
        let node = &mut self.nodes[id.0];
        node.resolved = Some(resolved);
        Ok(&*node)
    }

    /// Builds every top-level embed in declaration order.
    pub fn build_all(&mut self, ctx: &BackendContext) -> MetadataResult<()> {
        for root in self.roots.clone() {
            self.build(root, ctx)?;
        }
        Ok(())
    }

    /// Ids from the outermost ancestor down to and including `id`.
    pub fn ancestry(&self, id: EmbeddedId) -> MetadataResult<Vec<EmbeddedId>> {
        let mut chain = vec![id];
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.get(parent)?.parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// The built node chain of `id` as node references, outermost first.
    pub fn node_chain(&self, id: EmbeddedId) -> MetadataResult<Vec<&EmbeddedMetadata>> {
        self.get(id)?
            .embedded_metadata_tree()?
            .iter()
            .map(|node_id| self.get(*node_id))
            .collect()
    }

    /// Finds a node by its property path from the entity, e.g. `["data", "counters"]`.
    pub fn find_by_path(&self, path: &[&str]) -> Option<&EmbeddedMetadata> {
        let (first, rest) = path.split_first()?;
        let mut current = self
            .roots
            .iter()
            .map(|id| &self.nodes[id.0])
            .find(|node| node.property_name == *first)?;
        for segment in rest {
            current = current
                .children
                .iter()
                .map(|id| &self.nodes[id.0])
                .find(|node| node.property_name == *segment)?;
        }
        Some(current)
    }

    pub(crate) fn invalidate(&mut self) {
        for node in &mut self.nodes {
            node.resolved = None;
        }
    }

    fn resolve(&self, id: EmbeddedId, ctx: &BackendContext) -> MetadataResult<ResolvedEmbedded> {
        let node = self.get(id)?;
        let tree = self.ancestry(id)?;
        let parent_property_names = tree
            .iter()
            .map(|node_id| self.nodes[node_id.0].property_name.clone())
            .collect();

        let mut columns_from_tree = node.columns.clone();
        let mut relations_from_tree = node.relations.clone();
        let mut relation_ids_from_tree = node.relation_ids.clone();
        let mut relation_counts_from_tree = node.relation_counts.clone();
        for child in &node.children {
            let child = self.get(*child)?.resolved()?;
            columns_from_tree.extend_from_slice(&child.columns_from_tree);
            relations_from_tree.extend_from_slice(&child.relations_from_tree);
            relation_ids_from_tree.extend_from_slice(&child.relation_ids_from_tree);
            relation_counts_from_tree.extend_from_slice(&child.relation_counts_from_tree);
        }

        Ok(ResolvedEmbedded {
            prefix: self.resolve_prefix(id, ctx)?,
            parent_property_names,
            tree,
            columns_from_tree,
            relations_from_tree,
            relation_ids_from_tree,
            relation_counts_from_tree,
        })
    }

    fn resolve_prefix(&self, id: EmbeddedId, ctx: &BackendContext) -> MetadataResult<String> {
        let node = self.get(id)?;
        if !ctx.flattens_embeds() {
            return Ok(node.property_name.clone());
        }
        let parent_prefix = match node.parent {
            Some(parent) => self.resolve_prefix(parent, ctx)?,
            None => String::new(),
        };
        let own = node.prefix_override.segment(&node.property_name).unwrap_or("");
        Ok(ctx.join_segments([parent_prefix.as_str(), own]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Counters {
        likes: u64,
    }

    fn post_tree() -> EmbeddedTree {
        EmbeddedTree::new(EntityRef::new("Post"))
    }

    fn node(tree: &EmbeddedTree, property: &str) -> EmbeddedMetadata {
        EmbeddedMetadata::new(tree.entity().clone(), &EmbeddedArgs::new(property)).expect("valid declaration")
    }

    #[test]
    fn empty_property_name_is_rejected() {
        let err = EmbeddedMetadata::new(EntityRef::new("Post"), &EmbeddedArgs::new("")).expect_err("empty name");
        assert!(matches!(err, MetadataError::InvalidDeclaration { .. }));
    }

    #[test]
    fn reading_derived_values_before_build_fails() {
        let mut tree = post_tree();
        let id = tree.insert(None, node(&tree, "data")).expect("insert");
        let data = tree.get(id).expect("node");
        assert!(!data.is_built());
        assert!(matches!(data.prefix(), Err(MetadataError::NotBuilt { .. })));
        assert!(matches!(data.columns_from_tree(), Err(MetadataError::NotBuilt { .. })));
    }

    #[test]
    fn inserting_after_build_invalidates_tree() {
        let ctx = BackendContext::flattened();
        let mut tree = post_tree();
        let data = tree.insert(None, node(&tree, "data")).expect("insert");
        tree.build_all(&ctx).expect("build");
        assert!(tree.get(data).expect("node").is_built());

        tree.insert(Some(data), node(&tree, "counters")).expect("insert child");
        assert!(!tree.get(data).expect("node").is_built());
    }

    #[test]
    fn duplicate_siblings_are_rejected() {
        let mut tree = post_tree();
        let data = tree.insert(None, node(&tree, "data")).expect("insert");
        tree.insert(Some(data), node(&tree, "counters")).expect("first child");
        let err = tree.insert(Some(data), node(&tree, "counters")).expect_err("duplicate child");
        match err {
            MetadataError::DuplicateProperty { container, property } => {
                assert_eq!(container, "data");
                assert_eq!(property, "counters");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // same name under a different parent is fine
        tree.insert(None, node(&tree, "counters")).expect("top-level counters");
    }

    #[test]
    fn unknown_id_is_reported() {
        let tree = post_tree();
        assert!(matches!(tree.get(EmbeddedId(3)), Err(MetadataError::UnknownEmbedded { id: 3 })));
    }

    #[test]
    fn nodes_from_another_entity_are_rejected() {
        let mut tree = post_tree();
        let foreign = EmbeddedMetadata::new(EntityRef::new("Comment"), &EmbeddedArgs::new("data")).expect("valid");
        let err = tree.insert(None, foreign).expect_err("foreign entity");
        assert!(matches!(err, MetadataError::InvalidDeclaration { .. }));

        // same name, different handle
        let lookalike = EmbeddedMetadata::new(EntityRef::new("Post"), &EmbeddedArgs::new("data")).expect("valid");
        assert!(tree.insert(None, lookalike).is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn instantiate_returns_independent_instances() {
        let args = EmbeddedArgs::new("counters").with_type::<Counters>();
        let counters = EmbeddedMetadata::new(EntityRef::new("Post"), &args).expect("valid declaration");

        let mut first: Counters = counters.instantiate_as().expect("first instance");
        let second: Counters = counters.instantiate_as().expect("second instance");
        first.likes = 10;
        assert_eq!(second, Counters::default());
        assert_eq!(first.likes, 10);
    }

    #[test]
    fn instantiate_without_factory_fails() {
        let args = EmbeddedArgs::new("counters").with_type_name("Counters");
        let counters = EmbeddedMetadata::new(EntityRef::new("Post"), &args).expect("valid declaration");
        let err = counters.instantiate().expect_err("no factory");
        assert!(matches!(err, MetadataError::Construction { ref type_name, .. } if type_name == "Counters"));
    }

    #[test]
    fn failing_factory_surfaces_its_message() {
        let factory = Factory::new(|| Err("constructor requires a clock".to_string()));
        let args = EmbeddedArgs::new("audit").with_type_name("Audit").with_factory(factory);
        let audit = EmbeddedMetadata::new(EntityRef::new("Post"), &args).expect("valid declaration");
        match audit.instantiate() {
            Err(MetadataError::Construction { message, .. }) => assert_eq!(message, "constructor requires a clock"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn downcast_to_wrong_type_fails() {
        let args = EmbeddedArgs::new("counters").with_type::<Counters>();
        let counters = EmbeddedMetadata::new(EntityRef::new("Post"), &args).expect("valid declaration");
        assert!(counters.instantiate_as::<String>().is_err());
    }

    #[test]
    fn remove_column_reports_missing() {
        let mut tree = post_tree();
        let id = tree.insert(None, node(&tree, "data")).expect("insert");
        tree.add_column(id, ColumnMetadata::new("likes")).expect("add");
        let removed = tree.remove_column(id, "likes").expect("remove");
        assert_eq!(removed.map(|column| column.property_name), Some("likes".to_string()));
        assert_eq!(tree.remove_column(id, "likes").expect("remove again"), None);
    }
}
