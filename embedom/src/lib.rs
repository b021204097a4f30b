//! Embedded-object metadata for entity mapping.
//!
//! Describes how embedded sub-objects of an entity map onto the entity's storage:
//! the column prefix every embed contributes, the property path from the entity
//! down to it, and flattened views of the columns and relations declared anywhere
//! in its subtree.
//!
//! ```
//! use embedom::{BackendContext, ColumnMetadata, EmbeddedArgs, EntityArgs, EntityMetadata};
//!
//! let args = EntityArgs::new("Post").embed(
//!     EmbeddedArgs::new("data").embed(
//!         EmbeddedArgs::new("counters")
//!             .with_prefix("cnt")
//!             .column(ColumnMetadata::new("likes")),
//!     ),
//! );
//! let mut post = EntityMetadata::from_args(args)?;
//! post.build(&BackendContext::flattened())?;
//!
//! let counters = post.find_embedded("data.counters").unwrap();
//! assert_eq!(counters.prefix()?, "data_cnt");
//! assert_eq!(counters.parent_property_names()?, ["data", "counters"]);
//! # Ok::<(), embedom::MetadataError>(())
//! ```

pub mod args;
pub mod context;
pub mod embedded;
pub mod entity;
pub mod errors;
pub mod registry;
pub mod types;
pub mod validate;

pub use args::{EmbeddedArgs, EntityArgs, PrefixOverride};
pub use context::{BackendContext, CollisionPolicy, EmbedStyle};
pub use embedded::{EmbeddedId, EmbeddedMetadata, EmbeddedTree, EmbeddedType, Factory, ResolvedEmbedded};
pub use entity::{EntityMetadata, EntityRef, ResolvedColumn};
pub use errors::*;
pub use registry::*;
pub use types::{
    ColumnMetadata, ColumnType, RelationCountMetadata, RelationIdMetadata, RelationKind, RelationMetadata,
};
