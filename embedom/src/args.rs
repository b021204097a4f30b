//! Raw declarations handed to the assembler by the annotation layer.
//!
//! Everything here is plain data. The declarations deserialize from JSON or TOML so
//! a loader can feed them in without going through the builder methods.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::any::Any;

use crate::embedded::Factory;
use crate::types::{ColumnMetadata, RelationCountMetadata, RelationIdMetadata, RelationMetadata};

/// Name segment an embed contributes to flattened column prefixes.
///
/// - `Derived`: use the property name (nothing was declared)
/// - `Omitted`: contribute no segment at this level (declared as `""`, `false` or `true`)
/// - `Custom`: use the given literal instead of the property name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrefixOverride {
    #[default]
    Derived,
    Omitted,
    Custom(String),
}

impl PrefixOverride {
    pub fn from_option(value: Option<String>) -> Self {
        value.map(Self::from).unwrap_or_default()
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, PrefixOverride::Derived)
    }

    /// Segment this level contributes, given the embed's property name.
    pub fn segment<'a>(&'a self, property_name: &'a str) -> Option<&'a str> {
        match self {
            PrefixOverride::Derived => Some(property_name),
            PrefixOverride::Omitted => None,
            PrefixOverride::Custom(prefix) => Some(prefix),
        }
    }
}

impl From<String> for PrefixOverride {
    fn from(value: String) -> Self {
        if value.is_empty() {
            PrefixOverride::Omitted
        } else {
            PrefixOverride::Custom(value)
        }
    }
}

impl From<&str> for PrefixOverride {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl Serialize for PrefixOverride {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            // Derived is skipped by skip_serializing_if on the containing field
            PrefixOverride::Derived => serializer.serialize_none(),
            PrefixOverride::Omitted => serializer.serialize_str(""),
            PrefixOverride::Custom(prefix) => serializer.serialize_str(prefix),
        }
    }
}

impl<'de> Deserialize<'de> for PrefixOverride {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawPrefix {
            Flag(bool),
            Text(String),
        }

        Ok(match Option::<RawPrefix>::deserialize(deserializer)? {
            None => PrefixOverride::Derived,
            // a flag never names a segment, whatever its value
            Some(RawPrefix::Flag(_)) => PrefixOverride::Omitted,
            Some(RawPrefix::Text(text)) => PrefixOverride::from(text),
        })
    }
}

/// Declaration of one embedded property, including the embeds nested inside it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddedArgs {
    pub property_name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "PrefixOverride::is_derived")]
    pub prefix: PrefixOverride,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub relations: Vec<RelationMetadata>,
    #[serde(default)]
    pub relation_ids: Vec<RelationIdMetadata>,
    #[serde(default)]
    pub relation_counts: Vec<RelationCountMetadata>,
    #[serde(default)]
    pub embeddeds: Vec<EmbeddedArgs>,
    #[serde(skip)]
    pub factory: Option<Factory>,
}

impl EmbeddedArgs {
    pub fn new(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            ..Self::default()
        }
    }

    /// Declares `T` as the embedded type, constructed through `T::default()`.
    pub fn with_type<T>(mut self) -> Self
    where
        T: Any + Default + Send,
    {
        self.type_name = short_type_name::<T>().to_string();
        self.factory = Some(Factory::of::<T>());
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<PrefixOverride>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationMetadata) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn relation_id(mut self, relation_id: RelationIdMetadata) -> Self {
        self.relation_ids.push(relation_id);
        self
    }

    pub fn relation_count(mut self, relation_count: RelationCountMetadata) -> Self {
        self.relation_counts.push(relation_count);
        self
    }

    pub fn embed(mut self, embedded: EmbeddedArgs) -> Self {
        self.embeddeds.push(embedded);
        self
    }
}

/// Declaration of an entity: its own columns plus its top-level embeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityArgs {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub embeddeds: Vec<EmbeddedArgs>,
}

impl EntityArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn embed(mut self, embedded: EmbeddedArgs) -> Self {
        self.embeddeds.push(embedded);
        self
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
