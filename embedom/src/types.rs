use serde::{Deserialize, Serialize};

/// Storage column declared on an entity or directly on an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub property_name: String,
    /// Explicit storage name. When absent the property name is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default)]
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary: bool,
}

impl ColumnMetadata {
    pub fn new(property_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            database_name: None,
            column_type: ColumnType::default(),
            nullable: false,
            primary: false,
        }
    }

    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    pub fn with_database_name(mut self, database_name: impl Into<String>) -> Self {
        self.database_name = Some(database_name.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Name of the column before any embed prefix is applied.
    pub fn given_name(&self) -> &str {
        self.database_name.as_deref().unwrap_or(&self.property_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Boolean,
    DateTime,
    Json,
    ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMetadata {
    pub property_name: String,
    pub target: String,
    #[serde(default)]
    pub kind: RelationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_column: Option<String>,
}

impl RelationMetadata {
    pub fn new(property_name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            property_name: property_name.into(),
            target: target.into(),
            kind,
            join_column: None,
        }
    }

    pub fn with_join_column(mut self, join_column: impl Into<String>) -> Self {
        self.join_column = Some(join_column.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    #[default]
    ManyToOne,
    OneToMany,
    ManyToMany,
}

/// Mirrors the id(s) of a relation into a plain property without a physical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationIdMetadata {
    pub property_name: String,
    pub relation_name: String,
}

impl RelationIdMetadata {
    pub fn new(property_name: impl Into<String>, relation_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            relation_name: relation_name.into(),
        }
    }
}

/// Loads the number of related records into a plain property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationCountMetadata {
    pub property_name: String,
    pub relation_name: String,
}

impl RelationCountMetadata {
    pub fn new(property_name: impl Into<String>, relation_name: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            relation_name: relation_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_name_prefers_explicit_database_name() {
        let plain = ColumnMetadata::new("likes");
        assert_eq!(plain.given_name(), "likes");

        let renamed = ColumnMetadata::new("likes").with_database_name("like_total");
        assert_eq!(renamed.given_name(), "like_total");
    }
}
