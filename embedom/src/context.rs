use serde::{Deserialize, Serialize};

/// Default separator placed between flattened name segments.
pub const DEFAULT_SEPARATOR: &str = "_";

/// How the active storage backend represents embedded objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedStyle {
    /// Nested embeds become prefixed columns on the owning table.
    #[default]
    Flattened,
    /// Embeds are stored as native nested documents.
    Nested,
}

/// What `EntityMetadata::build` does when the validation pass finds naming collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Reject,
    /// Log the collisions and keep the built metadata.
    Ignore,
}

/// Backend capabilities consulted while building embedded metadata.
///
/// Deserializable so a surrounding configuration file can carry it:
///
/// ```
/// use embedom::context::{BackendContext, EmbedStyle};
///
/// let ctx: BackendContext = serde_json::from_str(r#"{ "embed_style": "nested" }"#).unwrap();
/// assert_eq!(ctx.embed_style, EmbedStyle::Nested);
/// assert_eq!(ctx.separator, "_");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendContext {
    pub embed_style: EmbedStyle,
    pub separator: String,
    pub collision_policy: CollisionPolicy,
}

impl Default for BackendContext {
    fn default() -> Self {
        Self {
            embed_style: EmbedStyle::default(),
            separator: DEFAULT_SEPARATOR.to_string(),
            collision_policy: CollisionPolicy::default(),
        }
    }
}

impl BackendContext {
    pub fn flattened() -> Self {
        Self::default()
    }

    pub fn nested() -> Self {
        Self {
            embed_style: EmbedStyle::Nested,
            ..Self::default()
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn flattens_embeds(&self) -> bool {
        self.embed_style == EmbedStyle::Flattened
    }

    /// Joins the non-empty segments with the configured separator.
    pub fn join_segments<'a, I>(&self, segments: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
    {
        segments
            .into_iter()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    /// Storage name of a column declared inside an embed with the given resolved prefix.
    pub fn column_name(&self, prefix: &str, column: &str) -> String {
        if !self.flattens_embeds() {
            return column.to_string();
        }
        self.join_segments([prefix, column])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_skips_empty_segments() {
        let ctx = BackendContext::flattened();
        assert_eq!(ctx.join_segments(["data", "", "cnt"]), "data_cnt");
        assert_eq!(ctx.join_segments(["", ""]), "");
    }

    #[test]
    fn column_name_respects_embed_style() {
        assert_eq!(BackendContext::flattened().column_name("data_cnt", "likes"), "data_cnt_likes");
        assert_eq!(BackendContext::flattened().column_name("", "likes"), "likes");
        assert_eq!(BackendContext::nested().column_name("data", "likes"), "likes");
    }

    #[test]
    fn custom_separator_is_used() {
        let ctx = BackendContext::flattened().with_separator("__");
        assert_eq!(ctx.column_name("data", "likes"), "data__likes");
    }

    #[test]
    fn context_deserializes_with_defaults() {
        let ctx: BackendContext = toml::from_str("collision_policy = \"ignore\"").expect("context parses");
        assert_eq!(ctx.embed_style, EmbedStyle::Flattened);
        assert_eq!(ctx.separator, DEFAULT_SEPARATOR);
        assert_eq!(ctx.collision_policy, CollisionPolicy::Ignore);
    }
}
