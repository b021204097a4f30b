use thiserror::Error;

/// Top-level error type returned while assembling and building embedded metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A derived value was read before `build` ran for the node.
    #[error("embedded metadata at '{path}' has not been built")]
    NotBuilt { path: String },

    /// The embedded type's factory is missing or refused to produce an instance.
    #[error("cannot construct embedded type '{type_name}': {message}")]
    Construction { type_name: String, message: String },

    /// A raw declaration is malformed (for example an empty property name).
    #[error("invalid declaration: {message}")]
    InvalidDeclaration { message: String },

    /// Two embeds declared on the same container share a property name.
    #[error("duplicate embedded property '{property}' on '{container}'")]
    DuplicateProperty { container: String, property: String },

    /// An embedded id does not belong to the tree it was used with.
    #[error("unknown embedded id {id}")]
    UnknownEmbedded { id: usize },

    /// `require_entity` was asked for a name nothing registered.
    #[error("no entity named '{name}' is registered")]
    UnknownEntity { name: String },

    /// The built tree violates a naming invariant.
    #[error("validation failed")]
    Validation(#[from] ValidationError),
}

/// Naming collisions found in a built entity, in the order the checks found them.
#[derive(Debug, Error)]
#[error("{}", describe_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new<I>(issues: I) -> Self
    where
        I: IntoIterator<Item = ValidationIssue>,
    {
        Self {
            issues: issues.into_iter().collect(),
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }

    /// Embed or column paths reported under `code`.
    pub fn paths_with<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.issues
            .iter()
            .filter(move |issue| issue.code == code)
            .map(|issue| issue.path.as_str())
    }
}

/// One collision, located by dotted embed path or `path.column`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} at '{path}': {message}")]
pub struct ValidationIssue {
    pub path: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

fn describe_issues(issues: &[ValidationIssue]) -> String {
    match issues.first() {
        None => "no naming issues".to_string(),
        Some(first) => format!("{} naming issue(s), first: {first}", issues.len()),
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;
