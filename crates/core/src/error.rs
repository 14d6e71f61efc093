//! Error types for descriptor loading and expansion

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for jobdesc operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The document is not well-formed YAML/JSON
    #[error("Malformed document {name}: {message}")]
    #[diagnostic(
        code(jobdesc::document::malformed),
        help("The descriptor must be a YAML (or JSON) mapping")
    )]
    MalformedDocument {
        /// Name of the document (usually its path)
        name: String,
        /// Parser message
        message: String,
        /// Document text, for the labelled report
        #[source_code]
        src: NamedSource<String>,
        /// Position of the syntax error, when the parser reports one
        #[label("here")]
        span: Option<SourceSpan>,
    },

    /// A required field is absent, has the wrong shape, or breaks an invariant
    #[error("Schema violation at `{field}`: {reason}")]
    #[diagnostic(code(jobdesc::schema::violation))]
    SchemaViolation {
        /// Field path, e.g. `routes[1]` or `scripts.build`
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// A placeholder token could not be resolved against the context
    #[error("Unresolved reference `{token}` in `{field}`")]
    #[diagnostic(
        code(jobdesc::expand::unresolved),
        help("Provide a value for this path with --context or --set")
    )]
    UnresolvedReference {
        /// The full token, e.g. `${event.head.sha}`
        token: String,
        /// Field the token appeared in
        field: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation} of {}: {source}", path.display())]
    #[diagnostic(code(jobdesc::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path being read
        path: PathBuf,
        /// Description of the operation that failed
        operation: String,
    },

    /// A context override is not of the form `path=value`
    #[error("Invalid context override `{argument}`: {reason}")]
    #[diagnostic(
        code(jobdesc::context::invalid_override),
        help("Overrides look like `event.head.sha=abc123`")
    )]
    InvalidOverride {
        /// The argument as given
        argument: String,
        /// What is wrong with it
        reason: String,
    },

    /// A context document is not a mapping
    #[error("Invalid context {name}: {reason}")]
    #[diagnostic(code(jobdesc::context::invalid))]
    InvalidContext {
        /// Name of the context source
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The base template named by `template_file` does not exist
    #[error("Base template `{name}` not found")]
    #[diagnostic(
        code(jobdesc::template::not_found),
        help("Check --templates points at the directory holding the base templates")
    )]
    TemplateNotFound {
        /// The `template_file` value
        name: String,
    },
}

impl Error {
    /// Create a malformed-document error from a YAML parser error
    pub fn malformed(name: impl Into<String>, source: &str, err: &serde_yaml::Error) -> Self {
        let name = name.into();
        let span = err
            .location()
            .map(|loc| SourceSpan::from((loc.index().min(source.len()), 0)));
        Self::MalformedDocument {
            src: NamedSource::new(name.clone(), source.to_string()),
            name,
            message: err.to_string(),
            span,
        }
    }

    /// Create a schema violation for a field
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an unresolved reference error
    pub fn unresolved(token: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            token: token.into(),
            field: field.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid override error
    pub fn invalid_override(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOverride {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid context error
    pub fn invalid_context(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidContext {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a template-not-found error
    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound { name: name.into() }
    }
}

/// Result type for jobdesc operations
pub type Result<T> = std::result::Result<T, Error>;
