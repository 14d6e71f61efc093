//! Loading, validation and placeholder expansion of CI build descriptors
//!
//! A build descriptor is a declarative YAML document describing one CI job:
//! the base template it extends, the artifact routes to publish under, the
//! build and package scripts, and some metadata. Strings may contain
//! `${dotted.path}` placeholders which are resolved against a [`Context`]
//! supplied by the orchestrator.
//!
//! ```no_run
//! use jobdesc_core::{Context, expand, load};
//!
//! # fn main() -> jobdesc_core::Result<()> {
//! let descriptor = load(std::path::Path::new("android-arm64.yml"))?;
//! let mut context = Context::new();
//! context.apply_override("event.head.sha=abc123")?;
//! let resolved = expand(&descriptor, &context)?;
//! println!("{}", resolved.routes[0]);
//! # Ok(())
//! # }
//! ```

pub mod base;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod expand;
pub mod placeholder;

pub use base::{DirectorySource, TemplateSource, render_base};
pub use context::Context;
pub use descriptor::{BuildDescriptor, Metadata, Scripts, Stage, load, parse, parse_named};
pub use error::{Error, Result};
pub use expand::{ExpansionMode, ResolvedDescriptor, expand, expand_with};
pub use placeholder::PlaceholderPath;
