//! Rendering of the base template a descriptor names in `template_file`
//!
//! The descriptor is never merged into its base template here. The base
//! template is a text document of its own which refers back to the build
//! through the `build` namespace, e.g. `${build.metadata.name}`.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::expand::{ExpansionMode, ResolvedDescriptor, expand_text};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};

/// Context key the resolved descriptor is exposed under
pub const BUILD_NAMESPACE: &str = "build";

/// Somewhere base templates can be fetched from
pub trait TemplateSource {
    /// Return the text of the named template
    fn fetch(&self, name: &str) -> Result<String>;
}

/// Reads templates from files in one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Create a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        plain.then(|| self.root.join(relative))
    }
}

impl TemplateSource for DirectorySource {
    fn fetch(&self, name: &str) -> Result<String> {
        let Some(path) = self.path_for(name) else {
            return Err(Error::template_not_found(name));
        };
        if !path.is_file() {
            return Err(Error::template_not_found(name));
        }
        std::fs::read_to_string(&path).map_err(|e| Error::io(e, path, "read base template"))
    }
}

/// Render the base template of a resolved descriptor.
///
/// The template is expanded against `context` extended with the descriptor
/// under [`BUILD_NAMESPACE`]; a `build` key already in the context is shadowed.
#[instrument(skip_all, fields(template = %resolved.template_file))]
pub fn render_base(
    resolved: &ResolvedDescriptor,
    context: &Context,
    source: &dyn TemplateSource,
) -> Result<String> {
    let text = source.fetch(&resolved.template_file)?;
    let build = serde_json::to_value(resolved).map_err(|e| {
        Error::invalid_context(BUILD_NAMESPACE, format!("cannot expose descriptor: {e}"))
    })?;

    let mut scope = context.clone();
    scope.insert(BUILD_NAMESPACE, build);

    let rendered = expand_text(&resolved.template_file, &text, &scope, ExpansionMode::Strict)?;
    debug!(bytes = rendered.len(), "Rendered base template");
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse;
    use crate::expand::expand;
    use serde_json::json;
    use std::collections::HashMap;

    struct MemorySource(HashMap<String, String>);

    impl TemplateSource for MemorySource {
        fn fetch(&self, name: &str) -> Result<String> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| Error::template_not_found(name))
        }
    }

    const DOC: &str = r#"
template_file: linux-opt-base.tyml
routes: ["index.${event.head.sha}.a", "index.${event.head.sha}.b"]
system_setup: ""
system_config: ""
tensorflow: "https://example.com/tf.tar.xz"
scripts: { build: "build.sh", package: "package.sh" }
nc_asset_name: "nc.tar.xz"
metadata: { name: "Job", description: "Job description" }
"#;

    fn resolved() -> (ResolvedDescriptor, Context) {
        let ctx = Context::from_value("t", json!({"event": {"head": {"sha": "abc123"}}})).unwrap();
        (expand(&parse(DOC).unwrap(), &ctx).unwrap(), ctx)
    }

    #[test]
    fn test_render_base_exposes_build_namespace() {
        let (r, ctx) = resolved();
        let source = MemorySource(HashMap::from([(
            "linux-opt-base.tyml".to_string(),
            "name: ${build.metadata.name}\nsha: ${event.head.sha}\nroutes: ${build.routes}\nfirst: ${build.routes.0}\n"
                .to_string(),
        )]));
        let out = render_base(&r, &ctx, &source).unwrap();
        assert_eq!(
            out,
            "name: Job\nsha: abc123\nroutes: [\"index.abc123.a\",\"index.abc123.b\"]\nfirst: index.abc123.a\n"
        );
    }

    #[test]
    fn test_render_base_unresolved_names_template() {
        let (r, ctx) = resolved();
        let source = MemorySource(HashMap::from([(
            "linux-opt-base.tyml".to_string(),
            "${build.missing}".to_string(),
        )]));
        let err = render_base(&r, &ctx, &source).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedReference { token, field }
                if token == "${build.missing}" && field == "linux-opt-base.tyml"
        ));
    }

    #[test]
    fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.tyml"), "hello ${build.nc_asset_name}").unwrap();
        let source = DirectorySource::new(dir.path());

        assert_eq!(source.fetch("base.tyml").unwrap(), "hello ${build.nc_asset_name}");
        assert!(matches!(
            source.fetch("other.tyml"),
            Err(Error::TemplateNotFound { .. })
        ));
        assert!(matches!(
            source.fetch("../base.tyml"),
            Err(Error::TemplateNotFound { .. })
        ));
        assert!(matches!(
            source.fetch("/etc/passwd"),
            Err(Error::TemplateNotFound { .. })
        ));
    }
}
