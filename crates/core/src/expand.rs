//! Placeholder expansion of build descriptors

use crate::context::Context;
use crate::descriptor::BuildDescriptor;
use crate::error::{Error, Result};
use crate::placeholder;
use serde::Serialize;
use std::ops::Deref;
use tracing::{debug, instrument, warn};

/// What to do with a token the context cannot resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionMode {
    /// Fail with [`Error::UnresolvedReference`] on the first unresolved token
    #[default]
    Strict,
    /// Keep unresolved tokens verbatim and log a warning for each
    Lenient,
}

/// A descriptor whose placeholders have been expanded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedDescriptor(BuildDescriptor);

impl ResolvedDescriptor {
    /// The expanded descriptor
    pub fn descriptor(&self) -> &BuildDescriptor {
        &self.0
    }

    /// Give up the resolved marker
    pub fn into_inner(self) -> BuildDescriptor {
        self.0
    }
}

impl Deref for ResolvedDescriptor {
    type Target = BuildDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Expand every placeholder in `descriptor`, failing on the first unresolved one
pub fn expand(descriptor: &BuildDescriptor, context: &Context) -> Result<ResolvedDescriptor> {
    expand_with(descriptor, context, ExpansionMode::Strict)
}

/// Expand every placeholder in `descriptor` using the given mode
#[instrument(skip(descriptor, context), fields(template = %descriptor.template_file))]
pub fn expand_with(
    descriptor: &BuildDescriptor,
    context: &Context,
    mode: ExpansionMode,
) -> Result<ResolvedDescriptor> {
    let mut substitutions = 0usize;
    let resolved = descriptor.try_map_strings(|field, text| {
        expand_str(field, text, context, mode, &mut substitutions)
    })?;
    debug!(substitutions, "Expanded build descriptor");
    Ok(ResolvedDescriptor(resolved))
}

/// Expand the placeholders of a single string.
///
/// `field` names the string in errors and logs.
pub fn expand_text(field: &str, text: &str, context: &Context, mode: ExpansionMode) -> Result<String> {
    let mut substitutions = 0usize;
    expand_str(field, text, context, mode, &mut substitutions)
}

fn expand_str(
    field: &str,
    text: &str,
    context: &Context,
    mode: ExpansionMode,
    substitutions: &mut usize,
) -> Result<String> {
    let rendered = placeholder::render::<ExpandFailure, _>(text, |path, raw| match context.resolve(path) {
        Some(value) => {
            *substitutions += 1;
            Ok(Some(value))
        }
        None => match mode {
            ExpansionMode::Strict => Err(ExpandFailure::Failed(Error::unresolved(raw, field))),
            ExpansionMode::Lenient => {
                warn!(token = raw, field, "Leaving unresolved placeholder in place");
                Ok(None)
            }
        },
    })
    .map_err(|e| match e {
        ExpandFailure::Malformed(err) => Error::schema(field, err.to_string()),
        ExpandFailure::Failed(err) => err,
    })?;

    // Substituted text must not leave a broken `${` behind.
    placeholder::scan(&rendered).map_err(|err| {
        Error::schema(field, format!("substituted values form a malformed placeholder: {err}"))
    })?;
    Ok(rendered)
}

enum ExpandFailure {
    Malformed(placeholder::PlaceholderError),
    Failed(Error),
}

impl From<placeholder::PlaceholderError> for ExpandFailure {
    fn from(err: placeholder::PlaceholderError) -> Self {
        Self::Malformed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse;
    use serde_json::json;

    const DOC: &str = r#"
template_file: linux-opt-base.tyml
routes:
  - "index.native_client.${event.head.branchortag}.android-arm64"
  - "index.native_client.${event.head.branchortag}.${event.head.sha}.android-arm64"
  - "notify.irc-channel.${notifications.irc}.on-failed"
system_setup: "${swig.packages.install_script}"
system_config: "${swig.patch_nodejs.linux}"
tensorflow: "https://example.com/home.tar.xz"
scripts:
  build: "taskcluster/android-build.sh arm64-v8a"
  package: "taskcluster/android-package.sh arm64-v8a"
nc_asset_name: "native_client.arm64.cpu.android.tar.xz"
metadata:
  name: "Android ARM64 ${event.head.sha}"
  description: "Building for Android ARM64"
"#;

    fn context() -> Context {
        Context::from_value(
            "test",
            json!({
                "event": {"head": {"branchortag": "master", "sha": "abc123"}},
                "notifications": {"irc": "#machinelearning"},
                "swig": {
                    "packages": {"install_script": "apt-get install -y swig"},
                    "patch_nodejs": {"linux": "patch -p1 < node.patch"}
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_expand_single_token() {
        let ctx = Context::from_value("t", json!({"event": {"head": {"sha": "abc123"}}})).unwrap();
        let out = expand_text("f", "${event.head.sha}", &ctx, ExpansionMode::Strict).unwrap();
        assert_eq!(out, "abc123");
    }

    #[test]
    fn test_expand_descriptor() {
        let d = parse(DOC).unwrap();
        let r = expand(&d, &context()).unwrap();
        assert_eq!(
            r.routes,
            vec![
                "index.native_client.master.android-arm64",
                "index.native_client.master.abc123.android-arm64",
                "notify.irc-channel.#machinelearning.on-failed",
            ]
        );
        assert_eq!(r.system_config, "patch -p1 < node.patch");
        assert_eq!(r.metadata.name, "Android ARM64 abc123");
        assert_eq!(r.scripts, d.scripts);
    }

    #[test]
    fn test_unresolved_names_first_token_and_field() {
        let d = parse(DOC).unwrap();
        let ctx = Context::from_value("t", json!({"event": {"head": {"branchortag": "master"}}})).unwrap();
        let err = expand(&d, &ctx).unwrap_err();
        match err {
            Error::UnresolvedReference { token, field } => {
                assert_eq!(token, "${event.head.sha}");
                assert_eq!(field, "routes[1]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lenient_keeps_unresolved_tokens() {
        let d = parse(DOC).unwrap();
        let ctx = Context::from_value("t", json!({"event": {"head": {"branchortag": "master"}}})).unwrap();
        let r = expand_with(&d, &ctx, ExpansionMode::Lenient).unwrap();
        assert_eq!(r.routes[0], "index.native_client.master.android-arm64");
        assert_eq!(
            r.routes[1],
            "index.native_client.master.${event.head.sha}.android-arm64"
        );
    }

    #[test]
    fn test_expand_is_idempotent() {
        let d = parse(DOC).unwrap();
        let ctx = context();
        let once = expand(&d, &ctx).unwrap();
        let twice = expand(&once, &ctx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let d = parse(DOC).unwrap();
        let mut ctx = context();
        ctx.merge(
            Context::from_value("t", json!({"notifications": {"irc": "${not.a.key}"}})).unwrap(),
        );
        let r = expand(&d, &ctx).unwrap();
        assert_eq!(r.routes[2], "notify.irc-channel.${not.a.key}.on-failed");
    }

    #[test]
    fn test_value_with_broken_token_is_rejected() {
        let d = parse(DOC).unwrap();
        let mut ctx = context();
        ctx.merge(
            Context::from_value("t", json!({"swig": {"packages": {"install_script": "echo ${"}}}))
                .unwrap(),
        );
        let err = expand(&d, &ctx).unwrap_err();
        match err {
            Error::SchemaViolation { field, reason } => {
                assert_eq!(field, "system_setup");
                assert!(reason.contains("`${`"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_value_joining_literal_into_broken_token_is_rejected() {
        let ctx = Context::from_value("t", json!({"cost": "5$"})).unwrap();
        let err = expand_text("system_setup", "${cost}{unclosed", &ctx, ExpansionMode::Strict)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { field, .. } if field == "system_setup"));
    }

    #[test]
    fn test_plain_dollar_values_expand_again() {
        let d = parse(DOC).unwrap();
        let mut ctx = context();
        ctx.merge(
            Context::from_value(
                "t",
                json!({"swig": {"packages": {"install_script": "echo $HOME {}"}}}),
            )
            .unwrap(),
        );
        let once = expand(&d, &ctx).unwrap();
        assert_eq!(once.system_setup, "echo $HOME {}");
        let twice = expand(&once, &ctx).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_text_is_schema_violation() {
        let err = expand_text("system_setup", "${broken", &Context::new(), ExpansionMode::Strict)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { field, .. } if field == "system_setup"));
    }

    #[test]
    fn test_extras_are_expanded() {
        let doc = format!("{DOC}workerType: \"${{event.head.branchortag}}-worker\"\n");
        let d = parse(&doc).unwrap();
        let r = expand(&d, &context()).unwrap();
        assert_eq!(r.extra["workerType"], json!("master-worker"));
    }

    #[test]
    fn test_resolved_serializes_like_descriptor() {
        let d = parse(DOC).unwrap();
        let r = expand(&d, &context()).unwrap();
        let via_resolved = serde_json::to_value(&r).unwrap();
        let via_inner = serde_json::to_value(r.descriptor()).unwrap();
        assert_eq!(via_resolved, via_inner);
        assert_eq!(r.into_inner().nc_asset_name, "native_client.arm64.cpu.android.tar.xz");
    }
}
