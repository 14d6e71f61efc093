//! Build descriptor types and parsing
//!
//! A descriptor is a YAML mapping describing one CI build job. It can be
//! written either bare or wrapped in a single top-level `build:` key:
//!
//! ```yaml
//! build:
//!   template_file: linux-opt-base.tyml
//!   routes:
//!     - "index.project.native_client.${event.head.branchortag}.android-arm64"
//!   ...
//! ```

use crate::error::{Error, Result};
use crate::placeholder::{self, PlaceholderPath};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, instrument};

/// Key a descriptor may be wrapped in
pub const WRAPPER_KEY: &str = "build";

/// Top-level keys every descriptor must carry, in declaration order
pub const REQUIRED_FIELDS: [&str; 8] = [
    "template_file",
    "routes",
    "system_setup",
    "system_config",
    "tensorflow",
    "scripts",
    "nc_asset_name",
    "metadata",
];

const DOCUMENT_FIELD: &str = "<document>";

/// One build job, as read from disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BuildDescriptor {
    /// Base template this descriptor extends
    pub template_file: String,
    /// Artifact index routes, in publication order
    pub routes: Vec<String>,
    /// Shell run to prepare the worker
    pub system_setup: String,
    /// Shell run to configure the worker
    pub system_config: String,
    /// URL of the prebuilt TensorFlow artifact
    pub tensorflow: String,
    /// Commands per build stage
    pub scripts: Scripts,
    /// File name of the packaged artifact
    pub nc_asset_name: String,
    /// Human-readable job information
    pub metadata: Metadata,
    /// Any other keys, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Build stages a descriptor provides commands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Compile
    Build,
    /// Produce the artifact
    Package,
}

impl Stage {
    /// All stages, in execution order
    pub const ALL: [Self; 2] = [Self::Build, Self::Package];

    /// Name used as the `scripts` key
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Package => "package",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shell command per stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Scripts {
    /// Command for the build stage
    pub build: String,
    /// Command for the package stage
    pub package: String,
}

impl Scripts {
    /// Command for a stage
    pub fn get(&self, stage: Stage) -> &str {
        match stage {
            Stage::Build => &self.build,
            Stage::Package => &self.package,
        }
    }

    /// Stages with their commands, in execution order
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &str)> {
        Stage::ALL.into_iter().map(|stage| (stage, self.get(stage)))
    }
}

/// Job metadata shown by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    /// Job name
    pub name: String,
    /// Job description
    pub description: String,
    /// Other metadata keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Parse a descriptor document
pub fn parse(document: &str) -> Result<BuildDescriptor> {
    parse_named("<input>", document)
}

/// Parse a descriptor document, naming it in diagnostics
#[instrument(skip(document))]
pub fn parse_named(name: &str, document: &str) -> Result<BuildDescriptor> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(document).map_err(|e| Error::malformed(name, document, &e))?;
    let value = unwrap_build(value);

    let serde_yaml::Value::Mapping(mapping) = &value else {
        return Err(Error::schema(
            DOCUMENT_FIELD,
            format!("expected a mapping, found {}", yaml_kind(&value)),
        ));
    };
    check_required(mapping, "", &REQUIRED_FIELDS)?;
    for (key, nested) in [("scripts", &["build", "package"]), ("metadata", &["name", "description"])] {
        if let Some(serde_yaml::Value::Mapping(inner)) = mapping.get(key) {
            check_required(inner, key, nested)?;
        }
    }

    let descriptor: BuildDescriptor = serde_path_to_error::deserialize(value).map_err(|e| {
        let path = e.path().to_string();
        let field = if path == "." { DOCUMENT_FIELD.to_string() } else { path };
        Error::schema(field, e.inner().to_string())
    })?;

    descriptor.validate()?;
    debug!(
        routes = descriptor.routes.len(),
        extra = descriptor.extra.len(),
        "Parsed build descriptor"
    );
    Ok(descriptor)
}

/// Read and parse a descriptor file
pub fn load(path: &Path) -> Result<BuildDescriptor> {
    let text =
        std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read descriptor"))?;
    parse_named(&path.display().to_string(), &text)
}

fn unwrap_build(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Mapping(mut mapping)
            if mapping.len() == 1 && mapping.get(WRAPPER_KEY).is_some_and(|v| v.is_mapping()) =>
        {
            mapping
                .remove(WRAPPER_KEY)
                .unwrap_or(serde_yaml::Value::Mapping(mapping))
        }
        other => other,
    }
}

fn check_required(mapping: &serde_yaml::Mapping, prefix: &str, keys: &[&str]) -> Result<()> {
    for key in keys {
        if mapping.get(*key).is_none_or(serde_yaml::Value::is_null) {
            return Err(Error::schema(join(prefix, key), "missing required field"));
        }
    }
    Ok(())
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "an empty document",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

impl BuildDescriptor {
    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.template_file.trim().is_empty() {
            return Err(Error::schema("template_file", "must not be empty"));
        }
        if self.routes.is_empty() {
            return Err(Error::schema("routes", "must contain at least one route"));
        }
        for (stage, command) in self.scripts.iter() {
            if command.trim().is_empty() {
                return Err(Error::schema(
                    format!("scripts.{stage}"),
                    "command must not be empty",
                ));
            }
        }
        for (field, text) in self.fields() {
            placeholder::scan(text).map_err(|e| Error::schema(field, e.to_string()))?;
        }
        Ok(())
    }

    /// Every string in the descriptor with its field path, in field order
    pub fn fields(&self) -> Vec<(String, &str)> {
        let mut out = vec![("template_file".to_string(), self.template_file.as_str())];
        out.extend(
            self.routes
                .iter()
                .enumerate()
                .map(|(i, route)| (format!("routes[{i}]"), route.as_str())),
        );
        out.push(("system_setup".to_string(), self.system_setup.as_str()));
        out.push(("system_config".to_string(), self.system_config.as_str()));
        out.push(("tensorflow".to_string(), self.tensorflow.as_str()));
        out.extend(
            self.scripts
                .iter()
                .map(|(stage, command)| (format!("scripts.{stage}"), command)),
        );
        out.push(("nc_asset_name".to_string(), self.nc_asset_name.as_str()));
        out.push(("metadata.name".to_string(), self.metadata.name.as_str()));
        out.push((
            "metadata.description".to_string(),
            self.metadata.description.as_str(),
        ));
        for (key, value) in &self.metadata.extra {
            collect_strings(join("metadata", key), value, &mut out);
        }
        for (key, value) in &self.extra {
            collect_strings(key.clone(), value, &mut out);
        }
        out
    }

    /// Distinct placeholder paths referenced anywhere, in field order
    pub fn placeholders(&self) -> Result<Vec<PlaceholderPath>> {
        let mut seen = Vec::new();
        for (field, text) in self.fields() {
            let refs = placeholder::references(text).map_err(|e| Error::schema(field, e.to_string()))?;
            for path in refs {
                if !seen.contains(&path) {
                    seen.push(path);
                }
            }
        }
        Ok(seen)
    }

    /// Rebuild the descriptor with every string passed through `f`.
    ///
    /// `f` receives the field path and the current text; strings are visited
    /// in the same order as [`BuildDescriptor::fields`].
    pub fn try_map_strings<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&str, &str) -> Result<String>,
    {
        let template_file = f("template_file", &self.template_file)?;
        let routes = self
            .routes
            .iter()
            .enumerate()
            .map(|(i, route)| f(&format!("routes[{i}]"), route))
            .collect::<Result<Vec<_>>>()?;
        let system_setup = f("system_setup", &self.system_setup)?;
        let system_config = f("system_config", &self.system_config)?;
        let tensorflow = f("tensorflow", &self.tensorflow)?;
        let scripts = Scripts {
            build: f("scripts.build", &self.scripts.build)?,
            package: f("scripts.package", &self.scripts.package)?,
        };
        let nc_asset_name = f("nc_asset_name", &self.nc_asset_name)?;
        let metadata = Metadata {
            name: f("metadata.name", &self.metadata.name)?,
            description: f("metadata.description", &self.metadata.description)?,
            extra: map_entries("metadata", &self.metadata.extra, &mut f)?,
        };
        let extra = map_entries("", &self.extra, &mut f)?;

        Ok(Self {
            template_file,
            routes,
            system_setup,
            system_config,
            tensorflow,
            scripts,
            nc_asset_name,
            metadata,
            extra,
        })
    }
}

fn collect_strings<'a>(field: String, value: &'a Value, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(s) => out.push((field, s.as_str())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_strings(format!("{field}[{i}]"), item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_strings(join(&field, key), item, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn map_entries<F>(prefix: &str, entries: &BTreeMap<String, Value>, f: &mut F) -> Result<BTreeMap<String, Value>>
where
    F: FnMut(&str, &str) -> Result<String>,
{
    entries
        .iter()
        .map(|(key, value)| -> Result<(String, Value)> {
            Ok((key.clone(), map_value(join(prefix, key), value, f)?))
        })
        .collect()
}

fn map_value<F>(field: String, value: &Value, f: &mut F) -> Result<Value>
where
    F: FnMut(&str, &str) -> Result<String>,
{
    match value {
        Value::String(s) => Ok(Value::String(f(&field, s)?)),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| map_value(format!("{field}[{i}]"), item, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| -> Result<(String, Value)> {
                Ok((key.clone(), map_value(join(&field, key), item, f)?))
            })
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
    }
}
