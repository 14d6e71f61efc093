//! Command implementations

use crate::cli::{Commands, ContextArgs, OutputFormat};
use jobdesc_core::{
    BuildDescriptor, Context, DirectorySource, ExpansionMode, ResolvedDescriptor, expand_with,
    load, render_base,
};
use miette::{IntoDiagnostic, Result};
use std::io::Write;
use std::path::Path;
use tracing::{info, instrument};

/// Run one command, writing its output to `out`
pub fn execute(command: Commands, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Validate { file } => validate(&file, out),
        Commands::Expand {
            file,
            context,
            lenient,
            output,
        } => {
            let mode = if lenient {
                ExpansionMode::Lenient
            } else {
                ExpansionMode::Strict
            };
            let resolved = resolve(&file, &context, mode)?;
            write_resolved(&resolved, output, out)
        }
        Commands::Refs { file } => refs(&file, out),
        Commands::Render {
            file,
            templates,
            context,
        } => render(&file, &templates, &context, out),
        Commands::Schema => schema(out),
    }
}

impl ContextArgs {
    /// Layer the context files in order, then apply overrides
    pub fn build(&self) -> jobdesc_core::Result<Context> {
        let mut context = Context::new();
        for file in self.context_files() {
            context.merge(Context::from_file(file)?);
        }
        for argument in &self.overrides {
            context.apply_override(argument)?;
        }
        Ok(context)
    }
}

#[instrument(skip(out))]
fn validate(file: &Path, out: &mut impl Write) -> Result<()> {
    let descriptor = load(file)?;
    let placeholders = descriptor.placeholders()?;
    info!(routes = descriptor.routes.len(), "Descriptor is valid");
    writeln!(
        out,
        "{}: ok ({} routes, {} placeholders, template {})",
        file.display(),
        descriptor.routes.len(),
        placeholders.len(),
        descriptor.template_file
    )
    .into_diagnostic()
}

#[instrument(skip(context))]
fn resolve(file: &Path, context: &ContextArgs, mode: ExpansionMode) -> Result<ResolvedDescriptor> {
    let descriptor = load(file)?;
    let context = context.build()?;
    Ok(expand_with(&descriptor, &context, mode)?)
}

fn write_resolved(
    resolved: &ResolvedDescriptor,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    let text = match format {
        OutputFormat::Yaml => serde_yaml::to_string(resolved).into_diagnostic()?,
        OutputFormat::Json => {
            let mut text = serde_json::to_string_pretty(resolved).into_diagnostic()?;
            text.push('\n');
            text
        }
    };
    out.write_all(text.as_bytes()).into_diagnostic()
}

#[instrument(skip(out))]
fn refs(file: &Path, out: &mut impl Write) -> Result<()> {
    let descriptor: BuildDescriptor = load(file)?;
    for path in descriptor.placeholders()? {
        writeln!(out, "{path}").into_diagnostic()?;
    }
    Ok(())
}

#[instrument(skip(context, out))]
fn render(file: &Path, templates: &Path, context: &ContextArgs, out: &mut impl Write) -> Result<()> {
    let descriptor = load(file)?;
    let context = context.build()?;
    let resolved = expand_with(&descriptor, &context, ExpansionMode::Strict)?;
    let rendered = render_base(&resolved, &context, &DirectorySource::new(templates))?;
    out.write_all(rendered.as_bytes()).into_diagnostic()
}

fn schema(out: &mut impl Write) -> Result<()> {
    let schema = schemars::schema_for!(BuildDescriptor);
    let text = serde_json::to_string_pretty(&schema).into_diagnostic()?;
    writeln!(out, "{text}").into_diagnostic()
}
