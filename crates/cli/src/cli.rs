use crate::tracing::LogLevel;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobdesc")]
#[command(about = "Validate and expand CI build descriptors")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Check that a descriptor is well-formed")]
    Validate {
        #[arg(help = "Path to the descriptor")]
        file: PathBuf,
    },
    #[command(about = "Expand placeholders and print the resolved descriptor")]
    Expand {
        #[arg(help = "Path to the descriptor")]
        file: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
        #[arg(long, help = "Leave unresolved placeholders in place instead of failing")]
        lenient: bool,
        #[arg(long, short = 'o', help = "Output format", default_value = "yaml", value_enum)]
        output: OutputFormat,
    },
    #[command(about = "List the placeholder paths a descriptor references")]
    Refs {
        #[arg(help = "Path to the descriptor")]
        file: PathBuf,
    },
    #[command(about = "Render the base template named by template_file")]
    Render {
        #[arg(help = "Path to the descriptor")]
        file: PathBuf,
        #[arg(long, short = 't', help = "Directory holding base templates")]
        templates: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    #[command(about = "Print the JSON Schema of the descriptor format")]
    Schema,
}

/// Where expansion values come from
#[derive(Args, Debug, Default)]
pub struct ContextArgs {
    #[arg(
        long = "context",
        short = 'c',
        help = "YAML/JSON context file; repeat to layer, later files win"
    )]
    pub files: Vec<PathBuf>,

    /// Comma-separated context files, used when no `--context` is given
    #[arg(
        long = "context-list",
        env = "JOBDESC_CONTEXT",
        value_delimiter = ',',
        hide = true
    )]
    pub listed: Vec<PathBuf>,

    #[arg(
        long = "set",
        short = 's',
        value_name = "PATH=VALUE",
        help = "Override one context value, e.g. event.head.sha=abc123"
    )]
    pub overrides: Vec<String>,
}

impl ContextArgs {
    /// Context files in layering order
    pub fn context_files(&self) -> &[PathBuf] {
        if self.files.is_empty() {
            &self.listed
        } else {
            &self.files
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["jobdesc", "schema"]).unwrap();
        assert_eq!(cli.level, LogLevel::Warn);
        assert!(!cli.json);
        assert!(matches!(cli.command, Commands::Schema));
    }

    #[test]
    fn test_cli_log_level_parsing() {
        let cli = Cli::try_parse_from(["jobdesc", "--level", "debug", "schema"]).unwrap();
        assert_eq!(cli.level, LogLevel::Debug);

        let cli = Cli::try_parse_from(["jobdesc", "schema", "-l", "error"]).unwrap();
        assert_eq!(cli.level, LogLevel::Error);

        assert!(Cli::try_parse_from(["jobdesc", "--level", "loud", "schema"]).is_err());
    }

    #[test]
    fn test_expand_arguments() {
        let cli = Cli::try_parse_from([
            "jobdesc",
            "expand",
            "build.yml",
            "-c",
            "event.yml",
            "--context",
            "swig.yml",
            "--set",
            "event.head.sha=abc123",
            "--lenient",
            "-o",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Expand {
                file,
                context,
                lenient,
                output,
            } => {
                assert_eq!(file, PathBuf::from("build.yml"));
                assert_eq!(
                    context.files,
                    vec![PathBuf::from("event.yml"), PathBuf::from("swig.yml")]
                );
                assert_eq!(context.overrides, vec!["event.head.sha=abc123".to_string()]);
                assert!(lenient);
                assert_eq!(output, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn expand_context(args: &[&str]) -> ContextArgs {
        let mut argv = vec!["jobdesc", "expand", "build.yml"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Expand { context, .. } => context,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_context_flag_keeps_commas_in_paths() {
        let context = expand_context(&["-c", "a,b.yml"]);
        assert_eq!(context.context_files(), [PathBuf::from("a,b.yml")]);
    }

    #[test]
    fn test_context_list_is_split_on_commas() {
        let context = expand_context(&["--context-list", "event.yml,swig.yml"]);
        assert_eq!(
            context.context_files(),
            [PathBuf::from("event.yml"), PathBuf::from("swig.yml")]
        );

        let context = expand_context(&["--context-list", "event.yml,swig.yml", "-c", "own.yml"]);
        assert_eq!(context.context_files(), [PathBuf::from("own.yml")]);
    }

    #[test]
    fn test_render_requires_templates() {
        assert!(Cli::try_parse_from(["jobdesc", "render", "build.yml"]).is_err());
        let cli =
            Cli::try_parse_from(["jobdesc", "render", "build.yml", "-t", "taskcluster"]).unwrap();
        assert!(matches!(cli.command, Commands::Render { .. }));
    }

    #[test]
    fn test_cli_verify() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
