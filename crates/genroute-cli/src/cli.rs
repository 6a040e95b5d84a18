//! CLI argument definitions for genroute.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `generate` | Dispatch one generation request through the fallback chain |
//! | `providers` | Show registered providers with health and quota state |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | TOML config file; built-in defaults otherwise |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! genroute generate --task text --prompt "Write a haiku about rust"
//! genroute generate --task speech --prompt "Hello" --param voice=alloy --out hello.mp3
//! genroute --config genroute.toml providers --task image --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use genroute_core::TaskType;

/// genroute - generative AI provider orchestrator
///
/// Routes text, image, speech and music requests across OpenAI, Gemini,
/// ElevenLabs and Suno with priority fallback, health tracking and quotas.
#[derive(Debug, Parser)]
#[command(
    name = "genroute",
    author,
    version,
    about = "Generative AI provider orchestrator",
    long_about = "genroute dispatches generation requests to the highest-priority healthy \
provider with quota left, falling back to the next one on failure.\n\
\n\
API keys are read from the environment (GENROUTE_<KIND>_API_KEY or the vendor's own \
variable). Logs go to stderr and honor RUST_LOG."
)]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Task selector accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskArg {
    Text,
    Image,
    Speech,
    Music,
}

impl From<TaskArg> for TaskType {
    fn from(value: TaskArg) -> Self {
        match value {
            TaskArg::Text => TaskType::Text,
            TaskArg::Image => TaskType::Image,
            TaskArg::Speech => TaskType::Speech,
            TaskArg::Music => TaskType::Music,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate content through the provider fallback chain.
    ///
    /// # Examples
    ///
    ///   genroute generate --task image --prompt "a red fox" --param size=1024x1024
    ///   genroute generate --task text --prompt "hi" --no-fallback
    Generate(GenerateArgs),

    /// List providers with their health and quota state.
    Providers(ProvidersArgs),
}

/// Arguments for the `generate` command.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Task to perform.
    #[arg(long, value_enum)]
    pub task: TaskArg,

    /// Prompt text sent to the provider.
    #[arg(long)]
    pub prompt: String,

    /// Extra payload parameter as key=value. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Stop after this many failed provider attempts.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Only try the first eligible provider.
    #[arg(long, default_value_t = false)]
    pub no_fallback: bool,

    /// Cost units used for quota checks instead of the adapter's estimate.
    #[arg(long)]
    pub estimated_cost: Option<u64>,

    /// Write generated audio bytes to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Arguments for the `providers` command.
#[derive(Debug, Args)]
pub struct ProvidersArgs {
    /// Only show providers supporting this task.
    #[arg(long, value_enum)]
    pub task: Option<TaskArg>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generate_with_repeated_params() {
        let cli = Cli::try_parse_from([
            "genroute",
            "--pretty",
            "generate",
            "--task",
            "speech",
            "--prompt",
            "hello",
            "--param",
            "voice=alloy",
            "--param",
            "speed=1.2",
            "--max-attempts",
            "2",
            "--no-fallback",
        ])
        .expect("valid arguments");

        assert!(cli.pretty);
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(TaskType::from(args.task), TaskType::Speech);
                assert_eq!(args.params, vec!["voice=alloy", "speed=1.2"]);
                assert_eq!(args.max_attempts, Some(2));
                assert!(args.no_fallback);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["genroute", "providers", "--config", "genroute.toml"])
            .expect("valid arguments");

        assert_eq!(cli.config, Some(PathBuf::from("genroute.toml")));
        assert!(matches!(cli.command, Command::Providers(ProvidersArgs { task: None })));
    }

    #[test]
    fn rejects_unknown_task() {
        assert!(Cli::try_parse_from(["genroute", "generate", "--task", "video", "--prompt", "x"]).is_err());
    }
}
