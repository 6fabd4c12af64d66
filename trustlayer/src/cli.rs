// trustlayer/src/cli.rs
//! Command-line interface definition for the `trustlayer` binary.
//! License: MIT OR Apache-2.0

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "trustlayer",
    author = "Obscura Tech",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep PII out of AI prompts",
    long_about = "TrustLayer replaces personal data in text with reversible tokens such as [PERSON_1] before the text reaches an AI service, and puts the original values back into the reply. Tokens, counts and mappings never leave your machine unless you write them out.",
    arg_required_else_help = true
)]
pub struct Cli {
    #[arg(long, short = 'q', global = true, help = "Suppress all informational and debug messages.")]
    pub quiet: bool,

    #[arg(long, short = 'd', global = true, conflicts_with = "quiet", help = "Enable debug logging.")]
    pub debug: bool,

    /// Pipeline settings file (YAML).
    #[arg(long, value_name = "FILE", global = true, env = "TRUSTLAYER_CONFIG", help = "Path to a pipeline settings file (YAML).")]
    pub config: Option<PathBuf>,

    /// Extra detector rules merged over the built-in ones.
    #[arg(long, value_name = "FILE", global = true, help = "Path to a custom detector rules file (YAML).")]
    pub rules: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Replaces PII in a file or stdin with reversible tokens.")]
    Redact(RedactCommand),

    #[command(about = "Puts original values back in place of tokens.")]
    Restore(RestoreCommand),

    #[command(about = "Sends a redacted prompt to the AI provider and restores its reply.")]
    Prompt(PromptCommand),

    #[command(about = "Summarises an audit file by entity type.")]
    Stats(StatsCommand),

    #[command(about = "Liveness probe; prints {\"status\":\"ok\"}.")]
    Health,
}

#[derive(Args, Debug)]
pub struct RedactCommand {
    #[arg(long, short = 'i', value_name = "FILE", help = "Read input from a specified file instead of stdin.")]
    pub input_file: Option<PathBuf>,

    #[arg(long = "mapping-out", value_name = "FILE", help = "Write the token mapping (JSON) to this file.")]
    pub mapping_out: Option<PathBuf>,

    #[arg(long, help = "Print a JSON document with redacted text, counts and mapping.")]
    pub json: bool,

    #[arg(long, value_name = "CODE", help = "Language passed to the detector (overrides the settings file).")]
    pub language: Option<String>,

    #[arg(long, short = 'e', value_delimiter = ',', help = "Enable these opt-in rule names (comma-separated).")]
    pub enable: Vec<String>,

    #[arg(long, short = 'x', value_delimiter = ',', help = "Disable these rule names (comma-separated).")]
    pub disable: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RestoreCommand {
    #[arg(long, short = 'm', value_name = "FILE", help = "Token mapping written by `redact --mapping-out`.")]
    pub mapping: PathBuf,

    #[arg(long, short = 'i', value_name = "FILE", help = "Read input from a specified file instead of stdin.")]
    pub input_file: Option<PathBuf>,

    #[arg(
        long = "chunk-size",
        value_name = "BYTES",
        value_parser = clap::value_parser!(usize),
        help = "Stream the input through the chunked restorer in blocks of this size."
    )]
    pub chunk_size: Option<usize>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PromptSource {
    #[arg(long, short = 'p', value_name = "TEXT", help = "Prompt text.")]
    pub prompt: Option<String>,

    #[arg(long, short = 'f', value_name = "FILE", help = "Read the prompt from a text file.")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PromptCommand {
    #[command(flatten)]
    pub source: PromptSource,

    #[arg(long, value_name = "FILE", help = "Append audit records to this JSONL file.")]
    pub audit: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct StatsCommand {
    #[arg(long, value_name = "FILE", help = "Audit file to read (defaults to the configured audit path).")]
    pub audit: Option<PathBuf>,

    #[arg(long, help = "Print the summary as JSON.")]
    pub json: bool,
}
