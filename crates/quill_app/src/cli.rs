use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "quill")]
#[command(about = "Generate a book chapter by chapter from a streaming backend")]
#[command(version)]
pub struct Cli {
    /// RON config file (default: ./quill.ron when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8000
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Directory for generated chapters
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Generate every chapter that is not archived yet, in order
    Run {
        /// Outline file (RON list of chapters)
        #[arg(long)]
        outline: PathBuf,
    },

    /// Regenerate one chapter
    Retry {
        /// Chapter number
        #[arg(index = 1)]
        unit: u32,

        #[arg(long)]
        outline: PathBuf,
    },

    /// Rewrite one chapter following revision instructions
    Revise {
        /// Chapter number
        #[arg(index = 1)]
        unit: u32,

        /// What to change
        #[arg(long)]
        instructions: String,

        #[arg(long)]
        outline: PathBuf,
    },
}

impl Command {
    pub fn outline(&self) -> &PathBuf {
        match self {
            Command::Run { outline }
            | Command::Retry { outline, .. }
            | Command::Revise { outline, .. } => outline,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn revise_takes_unit_and_instructions() {
        let cli = Cli::try_parse_from([
            "quill",
            "revise",
            "4",
            "--instructions",
            "More dialogue",
            "--outline",
            "book.ron",
            "--backend",
            "http://localhost:9000",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("http://localhost:9000"));
        assert_eq!(
            cli.command,
            Command::Revise {
                unit: 4,
                instructions: "More dialogue".to_string(),
                outline: "book.ron".into(),
            }
        );
    }

    #[test]
    fn run_requires_an_outline() {
        assert!(Cli::try_parse_from(["quill", "run"]).is_err());
        let cli = Cli::try_parse_from(["quill", "-v", "run", "--outline", "o.ron"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.command.outline().to_str(), Some("o.ron"));
    }
}
