use std::path::PathBuf;

use clap::{Parser, Subcommand};
use doc_qa::{QaError, Result};
use doc_qa::commands::{ask, chat};
use doc_qa::config::{load_dotenv, resolve_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "doc-qa")]
#[command(about = "Chat with a text or PDF document using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.doc-qa)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model service, upload limits and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Upload a document and chat about it
    Chat {
        /// Text or PDF file to upload; prompted for when omitted
        file: Option<PathBuf>,
    },
    /// Answer a single question about a document
    Ask {
        /// Text or PDF file to read
        file: PathBuf,
        /// Question to answer
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();

    let cli = Cli::parse();
    let config_dir =
        resolve_config_dir(cli.config_dir).map_err(|e| QaError::Config(e.to_string()))?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Chat { file } => {
            chat(&config_dir, file).await?;
        }
        Commands::Ask { file, question } => {
            ask(&config_dir, &file, &question).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn chat_without_file() {
        let cli = Cli::try_parse_from(["doc-qa", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Chat { file: None }));
            assert_eq!(parsed.config_dir, None);
        }
    }

    #[test]
    fn chat_with_file() {
        let cli = Cli::try_parse_from(["doc-qa", "chat", "notes.txt"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat { file } = parsed.command {
                assert_eq!(file, Some(PathBuf::from("notes.txt")));
            }
        }
    }

    #[test]
    fn ask_command() {
        let cli = Cli::try_parse_from(["doc-qa", "ask", "report.pdf", "What is the total?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { file, question } = parsed.command {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert_eq!(question, "What is the total?");
            }
        }
    }

    #[test]
    fn ask_requires_question() {
        let cli = Cli::try_parse_from(["doc-qa", "ask", "report.pdf"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["doc-qa", "chat", "--config-dir", "/tmp/qa"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/qa")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["doc-qa", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["doc-qa", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["doc-qa", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
