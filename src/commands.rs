use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::citations::SourceElement;
use crate::config::{ACCEPTED_MIME_TYPES, Config};
use crate::ingest::UploadedFile;
use crate::openai::OpenAiClient;
use crate::session::{ChatResponse, ChatSession, SessionStore};

const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Interactive chat over one uploaded document
#[inline]
pub async fn chat(config_dir: &Path, file: Option<PathBuf>) -> Result<()> {
    let (config, client) = load_runtime(config_dir)?;

    println!("{}", style("Welcome to Doc Q&A!").bold().cyan());

    let upload = prompt_for_upload(&config, file).await?;
    let session = start_session(upload, &config, client).await?;

    let sessions = SessionStore::new();
    let session_id = sessions.insert(session).await;
    let session = sessions
        .get(session_id)
        .await
        .context("Session disappeared right after it was created")?;

    println!(
        "{}",
        style(format!(
            "Finished processing {}. You may ask questions!",
            session.file_name()
        ))
        .green()
    );
    println!("{}", style("Type 'exit' or an empty line to quit.").dim());

    loop {
        println!();
        let question = match Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(question) => question,
            Err(e) => {
                debug!("Input closed: {}", e);
                break;
            }
        };

        if is_exit_command(&question) {
            break;
        }

        match session.ask(&question, print_token).await {
            Ok(response) => print_response(&response, session.chain().is_streaming()),
            Err(e) => {
                warn!("Failed to answer question: {}", e);
                eprintln!("{} {}", style("Error:").red().bold(), e);
            }
        }
    }

    sessions.remove(session_id).await;
    info!("Chat session {} ended", session_id);
    Ok(())
}

/// Answer a single question about a file and exit
#[inline]
pub async fn ask(config_dir: &Path, file: &Path, question: &str) -> Result<()> {
    let (config, client) = load_runtime(config_dir)?;

    let upload = UploadedFile::from_path(file, &config.upload)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let session = start_session(upload, &config, client).await?;

    let response = session
        .ask(question, print_token)
        .await
        .context("Failed to answer question")?;
    print_response(&response, session.chain().is_streaming());

    Ok(())
}

fn load_runtime(config_dir: &Path) -> Result<(Config, OpenAiClient)> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let credentials = config
        .credentials()
        .context("Model service credentials are not configured")?;
    let client = OpenAiClient::new(&config.openai, credentials)
        .context("Failed to create model service client")?;
    info!(
        "Answering with {} over {} embeddings",
        client.chat_model(),
        client.embedding_model()
    );
    Ok((config, client))
}

/// Ask for a file until one is accepted
///
/// A path given on the command line is tried first.
async fn prompt_for_upload(config: &Config, initial: Option<PathBuf>) -> Result<UploadedFile> {
    let mut candidate = initial;

    loop {
        let path = match candidate.take() {
            Some(path) => path,
            None => {
                let input: String = Input::new()
                    .with_prompt(format!(
                        "Upload text/PDF file to chat with it (max {} MB)",
                        config.upload.max_size_mb
                    ))
                    .allow_empty(true)
                    .interact_text()?;
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                PathBuf::from(input)
            }
        };

        match UploadedFile::from_path(&path, &config.upload).await {
            Ok(upload) => return Ok(upload),
            Err(e) => {
                warn!("Rejected upload {}: {}", path.display(), e);
                eprintln!(
                    "{} {} (accepted: {})",
                    style("Cannot use that file:").yellow(),
                    e,
                    ACCEPTED_MIME_TYPES.join(", ")
                );
            }
        }
    }
}

async fn start_session(
    upload: UploadedFile,
    config: &Config,
    client: OpenAiClient,
) -> Result<ChatSession> {
    let name = upload.name.clone();
    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("style template is valid"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Reading in {}", name));

    let session = ChatSession::start(upload, config, client).await;
    bar.finish_and_clear();

    session.with_context(|| format!("Failed to process {}", name))
}

fn print_token(token: &str) {
    print!("{}", token);
    std::io::stdout().flush().ok();
}

fn print_response(response: &ChatResponse, streamed: bool) {
    if streamed {
        // The streamed text already holds the answer
        println!();
    } else {
        println!("{}", response.answer);
    }

    if let Some(notice) = annotation(response) {
        println!("{}", style(notice).dim());
    }

    for element in &response.elements {
        println!();
        println!("{}", format_excerpt(element));
    }
}

/// Citation notice appended to the answer, if any
fn annotation(response: &ChatResponse) -> Option<&str> {
    response
        .content
        .strip_prefix(response.answer.as_str())
        .map(str::trim)
        .filter(|notice| !notice.is_empty())
}

fn format_excerpt(element: &SourceElement) -> String {
    let body = element
        .content
        .lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n{}", style(format!("[{}]", element.name)).cyan(), body)
}

fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    input.is_empty() || EXIT_COMMANDS.iter().any(|c| input.eq_ignore_ascii_case(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content: &str, answer: &str) -> ChatResponse {
        ChatResponse {
            content: content.to_string(),
            answer: answer.to_string(),
            sources: String::new(),
            found_sources: Vec::new(),
            elements: Vec::new(),
        }
    }

    #[test]
    fn exit_commands() {
        assert!(is_exit_command(""));
        assert!(is_exit_command("   "));
        assert!(is_exit_command("exit"));
        assert!(is_exit_command(" QUIT "));
        assert!(!is_exit_command("what is exit code 2?"));
    }

    #[test]
    fn annotation_is_the_appended_notice() {
        let answered = response("Blue.\nSources: source_0", "Blue.");
        assert_eq!(annotation(&answered), Some("Sources: source_0"));

        let missing = response("Blue.\nNo sources found", "Blue.");
        assert_eq!(annotation(&missing), Some("No sources found"));

        let bare = response("Blue.", "Blue.");
        assert_eq!(annotation(&bare), None);
    }

    #[test]
    fn excerpt_indents_content() {
        console::set_colors_enabled(false);
        let element = SourceElement {
            name: "source_1".to_string(),
            content: "line one\nline two".to_string(),
        };

        assert_eq!(
            format_excerpt(&element),
            "[source_1]\n  line one\n  line two"
        );
    }
}
