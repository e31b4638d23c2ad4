
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{Config, OpenAiConfig, RetrievalConfig, UploadConfig};
use crate::embeddings::chunking::ChunkingConfig;
use crate::openai::OpenAiClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Doc QA Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Model Service").bold().yellow());
    eprintln!("Configure the OpenAI-compatible service used for embeddings and answers.");
    eprintln!();

    configure_openai(&mut config.openai)?;

    eprintln!();
    eprintln!("{}", style("Uploads and Chunking").bold().yellow());
    configure_upload(&mut config.upload)?;
    configure_chunking(&mut config.chunking)?;
    configure_retrieval(&mut config.retrieval)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_openai_connection(&config) {
        eprintln!("{}", style("✓ Model service connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the model service").yellow()
        );
        eprintln!("You can continue, but check the API base and OPENAI_API_KEY before chatting.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Model Service:").bold().yellow());
    eprintln!("  API Base: {}", style(&config.openai.api_base).cyan());
    eprintln!("  Chat Model: {}", style(&config.openai.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.openai.embedding_model).cyan()
    );
    eprintln!("  Temperature: {}", style(config.openai.temperature).cyan());
    eprintln!("  Streaming: {}", style(config.openai.streaming).cyan());
    eprintln!("  Batch Size: {}", style(config.openai.batch_size).cyan());
    match config.credentials() {
        Ok(_) => eprintln!("  API Key: {}", style("configured").green()),
        Err(e) => eprintln!("  API Key: {} ({})", style("missing").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Uploads:").bold().yellow());
    eprintln!("  Max Size: {} MB", style(config.upload.max_size_mb).cyan());
    eprintln!("  Timeout: {}s", style(config.upload.timeout_secs).cyan());

    eprintln!();
    eprintln!("{}", style("Chunking and Retrieval:").bold().yellow());
    eprintln!("  Chunk Size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!(
        "  Chunk Overlap: {}",
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Max Tokens Limit: {}",
        style(config.retrieval.max_tokens_limit).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_openai(openai: &mut OpenAiConfig) -> Result<()> {
    let api_base: String = Input::new()
        .with_prompt("API base URL")
        .default(openai.api_base.clone())
        .validate_with(|input: &String| -> Result<(), String> {
            let temp_config = OpenAiConfig {
                api_base: input.clone(),
                ..OpenAiConfig::default()
            };
            temp_config.api_base_url().map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(openai.chat_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(openai.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Sampling temperature")
        .default(openai.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    let streaming = Confirm::new()
        .with_prompt("Stream answers as they are generated?")
        .default(openai.streaming)
        .interact()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(openai.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 2048 {
                Err("Batch size must be 2048 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    openai.set_api_base(api_base)?;
    openai.set_chat_model(chat_model)?;
    openai.set_embedding_model(embedding_model)?;
    openai.set_temperature(temperature)?;
    openai.set_batch_size(batch_size)?;
    openai.streaming = streaming;

    Ok(())
}

fn configure_upload(upload: &mut UploadConfig) -> Result<()> {
    let max_size_mb: u64 = Input::new()
        .with_prompt("Maximum upload size (MB)")
        .default(upload.max_size_mb)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=1024).contains(input) {
                Ok(())
            } else {
                Err("Size must be between 1 and 1024 MB")
            }
        })
        .interact_text()?;

    let timeout_secs: u64 = Input::new()
        .with_prompt("Upload timeout (seconds)")
        .default(upload.timeout_secs)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=3600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 3600 seconds")
            }
        })
        .interact_text()?;

    upload.set_max_size_mb(max_size_mb)?;
    upload.set_timeout_secs(timeout_secs)?;

    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig) -> Result<()> {
    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(chunking.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (50..=16000).contains(input) {
                Ok(())
            } else {
                Err("Chunk size must be between 50 and 16000")
            }
        })
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(chunking.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input < chunk_size {
                Ok(())
            } else {
                Err("Overlap must be smaller than the chunk size")
            }
        })
        .interact_text()?;

    chunking.chunk_size = chunk_size;
    chunking.chunk_overlap = chunk_overlap;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 50")
            }
        })
        .interact_text()?;

    let max_tokens_limit: usize = Input::new()
        .with_prompt("Maximum tokens of retrieved context")
        .default(retrieval.max_tokens_limit)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (100..=128_000).contains(input) {
                Ok(())
            } else {
                Err("Must be between 100 and 128000")
            }
        })
        .interact_text()?;

    retrieval.top_k = top_k;
    retrieval.max_tokens_limit = max_tokens_limit;

    Ok(())
}

fn test_openai_connection(config: &Config) -> bool {
    let Ok(credentials) = config.credentials() else {
        return false;
    };

    OpenAiClient::new(&config.openai, credentials)
        .is_ok_and(|client| client.with_retry_attempts(1).health_check().is_ok())
}
