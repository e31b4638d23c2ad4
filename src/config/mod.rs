// Configuration management module
// TOML settings, credentials and the interactive setup command

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

use tracing::{debug, warn};

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ACCEPTED_MIME_TYPES, Config, ConfigError, Credentials, OpenAiConfig, RetrievalConfig,
    UploadConfig,
};

/// Load `.env` from the working directory or the nearest parent that has one
///
/// Variables already present in the environment are left untouched.
#[inline]
pub fn load_dotenv() -> Option<std::path::PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!("Loaded environment from {}", path.display());
            Some(path)
        }
        Err(e) => {
            report_dotenv_error(&e);
            None
        }
    }
}

/// Load a specific env file, returning whether it was read
#[inline]
pub fn load_dotenv_from(path: &std::path::Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!("Loaded environment from {}", path.display());
            true
        }
        Err(e) => {
            report_dotenv_error(&e);
            false
        }
    }
}

fn report_dotenv_error(error: &dotenvy::Error) {
    if error.not_found() {
        debug!("No .env file found");
    } else {
        warn!("Ignoring unreadable .env file: {}", error);
    }
}

/// Resolve the configuration directory, falling back to `~/.doc-qa`
#[inline]
pub fn resolve_config_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    override_dir.map_or_else(Config::default_config_dir, Ok)
}
