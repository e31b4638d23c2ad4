use super::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            openai: OpenAiConfig {
                api_base: "http://localhost:8080/v1".to_string(),
                chat_model: "test-chat".to_string(),
                embedding_model: "test-embed".to_string(),
                temperature: 0.5,
                streaming: false,
                batch_size: 8,
                timeout_secs: 30,
                retry_attempts: 2,
                api_key: None,
            },
            upload: UploadConfig {
                max_size_mb: 4,
                timeout_secs: 60,
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn api_key_is_not_written_when_absent() {
        let toml_content = toml::to_string_pretty(&Config::default())
            .expect("config should convert to toml string successfully");

        assert!(!toml_content.contains("api_key"));
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [openai
            chat_model = "gpt-3.5-turbo"
            batch_size = "invalid_batch"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn dotenv_file_fills_missing_variables() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let first = temp_dir.path().join("first.env");
        let second = temp_dir.path().join("second.env");
        fs::write(&first, "DOC_QA_DOTENV_TEST_KEY=sk-from-file\n")
            .expect("should write env file successfully");
        fs::write(&second, "DOC_QA_DOTENV_TEST_KEY=sk-other\n")
            .expect("should write env file successfully");

        assert!(load_dotenv_from(&first));
        assert_eq!(
            std::env::var("DOC_QA_DOTENV_TEST_KEY").ok().as_deref(),
            Some("sk-from-file")
        );

        // Values already in the environment win over later files
        assert!(load_dotenv_from(&second));
        assert_eq!(
            std::env::var("DOC_QA_DOTENV_TEST_KEY").ok().as_deref(),
            Some("sk-from-file")
        );
    }

    #[test]
    fn missing_dotenv_file_is_skipped() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        assert!(!load_dotenv_from(&temp_dir.path().join(".env")));
    }

    #[test]
    fn resolve_config_dir_override() {
        let dir = PathBuf::from("/tmp/doc-qa-test");
        let resolved =
            resolve_config_dir(Some(dir.clone())).expect("override should always resolve");
        assert_eq!(resolved, dir);
    }
}
