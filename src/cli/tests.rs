#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use crate::config::LLMProvider;
    use crate::i18n::TargetLanguage;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const REQUIRED: [&str; 7] = [
        "deepaper-rs",
        "--state",
        "research.json",
        "--user-id",
        "u1",
        "--conversation-id",
        "c1",
    ];

    fn parse(extra: &[&str]) -> Args {
        let mut argv: Vec<&str> = REQUIRED.to_vec();
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_required_arguments() {
        assert!(Args::try_parse_from(["deepaper-rs"]).is_err());
        assert!(Args::try_parse_from(["deepaper-rs", "--state", "s.json", "--user-id", "u"]).is_err());

        let args = parse(&[]);
        assert_eq!(args.state, PathBuf::from("research.json"));
        assert_eq!(args.user_id, "u1");
        assert_eq!(args.conversation_id, "c1");
        assert!(!args.verbose);
        assert!(!args.no_cache);
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_paper_request() {
        let args = parse(&["-a", "Ada Lovelace"]);
        let request = args.paper_request();
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.author.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn test_into_config_overrides() {
        let args = parse(&[
            "--llm-provider",
            "anthropic",
            "--model-efficient",
            "small",
            "--max-tokens",
            "2048",
            "--target-language",
            "de",
            "--discovery-concurrency",
            "0",
            "--no-cache",
            "-v",
        ]);
        let config = args.into_config().unwrap();

        assert_eq!(config.llm.provider, LLMProvider::Anthropic);
        assert_eq!(config.llm.model_efficient, "small");
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.generation.target_language, TargetLanguage::German);
        assert_eq!(config.generation.discovery_concurrency, 1);
        assert!(!config.cache.enabled);
        assert!(config.verbose);
    }

    #[test]
    fn test_into_config_rejects_unknown_provider() {
        let args = parse(&["--llm-provider", "nope"]);
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_explicit_config_file_is_loaded_and_overridden() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "author = \"From File\"\n[compile]\nengine = \"xelatex\"\n").unwrap();

        let config = parse(&["-c", path.to_str().unwrap()]).into_config().unwrap();
        assert_eq!(config.author, "From File");
        assert_eq!(config.compile.engine, "xelatex");

        let config = parse(&["-c", path.to_str().unwrap(), "-a", "CLI"])
            .into_config()
            .unwrap();
        assert_eq!(config.author, "CLI");
    }

    #[test]
    fn test_missing_explicit_config_file_fails() {
        let args = parse(&["-c", "/nonexistent/deepaper.toml"]);
        assert!(args.into_config().is_err());
    }
}
