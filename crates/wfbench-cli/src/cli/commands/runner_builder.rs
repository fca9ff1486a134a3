//! Turns a config file plus command-line overrides into a ready runner.

use crate::cli::args::RunArgs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use wfbench_core::config::{BenchConfig, CredentialResolver};
use wfbench_core::corpus::{CaseRepository, FsCaseRepository};
use wfbench_core::prompts::{PromptRenderer, TemplatePrompts};
use wfbench_core::{providers, ConfigError, RunError, RunPolicy, Runner, TestCase};

pub const DEFAULT_CORPUS: &str = "cases";

/// Loads the config file. With `optional`, a missing file yields defaults.
pub fn load_config(path: &Path, optional: bool) -> Result<BenchConfig, ConfigError> {
    if optional && !path.exists() {
        info!(path = %path.display(), "no config file, using defaults");
        return Ok(BenchConfig::default());
    }
    BenchConfig::load(path)
}

/// Command-line flags win over the file.
pub fn apply_overrides(config: &mut BenchConfig, args: &RunArgs) {
    if !args.models.is_empty() {
        config.candidates = args.models.clone();
    }
    if let Some(judge) = &args.judge {
        config.judge = Some(judge.clone());
    }
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    if let Some(dir) = &args.cases {
        config.corpus = Some(dir.clone());
    }
    if let Some(dir) = &args.templates {
        config.templates = Some(dir.clone());
    }
}

pub fn corpus_root(config: &BenchConfig) -> PathBuf {
    config
        .corpus
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CORPUS))
}

/// Lists the corpus, keeping only `languages` when non-empty.
pub fn load_cases(root: &Path, languages: &[String]) -> Result<Vec<TestCase>, RunError> {
    let repo = FsCaseRepository::open(root)?;
    let cases = repo.list_cases()?;
    if languages.is_empty() {
        return Ok(cases);
    }
    for lang in languages {
        if !cases.iter().any(|c| &c.language == lang) {
            warn!(language = %lang, "no cases for language filter");
        }
    }
    Ok(cases
        .into_iter()
        .filter(|c| languages.contains(&c.language))
        .collect())
}

pub fn load_prompts(dir: Option<&Path>) -> Result<Arc<dyn PromptRenderer>, ConfigError> {
    match dir {
        None => Ok(Arc::new(TemplatePrompts::builtin())),
        Some(dir) => {
            let prompts = TemplatePrompts::from_dir(dir).map_err(|e| {
                ConfigError::Invalid(format!("templates {}: {e}", dir.display()))
            })?;
            Ok(Arc::new(prompts))
        }
    }
}

pub fn build_runner(
    config: &BenchConfig,
    prompts: Arc<dyn PromptRenderer>,
    credentials: &dyn CredentialResolver,
) -> Result<Runner, ConfigError> {
    let invoker = providers::build_invoker(config, credentials)?;
    let judge = config.judge_model()?;
    Ok(Runner::new(
        Arc::new(invoker),
        prompts,
        judge,
        RunPolicy {
            concurrency: config.concurrency,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn write_case(root: &Path, lang: &str, id: &str) {
        let dir = root.join(lang).join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("metadata.json"),
            r#"{"description": "poll a job", "type": "refactor"}"#,
        )
        .unwrap();
        fs::write(dir.join("before.txt"), "while True: poll()").unwrap();
        fs::write(dir.join("after.txt"), "workflow.run(poll)").unwrap();
    }

    #[test]
    fn missing_optional_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("nope.yaml"), true).unwrap();
        assert!(cfg.models.is_empty());
        assert!(matches!(
            load_config(&dir.path().join("nope.yaml"), false),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn flags_override_file_values() {
        let mut cfg = BenchConfig {
            candidates: vec!["a".into()],
            judge: Some("j".into()),
            ..BenchConfig::default()
        };
        let args = RunArgs::parse_from([
            "run",
            "--models",
            "b,c",
            "--judge",
            "k",
            "--concurrency",
            "9",
            "--cases",
            "corpus",
        ]);
        apply_overrides(&mut cfg, &args);
        assert_eq!(cfg.candidates, vec!["b", "c"]);
        assert_eq!(cfg.judge.as_deref(), Some("k"));
        assert_eq!(cfg.concurrency, 9);
        assert_eq!(corpus_root(&cfg), PathBuf::from("corpus"));
    }

    #[test]
    fn language_filter_keeps_matching_cases() {
        let dir = tempfile::tempdir().unwrap();
        write_case(dir.path(), "python", "01");
        write_case(dir.path(), "typescript", "01");
        let all = load_cases(dir.path(), &[]).unwrap();
        assert_eq!(all.len(), 2);
        let py = load_cases(dir.path(), &["python".to_string()]).unwrap();
        assert_eq!(py.len(), 1);
        assert_eq!(py[0].language, "python");
    }

    #[test]
    fn missing_corpus_is_a_run_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_cases(&dir.path().join("missing"), &[]).unwrap_err();
        assert!(matches!(err, RunError::Repository(_)));
    }
}
