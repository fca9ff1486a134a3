//! Case Repository.
//!
//! On-disk layout:
//!
//! ```text
//! <root>/<language>/<case-id>/
//!     before.<ext>     (absent for generate cases)
//!     after.<ext>      golden solution
//!     metadata.json    {"description": "...", "type": "refactor" | "generate"}
//! ```
//!
//! Hidden entries are skipped. Cases come back sorted by (language, case-id).

use crate::errors::RepositoryError;
use crate::model::{TaskKind, TestCase};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const METADATA_FILE: &str = "metadata.json";
const BEFORE_STEM: &str = "before";
const AFTER_STEM: &str = "after";

pub trait CaseRepository: Send + Sync {
    fn list_cases(&self) -> Result<Vec<TestCase>, RepositoryError>;

    fn languages(&self) -> Result<BTreeSet<String>, RepositoryError> {
        Ok(self.list_cases()?.into_iter().map(|c| c.language).collect())
    }
}

#[derive(Debug, Deserialize)]
struct CaseMetadata {
    description: String,
    #[serde(default, rename = "type")]
    kind: TaskKind,
}

#[derive(Debug, Clone)]
pub struct FsCaseRepository {
    root: PathBuf,
}

impl FsCaseRepository {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RepositoryError::RootNotFound { path: root });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_case(&self, language: &str, dir: &Path) -> Result<TestCase, RepositoryError> {
        let case_id = file_name(dir);
        let meta_path = dir.join(METADATA_FILE);
        if !meta_path.is_file() {
            return Err(RepositoryError::MissingFile {
                language: language.to_string(),
                case_id,
                file: METADATA_FILE,
            });
        }
        let raw = read_text(&meta_path)?;
        let meta: CaseMetadata =
            serde_json::from_str(&raw).map_err(|e| RepositoryError::Metadata {
                path: meta_path.clone(),
                message: e.to_string(),
            })?;

        let golden_path = find_by_stem(dir, AFTER_STEM, language, &case_id)?.ok_or_else(|| {
            RepositoryError::MissingFile {
                language: language.to_string(),
                case_id: case_id.clone(),
                file: "after",
            }
        })?;
        let golden = read_text(&golden_path)?;
        if golden.trim().is_empty() {
            return Err(RepositoryError::InvalidCase {
                language: language.to_string(),
                case_id,
                message: "golden file is empty".into(),
            });
        }

        // Generate cases never touch a before file, even a stray one.
        let before = match meta.kind {
            TaskKind::Generate => None,
            TaskKind::Refactor => {
                let path = find_by_stem(dir, BEFORE_STEM, language, &case_id)?.ok_or_else(
                    || RepositoryError::MissingFile {
                        language: language.to_string(),
                        case_id: case_id.clone(),
                        file: "before",
                    },
                )?;
                Some(read_text(&path)?)
            }
        };

        let case = TestCase {
            language: language.to_string(),
            id: case_id.clone(),
            description: meta.description,
            kind: meta.kind,
            before,
            golden,
        };
        case.check_invariants()
            .map_err(|message| RepositoryError::InvalidCase {
                language: language.to_string(),
                case_id,
                message,
            })?;
        Ok(case)
    }
}

impl CaseRepository for FsCaseRepository {
    fn list_cases(&self) -> Result<Vec<TestCase>, RepositoryError> {
        let mut cases = Vec::new();
        for lang_dir in visible_dirs(&self.root)? {
            let language = file_name(&lang_dir);
            for case_dir in visible_dirs(&lang_dir)? {
                let case = self.load_case(&language, &case_dir)?;
                debug!(case = %case.key(), kind = ?case.kind, "loaded case");
                cases.push(case);
            }
        }
        cases.sort_by(|a, b| (&a.language, &a.id).cmp(&(&b.language, &b.id)));
        Ok(cases)
    }

    fn languages(&self) -> Result<BTreeSet<String>, RepositoryError> {
        Ok(visible_dirs(&self.root)?
            .iter()
            .map(|p| file_name(p))
            .collect())
    }
}

/// Fixed set of cases held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCases {
    cases: Vec<TestCase>,
}

impl InMemoryCases {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }
}

impl CaseRepository for InMemoryCases {
    fn list_cases(&self) -> Result<Vec<TestCase>, RepositoryError> {
        let mut cases = self.cases.clone();
        for c in &cases {
            c.check_invariants()
                .map_err(|message| RepositoryError::InvalidCase {
                    language: c.language.clone(),
                    case_id: c.id.clone(),
                    message,
                })?;
        }
        cases.sort_by(|a, b| (&a.language, &a.id).cmp(&(&b.language, &b.id)));
        Ok(cases)
    }
}

fn visible_dirs(dir: &Path) -> Result<Vec<PathBuf>, RepositoryError> {
    let entries = fs::read_dir(dir).map_err(|source| RepositoryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RepositoryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn find_by_stem(
    dir: &Path,
    stem: &'static str,
    language: &str,
    case_id: &str,
) -> Result<Option<PathBuf>, RepositoryError> {
    let entries = fs::read_dir(dir).map_err(|source| RepositoryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut found: Option<PathBuf> = None;
    for entry in entries {
        let entry = entry.map_err(|source| RepositoryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || is_hidden(&path) {
            continue;
        }
        if path.file_stem().and_then(|s| s.to_str()) != Some(stem) {
            continue;
        }
        if found.is_some() {
            return Err(RepositoryError::AmbiguousFile {
                language: language.to_string(),
                case_id: case_id.to_string(),
                file: stem,
            });
        }
        found = Some(path);
    }
    Ok(found)
}

fn read_text(path: &Path) -> Result<String, RepositoryError> {
    fs::read_to_string(path).map_err(|source| RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    match path.file_name() {
        Some(n) => n.to_string_lossy().into_owned(),
        None => {
            warn!(path = %path.display(), "path has no file name");
            path.display().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_case(root: &Path, lang: &str, id: &str, files: &[(&str, &[u8])]) {
        let dir = root.join(lang).join(id);
        fs::create_dir_all(&dir).unwrap();
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
    }

    fn corpus() -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write_case(
            tmp.path(),
            "python",
            "02-retry",
            &[
                ("before.py", b"def f():\n    pass\n"),
                ("after.py", b"@workflow\ndef f():\n    pass\n"),
                ("metadata.json", br#"{"description": "Add retries"}"#),
            ],
        );
        write_case(
            tmp.path(),
            "python",
            "01-basic",
            &[
                ("before.py", b"x = 1\n"),
                ("after.py", b"x = 2\n"),
                (
                    "metadata.json",
                    br#"{"description": "Basic", "type": "refactor"}"#,
                ),
            ],
        );
        write_case(
            tmp.path(),
            "go",
            "01-new",
            &[
                ("after.go", b"package main\n"),
                (
                    "metadata.json",
                    br#"{"description": "Write it", "type": "generate"}"#,
                ),
            ],
        );
        fs::create_dir_all(tmp.path().join(".git").join("objects")).unwrap();
        tmp
    }

    #[test]
    fn lists_cases_sorted_and_skips_hidden() {
        let tmp = corpus();
        let repo = FsCaseRepository::open(tmp.path()).unwrap();
        let cases = repo.list_cases().unwrap();
        let keys: Vec<String> = cases.iter().map(|c| c.key().to_string()).collect();
        assert_eq!(keys, ["go/01-new", "python/01-basic", "python/02-retry"]);
        assert_eq!(cases[2].kind, TaskKind::Refactor);
        assert_eq!(cases[2].before.as_deref(), Some("def f():\n    pass\n"));

        let langs: Vec<String> = repo.languages().unwrap().into_iter().collect();
        assert_eq!(langs, ["go", "python"]);
    }

    #[test]
    fn generate_case_never_reads_before_file() {
        let tmp = tempfile::tempdir().unwrap();
        // Invalid UTF-8: reading it would fail the whole load.
        write_case(
            tmp.path(),
            "rust",
            "gen",
            &[
                ("before.rs", &[0xff, 0xfe, 0x00]),
                ("after.rs", b"fn main() {}\n"),
                (
                    "metadata.json",
                    br#"{"description": "Write it", "type": "generate"}"#,
                ),
            ],
        );
        let repo = FsCaseRepository::open(tmp.path()).unwrap();
        let cases = repo.list_cases().unwrap();
        assert_eq!(cases.len(), 1);
        assert!(cases[0].before.is_none());
    }

    #[test]
    fn empty_before_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_case(
            tmp.path(),
            "ts",
            "c",
            &[
                ("before.ts", b"  \n"),
                ("after.ts", b"export {}\n"),
                ("metadata.json", br#"{"description": "d"}"#),
            ],
        );
        let err = FsCaseRepository::open(tmp.path())
            .unwrap()
            .list_cases()
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidCase { .. }));
    }

    #[test]
    fn missing_and_ambiguous_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_case(
            tmp.path(),
            "ts",
            "c",
            &[
                ("after.ts", b"export {}\n"),
                ("metadata.json", br#"{"description": "d"}"#),
            ],
        );
        let err = FsCaseRepository::open(tmp.path())
            .unwrap()
            .list_cases()
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::MissingFile { file: "before", .. }
        ));

        write_case(
            tmp.path(),
            "ts",
            "c",
            &[("before.ts", b"a\n"), ("before.js", b"b\n")],
        );
        let err = FsCaseRepository::open(tmp.path())
            .unwrap()
            .list_cases()
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AmbiguousFile { .. }));
    }

    #[test]
    fn bad_metadata_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_case(
            tmp.path(),
            "ts",
            "c",
            &[
                ("before.ts", b"a\n"),
                ("after.ts", b"b\n"),
                ("metadata.json", br#"{"description": "d", "type": "rewrite"}"#),
            ],
        );
        let err = FsCaseRepository::open(tmp.path())
            .unwrap()
            .list_cases()
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Metadata { .. }));
    }

    #[test]
    fn missing_root() {
        let err = FsCaseRepository::open("/definitely/not/here").unwrap_err();
        assert!(matches!(err, RepositoryError::RootNotFound { .. }));
    }

    #[test]
    fn in_memory_checks_invariants() {
        let mut bad = TestCase::generate("go", "x", "d", "package main");
        bad.before = Some("old".into());
        assert!(InMemoryCases::new(vec![bad]).list_cases().is_err());
    }
}
