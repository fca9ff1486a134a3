use super::runner_builder::{corpus_root, load_cases, load_config};
use crate::cli::args::CasesArgs;
use crate::exit_codes;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use wfbench_core::model::TaskKind;
use wfbench_core::{RunError, TestCase};

pub fn run(args: CasesArgs) -> anyhow::Result<i32> {
    match list(&args) {
        Ok(cases) => {
            print!("{}", render(&cases));
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

fn list(args: &CasesArgs) -> Result<Vec<TestCase>, RunError> {
    let mut config = load_config(&args.config, args.cases.is_some())?;
    if let Some(dir) = &args.cases {
        config.corpus = Some(dir.clone());
    }
    load_cases(&corpus_root(&config), &args.languages)
}

fn render(cases: &[TestCase]) -> String {
    let mut by_lang: BTreeMap<&str, Vec<&TestCase>> = BTreeMap::new();
    for c in cases {
        by_lang.entry(c.language.as_str()).or_default().push(c);
    }
    let mut out = String::new();
    for (lang, cases) in &by_lang {
        let _ = writeln!(out, "{} ({})", lang, cases.len());
        for c in cases {
            let kind = match c.kind {
                TaskKind::Refactor => "refactor",
                TaskKind::Generate => "generate",
            };
            let _ = writeln!(out, "  {:<24} {:<8} {}", c.id, kind, c.description);
        }
    }
    let _ = writeln!(out, "{} case(s), {} language(s)", cases.len(), by_lang.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_cases_by_language() {
        let cases = vec![
            TestCase::generate("go", "02-saga", "book a trip", "saga()"),
            TestCase::refactor("python", "01-retry", "retry a call", "loop()", "wf()"),
            TestCase::refactor("go", "01-timer", "sleep then act", "sleep()", "timer()"),
        ];
        let text = render(&cases);
        assert!(text.starts_with("go (2)\n"), "{}", text);
        assert!(text.contains("02-saga"));
        assert!(text.contains("generate"));
        assert!(text.contains("python (1)"));
        assert!(text.ends_with("3 case(s), 2 language(s)\n"));
    }
}
