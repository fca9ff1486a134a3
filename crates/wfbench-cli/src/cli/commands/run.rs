use super::runner_builder::{
    apply_overrides, build_runner, corpus_root, load_cases, load_config, load_prompts,
};
use crate::cli::args::RunArgs;
use crate::credentials::EnvCredentials;
use crate::exit_codes;
use anyhow::Context;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use wfbench_core::engine::{CancelFlag, RunOptions};
use wfbench_core::report::console::{default_progress_sink, ConsoleReport};
use wfbench_core::report::summary::{write_summary, Summary};
use wfbench_core::report::ReportRenderer;
use wfbench_core::{aggregate, AggregateScore, ConfigError, OutcomeSet, RunError, Runner, TestCase};

pub const OUTCOMES_FILE: &str = "outcomes.json";
pub const SUMMARY_FILE: &str = "summary.json";

struct Prepared {
    runner: Runner,
    cases: Vec<TestCase>,
    models: Vec<String>,
    resume: Option<OutcomeSet>,
}

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let Prepared {
        runner,
        cases,
        models,
        resume,
    } = match prepare(&args) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "run aborted before scheduling");
            eprintln!("error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let ctrl_c = spawn_ctrl_c(runner.cancel_flag());
    let total = cases.len() * models.len();
    let opts = RunOptions {
        resume_from: resume,
        progress: if args.no_progress {
            None
        } else {
            default_progress_sink(total)
        },
        retry_generation_failures: args.retry_failed_generation,
    };
    info!(
        cases = cases.len(),
        models = models.len(),
        pairs = total,
        judge = runner.judge_model(),
        "starting run"
    );
    let set = runner.run(&cases, &models, opts).await;
    ctrl_c.abort();

    let scores = aggregate(&set.outcomes);
    write_outputs(&args.out, &set, &scores)?;
    print!(
        "{}",
        ConsoleReport {
            show_failures: args.show_failures
        }
        .render(&scores, &set)
    );

    if set.cancelled {
        warn!(pairs = set.outcomes.len(), "run cancelled, outputs are partial");
        return Ok(exit_codes::CANCELLED);
    }
    Ok(exit_codes::SUCCESS)
}

fn prepare(args: &RunArgs) -> Result<Prepared, RunError> {
    let mut config = load_config(&args.config, false)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    let cases = load_cases(&corpus_root(&config), &args.languages)?;
    if cases.is_empty() {
        return Err(ConfigError::Invalid("no cases selected".into()).into());
    }
    let prompts = load_prompts(config.templates.as_deref())?;
    let resume = match &args.resume {
        Some(path) => Some(load_resume(path, config.judge_model()?)?),
        None => None,
    };
    let runner = build_runner(&config, prompts, &EnvCredentials)?;
    Ok(Prepared {
        runner,
        cases,
        models: config.candidates.clone(),
        resume,
    })
}

fn load_resume(path: &Path, judge: &str) -> Result<OutcomeSet, ConfigError> {
    let prior = OutcomeSet::load(path)
        .map_err(|e| ConfigError::Invalid(format!("cannot resume: {e}")))?;
    if prior.judge_model != judge {
        warn!(
            prior = %prior.judge_model,
            current = judge,
            "resuming with a different judge; carried verdicts keep their original judge"
        );
    }
    info!(
        path = %path.display(),
        resumable = prior.resumable().count(),
        "loaded prior outcomes"
    );
    Ok(prior)
}

fn write_outputs(dir: &Path, set: &OutcomeSet, scores: &AggregateScore) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    let outcomes = dir.join(OUTCOMES_FILE);
    set.save(&outcomes)
        .with_context(|| format!("failed to write {}", outcomes.display()))?;
    let summary = dir.join(SUMMARY_FILE);
    write_summary(&Summary::new(scores, set), &summary)
        .with_context(|| format!("failed to write {}", summary.display()))?;
    info!(outcomes = %outcomes.display(), summary = %summary.display(), "wrote reports");
    Ok(())
}

/// First Ctrl-C stops scheduling; a second one exits without waiting for
/// in-flight pairs. Outputs are not written in that case.
fn spawn_ctrl_c(cancel: CancelFlag) -> tokio::task::JoinHandle<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let forward = async {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        };
        tokio::select! {
            _ = forward => {}
            forced = on_interrupts(cancel, rx) => {
                if forced {
                    error!("second interrupt, aborting in-flight pairs");
                    std::process::exit(exit_codes::CANCELLED);
                }
            }
        }
    })
}

/// Returns true once a second interrupt arrives.
async fn on_interrupts(cancel: CancelFlag, mut interrupts: mpsc::UnboundedReceiver<()>) -> bool {
    if interrupts.recv().await.is_none() {
        return false;
    }
    warn!("interrupt received, finishing in-flight pairs (interrupt again to abort)");
    cancel.cancel();
    interrupts.recv().await.is_some()
}
