use crate::cli::args::{ReportArgs, ReportFormat};
use crate::exit_codes;
use anyhow::Context;
use wfbench_core::report::console::ConsoleReport;
use wfbench_core::report::summary::{write_summary, Summary, SummaryReport};
use wfbench_core::report::{JsonReport, ReportRenderer};
use wfbench_core::{aggregate, OutcomeSet};

pub fn run(args: ReportArgs) -> anyhow::Result<i32> {
    let set = match OutcomeSet::load(&args.outcomes) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let scores = aggregate(&set.outcomes);

    let rendered = match args.format {
        ReportFormat::Text => ConsoleReport {
            show_failures: args.show_failures,
        }
        .render(&scores, &set),
        ReportFormat::Json => format!("{}\n", SummaryReport.render(&scores, &set)),
        ReportFormat::Outcomes => format!("{}\n", JsonReport.render(&scores, &set)),
    };
    print!("{rendered}");

    if let Some(path) = &args.summary {
        write_summary(&Summary::new(&scores, &set), path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(exit_codes::SUCCESS)
}
