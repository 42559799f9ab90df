use flakefinder_core::dequarantine::{evaluate, read_records, remaining, write_records};
use flakefinder_core::report::json::read_json;
use flakefinder_core::FinderConfig;
use tracing::info;

use super::super::args::DequarantineArgs;
use crate::exit_codes::EXIT_SUCCESS;

pub(crate) fn run(args: DequarantineArgs) -> anyhow::Result<i32> {
    let matrix = read_json(&args.report)?;
    let records = read_records(&args.quarantine)?;
    let minimum = args
        .minimum_passed_runs
        .unwrap_or(FinderConfig::default().minimum_passed_runs);

    let evaluations = evaluate(&records, &matrix, minimum)?;
    println!("{}", serde_json::to_string_pretty(&evaluations)?);

    let kept = remaining(&evaluations);
    info!(
        released = records.len() - kept.len(),
        remaining = kept.len(),
        "quarantine evaluated"
    );
    if let Some(output) = &args.output {
        write_records(&kept, output)?;
        eprintln!("remaining records written to {}", output.display());
    }
    Ok(EXIT_SUCCESS)
}
