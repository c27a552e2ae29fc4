use super::{exit_codes, open_router, print_json, report_route_error};
use crate::cli::args::{ImportArgs, OutputFormat, TrainArgs};
use anyhow::Context;
use sqlroute_core::model::{RecordOutcome, TrainingPair};

pub fn cmd_train(args: TrainArgs) -> anyhow::Result<i32> {
    let router = open_router(&args.cfg)?;
    let outcome = match router.train(&args.question, &args.sql) {
        Ok(o) => o,
        Err(e) => return report_route_error(&e, args.format),
    };

    match args.format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Text => match outcome {
            RecordOutcome::Inserted { id } => println!("stored as #{}", id),
            RecordOutcome::Duplicate { existing_id, score } => println!(
                "skipped: matches #{} (similarity {:.2})",
                existing_id, score
            ),
        },
    }
    Ok(exit_codes::OK)
}

pub fn cmd_import(args: ImportArgs) -> anyhow::Result<i32> {
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input: {}", args.input.display()))?;
    let pairs: Vec<TrainingPair> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of training pairs", args.input.display()))?;

    let router = open_router(&args.cfg)?;
    let summary = match router.train_batch(&pairs, !args.no_dedup) {
        Ok(s) => s,
        Err(e) => return report_route_error(&e, args.format),
    };

    match args.format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => println!(
            "imported {} pair(s), skipped {} duplicate(s)",
            summary.inserted, summary.duplicates
        ),
    }
    Ok(exit_codes::OK)
}
