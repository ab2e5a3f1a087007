use anyhow::{Context, Result};
use std::path::PathBuf;

use xdf2bids::classify::Classifier;
use xdf2bids::clock::reconcile;
use xdf2bids::config::ConversionConfig;
use xdf2bids::ingest::DecodedSession;
use xdf2bids::segment::plan_runs;

/// Show how a session would be classified, aligned and segmented
pub fn run(input: PathBuf, config: ConversionConfig) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("File does not exist: {}", input.display());
    }

    config.validate().context("Invalid conversion configuration")?;
    let session = DecodedSession::from_json_file(&input).context("Failed to read decoded session")?;
    let classifier = Classifier::new(config.rule_table());
    let classified = classifier.classify_all(&session.streams);

    println!("Session Information");
    println!("===================");
    println!("File: {}", input.display());
    if let Some(recorded_at) = session.recorded_at {
        println!("Recorded: {}", recorded_at.to_rfc3339());
    }
    println!();

    println!("Streams:");
    for c in &classified {
        let header = c.header();
        let rate = if header.is_irregular() {
            "irregular".to_string()
        } else {
            format!("{} Hz", header.nominal_srate)
        };
        println!(
            "  [{:3}] {} (type '{}', {} ch, {}, {} samples, {} offsets)",
            c.id(),
            header.name,
            header.stream_type,
            header.channel_count,
            rate,
            c.stream.sample_count(),
            c.stream.clock_offsets.len()
        );
        println!(
            "        -> {}{}",
            c.modality,
            c.rule.as_deref().map(|r| format!(" (rule '{r}')")).unwrap_or_default()
        );
        if let Some(warning) = c.ambiguity_warning() {
            println!("        WARNING: {warning}");
        }
        if let Err(e) = c.stream.validate_contract() {
            println!("        INVALID: {e}");
        }
    }
    println!();

    let supported: Vec<_> = classified
        .into_iter()
        .filter(|c| !c.is_unsupported() && c.stream.validate_contract().is_ok())
        .collect();
    let reconciliation = match reconcile(supported, &config.reference_stream_selector) {
        Ok(r) => r,
        Err(e) => {
            println!("Reference clock: unavailable ({e})");
            return Ok(());
        }
    };

    let clock = &reconciliation.clock;
    println!("Reference Clock:");
    println!("  Stream: {} ('{}')", clock.stream_id, clock.stream_name);
    println!("  Span: {:.3}s to {:.3}s ({:.3}s)", clock.start, clock.end, clock.duration());
    for stream in &reconciliation.streams {
        for warning in stream.warnings() {
            println!("  Stream {}: {}", stream.id(), warning);
        }
    }
    println!();

    println!("Runs:");
    match plan_runs(
        &reconciliation.streams,
        clock,
        &config.segmentation_policy(),
        &config.identifiers.task,
    ) {
        Ok(plan) => {
            for run in &plan.runs {
                println!(
                    "  task-{} run-{:02}: {:.3}s to {:.3}s ({:.3}s)",
                    run.task,
                    run.index,
                    run.start,
                    run.end,
                    run.duration()
                );
            }
            for warning in &plan.warnings {
                println!("  WARNING: {warning}");
            }
        }
        Err(e) => println!("  unavailable ({e})"),
    }

    Ok(())
}
