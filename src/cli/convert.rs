use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;

use xdf2bids::config::ConversionConfig;
use xdf2bids::convert::{CancelToken, Converter};
use xdf2bids::manifest::{ConversionManifest, ConversionStatus};

/// Convert a decoded session into a BIDS tree
pub fn run(
    input: PathBuf,
    output: PathBuf,
    config: ConversionConfig,
    manifest_path: Option<PathBuf>,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file does not exist: {}", input.display());
    }

    info!("xdf2bids - decoded XDF session to BIDS");
    info!("=======================================");
    info!("Input:  {}", input.display());
    info!("Output: {}", output.display());
    info!(
        "Subject: sub-{} ses-{} (default task '{}')",
        config.identifiers.participant, config.identifiers.session, config.identifiers.task
    );
    info!("Reference clock: {}", config.reference_stream_selector);
    info!("Run boundaries: {}", config.run_boundary_source);
    info!("Conflict policy: {}", config.conflict_policy);

    let converter = Converter::new(config).context("Invalid conversion configuration")?;

    match converter.convert_file(&input, &output, &CancelToken::new()) {
        Ok(manifest) => {
            report(&manifest, manifest_path.as_ref())?;
            if manifest.status != ConversionStatus::Complete {
                warn!("Conversion finished with status {:?}", manifest.status);
            }
            Ok(())
        }
        Err(aborted) => {
            report(&aborted.manifest, manifest_path.as_ref())?;
            Err(aborted).context("Conversion aborted")
        }
    }
}

fn report(manifest: &ConversionManifest, path: Option<&PathBuf>) -> Result<()> {
    eprint!("{}", manifest.format_colored());
    match path {
        Some(path) => {
            manifest
                .write_json(path)
                .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
            info!("Manifest written to {}", path.display());
        }
        None => println!("{}", manifest.to_json()?),
    }
    Ok(())
}
