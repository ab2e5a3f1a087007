use std::fmt;

#[cfg(feature = "colorized_output")]
use console::style;

use super::{ConversionManifest, ConversionStatus, Outcome};

impl ConversionManifest {
    /// Human-readable summary with colors (requires console feature)
    pub fn format_colored(&self) -> String {
        #[cfg(feature = "colorized_output")]
        {
            use console::Emoji;

            static OK: Emoji<'_, '_> = Emoji("✓", "[OK]");
            static SKIP: Emoji<'_, '_> = Emoji("-", "[SKIP]");
            static PART: Emoji<'_, '_> = Emoji("✗", "[PARTIAL]");

            let mut output = String::new();
            output.push_str(&format!(
                "{}\n",
                style(format!("sub-{} ses-{}", self.participant, self.session)).bold().cyan()
            ));
            if let Some(reference) = &self.reference_stream {
                output.push_str(&format!("{}: {}\n", style("Reference").bold(), reference));
            }
            output.push_str(&format!("{}: {}\n\n", style("Runs").bold(), self.runs.len()));

            for entry in &self.entries {
                let line = format!("[{}] {} ({})", entry.stream_id, entry.stream_name, entry.modality);
                match entry.outcome {
                    Outcome::Written => output.push_str(&format!(
                        "{} {} - {} file(s)\n",
                        OK,
                        style(line).green(),
                        entry.output_paths.len()
                    )),
                    Outcome::Skipped => output.push_str(&format!(
                        "{} {} - {}\n",
                        SKIP,
                        style(line).dim(),
                        entry.reason.as_deref().unwrap_or("skipped")
                    )),
                    Outcome::Partial => output.push_str(&format!(
                        "{} {} - {}\n",
                        PART,
                        style(line).red(),
                        entry.reason.as_deref().unwrap_or("incomplete")
                    )),
                }
                for warning in &entry.warnings {
                    output.push_str(&format!("    {}: {}\n", style("WARNING").yellow().bold(), warning));
                }
            }
            for warning in &self.warnings {
                output.push_str(&format!("{}: {}\n", style("WARNING").yellow().bold(), warning));
            }

            output.push('\n');
            let status = match self.status {
                ConversionStatus::Complete => style("Conversion complete").green().bold(),
                ConversionStatus::Partial => style("Conversion partial").yellow().bold(),
                ConversionStatus::Cancelled => style("Conversion cancelled").yellow().bold(),
                ConversionStatus::Aborted => style("Conversion aborted").red().bold(),
            };
            output.push_str(&format!("{status}\n"));
            output
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            format!("{}", self)
        }
    }
}

impl fmt::Display for ConversionManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sub-{} ses-{}", self.participant, self.session)?;
        if let Some(reference) = &self.reference_stream {
            writeln!(f, "Reference: {}", reference)?;
        }
        writeln!(f, "Runs: {}", self.runs.len())?;
        writeln!(f)?;

        for entry in &self.entries {
            write!(f, "[{}] {} ({}) ", entry.stream_id, entry.stream_name, entry.modality)?;
            match entry.outcome {
                Outcome::Written => writeln!(f, "written: {} file(s)", entry.output_paths.len())?,
                Outcome::Skipped => {
                    writeln!(f, "skipped: {}", entry.reason.as_deref().unwrap_or("-"))?
                }
                Outcome::Partial => {
                    writeln!(f, "partial: {}", entry.reason.as_deref().unwrap_or("-"))?
                }
            }
            for warning in &entry.warnings {
                writeln!(f, "    WARNING: {}", warning)?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "WARNING: {}", warning)?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} written, {} skipped, {} partial ({})",
            self.count(Outcome::Written),
            self.count(Outcome::Skipped),
            self.count(Outcome::Partial),
            match self.status {
                ConversionStatus::Complete => "complete",
                ConversionStatus::Partial => "partial",
                ConversionStatus::Cancelled => "cancelled",
                ConversionStatus::Aborted => "aborted",
            }
        )
    }
}
