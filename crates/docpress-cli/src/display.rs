//! Terminal display utilities for the docpress CLI

use console::style;
use docpress_engine::CompressionOutcome;
use docpress_types::{Error, RecordOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Display compression statistics
pub fn display_compression_stats(outcome: &CompressionOutcome, output: &Path, elapsed: Duration) {
    let result = &outcome.result;

    println!();
    println!("{}", style("Compression Statistics:").bold().underlined());
    println!("  File: {}", style(&outcome.file_name).cyan());
    println!("  Quality: {}", style(outcome.quality_tier).cyan());
    println!(
        "  Original size: {}",
        style(format_bytes(result.original_size())).green()
    );
    println!(
        "  Compressed size: {}",
        style(format_bytes(result.compressed_size())).green()
    );

    let ratio = result.ratio();
    let ratio_style = if ratio.is_ineffective() {
        style(format!("{}%", ratio)).yellow().bold()
    } else {
        style(format!("{}%", ratio)).green().bold()
    };
    println!("  Reduction: {}", ratio_style);
    println!("  Duration: {}", style(format_duration(elapsed)).blue());
    println!("  Identity: {}", style(outcome.identity.label()).dim());
    println!("  Usage recorded: {}", record_label(&outcome.record));
    println!("  Output: {}", style(output.display()).cyan());

    if ratio.is_ineffective() {
        display_warning("The compressed document is not smaller than the original");
    }
}

fn record_label(record: &RecordOutcome) -> String {
    match record {
        RecordOutcome::Recorded => style("yes").green().to_string(),
        RecordOutcome::Skipped => style("skipped").dim().to_string(),
        RecordOutcome::Failed(reason) => style(format!("failed ({})", reason)).red().to_string(),
    }
}

/// Display a pipeline error with its remediation hint
pub fn display_pipeline_error(error: &Error) {
    display_error(&error.to_string());
    if let Error::Engine { diagnostics, .. } = error {
        if !diagnostics.is_empty() {
            for line in diagnostics.lines().take(10) {
                eprintln!("    {}", style(line).dim());
            }
        }
    }
    if let Some(hint) = error.hint() {
        eprintln!("  {} {}", style("hint:").blue().bold(), hint);
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Display a warning message with proper formatting
pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Display an error message with proper formatting
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Display a success message with proper formatting
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

/// Display an info message with proper formatting
pub fn display_info(message: &str) {
    println!("{} {}", style("ℹ").blue().bold(), style(message).blue());
}

/// Spinner shown while the engine runs; `None` when output is suppressed
pub fn create_spinner(message: &str, hidden: bool) -> Option<ProgressBar> {
    if hidden {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0.00 B")]
    #[case(512, "512.00 B")]
    #[case(1536, "1.50 KB")]
    #[case(20 * 1024 * 1024, "20.00 MB")]
    #[case(3 * 1024 * 1024 * 1024, "3.00 GB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[rstest]
    #[case(Duration::from_millis(1500), "1.50s")]
    #[case(Duration::from_secs(125), "2m 5s")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[test]
    fn test_hidden_spinner() {
        assert!(create_spinner("Compressing", true).is_none());
    }

    #[test]
    fn test_record_label_mentions_failure_reason() {
        let label = record_label(&RecordOutcome::Failed("store offline".to_string()));
        assert!(label.contains("store offline"));
    }
}
