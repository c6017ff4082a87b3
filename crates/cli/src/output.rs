//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use visreg_core::{ComparisonReport, Outcome, SuiteSummary};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// Plain text format
    Plain,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for ComparisonReport {
    fn headers() -> Vec<&'static str> {
        vec!["Sample", "Outcome", "Diff %", "Masked px", "Diff image / error"]
    }

    fn row(&self) -> Vec<String> {
        let detail = match (&self.error, &self.diff_image_path) {
            (Some(error), _) => error.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => "-".to_string(),
        };
        vec![
            self.name.clone(),
            outcome_label(self.outcome),
            format!("{:.2}", self.diff_percent),
            self.masked_pixels.to_string(),
            detail,
        ]
    }
}

fn outcome_label(outcome: Outcome) -> String {
    match outcome {
        Outcome::Match => "match".green().to_string(),
        Outcome::Mismatch => "mismatch".red().to_string(),
        Outcome::Error => "error".yellow().to_string(),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No samples found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
        OutputFormat::Plain => {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    println!("---");
                }
                let row = item.row();
                for (header, value) in T::headers().iter().zip(row.iter()) {
                    println!("{}: {}", header, value);
                }
            }
        }
    }
}

/// Print the outcome of a suite run
pub fn print_summary(summary: &SuiteSummary, format: OutputFormat) {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        return;
    }

    print_list(&summary.results, format);
    let line = format!(
        "{} matched, {} mismatched, {} errored ({} ms)",
        summary.matched, summary.mismatched, summary.errored, summary.duration_ms
    );
    if summary.is_success() {
        print_success(&line);
    } else {
        print_error(&line);
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}
