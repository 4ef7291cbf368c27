//! Output formatters for templar-explain
//!
//! Colored text for terminals, JSON for tooling.

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use crate::report::{BmmReport, ConvReport, InstanceReport, SplitReport};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored text output for terminal
    #[default]
    Text,
    /// JSON output for tooling and CI
    Json,
}

impl OutputFormat {
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

fn header(output: &mut String, kind: &str, title: &str) {
    output.push_str(&format!("{} {}\n", kind.cyan().bold(), title.white().bold()));
    output.push_str(&"═".repeat(60));
    output.push('\n');
}

/// Format an instance selection as colored text
#[must_use]
pub fn format_instances_text(report: &InstanceReport) -> String {
    let mut output = String::new();
    header(&mut output, "Instances:", &report.catalog);

    output.push_str(&format!(
        "\n{}\n",
        "Request:".white().bold()
    ));
    output.push_str(&format!(
        "  ├── a / b / out: {} / {} / {}\n",
        report.types.a, report.types.b, report.types.output
    ));
    let cap = report
        .cap
        .map_or_else(|| "unbounded".to_string(), |c| c.to_string());
    output.push_str(&format!("  └── cap: {cap} (seed {})\n", report.seed as i64));

    let status = if report.selected.is_empty() {
        "[NONE]".red()
    } else if report.selected.len() < report.candidates {
        "[SAMPLED]".yellow()
    } else {
        "[ALL]".green()
    };
    output.push_str(&format!(
        "\n{}                                    {}\n",
        "Pipeline:".white().bold(),
        status
    ));
    output.push_str(&format!("  ├── expanded catalog: {}\n", report.catalog_size));
    output.push_str(&format!("  ├── dtype matches: {}\n", report.candidates));
    output.push_str(&format!("  └── selected: {}\n", report.selected.len()));

    if !report.selected.is_empty() {
        output.push_str(&format!("\n{}\n", "Selected:".white().bold()));
        let last = report.selected.len() - 1;
        for (i, op) in report.selected.iter().enumerate() {
            let branch = if i == last { "└──" } else { "├──" };
            output.push_str(&format!(
                "  {branch} [{i}] {} {} {}x{}x{} {}\n",
                op.scheduler.green(),
                op.conv_forward_specialization,
                op.tile[0],
                op.tile[1],
                op.tile[2],
                format!("block {}", op.block_size).dimmed()
            ));
        }
    }
    output
}

/// Format a batch split as colored text
#[must_use]
pub fn format_split_text(split: &SplitReport) -> String {
    let mut output = String::new();
    header(
        &mut output,
        "Batch Split:",
        &format!("B={} T={}", split.batch, split.num_threads),
    );

    output.push_str(&format!(
        "\n  ├── single_thread_block: {}\n",
        split.single_thread_block
    ));
    match split.parallel {
        Some(p) => output.push_str(&format!(
            "  ├── {}: [{}, {}) → {} items\n",
            "parallel".green(),
            p.start,
            p.end,
            p.len()
        )),
        None => output.push_str(&format!("  ├── {}: none\n", "parallel".dimmed())),
    }
    output.push_str(&format!(
        "  └── {}: [{}, {}) → {} items\n",
        "serial".yellow(),
        split.serial.start,
        split.serial.end,
        split.serial.len()
    ));
    output
}

/// Format a rendered batched matmul as colored text followed by its source
#[must_use]
pub fn format_bmm_text(report: &BmmReport) -> String {
    let mut output = String::new();
    header(&mut output, "BMM:", &report.kernel);

    let [b, m, n, k] = &report.shape;
    output.push_str(&format!("\n{}\n", "Problem:".white().bold()));
    output.push_str(&format!("  ├── B x M x N x K: {b} x {m} x {n} x {k}\n"));
    output.push_str(&format!(
        "  └── dtype: {} (accumulate {})\n",
        report.dtype, report.compute_dtype
    ));

    output.push_str(&format!("\n{}\n", "Micro-GEMM:".white().bold()));
    output.push_str(&format!("  ├── {}\n", report.micro_gemm.green()));
    let [bm, bn, bk] = report.register_blocking;
    output.push_str(&format!("  ├── register blocking: {bm} x {bn} x {bk}\n"));
    let packing = if report.blocked_weights {
        "blocked".yellow()
    } else {
        "in place".green()
    };
    output.push_str(&format!(
        "  └── weight: {} {} {:?}\n",
        report.layout, packing, report.weight_size
    ));

    output.push('\n');
    output.push_str(&format_split_text(&report.split));
    output.push('\n');
    output.push_str(&report.source);
    output.push('\n');
    output
}

/// Format a rendered convolution as colored text followed by its source
#[must_use]
pub fn format_conv_text(report: &ConvReport) -> String {
    let mut output = String::new();
    header(&mut output, "Conv:", &report.instance.name);
    output.push_str(&format!(
        "\n  ├── candidate {} of {}\n",
        report.index, report.candidates
    ));
    output.push_str(&format!(
        "  └── {} {}\n\n",
        report.instance.scheduler.green(),
        report.instance.conv_forward_specialization
    ));
    output.push_str(&report.source);
    output.push('\n');
    output
}

/// Format any report as pretty JSON
///
/// # Errors
///
/// Returns `serde_json::Error` if serialization fails.
pub fn format_json<T: Serialize>(report: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Write a report to stdout in `format`
///
/// # Errors
///
/// Returns `io::Error` if writing to stdout fails or JSON serialization fails.
pub fn write_report<T, F>(report: &T, format: OutputFormat, text: F) -> io::Result<()>
where
    T: Serialize,
    F: Fn(&T) -> String,
{
    let mut stdout = io::stdout().lock();

    match format {
        OutputFormat::Text => {
            write!(stdout, "{}", text(report))?;
        }
        OutputFormat::Json => {
            let json = format_json(report).map_err(io::Error::other)?;
            writeln!(stdout, "{}", json)?;
        }
    }

    Ok(())
}
