//! templar-explain CLI
//!
//! Instance selection and kernel source inspection tool

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use templar::codegen::ConvParams;
use templar::{DataType, OperandTypes};
use templar_explain::{
    explain_bmm, explain_conv, explain_instances, explain_split, output, BmmRequest, ConvRequest,
    OutputFormat,
};

#[derive(Parser)]
#[command(name = "templar-explain")]
#[command(author, version, about = "Instance selection and kernel source inspection CLI")]
#[command(long_about = "
Runs the kernel-template instantiation pipeline and shows each stage:

  instances  parse, expand, filter and sample a CK instance catalog
  conv       render the convolution source for one selected instance
  bmm        render a batched matmul (microkernel, drivers, wrapper)
  split      show how the wrapper divides a batch between its loops
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select catalog instances for an operand dtype triple
    Instances {
        /// Catalog directory or header file
        #[arg(long, value_name = "PATH")]
        catalog: PathBuf,

        /// Input activation dtype
        #[arg(long, default_value = "f16")]
        a: DataType,

        /// Weight dtype
        #[arg(long, default_value = "f16")]
        b: DataType,

        /// Output dtype
        #[arg(long, default_value = "f16")]
        out: DataType,

        /// Sampling cap (0 keeps every candidate)
        #[arg(long, value_name = "N")]
        max: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a batched matmul kernel
    Bmm {
        /// Batch size
        #[arg(long, default_value = "4", value_parser = clap::value_parser!(i64).range(0..))]
        batch: i64,

        /// Rows of each item
        #[arg(short = 'm', long, default_value = "64")]
        m: i64,

        /// Columns of each item
        #[arg(short = 'n', long, default_value = "64")]
        n: i64,

        /// Inner dimension
        #[arg(short = 'k', long, default_value = "64")]
        k: i64,

        /// Element dtype
        #[arg(long, default_value = "f32")]
        dtype: DataType,

        /// Threads of the parallel loop
        #[arg(long, default_value = "1")]
        threads: usize,

        /// Treat M as a runtime size
        #[arg(long)]
        dynamic_m: bool,

        /// Add a `[N]` bias
        #[arg(long)]
        bias: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a CK grouped convolution for one catalog instance
    Conv {
        /// Catalog directory or header file
        #[arg(long, value_name = "PATH")]
        catalog: PathBuf,

        /// Element dtype of every operand
        #[arg(long, default_value = "f16")]
        dtype: DataType,

        /// Candidate to render
        #[arg(long, default_value = "0")]
        index: usize,

        /// Input `N,C,H,W`
        #[arg(long, value_delimiter = ',', default_values_t = [1i64, 64, 56, 56])]
        input: Vec<i64>,

        /// Output channels
        #[arg(long, default_value = "64")]
        out_channels: i64,

        /// Square filter size
        #[arg(long, default_value = "3")]
        kernel_size: i64,

        #[arg(long, default_value = "1")]
        stride: i64,

        #[arg(long, default_value = "1")]
        padding: i64,

        #[arg(long, default_value = "1")]
        groups: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Explain the batch split of the wrapper
    Split {
        /// Batch size
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        batch: i64,

        /// Threads of the parallel loop
        #[arg(long)]
        threads: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Instances {
            catalog,
            a,
            b,
            out,
            max,
            json,
        } => {
            let cap = max.filter(|&n| n > 0);
            let report = explain_instances(&catalog, OperandTypes::new(a, b, out), cap)?;
            output::write_report(
                &report,
                OutputFormat::from_json_flag(json),
                output::format_instances_text,
            )?;
        }

        Commands::Bmm {
            batch,
            m,
            n,
            k,
            dtype,
            threads,
            dynamic_m,
            bias,
            json,
        } => {
            let report = explain_bmm(&BmmRequest {
                batch,
                m,
                n,
                k,
                dtype,
                num_threads: threads,
                dynamic_m,
                bias,
            })?;
            output::write_report(
                &report,
                OutputFormat::from_json_flag(json),
                output::format_bmm_text,
            )?;
        }

        Commands::Conv {
            catalog,
            dtype,
            index,
            input,
            out_channels,
            kernel_size,
            stride,
            padding,
            groups,
            json,
        } => {
            let input: [i64; 4] = input
                .try_into()
                .map_err(|v: Vec<i64>| format!("--input takes 4 values, got {}", v.len()))?;
            let request = ConvRequest {
                dtype,
                index,
                input,
                out_channels,
                kernel_size,
                params: ConvParams {
                    stride: [stride; 2],
                    padding: [padding; 2],
                    dilation: [1, 1],
                    groups,
                },
            };
            let report = explain_conv(&catalog, &request)?;
            output::write_report(
                &report,
                OutputFormat::from_json_flag(json),
                output::format_conv_text,
            )?;
        }

        Commands::Split {
            batch,
            threads,
            json,
        } => {
            if threads == 0 {
                return Err("--threads must be at least 1".into());
            }
            let report = explain_split(batch, threads);
            output::write_report(
                &report,
                OutputFormat::from_json_flag(json),
                output::format_split_text,
            )?;
        }
    }

    Ok(())
}
