//! templar-explain: Instance Selection and Kernel Source Inspection CLI
//!
//! Makes the instantiation pipeline visible: which catalog instances survive
//! expansion, filtering and sampling, what source a batched matmul or
//! convolution renders to, and how a batch is split between the parallel and
//! serial loops of the wrapper.
//!
//! # Example
//!
//! ```rust
//! use templar_explain::report::explain_split;
//!
//! let split = explain_split(13, 4);
//! assert_eq!(split.single_thread_block, 12);
//! assert_eq!(split.serial.len(), 1);
//! ```

// Allow some pedantic lints for this CLI tool
#![allow(clippy::cast_possible_wrap)] // Seed is displayed as its signed spelling
#![allow(clippy::format_push_string)] // Performance not critical for CLI
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod output;
pub mod report;

pub use error::{ExplainError, Result};
pub use output::{format_json, OutputFormat};
pub use report::{
    explain_bmm, explain_conv, explain_instances, explain_split, load_catalog, BmmReport,
    BmmRequest, ConvReport, ConvRequest, InstanceReport, InstanceSummary, SplitReport,
};
