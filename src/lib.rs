//! Templar: Kernel-Template Instantiation
//!
//! **Templar** turns a library of kernel-template declarations into concrete,
//! selectable kernel instances and renders batched kernel source:
//!
//! 1. **Catalog** - parse CK `DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3`
//!    declarations into [`ConvInstance`] records
//! 2. **Expansion** - replace placeholder fields with every value of their domain
//! 3. **Selection** - filter by operand dtypes, then sample with a fixed seed
//! 4. **Rendering** - compose a single-item GEMM template into a batched kernel
//!
//! # Design Principles
//!
//! - **Fail fast on catalog drift**: a malformed declaration rejects the catalog
//! - **Reproducible builds**: expansion order and sampling are deterministic
//! - **No global patching**: dtype overrides are passed to each render call
//!
//! # Quick Start
//!
//! ```rust
//! use templar::catalog::parse_instances;
//! use templar::expand::expand_instances;
//! use templar::select::{choose_instances, OperandTypes};
//! use templar::DataType;
//!
//! let line = "DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3<2, NHWGC, GKYXC, Empty_Tuple, \
//!     NHWGK, F16, F16, F32, F16, Empty_Tuple, F16, PassThrough, PassThrough, PassThrough, \
//!     ConvSpec, GemmMNKPadding, 256, 128, 128, 32, 8, 8, 32, 32, 2, 2, S<4, 64, 1>, \
//!     S<1, 0, 2>, S<1, 0, 2>, 2, 8, 8, 0, S<4, 64, 1>, S<1, 0, 2>, S<1, 0, 2>, 2, 8, 8, 0, \
//!     1, 1, S<1, 32, 1, 8>, 8, BlkGemmPipeSched, BlockGemmPipelineVersion::v3>";
//!
//! let parsed = parse_instances([line]).unwrap();
//! let library = expand_instances(parsed);
//! assert_eq!(library.len(), 8);
//!
//! let f16 = OperandTypes::new(DataType::F16, DataType::F16, DataType::F16);
//! let chosen = choose_instances(&library, &f16, Some(3));
//! assert_eq!(chosen.len(), 3);
//! ```

// Allow doc markdown for C++ identifiers in docs
#![allow(clippy::doc_markdown)]
// Allow missing errors doc - every fallible function returns `TemplarError`
#![allow(clippy::missing_errors_doc)]
// Allow possible truncation - tensor extents fit in i64/usize
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
// Allow format push string - not a critical performance path
#![allow(clippy::format_push_string)]
// Allow module name repetitions (e.g. `catalog::CatalogCache`)
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod codegen;
pub mod config;
pub mod dtype;
pub mod error;
pub mod expand;
pub mod instance;
pub mod select;
pub mod tensor;

pub use codegen::{BmmTemplate, ConvTemplate, CppKernel, JinjaEngine, TemplateEngine};
pub use config::TemplarConfig;
pub use dtype::DataType;
pub use error::{Result, TemplarError};
pub use instance::ConvInstance;
pub use select::{OperandTypes, SAMPLE_SEED};
pub use tensor::{Dim, TensorDesc};
