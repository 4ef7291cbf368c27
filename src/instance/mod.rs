//! Convolution Template Instance Records
//!
//! A [`ConvInstance`] is one parameterization of CK's
//! `DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3` device operation: operand
//! layouts and dtypes, elementwise operators, specializations, tiling and
//! vector-transfer parameters, and the block-GEMM pipeline.
//!
//! Records are built once by the catalog parser and never mutated; the
//! expansion engine produces new records with `..instance.clone()` updates.

mod args;

pub use args::TemplateArg;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TemplarError};
use args::ArgCursor;

/// Placeholder for the block-GEMM pipeline scheduler
pub const SCHEDULER_PLACEHOLDER: &str = "BlkGemmPipeSched";

/// Placeholder for the convolution forward specialization
pub const CONV_SPEC_PLACEHOLDER: &str = "ConvSpec";

/// Positional arguments every declaration carries
pub const REQUIRED_ARGS: usize = 46;

/// Positional arguments including the two optional compute dtypes
pub const MAX_ARGS: usize = 48;

/// One concrete or partially templated convolution kernel instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvInstance {
    pub n_dim_spatial: i64,
    pub a_layout: String,
    pub b_layout: String,
    pub ds_layout: Vec<String>,
    pub e_layout: String,
    pub a_element_dtype: String,
    pub b_element_dtype: String,
    pub acc_dtype: String,
    pub c_shuffle_dtype: String,
    pub ds_element_dtype: Vec<String>,
    pub e_element_dtype: String,
    pub a_elementwise_op: String,
    pub b_elementwise_op: String,
    pub cde_elementwise_op: String,
    /// May hold [`CONV_SPEC_PLACEHOLDER`]
    pub conv_forward_specialization: String,
    pub gemm_specialization: String,

    pub block_size: i64,
    pub m_per_block: i64,
    pub n_per_block: i64,
    pub k_per_block: i64,
    pub ak1: i64,
    pub bk1: i64,
    pub m_per_xdl: i64,
    pub n_per_xdl: i64,
    pub m_xdl_per_wave: i64,
    pub n_xdl_per_wave: i64,
    pub a_block_transfer_thread_cluster_lengths_ak0_m_ak1: [i64; 3],
    pub a_block_transfer_thread_cluster_arrange_order: [i64; 3],
    pub a_block_transfer_src_access_order: [i64; 3],
    pub a_block_transfer_src_vector_dim: i64,
    pub a_block_transfer_src_scalar_per_vector: i64,
    pub a_block_transfer_dst_scalar_per_vector_ak1: i64,
    pub a_block_lds_extra_m: bool,

    pub b_block_transfer_thread_cluster_lengths_bk0_n_bk1: [i64; 3],
    pub b_block_transfer_thread_cluster_arrange_order: [i64; 3],
    pub b_block_transfer_src_access_order: [i64; 3],
    pub b_block_transfer_src_vector_dim: i64,
    pub b_block_transfer_src_scalar_per_vector: i64,
    pub b_block_transfer_dst_scalar_per_vector_bk1: i64,
    pub b_block_lds_extra_n: bool,

    pub c_shuffle_m_xdl_per_wave_per_shuffle: i64,
    pub c_shuffle_n_xdl_per_wave_per_shuffle: i64,
    pub cde_block_transfer_cluster_lengths_m_block_m_per_block_n_block_n_per_block: [i64; 4],
    pub cde_block_transfer_scalar_per_vector_n_per_block: i64,
    /// May hold [`SCHEDULER_PLACEHOLDER`]
    pub block_gemm_pipeline_scheduler: String,
    pub block_gemm_pipeline_version: String,

    pub a_compute_dtype: Option<String>,
    pub b_compute_dtype: Option<String>,
}

/// Borrowed view of one field's value, in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Int(i64),
    Bool(bool),
    Str(&'a str),
    Tuple(&'a [i64]),
    List(&'a [String]),
    Optional(Option<&'a str>),
}

impl FieldValue<'_> {
    /// C++ template-argument spelling; `None` for absent optional fields
    #[must_use]
    pub fn template_argument(&self) -> Option<String> {
        match self {
            Self::Int(v) => Some(v.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Str(s) => Some((*s).to_string()),
            Self::Tuple(items) => {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                Some(format!("S<{}>", joined.join(", ")))
            }
            Self::List(items) => Some(format!("ck::Tuple<{}>", items.join(", "))),
            Self::Optional(value) => value.map(str::to_string),
        }
    }
}

/// Key spelling: tuples and lists `x`-joined, `:` dropped from identifiers
impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::Str(s) => f.write_str(&s.replace(':', "")),
            Self::Tuple(items) => {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&joined.join("x"))
            }
            Self::List(items) => f.write_str(&items.join("x")),
            Self::Optional(Some(s)) => f.write_str(&s.replace(':', "")),
            Self::Optional(None) => f.write_str("None"),
        }
    }
}

impl ConvInstance {
    /// Build a record from its positional argument list.
    ///
    /// Accepts [`REQUIRED_ARGS`] to [`MAX_ARGS`] arguments; any other count is
    /// a catalog format drift and fails.
    pub fn from_template_args(args: Vec<TemplateArg>) -> Result<Self> {
        if !(REQUIRED_ARGS..=MAX_ARGS).contains(&args.len()) {
            return Err(TemplarError::ArgumentCount {
                expected: format!("{REQUIRED_ARGS}..={MAX_ARGS}"),
                found: args.len(),
            });
        }

        let mut c = ArgCursor::new(args);
        Ok(Self {
            n_dim_spatial: c.int("n_dim_spatial")?,
            a_layout: c.string("a_layout")?,
            b_layout: c.string("b_layout")?,
            ds_layout: c.list("ds_layout")?,
            e_layout: c.string("e_layout")?,
            a_element_dtype: c.string("a_element_dtype")?,
            b_element_dtype: c.string("b_element_dtype")?,
            acc_dtype: c.string("acc_dtype")?,
            c_shuffle_dtype: c.string("c_shuffle_dtype")?,
            ds_element_dtype: c.list("ds_element_dtype")?,
            e_element_dtype: c.string("e_element_dtype")?,
            a_elementwise_op: c.string("a_elementwise_op")?,
            b_elementwise_op: c.string("b_elementwise_op")?,
            cde_elementwise_op: c.string("cde_elementwise_op")?,
            conv_forward_specialization: c.string("conv_forward_specialization")?,
            gemm_specialization: c.string("gemm_specialization")?,
            block_size: c.int("block_size")?,
            m_per_block: c.int("m_per_block")?,
            n_per_block: c.int("n_per_block")?,
            k_per_block: c.int("k_per_block")?,
            ak1: c.int("ak1")?,
            bk1: c.int("bk1")?,
            m_per_xdl: c.int("m_per_xdl")?,
            n_per_xdl: c.int("n_per_xdl")?,
            m_xdl_per_wave: c.int("m_xdl_per_wave")?,
            n_xdl_per_wave: c.int("n_xdl_per_wave")?,
            a_block_transfer_thread_cluster_lengths_ak0_m_ak1: c
                .tuple("a_block_transfer_thread_cluster_lengths_ak0_m_ak1")?,
            a_block_transfer_thread_cluster_arrange_order: c
                .tuple("a_block_transfer_thread_cluster_arrange_order")?,
            a_block_transfer_src_access_order: c.tuple("a_block_transfer_src_access_order")?,
            a_block_transfer_src_vector_dim: c.int("a_block_transfer_src_vector_dim")?,
            a_block_transfer_src_scalar_per_vector: c
                .int("a_block_transfer_src_scalar_per_vector")?,
            a_block_transfer_dst_scalar_per_vector_ak1: c
                .int("a_block_transfer_dst_scalar_per_vector_ak1")?,
            a_block_lds_extra_m: c.flag("a_block_lds_extra_m")?,
            b_block_transfer_thread_cluster_lengths_bk0_n_bk1: c
                .tuple("b_block_transfer_thread_cluster_lengths_bk0_n_bk1")?,
            b_block_transfer_thread_cluster_arrange_order: c
                .tuple("b_block_transfer_thread_cluster_arrange_order")?,
            b_block_transfer_src_access_order: c.tuple("b_block_transfer_src_access_order")?,
            b_block_transfer_src_vector_dim: c.int("b_block_transfer_src_vector_dim")?,
            b_block_transfer_src_scalar_per_vector: c
                .int("b_block_transfer_src_scalar_per_vector")?,
            b_block_transfer_dst_scalar_per_vector_bk1: c
                .int("b_block_transfer_dst_scalar_per_vector_bk1")?,
            b_block_lds_extra_n: c.flag("b_block_lds_extra_n")?,
            c_shuffle_m_xdl_per_wave_per_shuffle: c
                .int("c_shuffle_m_xdl_per_wave_per_shuffle")?,
            c_shuffle_n_xdl_per_wave_per_shuffle: c
                .int("c_shuffle_n_xdl_per_wave_per_shuffle")?,
            cde_block_transfer_cluster_lengths_m_block_m_per_block_n_block_n_per_block: c
                .tuple("cde_block_transfer_cluster_lengths_m_block_m_per_block_n_block_n_per_block")?,
            cde_block_transfer_scalar_per_vector_n_per_block: c
                .int("cde_block_transfer_scalar_per_vector_n_per_block")?,
            block_gemm_pipeline_scheduler: c.string("block_gemm_pipeline_scheduler")?,
            block_gemm_pipeline_version: c.string("block_gemm_pipeline_version")?,
            a_compute_dtype: c.optional_string("a_compute_dtype")?,
            b_compute_dtype: c.optional_string("b_compute_dtype")?,
        })
    }

    /// Every field in declaration order.
    ///
    /// This list is the single source of truth for identity keys and for the
    /// C++ template-argument rendering.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        use FieldValue::{Bool, Int, List, Optional, Str, Tuple};
        vec![
            ("n_dim_spatial", Int(self.n_dim_spatial)),
            ("a_layout", Str(&self.a_layout)),
            ("b_layout", Str(&self.b_layout)),
            ("ds_layout", List(&self.ds_layout)),
            ("e_layout", Str(&self.e_layout)),
            ("a_element_dtype", Str(&self.a_element_dtype)),
            ("b_element_dtype", Str(&self.b_element_dtype)),
            ("acc_dtype", Str(&self.acc_dtype)),
            ("c_shuffle_dtype", Str(&self.c_shuffle_dtype)),
            ("ds_element_dtype", List(&self.ds_element_dtype)),
            ("e_element_dtype", Str(&self.e_element_dtype)),
            ("a_elementwise_op", Str(&self.a_elementwise_op)),
            ("b_elementwise_op", Str(&self.b_elementwise_op)),
            ("cde_elementwise_op", Str(&self.cde_elementwise_op)),
            ("conv_forward_specialization", Str(&self.conv_forward_specialization)),
            ("gemm_specialization", Str(&self.gemm_specialization)),
            ("block_size", Int(self.block_size)),
            ("m_per_block", Int(self.m_per_block)),
            ("n_per_block", Int(self.n_per_block)),
            ("k_per_block", Int(self.k_per_block)),
            ("ak1", Int(self.ak1)),
            ("bk1", Int(self.bk1)),
            ("m_per_xdl", Int(self.m_per_xdl)),
            ("n_per_xdl", Int(self.n_per_xdl)),
            ("m_xdl_per_wave", Int(self.m_xdl_per_wave)),
            ("n_xdl_per_wave", Int(self.n_xdl_per_wave)),
            (
                "a_block_transfer_thread_cluster_lengths_ak0_m_ak1",
                Tuple(&self.a_block_transfer_thread_cluster_lengths_ak0_m_ak1),
            ),
            (
                "a_block_transfer_thread_cluster_arrange_order",
                Tuple(&self.a_block_transfer_thread_cluster_arrange_order),
            ),
            (
                "a_block_transfer_src_access_order",
                Tuple(&self.a_block_transfer_src_access_order),
            ),
            (
                "a_block_transfer_src_vector_dim",
                Int(self.a_block_transfer_src_vector_dim),
            ),
            (
                "a_block_transfer_src_scalar_per_vector",
                Int(self.a_block_transfer_src_scalar_per_vector),
            ),
            (
                "a_block_transfer_dst_scalar_per_vector_ak1",
                Int(self.a_block_transfer_dst_scalar_per_vector_ak1),
            ),
            ("a_block_lds_extra_m", Bool(self.a_block_lds_extra_m)),
            (
                "b_block_transfer_thread_cluster_lengths_bk0_n_bk1",
                Tuple(&self.b_block_transfer_thread_cluster_lengths_bk0_n_bk1),
            ),
            (
                "b_block_transfer_thread_cluster_arrange_order",
                Tuple(&self.b_block_transfer_thread_cluster_arrange_order),
            ),
            (
                "b_block_transfer_src_access_order",
                Tuple(&self.b_block_transfer_src_access_order),
            ),
            (
                "b_block_transfer_src_vector_dim",
                Int(self.b_block_transfer_src_vector_dim),
            ),
            (
                "b_block_transfer_src_scalar_per_vector",
                Int(self.b_block_transfer_src_scalar_per_vector),
            ),
            (
                "b_block_transfer_dst_scalar_per_vector_bk1",
                Int(self.b_block_transfer_dst_scalar_per_vector_bk1),
            ),
            ("b_block_lds_extra_n", Bool(self.b_block_lds_extra_n)),
            (
                "c_shuffle_m_xdl_per_wave_per_shuffle",
                Int(self.c_shuffle_m_xdl_per_wave_per_shuffle),
            ),
            (
                "c_shuffle_n_xdl_per_wave_per_shuffle",
                Int(self.c_shuffle_n_xdl_per_wave_per_shuffle),
            ),
            (
                "cde_block_transfer_cluster_lengths_m_block_m_per_block_n_block_n_per_block",
                Tuple(&self.cde_block_transfer_cluster_lengths_m_block_m_per_block_n_block_n_per_block),
            ),
            (
                "cde_block_transfer_scalar_per_vector_n_per_block",
                Int(self.cde_block_transfer_scalar_per_vector_n_per_block),
            ),
            (
                "block_gemm_pipeline_scheduler",
                Str(&self.block_gemm_pipeline_scheduler),
            ),
            (
                "block_gemm_pipeline_version",
                Str(&self.block_gemm_pipeline_version),
            ),
            ("a_compute_dtype", Optional(self.a_compute_dtype.as_deref())),
            ("b_compute_dtype", Optional(self.b_compute_dtype.as_deref())),
        ]
    }

    /// Identity key: unique per distinct parameter set, stable across runs
    #[must_use]
    pub fn key_name(&self) -> String {
        self.fields()
            .into_iter()
            .map(|(name, value)| format!("K{}V{}", name.replace('_', "").to_lowercase(), value))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// C++ alias for the instance
    #[must_use]
    pub fn name(&self) -> String {
        format!(
            "ck_device_grouped_convolution_fwd_multiple_abd_xdl_c_shuffle_v3_{}",
            self.key_name()
        )
    }

    /// Template arguments in declaration order, absent optionals omitted
    #[must_use]
    pub fn template_arguments(&self) -> Vec<String> {
        self.fields()
            .iter()
            .filter_map(|(_, value)| value.template_argument())
            .collect()
    }

    /// True once neither placeholder-capable field holds its placeholder
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.ensure_concrete().is_ok()
    }

    /// Fail with the first unresolved placeholder, if any
    pub fn ensure_concrete(&self) -> Result<()> {
        if self.block_gemm_pipeline_scheduler == SCHEDULER_PLACEHOLDER {
            return Err(TemplarError::UnresolvedPlaceholder {
                field: "block_gemm_pipeline_scheduler",
                value: self.block_gemm_pipeline_scheduler.clone(),
            });
        }
        if self.conv_forward_specialization == CONV_SPEC_PLACEHOLDER {
            return Err(TemplarError::UnresolvedPlaceholder {
                field: "conv_forward_specialization",
                value: self.conv_forward_specialization.clone(),
            });
        }
        Ok(())
    }
}
