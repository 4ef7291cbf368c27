//! Report builders
//!
//! Each subcommand turns its arguments into one serializable report; the
//! output module only formats them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use templar::catalog::{collect_catalog_lines, parse_instances};
use templar::codegen::weights::padded_weight_size;
use templar::codegen::{BatchSplit, ConvParams, JinjaEngine};
use templar::expand::expand_instances;
use templar::select::{choose_instances, filter_instances};
use templar::{
    BmmTemplate, ConvInstance, ConvTemplate, CppKernel, DataType, Dim, OperandTypes, TensorDesc,
    SAMPLE_SEED,
};

use crate::error::{ExplainError, Result};

/// Condensed view of one catalog instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub name: String,
    pub block_size: i64,
    /// `[m_per_block, n_per_block, k_per_block]`
    pub tile: [i64; 3],
    pub scheduler: String,
    pub conv_forward_specialization: String,
    pub pipeline_version: String,
}

impl From<&ConvInstance> for InstanceSummary {
    fn from(op: &ConvInstance) -> Self {
        Self {
            name: op.name(),
            block_size: op.block_size,
            tile: [op.m_per_block, op.n_per_block, op.k_per_block],
            scheduler: op.block_gemm_pipeline_scheduler.clone(),
            conv_forward_specialization: op.conv_forward_specialization.clone(),
            pipeline_version: op.block_gemm_pipeline_version.clone(),
        }
    }
}

/// Outcome of parse, expand, filter and sample over one catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceReport {
    pub catalog: String,
    pub types: OperandTypes,
    /// Instances after expansion
    pub catalog_size: usize,
    /// Instances whose dtypes match
    pub candidates: usize,
    pub cap: Option<usize>,
    pub seed: u64,
    pub selected: Vec<InstanceSummary>,
}

/// Parse and expand every declaration below `path` (a directory or one file)
pub fn load_catalog(path: &Path) -> Result<Vec<ConvInstance>> {
    if !path.exists() {
        return Err(ExplainError::CatalogNotFound(path.display().to_string()));
    }
    let lines = collect_catalog_lines(path)?;
    let parsed = parse_instances(lines.iter().map(String::as_str))?;
    debug!(path = %path.display(), declarations = parsed.len(), "loaded catalog");
    Ok(expand_instances(parsed))
}

/// Run the instance pipeline against the catalog at `path`
pub fn explain_instances(
    path: &Path,
    types: OperandTypes,
    cap: Option<usize>,
) -> Result<InstanceReport> {
    let library = load_catalog(path)?;
    let candidates = filter_instances(&library, &types).len();
    let chosen = choose_instances(&library, &types, cap);

    Ok(InstanceReport {
        catalog: path.display().to_string(),
        types,
        catalog_size: library.len(),
        candidates,
        cap,
        seed: SAMPLE_SEED,
        selected: chosen.iter().map(InstanceSummary::from).collect(),
    })
}

/// Half-open index range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: i64,
    pub end: i64,
}

impl Span {
    #[must_use]
    pub const fn len(&self) -> i64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl From<std::ops::Range<i64>> for Span {
    fn from(r: std::ops::Range<i64>) -> Self {
        Self {
            start: r.start,
            end: r.end,
        }
    }
}

/// How the batching wrapper divides a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitReport {
    pub batch: i64,
    pub num_threads: usize,
    pub single_thread_block: i64,
    /// Loop dispatched to the thread team; absent with one thread
    pub parallel: Option<Span>,
    pub serial: Span,
}

impl From<BatchSplit> for SplitReport {
    fn from(split: BatchSplit) -> Self {
        Self {
            batch: split.batch,
            num_threads: split.num_threads,
            single_thread_block: split.single_thread_block,
            parallel: split.parallel_range().map(Span::from),
            serial: split.serial_range().into(),
        }
    }
}

#[must_use]
pub fn explain_split(batch: i64, num_threads: usize) -> SplitReport {
    BatchSplit::new(batch, num_threads).into()
}

/// Batched matmul to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmmRequest {
    pub batch: i64,
    pub m: i64,
    pub n: i64,
    pub k: i64,
    pub dtype: DataType,
    pub num_threads: usize,
    /// Render M as the size variable `s0`
    pub dynamic_m: bool,
    pub bias: bool,
}

/// Rendered batched matmul with its layout decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmmReport {
    pub kernel: String,
    pub dtype: DataType,
    pub shape: [String; 4],
    pub micro_gemm: String,
    pub compute_dtype: DataType,
    pub layout: String,
    /// `[block_m, block_n, block_k]`
    pub register_blocking: [i64; 3],
    pub blocked_weights: bool,
    pub weight_size: Vec<i64>,
    pub split: SplitReport,
    pub source: String,
}

impl BmmRequest {
    fn kernel_name(&self) -> String {
        format!("bmm_{}_{}x{}x{}", self.dtype, self.batch, self.k, self.n)
    }

    fn operands(&self) -> (Vec<TensorDesc>, TensorDesc) {
        let b = Dim::Static(self.batch);
        let m = if self.dynamic_m {
            Dim::symbol("s0")
        } else {
            Dim::Static(self.m)
        };
        let x = TensorDesc::contiguous("arg0", self.dtype, vec![b.clone(), m.clone(), self.k.into()]);
        let w = TensorDesc::contiguous("arg1", self.dtype, vec![b.clone(), self.k.into(), self.n.into()]);
        let y = TensorDesc::contiguous("buf0", self.dtype, vec![b, m, self.n.into()]);
        let mut inputs = vec![x, w];
        if self.bias {
            inputs.push(TensorDesc::contiguous("arg2", self.dtype, vec![self.n.into()]));
        }
        (inputs, y)
    }
}

/// Render a batched matmul and describe how it was laid out
pub fn explain_bmm(req: &BmmRequest) -> Result<BmmReport> {
    let (inputs, output) = req.operands();
    let template = BmmTemplate::new(&inputs, &output, req.num_threads, None, req.bias)?;
    let kernel = CppKernel::new(req.kernel_name());
    let source = template.render(&kernel, &JinjaEngine::new(), None)?;

    let micro_gemm = template.micro_gemm();
    let blocking = micro_gemm.register_blocking();
    let blocked = template.should_block_weights();
    let (weight_size, _) = padded_weight_size(req.batch, req.k, req.n, blocking.block_n, blocked);
    let m = if req.dynamic_m {
        "s0".to_string()
    } else {
        req.m.to_string()
    };

    Ok(BmmReport {
        kernel: kernel.name().to_string(),
        dtype: req.dtype,
        shape: [req.batch.to_string(), m, req.n.to_string(), req.k.to_string()],
        micro_gemm: micro_gemm.name().to_string(),
        compute_dtype: micro_gemm.compute_dtype(),
        layout: format!("{:?}", micro_gemm.b_layout()),
        register_blocking: [blocking.block_m, blocking.block_n, blocking.block_k],
        blocked_weights: blocked,
        weight_size,
        split: explain_split(req.batch, req.num_threads),
        source,
    })
}

/// Convolution to render from a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvRequest {
    pub dtype: DataType,
    /// Position in the filtered candidate list
    pub index: usize,
    /// Input `[N, C, H, W]`
    pub input: [i64; 4],
    pub out_channels: i64,
    pub kernel_size: i64,
    pub params: ConvParams,
}

impl ConvRequest {
    fn output_extent(&self, size: i64, axis: usize) -> i64 {
        let p = &self.params;
        (size + 2 * p.padding[axis] - p.dilation[axis] * (self.kernel_size - 1) - 1) / p.stride[axis]
            + 1
    }

    fn operands(&self) -> Result<(Vec<TensorDesc>, TensorDesc)> {
        self.params.validate()?;
        let [n, c, h, w] = self.input;
        let (ho, wo) = (self.output_extent(h, 0), self.output_extent(w, 1));
        if ho < 1 || wo < 1 {
            return Err(templar::TemplarError::InvalidShape(format!(
                "kernel {k}x{k} leaves no output for a {h}x{w} input",
                k = self.kernel_size
            ))
            .into());
        }
        let dims = |v: [i64; 4]| v.iter().map(|&d| Dim::Static(d)).collect::<Vec<_>>();
        let x = TensorDesc::contiguous("X", self.dtype, dims(self.input));
        let weight = TensorDesc::contiguous(
            "W",
            self.dtype,
            dims([
                self.out_channels,
                c / self.params.groups,
                self.kernel_size,
                self.kernel_size,
            ]),
        );
        let y = TensorDesc::contiguous("Y", self.dtype, dims([n, self.out_channels, ho, wo]));
        Ok((vec![x, weight], y))
    }
}

/// Rendered convolution source for one selected instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvReport {
    pub candidates: usize,
    pub index: usize,
    pub instance: InstanceSummary,
    pub source: String,
}

/// Render the convolution for the `index`-th matching instance in `path`
pub fn explain_conv(path: &Path, req: &ConvRequest) -> Result<ConvReport> {
    let library = load_catalog(path)?;
    let (inputs, output) = req.operands()?;
    let template = ConvTemplate::new(&inputs, &output, req.params)?;

    let candidates = template.gen_ops_from(&library, None);
    let op = candidates.get(req.index).ok_or(ExplainError::InstanceIndex {
        index: req.index,
        available: candidates.len(),
    })?;
    let kernel = CppKernel::new(format!("conv_{}_{}", req.dtype, req.index));
    let source = template.render(&kernel, op, &JinjaEngine::new())?;

    Ok(ConvReport {
        candidates: candidates.len(),
        index: req.index,
        instance: op.into(),
        source,
    })
}
