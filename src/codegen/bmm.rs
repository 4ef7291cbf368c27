//! Batched GEMM Template
//!
//! Composes the single-item GEMM body into a batched kernel. The rendered
//! source holds, in order:
//!
//! 1. the microkernel definition
//! 2. `threaded_mm`, the item driver bound to the configured thread count
//! 3. `single_thread_mm`, the same body rendered with one thread
//! 4. the `extern "C"` batching wrapper, the only fragment that addresses the
//!    full `[B, ...]` tensors
//!
//! The wrapper runs the largest thread-count multiple of the batch in a
//! parallel loop and the remainder serially.

use std::fmt;
use std::ops::Range;

use tracing::debug;

use super::kernel::{CppKernel, IndexExpr};
use super::micro_gemm::{GemmBlocking, MicroGemm, MICROKERNEL_DEF};
use super::weights::{blocked_weight_desc, pack_weight, WeightDims};
use super::{
    set_var, DtypeResolver, FakeBufferDtypes, RenderVars, TemplateEngine, GEMM_TEMPLATE,
    INVALID_ARGUMENT_STATUS,
};
use crate::error::{Result, TemplarError};
use crate::tensor::{Dim, TensorDesc};

/// Signature of the multi-threaded item driver
pub const GEMM_THREADED_MM_STUB: &str = r"
void threaded_mm(
    const {{X_dtype}}* X,
    const {{W_dtype}}* W,
    {{Y_dtype}}* Y
    {%- if has_bias %},
    const {{inp_dtype}}* inp
    {%- endif %}
    {%- if is_dynamic_M %},
    const int64_t {{M}}
    {%- endif %}
)";

/// Signature of the single-threaded item driver
pub const GEMM_SINGLE_THREAD_MM_STUB: &str = r"
void single_thread_mm(
    const {{X_dtype}}* X,
    const {{W_dtype}}* W,
    {{Y_dtype}}* Y
    {%- if has_bias %},
    const {{inp_dtype}}* inp
    {%- endif %}
    {%- if is_dynamic_M %},
    const int64_t {{M}}
    {%- endif %}
)";

/// Batching wrapper and kernel entry point
pub const BMM_WRAPPER: &str = r#"
extern "C"
{{kernel_def}}
{
    if (!BX || !BW || !BY{% if has_bias %} || !inp{% endif %}) {
        return {{invalid_argument_status}};
    }
    const int64_t B = {{batch}};
    {%- if num_threads > 1 %}
    constexpr int64_t num_threads = {{num_threads}};
    const int64_t B_single_thread_block = {{single_thread_block}};
    #pragma omp parallel for num_threads({{num_threads}})
    {%- else %}
    const int64_t B_single_thread_block = B;
    {%- endif %}
    for (int64_t b_start = 0; b_start < B_single_thread_block; ++b_start) {
        threaded_mm(
            &{{bx_item}},
            &{{bw_item}},
            &{{by_item}}
            {%- if has_bias %},
            inp
            {%- endif %}
            {%- if is_dynamic_M %},
            {{M}}
            {%- endif %}
        );
    }
    for (int64_t b_start = B_single_thread_block; b_start < B; ++b_start) {
        single_thread_mm(
            &{{bx_item}},
            &{{bw_item}},
            &{{by_item}}
            {%- if has_bias %},
            inp
            {%- endif %}
            {%- if is_dynamic_M %},
            {{M}}
            {%- endif %}
        );
    }
    return 0;
}
"#;

/// Name of the intermediate accumulator buffer
const GEMM_OUT: &str = "GemmOut";

/// How the batching wrapper divides `batch` items between its two loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSplit {
    pub batch: i64,
    pub num_threads: usize,
    /// End of the first loop
    pub single_thread_block: i64,
}

impl BatchSplit {
    /// `batch` is an item count and must be non-negative
    #[must_use]
    pub fn new(batch: i64, num_threads: usize) -> Self {
        let single_thread_block = if num_threads > 1 {
            let t = num_threads as i64;
            (batch / t) * t
        } else {
            batch
        };
        Self {
            batch,
            num_threads,
            single_thread_block,
        }
    }

    /// Indices dispatched by the parallel loop; `None` without a parallel region
    #[must_use]
    pub fn parallel_range(&self) -> Option<Range<i64>> {
        (self.num_threads > 1).then(|| 0..self.single_thread_block)
    }

    /// Indices executed outside any parallel region
    #[must_use]
    pub fn serial_range(&self) -> Range<i64> {
        if self.num_threads > 1 {
            self.single_thread_block..self.batch
        } else {
            0..self.batch
        }
    }
}

/// Elementwise expression applied to each accumulator value `x`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epilogue {
    expr: String,
}

impl Epilogue {
    /// C++ expression over the accumulator variable `x`
    #[must_use]
    pub fn new(expr: impl Into<String>) -> Self {
        Self { expr: expr.into() }
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::new("x")
    }

    /// `max(x, 0)` in the accumulator's type
    #[must_use]
    pub fn relu(acc: &TensorDesc) -> Self {
        Self::new(format!(
            "std::max(x, static_cast<{}>(0))",
            acc.dtype().cpp_type()
        ))
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expr
    }
}

/// Builds the epilogue from the accumulator buffer descriptor
pub type EpilogueCreator = Box<dyn Fn(&TensorDesc) -> Epilogue + Send + Sync>;

/// Batched GEMM kernel template
pub struct BmmTemplate {
    x: TensorDesc,
    w: TensorDesc,
    y: TensorDesc,
    inp: Option<TensorDesc>,
    num_threads: usize,
    micro_gemm: MicroGemm,
    alpha: f64,
    beta: f64,
    epilogue_creator: Option<EpilogueCreator>,
}

impl fmt::Debug for BmmTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BmmTemplate")
            .field("x", &self.x)
            .field("w", &self.w)
            .field("y", &self.y)
            .field("inp", &self.inp)
            .field("num_threads", &self.num_threads)
            .field("micro_gemm", &self.micro_gemm)
            .field("alpha", &self.alpha)
            .field("beta", &self.beta)
            .finish_non_exhaustive()
    }
}

fn require_rank(t: &TensorDesc, rank: usize, what: &str) -> Result<()> {
    if t.rank() == rank {
        Ok(())
    } else {
        Err(TemplarError::InvalidShape(format!(
            "{what} must be rank {rank}, got {}",
            t.rank()
        )))
    }
}

/// The microkernel walks K and N with unit steps; rows may be padded
fn require_unit_inner_stride(t: &TensorDesc, what: &str) -> Result<()> {
    match t.stride(-1)? {
        Dim::Static(1) => Ok(()),
        other => Err(TemplarError::InvalidShape(format!(
            "{what} must have unit stride along its last dimension, got {other}"
        ))),
    }
}

fn static_extent(t: &TensorDesc, dim: isize, what: &str) -> Result<i64> {
    t.size(dim)?
        .as_static()
        .ok_or_else(|| TemplarError::InvalidShape(format!("{what} must be static")))
}

impl BmmTemplate {
    /// Template over `inputs = [X, W]` (plus a `[N]` bias when `has_bias`).
    ///
    /// `X: [B, M, K]`, `W: [B, K, N]`, `output: [B, M, N]`. K and N must be
    /// static; M and B may be symbolic.
    pub fn new(
        inputs: &[TensorDesc],
        output: &TensorDesc,
        num_threads: usize,
        register_blocking: Option<GemmBlocking>,
        has_bias: bool,
    ) -> Result<Self> {
        if num_threads == 0 {
            return Err(TemplarError::InvalidConfig(
                "num_threads must be at least 1".to_string(),
            ));
        }
        let expected = if has_bias { 3 } else { 2 };
        if inputs.len() != expected {
            return Err(TemplarError::InvalidShape(format!(
                "bmm takes {expected} inputs, got {}",
                inputs.len()
            )));
        }

        let x = inputs[0].rename("BX");
        let w = inputs[1].rename("BW");
        let y = output.rename("BY");
        require_rank(&x, 3, "bmm input")?;
        require_rank(&w, 3, "bmm weight")?;
        require_rank(&y, 3, "bmm output")?;
        require_unit_inner_stride(&x, "bmm input")?;
        require_unit_inner_stride(&w, "bmm weight")?;
        require_unit_inner_stride(&y, "bmm output")?;

        let k = static_extent(&x, -1, "K")?;
        if static_extent(&w, -2, "K")? != k {
            return Err(TemplarError::InvalidShape(format!(
                "inner dimensions differ: {k} vs {}",
                w.size(-2)?
            )));
        }
        if static_extent(&w, -1, "N")? != static_extent(&y, -1, "N")? {
            return Err(TemplarError::InvalidShape("weight and output N differ".to_string()));
        }
        if x.size(-2)? != y.size(-2)? {
            return Err(TemplarError::InvalidShape("input and output M differ".to_string()));
        }
        for (dim, what) in [(0, "batch"), (-2, "M")] {
            if let Some(extent) = y.size(dim)?.as_static().filter(|&e| e < 0) {
                return Err(TemplarError::InvalidShape(format!(
                    "{what} must be non-negative, got {extent}"
                )));
            }
        }

        let inp = match inputs.get(2) {
            Some(bias) => {
                require_rank(bias, 1, "bias")?;
                require_unit_inner_stride(bias, "bias")?;
                Some(bias.rename("inp"))
            }
            None => None,
        };

        let mut micro_gemm = MicroGemm::select(x.dtype())?;
        if let Some(blocking) = register_blocking {
            micro_gemm = micro_gemm.with_blocking(blocking)?;
        }

        Ok(Self {
            x,
            w,
            y,
            inp,
            num_threads,
            micro_gemm,
            alpha: 1.0,
            beta: 1.0,
            epilogue_creator: None,
        })
    }

    /// Scale factors of `alpha * X @ W + beta * inp`
    #[must_use]
    pub fn with_scaling(mut self, alpha: f64, beta: f64) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    #[must_use]
    pub fn with_epilogue_creator(mut self, creator: EpilogueCreator) -> Self {
        self.epilogue_creator = Some(creator);
        self
    }

    #[must_use]
    pub fn micro_gemm(&self) -> &MicroGemm {
        &self.micro_gemm
    }

    #[must_use]
    pub const fn num_threads(&self) -> usize {
        self.num_threads
    }

    #[must_use]
    pub const fn has_bias(&self) -> bool {
        self.inp.is_some()
    }

    /// Whether the weight must be packed into the blocked layout
    #[must_use]
    pub const fn should_block_weights(&self) -> bool {
        !self.micro_gemm.b_layout().is_normal()
    }

    /// Pack host weight data into the layout the rendered kernel reads.
    ///
    /// Row-major weights are used in place.
    pub fn prep_weight<T: Copy + Default>(&self, data: &[T]) -> Result<Vec<T>> {
        if !self.should_block_weights() {
            return Ok(data.to_vec());
        }
        let dims = WeightDims {
            batch: usize::try_from(static_extent(&self.w, 0, "weight batch")?)
                .map_err(|e| TemplarError::InvalidShape(e.to_string()))?,
            k: usize::try_from(static_extent(&self.w, 1, "K")?)
                .map_err(|e| TemplarError::InvalidShape(e.to_string()))?,
            n: usize::try_from(static_extent(&self.w, 2, "N")?)
                .map_err(|e| TemplarError::InvalidShape(e.to_string()))?,
        };
        pack_weight(data, dims, &self.micro_gemm)
    }

    /// Weight descriptor as the wrapper addresses it
    pub fn weight_desc(&self) -> Result<TensorDesc> {
        if self.should_block_weights() {
            blocked_weight_desc(&self.w, self.micro_gemm.register_blocking().block_n)
        } else {
            Ok(self.w.clone())
        }
    }

    /// Wrapper loop split for a static batch size
    #[must_use]
    pub fn batch_split(&self) -> Option<BatchSplit> {
        self.y
            .size(0)
            .ok()
            .and_then(Dim::as_static)
            .map(|b| BatchSplit::new(b, self.num_threads))
    }

    /// Buffers that exist only inside the generated code
    #[must_use]
    pub fn fake_buffers(&self) -> FakeBufferDtypes {
        FakeBufferDtypes::new().with(GEMM_OUT, self.micro_gemm.compute_dtype())
    }

    /// Substitution variables shared by the four fragments
    pub fn options(&self, kernel: &CppKernel, dtypes: &dyn DtypeResolver) -> Result<RenderVars> {
        let bx = &self.x;
        let bw = self.weight_desc()?;
        let by = &self.y;

        // single-item views for the inherited body
        let x = bx.select(0, 0)?.rename("X");
        let w = bw.select(0, 0)?.rename("W");
        let y = by.select(0, 0)?.rename("Y");
        let gemm_out = TensorDesc::contiguous(GEMM_OUT, y.dtype(), y.sizes().to_vec());

        let epilogue = self
            .epilogue_creator
            .as_ref()
            .map_or_else(Epilogue::identity, |create| {
                create(&gemm_out.with_dtype(dtypes.dtype_of(&gemm_out)))
            });

        let block_n = self.micro_gemm.register_blocking().block_n;
        let ldb = if self.should_block_weights() {
            block_n.to_string()
        } else {
            kernel.stride(&w, -2)?
        };

        let mut inputs = vec![bx, &bw];
        if let Some(inp) = &self.inp {
            inputs.push(inp);
        }
        let kernel_def = kernel.def_kernel(&inputs, &[by], dtypes);

        let batch = kernel.size(by, 0)?;
        let single_thread_block = match self.batch_split() {
            Some(split) => split.single_thread_block.to_string(),
            None => "(B / num_threads) * num_threads".to_string(),
        };

        let item = |t: &TensorDesc| {
            let mut coords = vec![IndexExpr::from("b_start")];
            coords.resize(t.rank(), IndexExpr::Const(0));
            kernel.index(t, &coords)
        };

        let mut vars = RenderVars::new();
        set_var(&mut vars, "micro_gemm", self.micro_gemm.template_vars());
        set_var(&mut vars, "kernel_def", kernel_def);
        set_var(&mut vars, "num_threads", self.num_threads);
        set_var(&mut vars, "invalid_argument_status", INVALID_ARGUMENT_STATUS);
        set_var(&mut vars, "X_dtype", dtypes.dtype_of(&x).cpp_type());
        set_var(&mut vars, "W_dtype", dtypes.dtype_of(&w).cpp_type());
        set_var(&mut vars, "Y_dtype", dtypes.dtype_of(&y).cpp_type());
        set_var(&mut vars, "is_dynamic_M", gemm_out.size(-2)?.is_dynamic());
        set_var(&mut vars, "M", kernel.size(&gemm_out, -2)?);
        set_var(&mut vars, "N", kernel.size(&gemm_out, -1)?);
        set_var(&mut vars, "K", kernel.size(&x, -1)?);
        set_var(&mut vars, "lda", kernel.stride(&x, -2)?);
        set_var(&mut vars, "ldb", ldb);
        set_var(&mut vars, "ldy", kernel.stride(&y, -2)?);
        set_var(&mut vars, "should_block_weights", self.should_block_weights());
        set_var(&mut vars, "has_bias", self.inp.is_some());
        if let Some(inp) = &self.inp {
            set_var(&mut vars, "inp_dtype", dtypes.dtype_of(inp).cpp_type());
        }
        set_var(&mut vars, "alpha", self.alpha);
        set_var(&mut vars, "beta", self.beta);
        set_var(&mut vars, "epilogue", epilogue.expression());
        set_var(&mut vars, "batch", batch);
        set_var(&mut vars, "single_thread_block", single_thread_block);
        set_var(&mut vars, "bx_item", item(bx)?);
        set_var(&mut vars, "bw_item", item(&bw)?);
        set_var(&mut vars, "by_item", item(by)?);
        Ok(vars)
    }

    /// Render the complete batched kernel source.
    ///
    /// `dtype_override` applies to this call only, on top of the template's
    /// own intermediate buffers.
    pub fn render(
        &self,
        kernel: &CppKernel,
        engine: &dyn TemplateEngine,
        dtype_override: Option<&FakeBufferDtypes>,
    ) -> Result<String> {
        let dtypes = match dtype_override {
            Some(extra) => self.fake_buffers().merged(extra),
            None => self.fake_buffers(),
        };
        let vars = self.options(kernel, &dtypes)?;

        let mut result = engine.render(MICROKERNEL_DEF, &vars)?;
        result += &engine.render(&format!("{GEMM_THREADED_MM_STUB}{GEMM_TEMPLATE}"), &vars)?;

        let mut single = vars.clone();
        set_var(&mut single, "num_threads", 1);
        result += &engine.render(
            &format!("{GEMM_SINGLE_THREAD_MM_STUB}{GEMM_TEMPLATE}"),
            &single,
        )?;

        result += &engine.render(BMM_WRAPPER, &vars)?;

        debug!(
            kernel = kernel.name(),
            micro_gemm = self.micro_gemm.name(),
            num_threads = self.num_threads,
            blocked = self.should_block_weights(),
            "rendered bmm kernel"
        );
        Ok(result)
    }
}
