//! Register-Blocked Micro GEMM
//!
//! Inner kernel computing one `block_m x block_n` output tile. Reduced
//! precision inputs read weights in a VNNI interleaved layout, which
//! requires the weight tensor to be packed ahead of time.

use serde::{Deserialize, Serialize};

use crate::dtype::DataType;
use crate::error::{Result, TemplarError};

/// Physical layout the microkernel expects for the weight operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    /// Row-major `[K, N]`
    Normal,
    /// Pairs of consecutive K rows interleaved per column
    Vnni2,
    /// Quads of consecutive K rows interleaved per column
    Vnni4,
}

impl LayoutType {
    /// Number of K rows interleaved together
    #[must_use]
    pub const fn vnni_size(self) -> i64 {
        match self {
            Self::Normal => 1,
            Self::Vnni2 => 2,
            Self::Vnni4 => 4,
        }
    }

    #[must_use]
    pub const fn is_normal(self) -> bool {
        matches!(self, Self::Normal)
    }
}

/// Register blocking of the microkernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemmBlocking {
    pub block_m: i64,
    pub block_n: i64,
    pub block_k: i64,
}

impl GemmBlocking {
    #[must_use]
    pub const fn new(block_m: i64, block_n: i64, block_k: i64) -> Self {
        Self {
            block_m,
            block_n,
            block_k,
        }
    }
}

/// Selected microkernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroGemm {
    name: String,
    input_dtype: DataType,
    compute_dtype: DataType,
    blocking: GemmBlocking,
    layout: LayoutType,
}

/// Microkernel variables visible to templates
#[derive(Debug, Serialize)]
struct MicroGemmVars<'a> {
    name: &'a str,
    input_t: &'static str,
    compute_t: &'static str,
    block_m: i64,
    block_n: i64,
    block_k: i64,
    vnni_size: i64,
}

impl MicroGemm {
    /// Pick the microkernel for an input dtype
    pub fn select(input_dtype: DataType) -> Result<Self> {
        let (compute_dtype, blocking, layout) = match input_dtype {
            DataType::F32 => (DataType::F32, GemmBlocking::new(4, 16, 1), LayoutType::Normal),
            DataType::F64 => (DataType::F64, GemmBlocking::new(4, 8, 1), LayoutType::Normal),
            DataType::F16 | DataType::BF16 => {
                (DataType::F32, GemmBlocking::new(4, 32, 2), LayoutType::Vnni2)
            }
            DataType::I8 | DataType::U8 => {
                (DataType::I32, GemmBlocking::new(4, 32, 4), LayoutType::Vnni4)
            }
            other => {
                return Err(TemplarError::UnsupportedDtype(format!(
                    "no micro gemm for {other}"
                )))
            }
        };
        let name = format!(
            "cpp_micro_gemm_{}_{}_{}",
            input_dtype.short_name(),
            compute_dtype.short_name(),
            match layout {
                LayoutType::Normal => "normal",
                LayoutType::Vnni2 => "vnni2",
                LayoutType::Vnni4 => "vnni4",
            }
        );
        Ok(Self {
            name,
            input_dtype,
            compute_dtype,
            blocking,
            layout,
        })
    }

    /// Use a different register blocking; every block extent must be positive
    pub fn with_blocking(mut self, blocking: GemmBlocking) -> Result<Self> {
        let GemmBlocking {
            block_m,
            block_n,
            block_k,
        } = blocking;
        if block_m < 1 || block_n < 1 || block_k < 1 {
            return Err(TemplarError::InvalidConfig(format!(
                "register blocking must be positive, got {block_m}x{block_n}x{block_k}"
            )));
        }
        self.blocking = blocking;
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn input_dtype(&self) -> DataType {
        self.input_dtype
    }

    /// Accumulator element type
    #[must_use]
    pub const fn compute_dtype(&self) -> DataType {
        self.compute_dtype
    }

    #[must_use]
    pub const fn register_blocking(&self) -> GemmBlocking {
        self.blocking
    }

    /// Weight layout the kernel reads
    #[must_use]
    pub const fn b_layout(&self) -> LayoutType {
        self.layout
    }

    pub(crate) fn template_vars(&self) -> impl Serialize + '_ {
        MicroGemmVars {
            name: &self.name,
            input_t: self.input_dtype.cpp_type(),
            compute_t: self.compute_dtype.cpp_type(),
            block_m: self.blocking.block_m,
            block_n: self.blocking.block_n,
            block_k: self.blocking.block_k,
            vnni_size: self.layout.vnni_size(),
        }
    }
}

/// Microkernel definition
///
/// `B` points at one `[K, block_n]` weight panel; `ldb` is the panel row pitch
/// in elements.
pub const MICROKERNEL_DEF: &str = r"
template <bool accum>
inline void {{micro_gemm.name}}(
    const {{micro_gemm.input_t}}* __restrict__ A,
    const {{micro_gemm.input_t}}* __restrict__ B,
    {{micro_gemm.compute_t}}* __restrict__ C,
    int64_t M,
    int64_t N,
    int64_t K,
    int64_t lda,
    int64_t ldb,
    int64_t ldc
) {
    for (int64_t m = 0; m < M; ++m) {
        for (int64_t n = 0; n < N; ++n) {
            {{micro_gemm.compute_t}} result = accum ? C[m * ldc + n] : 0;
            for (int64_t k = 0; k < K; ++k) {
                {%- if micro_gemm.vnni_size > 1 %}
                const int64_t b_idx = (k / {{micro_gemm.vnni_size}}) * ldb * {{micro_gemm.vnni_size}} + n * {{micro_gemm.vnni_size}} + k % {{micro_gemm.vnni_size}};
                {%- else %}
                const int64_t b_idx = k * ldb + n;
                {%- endif %}
                result += static_cast<{{micro_gemm.compute_t}}>(A[m * lda + k]) * static_cast<{{micro_gemm.compute_t}}>(B[b_idx]);
            }
            C[m * ldc + n] = result;
        }
    }
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{set_var, JinjaEngine, RenderVars, TemplateEngine};

    #[test]
    fn test_select_by_dtype() {
        assert_eq!(MicroGemm::select(DataType::F32).unwrap().b_layout(), LayoutType::Normal);
        assert_eq!(MicroGemm::select(DataType::BF16).unwrap().b_layout(), LayoutType::Vnni2);
        assert_eq!(MicroGemm::select(DataType::F16).unwrap().b_layout(), LayoutType::Vnni2);
        assert_eq!(MicroGemm::select(DataType::U8).unwrap().b_layout(), LayoutType::Vnni4);
        assert!(MicroGemm::select(DataType::Bool).is_err());
    }

    #[test]
    fn test_compute_dtype_widens() {
        let mg = MicroGemm::select(DataType::BF16).unwrap();
        assert_eq!(mg.compute_dtype(), DataType::F32);
        let mg = MicroGemm::select(DataType::I8).unwrap();
        assert_eq!(mg.compute_dtype(), DataType::I32);
    }

    #[test]
    fn test_with_blocking_rejects_empty_blocks() {
        let mg = MicroGemm::select(DataType::BF16).unwrap();
        for blocking in [
            GemmBlocking::new(4, 0, 2),
            GemmBlocking::new(0, 32, 2),
            GemmBlocking::new(4, 32, -1),
        ] {
            assert!(matches!(
                mg.clone().with_blocking(blocking),
                Err(TemplarError::InvalidConfig(_))
            ));
        }
        let custom = mg.with_blocking(GemmBlocking::new(2, 16, 2)).unwrap();
        assert_eq!(custom.register_blocking().block_n, 16);
    }

    #[test]
    fn test_vnni_size() {
        assert_eq!(LayoutType::Normal.vnni_size(), 1);
        assert_eq!(LayoutType::Vnni2.vnni_size(), 2);
        assert_eq!(LayoutType::Vnni4.vnni_size(), 4);
    }

    #[test]
    fn test_render_normal_definition() {
        let mg = MicroGemm::select(DataType::F32).unwrap();
        let mut vars = RenderVars::new();
        set_var(&mut vars, "micro_gemm", mg.template_vars());
        let src = JinjaEngine::new().render(MICROKERNEL_DEF, &vars).unwrap();
        assert!(src.contains("inline void cpp_micro_gemm_f32_f32_normal("));
        assert!(src.contains("const int64_t b_idx = k * ldb + n;"));
        assert!(!src.contains("k % "));
    }

    #[test]
    fn test_render_vnni_definition() {
        let mg = MicroGemm::select(DataType::BF16).unwrap();
        let mut vars = RenderVars::new();
        set_var(&mut vars, "micro_gemm", mg.template_vars());
        let src = JinjaEngine::new().render(MICROKERNEL_DEF, &vars).unwrap();
        assert!(src.contains("const bfloat16* __restrict__ B"));
        assert!(src.contains("float result"));
        assert!(src.contains("k % 2"));
    }
}
