//! CK Grouped Convolution Template
//!
//! Renders one [`ConvInstance`] as a HIP translation unit: CK headers, layout
//! and enum aliases, the instance `using` definition and an `extern "C"`
//! entry point. The entry point refuses arguments the instance cannot handle
//! with a negative status instead of launching.

use tracing::debug;

use super::kernel::CppKernel;
use super::{set_var, RenderVars, TemplateEngine, INVALID_ARGUMENT_STATUS};
use crate::catalog::gen_conv_ops_library;
use crate::config::TemplarConfig;
use crate::error::{Result, TemplarError};
use crate::instance::ConvInstance;
use crate::select::{choose_instances, filter_op, OperandTypes};
use crate::tensor::TensorDesc;

/// Convolution entry point
pub const CONV_TEMPLATE: &str = r#"
{{headers}}
{{globals}}
{{instance_definition}}
extern "C" {
PT_EXPORT {{kernel_definition}} {
    auto conv = {{instance_type}} {};
    auto invoker = conv.MakeInvoker();

    using ck::index_t;

    constexpr index_t NumDTensor = {{NumDTensor}};
    constexpr index_t NDimSpatial = {{NDimSpatial}};

    const void* p_a = X;
    const void* p_b = W;
    const std::array<const void*, NumDTensor> p_ds{};
    void* p_e = Y;
    const std::array<index_t, NDimSpatial + 3> a_g_n_c_wis_lengths{ {{a_lengths}} };
    const std::array<index_t, NDimSpatial + 3> a_g_n_c_wis_strides{ {{a_strides}} };
    const std::array<index_t, NDimSpatial + 3> b_g_k_c_xs_lengths{ {{b_lengths}} };
    const std::array<index_t, NDimSpatial + 3> b_g_k_c_xs_strides{ {{b_strides}} };
    const std::array<std::array<index_t, NDimSpatial + 3>, NumDTensor> ds_g_n_k_wos_lengths{};
    const std::array<std::array<index_t, NDimSpatial + 3>, NumDTensor> ds_g_n_k_wos_strides{};
    const std::array<index_t, NDimSpatial + 3> e_g_n_k_wos_lengths{ {{e_lengths}} };
    const std::array<index_t, NDimSpatial + 3> e_g_n_k_wos_strides{ {{e_strides}} };
    const std::array<index_t, NDimSpatial> conv_filter_strides{ {{conv_filter_strides}} };
    const std::array<index_t, NDimSpatial> conv_filter_dilations{ {{conv_filter_dilations}} };
    const std::array<index_t, NDimSpatial> input_left_pads{ {{input_pads}} };
    const std::array<index_t, NDimSpatial> input_right_pads{ {{input_pads}} };
    const auto a_element_op = {{a_elementwise_op}}{};
    const auto b_element_op = {{b_elementwise_op}}{};
    const auto cde_element_op = {{cde_elementwise_op}}{};

    auto argument = conv.MakeArgument(
        p_a,
        p_b,
        p_ds,
        p_e,
        a_g_n_c_wis_lengths,
        a_g_n_c_wis_strides,
        b_g_k_c_xs_lengths,
        b_g_k_c_xs_strides,
        ds_g_n_k_wos_lengths,
        ds_g_n_k_wos_strides,
        e_g_n_k_wos_lengths,
        e_g_n_k_wos_strides,
        conv_filter_strides,
        conv_filter_dilations,
        input_left_pads,
        input_right_pads,
        a_element_op,
        b_element_op,
        cde_element_op
    );
    if (!conv.IsSupportedArgument(argument)) {
        std::cerr << "invalid argument for conv instance " << conv.GetTypeString() << std::endl;
        argument.Print();
        return {{invalid_argument_status}};
    }
    if (workspace_size) {
        *workspace_size = conv.GetWorkSpaceSize(&argument);
        return 0;
    }
    invoker.Run(argument, StreamConfig{stream, /* time kernel */ false, /* log level */ kDEBUG_LOG});
    return 0;
} // kernel definition
} // extern C
"#;

const CONV_HEADERS: &str = r#"// CK conv headers
#include <array>
#include <iostream>
#include <hip/hip_runtime.h>
#include "ck/ck.hpp"
#include "ck/utility/data_type.hpp"
#include "ck/tensor_operation/gpu/element/element_wise_operation.hpp"
#include "ck/tensor_operation/gpu/device/impl/device_grouped_conv_fwd_multiple_abd_xdl_cshuffle_v3.hpp"
#include "ck/tensor_operation/gpu/device/convolution_forward_specialization.hpp"
#include "ck/tensor_operation/gpu/device/gemm_specialization.hpp""#;

/// Layout tags whose aliases are emitted into every translation unit
const CONV_LAYOUTS: [&str; 34] = [
    "NWC", "NHWC", "NDHWC", "KXC", "KYXC", "KZYXC", "NWK", "NHWK", "NDHWK", "GNWC", "GNHWC",
    "GNDHWC", "GKXC", "GKYXC", "GKZYXC", "GNWK", "GNHWK", "GNDHWK", "NGKW", "NGKHW", "NGKDHW",
    "NWGC", "NHWGC", "NDHWGC", "KXGC", "KYXGC", "KZYXGC", "NWGK", "NHWGK", "NDHWGK", "NGCW",
    "NGCHW", "NGCDHW", "G_K",
];

fn conv_globals() -> String {
    let mut out = String::from(
        "// CK conv globals\n\
         #define PT_EXPORT __attribute__((visibility(\"default\")))\n\n\
         using F8 = ck::f8_t;\n\
         using BF8 = ck::bf8_t;\n\
         using F16 = ck::half_t;\n\
         using BF16 = ck::bhalf_t;\n\
         using F32 = float;\n\
         using F64 = double;\n\
         using I8 = int8_t;\n\
         using I32 = int32_t;\n\
         using Empty_Tuple = ck::Tuple<>;\n\
         using PassThrough = ck::tensor_operation::element_wise::PassThrough;\n\n",
    );
    for layout in CONV_LAYOUTS {
        out.push_str(&format!(
            "using {layout} = ck::tensor_layout::convolution::{layout};\n"
        ));
    }
    out.push_str(
        "\nusing BlockGemmPipelineScheduler = ck::BlockGemmPipelineScheduler;\n\
         using GemmSpecialization = ck::tensor_operation::device::GemmSpecialization;\n\
         using BlockGemmPipelineVersion = ck::BlockGemmPipelineVersion;\n\
         using ConvolutionForwardSpecialization = ck::tensor_operation::device::ConvolutionForwardSpecialization;",
    );
    out
}

/// Convolution hyper-parameters for two spatial dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub stride: [i64; 2],
    pub padding: [i64; 2],
    pub dilation: [i64; 2],
    pub groups: i64,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride: [1, 1],
            padding: [0, 0],
            dilation: [1, 1],
            groups: 1,
        }
    }
}

impl ConvParams {
    /// Positive stride, dilation and groups; non-negative padding
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("stride", self.stride, 1, "positive"),
            ("dilation", self.dilation, 1, "positive"),
            ("padding", self.padding, 0, "non-negative"),
        ];
        for (what, values, min, expected) in checks {
            if values.iter().any(|&v| v < min) {
                return Err(TemplarError::InvalidConfig(format!(
                    "{what} must be {expected}, got {values:?}"
                )));
            }
        }
        if self.groups < 1 {
            return Err(TemplarError::InvalidConfig(format!(
                "groups must be positive, got {}",
                self.groups
            )));
        }
        Ok(())
    }
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Static sizes and strides of a rank-4 `[N, C, H, W]`-ordered descriptor
fn static_dims(t: &TensorDesc) -> Result<([i64; 4], [i64; 4])> {
    if t.rank() != 4 {
        return Err(TemplarError::InvalidShape(format!(
            "{}: 2-D convolution operands are rank 4, got {}",
            t.name(),
            t.rank()
        )));
    }
    let mut sizes = [0; 4];
    let mut strides = [0; 4];
    for i in 0..4 {
        let dim = i as isize;
        let dynamic = || TemplarError::InvalidShape(format!("{}: dynamic shapes", t.name()));
        sizes[i] = t.size(dim)?.as_static().ok_or_else(dynamic)?;
        strides[i] = t.stride(dim)?.as_static().ok_or_else(dynamic)?;
    }
    Ok((sizes, strides))
}

/// Grouped convolution over CK instances
#[derive(Debug, Clone)]
pub struct ConvTemplate {
    x: TensorDesc,
    w: TensorDesc,
    y: TensorDesc,
    params: ConvParams,
}

impl ConvTemplate {
    /// `inputs = [X, W, ...]`; extra inputs are ignored
    pub fn new(inputs: &[TensorDesc], output: &TensorDesc, params: ConvParams) -> Result<Self> {
        let [x, w, ..] = inputs else {
            return Err(TemplarError::InvalidShape(format!(
                "conv takes input and weight, got {} operands",
                inputs.len()
            )));
        };
        params.validate()?;
        Ok(Self {
            x: x.clone(),
            w: w.clone(),
            y: output.clone(),
            params,
        })
    }

    /// Operand dtypes instances must match
    #[must_use]
    pub fn operand_types(&self) -> OperandTypes {
        OperandTypes::from_descriptors(&self.x, &self.w, &self.y)
    }

    /// Keep `op` if it can run this convolution's dtypes
    #[must_use]
    pub fn filter_op<'a>(&self, op: &'a ConvInstance) -> Option<&'a ConvInstance> {
        filter_op(op, &self.operand_types())
    }

    /// Candidates from an explicit library
    #[must_use]
    pub fn gen_ops_from(&self, library: &[ConvInstance], cap: Option<usize>) -> Vec<ConvInstance> {
        choose_instances(library, &self.operand_types(), cap)
    }

    /// Candidates from the process-wide catalog
    pub fn gen_ops(&self, config: &TemplarConfig) -> Result<Vec<ConvInstance>> {
        let library = gen_conv_ops_library(config)?;
        Ok(self.gen_ops_from(&library, config.max_profiling_configs))
    }

    /// Header block of the translation unit
    #[must_use]
    pub fn header(&self) -> &'static str {
        CONV_HEADERS
    }

    /// Alias block of the translation unit
    #[must_use]
    pub fn globals(&self) -> String {
        conv_globals()
    }

    /// `using` declaration naming the instance type
    pub fn instance_definition(&self, op: &ConvInstance) -> Result<String> {
        op.ensure_concrete()?;
        Ok(format!(
            "using {} = ck::tensor_operation::device::DeviceGroupedConvFwdMultipleABD_Xdl_CShuffle_V3<\n    {}>;\n",
            op.name(),
            op.template_arguments().join(",\n    ")
        ))
    }

    fn problem_vars(&self, vars: &mut RenderVars) -> Result<()> {
        let g = self.params.groups;
        let ([n, c, hi, wi], [sn, sc, sh, sw]) = static_dims(&self.x)?;
        let ([k, c_per_g, ky, kx], [sk, swc, sy, sx]) = static_dims(&self.w)?;
        let ([_, ko, ho, wo], [son, sok, soh, sow]) = static_dims(&self.y)?;

        if c != c_per_g * g || k % g != 0 || ko != k {
            return Err(TemplarError::InvalidShape(format!(
                "conv operands disagree: C={c}, C/G={c_per_g}, K={k}, G={g}, output K={ko}"
            )));
        }
        let k_per_g = k / g;

        set_var(vars, "a_lengths", join(&[g, n, c_per_g, hi, wi]));
        set_var(vars, "a_strides", join(&[c_per_g * sc, sn, sc, sh, sw]));
        set_var(vars, "b_lengths", join(&[g, k_per_g, c_per_g, ky, kx]));
        set_var(vars, "b_strides", join(&[k_per_g * sk, sk, swc, sy, sx]));
        set_var(vars, "e_lengths", join(&[g, n, k_per_g, ho, wo]));
        set_var(vars, "e_strides", join(&[k_per_g * sok, son, sok, soh, sow]));
        set_var(vars, "conv_filter_strides", join(&self.params.stride));
        set_var(vars, "conv_filter_dilations", join(&self.params.dilation));
        set_var(vars, "input_pads", join(&self.params.padding));
        Ok(())
    }

    /// Render the translation unit for `op`
    pub fn render(
        &self,
        kernel: &CppKernel,
        op: &ConvInstance,
        engine: &dyn TemplateEngine,
    ) -> Result<String> {
        let instance_definition = self.instance_definition(op)?;

        let mut vars = RenderVars::new();
        set_var(&mut vars, "headers", self.header());
        set_var(&mut vars, "globals", self.globals());
        set_var(&mut vars, "instance_definition", instance_definition);
        set_var(&mut vars, "instance_type", op.name());
        set_var(
            &mut vars,
            "kernel_definition",
            format!(
                "int {}(const void* X, const void* W, void* Y, size_t* workspace_size, hipStream_t stream)",
                kernel.name()
            ),
        );
        set_var(&mut vars, "NumDTensor", op.ds_layout.len());
        set_var(&mut vars, "NDimSpatial", op.n_dim_spatial);
        set_var(&mut vars, "a_elementwise_op", &op.a_elementwise_op);
        set_var(&mut vars, "b_elementwise_op", &op.b_elementwise_op);
        set_var(&mut vars, "cde_elementwise_op", &op.cde_elementwise_op);
        set_var(&mut vars, "invalid_argument_status", INVALID_ARGUMENT_STATUS);
        self.problem_vars(&mut vars)?;

        let source = engine.render(CONV_TEMPLATE, &vars)?;
        debug!(kernel = kernel.name(), instance = %op.key_name(), "rendered ck conv kernel");
        Ok(source)
    }
}
