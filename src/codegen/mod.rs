//! C++ Kernel Source Generation
//!
//! Renders kernel source text from Jinja-style templates.
//!
//! ## Components
//!
//! - **TemplateEngine**: `render(template, vars) -> text`, backed by `minijinja`
//! - **CppKernel**: entry signatures, indexing and size expressions
//! - **MicroGemm**: register-blocked inner kernel and its weight layout
//! - **BmmTemplate**: batched GEMM (microkernel, two drivers, batching wrapper)
//! - **ConvTemplate**: CK grouped convolution instance source

mod bmm;
mod conv;
mod gemm;
mod kernel;
mod micro_gemm;
pub mod weights;

pub use bmm::{
    BatchSplit, BmmTemplate, Epilogue, EpilogueCreator, BMM_WRAPPER, GEMM_SINGLE_THREAD_MM_STUB,
    GEMM_THREADED_MM_STUB,
};
pub use conv::{ConvParams, ConvTemplate, CONV_TEMPLATE};
pub use gemm::GEMM_TEMPLATE;
pub use kernel::{CppKernel, IndexExpr};
pub use micro_gemm::{GemmBlocking, LayoutType, MicroGemm, MICROKERNEL_DEF};

use std::collections::{BTreeMap, HashMap};

use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::dtype::DataType;
use crate::error::Result;
use crate::tensor::TensorDesc;

/// Status returned by generated entry points on rejected arguments
pub const INVALID_ARGUMENT_STATUS: i32 = -23;

/// Substitution variables shared by the fragments of one render call
pub type RenderVars = BTreeMap<String, minijinja::Value>;

/// Text templating service
pub trait TemplateEngine {
    /// Substitute `vars` into `template`
    fn render(&self, template: &str, vars: &RenderVars) -> Result<String>;
}

/// `minijinja` engine; referencing an unknown variable is an error and
/// output is never escaped
#[derive(Debug)]
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        Self { env }
    }
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, template: &str, vars: &RenderVars) -> Result<String> {
        Ok(self.env.render_str(template, vars)?)
    }
}

/// Dtype lookup used while rendering
///
/// Intermediate buffers that never exist in the surrounding graph get their
/// element type from here instead of from their descriptor.
pub trait DtypeResolver {
    /// Element type to emit for `buffer`
    fn dtype_of(&self, buffer: &TensorDesc) -> DataType {
        buffer.dtype()
    }
}

/// Resolver that trusts every descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorDtypes;

impl DtypeResolver for DescriptorDtypes {}

/// Per-buffer dtype overrides, scoped to a single render call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeBufferDtypes {
    overrides: HashMap<String, DataType>,
}

impl FakeBufferDtypes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` to `dtype` regardless of its descriptor
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, dtype: DataType) -> Self {
        self.overrides.insert(name.into(), dtype);
        self
    }

    /// Merge another override set; entries in `other` win
    #[must_use]
    pub fn merged(mut self, other: &Self) -> Self {
        self.overrides
            .extend(other.overrides.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }
}

impl DtypeResolver for FakeBufferDtypes {
    fn dtype_of(&self, buffer: &TensorDesc) -> DataType {
        self.overrides
            .get(buffer.name())
            .copied()
            .unwrap_or_else(|| buffer.dtype())
    }
}

/// Insert one substitution variable
pub(crate) fn set_var<V: serde::Serialize>(vars: &mut RenderVars, key: &str, value: V) {
    vars.insert(key.to_string(), minijinja::Value::from_serialize(&value));
}
