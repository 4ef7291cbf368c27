//! Kernel Signature and Indexing Helpers
//!
//! Every flat offset written into generated source comes from
//! [`CppKernel::index`]; templates only ever see finished expressions.

use std::collections::BTreeSet;
use std::fmt;

use super::DtypeResolver;
use crate::error::{Result, TemplarError};
use crate::tensor::{Dim, TensorDesc};

/// One coordinate of an index expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexExpr {
    /// Loop variable or other C++ expression
    Var(String),
    /// Fixed coordinate
    Const(i64),
}

impl From<&str> for IndexExpr {
    fn from(v: &str) -> Self {
        Self::Var(v.to_string())
    }
}

impl From<i64> for IndexExpr {
    fn from(c: i64) -> Self {
        Self::Const(c)
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(v) => f.write_str(v),
            Self::Const(c) => write!(f, "{c}"),
        }
    }
}

/// Generated C++ kernel entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CppKernel {
    name: String,
}

impl CppKernel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Entry point name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry point signature.
    ///
    /// Inputs are `const` pointers, outputs mutable pointers, followed by one
    /// `const int64_t` per distinct dynamic size symbol in sorted order.
    pub fn def_kernel(
        &self,
        inputs: &[&TensorDesc],
        outputs: &[&TensorDesc],
        dtypes: &dyn DtypeResolver,
    ) -> String {
        let mut params: Vec<String> = inputs
            .iter()
            .map(|t| format!("const {}* {}", dtypes.dtype_of(t).cpp_type(), t.name()))
            .collect();
        params.extend(
            outputs
                .iter()
                .map(|t| format!("{}* {}", dtypes.dtype_of(t).cpp_type(), t.name())),
        );

        let symbols: BTreeSet<&str> = inputs
            .iter()
            .chain(outputs)
            .flat_map(|t| t.dynamic_symbols())
            .collect();
        params.extend(symbols.into_iter().map(|s| format!("const int64_t {s}")));

        format!("int {}({})", self.name, params.join(", "))
    }

    /// Element access `name[offset]` for the given coordinates
    pub fn index(&self, tensor: &TensorDesc, coords: &[IndexExpr]) -> Result<String> {
        Ok(format!("{}[{}]", tensor.name(), Self::offset(tensor, coords)?))
    }

    fn offset(tensor: &TensorDesc, coords: &[IndexExpr]) -> Result<String> {
        if coords.len() != tensor.rank() {
            return Err(TemplarError::InvalidShape(format!(
                "{}: {} coordinates for rank {}",
                tensor.name(),
                coords.len(),
                tensor.rank()
            )));
        }

        let mut constant = tensor.offset();
        let mut terms = Vec::new();
        for (coord, stride) in coords.iter().zip(tensor.strides()) {
            match (coord, stride) {
                (IndexExpr::Const(0), _) | (_, Dim::Static(0)) => {}
                (IndexExpr::Const(c), Dim::Static(s)) => constant += c * s,
                (IndexExpr::Var(v), Dim::Static(1)) => terms.push(v.clone()),
                (IndexExpr::Var(v), s) => terms.push(format!("{v} * {}", s.operand())),
                (IndexExpr::Const(c), s) => terms.push(format!("{c} * {}", s.operand())),
            }
        }
        if constant != 0 || terms.is_empty() {
            terms.push(constant.to_string());
        }
        Ok(terms.join(" + "))
    }

    /// Extent of `dim` as a C++ expression
    pub fn size(&self, tensor: &TensorDesc, dim: isize) -> Result<String> {
        Ok(tensor.size(dim)?.operand())
    }

    /// Stride of `dim` as a C++ expression
    pub fn stride(&self, tensor: &TensorDesc, dim: isize) -> Result<String> {
        Ok(tensor.stride(dim)?.operand())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{DescriptorDtypes, FakeBufferDtypes};
    use crate::dtype::DataType;

    fn batched(name: &str, sizes: Vec<Dim>) -> TensorDesc {
        TensorDesc::contiguous(name, DataType::F32, sizes)
    }

    #[test]
    fn test_def_kernel_static() {
        let kernel = CppKernel::new("bmm_kernel");
        let x = batched("BX", vec![4.into(), 8.into(), 16.into()]);
        let y = batched("BY", vec![4.into(), 8.into(), 32.into()]);
        let sig = kernel.def_kernel(&[&x], &[&y], &DescriptorDtypes);
        assert_eq!(sig, "int bmm_kernel(const float* BX, float* BY)");
    }

    #[test]
    fn test_def_kernel_dynamic_symbols_sorted_and_deduplicated() {
        let kernel = CppKernel::new("k");
        let x = batched("BX", vec!["s1".into(), "s0".into(), 16.into()]);
        let y = batched("BY", vec!["s1".into(), "s0".into(), 32.into()]);
        let sig = kernel.def_kernel(&[&x], &[&y], &DescriptorDtypes);
        assert!(sig.ends_with("float* BY, const int64_t s0, const int64_t s1)"));
    }

    #[test]
    fn test_def_kernel_uses_resolver() {
        let kernel = CppKernel::new("k");
        let x = batched("BX", vec![2.into()]);
        let fake = FakeBufferDtypes::new().with("BX", DataType::BF16);
        assert_eq!(kernel.def_kernel(&[&x], &[], &fake), "int k(const bfloat16* BX)");
    }

    #[test]
    fn test_index_static_strides() {
        let kernel = CppKernel::new("k");
        let x = batched("BX", vec![4.into(), 8.into(), 16.into()]);
        let coords = [IndexExpr::from("b_start"), 0.into(), 0.into()];
        assert_eq!(kernel.index(&x, &coords).unwrap(), "BX[b_start * 128]");
        let coords = [IndexExpr::from(1), "m".into(), "k".into()];
        assert_eq!(kernel.index(&x, &coords).unwrap(), "BX[m * 16 + k + 128]");
    }

    #[test]
    fn test_index_dynamic_stride() {
        let kernel = CppKernel::new("k");
        let x = batched("BX", vec![4.into(), "s0".into(), 16.into()]);
        let coords = [IndexExpr::from("b_start"), 0.into(), 0.into()];
        assert_eq!(kernel.index(&x, &coords).unwrap(), "BX[b_start * (16*s0)]");
    }

    #[test]
    fn test_index_origin_and_rank_check() {
        let kernel = CppKernel::new("k");
        let x = batched("X", vec![4.into(), 4.into()]);
        assert_eq!(kernel.index(&x, &[0.into(), 0.into()]).unwrap(), "X[0]");
        assert!(kernel.index(&x, &[0.into()]).is_err());
    }

    #[test]
    fn test_size_and_stride_expressions() {
        let kernel = CppKernel::new("k");
        let y = batched("BY", vec!["s0".into(), 8.into(), 32.into()]);
        assert_eq!(kernel.size(&y, -3).unwrap(), "s0");
        assert_eq!(kernel.stride(&y, -2).unwrap(), "32");
    }
}
