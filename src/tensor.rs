//! Tensor Descriptors
//!
//! Shape, stride and dtype of the buffers a generated kernel touches. Sizes
//! are either static or a symbolic size variable (`s0`, `s1`, ...) that the
//! kernel entry point receives as an explicit `int64_t` parameter.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dtype::DataType;
use crate::error::{Result, TemplarError};

/// One extent or stride
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    /// Known at code generation time
    Static(i64),
    /// Symbolic size variable or an expression over such variables
    Symbol(String),
}

impl Dim {
    /// Symbolic size variable
    #[must_use]
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// Static value, if known
    #[must_use]
    pub const fn as_static(&self) -> Option<i64> {
        match self {
            Self::Static(v) => Some(*v),
            Self::Symbol(_) => None,
        }
    }

    /// Whether this dimension is only known at run time
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    /// Product of two dims, folding static values
    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) => Self::Static(a * b),
            (Self::Static(1), d) | (d, Self::Static(1)) => d.clone(),
            (a, b) => Self::Symbol(format!("{}*{}", a.operand(), b.operand())),
        }
    }

    /// Spelling safe to embed in a larger product or sum
    #[must_use]
    pub fn operand(&self) -> String {
        match self {
            Self::Static(v) => v.to_string(),
            Self::Symbol(s) if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                s.clone()
            }
            Self::Symbol(s) => format!("({s})"),
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(v) => write!(f, "{v}"),
            Self::Symbol(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Dim {
    fn from(v: i64) -> Self {
        Self::Static(v)
    }
}

impl From<&str> for Dim {
    fn from(s: &str) -> Self {
        Self::Symbol(s.to_string())
    }
}

/// Buffer descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
    name: String,
    dtype: DataType,
    sizes: Vec<Dim>,
    strides: Vec<Dim>,
    offset: i64,
}

impl TensorDesc {
    /// Row-major contiguous buffer
    #[must_use]
    pub fn contiguous(name: impl Into<String>, dtype: DataType, sizes: Vec<Dim>) -> Self {
        let mut strides = vec![Dim::Static(1); sizes.len()];
        for i in (0..sizes.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1].mul(&sizes[i + 1]);
        }
        Self {
            name: name.into(),
            dtype,
            sizes,
            strides,
            offset: 0,
        }
    }

    /// Buffer with explicit strides
    pub fn strided(
        name: impl Into<String>,
        dtype: DataType,
        sizes: Vec<Dim>,
        strides: Vec<Dim>,
    ) -> Result<Self> {
        let name = name.into();
        if sizes.len() != strides.len() {
            return Err(TemplarError::InvalidShape(format!(
                "{name}: {} sizes but {} strides",
                sizes.len(),
                strides.len()
            )));
        }
        Ok(Self {
            name,
            dtype,
            sizes,
            strides,
            offset: 0,
        })
    }

    /// Buffer name as spelled in generated source
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn dtype(&self) -> DataType {
        self.dtype
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn sizes(&self) -> &[Dim] {
        &self.sizes
    }

    #[must_use]
    pub fn strides(&self) -> &[Dim] {
        &self.strides
    }

    /// Element offset of the first element
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.offset
    }

    /// Same buffer under another name
    #[must_use]
    pub fn rename(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Same layout with another element type
    #[must_use]
    pub fn with_dtype(&self, dtype: DataType) -> Self {
        Self {
            dtype,
            ..self.clone()
        }
    }

    fn axis(&self, dim: isize) -> Result<usize> {
        let rank = self.rank() as isize;
        let axis = if dim < 0 { rank + dim } else { dim };
        if axis < 0 || axis >= rank {
            return Err(TemplarError::InvalidShape(format!(
                "{}: axis {dim} out of range for rank {rank}",
                self.name
            )));
        }
        Ok(axis as usize)
    }

    /// Extent of `dim`; negative values count from the end
    pub fn size(&self, dim: isize) -> Result<&Dim> {
        Ok(&self.sizes[self.axis(dim)?])
    }

    /// Stride of `dim`; negative values count from the end
    pub fn stride(&self, dim: isize) -> Result<&Dim> {
        Ok(&self.strides[self.axis(dim)?])
    }

    /// View with axis `dim` fixed to `index` and removed
    pub fn select(&self, dim: isize, index: i64) -> Result<Self> {
        let axis = self.axis(dim)?;
        let offset = if index == 0 {
            self.offset
        } else {
            let stride = self.strides[axis].as_static().ok_or_else(|| {
                TemplarError::InvalidShape(format!(
                    "{}: cannot select index {index} along a dynamic stride",
                    self.name
                ))
            })?;
            self.offset + index * stride
        };

        let mut sizes = self.sizes.clone();
        let mut strides = self.strides.clone();
        sizes.remove(axis);
        strides.remove(axis);
        Ok(Self {
            name: self.name.clone(),
            dtype: self.dtype,
            sizes,
            strides,
            offset,
        })
    }

    /// Symbolic size variables appearing as extents
    #[must_use]
    pub fn dynamic_symbols(&self) -> Vec<&str> {
        self.sizes
            .iter()
            .filter_map(|d| match d {
                Dim::Symbol(s) => Some(s.as_str()),
                Dim::Static(_) => None,
            })
            .collect()
    }

    /// Total element count when every extent is static
    #[must_use]
    pub fn static_numel(&self) -> Option<i64> {
        self.sizes.iter().map(Dim::as_static).product()
    }
}
