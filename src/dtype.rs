//! Data Type System
//!
//! Framework-level element types and their spellings in the two code
//! generation targets: composable-kernel (CK) type tags and C++ scalar types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TemplarError;

/// Element data types of operation operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 64-bit floating point
    F64,
    /// 32-bit floating point
    F32,
    /// 16-bit floating point (half precision)
    F16,
    /// 16-bit brain floating point
    BF16,
    /// 8-bit float, e4m3 with finite-or-NaN-at-zero encoding
    F8E4M3Fnuz,
    /// 8-bit float, e5m2 with finite-or-NaN-at-zero encoding
    F8E5M2Fnuz,
    /// 64-bit signed integer
    I64,
    /// 32-bit signed integer
    I32,
    /// 16-bit signed integer
    I16,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// Boolean
    Bool,
}

impl DataType {
    /// Size in bytes
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::F8E4M3Fnuz | Self::F8E5M2Fnuz | Self::I8 | Self::U8 | Self::Bool => 1,
            Self::F16 | Self::BF16 | Self::I16 => 2,
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
        }
    }

    /// CK element type alias, if the type exists in the CK library
    #[must_use]
    pub const fn ck_tag(self) -> Option<&'static str> {
        match self {
            Self::F32 => Some("F32"),
            Self::F64 => Some("F64"),
            Self::F16 => Some("F16"),
            Self::BF16 => Some("BF16"),
            Self::I32 => Some("I32"),
            Self::I8 => Some("I8"),
            Self::F8E4M3Fnuz => Some("F8"),
            Self::F8E5M2Fnuz => Some("BF8"),
            Self::I64 | Self::I16 | Self::U8 | Self::Bool => None,
        }
    }

    /// C++ scalar type used in generated CPU source
    #[must_use]
    pub const fn cpp_type(self) -> &'static str {
        match self {
            Self::F64 => "double",
            Self::F32 => "float",
            Self::F16 => "half",
            Self::BF16 => "bfloat16",
            Self::F8E4M3Fnuz => "float8_e4m3fnuz",
            Self::F8E5M2Fnuz => "float8_e5m2fnuz",
            Self::I64 => "int64_t",
            Self::I32 => "int32_t",
            Self::I16 => "int16_t",
            Self::I8 => "int8_t",
            Self::U8 => "uint8_t",
            Self::Bool => "bool",
        }
    }

    /// Check if this is a floating point type
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::F64 | Self::F32 | Self::F16 | Self::BF16 | Self::F8E4M3Fnuz | Self::F8E5M2Fnuz
        )
    }

    /// Short lowercase name, also accepted by [`FromStr`]
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F8E4M3Fnuz => "f8e4m3fnuz",
            Self::F8E5M2Fnuz => "f8e5m2fnuz",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::I16 => "i16",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for DataType {
    type Err = TemplarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dtype = match s.to_ascii_lowercase().as_str() {
            "f64" | "float64" | "double" => Self::F64,
            "f32" | "float32" | "float" => Self::F32,
            "f16" | "float16" | "half" => Self::F16,
            "bf16" | "bfloat16" => Self::BF16,
            "f8e4m3fnuz" | "float8_e4m3fnuz" => Self::F8E4M3Fnuz,
            "f8e5m2fnuz" | "float8_e5m2fnuz" => Self::F8E5M2Fnuz,
            "i64" | "int64" => Self::I64,
            "i32" | "int32" => Self::I32,
            "i16" | "int16" => Self::I16,
            "i8" | "int8" => Self::I8,
            "u8" | "uint8" => Self::U8,
            "bool" => Self::Bool,
            _ => return Err(TemplarError::UnsupportedDtype(s.to_string())),
        };
        Ok(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ck_tags() {
        assert_eq!(DataType::F16.ck_tag(), Some("F16"));
        assert_eq!(DataType::BF16.ck_tag(), Some("BF16"));
        assert_eq!(DataType::F8E5M2Fnuz.ck_tag(), Some("BF8"));
        assert_eq!(DataType::U8.ck_tag(), None);
        assert_eq!(DataType::Bool.ck_tag(), None);
    }

    #[test]
    fn test_cpp_types() {
        assert_eq!(DataType::F32.cpp_type(), "float");
        assert_eq!(DataType::BF16.cpp_type(), "bfloat16");
        assert_eq!(DataType::U8.cpp_type(), "uint8_t");
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DataType::F64.size_bytes(), 8);
        assert_eq!(DataType::BF16.size_bytes(), 2);
        assert_eq!(DataType::I8.size_bytes(), 1);
    }

    #[test]
    fn test_from_str_aliases() {
        assert_eq!("float16".parse::<DataType>().unwrap(), DataType::F16);
        assert_eq!("BF16".parse::<DataType>().unwrap(), DataType::BF16);
        assert!("complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for dtype in [DataType::F32, DataType::I8, DataType::F8E4M3Fnuz] {
            assert_eq!(dtype.to_string().parse::<DataType>().unwrap(), dtype);
        }
    }
}
