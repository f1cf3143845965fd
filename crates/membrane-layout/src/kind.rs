//! Field kinds and scalar values
//!
//! `FieldKind` is the closed set of shapes a field can take. Widths are
//! fixed except for zero-terminated strings (scanned at read time; the
//! field itself occupies the 4 bytes of its start address) and nested
//! layouts (width = the layout's total size).

use std::sync::Arc;

use serde_json::Value;

use crate::layout::StructLayout;

/// The shape of one declared field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// Signed byte
    I8,
    /// Unsigned byte
    U8,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit float
    F32,
    /// 64-bit signed integer
    I64,
    /// 64-bit unsigned integer
    U64,
    /// A stored address, not auto-dereferenced
    Ptr,
    /// Zero-terminated string starting at the field's address
    ZString,
    /// A nested layout embedded in place
    Struct(Arc<StructLayout>),
    /// The field's bytes hold an address; accessors dereference it once
    /// and expose the subordinate kind at the target
    Ref(Box<FieldKind>),
}

impl FieldKind {
    /// Byte width this kind occupies inside its owning layout.
    pub fn byte_size(&self) -> u32 {
        match self {
            FieldKind::I8 | FieldKind::U8 => 1,
            FieldKind::I32 | FieldKind::U32 | FieldKind::F32 => 4,
            FieldKind::I64 | FieldKind::U64 => 8,
            FieldKind::Ptr | FieldKind::ZString | FieldKind::Ref(_) => 4,
            FieldKind::Struct(layout) => layout.size(),
        }
    }

    /// The scalar kind, when this field is a plain scalar.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            FieldKind::I8 => Some(ScalarKind::I8),
            FieldKind::U8 => Some(ScalarKind::U8),
            FieldKind::I32 => Some(ScalarKind::I32),
            FieldKind::U32 => Some(ScalarKind::U32),
            FieldKind::F32 => Some(ScalarKind::F32),
            FieldKind::I64 => Some(ScalarKind::I64),
            FieldKind::U64 => Some(ScalarKind::U64),
            _ => None,
        }
    }
}

/// Scalar field kinds, separated out for the scalar accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    I8,
    U8,
    I32,
    U32,
    F32,
    I64,
    U64,
}

impl ScalarKind {
    /// Byte width of the scalar.
    pub fn width(self) -> u32 {
        match self {
            ScalarKind::I8 | ScalarKind::U8 => 1,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 => 8,
        }
    }

    /// Display name used in mismatch errors.
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::I8 => "i8",
            ScalarKind::U8 => "u8",
            ScalarKind::I32 => "i32",
            ScalarKind::U32 => "u32",
            ScalarKind::F32 => "f32",
            ScalarKind::I64 => "i64",
            ScalarKind::U64 => "u64",
        }
    }
}

/// A scalar value read from or written to a view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    I8(i8),
    U8(u8),
    I32(i32),
    U32(u32),
    F32(f32),
    I64(i64),
    U64(u64),
}

impl Scalar {
    /// The kind this value belongs to.
    pub fn kind(self) -> ScalarKind {
        match self {
            Scalar::I8(_) => ScalarKind::I8,
            Scalar::U8(_) => ScalarKind::U8,
            Scalar::I32(_) => ScalarKind::I32,
            Scalar::U32(_) => ScalarKind::U32,
            Scalar::F32(_) => ScalarKind::F32,
            Scalar::I64(_) => ScalarKind::I64,
            Scalar::U64(_) => ScalarKind::U64,
        }
    }

    /// JSON representation, used by snapshots.
    ///
    /// Non-finite floats become `null`, the same degradation JSON itself
    /// forces on the original host's `JSON.stringify`.
    pub fn to_json(self) -> Value {
        match self {
            Scalar::I8(v) => Value::from(v),
            Scalar::U8(v) => Value::from(v),
            Scalar::I32(v) => Value::from(v),
            Scalar::U32(v) => Value::from(v),
            Scalar::F32(v) => serde_json::Number::from_f64(f64::from(v))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::I64(v) => Value::from(v),
            Scalar::U64(v) => Value::from(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        assert_eq!(FieldKind::I8.byte_size(), 1);
        assert_eq!(FieldKind::U8.byte_size(), 1);
        assert_eq!(FieldKind::I32.byte_size(), 4);
        assert_eq!(FieldKind::U32.byte_size(), 4);
        assert_eq!(FieldKind::F32.byte_size(), 4);
        assert_eq!(FieldKind::I64.byte_size(), 8);
        assert_eq!(FieldKind::U64.byte_size(), 8);
        assert_eq!(FieldKind::Ptr.byte_size(), 4);
        assert_eq!(FieldKind::ZString.byte_size(), 4);
        assert_eq!(FieldKind::Ref(Box::new(FieldKind::I64)).byte_size(), 4);
    }

    #[test]
    fn test_scalar_kind_matches_value() {
        assert_eq!(Scalar::F32(1.5).kind(), ScalarKind::F32);
        assert_eq!(Scalar::U8(7).kind(), ScalarKind::U8);
    }

    #[test]
    fn test_nan_snapshot_degrades_to_null() {
        assert_eq!(Scalar::F32(f32::NAN).to_json(), Value::Null);
        assert_eq!(Scalar::F32(f32::INFINITY).to_json(), Value::Null);
        assert_eq!(Scalar::F32(0.5).to_json(), Value::from(0.5));
    }
}
