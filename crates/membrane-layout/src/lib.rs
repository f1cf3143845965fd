//! Runtime type descriptors and typed views for Membrane
//!
//! A `StructLayout` maps named, ordered fields onto byte ranges of foreign
//! linear memory: scalar primitives, zero-terminated strings, addresses,
//! nested layouts and indirect (pointer) fields. Layouts are built once,
//! frozen, and shared via `Arc`; a `StructView` is just a (layout, address)
//! pair that reads and writes through an explicit `LinearMemory` handle.
//!
//! Field offsets are the cumulative byte width of all preceding fields in
//! declaration order. There is no implicit padding or alignment; the total
//! size is the offset after the last field.

mod kind;
mod layout;
mod registry;
mod view;

pub use kind::{FieldKind, Scalar, ScalarKind};
pub use layout::{Field, LayoutBuilder, Method, StructLayout, TRANSFORM_METHOD};
pub use registry::LayoutRegistry;
pub use view::{FieldRef, PtrRef, RefField, ScalarRef, StructView, ZStringRef};

use membrane_memory::MemoryError;
use thiserror::Error;

/// Faults raised by layout construction and view access.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// A field name was declared twice in one layout
    #[error("duplicate field '{field}' in layout '{layout}'")]
    DuplicateField { layout: String, field: String },
    /// `build()` was called on a builder with no fields
    #[error("layout '{layout}' has no fields")]
    EmptyLayout { layout: String },
    /// Access to a field name the layout does not declare
    #[error("layout '{layout}' has no field '{field}'")]
    UnknownField { layout: String, field: String },
    /// Invocation of a method name the layout does not declare
    #[error("layout '{layout}' has no method '{method}'")]
    UnknownMethod { layout: String, method: String },
    /// A scalar write whose value variant does not match the field kind
    #[error("field '{field}' holds {expected}, not {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },
    /// Two registered layout names collide case-insensitively
    #[error("layout name '{name}' already registered (names are matched case-insensitively)")]
    NameCollision { name: String },
    /// Linear memory fault during view access
    #[error(transparent)]
    Memory(#[from] MemoryError),
}
