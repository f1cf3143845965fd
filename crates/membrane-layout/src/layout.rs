//! Layout construction
//!
//! `LayoutBuilder` accumulates named fields and derived methods, then
//! freezes into an immutable `StructLayout`. Builders are consumed by
//! `build()`, so a layout cannot be finished twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use membrane_memory::{Addr, LinearMemory};
use serde_json::Value;

use crate::kind::FieldKind;
use crate::view::StructView;
use crate::LayoutError;

/// Reserved method name that replaces the default snapshot algorithm.
pub const TRANSFORM_METHOD: &str = "@transform";

/// A derived operation attached to a layout.
///
/// Receives the instantiated view as implicit first argument, the memory
/// handle, and any explicit arguments.
pub type Method =
    Arc<dyn Fn(&StructView, &LinearMemory, &[Value]) -> Result<Value, LayoutError> + Send + Sync>;

/// One declared field: name, byte offset from the view address, and kind.
#[derive(Clone, Debug)]
pub struct Field {
    /// Field name, unique within the layout
    pub name: String,
    /// Cumulative byte width of all preceding fields
    pub offset: u32,
    /// Field shape
    pub kind: FieldKind,
}

/// An immutable, named, ordered field layout plus derived methods.
///
/// Built once during setup and shared by every view of the type.
pub struct StructLayout {
    name: String,
    fields: Vec<Field>,
    size: u32,
    methods: HashMap<String, Method>,
}

impl StructLayout {
    /// Start building a layout named `name`.
    pub fn builder(name: impl Into<String>) -> LayoutBuilder {
        LayoutBuilder {
            name: name.into(),
            fields: Vec::new(),
            size: 0,
            methods: HashMap::new(),
        }
    }

    /// Layout name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total size in bytes: the offset after the last field.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a derived method by name.
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// The snapshot transform, when one was attached.
    pub fn transform(&self) -> Option<&Method> {
        self.methods.get(TRANSFORM_METHOD)
    }

    /// Instantiate a view of this layout at `addr`.
    pub fn view(self: &Arc<Self>, addr: Addr) -> StructView {
        StructView::new(Arc::clone(self), addr)
    }
}

impl fmt::Debug for StructLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructLayout")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("size", &self.size)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Accumulates fields and methods for one layout.
pub struct LayoutBuilder {
    name: String,
    fields: Vec<Field>,
    size: u32,
    methods: HashMap<String, Method>,
}

impl fmt::Debug for LayoutBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutBuilder")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("size", &self.size)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LayoutBuilder {
    /// Append a field of `kind`, at the offset running total.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Result<Self, LayoutError> {
        let name = name.into();
        if self.fields.iter().any(|f| f.name == name) {
            return Err(LayoutError::DuplicateField {
                layout: self.name,
                field: name,
            });
        }
        let width = kind.byte_size();
        self.fields.push(Field {
            name,
            offset: self.size,
            kind,
        });
        self.size += width;
        Ok(self)
    }

    /// Append an indirect field: 4 stored bytes holding an address that
    /// accessors dereference once to reach a `kind` at the target.
    pub fn reference(
        self,
        name: impl Into<String>,
        kind: FieldKind,
    ) -> Result<Self, LayoutError> {
        self.field(name, FieldKind::Ref(Box::new(kind)))
    }

    /// Batch convenience for [`field`](Self::field).
    pub fn fields<N: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (N, FieldKind)>,
    ) -> Result<Self, LayoutError> {
        for (name, kind) in fields {
            self = self.field(name, kind)?;
        }
        Ok(self)
    }

    /// Attach a derived method, exposed on every view of this layout.
    ///
    /// The reserved name [`TRANSFORM_METHOD`] designates the snapshot
    /// transform. Re-attaching a name replaces the previous method.
    pub fn method(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&StructView, &LinearMemory, &[Value]) -> Result<Value, LayoutError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    /// Freeze into an immutable layout.
    pub fn build(self) -> Result<Arc<StructLayout>, LayoutError> {
        if self.fields.is_empty() {
            return Err(LayoutError::EmptyLayout { layout: self.name });
        }
        Ok(Arc::new(StructLayout {
            name: self.name,
            fields: self.fields,
            size: self.size,
            methods: self.methods,
        }))
    }
}
