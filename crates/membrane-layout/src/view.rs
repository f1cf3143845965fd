//! Typed views over linear memory
//!
//! A `StructView` pairs a frozen layout with a base address. Field access
//! resolves a name to an accessor bound to the field's absolute address;
//! all reads and writes go through an explicit `LinearMemory` handle
//! passed at the call site.

use std::sync::Arc;

use membrane_memory::{Addr, LinearMemory};
use serde_json::{Map, Value};

use crate::kind::{FieldKind, Scalar, ScalarKind};
use crate::layout::StructLayout;
use crate::LayoutError;

/// An instance of a layout at a concrete address.
#[derive(Clone, Debug)]
pub struct StructView {
    layout: Arc<StructLayout>,
    addr: Addr,
}

impl StructView {
    pub fn new(layout: Arc<StructLayout>, addr: Addr) -> Self {
        StructView { layout, addr }
    }

    /// The layout this view instantiates.
    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    /// Base address of the viewed bytes.
    pub fn addr(&self) -> Addr {
        self.addr
    }

    /// Resolve a field name to an accessor bound to its absolute address.
    ///
    /// Unknown names are a fault, not a recoverable condition.
    pub fn field(&self, name: &str) -> Result<FieldRef, LayoutError> {
        let field = self
            .layout
            .field(name)
            .ok_or_else(|| LayoutError::UnknownField {
                layout: self.layout.name().to_string(),
                field: name.to_string(),
            })?;
        Ok(make_ref(&field.kind, self.addr.offset(field.offset), &field.name))
    }

    /// Invoke a derived method by name.
    pub fn invoke(
        &self,
        name: &str,
        mem: &LinearMemory,
        args: &[Value],
    ) -> Result<Value, LayoutError> {
        let method = self
            .layout
            .method(name)
            .ok_or_else(|| LayoutError::UnknownMethod {
                layout: self.layout.name().to_string(),
                method: name.to_string(),
            })?;
        method(self, mem, args)
    }

    /// Capture the current field values as a JSON value.
    ///
    /// When the layout carries a snapshot transform it replaces the default
    /// algorithm entirely. Otherwise the result is an object with one entry
    /// per field, in declaration order: scalars as numbers, stored addresses
    /// as their numeric value, strings as strings, nested layouts as nested
    /// objects, and indirect fields as the value found at their target.
    pub fn snapshot(&self, mem: &LinearMemory) -> Result<Value, LayoutError> {
        if let Some(transform) = self.layout.transform() {
            return transform(self, mem, &[]);
        }
        let mut out = Map::new();
        for field in self.layout.fields() {
            let addr = self.addr.offset(field.offset);
            out.insert(field.name.clone(), field_json(&field.kind, addr, mem)?);
        }
        Ok(Value::Object(out))
    }
}

/// Accessor for one resolved field.
#[derive(Clone, Debug)]
pub enum FieldRef {
    Scalar(ScalarRef),
    Ptr(PtrRef),
    ZString(ZStringRef),
    Struct(StructView),
    Ref(RefField),
}

fn make_ref(kind: &FieldKind, addr: Addr, name: &str) -> FieldRef {
    match kind {
        FieldKind::Ptr => FieldRef::Ptr(PtrRef { addr }),
        FieldKind::ZString => FieldRef::ZString(ZStringRef { addr }),
        FieldKind::Struct(layout) => FieldRef::Struct(layout.view(addr)),
        FieldKind::Ref(inner) => FieldRef::Ref(RefField {
            kind: (**inner).clone(),
            slot: addr,
            name: name.to_string(),
        }),
        scalar => FieldRef::Scalar(ScalarRef {
            // make_ref is only reached with scalar kinds here
            kind: scalar.scalar_kind().unwrap_or(ScalarKind::U8),
            addr,
            name: name.to_string(),
        }),
    }
}

fn field_json(kind: &FieldKind, addr: Addr, mem: &LinearMemory) -> Result<Value, LayoutError> {
    match kind {
        FieldKind::Ptr => Ok(Value::from(mem.read_addr(addr)?.0)),
        FieldKind::ZString => Ok(Value::String(mem.read_zstring(addr)?)),
        FieldKind::Struct(layout) => layout.view(addr).snapshot(mem),
        FieldKind::Ref(inner) => {
            let target = mem.read_addr(addr)?;
            field_json(inner, target, mem)
        }
        scalar => {
            let kind = scalar.scalar_kind().unwrap_or(ScalarKind::U8);
            Ok(read_scalar(kind, addr, mem)?.to_json())
        }
    }
}

fn read_scalar(kind: ScalarKind, addr: Addr, mem: &LinearMemory) -> Result<Scalar, LayoutError> {
    Ok(match kind {
        ScalarKind::I8 => Scalar::I8(mem.read_i8(addr)?),
        ScalarKind::U8 => Scalar::U8(mem.read_u8(addr)?),
        ScalarKind::I32 => Scalar::I32(mem.read_i32(addr)?),
        ScalarKind::U32 => Scalar::U32(mem.read_u32(addr)?),
        ScalarKind::F32 => Scalar::F32(mem.read_f32(addr)?),
        ScalarKind::I64 => Scalar::I64(mem.read_i64(addr)?),
        ScalarKind::U64 => Scalar::U64(mem.read_u64(addr)?),
    })
}

/// Accessor for a scalar field.
#[derive(Clone, Debug)]
pub struct ScalarRef {
    kind: ScalarKind,
    addr: Addr,
    name: String,
}

impl ScalarRef {
    /// The scalar kind this accessor reads and writes.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Absolute address of the field's first byte.
    pub fn addr(&self) -> Addr {
        self.addr
    }

    /// Read the current value.
    pub fn read(&self, mem: &LinearMemory) -> Result<Scalar, LayoutError> {
        read_scalar(self.kind, self.addr, mem)
    }

    /// Write a value. The variant must match the declared kind.
    pub fn write(&self, mem: &mut LinearMemory, value: Scalar) -> Result<(), LayoutError> {
        if value.kind() != self.kind {
            return Err(LayoutError::TypeMismatch {
                field: self.name.clone(),
                expected: self.kind.name(),
                got: value.kind().name(),
            });
        }
        match value {
            Scalar::I8(v) => mem.write_i8(self.addr, v)?,
            Scalar::U8(v) => mem.write_u8(self.addr, v)?,
            Scalar::I32(v) => mem.write_i32(self.addr, v)?,
            Scalar::U32(v) => mem.write_u32(self.addr, v)?,
            Scalar::F32(v) => mem.write_f32(self.addr, v)?,
            Scalar::I64(v) => mem.write_i64(self.addr, v)?,
            Scalar::U64(v) => mem.write_u64(self.addr, v)?,
        }
        Ok(())
    }

    /// The field's raw little-endian bytes.
    pub fn raw_bytes(&self, mem: &LinearMemory) -> Result<Vec<u8>, LayoutError> {
        Ok(mem.bytes(self.addr, self.kind.width() as usize)?.to_vec())
    }
}

/// Accessor for a stored address. The address is a value, never
/// auto-dereferenced.
#[derive(Clone, Copy, Debug)]
pub struct PtrRef {
    addr: Addr,
}

impl PtrRef {
    /// Absolute address of the stored pointer bytes.
    pub fn addr(&self) -> Addr {
        self.addr
    }

    /// Read the stored address.
    pub fn get(&self, mem: &LinearMemory) -> Result<Addr, LayoutError> {
        Ok(mem.read_addr(self.addr)?)
    }

    /// Replace the stored address.
    pub fn set(&self, mem: &mut LinearMemory, target: Addr) -> Result<(), LayoutError> {
        Ok(mem.write_addr(self.addr, target)?)
    }
}

/// Accessor for a zero-terminated string.
#[derive(Clone, Copy, Debug)]
pub struct ZStringRef {
    addr: Addr,
}

impl ZStringRef {
    /// Address of the string's first byte.
    pub fn addr(&self) -> Addr {
        self.addr
    }

    /// Byte length up to (not including) the terminator.
    pub fn len(&self, mem: &LinearMemory) -> Result<u32, LayoutError> {
        Ok(mem.zstring_len(self.addr)? as u32)
    }

    /// Decode the string (lossy for non-UTF-8 bytes).
    pub fn read(&self, mem: &LinearMemory) -> Result<String, LayoutError> {
        Ok(mem.read_zstring(self.addr)?)
    }

    /// The string's bytes without the terminator.
    pub fn raw_bytes(&self, mem: &LinearMemory) -> Result<Vec<u8>, LayoutError> {
        let len = mem.zstring_len(self.addr)?;
        Ok(mem.bytes(self.addr, len)?.to_vec())
    }

    /// True when the first byte is already the terminator.
    pub fn is_empty(&self, mem: &LinearMemory) -> Result<bool, LayoutError> {
        Ok(mem.zstring_len(self.addr)? == 0)
    }

    /// Overwrite the byte at `index`.
    ///
    /// Returns `Ok(false)` without writing when `index` is at or past the
    /// terminator; the string's length can never change through this.
    pub fn overwrite(
        &self,
        mem: &mut LinearMemory,
        index: u32,
        byte: u8,
    ) -> Result<bool, LayoutError> {
        let len = mem.zstring_len(self.addr)? as u32;
        if index >= len {
            return Ok(false);
        }
        mem.write_u8(self.addr.offset(index), byte)?;
        Ok(true)
    }
}

/// Accessor for an indirect field: 4 stored bytes holding the address of
/// the actual value.
#[derive(Clone, Debug)]
pub struct RefField {
    kind: FieldKind,
    slot: Addr,
    name: String,
}

impl RefField {
    /// Address of the stored pointer bytes (not the target).
    pub fn slot(&self) -> Addr {
        self.slot
    }

    /// The kind found at the target address.
    pub fn target_kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Follow the stored address once and bind an accessor at the target.
    pub fn deref(&self, mem: &LinearMemory) -> Result<FieldRef, LayoutError> {
        let target = mem.read_addr(self.slot)?;
        Ok(make_ref(&self.kind, target, &self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TRANSFORM_METHOD;
    use serde_json::json;

    fn color_layout() -> Arc<StructLayout> {
        StructLayout::builder("Color_Rgba")
            .fields([
                ("r", FieldKind::U8),
                ("g", FieldKind::U8),
                ("b", FieldKind::U8),
                ("a", FieldKind::U8),
            ])
            .unwrap()
            .build()
            .unwrap()
    }

    fn rect_layout() -> Arc<StructLayout> {
        StructLayout::builder("Rect")
            .fields([
                ("x", FieldKind::I32),
                ("y", FieldKind::I32),
                ("w", FieldKind::I32),
                ("h", FieldKind::I32),
            ])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_scalar_read_write_through_view() {
        let mut mem = LinearMemory::new(64);
        let rect = rect_layout();
        let view = rect.view(Addr(16));

        let w = view.field("w").unwrap();
        let FieldRef::Scalar(w) = w else { panic!("expected scalar") };
        assert_eq!(w.addr(), Addr(24));

        w.write(&mut mem, Scalar::I32(-640)).unwrap();
        assert_eq!(w.read(&mem).unwrap(), Scalar::I32(-640));
        assert_eq!(mem.read_i32(Addr(24)).unwrap(), -640);
    }

    #[test]
    fn test_write_rejects_wrong_variant() {
        let mut mem = LinearMemory::new(64);
        let rect = rect_layout();
        let view = rect.view(Addr(0));

        let FieldRef::Scalar(x) = view.field("x").unwrap() else {
            panic!("expected scalar")
        };
        let err = x.write(&mut mem, Scalar::F32(1.0)).unwrap_err();
        assert_eq!(
            err,
            LayoutError::TypeMismatch {
                field: "x".into(),
                expected: "i32",
                got: "f32",
            }
        );
        // Nothing was written.
        assert_eq!(mem.read_i32(Addr(0)).unwrap(), 0);
    }

    #[test]
    fn test_unknown_field_is_fault() {
        let rect = rect_layout();
        let err = rect.view(Addr(0)).field("z").unwrap_err();
        assert_eq!(
            err,
            LayoutError::UnknownField {
                layout: "Rect".into(),
                field: "z".into(),
            }
        );
    }

    #[test]
    fn test_nested_struct_view_addresses() {
        let window = StructLayout::builder("My_Window")
            .field("bounds", FieldKind::Struct(rect_layout()))
            .unwrap()
            .field("clear_color", FieldKind::Struct(color_layout()))
            .unwrap()
            .field("title", FieldKind::Ptr)
            .unwrap()
            .build()
            .unwrap();

        let view = window.view(Addr(100));
        let FieldRef::Struct(bounds) = view.field("bounds").unwrap() else {
            panic!("expected struct")
        };
        assert_eq!(bounds.addr(), Addr(100));
        assert_eq!(bounds.layout().name(), "Rect");

        let FieldRef::Struct(color) = view.field("clear_color").unwrap() else {
            panic!("expected struct")
        };
        assert_eq!(color.addr(), Addr(116));

        let FieldRef::Ptr(title) = view.field("title").unwrap() else {
            panic!("expected ptr")
        };
        assert_eq!(title.addr(), Addr(120));
    }

    #[test]
    fn test_ptr_is_a_value_not_a_deref() {
        let mut mem = LinearMemory::new(64);
        mem.write_addr(Addr(8), Addr(0xBEEF)).unwrap();

        let layout = StructLayout::builder("Holder")
            .fields([("pad", FieldKind::U64), ("p", FieldKind::Ptr)])
            .unwrap()
            .build()
            .unwrap();
        let FieldRef::Ptr(p) = layout.view(Addr(0)).field("p").unwrap() else {
            panic!("expected ptr")
        };
        assert_eq!(p.get(&mem).unwrap(), Addr(0xBEEF));

        p.set(&mut mem, Addr(4)).unwrap();
        assert_eq!(mem.read_addr(Addr(8)).unwrap(), Addr(4));
    }

    #[test]
    fn test_zstring_read_len_overwrite() {
        let mut mem = LinearMemory::new(64);
        mem.write_bytes(Addr(10), b"hello\0").unwrap();

        let layout = StructLayout::builder("S")
            .field("text", FieldKind::ZString)
            .unwrap()
            .build()
            .unwrap();
        let FieldRef::ZString(text) = layout.view(Addr(10)).field("text").unwrap() else {
            panic!("expected zstring")
        };
        assert_eq!(text.read(&mem).unwrap(), "hello");
        assert_eq!(text.len(&mem).unwrap(), 5);
        assert_eq!(text.raw_bytes(&mem).unwrap(), b"hello");

        assert!(text.overwrite(&mut mem, 0, b'y').unwrap());
        assert_eq!(text.read(&mem).unwrap(), "yello");

        // At or past the terminator: no write, not an error.
        assert!(!text.overwrite(&mut mem, 5, b'!').unwrap());
        assert!(!text.overwrite(&mut mem, 99, b'!').unwrap());
        assert_eq!(text.read(&mem).unwrap(), "yello");
    }

    #[test]
    fn test_ref_field_derefs_once() {
        let mut mem = LinearMemory::new(64);
        mem.write_bytes(Addr(40), b"indirect\0").unwrap();
        mem.write_addr(Addr(0), Addr(40)).unwrap();

        let layout = StructLayout::builder("S")
            .reference("text", FieldKind::ZString)
            .unwrap()
            .build()
            .unwrap();
        let FieldRef::Ref(text) = layout.view(Addr(0)).field("text").unwrap() else {
            panic!("expected ref")
        };
        assert_eq!(text.slot(), Addr(0));

        let FieldRef::ZString(target) = text.deref(&mem).unwrap() else {
            panic!("expected zstring target")
        };
        assert_eq!(target.addr(), Addr(40));
        assert_eq!(target.read(&mem).unwrap(), "indirect");
    }

    #[test]
    fn test_snapshot_preserves_declaration_order() {
        let mut mem = LinearMemory::new(64);
        let color = color_layout();
        let view = color.view(Addr(0));
        mem.write_bytes(Addr(0), &[255, 128, 0, 255]).unwrap();

        let snap = view.snapshot(&mem).unwrap();
        assert_eq!(snap, json!({ "r": 255, "g": 128, "b": 0, "a": 255 }));
        let keys: Vec<&String> = snap.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["r", "g", "b", "a"]);
    }

    #[test]
    fn test_snapshot_recurses_and_follows_refs() {
        let mut mem = LinearMemory::new(128);
        mem.write_bytes(Addr(80), b"main\0").unwrap();

        let window = StructLayout::builder("My_Window")
            .field("bounds", FieldKind::Struct(rect_layout()))
            .unwrap()
            .reference("title", FieldKind::ZString)
            .unwrap()
            .field("handle", FieldKind::Ptr)
            .unwrap()
            .build()
            .unwrap();

        let view = window.view(Addr(0));
        mem.write_i32(Addr(0), 10).unwrap();
        mem.write_i32(Addr(4), 20).unwrap();
        mem.write_i32(Addr(8), 640).unwrap();
        mem.write_i32(Addr(12), 480).unwrap();
        mem.write_addr(Addr(16), Addr(80)).unwrap();
        mem.write_addr(Addr(20), Addr(0xC0DE)).unwrap();

        let snap = view.snapshot(&mem).unwrap();
        assert_eq!(
            snap,
            json!({
                "bounds": { "x": 10, "y": 20, "w": 640, "h": 480 },
                "title": "main",
                "handle": 0xC0DE,
            })
        );
    }

    #[test]
    fn test_transform_overrides_default_snapshot() {
        let mut mem = LinearMemory::new(16);
        mem.write_bytes(Addr(0), &[0x20, 0x40, 0x60, 0xFF]).unwrap();

        let color = StructLayout::builder("Color_Rgba")
            .fields([
                ("r", FieldKind::U8),
                ("g", FieldKind::U8),
                ("b", FieldKind::U8),
                ("a", FieldKind::U8),
            ])
            .unwrap()
            .method(TRANSFORM_METHOD, |view, mem, _args| {
                let bytes = mem.bytes(view.addr(), 3)?;
                Ok(Value::String(format!(
                    "#{:02x}{:02x}{:02x}",
                    bytes[0], bytes[1], bytes[2]
                )))
            })
            .build()
            .unwrap();

        let snap = color.view(Addr(0)).snapshot(&mem).unwrap();
        assert_eq!(snap, json!("#204060"));
    }

    #[test]
    fn test_invoke_method_with_args() {
        let mut mem = LinearMemory::new(32);
        mem.write_i32(Addr(8), 640).unwrap();
        mem.write_i32(Addr(12), 480).unwrap();

        let rect = StructLayout::builder("Rect")
            .fields([
                ("x", FieldKind::I32),
                ("y", FieldKind::I32),
                ("w", FieldKind::I32),
                ("h", FieldKind::I32),
            ])
            .unwrap()
            .method("area_scaled", |view, mem, args| {
                let scale = args.first().and_then(Value::as_i64).unwrap_or(1);
                let w = i64::from(mem.read_i32(view.addr().offset(8))?);
                let h = i64::from(mem.read_i32(view.addr().offset(12))?);
                Ok(Value::from(w * h * scale))
            })
            .build()
            .unwrap();

        let view = rect.view(Addr(0));
        let area = view.invoke("area_scaled", &mem, &[json!(2)]).unwrap();
        assert_eq!(area, json!(614_400));

        let err = view.invoke("missing", &mem, &[]).unwrap_err();
        assert_eq!(
            err,
            LayoutError::UnknownMethod {
                layout: "Rect".into(),
                method: "missing".into(),
            }
        );
    }
}
