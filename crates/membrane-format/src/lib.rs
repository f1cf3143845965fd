//! Printf-style template interpreter for Membrane
//!
//! Renders a format template against a queue of argument addresses. Every
//! specifier except `%%` consumes the next address and interprets the
//! bytes it points at; `%{Name}` renders a registered layout's snapshot.
//!
//! Faults split two ways. Malformed templates and memory faults are fatal
//! and return `Err`. Conditions the caller may have no control over at
//! runtime (argument queue exhausted, unknown layout name, unclosed
//! braces) degrade instead: rendering stops or substitutes, the partial
//! output is returned, and the condition is recorded as a `FormatIssue`
//! and logged.

use membrane_layout::{LayoutError, LayoutRegistry};
use membrane_memory::{Addr, LinearMemory, MemoryError};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use thiserror::Error;

/// Faults that abort rendering with no output.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A `%` escape names no known specifier
    #[error("unsupported format specifier '%{0}'")]
    UnknownSpecifier(char),
    /// The template ends in a bare `%`
    #[error("format template ends in a bare '%'")]
    DanglingPercent,
    /// Linear memory fault while reading an argument
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// View fault while rendering a layout snapshot
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Recoverable conditions recorded during a degraded render.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FormatIssue {
    /// A consuming specifier found the argument queue empty
    #[error("insufficient arguments for format template")]
    InsufficientArgs,
    /// A `%{` was never closed before the template ended
    #[error("unclosed format braces, missing '}}'")]
    UnterminatedBraces,
    /// `%{Name}` named a layout the registry does not hold
    #[error("unknown struct '{0}' requested")]
    UnknownStruct(String),
}

/// The result of a render: output plus anything that degraded it.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Rendered {
    /// Rendered text, possibly partial when `issues` is non-empty
    pub output: String,
    /// Recoverable conditions hit along the way, in order
    pub issues: Vec<FormatIssue>,
}

impl Rendered {
    /// True when rendering completed without degradation.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Render `template` against the argument address queue.
///
/// Specifiers: `%s` zero-terminated string, `%b` byte as decimal, `%u`
/// u32, `%i`/`%d` i32, `%f`/`%F` f32 decimal, `%e`/`%E` f32 exponential,
/// `%c` byte as char, `%p` the argument address itself as a hex literal,
/// `%%` a literal percent (consumes nothing), `%{Name}` a layout snapshot.
pub fn render(
    template: &str,
    args: &[Addr],
    mem: &LinearMemory,
    registry: &LayoutRegistry,
) -> Result<Rendered, FormatError> {
    let mut out = String::new();
    let mut issues = Vec::new();
    let mut args = args.iter().copied();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let spec = chars.next().ok_or(FormatError::DanglingPercent)?;
        if spec == '%' {
            out.push('%');
            continue;
        }
        let Some(ptr) = args.next() else {
            report(&mut issues, FormatIssue::InsufficientArgs);
            break;
        };
        if spec == '{' {
            if !render_braced(&mut chars, ptr, mem, registry, &mut out, &mut issues)? {
                break;
            }
            continue;
        }
        render_specifier(spec, ptr, mem, &mut out)?;
    }

    Ok(Rendered { output: out, issues })
}

fn report(issues: &mut Vec<FormatIssue>, issue: FormatIssue) {
    tracing::error!("{issue}");
    issues.push(issue);
}

fn render_specifier(
    spec: char,
    ptr: Addr,
    mem: &LinearMemory,
    out: &mut String,
) -> Result<(), FormatError> {
    match spec {
        's' => out.push_str(&mem.read_zstring(ptr)?),
        'b' => out.push_str(&mem.read_u8(ptr)?.to_string()),
        'u' => out.push_str(&mem.read_u32(ptr)?.to_string()),
        'i' | 'd' => out.push_str(&mem.read_i32(ptr)?.to_string()),
        'f' | 'F' => out.push_str(&mem.read_f32(ptr)?.to_string()),
        'e' => out.push_str(&format!("{:e}", mem.read_f32(ptr)?)),
        'E' => out.push_str(&format!("{:E}", mem.read_f32(ptr)?)),
        'c' => out.push(char::from(mem.read_u8(ptr)?)),
        'p' => out.push_str(&format!("0x{:x}", ptr.0)),
        other => return Err(FormatError::UnknownSpecifier(other)),
    }
    Ok(())
}

/// Handle `%{Name}`. Returns `Ok(false)` when rendering must stop
/// (unclosed braces), `Ok(true)` to continue.
fn render_braced(
    chars: &mut std::str::Chars<'_>,
    ptr: Addr,
    mem: &LinearMemory,
    registry: &LayoutRegistry,
    out: &mut String,
    issues: &mut Vec<FormatIssue>,
) -> Result<bool, FormatError> {
    let mut name = String::new();
    let mut closed = false;
    for c in chars.by_ref() {
        if c == '}' {
            closed = true;
            break;
        }
        name.push(c);
    }
    if !closed {
        report(issues, FormatIssue::UnterminatedBraces);
        return Ok(false);
    }

    let name = name.trim();
    if name.is_empty() {
        out.push_str(&ptr.0.to_string());
        return Ok(true);
    }
    let Some(layout) = registry.get(name) else {
        out.push_str(&format!("0x{:x}", ptr.0));
        report(issues, FormatIssue::UnknownStruct(name.to_string()));
        return Ok(true);
    };
    let snapshot = layout.view(ptr).snapshot(mem)?;
    out.push_str(layout.name());
    out.push(' ');
    out.push_str(&pretty(&snapshot));
    Ok(true)
}

/// 4-space-indented JSON, falling back to compact form if the value
/// somehow refuses the pretty serializer.
fn pretty(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8_lossy(&buf).into_owned()
}
