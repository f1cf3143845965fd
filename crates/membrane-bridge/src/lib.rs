//! Call boundary between the host and a foreign module
//!
//! `Bridge` owns the pieces a foreign module touches when it calls back
//! into the host: linear memory, the allocator servicing its
//! malloc/realloc/free, the layout registry, and a `Console` sink for
//! diagnostic lines. Imports exist both as typed methods and as a by-name
//! `dispatch` table; unknown names come back as a typed
//! `NotImplemented`, never a panic, so an embedder can layer its own
//! imports (drawing, timers) on top.
//!
//! The export direction is the `ForeignModule` trait. Tests drive it with
//! a scripted module; real embedders adapt their wasm runtime's exports.

use membrane_format::{render, FormatError};
use membrane_heap::{Heap, HeapError};
use membrane_layout::{LayoutError, LayoutRegistry};
use membrane_memory::{Addr, LinearMemory, MemoryError};
use thiserror::Error;

/// Faults crossing the call boundary.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Dispatch of an import name this bridge does not provide
    #[error("import '{name}' is not implemented")]
    NotImplemented { name: String },
    /// Dispatch with the wrong number of arguments
    #[error("import '{name}' takes {expected} argument(s), got {got}")]
    BadArity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Where diagnostic output lands, one line per call.
///
/// Tests capture lines; embedders route them to stdout or a UI log.
pub trait Console {
    fn line(&self, text: &str);
}

/// The host side of the module boundary.
pub struct Bridge<C: Console> {
    mem: LinearMemory,
    heap: Heap,
    registry: LayoutRegistry,
    console: C,
}

impl<C: Console> Bridge<C> {
    /// Wrap `mem`, allocating from `[region_start, region_end)`.
    pub fn new(mem: LinearMemory, region_start: u32, region_end: u32, console: C) -> Self {
        Bridge {
            mem,
            heap: Heap::new(region_start, region_end),
            registry: LayoutRegistry::new(),
            console,
        }
    }

    pub fn mem(&self) -> &LinearMemory {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut LinearMemory {
        &mut self.mem
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn registry(&self) -> &LayoutRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut LayoutRegistry {
        &mut self.registry
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    // ==== Import surface ====

    /// Allocate `size` bytes of zeroed module memory.
    pub fn malloc(&mut self, size: u32) -> Result<Addr, BridgeError> {
        Ok(self.heap.malloc(&mut self.mem, size)?)
    }

    /// Move an allocation to a fresh block of `size` bytes.
    pub fn realloc(&mut self, addr: Addr, size: u32) -> Result<Addr, BridgeError> {
        Ok(self.heap.realloc(&mut self.mem, addr, size)?)
    }

    /// Release an allocation.
    pub fn free(&mut self, addr: Addr) -> Result<(), BridgeError> {
        Ok(self.heap.free(addr)?)
    }

    /// Emit the zero-terminated string at `zstr` as one console line.
    pub fn print(&self, zstr: Addr) -> Result<(), BridgeError> {
        let text = self.mem.read_zstring(zstr)?;
        self.console.line(&text);
        Ok(())
    }

    /// Emit an integer as one console line.
    pub fn print_int(&self, n: u32) {
        self.console.line(&n.to_string());
    }

    /// Emit a formatted line.
    ///
    /// `fmt` points at the zero-terminated template; `list` points at a
    /// `{ len, cap, items }` record whose items array holds one address
    /// per argument. Recoverable format issues degrade the line; they are
    /// logged by the formatter and do not fail the call.
    pub fn printf(&self, fmt: Addr, list: Addr) -> Result<(), BridgeError> {
        let template = self.mem.read_zstring(fmt)?;
        let args = self.read_arg_list(list)?;
        let rendered = render(&template, &args, &self.mem, &self.registry)?;
        self.console.line(&rendered.output);
        Ok(())
    }

    /// Emit the strings of a `{ len, cap, items }` record joined by
    /// single spaces, as one console line.
    pub fn print_strs(&self, list: Addr) -> Result<(), BridgeError> {
        let ptrs = self.read_arg_list(list)?;
        let mut buf = String::new();
        for (i, ptr) in ptrs.iter().enumerate() {
            if i != 0 {
                buf.push(' ');
            }
            buf.push_str(&self.mem.read_zstring(*ptr)?);
        }
        self.console.line(&buf);
        Ok(())
    }

    /// Read a count-prefixed pointer list: `len` at +0, `cap` at +4
    /// (ignored), items base address at +8, then `len` 4-byte addresses
    /// at the base.
    fn read_arg_list(&self, list: Addr) -> Result<Vec<Addr>, BridgeError> {
        let len = self.mem.read_u32(list)?;
        let items = self.mem.read_addr(list.offset(8))?;
        let mut args = Vec::with_capacity(len as usize);
        for i in 0..len {
            args.push(self.mem.read_addr(items.offset(i * 4))?);
        }
        Ok(args)
    }

    /// Route an import call by name.
    ///
    /// Imports without a meaningful result return 0. Names this bridge
    /// does not provide (including an embedder's drawing imports) come
    /// back as `NotImplemented`.
    pub fn dispatch(&mut self, name: &str, args: &[u32]) -> Result<u32, BridgeError> {
        tracing::trace!(name, ?args, "dispatch");
        match name {
            "malloc" => {
                let [size] = expect_arity(name, args)?;
                Ok(self.malloc(size)?.0)
            }
            "realloc" => {
                let [addr, size] = expect_arity(name, args)?;
                Ok(self.realloc(Addr(addr), size)?.0)
            }
            "free" => {
                let [addr] = expect_arity(name, args)?;
                self.free(Addr(addr))?;
                Ok(0)
            }
            "print" => {
                let [zstr] = expect_arity(name, args)?;
                self.print(Addr(zstr))?;
                Ok(0)
            }
            "print_int" => {
                let [n] = expect_arity(name, args)?;
                self.print_int(n);
                Ok(0)
            }
            "printf" => {
                let [fmt, list] = expect_arity(name, args)?;
                self.printf(Addr(fmt), Addr(list))?;
                Ok(0)
            }
            "print_strs" => {
                let [list] = expect_arity(name, args)?;
                self.print_strs(Addr(list))?;
                Ok(0)
            }
            _ => Err(BridgeError::NotImplemented {
                name: name.to_string(),
            }),
        }
    }
}

fn expect_arity<const N: usize>(name: &str, args: &[u32]) -> Result<[u32; N], BridgeError> {
    args.try_into().map_err(|_| BridgeError::BadArity {
        name: name.to_string(),
        expected: N,
        got: args.len(),
    })
}

/// The exports a foreign module offers the host.
pub trait ForeignModule<C: Console> {
    /// One-time setup after instantiation.
    fn initialize(&mut self, bridge: &mut Bridge<C>) -> Result<(), BridgeError>;

    /// Advance one frame; `dt` is elapsed seconds.
    fn update(&mut self, bridge: &mut Bridge<C>, dt: f32) -> Result<(), BridgeError>;

    /// Named accessor returning an address the host typically wraps in a
    /// registered layout's view.
    fn accessor(&mut self, name: &str, bridge: &mut Bridge<C>) -> Result<Addr, BridgeError>;
}
