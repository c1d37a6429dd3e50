//! Fills a static part's function-pointer slots.
//!
//! A static part's resolution table lists every ITT entry point it may call,
//! each with a slot to fill and a no-op fallback. Binding resolves every
//! name against the collector's export table; names the collector does not
//! implement get their fallback, so the part never calls through an empty
//! slot.

use std::ffi::{CStr, c_void};
use std::ptr::NonNull;

use ittrefcol_abi::{IttApiInfo, IttGlobal, c_str};
use tracing::{debug, trace};

/// Anything that can turn an exported symbol name into an address.
pub trait SymbolSource {
    fn resolve(&self, name: &CStr) -> Option<NonNull<c_void>>;
}

pub struct Export {
    pub name: &'static CStr,
    pub addr: *const c_void,
}

// SAFETY: `addr` is the address of a function; it is never dereferenced as data.
unsafe impl Sync for Export {}

/// The collector's own exported entry points.
#[derive(Clone, Copy)]
pub struct ExportTable {
    exports: &'static [Export],
}

impl ExportTable {
    pub const fn new(exports: &'static [Export]) -> Self {
        Self { exports }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static CStr> + '_ {
        self.exports.iter().map(|e| e.name)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl SymbolSource for ExportTable {
    fn resolve(&self, name: &CStr) -> Option<NonNull<c_void>> {
        self.exports
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| NonNull::new(e.addr.cast_mut()))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BindReport {
    /// Slots now pointing at a collector implementation.
    pub resolved: usize,
    /// Slots now pointing at the part's own fallback.
    pub fallback: usize,
    /// Rows with neither an implementation nor a fallback; their slot is
    /// left as the part initialized it.
    pub unresolved: usize,
}

/// Walks `part`'s resolution table up to its null-name terminator and fills
/// every slot. Safe to run any number of times, for any number of parts.
///
/// # Safety
/// `part.api_list_ptr` must be null or point to a table terminated by a row
/// with a null name, whose names are NUL-terminated strings and whose
/// non-null slot pointers are writable.
pub unsafe fn bind(part: &IttGlobal, source: &impl SymbolSource) -> BindReport {
    let mut report = BindReport::default();
    let mut row: *const IttApiInfo = part.api_list_ptr;
    if row.is_null() {
        return report;
    }

    loop {
        let info = unsafe { &*row };
        let Some(name) = (unsafe { c_str(info.name) }) else {
            break;
        };
        if !info.func_ptr.is_null() {
            match source.resolve(name) {
                Some(addr) => {
                    unsafe { *info.func_ptr = addr.as_ptr() };
                    report.resolved += 1;
                    trace!(symbol = ?name, "bound to collector");
                }
                None if !info.null_func.is_null() => {
                    unsafe { *info.func_ptr = info.null_func };
                    report.fallback += 1;
                    debug!(symbol = ?name, "not implemented, bound to fallback");
                }
                None => {
                    report.unresolved += 1;
                    debug!(symbol = ?name, "not implemented and no fallback");
                }
            }
        }
        row = unsafe { row.add(1) };
    }
    report
}
