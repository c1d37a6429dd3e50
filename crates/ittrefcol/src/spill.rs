//! Spill/merge: pulling a static part's pre-existing objects into the registry.
//!
//! A static part can create domains, string handles, counters and histograms
//! before any collector is attached. Those live in the part's own lists. On
//! registration the part's lists are read once into owned
//! [`ObjectDescriptor`]s, and each descriptor is find-or-created in the
//! registry, which hands back the canonical object. The part's lists are
//! only read, never written or freed.

use std::ffi::{CStr, CString};
use std::fmt;
use std::ptr::NonNull;

use ittrefcol_abi::*;
use tracing::warn;

use crate::error::CollectorError;
use crate::registry::{Found, Registry};

/// Upper bound on entries read from any one list, so a corrupted (cyclic)
/// list cannot hang registration.
const MAX_LIST_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectDescriptor {
    Domain {
        name: CString,
    },
    StringHandle {
        value: CString,
    },
    Counter {
        name: CString,
        domain: Option<CString>,
        ty: RawMetadataType,
    },
    Histogram {
        domain: CString,
        name: CString,
        x_type: RawMetadataType,
        y_type: RawMetadataType,
    },
}

impl ObjectDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectDescriptor::Domain { .. } => "domain",
            ObjectDescriptor::StringHandle { .. } => "string handle",
            ObjectDescriptor::Counter { .. } => "counter",
            ObjectDescriptor::Histogram { .. } => "histogram",
        }
    }
}

impl fmt::Display for ObjectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectDescriptor::Domain { name } => write!(f, "domain name={}", name.to_string_lossy()),
            ObjectDescriptor::StringHandle { value } => {
                write!(f, "string handle name={}", value.to_string_lossy())
            }
            ObjectDescriptor::Counter { name, domain, ty } => write!(
                f,
                "counter name={}, domain={}, type={ty}",
                name.to_string_lossy(),
                domain.as_deref().map_or("(null)".into(), CStr::to_string_lossy),
            ),
            ObjectDescriptor::Histogram {
                domain,
                name,
                x_type,
                y_type,
            } => write!(
                f,
                "histogram domain={}, name={}, x_type={x_type}, y_type={y_type}",
                domain.to_string_lossy(),
                name.to_string_lossy(),
            ),
        }
    }
}

/// The canonical registry object a descriptor resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalRef {
    Domain(NonNull<IttDomain>),
    StringHandle(NonNull<IttStringHandle>),
    Counter(NonNull<IttCounterInfo>),
    Histogram(NonNull<IttHistogram>),
}

#[derive(Debug, Default)]
pub struct Collected {
    pub descriptors: Vec<ObjectDescriptor>,
    /// Entries without a narrow name (or, for histograms, without a domain).
    pub skipped: usize,
}

fn owned(ptr: *const std::ffi::c_char) -> Option<CString> {
    // SAFETY: callers only pass name fields of records reachable from a
    // static part, which are null or NUL-terminated.
    unsafe { c_str(ptr) }.map(CStr::to_owned)
}

/// Walks a `next`-linked list from `head`, oldest first.
///
/// # Safety
/// Every node reachable from `head` must be a live record of type `T`.
unsafe fn walk<T>(head: *mut T, next: impl Fn(&T) -> *mut T, mut visit: impl FnMut(&T)) {
    let mut node = head;
    let mut seen = 0;
    while let Some(current) = unsafe { node.as_ref() } {
        if seen == MAX_LIST_LEN {
            warn!(limit = MAX_LIST_LEN, "static part list too long, stopped reading");
            break;
        }
        visit(current);
        seen += 1;
        node = next(current);
    }
}

/// Reads every object `part` created on its own. Domains come first so
/// that histogram domains exist by the time histograms merge.
///
/// # Safety
/// `part`'s list heads must be null or point to well-formed lists of live
/// records.
pub unsafe fn collect(part: &IttGlobal) -> Collected {
    let mut out = Collected::default();

    unsafe {
        walk(part.domain_list, |d| d.next, |d| match owned(d.name) {
            Some(name) => out.descriptors.push(ObjectDescriptor::Domain { name }),
            None => out.skipped += 1,
        });
        walk(part.string_list, |s| s.next, |s| match owned(s.value) {
            Some(value) => out.descriptors.push(ObjectDescriptor::StringHandle { value }),
            None => out.skipped += 1,
        });
        walk(part.counter_list, |c| c.next, |c| match owned(c.name) {
            Some(name) => out.descriptors.push(ObjectDescriptor::Counter {
                name,
                domain: owned(c.domain),
                ty: c.ty,
            }),
            None => out.skipped += 1,
        });
        walk(part.histogram_list, |h| h.next, |h| {
            let domain = h.domain.as_ref().and_then(|d| owned(d.name));
            match (domain, owned(h.name)) {
                (Some(domain), Some(name)) => out.descriptors.push(ObjectDescriptor::Histogram {
                    domain,
                    name,
                    x_type: h.x_type,
                    y_type: h.y_type,
                }),
                _ => out.skipped += 1,
            }
        });
    }
    out
}

/// Find-or-creates one descriptor in `registry`.
pub fn merge_one(
    registry: &Registry,
    descriptor: &ObjectDescriptor,
) -> Result<Found<CanonicalRef>, CollectorError> {
    Ok(match descriptor {
        ObjectDescriptor::Domain { name } => map(registry.find_or_create_domain(name)?, CanonicalRef::Domain),
        ObjectDescriptor::StringHandle { value } => {
            map(registry.find_or_create_string_handle(value)?, CanonicalRef::StringHandle)
        }
        ObjectDescriptor::Counter { name, domain, ty } => map(
            registry.find_or_create_counter(name, domain.as_deref(), *ty)?,
            CanonicalRef::Counter,
        ),
        ObjectDescriptor::Histogram {
            domain,
            name,
            x_type,
            y_type,
        } => {
            let canonical = registry.find_or_create_domain(domain)?.get();
            // SAFETY: `canonical` was just handed out by the registry.
            let found = unsafe { registry.find_or_create_histogram(canonical, name, *x_type, *y_type) }?;
            map(found, CanonicalRef::Histogram)
        }
    })
}

fn map<T: Copy>(found: Found<T>, wrap: impl Fn(T) -> CanonicalRef) -> Found<CanonicalRef> {
    match found {
        Found::Created(v) => Found::Created(wrap(v)),
        Found::Existing(v) => Found::Existing(wrap(v)),
    }
}

#[derive(Debug, Default)]
pub struct MergeReport {
    /// One entry per descriptor, in input order.
    pub merged: Vec<Result<Found<CanonicalRef>, CollectorError>>,
}

impl MergeReport {
    pub fn created(&self) -> usize {
        self.merged.iter().filter(|r| matches!(r, Ok(f) if f.is_created())).count()
    }

    pub fn existing(&self) -> usize {
        self.merged.iter().filter(|r| matches!(r, Ok(f) if !f.is_created())).count()
    }

    pub fn failed(&self) -> usize {
        self.merged.iter().filter(|r| r.is_err()).count()
    }
}

impl Registry {
    /// Find-or-creates every descriptor, in order, and hands back the
    /// canonical object for each.
    pub fn merge(&self, descriptors: &[ObjectDescriptor]) -> MergeReport {
        MergeReport {
            merged: descriptors.iter().map(|d| merge_one(self, d)).collect(),
        }
    }
}
