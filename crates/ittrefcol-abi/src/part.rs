use std::ffi::{CStr, CString, c_long, c_void};
use std::ptr;

use crate::records::{IttApiInfo, IttCounterInfo, IttDomain, IttGlobal, IttHistogram, IttStringHandle};
use crate::tags::{GROUP_ALL, RawMetadataType};

// ── Builder ──────────────────────────────────────────────

enum Object {
    Domain(CString),
    StringHandle(CString),
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

struct ApiEntry {
    name: CString,
    fallback: *mut c_void,
}

/// Describes a static part before it is laid out in memory.
///
/// Objects are added in creation order; that order is what the collector
/// sees when it walks the part's lists.
#[derive(Default)]
pub struct StaticPartBuilder {
    objects: Vec<Object>,
    api: Vec<ApiEntry>,
}

impl StaticPartBuilder {
    pub fn domain(mut self, name: &str) -> Self {
        self.objects.push(Object::Domain(owned(name)));
        self
    }

    pub fn string_handle(mut self, value: &str) -> Self {
        self.objects.push(Object::StringHandle(owned(value)));
        self
    }

    pub fn counter(mut self, name: &str, domain: Option<&str>, ty: RawMetadataType) -> Self {
        self.objects.push(Object::Counter {
            name: owned(name),
            domain: domain.map(owned),
            ty,
        });
        self
    }

    /// A histogram owned by the part's domain `domain`. The domain is added
    /// to the part first if the part does not have it yet.
    pub fn histogram(
        mut self,
        domain: &str,
        name: &str,
        x_type: RawMetadataType,
        y_type: RawMetadataType,
    ) -> Self {
        let known = self
            .objects
            .iter()
            .any(|o| matches!(o, Object::Domain(d) if d.as_bytes() == domain.as_bytes()));
        if !known {
            self.objects.push(Object::Domain(owned(domain)));
        }
        self.objects.push(Object::Histogram {
            domain: owned(domain),
            name: owned(name),
            x_type,
            y_type,
        });
        self
    }

    /// A resolution-table row for `symbol`, with `fallback` as its no-op
    /// implementation (may be null).
    pub fn api(mut self, symbol: &str, fallback: *mut c_void) -> Self {
        self.api.push(ApiEntry {
            name: owned(symbol),
            fallback,
        });
        self
    }

    pub fn build(self) -> StaticPart {
        let mut part = StaticPart {
            global: Box::new(IttGlobal::empty()),
            strings: Vec::new(),
            domains: Vec::new(),
            string_handles: Vec::new(),
            counters: Vec::new(),
            histograms: Vec::new(),
            api: Vec::with_capacity(self.api.len() + 1),
            api_names: Vec::with_capacity(self.api.len()),
            slots: Vec::with_capacity(self.api.len()),
        };

        for object in self.objects {
            match object {
                Object::Domain(name) => part.push_domain(name),
                Object::StringHandle(value) => part.push_string_handle(value),
                Object::Counter { name, domain, ty } => part.push_counter(name, domain, ty),
                Object::Histogram {
                    domain,
                    name,
                    x_type,
                    y_type,
                } => part.push_histogram(&domain, name, x_type, y_type),
            }
        }

        for entry in self.api {
            let mut slot = Box::new(ptr::null_mut::<c_void>());
            part.api.push(IttApiInfo {
                name: entry.name.as_ptr(),
                func_ptr: &mut *slot,
                init_func: ptr::null_mut(),
                null_func: entry.fallback,
                group: GROUP_ALL,
            });
            part.api_names.push(entry.name);
            part.slots.push(slot);
        }
        part.api.push(IttApiInfo::terminator());
        part.global.api_list_ptr = part.api.as_mut_ptr();
        part
    }
}

fn owned(s: &str) -> CString {
    CString::new(s).unwrap_or_else(|e| {
        let end = e.nul_position();
        CString::new(&s.as_bytes()[..end]).unwrap_or_default()
    })
}

// ── Static part ──────────────────────────────────────────

/// An owned static part: a `__itt_global` with its object lists and
/// resolution table, all at stable addresses.
///
/// The lists are linked oldest-first, exactly like the C runtime builds them.
pub struct StaticPart {
    global: Box<IttGlobal>,
    strings: Vec<CString>,
    domains: Vec<Box<IttDomain>>,
    string_handles: Vec<Box<IttStringHandle>>,
    counters: Vec<Box<IttCounterInfo>>,
    histograms: Vec<Box<IttHistogram>>,
    api: Vec<IttApiInfo>,
    api_names: Vec<CString>,
    slots: Vec<Box<*mut c_void>>,
}

impl StaticPart {
    pub fn builder() -> StaticPartBuilder {
        StaticPartBuilder::default()
    }

    /// The pointer a static part hands to `__itt_api_init`.
    pub fn global_ptr(&mut self) -> *mut IttGlobal {
        &mut *self.global
    }

    pub fn global(&self) -> &IttGlobal {
        &self.global
    }

    /// Current content of the slot for `symbol`, or `None` if the table has
    /// no such row.
    pub fn slot(&self, symbol: &str) -> Option<*mut c_void> {
        self.api_names
            .iter()
            .position(|n| n.as_bytes() == symbol.as_bytes())
            .map(|i| *self.slots[i])
    }

    /// The part's own domain named `name`, if it created one.
    pub fn domain(&self, name: &str) -> Option<*const IttDomain> {
        self.domains
            .iter()
            .find(|d| unsafe { CStr::from_ptr(d.name) }.to_bytes() == name.as_bytes())
            .map(|d| &**d as *const IttDomain)
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    fn keep(&mut self, s: CString) -> *const std::ffi::c_char {
        let p = s.as_ptr();
        self.strings.push(s);
        p
    }

    fn push_domain(&mut self, name: CString) {
        let name = self.keep(name);
        let mut node = Box::new(IttDomain {
            flags: 1,
            name,
            name_w: ptr::null(),
            extra1: 0,
            extra2: ptr::null_mut(),
            next: ptr::null_mut(),
        });
        let raw: *mut IttDomain = &mut *node;
        match self.domains.last_mut() {
            Some(tail) => tail.next = raw,
            None => self.global.domain_list = raw,
        }
        self.domains.push(node);
    }

    fn push_string_handle(&mut self, value: CString) {
        let value = self.keep(value);
        let mut node = Box::new(IttStringHandle {
            value,
            value_w: ptr::null(),
            extra1: 0,
            extra2: ptr::null_mut(),
            next: ptr::null_mut(),
        });
        let raw: *mut IttStringHandle = &mut *node;
        match self.string_handles.last_mut() {
            Some(tail) => tail.next = raw,
            None => self.global.string_list = raw,
        }
        self.string_handles.push(node);
    }

    fn push_counter(&mut self, name: CString, domain: Option<CString>, ty: RawMetadataType) {
        let name = self.keep(name);
        let domain = match domain {
            Some(d) => self.keep(d),
            None => ptr::null(),
        };
        let mut node = Box::new(IttCounterInfo {
            name,
            name_w: ptr::null(),
            domain,
            domain_w: ptr::null(),
            ty,
            index: self.counters.len() as c_long,
            extra1: 0,
            extra2: ptr::null_mut(),
            next: ptr::null_mut(),
        });
        let raw: *mut IttCounterInfo = &mut *node;
        match self.counters.last_mut() {
            Some(tail) => tail.next = raw,
            None => self.global.counter_list = raw,
        }
        self.counters.push(node);
    }

    fn push_histogram(
        &mut self,
        domain: &CStr,
        name: CString,
        x_type: RawMetadataType,
        y_type: RawMetadataType,
    ) {
        let domain = self
            .domains
            .iter()
            .find(|d| unsafe { CStr::from_ptr(d.name) } == domain)
            .map_or(ptr::null(), |d| &**d as *const IttDomain);
        let name = self.keep(name);
        let mut node = Box::new(IttHistogram {
            domain,
            name,
            name_w: ptr::null(),
            x_type,
            y_type,
            extra1: 0,
            extra2: ptr::null_mut(),
            next: ptr::null_mut(),
        });
        let raw: *mut IttHistogram = &mut *node;
        match self.histograms.last_mut() {
            Some(tail) => tail.next = raw,
            None => self.global.histogram_list = raw,
        }
        self.histograms.push(node);
    }
}

// SAFETY: every raw pointer inside points into heap memory owned by the same
// `StaticPart`; nothing is shared with other values.
unsafe impl Send for StaticPart {}
