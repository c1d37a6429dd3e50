//! Process-wide object registry shared by every static part.
//!
//! Domains, string handles, counters, histograms and event names live here,
//! deduplicated by identity key, and are handed out as pointers to
//! `#[repr(C)]` records that C callers read directly. Nodes are boxed so
//! their addresses never move; nothing is removed before [`Registry::clear`].
//!
//! Every lookup and append happens under one mutex. Object creation is rare
//! next to task/frame traffic, which never touches the registry.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_int, c_long};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};

use facet::Facet;
use ittrefcol_abi::*;
use parking_lot::{Mutex, MutexGuard};

use crate::error::CollectorError;


// ── Nodes ────────────────────────────────────────────────
//
// Each node starts with its ABI record so a pointer to the node is a valid
// pointer to the record. The record's string fields point into the CStrings
// owned by the same node.

#[repr(C)]
struct DomainNode {
    raw: IttDomain,
    name: CString,
}

#[repr(C)]
struct StringNode {
    raw: IttStringHandle,
    value: CString,
}

#[repr(C)]
struct CounterNode {
    raw: IttCounterInfo,
    name: CString,
    domain: Option<CString>,
}

#[repr(C)]
struct HistogramNode {
    raw: IttHistogram,
    name: CString,
    domain_name: CString,
}

// SAFETY: the raw pointers in a node point at heap data owned by the node or
// at another node of the same registry, and nodes are never mutated after
// creation.
unsafe impl Send for DomainNode {}
unsafe impl Send for StringNode {}
unsafe impl Send for CounterNode {}
unsafe impl Send for HistogramNode {}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    name: CString,
    domain: Option<CString>,
    ty: RawMetadataType,
}

/// Keyed by the canonical domain's address plus the histogram name.
type HistogramKey = (usize, CString);

#[derive(Default)]
struct Lists {
    domains: Vec<Box<DomainNode>>,
    domain_index: HashMap<CString, usize>,
    strings: Vec<Box<StringNode>>,
    string_index: HashMap<CString, usize>,
    counters: Vec<Box<CounterNode>>,
    counter_index: HashMap<CounterKey, usize>,
    histograms: Vec<Box<HistogramNode>>,
    histogram_index: HashMap<HistogramKey, usize>,
    events: Vec<CString>,
    event_index: HashMap<CString, usize>,
}

fn reserve<T, K: std::hash::Hash + Eq, V>(
    list: &mut Vec<T>,
    index: &mut HashMap<K, V>,
    what: &'static str,
) -> Result<(), CollectorError> {
    list.try_reserve(1).map_err(|_| CollectorError::OutOfMemory(what))?;
    index.try_reserve(1).map_err(|_| CollectorError::OutOfMemory(what))
}

impl Lists {
    fn domain(&mut self, name: &CStr) -> Result<Found<NonNull<IttDomain>>, CollectorError> {
        if let Some(&i) = self.domain_index.get(name) {
            return Ok(Found::Existing(NonNull::from(&mut self.domains[i].raw)));
        }
        reserve(&mut self.domains, &mut self.domain_index, "domain")?;
        let mut node = Box::new(DomainNode {
            raw: IttDomain {
                flags: 1,
                name: ptr::null(),
                name_w: ptr::null(),
                extra1: 0,
                extra2: ptr::null_mut(),
                next: ptr::null_mut(),
            },
            name: name.to_owned(),
        });
        node.raw.name = node.name.as_ptr();
        let handle = NonNull::from(&mut node.raw);
        self.domain_index.insert(name.to_owned(), self.domains.len());
        self.domains.push(node);
        Ok(Found::Created(handle))
    }

    fn find_domain(&mut self, name: &CStr) -> Option<NonNull<IttDomain>> {
        let &i = self.domain_index.get(name)?;
        Some(NonNull::from(&mut self.domains[i].raw))
    }

    fn string_handle(&mut self, value: &CStr) -> Result<Found<NonNull<IttStringHandle>>, CollectorError> {
        if let Some(&i) = self.string_index.get(value) {
            return Ok(Found::Existing(NonNull::from(&mut self.strings[i].raw)));
        }
        reserve(&mut self.strings, &mut self.string_index, "string handle")?;
        let mut node = Box::new(StringNode {
            raw: IttStringHandle {
                value: ptr::null(),
                value_w: ptr::null(),
                extra1: 0,
                extra2: ptr::null_mut(),
                next: ptr::null_mut(),
            },
            value: value.to_owned(),
        });
        node.raw.value = node.value.as_ptr();
        let handle = NonNull::from(&mut node.raw);
        self.string_index.insert(value.to_owned(), self.strings.len());
        self.strings.push(node);
        Ok(Found::Created(handle))
    }

    fn counter(
        &mut self,
        name: &CStr,
        domain: Option<&CStr>,
        ty: RawMetadataType,
    ) -> Result<Found<NonNull<IttCounterInfo>>, CollectorError> {
        let key = CounterKey {
            name: name.to_owned(),
            domain: domain.map(CStr::to_owned),
            ty,
        };
        if let Some(&i) = self.counter_index.get(&key) {
            return Ok(Found::Existing(NonNull::from(&mut self.counters[i].raw)));
        }
        reserve(&mut self.counters, &mut self.counter_index, "counter")?;
        let mut node = Box::new(CounterNode {
            raw: IttCounterInfo {
                name: ptr::null(),
                name_w: ptr::null(),
                domain: ptr::null(),
                domain_w: ptr::null(),
                ty,
                index: self.counters.len() as c_long,
                extra1: 0,
                extra2: ptr::null_mut(),
                next: ptr::null_mut(),
            },
            name: key.name.clone(),
            domain: key.domain.clone(),
        });
        node.raw.name = node.name.as_ptr();
        node.raw.domain = node.domain.as_deref().map_or(ptr::null(), CStr::as_ptr);
        let handle = NonNull::from(&mut node.raw);
        self.counter_index.insert(key, self.counters.len());
        self.counters.push(node);
        Ok(Found::Created(handle))
    }

    fn histogram(
        &mut self,
        domain: NonNull<IttDomain>,
        domain_name: &CStr,
        name: &CStr,
        x_type: RawMetadataType,
        y_type: RawMetadataType,
    ) -> Result<Found<NonNull<IttHistogram>>, CollectorError> {
        let key = (domain.as_ptr() as usize, name.to_owned());
        if let Some(&i) = self.histogram_index.get(&key) {
            return Ok(Found::Existing(NonNull::from(&mut self.histograms[i].raw)));
        }
        reserve(&mut self.histograms, &mut self.histogram_index, "histogram")?;
        let mut node = Box::new(HistogramNode {
            raw: IttHistogram {
                domain: domain.as_ptr(),
                name: ptr::null(),
                name_w: ptr::null(),
                x_type,
                y_type,
                extra1: 0,
                extra2: ptr::null_mut(),
                next: ptr::null_mut(),
            },
            name: key.1.clone(),
            domain_name: domain_name.to_owned(),
        });
        node.raw.name = node.name.as_ptr();
        let handle = NonNull::from(&mut node.raw);
        self.histogram_index.insert(key, self.histograms.len());
        self.histograms.push(node);
        Ok(Found::Created(handle))
    }

    fn event(&mut self, name: &CStr) -> Result<Found<EventId>, CollectorError> {
        if let Some(&i) = self.event_index.get(name) {
            return Ok(Found::Existing(EventId::from_index(i)));
        }
        reserve(&mut self.events, &mut self.event_index, "event")?;
        let index = self.events.len();
        self.events.push(name.to_owned());
        self.event_index.insert(name.to_owned(), index);
        Ok(Found::Created(EventId::from_index(index)))
    }
}

// ── Public surface ───────────────────────────────────────

/// Result of a find-or-create: which of the two happened, and the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Found<T> {
    Created(T),
    Existing(T),
}

impl<T: Copy> Found<T> {
    pub fn get(self) -> T {
        match self {
            Found::Created(v) | Found::Existing(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Found::Created(_))
    }
}

/// `__itt_event`: a 1-based id, so 0 never names an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(c_int);

impl EventId {
    fn from_index(index: usize) -> Self {
        Self(c_int::try_from(index + 1).unwrap_or(c_int::MAX))
    }

    pub fn from_raw(raw: c_int) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn raw(self) -> c_int {
        self.0
    }

    fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

pub struct Registry {
    lists: Mutex<Lists>,
    ready: AtomicBool,
}

impl Registry {
    /// An uninitialized registry: every operation fails with
    /// [`CollectorError::RegistryNotReady`] until [`Registry::mark_ready`].
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(Lists::default()),
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Lists>, CollectorError> {
        if !self.is_ready() {
            return Err(CollectorError::RegistryNotReady);
        }
        Ok(self.lists.lock())
    }

    pub fn find_or_create_domain(&self, name: &CStr) -> Result<Found<NonNull<IttDomain>>, CollectorError> {
        self.lock()?.domain(name)
    }

    pub fn find_or_create_string_handle(
        &self,
        value: &CStr,
    ) -> Result<Found<NonNull<IttStringHandle>>, CollectorError> {
        self.lock()?.string_handle(value)
    }

    /// Identity is the whole `(name, domain, type)` triple.
    pub fn find_or_create_counter(
        &self,
        name: &CStr,
        domain: Option<&CStr>,
        ty: RawMetadataType,
    ) -> Result<Found<NonNull<IttCounterInfo>>, CollectorError> {
        self.lock()?.counter(name, domain, ty)
    }

    /// Identity is `(domain, name)`; the axis types of a later request never
    /// change an existing histogram.
    ///
    /// `domain` may belong to a static part rather than to this registry. It
    /// is resolved by name to the registry's own domain first, so every part
    /// lands on the same histogram. That domain must already exist; it is
    /// never created here.
    ///
    /// # Safety
    /// `domain` must point to a live `__itt_domain` whose name is null or a
    /// NUL-terminated string.
    pub unsafe fn find_or_create_histogram(
        &self,
        domain: NonNull<IttDomain>,
        name: &CStr,
        x_type: RawMetadataType,
        y_type: RawMetadataType,
    ) -> Result<Found<NonNull<IttHistogram>>, CollectorError> {
        let domain_name = unsafe { c_str(domain.as_ref().name) }.ok_or(CollectorError::Missing("domain name"))?;
        let mut lists = self.lock()?;
        let canonical = lists
            .find_domain(domain_name)
            .ok_or_else(|| CollectorError::UnknownDomain(domain_name.to_string_lossy().into_owned()))?;
        lists.histogram(canonical, domain_name, name, x_type, y_type)
    }

    /// `__itt_event_create`: events are interned by name.
    pub fn find_or_create_event(&self, name: &CStr) -> Result<Found<EventId>, CollectorError> {
        self.lock()?.event(name)
    }

    pub fn event_name(&self, id: EventId) -> Option<CString> {
        self.lock().ok()?.events.get(id.index()).cloned()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let lists = self.lists.lock();
        let lossy = |s: &CStr| s.to_string_lossy().into_owned();
        RegistrySnapshot {
            domains: lists.domains.iter().map(|d| lossy(d.name.as_c_str())).collect(),
            string_handles: lists.strings.iter().map(|s| lossy(s.value.as_c_str())).collect(),
            counters: lists
                .counters
                .iter()
                .map(|c| CounterSnapshot {
                    name: lossy(c.name.as_c_str()),
                    domain: c.domain.as_deref().map(lossy),
                    ty: c.raw.ty,
                })
                .collect(),
            histograms: lists
                .histograms
                .iter()
                .map(|h| HistogramSnapshot {
                    domain: lossy(h.domain_name.as_c_str()),
                    name: lossy(h.name.as_c_str()),
                    x_type: h.raw.x_type,
                    y_type: h.raw.y_type,
                })
                .collect(),
            events: lists.events.iter().map(|e| lossy(e.as_c_str())).collect(),
        }
    }

    /// Frees every object and marks the registry uninitialized again. Only
    /// the first call after [`Registry::mark_ready`] frees anything.
    pub fn clear(&self) -> bool {
        let mut lists = self.lists.lock();
        if !self.ready.swap(false, Ordering::AcqRel) {
            return false;
        }
        *lists = Lists::default();
        true
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Snapshot ─────────────────────────────────────────────

/// Everything the registry holds, in creation order. Written to the call
/// log as JSON at teardown.
#[derive(Facet, Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub domains: Vec<String>,
    pub string_handles: Vec<String>,
    pub counters: Vec<CounterSnapshot>,
    pub histograms: Vec<HistogramSnapshot>,
    pub events: Vec<String>,
}

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub name: String,
    pub domain: Option<String>,
    pub ty: i32,
}

#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub domain: String,
    pub name: String,
    pub x_type: i32,
    pub y_type: i32,
}
