use std::ffi::{CStr, c_char, c_int, c_long, c_uint, c_ulong, c_ulonglong, c_void};
use std::ptr;

use crate::tags::{RawContextType, RawMetadataType};

#[cfg(unix)]
pub type RawMutex = libc::pthread_mutex_t;
/// `CRITICAL_SECTION`; the collector never touches it, only its size matters.
#[cfg(windows)]
pub type RawMutex = [usize; 5];

/// `__itt_domain`.
#[repr(C)]
#[derive(Debug)]
pub struct IttDomain {
    /// Non-zero when the domain is enabled. Static-part macros read this
    /// before every call routed through the domain.
    pub flags: c_int,
    pub name: *const c_char,
    pub name_w: *const c_void,
    pub extra1: c_int,
    pub extra2: *mut c_void,
    pub next: *mut IttDomain,
}

/// `__itt_string_handle`.
#[repr(C)]
#[derive(Debug)]
pub struct IttStringHandle {
    pub value: *const c_char,
    pub value_w: *const c_void,
    pub extra1: c_int,
    pub extra2: *mut c_void,
    pub next: *mut IttStringHandle,
}

/// `__itt_counter_info_t`. An `__itt_counter` handle is a pointer to one of these.
#[repr(C)]
#[derive(Debug)]
pub struct IttCounterInfo {
    pub name: *const c_char,
    pub name_w: *const c_void,
    pub domain: *const c_char,
    pub domain_w: *const c_void,
    pub ty: c_int,
    pub index: c_long,
    pub extra1: c_int,
    pub extra2: *mut c_void,
    pub next: *mut IttCounterInfo,
}

/// `__itt_histogram`. The domain is borrowed, never owned.
#[repr(C)]
#[derive(Debug)]
pub struct IttHistogram {
    pub domain: *const IttDomain,
    pub name: *const c_char,
    pub name_w: *const c_void,
    pub x_type: RawMetadataType,
    pub y_type: RawMetadataType,
    pub extra1: c_int,
    pub extra2: *mut c_void,
    pub next: *mut IttHistogram,
}

/// One row of a static part's resolution table. The table ends with a row
/// whose `name` is null.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IttApiInfo {
    pub name: *const c_char,
    pub func_ptr: *mut *mut c_void,
    pub init_func: *mut c_void,
    pub null_func: *mut c_void,
    pub group: c_uint,
}

impl IttApiInfo {
    pub const fn terminator() -> Self {
        Self {
            name: ptr::null(),
            func_ptr: ptr::null_mut(),
            init_func: ptr::null_mut(),
            null_func: ptr::null_mut(),
            group: 0,
        }
    }
}

/// `__itt_global`: everything a static part owns.
#[repr(C)]
pub struct IttGlobal {
    pub magic: [u8; 0x10],
    pub version_major: c_ulong,
    pub version_minor: c_ulong,
    pub version_build: c_ulong,
    pub api_initialized: c_long,
    pub mutex_initialized: c_long,
    pub atomic_counter: c_long,
    pub mutex: RawMutex,
    pub lib: *mut c_void,
    pub error_handler: *mut c_void,
    pub dll_path_ptr: *mut *const c_char,
    pub api_list_ptr: *mut IttApiInfo,
    pub next: *mut IttGlobal,
    pub thread_list: *mut c_void,
    pub domain_list: *mut IttDomain,
    pub string_list: *mut IttStringHandle,
    pub state: c_int,
    pub counter_list: *mut IttCounterInfo,
    pub ipt_collect_events: c_uint,
    pub histogram_list: *mut IttHistogram,
    pub counter_metadata_list: *mut c_void,
}

impl IttGlobal {
    /// A zeroed record with the magic and version filled in, the way a
    /// static part's initializer leaves it before any object exists.
    pub fn empty() -> Self {
        let mut magic = [0u8; 0x10];
        magic[..crate::ITT_MAGIC.len()].copy_from_slice(&crate::ITT_MAGIC);
        Self {
            magic,
            version_major: crate::ITT_MAJOR as c_ulong,
            version_minor: crate::ITT_MINOR as c_ulong,
            version_build: 0,
            api_initialized: 0,
            mutex_initialized: 0,
            atomic_counter: 0,
            // SAFETY: an all-zero pthread mutex is PTHREAD_MUTEX_INITIALIZER on
            // every supported libc; the collector never locks it anyway.
            mutex: unsafe { std::mem::zeroed() },
            lib: ptr::null_mut(),
            error_handler: ptr::null_mut(),
            dll_path_ptr: ptr::null_mut(),
            api_list_ptr: ptr::null_mut(),
            next: ptr::null_mut(),
            thread_list: ptr::null_mut(),
            domain_list: ptr::null_mut(),
            string_list: ptr::null_mut(),
            state: 0,
            counter_list: ptr::null_mut(),
            ipt_collect_events: 0,
            histogram_list: ptr::null_mut(),
            counter_metadata_list: ptr::null_mut(),
        }
    }

    pub fn has_magic(&self) -> bool {
        self.magic.starts_with(&crate::ITT_MAGIC)
    }
}

/// `__itt_id`, passed by value.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IttId {
    pub d1: c_ulonglong,
    pub d2: c_ulonglong,
    pub d3: c_ulonglong,
}

impl IttId {
    pub const NULL: IttId = IttId { d1: 0, d2: 0, d3: 0 };

    pub const fn new(addr: c_ulonglong, extra: c_ulonglong) -> Self {
        Self {
            d1: addr,
            d2: extra,
            d3: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// `__itt_context_metadata`: a tag and a pointer to either a C string or a
/// `u64`, depending on the tag.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IttContextMetadata {
    pub ty: RawContextType,
    pub value: *mut c_void,
}

/// Borrow a C string field, treating null as absent.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) })
    }
}
