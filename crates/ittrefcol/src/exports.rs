//! The `__itt_*` symbols a static part resolves.
//!
//! Every function here is a thin shim: it turns raw pointers into options,
//! looks up the process collector and forwards. Before the first
//! `__itt_api_init` there is no collector, and every call is a no-op that
//! returns null.

use std::ffi::{CStr, CString, c_char, c_int, c_ulonglong, c_void};
use std::ptr::{self, NonNull};

use ittrefcol_abi::*;
use tracing::warn;

use crate::binder::{Export, ExportTable};
use crate::lifecycle::{self, Collector};

fn collector() -> Option<&'static Collector> {
    lifecycle::try_global()
}

fn null_or<T>(ptr: Option<NonNull<T>>) -> *mut T {
    ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// # Safety
/// `domain` must be null or point to a live domain record.
unsafe fn domain_ref<'a>(domain: *const IttDomain) -> Option<&'a IttDomain> {
    unsafe { domain.as_ref() }
}

/// # Safety
/// `handle` must be null or point to a live string handle record.
unsafe fn handle_ref<'a>(handle: *const IttStringHandle) -> Option<&'a IttStringHandle> {
    unsafe { handle.as_ref() }
}

/// `__itt_counter` is an opaque pointer to a counter record.
///
/// # Safety
/// `counter` must be null or point to a live counter record.
unsafe fn counter_ref<'a>(counter: *mut c_void) -> Option<&'a IttCounterInfo> {
    unsafe { counter.cast::<IttCounterInfo>().as_ref() }
}

// ── Registration ─────────────────────────────────────────

/// # Safety
/// `part` must be null or point to a live `__itt_global`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_api_init(part: *mut IttGlobal, init_groups: GroupId) {
    let collector = lifecycle::global();
    if let Err(e) = unsafe { collector.register_part(part.as_ref(), init_groups, &EXPORT_TABLE) } {
        warn!(%e, state = ?collector.state(), "static part not registered, its slots stay unbound");
    }
}

/// # Safety
/// `part` is only logged, never dereferenced.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_api_fini(part: *mut IttGlobal) {
    if let Some(collector) = collector() {
        collector.unregister_part(part);
    }
}

// ── Find-or-create ───────────────────────────────────────

/// # Safety
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_domain_create(name: *const c_char) -> *mut IttDomain {
    let Some(collector) = collector() else {
        return ptr::null_mut();
    };
    null_or(collector.domain_create(unsafe { c_str(name) }))
}

/// # Safety
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_string_handle_create(name: *const c_char) -> *mut IttStringHandle {
    let Some(collector) = collector() else {
        return ptr::null_mut();
    };
    null_or(collector.string_handle_create(unsafe { c_str(name) }))
}

/// # Safety
/// `name` and `domain` must each be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_counter_create(name: *const c_char, domain: *const c_char) -> *mut c_void {
    let Some(collector) = collector() else {
        return ptr::null_mut();
    };
    let (name, domain) = unsafe { (c_str(name), c_str(domain)) };
    null_or(collector.counter_create_as("__itt_counter_create", name, domain, METADATA_U64)).cast()
}

/// # Safety
/// `name` and `domain` must each be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_counter_create_typed(
    name: *const c_char,
    domain: *const c_char,
    ty: RawMetadataType,
) -> *mut c_void {
    let Some(collector) = collector() else {
        return ptr::null_mut();
    };
    let (name, domain) = unsafe { (c_str(name), c_str(domain)) };
    null_or(collector.counter_create_typed(name, domain, ty)).cast()
}

/// # Safety
/// `domain` must be null or a live domain record; `name` null or a
/// NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_counter_create_v3(
    domain: *const IttDomain,
    name: *const c_char,
    ty: RawMetadataType,
) -> *mut c_void {
    let Some(collector) = collector() else {
        return ptr::null_mut();
    };
    let domain = NonNull::new(domain.cast_mut());
    null_or(unsafe { collector.counter_create_v3(domain, c_str(name), ty) }).cast()
}

/// # Safety
/// `domain` must be null or a live domain record; `name` null or a
/// NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_histogram_create(
    domain: *const IttDomain,
    name: *const c_char,
    x_type: RawMetadataType,
    y_type: RawMetadataType,
) -> *mut IttHistogram {
    let Some(collector) = collector() else {
        return ptr::null_mut();
    };
    let domain = NonNull::new(domain.cast_mut());
    null_or(unsafe { collector.histogram_create(domain, c_str(name), x_type, y_type) })
}

/// The name is `namelen` bytes long, or NUL-terminated when `namelen` is not
/// positive. It ends at the first NUL either way.
///
/// # Safety
/// `name` must be null or point to a string of the described length.
unsafe fn event_name(name: *const c_char, namelen: c_int) -> Option<CString> {
    if name.is_null() {
        return None;
    }
    let Ok(len @ 1..) = usize::try_from(namelen) else {
        return unsafe { c_str(name) }.map(CStr::to_owned);
    };
    let bytes = unsafe { std::slice::from_raw_parts(name.cast::<u8>(), len) };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    CString::new(&bytes[..end]).ok()
}

/// # Safety
/// `name` must be null or point to `namelen` readable bytes (or a
/// NUL-terminated string when `namelen` is not positive).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_event_create(name: *const c_char, namelen: c_int) -> c_int {
    let Some(collector) = collector() else {
        return 0;
    };
    let name = unsafe { event_name(name, namelen) };
    collector
        .event_create(name.as_deref())
        .map_or(0, |id| id.raw())
}

#[unsafe(no_mangle)]
pub extern "C" fn __itt_event_start(event: c_int) -> c_int {
    collector().map_or(0, |c| c.event_start(event))
}

#[unsafe(no_mangle)]
pub extern "C" fn __itt_event_end(event: c_int) -> c_int {
    collector().map_or(0, |c| c.event_end(event))
}

// ── Control ──────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn __itt_pause() {
    if let Some(c) = collector() {
        c.pause();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __itt_resume() {
    if let Some(c) = collector() {
        c.resume();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __itt_pause_scoped(scope: RawCollectionScope) {
    if let Some(c) = collector() {
        c.pause_scoped(scope);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __itt_resume_scoped(scope: RawCollectionScope) {
    if let Some(c) = collector() {
        c.resume_scoped(scope);
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn __itt_detach() {
    if let Some(c) = collector() {
        c.detach();
    }
}

// ── Tasks, regions, frames, ids ──────────────────────────

/// # Safety
/// `domain` and `name` must each be null or a live record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_task_begin(
    domain: *const IttDomain,
    task: IttId,
    parent: IttId,
    name: *mut IttStringHandle,
) {
    if let Some(c) = collector() {
        unsafe { c.task_begin(domain_ref(domain), task, parent, handle_ref(name)) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_task_end(domain: *const IttDomain) {
    if let Some(c) = collector() {
        unsafe { c.task_end(domain_ref(domain)) };
    }
}

/// # Safety
/// `domain` and `name` must each be null or a live record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_region_begin(
    domain: *const IttDomain,
    region: IttId,
    parent: IttId,
    name: *mut IttStringHandle,
) {
    if let Some(c) = collector() {
        unsafe { c.region_begin(domain_ref(domain), region, parent, handle_ref(name)) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_region_end(domain: *const IttDomain, region: IttId) {
    if let Some(c) = collector() {
        unsafe { c.region_end(domain_ref(domain), region) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record; `id` null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_frame_begin_v3(domain: *const IttDomain, id: *mut IttId) {
    if let Some(c) = collector() {
        unsafe { c.frame_begin(domain_ref(domain), id.as_ref()) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record; `id` null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_frame_end_v3(domain: *const IttDomain, id: *mut IttId) {
    if let Some(c) = collector() {
        unsafe { c.frame_end(domain_ref(domain), id.as_ref()) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record; `id` null or valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_frame_submit_v3(
    domain: *const IttDomain,
    id: *mut IttId,
    begin: c_ulonglong,
    end: c_ulonglong,
) {
    if let Some(c) = collector() {
        unsafe { c.frame_submit(domain_ref(domain), id.as_ref(), begin, end) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_id_create(domain: *const IttDomain, id: IttId) {
    if let Some(c) = collector() {
        unsafe { c.id_create(domain_ref(domain), id) };
    }
}

/// # Safety
/// `domain` must be null or a live domain record.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_id_destroy(domain: *const IttDomain, id: IttId) {
    if let Some(c) = collector() {
        unsafe { c.id_destroy(domain_ref(domain), id) };
    }
}

/// # Safety
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_thread_set_name(name: *const c_char) {
    if let Some(c) = collector() {
        c.thread_set_name(unsafe { c_str(name) });
    }
}

// ── Typed payloads ───────────────────────────────────────

/// # Safety
/// `domain` and `key` must each be null or a live record; `data` must hold
/// `count` elements of type `ty`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_metadata_add(
    domain: *const IttDomain,
    id: IttId,
    key: *mut IttStringHandle,
    ty: RawMetadataType,
    count: usize,
    data: *mut c_void,
) {
    if let Some(c) = collector() {
        unsafe {
            let values = crate::metadata::RawValues::new(ty, count, data);
            c.metadata_add(domain_ref(domain), id, handle_ref(key), values);
        }
    }
}

/// `length == 0` means `data` is NUL-terminated.
///
/// # Safety
/// `domain` and `key` must each be null or a live record; `data` must be
/// null or hold `length` bytes (or a NUL-terminated string).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_metadata_str_add(
    domain: *const IttDomain,
    id: IttId,
    key: *mut IttStringHandle,
    data: *const c_char,
    length: usize,
) {
    let Some(c) = collector() else {
        return;
    };
    let value = match (data.is_null(), length) {
        (true, _) => None,
        (false, 0) => unsafe { c_str(data) }.map(CStr::to_bytes),
        (false, len) => Some(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) }),
    };
    unsafe { c.metadata_str_add(domain_ref(domain), id, handle_ref(key), value) };
}

unsafe extern "C" {
    /// Variadic, so it lives in `csrc/formatted_metadata.c`. The C side
    /// captures the arguments and calls [`ittrefcol_formatted_metadata_add`].
    pub fn __itt_formatted_metadata_add(domain: *const IttDomain, format: *mut IttStringHandle, ...);
}

/// Renders a printf format into `buf` (at most `cap` bytes, NUL included)
/// from the arguments behind `args`. Returns what `vsnprintf` returns.
pub type RenderFn = unsafe extern "C" fn(format: *const c_char, args: *mut c_void, buf: *mut c_char, cap: usize) -> c_int;

unsafe fn render_printf(render: RenderFn, args: *mut c_void, format: &CStr) -> Option<String> {
    let mut buf = vec![0u8; 256];
    loop {
        let n = unsafe { render(format.as_ptr(), args, buf.as_mut_ptr().cast(), buf.len()) };
        let n = usize::try_from(n).ok()?;
        if n < buf.len() {
            buf.truncate(n);
            return Some(String::from_utf8_lossy(&buf).into_owned());
        }
        buf.resize(n + 1, 0);
    }
}

/// Rust half of `__itt_formatted_metadata_add`. `render` is invoked with
/// `args` only once the call is admitted and both records check out.
///
/// # Safety
/// `domain` and `format` must each be null or a live record; `render`, if
/// present, must accept `args` any number of times.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ittrefcol_formatted_metadata_add(
    domain: *const IttDomain,
    format: *mut IttStringHandle,
    render: Option<RenderFn>,
    args: *mut c_void,
) {
    let Some(c) = collector() else {
        return;
    };
    unsafe {
        c.formatted_metadata_add_with(domain_ref(domain), handle_ref(format), |format| {
            render.and_then(|render| render_printf(render, args, format))
        })
    };
}

/// # Safety
/// `histogram` must be null or a live histogram; `x` and `y` null or
/// `length` elements of its axis types.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_histogram_submit(
    histogram: *mut IttHistogram,
    length: usize,
    x: *mut c_void,
    y: *mut c_void,
) {
    if let Some(c) = collector() {
        unsafe { c.histogram_submit(histogram.as_ref(), length, x, y) };
    }
}

/// # Safety
/// `counter` must be null or a live counter; `metadata` null or `length`
/// valid entries.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_bind_context_metadata_to_counter(
    counter: *mut c_void,
    length: usize,
    metadata: *mut IttContextMetadata,
) {
    let Some(c) = collector() else {
        return;
    };
    let metadata: &[IttContextMetadata] = if metadata.is_null() {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(metadata, length) }
    };
    unsafe { c.bind_context_metadata_to_counter(counter_ref(counter), metadata) };
}

/// # Safety
/// `counter` must be null or a live counter; `value` null or one element of
/// the counter's type.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_counter_set_value(counter: *mut c_void, value: *mut c_void) {
    if let Some(c) = collector() {
        unsafe { c.counter_set_value(counter_ref(counter), value) };
    }
}

/// # Safety
/// As for [`__itt_counter_set_value`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn __itt_counter_set_value_v3(counter: *mut c_void, value: *mut c_void) {
    if let Some(c) = collector() {
        unsafe { c.counter_set_value_as("__itt_counter_set_value_v3", counter_ref(counter), value) };
    }
}

// ── Export table ─────────────────────────────────────────

macro_rules! exports {
    ($($symbol:ident),* $(,)?) => {
        static EXPORTS: &[Export] = &[
            $(Export {
                name: match CStr::from_bytes_with_nul(concat!(stringify!($symbol), "\0").as_bytes()) {
                    Ok(name) => name,
                    Err(_) => panic!("symbol name contains a NUL"),
                },
                addr: $symbol as *const c_void,
            }),*
        ];
    };
}

exports! {
    __itt_api_init,
    __itt_api_fini,
    __itt_domain_create,
    __itt_string_handle_create,
    __itt_counter_create,
    __itt_counter_create_typed,
    __itt_counter_create_v3,
    __itt_histogram_create,
    __itt_event_create,
    __itt_event_start,
    __itt_event_end,
    __itt_pause,
    __itt_resume,
    __itt_pause_scoped,
    __itt_resume_scoped,
    __itt_detach,
    __itt_task_begin,
    __itt_task_end,
    __itt_region_begin,
    __itt_region_end,
    __itt_frame_begin_v3,
    __itt_frame_end_v3,
    __itt_frame_submit_v3,
    __itt_id_create,
    __itt_id_destroy,
    __itt_thread_set_name,
    __itt_metadata_add,
    __itt_metadata_str_add,
    __itt_formatted_metadata_add,
    __itt_histogram_submit,
    __itt_bind_context_metadata_to_counter,
    __itt_counter_set_value,
    __itt_counter_set_value_v3,
}

/// Every entry point this collector implements, by ITT symbol name.
pub static EXPORT_TABLE: ExportTable = ExportTable::new(EXPORTS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_table_covers_every_entry_point() {
        assert_eq!(EXPORT_TABLE.len(), 33);
        let names: Vec<_> = EXPORT_TABLE.names().collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
        assert!(names.iter().all(|n| n.to_bytes().starts_with(b"__itt_")));
    }

    #[test]
    fn export_table_resolves_to_the_exported_functions() {
        use crate::binder::SymbolSource;
        let addr = EXPORT_TABLE.resolve(c"__itt_domain_create").unwrap();
        assert_eq!(addr.as_ptr(), __itt_domain_create as *mut c_void);
        assert!(EXPORT_TABLE.resolve(c"__itt_model_site_begin").is_none());
    }

    #[test]
    fn event_names_honor_length_and_nul() {
        let raw = c"flush_all".as_ptr();
        unsafe {
            assert_eq!(event_name(raw, 5).as_deref(), Some(c"flush"));
            assert_eq!(event_name(raw, 0).as_deref(), Some(c"flush_all"));
            assert_eq!(event_name(raw, -1).as_deref(), Some(c"flush_all"));
            let embedded = b"ab\0cd";
            assert_eq!(event_name(embedded.as_ptr().cast(), 5).as_deref(), Some(c"ab"));
            assert_eq!(event_name(ptr::null(), 3), None);
        }
    }
}
