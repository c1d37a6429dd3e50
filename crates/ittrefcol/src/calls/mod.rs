//! The collector side of every ITT entry point.
//!
//! Each method admits the call through [`Collector::enter`], does its work
//! and writes exactly one call-log line: INFO for a well-formed call, WARN
//! for a malformed one. A malformed call is a no-op that returns null; it
//! never panics and never reaches the caller as an error.

use std::borrow::Cow;
use std::ffi::{CStr, c_int, c_ulonglong, c_void};
use std::ptr::NonNull;

use ittrefcol_abi::*;
use tracing::debug;

use crate::error::CollectorError;
use crate::lifecycle::{CallGuard, Collector};
use crate::metadata::{
    FormatArg, MetadataType, MetadataValues, RawValues, format_metadata, render_context,
};
use crate::registry::{EventId, Found};

#[cfg(test)]
mod tests;

const INCORRECT_CALL: &str = "Incorrect function call";

fn lossy(s: Option<&CStr>) -> Cow<'_, str> {
    s.map_or(Cow::Borrowed("(null)"), CStr::to_string_lossy)
}

/// # Safety
/// `domain.name` must be null or a NUL-terminated string.
unsafe fn domain_name(domain: &IttDomain) -> Cow<'_, str> {
    lossy(unsafe { c_str(domain.name) })
}

/// # Safety
/// `handle.value` must be null or a NUL-terminated string.
unsafe fn handle_value(handle: &IttStringHandle) -> Cow<'_, str> {
    lossy(unsafe { c_str(handle.value) })
}

/// The log suffix for a find-or-create outcome.
fn outcome<T: Copy>(found: &Found<T>, kind: &str) -> String {
    if found.is_created() {
        format!("created new {kind}")
    } else {
        format!("{kind} already exists")
    }
}

impl Collector {
    // ── Find-or-create ───────────────────────────────────

    pub fn domain_create(&self, name: Option<&CStr>) -> Option<NonNull<IttDomain>> {
        const FUNCTION: &str = "__itt_domain_create";
        let call = self.enter()?;
        let found = name
            .ok_or(CollectorError::Missing("domain name"))
            .and_then(|name| call.registry().find_or_create_domain(name));
        match found {
            Ok(found) => {
                call.log().info(
                    FUNCTION,
                    format_args!("function args: name={} ({})", lossy(name), outcome(&found, "domain")),
                );
                Some(found.get())
            }
            Err(e) => {
                debug!(%e, "{FUNCTION} failed");
                call.log().warn(FUNCTION, format_args!("Cannot create domain object"));
                None
            }
        }
    }

    pub fn string_handle_create(&self, name: Option<&CStr>) -> Option<NonNull<IttStringHandle>> {
        const FUNCTION: &str = "__itt_string_handle_create";
        let call = self.enter()?;
        let found = name
            .ok_or(CollectorError::Missing("string handle name"))
            .and_then(|name| call.registry().find_or_create_string_handle(name));
        match found {
            Ok(found) => {
                call.log().info(
                    FUNCTION,
                    format_args!(
                        "function args: name={} ({})",
                        lossy(name),
                        outcome(&found, "string handle")
                    ),
                );
                Some(found.get())
            }
            Err(e) => {
                debug!(%e, "{FUNCTION} failed");
                call.log().warn(FUNCTION, format_args!("Cannot create string handle object"));
                None
            }
        }
    }

    /// `__itt_counter_create_typed`. A counter is identified by name, domain
    /// name and type together.
    pub fn counter_create_typed(
        &self,
        name: Option<&CStr>,
        domain: Option<&CStr>,
        ty: RawMetadataType,
    ) -> Option<NonNull<IttCounterInfo>> {
        self.counter_create_as("__itt_counter_create_typed", name, domain, ty)
    }

    pub(crate) fn counter_create_as(
        &self,
        function: &str,
        name: Option<&CStr>,
        domain: Option<&CStr>,
        ty: RawMetadataType,
    ) -> Option<NonNull<IttCounterInfo>> {
        let call = self.enter()?;
        counter_create_in(&call, function, name, domain, ty)
    }

    /// `__itt_counter_create_v3`. Unlike the name-based variants the domain
    /// is required: a null domain, or one without a name, is rejected.
    ///
    /// The domain record is only read once the call is admitted, so a stale
    /// handle passed after teardown is never dereferenced.
    ///
    /// # Safety
    /// `domain`, if present, must point to a live domain record.
    pub unsafe fn counter_create_v3(
        &self,
        domain: Option<NonNull<IttDomain>>,
        name: Option<&CStr>,
        ty: RawMetadataType,
    ) -> Option<NonNull<IttCounterInfo>> {
        const FUNCTION: &str = "__itt_counter_create_v3";
        let call = self.enter()?;
        let Some(domain) = domain.and_then(|d| unsafe { c_str(d.as_ref().name) }) else {
            call.log().warn(FUNCTION, format_args!("Cannot create counter object"));
            return None;
        };
        counter_create_in(&call, FUNCTION, name, Some(domain), ty)
    }

    /// `__itt_histogram_create`. The histogram is filed under the registry's
    /// own domain with `domain`'s name, whichever part `domain` came from.
    ///
    /// # Safety
    /// `domain`, if present, must point to a live domain record.
    pub unsafe fn histogram_create(
        &self,
        domain: Option<NonNull<IttDomain>>,
        name: Option<&CStr>,
        x_type: RawMetadataType,
        y_type: RawMetadataType,
    ) -> Option<NonNull<IttHistogram>> {
        const FUNCTION: &str = "__itt_histogram_create";
        let call = self.enter()?;
        let found = match (domain, name) {
            (Some(domain), Some(name)) => unsafe {
                call.registry()
                    .find_or_create_histogram(domain, name, x_type, y_type)
            },
            (None, _) => Err(CollectorError::Missing("histogram domain")),
            (_, None) => Err(CollectorError::Missing("histogram name")),
        };
        match found {
            Ok(found) => {
                let histogram = found.get();
                // SAFETY: registry histograms always point at a registry domain.
                let domain = unsafe { &*histogram.as_ref().domain };
                call.log().info(
                    FUNCTION,
                    format_args!(
                        "function args: domain={}, name={}, x_type={x_type}, y_type={y_type} ({})",
                        unsafe { domain_name(domain) },
                        lossy(name),
                        outcome(&found, "histogram")
                    ),
                );
                Some(histogram)
            }
            Err(e) => {
                debug!(%e, "{FUNCTION} failed");
                call.log().warn(FUNCTION, format_args!("Cannot create histogram object"));
                None
            }
        }
    }

    pub fn event_create(&self, name: Option<&CStr>) -> Option<EventId> {
        const FUNCTION: &str = "__itt_event_create";
        let call = self.enter()?;
        let found = name
            .ok_or(CollectorError::Missing("event name"))
            .and_then(|name| call.registry().find_or_create_event(name));
        match found {
            Ok(found) => {
                call.log().info(
                    FUNCTION,
                    format_args!(
                        "function args: name={} ({}, id={})",
                        lossy(name),
                        outcome(&found, "event"),
                        found.get().raw()
                    ),
                );
                Some(found.get())
            }
            Err(e) => {
                debug!(%e, "{FUNCTION} failed");
                call.log().warn(FUNCTION, format_args!("Cannot create event object"));
                None
            }
        }
    }

    // ── Control ──────────────────────────────────────────

    fn function_call(&self, function: &str) {
        if let Some(call) = self.enter() {
            call.log().info(function, format_args!("function call"));
        }
    }

    fn scoped_call(&self, function: &str, scope: RawCollectionScope) {
        if let Some(call) = self.enter() {
            call.log().info(function, format_args!("function args: scope={scope}"));
        }
    }

    pub fn pause(&self) {
        self.function_call("__itt_pause");
    }

    pub fn resume(&self) {
        self.function_call("__itt_resume");
    }

    pub fn detach(&self) {
        self.function_call("__itt_detach");
    }

    pub fn pause_scoped(&self, scope: RawCollectionScope) {
        self.scoped_call("__itt_pause_scoped", scope);
    }

    pub fn resume_scoped(&self, scope: RawCollectionScope) {
        self.scoped_call("__itt_resume_scoped", scope);
    }

    // ── Tasks, regions, frames, ids ──────────────────────

    /// Logs `function args: domain=<name>` or warns on a missing domain.
    ///
    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    unsafe fn domain_call(&self, function: &str, domain: Option<&IttDomain>) {
        let Some(call) = self.enter() else {
            return;
        };
        match domain {
            Some(domain) => call.log().info(
                function,
                format_args!("function args: domain={}", unsafe { domain_name(domain) }),
            ),
            None => call.log().warn(function, format_args!("{INCORRECT_CALL}")),
        }
    }

    /// # Safety
    /// `domain` and `name`, if present, must be records with valid string
    /// pointers.
    unsafe fn named_domain_call(
        &self,
        function: &str,
        domain: Option<&IttDomain>,
        name: Option<&IttStringHandle>,
    ) {
        let Some(call) = self.enter() else {
            return;
        };
        match (domain, name) {
            (Some(domain), Some(name)) => call.log().info(
                function,
                format_args!(
                    "function args: domain={} handle={}",
                    unsafe { domain_name(domain) },
                    unsafe { handle_value(name) }
                ),
            ),
            _ => call.log().warn(function, format_args!("{INCORRECT_CALL}")),
        }
    }

    /// # Safety
    /// `domain` and `name`, if present, must be records with valid string
    /// pointers.
    pub unsafe fn task_begin(
        &self,
        domain: Option<&IttDomain>,
        _task: IttId,
        _parent: IttId,
        name: Option<&IttStringHandle>,
    ) {
        unsafe { self.named_domain_call("__itt_task_begin", domain, name) }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn task_end(&self, domain: Option<&IttDomain>) {
        unsafe { self.domain_call("__itt_task_end", domain) }
    }

    /// # Safety
    /// As for [`Collector::task_begin`].
    pub unsafe fn region_begin(
        &self,
        domain: Option<&IttDomain>,
        _region: IttId,
        _parent: IttId,
        name: Option<&IttStringHandle>,
    ) {
        unsafe { self.named_domain_call("__itt_region_begin", domain, name) }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn region_end(&self, domain: Option<&IttDomain>, _region: IttId) {
        unsafe { self.domain_call("__itt_region_end", domain) }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn frame_begin(&self, domain: Option<&IttDomain>, _id: Option<&IttId>) {
        unsafe { self.domain_call("__itt_frame_begin_v3", domain) }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn frame_end(&self, domain: Option<&IttDomain>, _id: Option<&IttId>) {
        unsafe { self.domain_call("__itt_frame_end_v3", domain) }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn frame_submit(
        &self,
        domain: Option<&IttDomain>,
        _id: Option<&IttId>,
        begin: c_ulonglong,
        end: c_ulonglong,
    ) {
        const FUNCTION: &str = "__itt_frame_submit_v3";
        let Some(call) = self.enter() else {
            return;
        };
        match domain {
            Some(domain) => call.log().info(
                FUNCTION,
                format_args!(
                    "function args: domain={}, time_begin={begin}, time_end={end}",
                    unsafe { domain_name(domain) }
                ),
            ),
            None => call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}")),
        }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    unsafe fn id_call(&self, function: &str, domain: Option<&IttDomain>, id: IttId) {
        let Some(call) = self.enter() else {
            return;
        };
        match domain {
            Some(domain) if !id.is_null() => call.log().info(
                function,
                format_args!(
                    "function args: domain={} id={}:{}:{}",
                    unsafe { domain_name(domain) },
                    id.d1,
                    id.d2,
                    id.d3
                ),
            ),
            _ => call.log().warn(function, format_args!("{INCORRECT_CALL}")),
        }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn id_create(&self, domain: Option<&IttDomain>, id: IttId) {
        unsafe { self.id_call("__itt_id_create", domain, id) }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn id_destroy(&self, domain: Option<&IttDomain>, id: IttId) {
        unsafe { self.id_call("__itt_id_destroy", domain, id) }
    }

    pub fn thread_set_name(&self, name: Option<&CStr>) {
        const FUNCTION: &str = "__itt_thread_set_name";
        let Some(call) = self.enter() else {
            return;
        };
        match name {
            Some(name) => call
                .log()
                .info(FUNCTION, format_args!("function args: name={}", name.to_string_lossy())),
            None => call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}")),
        }
    }

    fn event_call(&self, function: &str, event: c_int) -> c_int {
        let Some(call) = self.enter() else {
            return 0;
        };
        match EventId::from_raw(event).and_then(|id| call.registry().event_name(id)) {
            Some(name) => {
                call.log().info(
                    function,
                    format_args!("function args: event={} id={event}", name.to_string_lossy()),
                );
                0
            }
            None => {
                call.log().warn(function, format_args!("{INCORRECT_CALL}"));
                -1
            }
        }
    }

    pub fn event_start(&self, event: c_int) -> c_int {
        self.event_call("__itt_event_start", event)
    }

    pub fn event_end(&self, event: c_int) -> c_int {
        self.event_call("__itt_event_end", event)
    }

    // ── Typed payloads ───────────────────────────────────

    /// # Safety
    /// `domain`, if present, must have a valid name pointer; `values` must
    /// satisfy [`RawValues::new`].
    pub unsafe fn metadata_add(
        &self,
        domain: Option<&IttDomain>,
        _id: IttId,
        _key: Option<&IttStringHandle>,
        values: RawValues<'_>,
    ) {
        const FUNCTION: &str = "__itt_metadata_add";
        let Some(call) = self.enter() else {
            return;
        };
        let decoded = match domain {
            Some(domain) if values.count() != 0 => values.decode().map(|rendered| (domain, rendered)),
            _ => Err(CollectorError::Missing("domain or metadata")),
        };
        match decoded {
            Ok((domain, rendered)) => call.log().info(
                FUNCTION,
                format_args!(
                    "function args: domain={} metadata_size={} metadata[]={rendered}",
                    unsafe { domain_name(domain) },
                    values.count()
                ),
            ),
            Err(e) => {
                debug!(%e, "{FUNCTION} rejected");
                call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
            }
        }
    }

    /// # Safety
    /// `domain`, if present, must have a valid name pointer.
    pub unsafe fn metadata_str_add(
        &self,
        domain: Option<&IttDomain>,
        _id: IttId,
        _key: Option<&IttStringHandle>,
        value: Option<&[u8]>,
    ) {
        const FUNCTION: &str = "__itt_metadata_str_add";
        let Some(call) = self.enter() else {
            return;
        };
        match (domain, value) {
            (Some(domain), Some(value)) if !value.is_empty() => call.log().info(
                FUNCTION,
                format_args!(
                    "function args: domain={} metadata_size={} metadata={}",
                    unsafe { domain_name(domain) },
                    value.len(),
                    String::from_utf8_lossy(value)
                ),
            ),
            _ => call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}")),
        }
    }

    /// `__itt_formatted_metadata_add` for Rust callers: renders `format`'s
    /// string against `args` and logs the result.
    ///
    /// # Safety
    /// `domain` and `format`, if present, must be records with valid string
    /// pointers.
    pub unsafe fn formatted_metadata_add(
        &self,
        domain: Option<&IttDomain>,
        format: Option<&IttStringHandle>,
        args: &[FormatArg<'_>],
    ) {
        unsafe {
            self.formatted_metadata_add_with(domain, format, |format| {
                Some(format_metadata(&format.to_string_lossy(), args))
            })
        }
    }

    /// Like [`Collector::formatted_metadata_add`], with rendering left to
    /// `render`. It is only called once the call is admitted and both
    /// records are present; `None` means the format could not be rendered.
    ///
    /// # Safety
    /// As for [`Collector::formatted_metadata_add`].
    pub unsafe fn formatted_metadata_add_with(
        &self,
        domain: Option<&IttDomain>,
        format: Option<&IttStringHandle>,
        render: impl FnOnce(&CStr) -> Option<String>,
    ) {
        const FUNCTION: &str = "__itt_formatted_metadata_add";
        let Some(call) = self.enter() else {
            return;
        };
        let format = format.and_then(|f| unsafe { c_str(f.value) });
        let rendered = match (domain, format) {
            (Some(domain), Some(format)) => render(format).map(|rendered| (domain, rendered)),
            _ => None,
        };
        match rendered {
            Some((domain, rendered)) => call.log().info(
                FUNCTION,
                format_args!(
                    "function args: domain={} formatted_metadata={rendered}",
                    unsafe { domain_name(domain) }
                ),
            ),
            None => call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}")),
        }
    }

    /// Logs one histogram sample batch. `x` is optional; `y` is not.
    ///
    /// # Safety
    /// `histogram`, if present, must be a live histogram record; `x` and `y`
    /// must each be null or point to `length` elements of the histogram's
    /// x and y types.
    pub unsafe fn histogram_submit(
        &self,
        histogram: Option<&IttHistogram>,
        length: usize,
        x: *const c_void,
        y: *const c_void,
    ) {
        const FUNCTION: &str = "__itt_histogram_submit";
        let Some(call) = self.enter() else {
            return;
        };
        let Some(histogram) = histogram else {
            call.log().warn(FUNCTION, format_args!("Histogram is NULL"));
            return;
        };
        let Some(domain) = (unsafe { histogram.domain.as_ref() }) else {
            call.log().warn(FUNCTION, format_args!("Histogram domain is NULL"));
            return;
        };
        let (domain, name) = unsafe { (c_str(domain.name), c_str(histogram.name)) };
        let (Some(domain), Some(name)) = (domain, name) else {
            call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
            return;
        };
        if length == 0 || y.is_null() {
            call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
            return;
        }

        let y_values = match unsafe { RawValues::new(histogram.y_type, length, y) }.decode() {
            Ok(values) => values,
            Err(e) => {
                debug!(%e, "{FUNCTION} rejected");
                call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
                return;
            }
        };
        let x_values = if x.is_null() {
            None
        } else {
            match unsafe { RawValues::new(histogram.x_type, length, x) }.decode() {
                Ok(values) => Some(values),
                Err(e) => {
                    debug!(%e, "{FUNCTION} rejected");
                    call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
                    return;
                }
            }
        };

        let (domain, name) = (domain.to_string_lossy(), name.to_string_lossy());
        match x_values {
            Some(x_values) => call.log().info(
                FUNCTION,
                format_args!(
                    "function args: domain={domain} name={name} histogram_size={length} x[]={x_values} y[]={y_values}"
                ),
            ),
            None => call.log().info(
                FUNCTION,
                format_args!("function args: domain={domain} name={name} histogram_size={length} y[]={y_values}"),
            ),
        }
    }

    /// # Safety
    /// `counter`, if present, must have a valid name pointer; every entry
    /// must satisfy [`crate::metadata::ContextValue::from_raw`].
    pub unsafe fn bind_context_metadata_to_counter(
        &self,
        counter: Option<&IttCounterInfo>,
        metadata: &[IttContextMetadata],
    ) {
        const FUNCTION: &str = "__itt_bind_context_metadata_to_counter";
        let Some(call) = self.enter() else {
            return;
        };
        let Some(counter) = counter.filter(|_| !metadata.is_empty()) else {
            call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
            return;
        };
        match unsafe { render_context(metadata) } {
            Ok(rendered) => call.log().info(
                FUNCTION,
                format_args!(
                    "function args: counter_name={} context_metadata_size={} context_metadata[]={rendered}",
                    lossy(unsafe { c_str(counter.name) }),
                    metadata.len()
                ),
            ),
            Err(e) => {
                debug!(%e, "{FUNCTION} rejected");
                call.log().warn(FUNCTION, format_args!("{INCORRECT_CALL}"));
            }
        }
    }

    /// Logs a counter's new value, read with the counter's own type. A
    /// counter with an unknown type is read as `u64`.
    ///
    /// # Safety
    /// `counter`, if present, must have a valid name pointer; `value` must
    /// be null or point to one element of the counter's type.
    pub unsafe fn counter_set_value(
        &self,
        counter: Option<&IttCounterInfo>,
        value: *const c_void,
    ) {
        unsafe { self.counter_set_value_as("__itt_counter_set_value", counter, value) }
    }

    /// # Safety
    /// As for [`Collector::counter_set_value`].
    pub(crate) unsafe fn counter_set_value_as(
        &self,
        function: &str,
        counter: Option<&IttCounterInfo>,
        value: *const c_void,
    ) {
        let Some(call) = self.enter() else {
            return;
        };
        let Some(counter) = counter.filter(|_| !value.is_null()) else {
            call.log().warn(function, format_args!("{INCORRECT_CALL}"));
            return;
        };
        let ty = match MetadataType::try_from(counter.ty) {
            Ok(ty) => ty.raw(),
            Err(_) => METADATA_U64,
        };
        match unsafe { RawValues::new(ty, 1, value) }.decode() {
            Ok(values) => call.log().info(
                function,
                format_args!(
                    "function args: counter_name={} counter_value={}",
                    lossy(unsafe { c_str(counter.name) }),
                    single(values)
                ),
            ),
            Err(e) => {
                debug!(%e, "{function} rejected");
                call.log().warn(function, format_args!("{INCORRECT_CALL}"));
            }
        }
    }
}

fn counter_create_in(
    call: &CallGuard<'_>,
    function: &str,
    name: Option<&CStr>,
    domain: Option<&CStr>,
    ty: RawMetadataType,
) -> Option<NonNull<IttCounterInfo>> {
    let found = name
        .ok_or(CollectorError::Missing("counter name"))
        .and_then(|name| call.registry().find_or_create_counter(name, domain, ty));
    match found {
        Ok(found) => {
            call.log().info(
                function,
                format_args!(
                    "function args: name={}, domain={}, type={ty} ({})",
                    lossy(name),
                    lossy(domain),
                    outcome(&found, "counter")
                ),
            );
            Some(found.get())
        }
        Err(e) => {
            debug!(%e, "{function} failed");
            call.log().warn(function, format_args!("Cannot create counter object"));
            None
        }
    }
}

/// One decoded value without the list separator.
fn single(values: MetadataValues<'_>) -> String {
    let mut rendered = values.to_string();
    rendered.pop();
    rendered
}
