use super::*;
use crate::config::CollectorConfig;
use crate::log::read_lines;
use crate::metadata::FormatArg;
use tempfile::TempDir;

fn active_collector() -> (TempDir, Collector) {
    let dir = tempfile::tempdir().unwrap();
    let collector = Collector::new(CollectorConfig::with_log_dir(dir.path()));
    collector.start();
    (dir, collector)
}

fn lines(collector: &Collector) -> Vec<String> {
    read_lines(&collector.log().path().expect("call log should be open")).unwrap()
}

fn domain<'a>(collector: &Collector, name: &CStr) -> &'a IttDomain {
    let ptr = collector.domain_create(Some(name)).unwrap();
    unsafe { &*ptr.as_ptr() }
}

#[test]
fn repeated_counter_create_returns_the_first_counter() {
    let (_dir, collector) = active_collector();
    collector.domain_create(Some(c"app")).unwrap();
    let first = collector
        .counter_create_typed(Some(c"loop_iters"), Some(c"app"), METADATA_U64)
        .unwrap();
    let second = collector
        .counter_create_typed(Some(c"loop_iters"), Some(c"app"), METADATA_U64)
        .unwrap();
    assert_eq!(first, second);

    let snapshot = collector.registry().snapshot();
    assert_eq!(snapshot.domains.len(), 1);
    assert_eq!(snapshot.counters.len(), 1);
    assert_eq!(
        lines(&collector),
        vec![
            "[INFO] __itt_domain_create(...) - function args: name=app (created new domain)".to_string(),
            "[INFO] __itt_counter_create_typed(...) - function args: name=loop_iters, domain=app, type=1 (created new counter)".to_string(),
            "[INFO] __itt_counter_create_typed(...) - function args: name=loop_iters, domain=app, type=1 (counter already exists)".to_string(),
        ]
    );
}

#[test]
fn null_arguments_produce_one_warning_each() {
    let (_dir, collector) = active_collector();
    assert!(collector.domain_create(None).is_none());
    assert!(collector.string_handle_create(None).is_none());
    assert!(collector.counter_create_typed(None, Some(c"app"), METADATA_U64).is_none());
    assert!(unsafe { collector.histogram_create(None, Some(c"h"), METADATA_U64, METADATA_U64) }.is_none());
    unsafe {
        collector.task_begin(None, IttId::NULL, IttId::NULL, None);
        collector.task_end(None);
        collector.histogram_submit(None, 1, std::ptr::null(), std::ptr::null());
        collector.counter_set_value(None, std::ptr::null());
    }
    assert_eq!(
        lines(&collector),
        vec![
            "[WARN] __itt_domain_create(...) - Cannot create domain object".to_string(),
            "[WARN] __itt_string_handle_create(...) - Cannot create string handle object".to_string(),
            "[WARN] __itt_counter_create_typed(...) - Cannot create counter object".to_string(),
            "[WARN] __itt_histogram_create(...) - Cannot create histogram object".to_string(),
            "[WARN] __itt_task_begin(...) - Incorrect function call".to_string(),
            "[WARN] __itt_task_end(...) - Incorrect function call".to_string(),
            "[WARN] __itt_histogram_submit(...) - Histogram is NULL".to_string(),
            "[WARN] __itt_counter_set_value(...) - Incorrect function call".to_string(),
        ]
    );
    assert_eq!(collector.registry().snapshot(), Default::default());
}

fn foreign_domain(name: &CStr) -> IttDomain {
    IttDomain {
        flags: 1,
        name: name.as_ptr(),
        name_w: std::ptr::null(),
        extra1: 0,
        extra2: std::ptr::null_mut(),
        next: std::ptr::null_mut(),
    }
}

#[test]
fn counter_v3_files_the_counter_under_its_domain() {
    let (_dir, collector) = active_collector();
    let app = collector.domain_create(Some(c"app")).unwrap();
    let counter = unsafe { collector.counter_create_v3(Some(app), Some(c"bytes"), METADATA_U64) };
    assert!(counter.is_some());
    assert_eq!(
        lines(&collector)[1],
        "[INFO] __itt_counter_create_v3(...) - function args: name=bytes, domain=app, type=1 (created new counter)"
    );
}

#[test]
fn counter_v3_requires_a_named_domain() {
    let (_dir, collector) = active_collector();
    let mut nameless = foreign_domain(c"unused");
    nameless.name = std::ptr::null();
    unsafe {
        assert!(collector.counter_create_v3(None, Some(c"orphan"), METADATA_U64).is_none());
        assert!(
            collector
                .counter_create_v3(Some(NonNull::from(&mut nameless)), Some(c"orphan"), METADATA_U64)
                .is_none()
        );
    }
    assert_eq!(
        lines(&collector),
        vec![
            "[WARN] __itt_counter_create_v3(...) - Cannot create counter object".to_string(),
            "[WARN] __itt_counter_create_v3(...) - Cannot create counter object".to_string(),
        ]
    );
    assert!(collector.registry().snapshot().counters.is_empty());
}

#[test]
fn counter_v3_after_teardown_leaves_the_domain_untouched() {
    let (_dir, collector) = active_collector();
    let path = collector.log().path().unwrap();
    assert!(collector.teardown());
    let before = read_lines(&path).unwrap();

    // Never dereferenced: the call is refused before the domain is read.
    let stale = NonNull::<IttDomain>::dangling();
    assert!(unsafe { collector.counter_create_v3(Some(stale), Some(c"late"), METADATA_U64) }.is_none());
    assert_eq!(read_lines(&path).unwrap(), before);
}

#[test]
fn histogram_on_an_unknown_domain_is_refused() {
    let (_dir, collector) = active_collector();
    let mut npu = foreign_domain(c"npu");
    let histogram = unsafe {
        collector.histogram_create(Some(NonNull::from(&mut npu)), Some(c"latency"), METADATA_U64, METADATA_U64)
    };
    assert!(histogram.is_none());
    assert_eq!(
        lines(&collector),
        vec!["[WARN] __itt_histogram_create(...) - Cannot create histogram object".to_string()]
    );
    assert_eq!(collector.registry().snapshot(), Default::default());
}

#[test]
fn task_and_frame_calls_name_their_domain() {
    let (_dir, collector) = active_collector();
    let app = domain(&collector, c"app");
    let task = collector.string_handle_create(Some(c"load")).unwrap();
    unsafe {
        collector.task_begin(Some(app), IttId::new(1, 0), IttId::NULL, Some(task.as_ref()));
        collector.task_end(Some(app));
        collector.frame_begin(Some(app), None);
        collector.frame_submit(Some(app), None, 10, 20);
    }
    let lines = lines(&collector);
    assert_eq!(&lines[2], "[INFO] __itt_task_begin(...) - function args: domain=app handle=load");
    assert_eq!(&lines[3], "[INFO] __itt_task_end(...) - function args: domain=app");
    assert_eq!(&lines[4], "[INFO] __itt_frame_begin_v3(...) - function args: domain=app");
    assert_eq!(
        &lines[5],
        "[INFO] __itt_frame_submit_v3(...) - function args: domain=app, time_begin=10, time_end=20"
    );
}

#[test]
fn control_calls_log_scope() {
    let (_dir, collector) = active_collector();
    collector.pause();
    collector.resume_scoped(COLLECTION_SCOPE_HOST);
    collector.detach();
    assert_eq!(
        lines(&collector),
        vec![
            "[INFO] __itt_pause(...) - function call".to_string(),
            format!("[INFO] __itt_resume_scoped(...) - function args: scope={COLLECTION_SCOPE_HOST}"),
            "[INFO] __itt_detach(...) - function call".to_string(),
        ]
    );
}

#[test]
fn metadata_renders_typed_values() {
    let (_dir, collector) = active_collector();
    let app = domain(&collector, c"app");
    let ints = [1u64, 2, 3];
    let doubles = [0.5f64];
    unsafe {
        collector.metadata_add(Some(app), IttId::NULL, None, RawValues::from_slice(&ints));
        collector.metadata_add(Some(app), IttId::NULL, None, RawValues::from_slice(&doubles));
    }
    let lines = lines(&collector);
    assert_eq!(
        &lines[1],
        "[INFO] __itt_metadata_add(...) - function args: domain=app metadata_size=3 metadata[]=1;2;3;"
    );
    assert_eq!(
        &lines[2],
        "[INFO] __itt_metadata_add(...) - function args: domain=app metadata_size=1 metadata[]=0.500000;"
    );
}

#[test]
fn metadata_with_unknown_type_only_warns() {
    let (_dir, collector) = active_collector();
    let app = domain(&collector, c"app");
    let data = [7u64];
    unsafe {
        let raw = RawValues::new(99, 1, data.as_ptr().cast());
        collector.metadata_add(Some(app), IttId::NULL, None, raw);
        collector.metadata_add(Some(app), IttId::NULL, None, RawValues::from_slice::<u64>(&[]));
    }
    let lines = lines(&collector);
    assert_eq!(lines.len(), 3);
    assert!(lines[1..].iter().all(|l| l == "[WARN] __itt_metadata_add(...) - Incorrect function call"));
}

#[test]
fn string_metadata_is_logged_verbatim() {
    let (_dir, collector) = active_collector();
    let app = domain(&collector, c"app");
    unsafe { collector.metadata_str_add(Some(app), IttId::NULL, None, Some(&b"warm start"[..])) };
    assert_eq!(
        lines(&collector)[1],
        "[INFO] __itt_metadata_str_add(...) - function args: domain=app metadata_size=10 metadata=warm start"
    );
}

#[test]
fn formatted_metadata_substitutes_args() {
    let (_dir, collector) = active_collector();
    let app = domain(&collector, c"app");
    let format = collector.string_handle_create(Some(c"iter=%d name=%s")).unwrap();
    unsafe {
        collector.formatted_metadata_add(
            Some(app),
            Some(format.as_ref()),
            &[FormatArg::Int(3), FormatArg::Str("warmup")],
        );
        collector.formatted_metadata_add(Some(app), None, &[]);
    }
    let lines = lines(&collector);
    assert_eq!(
        &lines[2],
        "[INFO] __itt_formatted_metadata_add(...) - function args: domain=app formatted_metadata=iter=3 name=warmup"
    );
    assert_eq!(&lines[3], "[WARN] __itt_formatted_metadata_add(...) - Incorrect function call");
}

#[test]
fn formatted_metadata_that_cannot_render_only_warns() {
    let (_dir, collector) = active_collector();
    let app = domain(&collector, c"app");
    let format = collector.string_handle_create(Some(c"%q")).unwrap();
    let mut rendered = 0;
    unsafe {
        collector.formatted_metadata_add_with(Some(app), Some(format.as_ref()), |_| {
            rendered += 1;
            None
        });
        collector.formatted_metadata_add_with(None, Some(format.as_ref()), |_| {
            rendered += 1;
            Some(String::new())
        });
    }
    assert_eq!(rendered, 1);
    let lines = lines(&collector);
    assert_eq!(&lines[2], "[WARN] __itt_formatted_metadata_add(...) - Incorrect function call");
    assert_eq!(&lines[3], "[WARN] __itt_formatted_metadata_add(...) - Incorrect function call");
}

#[test]
fn histogram_submit_renders_each_axis_with_its_type() {
    let (_dir, collector) = active_collector();
    let gpu = collector.domain_create(Some(c"gpu")).unwrap();
    let histogram = unsafe {
        collector.histogram_create(Some(gpu), Some(c"latency"), METADATA_U32, METADATA_DOUBLE)
    }
    .unwrap();
    assert_eq!(
        lines(&collector)[1],
        "[INFO] __itt_histogram_create(...) - function args: domain=gpu, name=latency, x_type=3, y_type=8 (created new histogram)"
    );

    let x = [1u32, 2];
    let y = [0.5f64, 1.5];
    unsafe {
        let h = Some(histogram.as_ref());
        collector.histogram_submit(h, 2, x.as_ptr().cast(), y.as_ptr().cast());
        collector.histogram_submit(h, 2, std::ptr::null(), y.as_ptr().cast());
        collector.histogram_submit(h, 0, x.as_ptr().cast(), y.as_ptr().cast());
    }
    let lines = lines(&collector);
    assert_eq!(
        &lines[2],
        "[INFO] __itt_histogram_submit(...) - function args: domain=gpu name=latency histogram_size=2 x[]=1;2; y[]=0.500000;1.500000;"
    );
    assert_eq!(
        &lines[3],
        "[INFO] __itt_histogram_submit(...) - function args: domain=gpu name=latency histogram_size=2 y[]=0.500000;1.500000;"
    );
    assert_eq!(&lines[4], "[WARN] __itt_histogram_submit(...) - Incorrect function call");
}

#[test]
fn histogram_without_domain_is_reported() {
    let (_dir, collector) = active_collector();
    let orphan = IttHistogram {
        domain: std::ptr::null(),
        name: c"h".as_ptr(),
        name_w: std::ptr::null(),
        x_type: METADATA_U64,
        y_type: METADATA_U64,
        extra1: 0,
        extra2: std::ptr::null_mut(),
        next: std::ptr::null_mut(),
    };
    let y = [1u64];
    unsafe { collector.histogram_submit(Some(&orphan), 1, std::ptr::null(), y.as_ptr().cast()) };
    assert_eq!(
        lines(&collector),
        vec!["[WARN] __itt_histogram_submit(...) - Histogram domain is NULL".to_string()]
    );
}

#[test]
fn counter_value_is_read_with_the_counter_type() {
    let (_dir, collector) = active_collector();
    let signed = collector
        .counter_create_typed(Some(c"delta"), None, METADATA_S32)
        .unwrap();
    let value = -5i32;
    unsafe {
        collector.counter_set_value(Some(signed.as_ref()), (&value as *const i32).cast());
    }
    assert_eq!(
        lines(&collector)[1],
        "[INFO] __itt_counter_set_value(...) - function args: counter_name=delta counter_value=-5"
    );
}

#[test]
fn context_metadata_binds_to_counter() {
    let (_dir, collector) = active_collector();
    let counter = collector
        .counter_create_typed(Some(c"bw"), Some(c"gpu"), METADATA_U64)
        .unwrap();
    let units = c"MB/s";
    let mut max = 100u64;
    let entries = [
        IttContextMetadata {
            ty: CONTEXT_UNITS,
            value: units.as_ptr() as *mut c_void,
        },
        IttContextMetadata {
            ty: CONTEXT_MAX_VAL,
            value: (&mut max as *mut u64).cast(),
        },
    ];
    unsafe {
        collector.bind_context_metadata_to_counter(Some(counter.as_ref()), &entries);
        collector.bind_context_metadata_to_counter(Some(counter.as_ref()), &[]);
    }
    let lines = lines(&collector);
    assert_eq!(
        &lines[1],
        "[INFO] __itt_bind_context_metadata_to_counter(...) - function args: counter_name=bw context_metadata_size=2 context_metadata[]=MB/s;100;"
    );
    assert_eq!(
        &lines[2],
        "[WARN] __itt_bind_context_metadata_to_counter(...) - Incorrect function call"
    );
}

#[test]
fn events_are_interned_and_started_by_id() {
    let (_dir, collector) = active_collector();
    let flush = collector.event_create(Some(c"flush")).unwrap();
    assert_eq!(collector.event_create(Some(c"flush")), Some(flush));
    assert_eq!(collector.event_start(flush.raw()), 0);
    assert_eq!(collector.event_end(42), -1);
    let lines = lines(&collector);
    assert_eq!(
        &lines[0],
        "[INFO] __itt_event_create(...) - function args: name=flush (created new event, id=1)"
    );
    assert_eq!(&lines[2], "[INFO] __itt_event_start(...) - function args: event=flush id=1");
    assert_eq!(&lines[3], "[WARN] __itt_event_end(...) - Incorrect function call");
}

#[test]
fn calls_after_teardown_are_ignored() {
    let (_dir, collector) = active_collector();
    collector.domain_create(Some(c"app")).unwrap();
    let path = collector.log().path().unwrap();
    assert!(collector.teardown());

    let before = read_lines(&path).unwrap();
    assert!(collector.domain_create(Some(c"app")).is_none());
    collector.pause();
    assert_eq!(read_lines(&path).unwrap(), before);
}

#[test]
fn unwritable_log_directory_keeps_registry_working() {
    let dir = tempfile::tempdir().unwrap();
    let collector = Collector::new(CollectorConfig::with_log_dir(dir.path().join("missing")));
    collector.start();
    assert!(!collector.log().is_enabled());

    let a = collector.domain_create(Some(c"app")).unwrap();
    let b = collector.domain_create(Some(c"app")).unwrap();
    assert_eq!(a, b);
    assert_eq!(collector.registry().snapshot().domains.len(), 1);
}
