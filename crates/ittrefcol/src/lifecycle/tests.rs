use super::*;
use crate::binder::{Export, ExportTable};
use crate::log::read_lines;
use ittrefcol_abi::{GROUP_ALL, IttDomain, METADATA_U64, StaticPart};
use std::ffi::c_void;
use std::sync::Arc;

extern "C" fn collector_pause() {}
extern "C" fn fallback() {}

static EXPORTS: [Export; 1] = [Export {
    name: c"__itt_pause",
    addr: collector_pause as *const c_void,
}];

static TABLE: ExportTable = ExportTable::new(&EXPORTS);

fn collector_in(dir: &tempfile::TempDir) -> Collector {
    Collector::new(CollectorConfig::with_log_dir(dir.path()))
}

#[test]
fn start_walks_every_state_once() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    assert_eq!(collector.state(), State::Uninitialized);
    assert!(collector.enter().is_none());

    assert_eq!(collector.start(), State::Active);
    assert_eq!(collector.start(), State::Active);
    assert!(collector.registry().is_ready());
    assert!(collector.log().is_enabled());
    assert!(collector.enter().is_some());
}

#[test]
fn concurrent_starters_open_one_log() {
    let dir = tempfile::tempdir().unwrap();
    let collector = Arc::new(collector_in(&dir));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let collector = Arc::clone(&collector);
            std::thread::spawn(move || collector.start())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), State::Active);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn register_part_binds_then_spills() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    let mut part = StaticPart::builder()
        .domain("app")
        .counter("iters", Some("app"), METADATA_U64)
        .api("__itt_pause", fallback as *mut c_void)
        .api("__itt_resume", fallback as *mut c_void)
        .build();

    let report = unsafe { collector.register_part(Some(&*part.global_ptr()), GROUP_ALL, &TABLE) }.unwrap();
    assert_eq!(collector.state(), State::Active);
    assert_eq!(report.bind.resolved, 1);
    assert_eq!(report.bind.fallback, 1);
    assert_eq!(report.merge.created(), 2);
    assert_eq!(collector.part_count(), 1);
    assert_eq!(part.slot("__itt_pause"), Some(collector_pause as *mut c_void));
    assert_eq!(part.slot("__itt_resume"), Some(fallback as *mut c_void));

    let lines = read_lines(&collector.log().path().unwrap()).unwrap();
    assert!(lines[0].starts_with("[INFO] __itt_api_init(...) - function args: init_groups="));
    assert_eq!(lines[1], "[INFO] __itt_api_init(...) - spilled domain name=app (created new domain)");
    assert_eq!(
        lines[2],
        "[INFO] __itt_api_init(...) - spilled counter name=iters, domain=app, type=1 (created new counter)"
    );
}

#[test]
fn second_part_converges_on_existing_objects() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    let mut first = StaticPart::builder().domain("X").build();
    let mut second = StaticPart::builder().domain("X").build();

    unsafe {
        collector.register_part(Some(&*first.global_ptr()), GROUP_ALL, &TABLE).unwrap();
        let report = collector
            .register_part(Some(&*second.global_ptr()), GROUP_ALL, &TABLE)
            .unwrap();
        assert_eq!(report.merge.existing(), 1);
    }
    assert_eq!(collector.registry().snapshot().domains, vec!["X".to_string()]);
    assert_eq!(collector.part_count(), 2);

    let lines = read_lines(&collector.log().path().unwrap()).unwrap();
    assert_eq!(
        lines.last().map(String::as_str),
        Some("[INFO] __itt_api_init(...) - spilled domain name=X (domain already exists)")
    );
}

#[test]
fn null_part_is_rejected_without_starting() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    let result = unsafe { collector.register_part(None, GROUP_ALL, &TABLE) };
    assert!(matches!(result, Err(CollectorError::NullPart)));
    assert_eq!(collector.state(), State::Uninitialized);
}

#[test]
fn part_registered_after_teardown_stays_unbound() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    collector.start();
    assert!(collector.teardown());

    let mut part = StaticPart::builder()
        .domain("late")
        .api("__itt_pause", fallback as *mut c_void)
        .build();
    let result = unsafe { collector.register_part(Some(&*part.global_ptr()), GROUP_ALL, &TABLE) };
    assert!(matches!(result, Err(CollectorError::NotActive)));
    assert_eq!(part.slot("__itt_pause"), Some(fallback as *mut c_void));
    assert_eq!(collector.part_count(), 0);
    assert_eq!(collector.registry().snapshot(), Default::default());
}

#[test]
fn unregister_part_counts_down() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    let mut part = StaticPart::builder().build();
    let global = part.global_ptr();
    unsafe { collector.register_part(Some(&*global), GROUP_ALL, &TABLE) }.unwrap();
    collector.unregister_part(global);
    collector.unregister_part(global);
    assert_eq!(collector.part_count(), 0);
}

#[test]
fn teardown_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    collector.start();
    collector.domain_create(Some(c"app")).unwrap();
    let path = collector.log().path().unwrap();

    assert!(collector.teardown());
    assert!(!collector.teardown());
    assert_eq!(collector.state(), State::TornDown);
    assert!(!collector.registry().is_ready());
    assert!(!collector.log().is_enabled());
    assert_eq!(collector.start(), State::TornDown);

    let lines = read_lines(&path).unwrap();
    let summary = lines.last().unwrap();
    assert!(summary.starts_with("[INFO] __itt_refcol_release(...) - registry="));
    assert!(summary.contains("\"app\""));
    assert_eq!(lines.iter().filter(|l| l.contains("registry=")).count(), 1);
}

#[test]
fn teardown_before_start_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let collector = collector_in(&dir);
    assert!(!collector.teardown());
    assert_eq!(collector.state(), State::Uninitialized);
}

#[test]
fn teardown_waits_for_in_flight_calls() {
    let dir = tempfile::tempdir().unwrap();
    let collector = Arc::new(collector_in(&dir));
    collector.start();
    let domain = collector.domain_create(Some(c"app")).unwrap().as_ptr() as usize;

    let guard_held = Arc::new(std::sync::Barrier::new(2));
    let worker = {
        let collector = Arc::clone(&collector);
        let guard_held = Arc::clone(&guard_held);
        std::thread::spawn(move || {
            let call = collector.enter().unwrap();
            guard_held.wait();
            std::thread::sleep(Duration::from_millis(50));
            let domain = domain as *const IttDomain;
            let name = unsafe { std::ffi::CStr::from_ptr((*domain).name) };
            let alive = name == c"app";
            drop(call);
            alive
        })
    };
    guard_held.wait();
    assert!(collector.teardown());
    assert!(worker.join().unwrap());
    assert!(!collector.registry().is_ready());
}
