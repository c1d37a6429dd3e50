//! Runs in its own process: tears the process collector down and checks that
//! late calls are harmless.

use ittnotify_refcol::exports::*;
use ittnotify_refcol::lifecycle;
use ittnotify_refcol::log::read_lines;
use ittnotify_refcol::State;
use ittrefcol_abi::*;

#[test]
fn late_calls_after_teardown_are_no_ops() {
    let dir = tempfile::tempdir().unwrap();
    unsafe { std::env::set_var("INTEL_LIBITTNOTIFY_LOG_DIR", dir.path()) };

    let mut part = StaticPart::builder().domain("early").build();
    unsafe { __itt_api_init(part.global_ptr(), GROUP_ALL) };
    let collector = lifecycle::global();
    assert_eq!(collector.state(), State::Active);
    let path = collector.log().path().unwrap();
    assert!(path.starts_with(dir.path()));

    assert!(collector.teardown());
    assert!(!collector.teardown());

    let lines = read_lines(&path).unwrap();
    let summary = lines.last().unwrap();
    assert!(summary.starts_with("[INFO] __itt_refcol_release(...) - registry="));
    assert!(summary.contains("\"early\""));

    unsafe {
        assert!(__itt_domain_create(c"late".as_ptr()).is_null());
        __itt_pause();
        __itt_api_fini(part.global_ptr());
        __itt_api_init(part.global_ptr(), GROUP_ALL);
    }
    assert_eq!(read_lines(&path).unwrap(), lines);
    assert_eq!(collector.state(), State::TornDown);
}
