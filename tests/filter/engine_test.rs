//! Request-time decisions against an in-memory control region.

use std::sync::{Arc, Mutex};

use self_defence::engine::ALERT_TARGET;
use self_defence::region::{ControlRegion, InMemoryRegion, RegionSpec};
use self_defence::scope::{PolicyBuilder, PolicySet};
use self_defence::{AdmissionFilter, Request, RequestFilter, Verdict};

type ActionDecl<'a> = (i64, Option<&'a str>, Option<i64>);

fn policies(actions: &[ActionDecl<'_>]) -> PolicySet {
    let mut builder = PolicyBuilder::new();
    builder
        .declare_region(RegionSpec::new(20120, None).expect("valid spec"))
        .expect("region");
    for (value, target, ratio) in actions {
        builder
            .add_action(PolicyBuilder::MAIN, *value, *target, *ratio)
            .expect("valid action");
    }
    builder.build()
}

fn attached(actions: &[ActionDecl<'_>], observed: u8) -> AdmissionFilter {
    let region = InMemoryRegion::new(8);
    region.store(0, observed);
    let region: Arc<dyn ControlRegion> = Arc::new(region);
    AdmissionFilter::new(Arc::new(policies(actions)), Some(region))
}

// ---------- eligibility ----------

#[test]
fn unattached_region_always_passes() {
    let filter = AdmissionFilter::new(Arc::new(policies(&[(0, None, None)])), None);
    for id in 0..200 {
        assert_eq!(filter.decide(&Request::new("www", id)), Verdict::Pass);
    }
}

#[test]
fn route_without_actions_always_passes() {
    for observed in [0, 1, 10, 255] {
        let filter = attached(&[], observed);
        for id in 0..100 {
            assert_eq!(filter.decide(&Request::new("www", id)), Verdict::Pass);
        }
    }
}

#[test]
fn subrequest_always_passes() {
    let filter = attached(&[(10, None, None)], 10);
    let primary = Request::new("www", 3);
    assert_eq!(filter.decide(&primary), Verdict::Reject);
    assert_eq!(filter.decide(&primary.subrequest()), Verdict::Pass);
}

// ---------- matching ----------

#[test]
fn full_ratio_reject_fires_for_every_request() {
    let filter = attached(&[(10, None, Some(100))], 10);
    for id in 0..300 {
        assert_eq!(filter.decide(&Request::new("www", id)), Verdict::Reject);
    }
}

#[test]
fn half_ratio_redirect_follows_request_bucket() {
    let filter = attached(&[(5, Some("/foo"), Some(50))], 5);
    let redirect = Verdict::Redirect {
        path: "/foo".to_owned(),
        query: None,
    };
    assert_eq!(filter.decide(&Request::new("www", 49)), redirect);
    assert_eq!(filter.decide(&Request::new("www", 50)), Verdict::Pass);
    assert_eq!(filter.decide(&Request::new("www", 1049)), redirect);
    assert_eq!(filter.decide(&Request::new("www", 1050)), Verdict::Pass);
}

#[test]
fn redirect_keeps_query_string() {
    let filter = attached(&[(5, Some("/foo"), None)], 5);
    let verdict = filter.decide(&Request::new("www", 1).query("q=rust&page=2"));
    assert_eq!(
        verdict,
        Verdict::Redirect {
            path: "/foo".to_owned(),
            query: Some("q=rust&page=2".to_owned()),
        }
    );
    assert_eq!(verdict.to_string(), "redirect /foo?q=rust&page=2");
}

#[test]
fn named_dispatch_ignores_query_string() {
    let filter = attached(&[(7, Some("@bail"), None)], 7);
    let bail = Verdict::Dispatch {
        route: "@bail".to_owned(),
    };
    for id in 0..100 {
        assert_eq!(filter.decide(&Request::new("www", id)), bail);
        assert_eq!(filter.decide(&Request::new("www", id).query("x=1")), bail);
    }
}

#[test]
fn unmatched_value_passes() {
    let filter = attached(&[(1, None, None), (2, Some("/two"), None)], 3);
    for id in 0..100 {
        assert_eq!(filter.decide(&Request::new("www", id)), Verdict::Pass);
    }
}

#[test]
fn zero_ratio_action_never_fires() {
    let filter = attached(&[(4, None, Some(0))], 4);
    for id in 0..200 {
        assert_eq!(filter.decide(&Request::new("www", id)), Verdict::Pass);
    }
}

// ---------- live region ----------

#[test]
fn verdict_tracks_external_writes() {
    let region = Arc::new(InMemoryRegion::new(8));
    let shared: Arc<dyn ControlRegion> = region.clone();
    let filter = AdmissionFilter::new(Arc::new(policies(&[(1, None, None)])), Some(shared));
    let request = Request::new("www", 12);

    assert_eq!(filter.decide(&request), Verdict::Pass);
    region.store(0, 1);
    assert_eq!(filter.decide(&request), Verdict::Reject);
    region.store(0, 0);
    assert_eq!(filter.decide(&request), Verdict::Pass);
}

#[test]
fn consecutive_reads_of_unmodified_offset_agree() {
    let region = InMemoryRegion::from_bytes(&[3, 1, 4, 1, 5]);
    for offset in 0..region.len() {
        assert_eq!(region.read(offset), region.read(offset));
    }
}

#[test]
fn routes_observe_their_own_offset() {
    let mut builder = PolicyBuilder::new();
    builder
        .declare_region(RegionSpec::new(1, Some(4)).expect("spec"))
        .expect("region");
    let api = builder.server("api").expect("server");
    builder.set_offset(api, 2).expect("offset");
    builder.add_action(api, 9, None, None).expect("action");
    builder
        .add_action(PolicyBuilder::MAIN, 9, Some("/main"), None)
        .expect("action");

    let region = Arc::new(InMemoryRegion::new(4));
    region.store(2, 9);
    let shared: Arc<dyn ControlRegion> = region.clone();
    let filter = AdmissionFilter::new(Arc::new(builder.build()), Some(shared));

    assert_eq!(filter.decide(&Request::new("api", 1)), Verdict::Reject);
    // Main observes offset 0, which is still 0.
    assert_eq!(filter.decide(&Request::new("www", 1)), Verdict::Pass);
}

// ---------- alert record ----------

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        let bytes = self.0.lock().expect("log buffer").clone();
        String::from_utf8(bytes).expect("utf-8 log output")
    }
}

impl std::io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn decide_logged(filter: &AdmissionFilter, request: &Request<'_>) -> (Verdict, String) {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let verdict = tracing::subscriber::with_default(subscriber, || filter.decide(request));
    (verdict, log.contents())
}

#[test]
fn fired_action_emits_alert_record() {
    let filter = attached(&[(5, Some("/busy.html"), None)], 5);
    let (verdict, logs) = decide_logged(&filter, &Request::new("www", 1));

    assert!(matches!(verdict, Verdict::Redirect { .. }));
    assert!(logs.contains("ERROR"), "got: {logs}");
    assert!(logs.contains(ALERT_TARGET), "got: {logs}");
    assert!(logs.contains("offset=0"), "got: {logs}");
    assert!(logs.contains("value=5"), "got: {logs}");
    assert!(logs.contains("action=/busy.html"), "got: {logs}");
}

#[test]
fn pass_emits_no_alert_record() {
    let unmatched = attached(&[(5, None, None)], 6);
    let (verdict, logs) = decide_logged(&unmatched, &Request::new("www", 1));
    assert_eq!(verdict, Verdict::Pass);
    assert!(!logs.contains(ALERT_TARGET), "got: {logs}");

    let sampled_out = attached(&[(5, None, Some(10))], 5);
    let (verdict, logs) = decide_logged(&sampled_out, &Request::new("www", 50));
    assert_eq!(verdict, Verdict::Pass);
    assert!(!logs.contains(ALERT_TARGET), "got: {logs}");
    assert!(logs.contains("sampled out"), "got: {logs}");
}
