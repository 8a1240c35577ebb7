//! Verdict execution through a recording host.

use self_defence::host::{enact, Flow, RequestHost, SERVICE_UNAVAILABLE};
use self_defence::Verdict;

#[derive(Debug, Default)]
struct RecordingHost {
    calls: Vec<String>,
}

impl RequestHost for RecordingHost {
    fn dispatch_named(&mut self, route: &str) {
        self.calls.push(format!("named {route}"));
    }

    fn redirect(&mut self, path: &str, query: Option<&str>) {
        self.calls
            .push(format!("redirect {path} {}", query.unwrap_or("-")));
    }

    fn finalize(&mut self) {
        self.calls.push("finalize".to_owned());
    }
}

#[test]
fn pass_continues_without_touching_host() {
    let mut host = RecordingHost::default();
    assert_eq!(enact(&Verdict::Pass, &mut host), Flow::Continue);
    assert!(host.calls.is_empty());
}

#[test]
fn reject_answers_service_unavailable() {
    let mut host = RecordingHost::default();
    assert_eq!(
        enact(&Verdict::Reject, &mut host),
        Flow::Respond(SERVICE_UNAVAILABLE)
    );
    assert_eq!(SERVICE_UNAVAILABLE, 503);
    assert!(host.calls.is_empty());
}

#[test]
fn dispatch_hands_off_and_finalizes() {
    let mut host = RecordingHost::default();
    let verdict = Verdict::Dispatch {
        route: "@bail".to_owned(),
    };
    assert_eq!(enact(&verdict, &mut host), Flow::Done);
    assert_eq!(host.calls, vec!["named @bail", "finalize"]);
}

#[test]
fn redirect_passes_query_and_finalizes() {
    let mut host = RecordingHost::default();
    let verdict = Verdict::Redirect {
        path: "/busy.html".to_owned(),
        query: Some("a=1".to_owned()),
    };
    assert_eq!(enact(&verdict, &mut host), Flow::Done);
    assert_eq!(host.calls, vec!["redirect /busy.html a=1", "finalize"]);
}
