use super::*;
use crate::llm::types::LlmError;
use crate::services::analysis::{PRECONDITION_MESSAGE, REDIRECT_PLACEHOLDER};
use crate::state::test_helpers::{MockModel, test_app_state_with_model};
use canvas::consts::{BACKGROUND, STROKE_COLOR};
use tokio::sync::Notify;
use tokio::time::{Duration, timeout};

// =============================================================================
// HARNESS
// =============================================================================

struct Harness {
    state: AppState,
    model: Arc<MockModel>,
    session: Session,
    client_id: Uuid,
    done_tx: mpsc::Sender<AnalysisDone>,
    done_rx: mpsc::Receiver<AnalysisDone>,
}

impl Harness {
    fn new(model: MockModel) -> Self {
        let model = Arc::new(model);
        let (done_tx, done_rx) = mpsc::channel(4);
        Self {
            state: test_app_state_with_model(model.clone()),
            model,
            session: Session::default(),
            client_id: Uuid::new_v4(),
            done_tx,
            done_rx,
        }
    }

    fn send(&mut self, syscall: &str, data: serde_json::Value) -> Vec<Frame> {
        let data: Data = serde_json::from_value(data).expect("data should be an object");
        let text = serde_json::to_string(&Frame::request(syscall, data)).expect("serialize");
        process_inbound_text(&self.state, &mut self.session, self.client_id, &self.done_tx, &text)
    }

    fn resize(&mut self, width: u32, height: u32) {
        let frames = self.send("surface:resize", json!({ "width": width, "height": height }));
        assert_eq!(frames[0].status, Status::Done);
    }

    fn stroke(&mut self) {
        let rect = json!({ "left": 0.0, "top": 0.0, "width": 64.0, "height": 64.0 });
        self.send("pointer:down", json!({ "client_x": 4.0, "client_y": 4.0, "rect": rect }));
        self.send("pointer:move", json!({ "client_x": 40.0, "client_y": 40.0, "rect": rect }));
        self.send("pointer:up", json!({ "client_x": 40.0, "client_y": 40.0, "rect": rect }));
    }

    /// Wait for the next finished analysis and apply it like the connection
    /// loop does.
    async fn complete(&mut self) -> Vec<Frame> {
        let done = timeout(Duration::from_secs(2), self.done_rx.recv())
            .await
            .expect("analysis completion timed out")
            .expect("completion channel closed");
        complete_analysis(&mut self.session, self.client_id, done)
    }

    async fn wait_for_calls(&self, n: usize) {
        timeout(Duration::from_secs(2), async {
            while self.model.call_count() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("model was not called in time");
    }
}

fn str_field<'a>(frame: &'a Frame, key: &str) -> Option<&'a str> {
    frame.data.get(key).and_then(|v| v.as_str())
}

fn find<'a>(frames: &'a [Frame], syscall: &str) -> Option<&'a Frame> {
    frames.iter().find(|f| f.syscall == syscall && f.status == Status::Request)
}

// =============================================================================
// DISPATCH
// =============================================================================

#[test]
fn invalid_json_yields_gateway_error() {
    let mut h = Harness::new(MockModel::replying(&[]));
    let frames = process_inbound_text(&h.state, &mut h.session, h.client_id, &h.done_tx, "{not json");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].syscall, "gateway:error");
    assert!(str_field(&frames[0], "message").is_some_and(|m| m.starts_with("invalid json")));
}

#[test]
fn unknown_prefix_is_error() {
    let mut h = Harness::new(MockModel::replying(&[]));
    let frames = h.send("stroke:undo", json!({}));
    assert_eq!(frames[0].status, Status::Error);
    assert_eq!(str_field(&frames[0], "message"), Some("unknown prefix: stroke"));
}

#[test]
fn malformed_pointer_payload_is_error() {
    let mut h = Harness::new(MockModel::replying(&[]));
    let frames = h.send("pointer:down", json!({ "client_x": 1.0 }));
    assert_eq!(frames[0].status, Status::Error);
    assert!(str_field(&frames[0], "message").is_some_and(|m| m.starts_with("invalid payload")));
}

// =============================================================================
// SURFACE
// =============================================================================

#[test]
fn resize_reports_size_and_reallocates() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(64, 48);
    assert_eq!(h.session.surface().size(), (64, 48));
    assert!(h.session.surface().raster().is_uniform(BACKGROUND));
}

#[test]
fn resize_over_limit_is_rejected() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(10, 10);
    let frames = h.send("surface:resize", json!({ "width": MAX_VIEWPORT_DIM + 1, "height": 10 }));
    assert_eq!(frames[0].status, Status::Error);
    assert_eq!(h.session.surface().size(), (10, 10));
}

#[test]
fn pointer_stroke_maps_through_rect_and_paints() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(64, 64);
    let rect = json!({ "left": 100.0, "top": 50.0, "width": 64.0, "height": 64.0 });

    let down = h.send("pointer:down", json!({ "client_x": 110.0, "client_y": 60.0, "rect": rect }));
    assert_eq!(down[0].data.get("drawing"), Some(&json!(true)));
    assert_eq!(down[0].data.get("at"), Some(&json!({ "x": 10.0, "y": 10.0 })));

    let moved = h.send("pointer:move", json!({ "client_x": 130.0, "client_y": 60.0, "rect": rect }));
    assert_eq!(
        moved[0].data.get("segment"),
        Some(&json!({ "from": { "x": 10.0, "y": 10.0 }, "to": { "x": 30.0, "y": 10.0 } }))
    );
    assert_eq!(h.session.surface().raster().pixel(20, 10), Some(STROKE_COLOR));

    let up = h.send("pointer:up", json!({ "client_x": 130.0, "client_y": 60.0, "rect": rect }));
    assert_eq!(up[0].data.get("drawing"), Some(&json!(false)));
    assert!(!h.session.surface().is_drawing());
}

#[test]
fn idle_move_gets_no_reply() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(32, 32);
    let rect = json!({ "left": 0.0, "top": 0.0, "width": 32.0, "height": 32.0 });
    let frames = h.send("pointer:move", json!({ "client_x": 5.0, "client_y": 5.0, "rect": rect }));
    assert!(frames.is_empty());
    assert!(h.session.surface().raster().is_uniform(BACKGROUND));
}

#[test]
fn touch_uses_first_point_and_ignores_empty_lists() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(32, 32);
    let rect = json!({ "left": 0.0, "top": 0.0, "width": 32.0, "height": 32.0 });

    let empty = h.send("touch:start", json!({ "touches": [], "rect": rect }));
    assert!(empty.is_empty());
    assert!(!h.session.surface().is_drawing());

    let start = h.send(
        "touch:start",
        json!({ "touches": [{ "client_x": 2.0, "client_y": 3.0 }, { "client_x": 20.0, "client_y": 20.0 }], "rect": rect }),
    );
    assert_eq!(start[0].data.get("at"), Some(&json!({ "x": 2.0, "y": 3.0 })));

    let end = h.send("touch:end", json!({ "touches": [], "rect": rect }));
    assert_eq!(end[0].data.get("drawing"), Some(&json!(false)));
}

#[test]
fn clear_erases_and_blanks_text() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(64, 64);
    h.stroke();
    h.session.analysis.result_text = "a cat".into();

    let frames = h.send("surface:clear", json!({}));
    assert_eq!(frames[0].status, Status::Done);
    assert_eq!(str_field(&frames[0], "text"), Some(""));
    assert!(h.session.surface().raster().is_uniform(BACKGROUND));
    assert!(h.session.analysis.result_text.is_empty());
}

#[test]
fn snapshot_returns_png_payload() {
    let mut h = Harness::new(MockModel::replying(&[]));
    h.resize(16, 8);
    let frames = h.send("surface:snapshot", json!({}));
    assert_eq!(frames[0].status, Status::Done);
    assert_eq!(str_field(&frames[0], "mime_type"), Some("image/png"));
    assert_eq!(frames[0].data.get("width"), Some(&json!(16)));
    assert!(str_field(&frames[0], "data").is_some_and(|d| d.starts_with("iVBOR")));
}

#[test]
fn snapshot_before_resize_is_error() {
    let mut h = Harness::new(MockModel::replying(&[]));
    let frames = h.send("surface:snapshot", json!({}));
    assert_eq!(str_field(&frames[0], "code"), Some("E_MISSING_RASTER"));
}

// =============================================================================
// ANALYSIS
// =============================================================================

#[tokio::test]
async fn analysis_without_surface_reports_precondition() {
    let mut h = Harness::new(MockModel::replying(&["never"]));
    let frames = h.send("analysis:request", json!({}));

    let result = find(&frames, "analysis:result").expect("result frame");
    assert_eq!(str_field(result, "text"), Some(PRECONDITION_MESSAGE));
    let err = frames.iter().find(|f| f.status == Status::Error).expect("error frame");
    assert_eq!(str_field(err, "code"), Some("E_MISSING_RASTER"));
    assert!(find(&frames, "analysis:state").is_none());
    assert_eq!(h.model.call_count(), 0);
}

#[tokio::test]
async fn analysis_text_reply_round_trip() {
    let mut h = Harness::new(MockModel::replying(&["  That's a lovely cat!  "]));
    h.resize(64, 64);
    h.stroke();

    let started = h.send("analysis:request", json!({}));
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].syscall, "analysis:state");
    assert_eq!(started[0].data.get("analyzing"), Some(&json!(true)));
    assert!(h.session.analysis.is_analyzing);

    let frames = h.complete().await;
    assert!(find(&frames, "navigate:open").is_none());
    assert_eq!(str_field(find(&frames, "analysis:result").expect("result"), "text"), Some("That's a lovely cat!"));
    assert_eq!(find(&frames, "analysis:state").expect("state").data.get("analyzing"), Some(&json!(false)));

    let done = frames.last().expect("terminal reply");
    assert_eq!(done.status, Status::Done);
    assert_eq!(done.syscall, "analysis:request");
    assert_eq!(str_field(done, "outcome"), Some("text"));
    assert!(!h.session.analysis.is_analyzing);
    assert_eq!(h.model.call_count(), 1);
}

#[tokio::test]
async fn analysis_sends_snapshot_inline() {
    let mut h = Harness::new(MockModel::replying(&["ok"]));
    h.resize(64, 64);
    h.stroke();
    h.send("analysis:request", json!({}));
    h.complete().await;

    let requests = h.model.requests();
    assert_eq!(requests.len(), 1);
    let json = serde_json::to_value(&requests[0]).expect("serialize request");
    let inline = &json["contents"][0]["parts"][1]["inlineData"];
    assert_eq!(inline["mimeType"], "image/png");
    assert!(inline["data"].as_str().is_some_and(|d| !d.contains(',')));
}

#[tokio::test]
async fn analysis_redirect_emits_navigation() {
    let url = "https://www.youtube.com/results?search_query=cat+videos";
    let reply = format!(r#"{{"type":"redirect","value":"{url}"}}"#);
    let mut h = Harness::new(MockModel::replying(&[reply.as_str()]));
    h.resize(64, 64);
    h.stroke();

    h.send("analysis:request", json!({}));
    let frames = h.complete().await;

    assert_eq!(frames[0].syscall, "navigate:open");
    assert_eq!(str_field(&frames[0], "url"), Some(url));
    assert_eq!(str_field(find(&frames, "analysis:result").expect("result"), "text"), Some(REDIRECT_PLACEHOLDER));
    let done = frames.last().expect("terminal reply");
    assert_eq!(str_field(done, "outcome"), Some("redirect"));
    assert_eq!(str_field(done, "url"), Some(url));
}

#[tokio::test]
async fn redirect_with_empty_value_is_shown_as_text() {
    let reply = r#"{"type":"redirect","value":""}"#;
    let mut h = Harness::new(MockModel::replying(&[reply]));
    h.resize(64, 64);
    h.stroke();

    h.send("analysis:request", json!({}));
    let frames = h.complete().await;
    assert!(find(&frames, "navigate:open").is_none());
    assert_eq!(str_field(find(&frames, "analysis:result").expect("result"), "text"), Some(reply));
}

#[tokio::test]
async fn transport_failure_clears_busy_flag() {
    let mut h = Harness::new(MockModel::failing(LlmError::ApiResponse { status: 500, body: "boom".into() }));
    h.resize(64, 64);
    h.stroke();

    h.send("analysis:request", json!({}));
    let frames = h.complete().await;

    let err = frames.last().expect("terminal reply");
    assert_eq!(err.status, Status::Error);
    assert_eq!(str_field(err, "code"), Some("E_TRANSPORT"));
    assert_eq!(err.data.get("retryable"), Some(&json!(true)));
    assert!(str_field(err, "text").is_some_and(|t| t.starts_with("Analysis failed")));
    assert_eq!(find(&frames, "analysis:state").expect("state").data.get("analyzing"), Some(&json!(false)));
    assert!(!h.session.analysis.is_analyzing);

    // The trigger is usable again.
    let again = h.send("analysis:request", json!({}));
    assert_eq!(again[0].syscall, "analysis:state");
}

#[tokio::test]
async fn second_request_while_busy_is_rejected() {
    let gate = Arc::new(Notify::new());
    let mut h = Harness::new(MockModel::replying(&["first"]).gated(gate.clone()));
    h.resize(64, 64);
    h.stroke();

    h.send("analysis:request", json!({}));
    h.wait_for_calls(1).await;

    let rejected = h.send("analysis:request", json!({}));
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].status, Status::Error);
    assert_eq!(str_field(&rejected[0], "code"), Some("E_BUSY"));

    // Drawing keeps working while the request is in flight.
    let rect = json!({ "left": 0.0, "top": 0.0, "width": 64.0, "height": 64.0 });
    let down = h.send("pointer:down", json!({ "client_x": 50.0, "client_y": 5.0, "rect": rect }));
    assert_eq!(down[0].status, Status::Done);

    // Clearing mid-flight leaves the busy flag raised.
    h.send("surface:clear", json!({}));
    assert!(h.session.analysis.is_analyzing);

    gate.notify_one();
    let frames = h.complete().await;
    assert_eq!(str_field(find(&frames, "analysis:result").expect("result"), "text"), Some("first"));
    assert!(!h.session.analysis.is_analyzing);
    assert_eq!(h.model.call_count(), 1);
}

#[tokio::test]
async fn unconfigured_pipeline_reports_precondition() {
    let (done_tx, _done_rx) = mpsc::channel(1);
    let state = AppState::new(AnalysisPipeline::new(None, Duration::from_secs(1)));
    let mut session = Session::default();
    session.resize(8, 8);

    let data: Data = serde_json::from_value(json!({})).expect("data");
    let text = serde_json::to_string(&Frame::request("analysis:request", data)).expect("serialize");
    let frames = process_inbound_text(&state, &mut session, Uuid::new_v4(), &done_tx, &text);

    let err = frames.iter().find(|f| f.status == Status::Error).expect("error frame");
    assert_eq!(str_field(err, "code"), Some("E_MISSING_CREDENTIAL"));
    assert_eq!(session.analysis.result_text, PRECONDITION_MESSAGE);
    assert!(!session.analysis.is_analyzing);
}

#[tokio::test]
async fn completion_after_connection_drop_is_discarded() {
    let model = Arc::new(MockModel::replying(&["late"]));
    let pipeline = Arc::new(crate::state::test_helpers::pipeline_with(model.clone()));
    let (done_tx, done_rx) = mpsc::channel(1);
    drop(done_rx);

    let mut surface = canvas::DrawSurface::new(8, 8);
    surface.clear();
    let snapshot = surface.snapshot().expect("snapshot");
    spawn_analysis(pipeline, Frame::request("analysis:request", Data::new()), snapshot, done_tx);

    timeout(Duration::from_secs(2), async {
        while model.call_count() < 1 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("model was not called");
}

#[tokio::test]
async fn non_web_redirect_target_is_not_forwarded() {
    for target in ["/bin/sh", "file:///etc/passwd", "javascript:alert(1)"] {
        let reply = format!(r#"{{"type":"redirect","value":"{target}"}}"#);
        let mut h = Harness::new(MockModel::replying(&[reply.as_str()]));
        h.resize(64, 64);
        h.stroke();

        h.send("analysis:request", json!({}));
        let frames = h.complete().await;

        assert!(find(&frames, "navigate:open").is_none(), "{target}");
        assert_eq!(str_field(find(&frames, "analysis:result").expect("result"), "text"), Some(REDIRECT_PLACEHOLDER));
        assert!(!h.session.analysis.is_analyzing);
    }
}
