//! WebSocket handler: one drawing session per connection.
//!
//! DESIGN
//! ======
//! On upgrade, the connection creates its own [`Session`] and enters a
//! `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Finished analyses → apply result to the session, notify the client
//!
//! The model call runs in a spawned task so pointer frames keep flowing
//! while it is in flight. Only the connection loop touches the session;
//! the task reports back over a channel and the loop applies results in
//! the order they arrive.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. Client sends frames → dispatch → reply frames to the client
//! 3. `analysis:request` → `analysis:state {analyzing: true}`, task spawned
//! 4. Task completes → `navigate:open`?, `analysis:result`,
//!    `analysis:state {analyzing: false}`, terminal reply
//! 5. Close → the session is dropped with the connection

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use canvas::{BoundingRect, ClientPoint, InputEvent, SurfaceAction};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Data, Frame, Status};
use crate::services::analysis::{AnalysisError, AnalysisOutcome, AnalysisPipeline};
use crate::services::redirect::{Navigator, WebOnly};
use crate::services::session::Session;
use crate::state::AppState;

/// Largest accepted viewport edge, in pixels.
pub const MAX_VIEWPORT_DIM: u32 = 8192;

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Debug, Deserialize)]
struct ResizePayload {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct PointerPayload {
    #[serde(flatten)]
    point: ClientPoint,
    rect: BoundingRect,
}

#[derive(Debug, Deserialize)]
struct TouchPayload {
    #[serde(default)]
    touches: Vec<ClientPoint>,
    rect: BoundingRect,
}

/// A finished analysis on its way back to the connection loop.
struct AnalysisDone {
    request: Frame,
    result: Result<AnalysisOutcome, AnalysisError>,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();
    let (done_tx, mut done_rx) = mpsc::channel::<AnalysisDone>(4);
    let mut session = Session::default();

    let welcome = Frame::request("session:connected", Data::new())
        .with_data("client_id", client_id.to_string())
        .with_data("analysis_configured", state.pipeline.is_configured());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    loop {
        let outbound = tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => process_inbound_text(&state, &mut session, client_id, &done_tx, &text),
                    Message::Close(_) => break,
                    _ => continue,
                }
            }
            Some(done) = done_rx.recv() => complete_analysis(&mut session, client_id, done),
        };

        if send_frames(&mut socket, &outbound).await.is_err() {
            break;
        }
    }

    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the client.
///
/// Keeps the websocket transport out of frame handling so tests can drive a
/// session end to end without a socket.
fn process_inbound_text(
    state: &AppState,
    session: &mut Session,
    client_id: Uuid,
    done_tx: &mpsc::Sender<AnalysisDone>,
    text: &str,
) -> Vec<Frame> {
    let req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    let prefix = req.prefix();
    if prefix != "pointer" && prefix != "touch" {
        info!(%client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");
    }

    let result = match prefix {
        "surface" => handle_surface(session, &req),
        "pointer" => handle_pointer(session, &req),
        "touch" => handle_touch(session, &req),
        "analysis" => handle_analysis(state, session, client_id, done_tx, &req),
        _ => Err(req.error(format!("unknown prefix: {prefix}"))),
    };

    result.unwrap_or_else(|err_frame| vec![err_frame])
}

// =============================================================================
// SURFACE HANDLERS
// =============================================================================

fn handle_surface(session: &mut Session, req: &Frame) -> Result<Vec<Frame>, Frame> {
    match req.op() {
        "resize" => {
            let ResizePayload { width, height } = payload(req)?;
            if width > MAX_VIEWPORT_DIM || height > MAX_VIEWPORT_DIM {
                return Err(req.error(format!("viewport exceeds {MAX_VIEWPORT_DIM}px: {width}x{height}")));
            }
            session.resize(width, height);
            Ok(vec![req.done().with_data("width", width).with_data("height", height)])
        }
        "clear" => {
            session.clear();
            Ok(vec![req.done().with_data("text", "")])
        }
        "snapshot" => match session.surface().snapshot() {
            Ok(snap) => Ok(vec![
                req.done()
                    .with_data("mime_type", snap.mime_type)
                    .with_data("data", snap.data)
                    .with_data("width", snap.width)
                    .with_data("height", snap.height),
            ]),
            Err(e) => Err(req.error_from(&AnalysisError::from(e))),
        },
        op => Err(req.error(format!("unknown surface op: {op}"))),
    }
}

// =============================================================================
// INPUT HANDLERS
// =============================================================================

fn handle_pointer(session: &mut Session, req: &Frame) -> Result<Vec<Frame>, Frame> {
    let PointerPayload { point, rect } = payload(req)?;
    let event = match req.op() {
        "down" => InputEvent::MouseDown(point),
        "move" => InputEvent::MouseMove(point),
        "up" => InputEvent::MouseUp(point),
        "leave" => InputEvent::MouseLeave(point),
        op => return Err(req.error(format!("unknown pointer op: {op}"))),
    };
    Ok(input_reply(req, session.handle_input(&event, rect)))
}

fn handle_touch(session: &mut Session, req: &Frame) -> Result<Vec<Frame>, Frame> {
    let TouchPayload { touches, rect } = payload(req)?;
    let event = match req.op() {
        "start" => InputEvent::TouchStart(touches),
        "move" => InputEvent::TouchMove(touches),
        "end" => InputEvent::TouchEnd(touches),
        op => return Err(req.error(format!("unknown touch op: {op}"))),
    };
    Ok(input_reply(req, session.handle_input(&event, rect)))
}

/// Input frames that change nothing get no reply.
fn input_reply(req: &Frame, action: SurfaceAction) -> Vec<Frame> {
    let mut data = Data::new();
    match action {
        SurfaceAction::None => return vec![],
        SurfaceAction::StrokeStarted(at) => {
            data.insert("drawing".into(), json!(true));
            data.insert("at".into(), json!(at));
        }
        SurfaceAction::Segment { from, to } => {
            data.insert("drawing".into(), json!(true));
            data.insert("segment".into(), json!({ "from": from, "to": to }));
        }
        SurfaceAction::StrokeEnded => {
            data.insert("drawing".into(), json!(false));
        }
    }
    vec![req.done_with(data)]
}

// =============================================================================
// ANALYSIS HANDLER
// =============================================================================

fn handle_analysis(
    state: &AppState,
    session: &mut Session,
    client_id: Uuid,
    done_tx: &mpsc::Sender<AnalysisDone>,
    req: &Frame,
) -> Result<Vec<Frame>, Frame> {
    if req.op() != "request" {
        return Err(req.error(format!("unknown analysis op: {}", req.op())));
    }

    let snapshot = match session.begin_analysis(&state.pipeline) {
        Ok(snapshot) => snapshot,
        Err(AnalysisError::Busy) => {
            debug!(%client_id, "ws: analysis already in flight");
            return Err(req.error_from(&AnalysisError::Busy));
        }
        Err(e) => {
            warn!(%client_id, error = %e, "ws: analysis not started");
            let text = session.analysis.result_text.clone();
            return Ok(vec![result_frame(&text), req.error_from(&e).with_data("text", text)]);
        }
    };

    info!(%client_id, bytes = snapshot.byte_len(), "ws: analysis started");
    spawn_analysis(Arc::clone(&state.pipeline), req.clone(), snapshot, done_tx.clone());
    Ok(vec![state_frame(true)])
}

/// Run one analysis off the connection loop. The completion is always
/// delivered, including when the inner task panics or is cancelled.
fn spawn_analysis(
    pipeline: Arc<AnalysisPipeline>,
    request: Frame,
    snapshot: canvas::Snapshot,
    done_tx: mpsc::Sender<AnalysisDone>,
) {
    tokio::spawn(async move {
        let inner = tokio::spawn(async move { pipeline.analyze(&snapshot).await });
        let result = match inner.await {
            Ok(result) => result,
            Err(e) => Err(AnalysisError::Aborted(e.to_string())),
        };
        if done_tx.send(AnalysisDone { request, result }).await.is_err() {
            debug!("ws: connection closed before analysis finished");
        }
    });
}

/// Apply a finished analysis to the session and build the frames that tell
/// the client about it.
fn complete_analysis(session: &mut Session, client_id: Uuid, done: AnalysisDone) -> Vec<Frame> {
    let mut navigator = WebOnly(FrameNavigator::default());
    let text = session.finish_analysis(&done.result, &mut navigator).to_string();

    let mut frames = navigator.0.frames;
    frames.push(result_frame(&text));
    frames.push(state_frame(false));

    match &done.result {
        Ok(outcome) => {
            info!(%client_id, outcome = outcome.kind(), "ws: analysis finished");
            let mut reply = done.request.done().with_data("outcome", outcome.kind()).with_data("text", text);
            if let AnalysisOutcome::Redirect(url) = outcome {
                reply = reply.with_data("url", url.as_str());
            }
            frames.push(reply);
        }
        Err(e) => {
            warn!(%client_id, error = %e, "ws: analysis failed");
            frames.push(done.request.error_from(e).with_data("text", text));
        }
    }
    frames
}

/// Turns the redirect side effect into a `navigate:open` frame for the client.
#[derive(Default)]
struct FrameNavigator {
    frames: Vec<Frame>,
}

impl Navigator for FrameNavigator {
    fn open(&mut self, url: &str) {
        self.frames.push(Frame::request("navigate:open", Data::new()).with_data("url", url));
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn state_frame(analyzing: bool) -> Frame {
    Frame::request("analysis:state", Data::new()).with_data("analyzing", analyzing)
}

fn result_frame(text: &str) -> Frame {
    Frame::request("analysis:result", Data::new()).with_data("text", text)
}

/// Deserialize a request's data into a typed payload.
fn payload<T: DeserializeOwned>(req: &Frame) -> Result<T, Frame> {
    let value = serde_json::Value::Object(req.data.clone().into_iter().collect());
    serde_json::from_value(value).map_err(|e| req.error(format!("invalid payload: {e}")))
}

async fn send_frames(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), ()> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.data.get("code").and_then(|v| v.as_str()).unwrap_or("-");
        let message = frame.data.get("message").and_then(|v| v.as_str()).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else if !frame.syscall.starts_with("pointer:") && !frame.syscall.starts_with("touch:") {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
