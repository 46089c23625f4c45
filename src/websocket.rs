//! # WebSocket Audio Ingestion
//!
//! Transport edge for one client connection at `GET /ws/{client_id}`. The
//! actor only moves bytes: inbound binary frames are forwarded to the
//! session's controller task over a bounded channel, and the controller's
//! outbound messages are written back as JSON text frames.
//!
//! ## Protocol:
//! - **Client → Server**: binary frames of raw 16-bit LE mono PCM at the
//!   configured sample rate, arbitrary chunk size
//! - **Server → Client**: one JSON text frame per completed segment
//!   (`{"status":"success",...}` or `{"status":"error",...}`)
//!
//! ## Backpressure:
//! The frame channel's capacity is the pipeline backlog. When it fills, the
//! actor suspends processing of further socket messages until the pending
//! frame is accepted; ingested audio is never dropped.
//!
//! ## Close:
//! A client close stops frame intake and lets the controller drain; the
//! socket stays open until every remaining transcript has been delivered,
//! then completes the close handshake. An abrupt transport loss triggers the
//! same drain without the delivery.

use crate::session::controller::{ControllerCommand, SessionController};
use crate::state::AppState;
use crate::transcription::relay::OutboundMessage;
use crate::transcription::transcriber::{HttpTranscriber, Transcriber};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection is considered lost after this long without a pong.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one streaming client.
pub struct AudioSocket {
    /// Client identifier from the connection path
    client_id: String,

    app_state: web::Data<AppState>,

    /// External transcription capability handed to the controller
    transcriber: Arc<dyn Transcriber>,

    /// Inbound frame channel to the controller task; `None` once closing
    frame_tx: Option<mpsc::Sender<ControllerCommand>>,

    /// Whether this connection owns a registry entry
    registered: bool,

    last_heartbeat: Instant,
}

impl AudioSocket {
    pub fn new(
        client_id: String,
        app_state: web::Data<AppState>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            client_id,
            app_state,
            transcriber,
            frame_tx: None,
            registered: false,
            last_heartbeat: Instant::now(),
        }
    }

    /// Forward one binary frame to the controller, suspending the socket
    /// when the backlog is full.
    fn forward_frame(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let Some(tx) = self.frame_tx.clone() else {
            debug!(client_id = %self.client_id, "frame received while closing, ignoring");
            return;
        };

        match tx.try_send(ControllerCommand::Frame(data.to_vec())) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                // Backpressure: stop reading socket messages until the
                // pipeline accepts this frame; audio is never dropped
                debug!(
                    client_id = %self.client_id,
                    "pipeline backlog full, suspending frame intake"
                );
                let send = async move { tx.send(command).await }
                    .into_actor(self)
                    .map(|result, _act, ctx| {
                        if result.is_err() {
                            ctx.stop();
                        }
                    });
                ctx.wait(send);
            }
            Err(TrySendError::Closed(_)) => {
                warn!(client_id = %self.client_id, "pipeline channel closed unexpectedly");
                ctx.stop();
            }
        }
    }

    /// Stop frame intake and let the controller drain. Idempotent.
    fn begin_close(&mut self) {
        if let Some(tx) = self.frame_tx.take() {
            info!(client_id = %self.client_id, "close requested, draining session");
            // Queued frames are processed first; if the backlog is full,
            // dropping the sender closes the channel and triggers the same
            // drain
            let _ = tx.try_send(ControllerCommand::Close);
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(client_id = %act.client_id, "heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for AudioSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Register the session and wire up the controller task.
    fn started(&mut self, ctx: &mut Self::Context) {
        let config = self.app_state.get_config();
        let registry = self.app_state.registry.clone();

        let handle = match registry.insert(&self.client_id) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(client_id = %self.client_id, error = %err, "rejecting connection");
                let message = OutboundMessage::Error { message: err };
                if let Ok(json) = serde_json::to_string(&message) {
                    ctx.text(json);
                }
                ctx.stop();
                return;
            }
        };

        info!(client_id = %self.client_id, "audio session connected");
        self.registered = true;
        self.app_state.increment_active_connections();

        let (frame_tx, frame_rx) = mpsc::channel(config.performance.max_pending_frames);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        self.frame_tx = Some(frame_tx);

        let controller = SessionController::new(
            handle,
            registry,
            &config,
            self.transcriber.clone(),
            out_tx,
        );
        tokio::spawn(controller.run(frame_rx));

        // Outbound messages come back through the actor so every socket
        // write happens on this context
        ctx.add_stream(UnboundedReceiverStream::new(out_rx));

        self.start_heartbeat(ctx);
    }

    /// Transport gone: closing the frame channel triggers the drain.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.frame_tx.take();

        if self.registered {
            self.app_state.decrement_active_connections();
            info!(client_id = %self.client_id, "audio connection stopped");
        }
    }
}

/// Inbound socket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.forward_frame(&data, ctx);
            }
            Ok(ws::Message::Text(_)) => {
                warn!(client_id = %self.client_id, "unexpected text frame from client, ignoring");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(client_id = %self.client_id, ?reason, "close frame received");
                if self.registered {
                    // Keep the socket open until the drain has delivered the
                    // remaining transcripts; the outbound stream finishing
                    // completes the close
                    self.begin_close();
                } else {
                    ctx.stop();
                }
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(client_id = %self.client_id, "unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(client_id = %self.client_id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Outbound messages from the session controller.
impl StreamHandler<OutboundMessage> for AudioSocket {
    fn handle(&mut self, message: OutboundMessage, ctx: &mut Self::Context) {
        match serde_json::to_string(&message) {
            Ok(json) => ctx.text(json),
            Err(err) => {
                error!(client_id = %self.client_id, error = %err, "failed to serialize outbound message");
            }
        }
    }

    /// The controller dropped its outbound sender: draining is complete.
    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!(client_id = %self.client_id, "session pipeline finished");
        ctx.close(None);
        ctx.stop();
    }
}

/// WebSocket endpoint handler: upgrades `GET /ws/{client_id}`.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let client_id = path.into_inner();
    info!(
        client_id = %client_id,
        peer = ?req.connection_info().peer_addr(),
        "new WebSocket connection request"
    );

    let config = app_state.get_config();
    let transcriber = HttpTranscriber::new(
        config.transcription.endpoint.clone(),
        config.transcription.model.clone(),
        Duration::from_secs(config.transcription.request_timeout_seconds),
    )
    .map_err(actix_web::error::ErrorInternalServerError)?;

    let socket = AudioSocket::new(client_id, app_state, Arc::new(transcriber));
    ws::start(socket, &req, stream)
}
