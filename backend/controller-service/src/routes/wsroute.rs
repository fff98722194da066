use crate::broadcast::{SubscriberHub, SubscriberId};
use crate::state::AppState;
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

// Frame pushed from the hub to one socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct BroadcastMessage(String);

struct WsSession {
    subscriber_id: SubscriberId,
    hub: SubscriberHub,
    frames: Option<UnboundedReceiver<String>>,
    hb: Instant,
}

impl WsSession {
    fn new(
        subscriber_id: SubscriberId,
        hub: SubscriberHub,
        frames: UnboundedReceiver<String>,
    ) -> Self {
        Self {
            subscriber_id,
            hub,
            frames: Some(frames),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    subscriber_id = %act.subscriber_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(subscriber_id = %self.subscriber_id, "WebSocket session started");
        self.hb(ctx);

        // Bridge the hub channel into the actor; ends once the hub drops the sender
        if let Some(mut frames) = self.frames.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(frame) = frames.recv().await {
                    addr.do_send(BroadcastMessage(frame));
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(subscriber_id = %self.subscriber_id, "WebSocket session stopped");

        let hub = self.hub.clone();
        let subscriber_id = self.subscriber_id;
        actix::spawn(async move {
            hub.remove_subscriber(subscriber_id).await;
        });
    }
}

impl Handler<BroadcastMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: BroadcastMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                // Receive-only hub; client traffic just counts as liveness
                self.hb = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(subscriber_id = %self.subscriber_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[get("/hub/measurements")]
pub async fn measurements_hub(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (subscriber_id, frames) = state.hub.add_subscriber().await;
    let session = WsSession::new(subscriber_id, state.hub.clone(), frames);

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            // Handshake rejected before the actor started
            state.hub.remove_subscriber(subscriber_id).await;
            Err(e)
        }
    }
}
