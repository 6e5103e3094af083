//! `GET /ws`: one subscriber per socket
//!
//! The socket receives whatever the hub offers its slot each tick. Anything the
//! client sends is ignored apart from close.

use super::AppState;
use crate::broadcast::HubHandle;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use tracing::debug;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_frames(socket, state.hub))
}

async fn stream_frames(mut socket: WebSocket, hub: HubHandle) {
    let Some((id, mut frames)) = hub.connect().await else {
        debug!("Broadcast hub unavailable, closing socket");
        return;
    };

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(json) => {
                    if socket.send(Message::Text(json.to_string())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.disconnect(id).await;
}
