use std::fmt::Display;

use axum::extract::ws::Message::{Close, Text};
use axum::extract::ws::{CloseFrame, WebSocket, close_code};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, Stream, StreamExt};
use log::{debug, error, warn};
use serde::Serialize;

use crate::{conversation, manager, user};

pub async fn messages(
    id: Path<conversation::Id>,
    ws: WebSocketUpgrade,
    conv_manager: State<manager::Service>,
) -> Response {
    let snapshots = conv_manager.stream_messages(&id);
    ws.on_upgrade(move |socket| forward(socket, snapshots))
}

pub async fn overviews(
    user_id: Path<user::Id>,
    ws: WebSocketUpgrade,
    conv_manager: State<manager::Service>,
) -> Response {
    let snapshots = conv_manager.stream_overviews(&user_id);
    ws.on_upgrade(move |socket| forward(socket, snapshots))
}

/// Pushes every snapshot to the client as a JSON text frame until either side stops.
/// Dropping `snapshots` on exit detaches the underlying listener.
async fn forward<S, T, E>(ws: WebSocket, mut snapshots: S)
where
    S: Stream<Item = Result<T, E>> + Unpin + Send,
    T: Serialize + Send,
    E: Display + Send,
{
    let (mut sender, mut receiver) = ws.split();

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    None => break,
                    Some(Ok(Close(frame))) => {
                        debug!("WS connection closed by client: {:?}", frame);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Failed to read WS frame: {e}");
                        break;
                    }
                    Some(Ok(other)) => debug!("Ignoring client frame: {:?}", other),
                }
            },

            item = snapshots.next() => {
                match item {
                    None => {
                        debug!("Snapshot stream completed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Snapshot stream failed: {e}");
                        let frame = CloseFrame {
                            code: close_code::ERROR,
                            reason: e.to_string().into(),
                        };
                        if let Err(e) = sender.send(Close(Some(frame))).await {
                            error!("Failed to send close frame: {e}");
                        }
                        break;
                    }
                    Some(Ok(snapshot)) => {
                        let json = match serde_json::to_string(&snapshot) {
                            Ok(json) => json,
                            Err(e) => {
                                error!("Failed to serialize snapshot: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = sender.send(Text(json.into())).await {
                            error!("Failed to send snapshot to client: {e}");
                            break;
                        }
                    }
                }
            },
        }
    }
}
