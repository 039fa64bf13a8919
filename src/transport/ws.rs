// SPDX-License-Identifier: MIT
// WebSocket transport: a TCP listener accepting upgrade requests, one
// `WsTransport` per connection. Each WebSocket text frame carries exactly
// one JSON-RPC message.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::Transport;
use crate::server;
use crate::ServerContext;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

pub struct WsTransport {
    sink: Mutex<WsSink>,
    stream: Mutex<WsStream>,
    peer: SocketAddr,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn receive(&self) -> Result<Option<String>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Ping(data))) => {
                    let mut sink = self.sink.lock().await;
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(peer = %self.peer, "ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn send(&self, frame: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(frame.to_string().into())).await?;
        Ok(())
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

/// Accept loop. Runs until `shutdown` resolves, then closes every
/// connection with reason `"shutdown"`.
pub async fn run(
    ctx: Arc<ServerContext>,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let addr = format!("127.0.0.1:{}", ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "MCP server listening (WebSocket)");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!("shutdown signal received — closing connections");
                ctx.connections.close_all("shutdown").await;
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_socket(ctx, stream, peer).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("MCP server stopped");
    Ok(())
}

async fn serve_socket(ctx: Arc<ServerContext>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 * 1024 * 1024), // 16 MB
        max_frame_size: Some(4 * 1024 * 1024),    // 4 MB per frame
        ..Default::default()
    };
    let ws = accept_async_with_config(stream, Some(ws_config)).await?;
    let (sink, stream) = ws.split();

    let transport = Arc::new(WsTransport {
        sink: Mutex::new(sink),
        stream: Mutex::new(stream),
        peer,
    });
    server::serve_connection(ctx, transport).await
}
