//! TCP server side of the substrate.
//!
//! Each accepted connection gets its own task. Subscriptions are
//! forwarded by one small task each, all writing into the connection's
//! single outbound queue so replies and messages keep their order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::error::{DisplayError, Result};
use crate::net::codec::ServerCodec;
use crate::net::wire::{ClientFrame, Reply, ServerFrame};
use crate::server::DisplayServer;

/// Accept connections forever.
pub async fn serve(listener: TcpListener, server: Arc<DisplayServer>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("client connected from {peer}");
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, server).await {
                warn!("connection {peer}: {e}");
            }
            info!("client {peer} disconnected");
        });
    }
}

/// Accept connections until a client requests `quit`.
pub async fn serve_until_quit(listener: TcpListener, server: Arc<DisplayServer>) -> Result<()> {
    let mut quit = server.quit_receiver();
    tokio::select! {
        result = serve(listener, server) => result,
        _ = quit.wait_for(|q| *q) => {
            info!("quit received, stopping server");
            Ok(())
        }
    }
}

struct Forwarder {
    topic: String,
    broker_id: u64,
    task: JoinHandle<()>,
}

async fn handle_connection(stream: TcpStream, server: Arc<DisplayServer>) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut sink, mut frames) = Framed::new(stream, ServerCodec::new()).split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(256);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!("write error: {e}");
                break;
            }
        }
    });

    let mut forwarders: HashMap<u64, Forwarder> = HashMap::new();
    let result = async {
        while let Some(frame) = frames.next().await {
            let frame = frame?;
            match frame {
                ClientFrame::Call {
                    id,
                    endpoint,
                    request,
                } => {
                    let result = server.handle(&endpoint, request).map(Reply::Response);
                    out_tx.send(ServerFrame::Reply { id, result }).await?;
                }
                ClientFrame::HasEndpoint { id, endpoint } => {
                    let result = Ok(Reply::Bool(server.has_endpoint(&endpoint)));
                    out_tx.send(ServerFrame::Reply { id, result }).await?;
                }
                ClientFrame::GetParam { id, key } => {
                    let result = Ok(Reply::Param(server.get_param(&key)));
                    out_tx.send(ServerFrame::Reply { id, result }).await?;
                }
                ClientFrame::SetParam { id, key, value } => {
                    debug!("set param {key}");
                    server.set_param(&key, value);
                    out_tx
                        .send(ServerFrame::Reply {
                            id,
                            result: Ok(Reply::Done),
                        })
                        .await?;
                }
                ClientFrame::Subscribe { id, topic } => {
                    let (broker_id, mut rx) = server.broker().subscribe(&topic);
                    out_tx
                        .send(ServerFrame::Reply {
                            id,
                            result: Ok(Reply::Subscribed),
                        })
                        .await?;

                    let out = out_tx.clone();
                    let task = tokio::spawn(async move {
                        while let Some(data) = rx.recv().await {
                            let msg = ServerFrame::Message {
                                subscription: id,
                                data,
                            };
                            if out.send(msg).await.is_err() {
                                break;
                            }
                        }
                    });
                    forwarders.insert(
                        id,
                        Forwarder {
                            topic,
                            broker_id,
                            task,
                        },
                    );
                }
                ClientFrame::Unsubscribe { subscription } => {
                    if let Some(f) = forwarders.remove(&subscription) {
                        f.task.abort();
                        server.broker().unsubscribe(&f.topic, f.broker_id);
                    }
                }
                ClientFrame::Publish { id, topic, data } => {
                    server.broker().publish(&topic, &data);
                    out_tx
                        .send(ServerFrame::Reply {
                            id,
                            result: Ok(Reply::Done),
                        })
                        .await?;
                }
            }
        }
        Ok::<(), DisplayError>(())
    }
    .await;

    for (_, f) in forwarders.drain() {
        f.task.abort();
        server.broker().unsubscribe(&f.topic, f.broker_id);
    }
    drop(out_tx);
    let _ = writer.await;
    result
}
