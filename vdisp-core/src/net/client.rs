//! TCP client side of the substrate.
//!
//! One framed connection carries every request and every subscription.
//! A writer task drains outbound frames; a reader task routes replies
//! to their waiting callers by request id and broadcast messages to
//! their subscriptions by subscription id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::{DisplayError, Result};
use crate::net::codec::ClientCodec;
use crate::net::wire::{ClientFrame, Reply, ServerFrame};
use crate::transport::{ParamValue, Request, Response, Subscription, Transport};

/// Default deadline for a single request/reply exchange.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

type ReplySender = oneshot::Sender<std::result::Result<Reply, String>>;

#[derive(Default)]
struct Routes {
    pending: Mutex<HashMap<u64, ReplySender>>,
    subscriptions: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    closed: AtomicBool,
}

impl Routes {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, ReplySender>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<String>>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn route(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Reply { id, result } => match self.pending().remove(&id) {
                Some(waiter) => {
                    let _ = waiter.send(result);
                }
                None => debug!("reply for unknown request {id}"),
            },
            ServerFrame::Message { subscription, data } => {
                let mut subs = self.subscriptions();
                let delivered = match subs.get(&subscription) {
                    Some(tx) => tx.send(data).is_ok(),
                    None => true,
                };
                if !delivered {
                    subs.remove(&subscription);
                }
            }
        }
    }

    /// Fail every waiter and end every subscription. Routes added
    /// afterwards must check [`is_closed`](Self::is_closed).
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending().clear();
        self.subscriptions().clear();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── RemoteTransport ──────────────────────────────────────────────

/// [`Transport`] over a TCP connection to a display server.
pub struct RemoteTransport {
    tx: mpsc::Sender<ClientFrame>,
    /// Unsubscribe frames; unbounded so a release never drops one.
    control: mpsc::UnboundedSender<ClientFrame>,
    routes: Arc<Routes>,
    reader: JoinHandle<()>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl RemoteTransport {
    /// Connect to `addr`, giving up after `call_timeout`.
    pub async fn connect(addr: impl ToSocketAddrs, call_timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(call_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DisplayError::Timeout(call_timeout))??;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, call_timeout))
    }

    /// Wrap an established stream and start the I/O tasks.
    pub fn new(stream: TcpStream, call_timeout: Duration) -> Self {
        let (mut net_writer, mut net_reader) = Framed::new(stream, ClientCodec::new()).split();
        let (tx, mut outbound) = mpsc::channel::<ClientFrame>(100);
        let (control, mut control_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let routes = Arc::new(Routes::default());

        // Writer task: caller -> network
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    Some(frame) = control_rx.recv() => frame,
                    Some(frame) = outbound.recv() => frame,
                    else => break,
                };
                if let Err(e) = net_writer.send(frame).await {
                    warn!("display server write error: {e}");
                    break;
                }
            }
        });

        // Reader task: network -> waiters / subscriptions
        let reader_routes = Arc::clone(&routes);
        let reader = tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(frame) => reader_routes.route(frame),
                    Err(e) => {
                        warn!("display server read error: {e}");
                        break;
                    }
                }
            }
            debug!("display server connection closed");
            reader_routes.close();
        });

        Self {
            tx,
            control,
            routes,
            reader,
            next_id: AtomicU64::new(1),
            call_timeout,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request frame and wait for its reply.
    async fn request(&self, id: u64, frame: ClientFrame) -> Result<std::result::Result<Reply, String>> {
        let (waiter, rx) = oneshot::channel();
        self.routes.pending().insert(id, waiter);
        if self.routes.is_closed() {
            self.routes.pending().remove(&id);
            return Err(DisplayError::ChannelClosed);
        }

        if let Err(e) = self.tx.send(frame).await {
            self.routes.pending().remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(reply) => Ok(reply?),
            Err(_) => {
                self.routes.pending().remove(&id);
                Err(DisplayError::Timeout(self.call_timeout))
            }
        }
    }

    /// Like [`request`](Self::request) but a rejection becomes an error.
    async fn request_ok(&self, what: &str, frame_for: impl FnOnce(u64) -> ClientFrame) -> Result<Reply> {
        let id = self.next_id();
        self.request(id, frame_for(id))
            .await?
            .map_err(|reason| DisplayError::Rejected {
                endpoint: what.to_string(),
                reason,
            })
    }
}

impl Drop for RemoteTransport {
    fn drop(&mut self) {
        // The reader half keeps the socket open until aborted.
        self.reader.abort();
        self.routes.close();
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn call(&self, endpoint: &str, request: Request) -> Result<Response> {
        let reply = self
            .request_ok(endpoint, |id| ClientFrame::Call {
                id,
                endpoint: endpoint.to_string(),
                request,
            })
            .await?;
        match reply {
            Reply::Response(response) => Ok(response),
            _ => Err(DisplayError::UnexpectedResponse(endpoint.to_string())),
        }
    }

    async fn has_endpoint(&self, endpoint: &str) -> Result<bool> {
        match self
            .request_ok(endpoint, |id| ClientFrame::HasEndpoint {
                id,
                endpoint: endpoint.to_string(),
            })
            .await?
        {
            Reply::Bool(present) => Ok(present),
            _ => Err(DisplayError::UnexpectedResponse(endpoint.to_string())),
        }
    }

    async fn get_param(&self, key: &str) -> Result<Option<ParamValue>> {
        match self
            .request_ok(key, |id| ClientFrame::GetParam {
                id,
                key: key.to_string(),
            })
            .await?
        {
            Reply::Param(value) => Ok(value),
            _ => Err(DisplayError::UnexpectedResponse(key.to_string())),
        }
    }

    async fn set_param(&self, key: &str, value: ParamValue) -> Result<()> {
        self.request_ok(key, |id| ClientFrame::SetParam {
            id,
            key: key.to_string(),
            value,
        })
        .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let id = self.next_id();
        let (sub_tx, sub_rx) = mpsc::unbounded_channel();
        // Registered before the request so no early message is lost.
        self.routes.subscriptions().insert(id, sub_tx);
        if self.routes.is_closed() {
            self.routes.subscriptions().remove(&id);
            return Err(DisplayError::ChannelClosed);
        }

        let outcome = self
            .request(
                id,
                ClientFrame::Subscribe {
                    id,
                    topic: topic.to_string(),
                },
            )
            .await;
        match outcome {
            Ok(Ok(Reply::Subscribed)) => {}
            Ok(Ok(_)) => {
                self.routes.subscriptions().remove(&id);
                return Err(DisplayError::UnexpectedResponse(topic.to_string()));
            }
            Ok(Err(reason)) => {
                self.routes.subscriptions().remove(&id);
                return Err(DisplayError::Rejected {
                    endpoint: topic.to_string(),
                    reason,
                });
            }
            Err(e) => {
                self.routes.subscriptions().remove(&id);
                return Err(e);
            }
        }

        let routes = Arc::clone(&self.routes);
        let control = self.control.clone();
        Ok(Subscription::new(topic, sub_rx).on_release(move || {
            routes.subscriptions().remove(&id);
            // Fails only once the writer is gone, and the server drops
            // every forwarder of a closed connection itself.
            let _ = control.send(ClientFrame::Unsubscribe { subscription: id });
        }))
    }

    async fn publish(&self, topic: &str, data: &str) -> Result<()> {
        self.request_ok(topic, |id| ClientFrame::Publish {
            id,
            topic: topic.to_string(),
            data: data.to_string(),
        })
        .await?;
        Ok(())
    }
}
