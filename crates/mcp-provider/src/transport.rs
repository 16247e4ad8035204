//! JSON-RPC over the HTTP + server-sent events transport.
//!
//! The client holds one long-lived `GET` whose first event names the URL
//! that accepts `POST`ed messages. Every response, and every request the
//! server makes of us, then arrives on that same stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use reqwest::{Client, Url, header};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use toolchat_sse::{Chunks, Sse, is_event_stream};
use toolchat_tool_provider::ErrorKind;
use tracing::Instrument;

use crate::Error;
use crate::config::McpConfig;
use crate::proto::{
    Incoming, IncomingKind, METHOD_NOT_FOUND, Notification, Reply, Request,
    RpcError,
};

type Outcome = Result<Value, RpcError>;

#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<Outcome>>,
}

struct Shared {
    client: Client,
    endpoint: Url,
    bearer_token: Option<String>,
    next_id: AtomicU64,
    pending: Mutex<Pending>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn post<T: Serialize>(&self, message: &T) -> Result<(), Error> {
        let mut req = self.client.post(self.endpoint.clone()).json(message);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Transport))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::new(
                format!("message rejected with {status}: {body}"),
                ErrorKind::Transport,
            ));
        }
        Ok(())
    }

    /// Fails every outstanding request and refuses new ones.
    fn close(&self) {
        let mut pending = self.pending();
        pending.closed = true;
        // Dropping the senders wakes the waiters with `RecvError`.
        pending.waiters.clear();
    }
}

/// Removes a waiter that is no longer going to be polled.
struct WaiterGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending().waiters.remove(&self.id);
    }
}

pub(crate) struct SseTransport {
    shared: Arc<Shared>,
    timeout: Option<Duration>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Opens the event stream and waits for the message endpoint.
    pub async fn open(client: Client, config: &McpConfig) -> Result<Self, Error> {
        let mut req = client
            .get(config.base_url.clone())
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = &config.bearer_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Transport))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::new(
                format!("event stream refused with {status}"),
                ErrorKind::Transport,
            ));
        }
        if !is_event_stream(&resp) {
            return Err(Error::new(
                "response is not an event stream",
                ErrorKind::Protocol,
            ));
        }

        let mut sse = Sse::new(Chunks::from_response(resp));
        let endpoint = match config.timeout {
            Some(duration) => timeout(duration, wait_for_endpoint(&mut sse))
                .await
                .map_err(|_| {
                    Error::new("no endpoint announced", ErrorKind::Timeout)
                })??,
            None => wait_for_endpoint(&mut sse).await?,
        };
        let endpoint = config.base_url.join(&endpoint).map_err(|err| {
            Error::new(
                format!("invalid endpoint `{endpoint}`: {err}"),
                ErrorKind::Protocol,
            )
        })?;
        debug!("message endpoint: {endpoint}");

        let shared = Arc::new(Shared {
            client,
            endpoint,
            bearer_token: config.bearer_token.clone(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(Pending::default()),
        });
        let reader = tokio::spawn(
            read_messages(sse, Arc::downgrade(&shared))
                .instrument(debug_span!("mcp_reader")),
        );
        Ok(Self {
            shared,
            timeout: config.timeout,
            reader,
        })
    }

    /// Sends a request and waits for the matching response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, Error> {
        match self.timeout {
            Some(duration) => timeout(duration, self.round_trip(method, params))
                .await
                .map_err(|_| {
                    Error::new(
                        format!("`{method}` timed out after {duration:?}"),
                        ErrorKind::Timeout,
                    )
                })?,
            None => self.round_trip(method, params).await,
        }
    }

    async fn round_trip(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, Error> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending();
            if pending.closed {
                return Err(Error::new("connection closed", ErrorKind::Closed));
            }
            pending.waiters.insert(id, tx);
        }
        let _guard = WaiterGuard {
            shared: &self.shared,
            id,
        };

        trace!("-> {method} (#{id})");
        self.shared.post(&Request::new(id, method, params)).await?;
        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(Error::from_rpc(error)),
            Err(_) => Err(Error::new(
                format!("connection closed while waiting for `{method}`"),
                ErrorKind::Closed,
            )),
        }
    }

    /// Sends a notification; there is nothing to wait for.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), Error> {
        trace!("-> {method}");
        self.shared.post(&Notification::new(method, params)).await
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.close();
    }
}

async fn wait_for_endpoint(sse: &mut Sse) -> Result<String, Error> {
    loop {
        match sse.next_event().await {
            Ok(Some(event)) if event.event_type() == "endpoint" => {
                return Ok(event.data.trim().to_owned());
            }
            Ok(Some(event)) => {
                trace!("ignoring `{}` before endpoint", event.event_type());
            }
            Ok(None) => {
                return Err(Error::new(
                    "event stream ended before an endpoint was announced",
                    ErrorKind::Closed,
                ));
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Transport));
            }
        }
    }
}

async fn read_messages(mut sse: Sse, shared: Weak<Shared>) {
    loop {
        let event = match sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("event stream ended");
                break;
            }
            Err(err) => {
                warn!("event stream failed: {err}");
                break;
            }
        };
        if event.event_type() != "message" {
            trace!("ignoring `{}` event", event.event_type());
            continue;
        }
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let incoming: Incoming = match serde_json::from_str(&event.data) {
            Ok(incoming) => incoming,
            Err(err) => {
                warn!("malformed message: {err}");
                continue;
            }
        };
        match incoming.classify() {
            IncomingKind::Response(id, outcome) => {
                let waiter = shared.pending().waiters.remove(&id);
                match waiter {
                    Some(tx) => {
                        _ = tx.send(outcome);
                    }
                    None => debug!("no one is waiting for #{id}"),
                }
            }
            IncomingKind::Request(id, method) => {
                let reply = if method == "ping" {
                    Reply::result(id, Value::Object(Default::default()))
                } else {
                    debug!("declining server request `{method}`");
                    Reply::error(
                        id,
                        RpcError {
                            code: METHOD_NOT_FOUND,
                            message: format!("method not found: {method}"),
                            data: None,
                        },
                    )
                };
                tokio::spawn(async move {
                    if let Err(err) = shared.post(&reply).await {
                        warn!("failed to answer server request: {err}");
                    }
                });
            }
            IncomingKind::Notification(method) => {
                debug!("notification: {method}");
            }
            IncomingKind::Invalid => {
                warn!("message is neither a request nor a response");
            }
        }
    }
    if let Some(shared) = shared.upgrade() {
        shared.close();
    }
}
