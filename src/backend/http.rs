//! HTTP implementation of the backend surface

use futures::future::{self, BoxFuture};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, debug_span, Instrument};

use super::Backend;
use crate::config::Config;
use crate::error::{DashboardError, DashboardResult};
use crate::models::{
    ClusterName, ClusterSelection, ClusterStatus, ClusterStatusSnapshot, DiagnosticEvent,
    NewSubscription, Subscription, SubscriptionId,
};

const SUBSCRIPTION_PATH: &str = "/diag_event/subscription";
const EVENT_STREAM_PATH: &str = "/diag_event/sse_listen";

/// Backend reached over HTTP, every path prefixed with the configured origin
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    /// Client without a total timeout, for long-lived event streams
    stream_client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &Config) -> DashboardResult<Self> {
        Self::with_base_url(config.url_prefix(), config.request_timeout())
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> DashboardResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DashboardError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let stream_client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| DashboardError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            stream_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn subscription_url(&self, id: &SubscriptionId, action: Option<&str>) -> String {
        match action {
            Some(action) => self.url(&format!("{}/{}/{}", SUBSCRIPTION_PATH, id, action)),
            None => self.url(&format!("{}/{}", SUBSCRIPTION_PATH, id)),
        }
    }
}

/// Turn a non-success status into the matching error
async fn check(response: Response) -> DashboardResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    Err(DashboardError::http_status(status.as_u16(), &message))
}

fn send_json<T: DeserializeOwned + Send + 'static>(
    request: RequestBuilder,
    span: tracing::Span,
) -> BoxFuture<'static, DashboardResult<T>> {
    async move {
        let response = check(request.send().await?).await?;
        let value = response.json::<T>().await?;
        Ok(value)
    }
    .instrument(span)
    .boxed()
}

fn send_empty(request: RequestBuilder, span: tracing::Span) -> BoxFuture<'static, DashboardResult<()>> {
    async move {
        check(request.send().await?).await?;
        debug!("Acknowledged");
        Ok(())
    }
    .instrument(span)
    .boxed()
}

impl Backend for HttpBackend {
    fn ping(&self) -> BoxFuture<'static, DashboardResult<()>> {
        send_empty(self.client.get(self.url("/ping")), debug_span!("ping"))
    }

    fn cluster_names(&self) -> BoxFuture<'static, DashboardResult<Vec<ClusterName>>> {
        send_json(self.client.get(self.url("/cluster")), debug_span!("cluster_names"))
    }

    fn cluster_status(
        &self,
        cluster: &ClusterName,
    ) -> BoxFuture<'static, DashboardResult<ClusterStatusSnapshot>> {
        let request = self.client.get(self.url(&format!("/cluster/{}", cluster)));
        send_json::<ClusterStatus>(request, debug_span!("cluster_status", cluster = %cluster))
            .map(|status| status.map(ClusterStatusSnapshot::from))
            .boxed()
    }

    fn logout(&self) -> BoxFuture<'static, DashboardResult<()>> {
        send_empty(self.client.post(self.url("/logout")), debug_span!("logout"))
    }

    fn list_subscriptions(
        &self,
        selection: &ClusterSelection,
    ) -> BoxFuture<'static, DashboardResult<Vec<Subscription>>> {
        let mut request = self.client.get(self.url(SUBSCRIPTION_PATH));
        if let Some(cluster) = selection.cluster() {
            request = request.query(&[("clusterName", cluster.as_str())]);
        }
        send_json(request, debug_span!("list_subscriptions", selection = %selection))
    }

    fn add_subscription(
        &self,
        request: &NewSubscription,
    ) -> BoxFuture<'static, DashboardResult<Subscription>> {
        let span = debug_span!("add_subscription", cluster = %request.cluster);
        send_json(self.client.post(self.url(SUBSCRIPTION_PATH)).json(request), span)
    }

    fn delete_subscription(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>> {
        send_empty(
            self.client.delete(self.subscription_url(id, None)),
            debug_span!("delete_subscription", id = %id),
        )
    }

    fn listen(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>> {
        send_empty(
            self.client.post(self.subscription_url(id, Some("listen"))),
            debug_span!("listen", id = %id),
        )
    }

    fn unlisten(&self, id: &SubscriptionId) -> BoxFuture<'static, DashboardResult<()>> {
        send_empty(
            self.client.post(self.subscription_url(id, Some("unlisten"))),
            debug_span!("unlisten", id = %id),
        )
    }

    fn event_stream(
        &self,
        id: &SubscriptionId,
    ) -> BoxStream<'static, DashboardResult<DiagnosticEvent>> {
        let request = self
            .stream_client
            .get(self.url(&format!("{}/{}", EVENT_STREAM_PATH, id)))
            .header(ACCEPT, "text/event-stream");

        let connect = async move {
            let response = check(request.send().await?).await?;
            Ok::<_, DashboardError>(response.bytes_stream())
        };

        stream::once(connect)
            .map(|connected| match connected {
                Ok(bytes) => decode_events(bytes).left_stream(),
                Err(e) => stream::once(future::ready(Err(e))).right_stream(),
            })
            .flatten()
            .boxed()
    }
}

fn decode_events<S, B>(bytes: S) -> impl Stream<Item = DashboardResult<DiagnosticEvent>>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    bytes
        .scan(SseDecoder::default(), |decoder, chunk| {
            let items: Vec<DashboardResult<DiagnosticEvent>> = match chunk {
                Ok(chunk) => decoder
                    .push(chunk.as_ref())
                    .into_iter()
                    .map(|data| data.and_then(|data| Ok(serde_json::from_str(&data)?)))
                    .collect(),
                Err(e) => vec![Err(e.into())],
            };
            future::ready(Some(stream::iter(items)))
        })
        .flatten()
}

/// Largest event the decoder buffers before discarding it
pub(crate) const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Incremental decoder for `text/event-stream` bodies, yielding the joined
/// `data:` lines of each complete event.
///
/// Lines end with CRLF, LF or a lone CR, and a CRLF split across chunks
/// counts once. An event larger than [`MAX_EVENT_BYTES`] is dropped and
/// reported as a decode error when its terminating blank line arrives.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    line: Vec<u8>,
    // current line has content, even if it was discarded
    in_line: bool,
    data: Vec<String>,
    data_bytes: usize,
    after_cr: bool,
    oversized: bool,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, mut chunk: &[u8]) -> Vec<DashboardResult<String>> {
        let mut events = Vec::new();

        if chunk.is_empty() {
            return events;
        }
        if self.after_cr && chunk[0] == b'\n' {
            chunk = &chunk[1..];
        }
        self.after_cr = false;

        while let Some(pos) = chunk.iter().position(|b| *b == b'\n' || *b == b'\r') {
            self.extend_line(&chunk[..pos]);
            self.end_line(&mut events);

            let mut next = pos + 1;
            if chunk[pos] == b'\r' {
                match chunk.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }
            chunk = &chunk[next..];
        }
        self.extend_line(chunk);

        events
    }

    fn extend_line(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.in_line = true;
        if self.oversized {
            return;
        }
        if self.data_bytes + self.line.len() + bytes.len() > MAX_EVENT_BYTES {
            self.oversized = true;
            self.line.clear();
            self.data.clear();
            self.data_bytes = 0;
            return;
        }
        self.line.extend_from_slice(bytes);
    }

    fn end_line(&mut self, events: &mut Vec<DashboardResult<String>>) {
        if self.in_line {
            self.in_line = false;
            if self.oversized {
                return;
            }
            let line = String::from_utf8_lossy(&self.line);
            let value = match line.split_once(':') {
                Some(("data", value)) => Some(value.strip_prefix(' ').unwrap_or(value)),
                None if line == "data" => Some(""),
                _ => None,
            };
            if let Some(value) = value {
                self.data_bytes += value.len() + 1;
                self.data.push(value.to_string());
            }
            self.line.clear();
            return;
        }

        if self.oversized {
            self.oversized = false;
            events.push(Err(DashboardError::Decode(format!(
                "event exceeds {} bytes",
                MAX_EVENT_BYTES
            ))));
        } else if !self.data.is_empty() {
            events.push(Ok(self.data.join("\n")));
        }
        self.data.clear();
        self.data_bytes = 0;
    }
}
