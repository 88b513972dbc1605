//! HTTP transport to the central node.
//!
//! Every RPC is a POST of a CBOR body to `/sync/<method>`. The HTTP client
//! itself is abstracted so any library (or an in-process loopback) can
//! carry the bytes.

use crate::error::{SyncError, SyncResult};
use crate::transport::CentralServer;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ticksync_protocol::{
    Ack, InitiatePullRequest, MarkErroredRequest, PullMetadata, PullRequest, PullResponse,
    PushAck, PushRequest, SessionRequest, StartSessionRequest, StartSessionResponse, WireMessage,
};
use tracing::warn;

/// Endpoint paths, relative to the base URL.
pub mod paths {
    /// `start_sync_session`.
    pub const START_SESSION: &str = "/sync/start_session";
    /// `initiate_pull`.
    pub const INITIATE_PULL: &str = "/sync/initiate_pull";
    /// `pull`.
    pub const PULL: &str = "/sync/pull";
    /// `push`.
    pub const PUSH: &str = "/sync/push";
    /// `complete_push`.
    pub const COMPLETE_PUSH: &str = "/sync/complete_push";
    /// `end_sync_session`.
    pub const END_SESSION: &str = "/sync/end_session";
    /// `mark_session_errored`.
    pub const MARK_ERRORED: &str = "/sync/mark_errored";
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// Central node reached over HTTP with CBOR bodies.
pub struct HttpCentralServer<C: HttpClient> {
    base_url: String,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpCentralServer<C> {
    /// Creates a transport for `base_url` (e.g. `https://central.example.org`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Whether the last call reached central and the client is healthy.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn post_cbor<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        if !self.client.is_healthy() {
            return Err(SyncError::transport_retryable("http client is unhealthy"));
        }

        let body = request.encode()?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response_body = self.client.post(&url, body).map_err(|e| {
            warn!(url = %url, error = %e, "central request failed");
            *self.last_error.write() = Some(e.clone());
            self.connected.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;

        self.connected.store(true, Ordering::SeqCst);
        *self.last_error.write() = None;
        Ok(Res::decode(&response_body)?)
    }
}

impl<C: HttpClient> CentralServer for HttpCentralServer<C> {
    fn start_sync_session(&self, request: &StartSessionRequest) -> SyncResult<StartSessionResponse> {
        self.post_cbor(paths::START_SESSION, request)
    }

    fn initiate_pull(&self, request: &InitiatePullRequest) -> SyncResult<PullMetadata> {
        self.post_cbor(paths::INITIATE_PULL, request)
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.post_cbor(paths::PULL, request)
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        self.post_cbor(paths::PUSH, request)
    }

    fn complete_push(&self, request: &SessionRequest) -> SyncResult<()> {
        self.post_cbor::<_, Ack>(paths::COMPLETE_PUSH, request)
            .map(|_| ())
    }

    fn end_sync_session(&self, request: &SessionRequest) -> SyncResult<()> {
        self.post_cbor::<_, Ack>(paths::END_SESSION, request)
            .map(|_| ())
    }

    fn mark_session_errored(&self, request: &MarkErroredRequest) -> SyncResult<()> {
        self.post_cbor::<_, Ack>(paths::MARK_ERRORED, request)
            .map(|_| ())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_post(path, body)
    }
}

/// An HTTP client that hands requests straight to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a client connected to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map_or(url, |i| &url[i..]);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticksync_protocol::{QueueStatus, SessionId, PROTOCOL_VERSION};

    struct TestClient {
        response: RwLock<Option<Vec<u8>>>,
        last_url: RwLock<Option<String>>,
        healthy: AtomicBool,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: RwLock::new(None),
                last_url: RwLock::new(None),
                healthy: AtomicBool::new(true),
            }
        }

        fn set_response(&self, resp: Vec<u8>) {
            *self.response.write() = Some(resp);
        }
    }

    impl HttpClient for &TestClient {
        fn post(&self, url: &str, _body: Vec<u8>) -> Result<Vec<u8>, String> {
            *self.last_url.write() = Some(url.to_string());
            self.response
                .read()
                .clone()
                .ok_or_else(|| "connection refused".into())
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    fn start_request() -> StartSessionRequest {
        StartSessionRequest {
            device_id: "facility-1".into(),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    #[test]
    fn start_session_over_cbor() {
        let client = TestClient::new();
        client.set_response(
            StartSessionResponse::Queued {
                status: QueueStatus::ActiveSync,
            }
            .encode()
            .unwrap(),
        );
        let central = HttpCentralServer::new("https://central.example.org", &client);

        let response = central.start_sync_session(&start_request()).unwrap();
        assert_eq!(
            response,
            StartSessionResponse::Queued {
                status: QueueStatus::ActiveSync
            }
        );
        assert_eq!(
            client.last_url.read().as_deref(),
            Some("https://central.example.org/sync/start_session")
        );
        assert!(central.is_connected());
    }

    #[test]
    fn client_failure_is_retryable_transport_error() {
        let client = TestClient::new();
        let central = HttpCentralServer::new("https://central.example.org", &client);

        let err = central
            .end_sync_session(&SessionRequest {
                session_id: SessionId::new("s1"),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { retryable: true, .. }));
        assert_eq!(central.last_error().as_deref(), Some("connection refused"));
        assert!(!central.is_connected());
    }

    #[test]
    fn garbage_response_is_protocol_error() {
        let client = TestClient::new();
        client.set_response(vec![0xff, 0x00, 0x13]);
        let central = HttpCentralServer::new("https://central.example.org", &client);

        let err = central.start_sync_session(&start_request()).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[test]
    fn unhealthy_client_fails_fast() {
        let client = TestClient::new();
        client.healthy.store(false, Ordering::SeqCst);
        let central = HttpCentralServer::new("https://central.example.org", &client);
        assert!(!central.is_connected());
        assert!(central.start_sync_session(&start_request()).is_err());
        assert!(client.last_url.read().is_none());
    }
}
