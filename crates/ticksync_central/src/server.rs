//! The central node.

use crate::config::CentralConfig;
use crate::error::{CentralError, CentralResult};
use crate::handler::{HandlerContext, RequestHandler, SessionStatus};
use crate::records::{CentralRecord, CentralRecords};
use std::sync::Arc;
use ticksync_engine::{paths, CentralServer, LoopbackServer, SyncError, SyncResult};
use ticksync_protocol::{
    Ack, ChangelogRecord, InitiatePullRequest, MarkErroredRequest, PullMetadata, PullRequest,
    PullResponse, PushAck, PushRequest, SessionId, SessionRequest, StartSessionRequest,
    StartSessionResponse, WireMessage,
};

/// The central node.
///
/// Serves the session RPCs either directly, as a [`CentralServer`], or
/// behind the HTTP paths through [`LoopbackServer`].
///
/// # Example
///
/// ```
/// use ticksync_central::{CentralConfig, CentralNode};
///
/// let central = CentralNode::new(CentralConfig::default());
/// assert_eq!(central.record_count(), 0);
///
/// // Facilities reach it through an HTTP transport whose endpoints
/// // call `central.dispatch(path, body)`.
/// ```
pub struct CentralNode {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl CentralNode {
    /// Creates a central node with an empty record store.
    pub fn new(config: CentralConfig) -> Self {
        let records = Arc::new(CentralRecords::new(config.initial_tick));
        Self::with_records(config, records)
    }

    /// Creates a central node over an existing record store.
    pub fn with_records(config: CentralConfig, records: Arc<CentralRecords>) -> Self {
        let context = Arc::new(HandlerContext::new(config, records));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Decodes a CBOR request for `path`, handles it and encodes the answer.
    pub fn dispatch(&self, path: &str, body: &[u8]) -> CentralResult<Vec<u8>> {
        match path {
            paths::START_SESSION => encode(
                self.handler
                    .handle_start_session(StartSessionRequest::decode(body)?)?,
            ),
            paths::INITIATE_PULL => encode(
                self.handler
                    .handle_initiate_pull(InitiatePullRequest::decode(body)?)?,
            ),
            paths::PULL => encode(self.handler.handle_pull(PullRequest::decode(body)?)?),
            paths::PUSH => encode(self.handler.handle_push(PushRequest::decode(body)?)?),
            paths::COMPLETE_PUSH => encode(
                self.handler
                    .handle_complete_push(SessionRequest::decode(body)?)?,
            ),
            paths::END_SESSION => encode(
                self.handler
                    .handle_end_session(SessionRequest::decode(body)?)?,
            ),
            paths::MARK_ERRORED => encode(
                self.handler
                    .handle_mark_errored(MarkErroredRequest::decode(body)?)?,
            ),
            other => Err(CentralError::NotFound(other.to_string())),
        }
    }

    /// Returns the current central clock value.
    pub fn tick(&self) -> i64 {
        self.context.records.tick()
    }

    /// Returns the record store.
    pub fn records(&self) -> &Arc<CentralRecords> {
        &self.context.records
    }

    /// Returns the number of stored rows.
    pub fn record_count(&self) -> usize {
        self.context.records.len()
    }

    /// Returns the stored version of a row.
    pub fn record(&self, record_type: &str, record_id: &str) -> Option<CentralRecord> {
        self.context.records.get(record_type, record_id)
    }

    /// Returns changelog entries received for a row.
    pub fn changelog_for(&self, record_type: &str, record_id: &str) -> Vec<ChangelogRecord> {
        self.context.records.changelog_for(record_type, record_id)
    }

    /// Returns the number of active sessions.
    pub fn active_sessions(&self) -> usize {
        self.context.active_sessions()
    }

    /// Returns the status of a session.
    pub fn session_status(&self, session_id: &SessionId) -> Option<SessionStatus> {
        self.context.session_status(session_id)
    }
}

fn encode<T: WireMessage>(response: T) -> CentralResult<Vec<u8>> {
    Ok(response.encode()?)
}

fn to_sync_error(err: CentralError) -> SyncError {
    if err.is_client_error() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::ServerError(err.to_string())
    }
}

impl LoopbackServer for CentralNode {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.dispatch(path, body).map_err(|e| e.to_string())
    }
}

impl CentralServer for CentralNode {
    fn start_sync_session(&self, request: &StartSessionRequest) -> SyncResult<StartSessionResponse> {
        self.handler
            .handle_start_session(request.clone())
            .map_err(to_sync_error)
    }

    fn initiate_pull(&self, request: &InitiatePullRequest) -> SyncResult<PullMetadata> {
        self.handler
            .handle_initiate_pull(request.clone())
            .map_err(to_sync_error)
    }

    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.handler
            .handle_pull(request.clone())
            .map_err(to_sync_error)
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushAck> {
        self.handler
            .handle_push(request.clone())
            .map_err(to_sync_error)
    }

    fn complete_push(&self, request: &SessionRequest) -> SyncResult<()> {
        self.handler
            .handle_complete_push(request.clone())
            .map(|_: Ack| ())
            .map_err(to_sync_error)
    }

    fn end_sync_session(&self, request: &SessionRequest) -> SyncResult<()> {
        self.handler
            .handle_end_session(request.clone())
            .map(|_| ())
            .map_err(to_sync_error)
    }

    fn mark_session_errored(&self, request: &MarkErroredRequest) -> SyncResult<()> {
        self.handler
            .handle_mark_errored(request.clone())
            .map(|_| ())
            .map_err(to_sync_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use ticksync_protocol::{ChangeDirection, ChangeRecord, PROTOCOL_VERSION};

    fn start_request(device: &str) -> StartSessionRequest {
        StartSessionRequest {
            device_id: device.into(),
            protocol_version: PROTOCOL_VERSION,
        }
    }

    fn session_of(response: StartSessionResponse) -> SessionId {
        match response {
            StartSessionResponse::Started { session_id, .. } => session_id,
            other => panic!("expected a session, got {other:?}"),
        }
    }

    #[test]
    fn node_lifecycle() {
        let central = CentralNode::new(CentralConfig::default().with_initial_tick(40));
        assert_eq!(central.tick(), 40);
        assert_eq!(central.record_count(), 0);
        assert_eq!(central.active_sessions(), 0);
    }

    #[test]
    fn full_session_flow() {
        let central = CentralNode::new(CentralConfig::default());
        central.records().upsert(
            "reference_data",
            "central-1",
            json!({ "code": "C" }).as_object().cloned().unwrap(),
        );

        // 1. Start
        let session_id = session_of(central.start_sync_session(&start_request("f1")).unwrap());

        // 2. Push and persist
        let data = json!({ "code": "F" }).as_object().cloned().unwrap();
        let record = ChangeRecord::upsert(ChangeDirection::Outgoing, "reference_data", "f-1", data);
        let ack = central
            .push(&PushRequest {
                session_id: session_id.clone(),
                records: vec![record],
            })
            .unwrap();
        assert_eq!(ack.accepted, 1);
        central
            .complete_push(&SessionRequest {
                session_id: session_id.clone(),
            })
            .unwrap();

        // 3. Pull: only the central-side row comes back
        let metadata = central
            .initiate_pull(&InitiatePullRequest {
                session_id: session_id.clone(),
                since: -1,
            })
            .unwrap();
        assert_eq!(metadata.total_to_pull, 1);
        let page = central
            .pull(&PullRequest {
                session_id: session_id.clone(),
                offset: 0,
                limit: 10,
            })
            .unwrap();
        assert_eq!(page.records[0].record_id, "central-1");

        // 4. End
        central
            .end_sync_session(&SessionRequest {
                session_id: session_id.clone(),
            })
            .unwrap();
        assert_eq!(
            central.session_status(&session_id),
            Some(SessionStatus::Completed)
        );
        assert_eq!(central.record_count(), 2);
    }

    #[test]
    fn dispatch_over_cbor() {
        let central = CentralNode::new(CentralConfig::default());
        let body = start_request("f1").encode().unwrap();

        let response = central.handle_post(paths::START_SESSION, &body).unwrap();
        let session_id = session_of(StartSessionResponse::decode(&response).unwrap());

        let end = SessionRequest { session_id }.encode().unwrap();
        let ack = central.handle_post(paths::END_SESSION, &end).unwrap();
        assert_eq!(Ack::decode(&ack).unwrap(), Ack {});
    }

    #[test]
    fn dispatch_rejects_unknown_path_and_garbage() {
        let central = CentralNode::new(CentralConfig::default());
        assert!(matches!(
            central.dispatch("/sync/nope", &[]),
            Err(CentralError::NotFound(_))
        ));
        assert!(matches!(
            central.dispatch(paths::PULL, &[0xff, 0x00]),
            Err(CentralError::Codec(_))
        ));
    }

    #[test]
    fn client_errors_map_to_fatal_transport() {
        let central = CentralNode::new(CentralConfig::default());
        let err = central
            .end_sync_session(&SessionRequest {
                session_id: SessionId::new("missing"),
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { retryable: false, .. }));
    }

    proptest! {
        #[test]
        fn clock_only_moves_forward(ops in prop::collection::vec(0u8..3, 1..40)) {
            let central = CentralNode::new(CentralConfig::default());
            let mut last = central.tick();
            for (i, op) in ops.into_iter().enumerate() {
                let id = format!("r{i}");
                let tick = match op {
                    0 => central.records().upsert("reference_data", &id, Default::default()),
                    1 => central.records().delete("reference_data", &id),
                    _ => central.records().snapshot_since(0, None).pull_until,
                };
                prop_assert!(tick > last);
                prop_assert!(tick < central.tick());
                last = central.tick();
            }
        }
    }
}
