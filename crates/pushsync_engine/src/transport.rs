//! Remote API abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use pushsync_protocol::{
    MoMessageRequest, MoMessageResponse, MoMessageStatus, RegistrationRequest,
    RegistrationResponse, SeenMessagesRequest, SeenMessagesResponse, SyncMessagesResponse,
    SyncRequest, UserDataRequest, UserDataResponse,
};
use std::collections::VecDeque;

/// The message sync call.
///
/// This is the only remote operation a fetching job needs, which keeps the
/// job testable against a scripted remote.
pub trait RemoteSyncClient: Send + Sync {
    /// Reports `request` for the installation and returns pending messages.
    fn sync_messages(
        &self,
        internal_id: &str,
        request: &SyncRequest,
    ) -> SyncResult<SyncMessagesResponse>;
}

/// Every remote operation the messaging client performs.
pub trait RemoteService: RemoteSyncClient {
    /// Registers the device push token.
    fn register(&self, request: &RegistrationRequest) -> SyncResult<RegistrationResponse>;

    /// Reports seen messages.
    fn send_seen(&self, request: &SeenMessagesRequest) -> SyncResult<SeenMessagesResponse>;

    /// Sends user attributes.
    fn sync_user_data(&self, request: &UserDataRequest) -> SyncResult<UserDataResponse>;

    /// Sends mobile-originated messages.
    fn send_mo(&self, request: &MoMessageRequest) -> SyncResult<MoMessageResponse>;
}

/// A scripted remote for testing.
///
/// Sync results are served in the order they were queued; once the script
/// runs out every sync call succeeds with no messages.
#[derive(Debug, Default)]
pub struct MockRemote {
    sync_results: Mutex<VecDeque<SyncResult<SyncMessagesResponse>>>,
    sync_requests: Mutex<Vec<(String, SyncRequest)>>,
    internal_id: Mutex<Option<String>>,
    seen_requests: Mutex<Vec<SeenMessagesRequest>>,
    user_data_requests: Mutex<Vec<UserDataRequest>>,
    mo_requests: Mutex<Vec<MoMessageRequest>>,
    failure: Mutex<Option<SyncError>>,
}

impl MockRemote {
    /// Creates a mock that registers devices as `internal_id`.
    pub fn new(internal_id: impl Into<String>) -> Self {
        Self {
            internal_id: Mutex::new(Some(internal_id.into())),
            ..Self::default()
        }
    }

    /// Queues the result of the next unscripted sync call.
    pub fn push_sync_result(&self, result: SyncResult<SyncMessagesResponse>) {
        self.sync_results.lock().push_back(result);
    }

    /// Makes every non-sync call fail with `error` until cleared.
    pub fn fail_other_calls(&self, error: Option<SyncError>) {
        *self.failure.lock() = error;
    }

    /// Sync requests received so far, with their installation id.
    pub fn sync_requests(&self) -> Vec<(String, SyncRequest)> {
        self.sync_requests.lock().clone()
    }

    /// Seen requests received so far.
    pub fn seen_requests(&self) -> Vec<SeenMessagesRequest> {
        self.seen_requests.lock().clone()
    }

    /// User data requests received so far.
    pub fn user_data_requests(&self) -> Vec<UserDataRequest> {
        self.user_data_requests.lock().clone()
    }

    /// MO requests received so far.
    pub fn mo_requests(&self) -> Vec<MoMessageRequest> {
        self.mo_requests.lock().clone()
    }

    fn check_failure(&self) -> SyncResult<()> {
        match self.failure.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl RemoteSyncClient for MockRemote {
    fn sync_messages(
        &self,
        internal_id: &str,
        request: &SyncRequest,
    ) -> SyncResult<SyncMessagesResponse> {
        self.sync_requests
            .lock()
            .push((internal_id.to_string(), request.clone()));
        self.sync_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(SyncMessagesResponse::default()))
    }
}

impl RemoteService for MockRemote {
    fn register(&self, request: &RegistrationRequest) -> SyncResult<RegistrationResponse> {
        self.check_failure()?;
        let internal_id = self
            .internal_id
            .lock()
            .clone()
            .or_else(|| request.internal_id.clone())
            .ok_or_else(|| SyncError::Protocol("No mock internal id set".into()))?;
        Ok(RegistrationResponse { internal_id })
    }

    fn send_seen(&self, request: &SeenMessagesRequest) -> SyncResult<SeenMessagesResponse> {
        self.check_failure()?;
        self.seen_requests.lock().push(request.clone());
        Ok(SeenMessagesResponse {})
    }

    fn sync_user_data(&self, request: &UserDataRequest) -> SyncResult<UserDataResponse> {
        self.check_failure()?;
        self.user_data_requests.lock().push(request.clone());
        Ok(UserDataResponse {
            external_user_id: request.external_user_id.clone(),
            predefined_user_data: request.predefined_user_data.clone().unwrap_or_default(),
            custom_user_data: request.custom_user_data.clone().unwrap_or_default(),
        })
    }

    fn send_mo(&self, request: &MoMessageRequest) -> SyncResult<MoMessageResponse> {
        self.check_failure()?;
        self.mo_requests.lock().push(request.clone());
        let messages = request
            .messages()
            .iter()
            .map(|m| MoMessageStatus {
                message_id: m.message_id.clone(),
                status_code: 0,
                status: "accepted".into(),
            })
            .collect();
        Ok(MoMessageResponse { messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushsync_protocol::FetchedMessage;

    #[test]
    fn mock_serves_script_in_order() {
        let remote = MockRemote::new("inst");
        remote.push_sync_result(Ok(SyncMessagesResponse::new(vec![FetchedMessage::new("m1")])));
        remote.push_sync_result(Err(SyncError::Timeout));

        let request = SyncRequest::default();
        assert_eq!(remote.sync_messages("inst", &request).unwrap().messages.len(), 1);
        assert_eq!(remote.sync_messages("inst", &request), Err(SyncError::Timeout));
        assert!(remote.sync_messages("inst", &request).unwrap().messages.is_empty());
        assert_eq!(remote.sync_requests().len(), 3);
    }

    #[test]
    fn mock_registers_with_configured_id() {
        let remote = MockRemote::new("inst-1");
        let request = RegistrationRequest::new("token", None, "APNS");
        assert_eq!(remote.register(&request).unwrap().internal_id, "inst-1");
    }

    #[test]
    fn mock_failure_applies_to_other_calls() {
        let remote = MockRemote::new("inst");
        remote.fail_other_calls(Some(SyncError::Timeout));

        let request = RegistrationRequest::new("token", None, "APNS");
        assert_eq!(remote.register(&request), Err(SyncError::Timeout));

        remote.fail_other_calls(None);
        assert!(remote.register(&request).is_ok());
    }
}
