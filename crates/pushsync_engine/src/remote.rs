//! Remote API with retries.

use crate::config::ClientConfig;
use crate::error::SyncResult;
use crate::http::{HttpClient, HttpTransport};
use crate::retry::{AttemptCounter, CancelHandle, RetryRunner};
use crate::transport::{RemoteService, RemoteSyncClient};
use pushsync_protocol::{
    MoMessageRequest, MoMessageResponse, RegistrationRequest, RegistrationResponse,
    RequestDescriptor, SeenMessagesRequest, SeenMessagesResponse, SyncMessagesRequest,
    SyncMessagesResponse, SyncRequest, UserDataRequest, UserDataResponse,
};
use std::sync::Arc;

/// Executes descriptors over HTTP, retrying each call as its descriptor
/// allows.
pub struct RemoteApi<C: HttpClient> {
    transport: HttpTransport<C>,
    platform_type: String,
    runner: RetryRunner,
    cancel: CancelHandle,
    attempts: Arc<AttemptCounter>,
}

impl<C: HttpClient> RemoteApi<C> {
    /// Creates an API client from `config`.
    pub fn new(config: &ClientConfig, client: C) -> Self {
        let attempts = Arc::new(AttemptCounter::new());
        Self {
            transport: HttpTransport::new(&config.base_url, &config.application_code, client)
                .with_timeout(config.timeout),
            platform_type: config.platform_type.clone(),
            runner: RetryRunner::new(config.retry.clone()).with_observer(attempts.clone()),
            cancel: CancelHandle::new(),
            attempts,
        }
    }

    /// Returns the HTTP transport.
    pub fn transport(&self) -> &HttpTransport<C> {
        &self.transport
    }

    /// Returns the cancellation flag shared by every call.
    ///
    /// Once cancelled, calls in flight stop retrying and later calls fail
    /// with [`SyncError::Cancelled`](crate::SyncError::Cancelled).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns attempt statistics.
    pub fn attempts(&self) -> &AttemptCounter {
        &self.attempts
    }

    /// Runs `descriptor` to completion.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub fn perform<D>(&self, descriptor: &D) -> SyncResult<D::Response>
    where
        D: RequestDescriptor + Sync,
        D::Response: Send,
    {
        self.runner.call(
            descriptor.retry_limit(),
            descriptor.retries_decoding_errors(),
            self.cancel.clone(),
            |_| self.transport.execute(descriptor),
        )
    }
}

impl<C: HttpClient> RemoteSyncClient for RemoteApi<C> {
    fn sync_messages(
        &self,
        internal_id: &str,
        request: &SyncRequest,
    ) -> SyncResult<SyncMessagesResponse> {
        let descriptor =
            SyncMessagesRequest::new(internal_id, self.platform_type.clone(), request.clone());
        self.perform(&descriptor)
    }
}

impl<C: HttpClient> RemoteService for RemoteApi<C> {
    fn register(&self, request: &RegistrationRequest) -> SyncResult<RegistrationResponse> {
        self.perform(request)
    }

    fn send_seen(&self, request: &SeenMessagesRequest) -> SyncResult<SeenMessagesResponse> {
        self.perform(request)
    }

    fn sync_user_data(&self, request: &UserDataRequest) -> SyncResult<UserDataResponse> {
        self.perform(request)
    }

    fn send_mo(&self, request: &MoMessageRequest) -> SyncResult<MoMessageResponse> {
        self.perform(request)
    }
}
