//! Authentication state machine for private channels.
//!
//! ```text
//! Unauthenticated --request--> AuthRequested --confirm(true)--> Authenticated
//!                                    |
//!                                    +--confirm(false) / error frame /
//!                                       disconnect / timeout--> AuthFailed
//! ```
//!
//! A reconnect resets the state to `Unauthenticated`. A private subscribe in
//! `AuthFailed` requests authentication again.

use crate::error::{WsError, WsResult};
use crate::message::ControlMessage;
use crate::outbound::OutboundSender;
use bitvavo_core::Credentials;
use bitvavo_telemetry::Metrics;
use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Authentication state of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AuthRequested,
    Authenticated,
    AuthFailed,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AuthRequested => "auth_requested",
            Self::Authenticated => "authenticated",
            Self::AuthFailed => "auth_failed",
        }
    }
}

/// Drives authentication of the connection.
pub struct Authenticator {
    credentials: Option<Credentials>,
    window_ms: u64,
    timeout: Duration,
    outbound: OutboundSender,
    state: watch::Sender<AuthState>,
    last_failure: Mutex<Option<String>>,
    /// Serializes the request transition with its enqueue.
    request_lock: Mutex<()>,
}

impl Authenticator {
    pub fn new(
        credentials: Option<Credentials>,
        window_ms: u64,
        timeout: Duration,
        outbound: OutboundSender,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            credentials,
            window_ms,
            timeout,
            outbound,
            state,
            last_failure: Mutex::new(None),
            request_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Enqueue an `authenticate` action if none is pending.
    ///
    /// Transitions `Unauthenticated`/`AuthFailed` to `AuthRequested` and
    /// returns `true`. Returns `false` when a request is already pending or
    /// the connection is authenticated. The transition and the enqueue happen
    /// under one lock, so a caller that observes `AuthRequested` knows the
    /// message is already queued.
    pub fn request(&self) -> WsResult<bool> {
        let credentials = self.credentials.as_ref().ok_or(WsError::CredentialsMissing)?;
        let _guard = self.request_lock.lock();

        if !matches!(
            self.state(),
            AuthState::Unauthenticated | AuthState::AuthFailed
        ) {
            return Ok(false);
        }

        let timestamp = Utc::now().timestamp_millis();
        let message = match ControlMessage::authenticate(credentials, timestamp, self.window_ms) {
            Ok(message) => message,
            Err(e) => {
                self.set_failed(e.to_string());
                return Err(e);
            }
        };

        // Published before the send; a send failure reverts to AuthFailed.
        self.set(AuthState::AuthRequested);
        if let Err(e) = self.outbound.send(message) {
            self.set_failed(e.to_string());
            return Err(e);
        }

        debug!(timestamp, window_ms = self.window_ms, "Authentication requested");
        Ok(true)
    }

    /// Apply the venue's confirmation frame.
    ///
    /// Only a pending request can be confirmed. Returns `false` and leaves
    /// the state untouched otherwise.
    pub fn confirm(&self, authenticated: bool) -> bool {
        let _guard = self.request_lock.lock();
        let current = self.state();
        if current != AuthState::AuthRequested {
            debug!(
                authenticated,
                state = current.as_str(),
                "Authentication confirmation without pending request, ignored"
            );
            return false;
        }

        if authenticated {
            *self.last_failure.lock() = None;
            self.set(AuthState::Authenticated);
            info!("WebSocket authenticated");
        } else {
            self.set_failed("rejected by venue".to_string());
        }
        true
    }

    /// Fail a pending request. No effect in any other state.
    pub fn fail_pending(&self, reason: &str) {
        let _guard = self.request_lock.lock();
        if self.state() == AuthState::AuthRequested {
            self.set_failed(reason.to_string());
        }
    }

    /// Back to `Unauthenticated` (new connection).
    pub fn reset(&self) {
        let _guard = self.request_lock.lock();
        self.set(AuthState::Unauthenticated);
    }

    /// Wait until the connection is authenticated, requesting it if needed.
    ///
    /// Fails fast without credentials. A request that is rejected or not
    /// confirmed within the timeout fails with [`WsError::AuthFailed`].
    pub async fn ensure_authenticated(&self) -> WsResult<()> {
        if self.credentials.is_none() {
            return Err(WsError::CredentialsMissing);
        }
        if self.state() == AuthState::Authenticated {
            return Ok(());
        }

        let mut rx = self.state.subscribe();
        self.request()?;

        match tokio::time::timeout(self.timeout, self.wait_for_outcome(&mut rx)).await {
            Ok(result) => result,
            Err(_) => {
                self.fail_pending("confirmation timed out");
                Err(WsError::AuthFailed("confirmation timed out".to_string()))
            }
        }
    }

    async fn wait_for_outcome(&self, rx: &mut watch::Receiver<AuthState>) -> WsResult<()> {
        loop {
            let state = *rx.borrow_and_update();
            match state {
                AuthState::Authenticated => return Ok(()),
                AuthState::AuthFailed => {
                    let reason = self
                        .last_failure
                        .lock()
                        .clone()
                        .unwrap_or_else(|| "authentication failed".to_string());
                    return Err(WsError::AuthFailed(reason));
                }
                AuthState::Unauthenticated | AuthState::AuthRequested => {}
            }
            if rx.changed().await.is_err() {
                return Err(WsError::ChannelClosed);
            }
        }
    }

    fn set_failed(&self, reason: String) {
        warn!(%reason, "WebSocket authentication failed");
        *self.last_failure.lock() = Some(reason);
        self.set(AuthState::AuthFailed);
    }

    fn set(&self, next: AuthState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            Metrics::auth_state_set(next.as_str());
            debug!(from = prev.as_str(), to = next.as_str(), "Auth state transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Action;
    use crate::outbound::{outbound_channel, OutboundReceiver};
    use std::sync::Arc;

    fn authenticator(with_credentials: bool, timeout_ms: u64) -> (Arc<Authenticator>, OutboundReceiver) {
        let (tx, rx) = outbound_channel();
        let creds = with_credentials.then(|| Credentials::new("key", "secret").unwrap());
        (
            Arc::new(Authenticator::new(
                creds,
                10_000,
                Duration::from_millis(timeout_ms),
                tx,
            )),
            rx,
        )
    }

    #[test]
    fn test_request_enqueues_once() {
        let (auth, mut out) = authenticator(true, 1000);
        assert!(auth.request().unwrap());
        assert!(!auth.request().unwrap());
        assert_eq!(auth.state(), AuthState::AuthRequested);

        let msg = out.try_recv().unwrap();
        assert_eq!(msg.action, Action::Authenticate);
        assert_eq!(msg.key.as_deref(), Some("key"));
        assert_eq!(msg.window, Some(10_000));
        assert!(out.try_recv().is_none());
    }

    #[test]
    fn test_request_without_credentials() {
        let (auth, mut out) = authenticator(false, 1000);
        assert!(matches!(auth.request(), Err(WsError::CredentialsMissing)));
        assert_eq!(auth.state(), AuthState::Unauthenticated);
        assert!(out.try_recv().is_none());
    }

    #[test]
    fn test_failure_frame_then_retry() {
        let (auth, mut out) = authenticator(true, 1000);
        auth.request().unwrap();
        auth.fail_pending("error frame 302");
        assert_eq!(auth.state(), AuthState::AuthFailed);

        assert!(auth.request().unwrap());
        assert_eq!(auth.state(), AuthState::AuthRequested);
        assert_eq!(out.drain(), 2);
    }

    #[test]
    fn test_fail_pending_ignored_when_not_requested() {
        let (auth, _out) = authenticator(true, 1000);
        auth.fail_pending("disconnected");
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_reset() {
        let (auth, _out) = authenticator(true, 1000);
        auth.request().unwrap();
        auth.confirm(true);
        assert_eq!(auth.state(), AuthState::Authenticated);
        auth.reset();
        assert_eq!(auth.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_confirm_without_pending_request_ignored() {
        let (auth, _out) = authenticator(true, 1000);
        assert!(!auth.confirm(true));
        assert_eq!(auth.state(), AuthState::Unauthenticated);

        auth.request().unwrap();
        auth.fail_pending("error frame 309");
        assert!(!auth.confirm(true));
        assert_eq!(auth.state(), AuthState::AuthFailed);

        auth.request().unwrap();
        assert!(auth.confirm(true));
        assert_eq!(auth.state(), AuthState::Authenticated);

        // A late duplicate cannot flip an established session.
        assert!(!auth.confirm(false));
        assert_eq!(auth.state(), AuthState::Authenticated);
    }

    #[test]
    fn test_request_with_closed_writer_fails() {
        let (auth, out) = authenticator(true, 1000);
        drop(out);
        assert!(matches!(auth.request(), Err(WsError::ChannelClosed)));
        assert_eq!(auth.state(), AuthState::AuthFailed);
    }

    #[tokio::test]
    async fn test_ensure_authenticated_confirmed() {
        let (auth, mut out) = authenticator(true, 5000);
        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_authenticated().await })
        };

        while out.try_recv().is_none() {
            tokio::task::yield_now().await;
        }
        auth.confirm(true);

        waiter.await.unwrap().unwrap();
        assert_eq!(auth.state(), AuthState::Authenticated);

        // Already authenticated: no new request
        auth.ensure_authenticated().await.unwrap();
        assert!(out.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_ensure_authenticated_rejected() {
        let (auth, mut out) = authenticator(true, 5000);
        let waiter = {
            let auth = auth.clone();
            tokio::spawn(async move { auth.ensure_authenticated().await })
        };

        while out.try_recv().is_none() {
            tokio::task::yield_now().await;
        }
        auth.confirm(false);

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, WsError::AuthFailed(_)));
        assert_eq!(auth.state(), AuthState::AuthFailed);
    }

    #[tokio::test]
    async fn test_ensure_authenticated_timeout() {
        let (auth, _out) = authenticator(true, 20);
        let err = auth.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, WsError::AuthFailed(ref r) if r.contains("timed out")));
        assert_eq!(auth.state(), AuthState::AuthFailed);
    }

    #[tokio::test]
    async fn test_ensure_authenticated_without_credentials() {
        let (auth, _out) = authenticator(false, 1000);
        assert!(matches!(
            auth.ensure_authenticated().await,
            Err(WsError::CredentialsMissing)
        ));
    }
}
