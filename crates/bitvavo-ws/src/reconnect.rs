//! Reconnect coordinator.
//!
//! Restores the venue-side subscription state on a fresh connection:
//! authentication first (when credentials are configured), then every
//! registry's keys in channel order. The registries themselves are not
//! modified, so applications never re-subscribe after a reconnect.

use crate::auth::Authenticator;
use crate::error::WsResult;
use crate::message::ChannelName;
use crate::registry::ChannelRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of one replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub auth_requested: bool,
    /// Keys replayed per channel, in replay order. Empty channels are omitted.
    pub replayed: Vec<(ChannelName, usize)>,
}

impl ReplayReport {
    pub fn total_keys(&self) -> usize {
        self.replayed.iter().map(|(_, n)| n).sum()
    }
}

pub struct ReconnectCoordinator {
    registries: Vec<Arc<dyn ChannelRegistry>>,
    auth: Arc<Authenticator>,
}

impl ReconnectCoordinator {
    /// Registries are replayed in [`ChannelName::ALL`] order regardless of
    /// the order given here.
    pub fn new(mut registries: Vec<Arc<dyn ChannelRegistry>>, auth: Arc<Authenticator>) -> Self {
        registries.sort_by_key(|r| r.channel());
        Self { registries, auth }
    }

    /// Replay after the transport is re-established. Idempotent.
    pub fn replay(&self) -> WsResult<ReplayReport> {
        let mut report = ReplayReport::default();

        let mut first_error = None;

        self.auth.reset();
        if self.auth.has_credentials() {
            match self.auth.request() {
                Ok(requested) => report.auth_requested = requested,
                Err(e) => first_error = Some(e),
            }
        }

        // Every registry is replayed even if an earlier one fails.
        for registry in &self.registries {
            match registry.reconnect() {
                Ok(0) => {}
                Ok(count) => report.replayed.push((registry.channel(), count)),
                Err(e) => {
                    warn!(channel = %registry.channel(), error = %e, "Replay failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            auth_requested = report.auth_requested,
            keys = report.total_keys(),
            channels = report.replayed.len(),
            "Subscriptions restored"
        );
        Ok(report)
    }

    /// Transport lost: a pending authentication can no longer be confirmed.
    pub fn disconnected(&self) {
        self.auth.fail_pending("connection lost");
    }
}
