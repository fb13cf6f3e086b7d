//! Inbound frame router.
//!
//! Classifies each frame by its envelope and hands it to exactly one
//! consumer: the owning registry, the authenticator, or the log.

use crate::auth::Authenticator;
use crate::message::{AuthEvent, ChannelName, Envelope, ErrorFrame, WsEvent};
use crate::registry::{ChannelRegistry, DispatchReport};
use bitvavo_telemetry::Metrics;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a routed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Data frame handed to a channel registry.
    Dispatched {
        channel: ChannelName,
        report: DispatchReport,
    },
    /// `subscribed` / `unsubscribed` acknowledgement.
    Acknowledged(WsEvent),
    /// Authentication confirmation applied to the state machine.
    Authentication(bool),
    /// Venue error frame.
    Error(ErrorFrame),
    /// Missing or unrecognized event discriminator.
    Unknown(String),
    /// Frame is not valid JSON or its control payload did not decode.
    Malformed,
}

pub struct MessageRouter {
    registries: Vec<Arc<dyn ChannelRegistry>>,
    auth: Arc<Authenticator>,
}

impl MessageRouter {
    pub fn new(registries: Vec<Arc<dyn ChannelRegistry>>, auth: Arc<Authenticator>) -> Self {
        Self { registries, auth }
    }

    fn registry(&self, channel: ChannelName) -> Option<&dyn ChannelRegistry> {
        self.registries
            .iter()
            .find(|r| r.channel() == channel)
            .map(|r| r.as_ref())
    }

    /// Route one raw frame. Never fails.
    pub fn route(&self, raw: &str) -> RouteOutcome {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                Metrics::decode_failure("envelope");
                warn!(error = %e, "Malformed frame, dropped");
                return RouteOutcome::Malformed;
            }
        };

        if let Some(frame) = envelope.error_frame() {
            return self.handle_error_frame(frame);
        }

        let name = envelope.event.as_deref().unwrap_or_default();
        let Some(event) = WsEvent::from_wire(name) else {
            Metrics::unknown_event();
            warn!(event = name, "Unknown event, dropped");
            return RouteOutcome::Unknown(name.to_string());
        };

        if let Some(channel) = event.channel() {
            let Some(registry) = self.registry(channel) else {
                Metrics::routing_miss(channel.as_str());
                warn!(%channel, "No registry for channel");
                return RouteOutcome::Dispatched {
                    channel,
                    report: DispatchReport {
                        routing_misses: 1,
                        ..DispatchReport::default()
                    },
                };
            };
            let report = registry.dispatch(raw);
            return RouteOutcome::Dispatched { channel, report };
        }

        match event {
            WsEvent::Authenticate => match serde_json::from_str::<AuthEvent>(raw) {
                Ok(auth) => {
                    self.auth.confirm(auth.authenticated);
                    RouteOutcome::Authentication(auth.authenticated)
                }
                Err(e) => {
                    Metrics::decode_failure("authenticate");
                    warn!(error = %e, "Malformed authenticate frame, dropped");
                    RouteOutcome::Malformed
                }
            },
            _ => {
                debug!(event = name, frame = raw, "Control acknowledgement");
                RouteOutcome::Acknowledged(event)
            }
        }
    }

    fn handle_error_frame(&self, frame: ErrorFrame) -> RouteOutcome {
        let action = frame.action.as_deref().unwrap_or("unknown");
        Metrics::error_frame(action);
        warn!(
            action,
            code = frame.error_code,
            error = %frame.error,
            "Error frame received"
        );

        if frame.is_authentication() {
            self.auth
                .fail_pending(&format!("{} (code {})", frame.error, frame.error_code));
        }
        RouteOutcome::Error(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::events::{BookEvent, TradeEvent};
    use crate::outbound::{outbound_channel, OutboundReceiver};
    use crate::registry::{Registry, DEFAULT_BUFFER_SIZE};
    use bitvavo_core::Credentials;
    use std::time::Duration;

    struct Fixture {
        router: MessageRouter,
        trades: Arc<Registry<TradeEvent>>,
        auth: Arc<Authenticator>,
        _out: OutboundReceiver,
    }

    fn fixture() -> Fixture {
        let (tx, out) = outbound_channel();
        let trades = Arc::new(Registry::<TradeEvent>::new(tx.clone(), DEFAULT_BUFFER_SIZE));
        let book = Arc::new(Registry::<BookEvent>::new(tx.clone(), DEFAULT_BUFFER_SIZE));
        let auth = Arc::new(Authenticator::new(
            Some(Credentials::new("key", "secret").unwrap()),
            10_000,
            Duration::from_secs(5),
            tx,
        ));
        let router = MessageRouter::new(
            vec![
                trades.clone() as Arc<dyn ChannelRegistry>,
                book as Arc<dyn ChannelRegistry>,
            ],
            auth.clone(),
        );
        Fixture {
            router,
            trades,
            auth,
            _out: out,
        }
    }

    #[test]
    fn test_data_frame_dispatched_to_owner() {
        let f = fixture();
        let mut rx = f.trades.subscribe("BTC-EUR", None).unwrap();

        let outcome = f.router.route(
            r#"{"event":"trade","market":"BTC-EUR","id":"1","amount":"1","price":"2","side":"buy","timestamp":1}"#,
        );
        assert!(matches!(
            outcome,
            RouteOutcome::Dispatched { channel: ChannelName::Trades, report } if report.delivered == 1
        ));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_authenticate_error_frame_fails_pending() {
        let f = fixture();
        f.auth.request().unwrap();

        let outcome = f.router.route(
            r#"{"action":"authenticate","errorCode":305,"error":"No active API key found."}"#,
        );
        assert!(matches!(outcome, RouteOutcome::Error(ref e) if e.error_code == 305));
        assert_eq!(f.auth.state(), AuthState::AuthFailed);
    }

    #[test]
    fn test_subscribe_error_frame_leaves_auth_alone() {
        let f = fixture();
        f.auth.request().unwrap();

        f.router
            .route(r#"{"action":"subscribe","errorCode":205,"error":"Invalid market."}"#);
        assert_eq!(f.auth.state(), AuthState::AuthRequested);
    }

    #[test]
    fn test_authenticate_confirmation() {
        let f = fixture();
        f.auth.request().unwrap();
        let outcome = f
            .router
            .route(r#"{"event":"authenticate","authenticated":true}"#);
        assert_eq!(outcome, RouteOutcome::Authentication(true));
        assert_eq!(f.auth.state(), AuthState::Authenticated);
    }

    #[test]
    fn test_authenticate_without_request_ignored() {
        let f = fixture();
        f.router
            .route(r#"{"event":"authenticate","authenticated":true}"#);
        assert_eq!(f.auth.state(), AuthState::Unauthenticated);

        f.auth.request().unwrap();
        f.router
            .route(r#"{"action":"authenticate","errorCode":309,"error":"The signature is invalid."}"#);
        f.router
            .route(r#"{"event":"authenticate","authenticated":true}"#);
        assert_eq!(f.auth.state(), AuthState::AuthFailed);
    }

    #[test]
    fn test_acknowledgement_not_routed() {
        let f = fixture();
        let outcome = f.router.route(
            r#"{"event":"subscribed","subscriptions":{"trades":["BTC-EUR"]}}"#,
        );
        assert_eq!(outcome, RouteOutcome::Acknowledged(WsEvent::Subscribed));
        assert_eq!(f.trades.stats().routing_misses, 0);
    }

    #[test]
    fn test_unknown_and_malformed() {
        let f = fixture();
        assert_eq!(
            f.router.route(r#"{"event":"mystery"}"#),
            RouteOutcome::Unknown("mystery".to_string())
        );
        assert_eq!(f.router.route(r#"{"no":"event"}"#), RouteOutcome::Unknown(String::new()));
        assert_eq!(f.router.route("not json"), RouteOutcome::Malformed);
    }

    #[test]
    fn test_channel_without_registry() {
        let f = fixture();
        let outcome = f.router.route(
            r#"{"event":"candle","market":"BTC-EUR","interval":"1m","candle":[]}"#,
        );
        assert!(matches!(
            outcome,
            RouteOutcome::Dispatched { channel: ChannelName::Candles, report } if report.routing_misses == 1
        ));
    }
}
