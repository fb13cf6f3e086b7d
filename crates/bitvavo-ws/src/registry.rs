//! Per-channel subscription registry.
//!
//! A [`Registry`] maps subscription keys to bounded consumer streams for one
//! channel kind, emits the matching control messages and routes decoded
//! events to their stream.
//!
//! # Locking
//!
//! One mutex guards the key map. It is held for:
//! - validate + enqueue + insert in `subscribe_many`
//! - lookup + enqueue + remove in `unsubscribe`
//! - lookup + `try_send` in `dispatch`
//! - key snapshot + enqueue in `reconnect`
//!
//! None of these block: the outbound channel is unbounded and delivery uses
//! `try_send`. Dispatch and unsubscribe of the same key are serialized, so an
//! event is never sent to a stream that has been closed.
//!
//! # Stream lifecycle
//!
//! Entries own a clone of their stream's sender. Removing an entry drops its
//! sender; a stream shared by `subscribe_many` closes once its last key is
//! removed. If the consumer drops its receiver without unsubscribing, the
//! entry stays and further events are counted as dropped.

use crate::error::{WsError, WsResult};
use crate::events::ChannelEvent;
use crate::key::SubscriptionKey;
use crate::message::{ChannelDescriptor, ChannelName, ControlMessage};
use crate::outbound::OutboundSender;
use bitvavo_telemetry::Metrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Default capacity of a consumer stream.
pub const DEFAULT_BUFFER_SIZE: usize = 50;

/// Log one warning per this many dropped events.
const DROP_WARN_EVERY: u64 = 1000;

struct Entry<T> {
    tx: mpsc::Sender<T>,
    stream_id: u64,
}

/// Running dispatch counters.
#[derive(Debug, Default)]
struct DispatchStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    routing_misses: AtomicU64,
    decode_failures: AtomicU64,
}

/// Point-in-time copy of a registry's dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub delivered: u64,
    pub dropped: u64,
    pub routing_misses: u64,
    pub decode_failures: u64,
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
    pub routing_misses: usize,
    pub decode_failed: bool,
}

/// Subscription table for one channel kind.
pub struct Registry<T> {
    outbound: OutboundSender,
    default_buffer: usize,
    entries: Mutex<HashMap<SubscriptionKey, Entry<T>>>,
    next_stream_id: AtomicU64,
    stats: DispatchStats,
}

impl<T: ChannelEvent> Registry<T> {
    pub fn new(outbound: OutboundSender, default_buffer: usize) -> Self {
        Self {
            outbound,
            default_buffer: default_buffer.max(1),
            entries: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(1),
            stats: DispatchStats::default(),
        }
    }

    pub fn channel(&self) -> ChannelName {
        T::CHANNEL
    }

    /// Subscribe to a single key.
    ///
    /// `buffer` overrides the default stream capacity.
    pub fn subscribe(
        &self,
        key: impl Into<SubscriptionKey>,
        buffer: Option<usize>,
    ) -> WsResult<mpsc::Receiver<T>> {
        self.subscribe_many(std::iter::once(key.into()), buffer)
    }

    /// Subscribe to several keys sharing one stream.
    ///
    /// All-or-nothing: if any key is already subscribed, nothing changes and
    /// the first conflicting key is reported. Repeated keys in the request
    /// are collapsed.
    pub fn subscribe_many<I, K>(&self, keys: I, buffer: Option<usize>) -> WsResult<mpsc::Receiver<T>>
    where
        I: IntoIterator<Item = K>,
        K: Into<SubscriptionKey>,
    {
        let mut requested: Vec<SubscriptionKey> = Vec::new();
        for key in keys {
            let key = key.into();
            self.validate(&key)?;
            if !requested.contains(&key) {
                requested.push(key);
            }
        }
        if requested.is_empty() {
            return Err(WsError::EmptySubscription);
        }

        let mut entries = self.entries.lock();

        if let Some(conflict) = requested.iter().find(|k| entries.contains_key(*k)) {
            debug!(channel = %T::CHANNEL, key = %conflict, "Subscribe rejected, key already active");
            return Err(WsError::AlreadySubscribed(conflict.to_string()));
        }

        // Enqueue before mutating so a closed writer leaves the map untouched.
        self.outbound.send(ControlMessage::subscribe(ChannelDescriptor::from_keys(
            T::CHANNEL,
            &requested,
        )))?;

        let (tx, rx) = mpsc::channel(buffer.unwrap_or(self.default_buffer).max(1));
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        for key in &requested {
            entries.insert(
                key.clone(),
                Entry {
                    tx: tx.clone(),
                    stream_id,
                },
            );
        }
        let active = entries.len();
        drop(entries);

        Metrics::active_subscriptions(T::CHANNEL.as_str(), active);
        info!(
            channel = %T::CHANNEL,
            keys = requested.len(),
            stream_id,
            first = %requested[0],
            "Subscribed"
        );
        Ok(rx)
    }

    /// Remove a key and enqueue its unsubscribe.
    ///
    /// The key's sender is dropped only after the unsubscribe was enqueued.
    pub fn unsubscribe(&self, key: impl Into<SubscriptionKey>) -> WsResult<()> {
        let key = key.into();
        let mut entries = self.entries.lock();

        if !entries.contains_key(&key) {
            return Err(WsError::NotSubscribed(key.to_string()));
        }

        self.outbound.send(ControlMessage::unsubscribe(ChannelDescriptor::from_keys(
            T::CHANNEL,
            [&key],
        )))?;

        let mut stream_closed = false;
        if let Some(entry) = entries.remove(&key) {
            stream_closed = !entries.values().any(|e| e.stream_id == entry.stream_id);
            drop(entry);
        }
        let active = entries.len();
        drop(entries);

        Metrics::active_subscriptions(T::CHANNEL.as_str(), active);
        info!(channel = %T::CHANNEL, %key, stream_closed, "Unsubscribed");
        Ok(())
    }

    /// Unsubscribe every known key.
    ///
    /// Continues past failures and returns the first one. Keys removed
    /// concurrently are skipped.
    pub fn unsubscribe_all(&self) -> WsResult<()> {
        let mut first_error = None;
        for key in self.keys() {
            match self.unsubscribe(&key) {
                Ok(()) | Err(WsError::NotSubscribed(_)) => {}
                Err(e) => {
                    warn!(channel = %T::CHANNEL, %key, error = %e, "Unsubscribe failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Decode a raw frame and deliver its events.
    ///
    /// Never fails: decode failures, routing misses and full streams are
    /// counted and logged.
    pub fn dispatch(&self, raw: &str) -> DispatchReport {
        let channel = T::CHANNEL.as_str();
        let events = match T::decode(raw) {
            Ok(events) => events,
            Err(e) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                Metrics::decode_failure(channel);
                warn!(channel, error = %e, "Failed to decode frame, dropped");
                return DispatchReport {
                    decode_failed: true,
                    ..DispatchReport::default()
                };
            }
        };

        let mut report = DispatchReport::default();
        let entries = self.entries.lock();

        for (key, event) in events {
            let Some(entry) = entries.get(&key) else {
                report.routing_misses += 1;
                self.stats.routing_misses.fetch_add(1, Ordering::Relaxed);
                Metrics::routing_miss(channel);
                debug!(channel, %key, "No subscription for event");
                continue;
            };

            match entry.tx.try_send(event) {
                Ok(()) => {
                    report.delivered += 1;
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    Metrics::event_delivered(channel);
                }
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    let total = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    Metrics::event_dropped(channel, "full");
                    if total == 1 || total % DROP_WARN_EVERY == 0 {
                        warn!(channel, %key, dropped_total = total, "Consumer stream full, event dropped");
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    Metrics::event_dropped(channel, "closed");
                    debug!(channel, %key, "Consumer stream dropped without unsubscribe");
                }
            }
        }

        report
    }

    /// Re-enqueue one subscribe covering every known key.
    ///
    /// Leaves the map untouched. Returns the number of keys replayed.
    pub fn reconnect(&self) -> WsResult<usize> {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return Ok(0);
        }

        let mut keys: Vec<&SubscriptionKey> = entries.keys().collect();
        keys.sort();
        self.outbound.send(ControlMessage::subscribe(ChannelDescriptor::from_keys(
            T::CHANNEL,
            keys.iter().copied(),
        )))?;

        info!(channel = %T::CHANNEL, keys = keys.len(), "Replayed subscriptions");
        Ok(keys.len())
    }

    /// Active keys in sorted order.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<SubscriptionKey> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            routing_misses: self.stats.routing_misses.load(Ordering::Relaxed),
            decode_failures: self.stats.decode_failures.load(Ordering::Relaxed),
        }
    }

    fn validate(&self, key: &SubscriptionKey) -> WsResult<()> {
        if key.market_name().is_empty() {
            return Err(WsError::InvalidKey("empty market".to_string()));
        }
        match (T::CHANNEL.requires_interval(), key.interval()) {
            (true, None) => Err(WsError::InvalidKey(format!(
                "{key}: {} subscriptions require an interval",
                T::CHANNEL
            ))),
            (false, Some(_)) => Err(WsError::InvalidKey(format!(
                "{key}: {} subscriptions do not take an interval",
                T::CHANNEL
            ))),
            _ => Ok(()),
        }
    }
}

/// Type-erased view of a registry, used by the router and the reconnect
/// coordinator to treat all channels uniformly.
pub trait ChannelRegistry: Send + Sync {
    fn channel(&self) -> ChannelName;
    fn dispatch(&self, raw: &str) -> DispatchReport;
    fn reconnect(&self) -> WsResult<usize>;
    fn unsubscribe_all(&self) -> WsResult<()>;
    fn len(&self) -> usize;
    fn stats(&self) -> DispatchStatsSnapshot;
}

impl<T: ChannelEvent> ChannelRegistry for Registry<T> {
    fn channel(&self) -> ChannelName {
        T::CHANNEL
    }

    fn dispatch(&self, raw: &str) -> DispatchReport {
        Registry::dispatch(self, raw)
    }

    fn reconnect(&self) -> WsResult<usize> {
        Registry::reconnect(self)
    }

    fn unsubscribe_all(&self) -> WsResult<()> {
        Registry::unsubscribe_all(self)
    }

    fn len(&self) -> usize {
        Registry::len(self)
    }

    fn stats(&self) -> DispatchStatsSnapshot {
        Registry::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CandleEvent, TradeEvent};
    use crate::message::Action;
    use crate::outbound::{outbound_channel, OutboundReceiver};
    use bitvavo_core::Interval;
    use std::collections::HashSet;
    use tokio::sync::mpsc::error::TryRecvError;

    fn trade_registry() -> (Registry<TradeEvent>, OutboundReceiver) {
        let (tx, rx) = outbound_channel();
        (Registry::new(tx, DEFAULT_BUFFER_SIZE), rx)
    }

    fn trade_frame(market: &str, id: u32) -> String {
        format!(
            r#"{{"event":"trade","market":"{market}","id":"t-{id}","amount":"1","price":"100","side":"buy","timestamp":1700000000000}}"#
        )
    }

    fn candle_frame(market: &str, interval: &str) -> String {
        format!(
            r#"{{"event":"candle","market":"{market}","interval":"{interval}","candle":[[1700000000000,"1","2","0.5","1.5","10"]]}}"#
        )
    }

    #[test]
    fn test_subscribe_enqueues_and_delivers() {
        let (registry, mut out) = trade_registry();
        let mut rx = registry.subscribe("BTC-EUR", None).unwrap();

        let msg = out.try_recv().unwrap();
        assert_eq!(msg.action, Action::Subscribe);
        assert_eq!(msg.channels[0].markets, vec!["BTC-EUR"]);

        let report = registry.dispatch(&trade_frame("BTC-EUR", 1));
        assert_eq!(report.delivered, 1);
        assert_eq!(rx.try_recv().unwrap().id, "t-1");
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let (registry, mut out) = trade_registry();
        let _rx = registry.subscribe("BTC-EUR", None).unwrap();
        out.drain();

        let err = registry.subscribe("BTC-EUR", None).unwrap_err();
        assert!(matches!(err, WsError::AlreadySubscribed(ref k) if k == "BTC-EUR"));
        assert!(out.try_recv().is_none(), "rejected subscribe must not enqueue");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subscribe_many_all_or_nothing() {
        let (registry, mut out) = trade_registry();
        let _rx = registry.subscribe("B-EUR", None).unwrap();
        out.drain();

        let err = registry
            .subscribe_many(["A-EUR", "B-EUR", "C-EUR"], None)
            .unwrap_err();
        assert!(matches!(err, WsError::AlreadySubscribed(ref k) if k == "B-EUR"));
        assert_eq!(registry.keys(), vec![SubscriptionKey::market("B-EUR")]);
        assert!(out.try_recv().is_none());
    }

    #[test]
    fn test_subscribe_many_single_message_shared_stream() {
        let (registry, mut out) = trade_registry();
        let mut rx = registry.subscribe_many(["A-EUR", "B-EUR"], None).unwrap();

        let msg = out.try_recv().unwrap();
        assert_eq!(msg.channels.len(), 1);
        assert_eq!(msg.channels[0].markets, vec!["A-EUR", "B-EUR"]);
        assert!(out.try_recv().is_none());

        registry.dispatch(&trade_frame("A-EUR", 1));
        registry.dispatch(&trade_frame("B-EUR", 2));
        assert_eq!(rx.try_recv().unwrap().market, "A-EUR");
        assert_eq!(rx.try_recv().unwrap().market, "B-EUR");

        registry.unsubscribe("A-EUR").unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        registry.unsubscribe("B-EUR").unwrap();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_subscribe_many_empty_rejected() {
        let (registry, mut out) = trade_registry();
        let keys: Vec<&str> = Vec::new();
        assert!(matches!(
            registry.subscribe_many(keys, None),
            Err(WsError::EmptySubscription)
        ));
        assert!(out.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_closes_stream_then_routing_miss() {
        let (registry, mut out) = trade_registry();
        let mut rx = registry.subscribe("BTC-EUR", None).unwrap();
        out.drain();

        registry.unsubscribe("BTC-EUR").unwrap();
        let msg = out.try_recv().unwrap();
        assert_eq!(msg.action, Action::Unsubscribe);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));

        let report = registry.dispatch(&trade_frame("BTC-EUR", 1));
        assert_eq!(report.routing_misses, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(registry.stats().routing_misses, 1);
    }

    #[test]
    fn test_unsubscribe_unknown_key() {
        let (registry, mut out) = trade_registry();
        assert!(matches!(
            registry.unsubscribe("BTC-EUR"),
            Err(WsError::NotSubscribed(_))
        ));
        assert!(out.try_recv().is_none());
    }

    #[test]
    fn test_writer_closed_leaves_map_untouched() {
        let (registry, out) = trade_registry();
        let _rx = registry.subscribe("A-EUR", None).unwrap();
        drop(out);

        assert!(matches!(
            registry.subscribe("B-EUR", None),
            Err(WsError::ChannelClosed)
        ));
        assert!(matches!(
            registry.unsubscribe("A-EUR"),
            Err(WsError::ChannelClosed)
        ));
        assert_eq!(registry.keys(), vec![SubscriptionKey::market("A-EUR")]);
    }

    #[test]
    fn test_full_stream_drops_and_counts() {
        let (registry, _out) = trade_registry();
        let mut rx = registry.subscribe("BTC-EUR", Some(1)).unwrap();

        assert_eq!(registry.dispatch(&trade_frame("BTC-EUR", 1)).delivered, 1);
        assert_eq!(registry.dispatch(&trade_frame("BTC-EUR", 2)).dropped, 1);

        assert_eq!(rx.try_recv().unwrap().id, "t-1");
        assert_eq!(registry.stats().dropped, 1);
        assert_eq!(registry.dispatch(&trade_frame("BTC-EUR", 3)).delivered, 1);
    }

    #[test]
    fn test_decode_failure_counted() {
        let (registry, _out) = trade_registry();
        let _rx = registry.subscribe("BTC-EUR", None).unwrap();

        let report = registry.dispatch(r#"{"event":"trade","market":"BTC-EUR","price":"x"}"#);
        assert!(report.decode_failed);
        assert_eq!(registry.stats().decode_failures, 1);
    }

    #[test]
    fn test_candle_keys_require_interval() {
        let (tx, _out) = outbound_channel();
        let registry: Registry<CandleEvent> = Registry::new(tx, DEFAULT_BUFFER_SIZE);

        assert!(matches!(
            registry.subscribe("BTC-EUR", None),
            Err(WsError::InvalidKey(_))
        ));

        let mut rx = registry
            .subscribe(("BTC-EUR", Interval::FiveMinutes), None)
            .unwrap();
        registry.dispatch(&candle_frame("BTC-EUR", "1m"));
        registry.dispatch(&candle_frame("BTC-EUR", "5m"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.interval, Interval::FiveMinutes);
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.stats().routing_misses, 1);
    }

    #[test]
    fn test_market_keys_reject_interval() {
        let (registry, _out) = trade_registry();
        assert!(matches!(
            registry.subscribe(("BTC-EUR", Interval::OneMinute), None),
            Err(WsError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_reconnect_replays_without_touching_map() {
        let (tx, mut out) = outbound_channel();
        let registry: Registry<CandleEvent> = Registry::new(tx, DEFAULT_BUFFER_SIZE);
        let _a = registry.subscribe(("A-EUR", Interval::OneMinute), None).unwrap();
        let _b = registry
            .subscribe_many([("B-EUR", Interval::OneMinute), ("A-EUR", Interval::FiveMinutes)], None)
            .unwrap();
        let before = registry.keys();
        out.drain();

        assert_eq!(registry.reconnect().unwrap(), 3);
        assert_eq!(registry.keys(), before);

        let msg = out.try_recv().unwrap();
        assert!(out.try_recv().is_none());
        let replayed: Vec<SubscriptionKey> = msg.keys().into_iter().map(|(_, k)| k).collect();
        let unique: HashSet<&SubscriptionKey> = replayed.iter().collect();
        assert_eq!(replayed.len(), 3);
        assert_eq!(unique.len(), 3);
        assert!(before.iter().all(|k| unique.contains(k)));
    }

    #[test]
    fn test_reconnect_empty_registry_sends_nothing() {
        let (registry, mut out) = trade_registry();
        assert_eq!(registry.reconnect().unwrap(), 0);
        assert!(out.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_all() {
        let (registry, mut out) = trade_registry();
        let mut rx = registry.subscribe_many(["A-EUR", "B-EUR"], None).unwrap();
        let _c = registry.subscribe("C-EUR", None).unwrap();
        out.drain();

        registry.unsubscribe_all().unwrap();
        assert!(registry.is_empty());
        assert_eq!(out.drain(), 3);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn test_concurrent_disjoint_keys() {
        let (registry, mut out) = trade_registry();
        const THREADS: usize = 8;
        const ROUNDS: u32 = 200;

        std::thread::scope(|s| {
            for t in 0..THREADS {
                let registry = &registry;
                s.spawn(move || {
                    let market = format!("M{t}-EUR");
                    for round in 0..ROUNDS {
                        let mut rx = registry.subscribe(market.as_str(), None).unwrap();
                        let report = registry.dispatch(&trade_frame(&market, round));
                        assert_eq!(report.delivered, 1);
                        assert_eq!(rx.try_recv().unwrap().id, format!("t-{round}"));

                        registry.unsubscribe(market.as_str()).unwrap();
                        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
                    }
                });
            }
        });

        assert!(registry.is_empty());
        assert_eq!(out.drain(), THREADS * ROUNDS as usize * 2);
        assert_eq!(registry.stats().delivered, (THREADS as u64) * u64::from(ROUNDS));
        assert_eq!(registry.stats().routing_misses, 0);
    }

    #[test]
    fn test_dispatch_races_unsubscribe_on_same_key() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (registry, _out) = trade_registry();
        const DISPATCHES: u32 = 5_000;
        let done = AtomicBool::new(false);

        let received = std::thread::scope(|s| {
            let churn = s.spawn(|| {
                let mut received = 0u64;
                while !done.load(Ordering::Acquire) {
                    let mut rx = registry.subscribe("BTC-EUR", None).unwrap();
                    std::thread::yield_now();
                    registry.unsubscribe("BTC-EUR").unwrap();

                    // Whatever was delivered is still readable, in order,
                    // and nothing arrives after the close.
                    let mut last_id = None;
                    loop {
                        match rx.try_recv() {
                            Ok(event) => {
                                let id: u32 = event.id.trim_start_matches("t-").parse().unwrap();
                                assert!(last_id.map_or(true, |prev| id > prev));
                                last_id = Some(id);
                                received += 1;
                            }
                            Err(TryRecvError::Disconnected) => break,
                            Err(TryRecvError::Empty) => panic!("stream left open after unsubscribe"),
                        }
                    }
                }
                received
            });

            for id in 0..DISPATCHES {
                registry.dispatch(&trade_frame("BTC-EUR", id));
            }
            done.store(true, Ordering::Release);
            churn.join().unwrap()
        });

        let stats = registry.stats();
        assert!(registry.is_empty());
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(
            stats.delivered + stats.routing_misses + stats.dropped,
            u64::from(DISPATCHES)
        );
        assert_eq!(received, stats.delivered);
    }
}
