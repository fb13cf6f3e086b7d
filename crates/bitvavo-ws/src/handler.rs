//! Application-facing subscription API for one channel kind.

use crate::auth::Authenticator;
use crate::error::{WsError, WsResult};
use crate::events::ChannelEvent;
use crate::key::SubscriptionKey;
use crate::registry::Registry;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Subscribe/unsubscribe entry point for one channel.
///
/// Private channels carry an [`Authenticator`]; their subscribe calls wait
/// for the connection to be authenticated before registering the key.
pub struct Handler<T> {
    registry: Arc<Registry<T>>,
    auth: Option<Arc<Authenticator>>,
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<T: ChannelEvent> Handler<T> {
    pub fn public(registry: Arc<Registry<T>>) -> Self {
        Self {
            registry,
            auth: None,
        }
    }

    pub fn private(registry: Arc<Registry<T>>, auth: Arc<Authenticator>) -> Self {
        Self {
            registry,
            auth: Some(auth),
        }
    }

    /// Subscribe with the default stream capacity.
    pub async fn subscribe(&self, key: impl Into<SubscriptionKey>) -> WsResult<mpsc::Receiver<T>> {
        self.subscribe_many_with_buffer([key.into()], None).await
    }

    pub async fn subscribe_with_buffer(
        &self,
        key: impl Into<SubscriptionKey>,
        buffer: usize,
    ) -> WsResult<mpsc::Receiver<T>> {
        self.subscribe_many_with_buffer([key.into()], Some(buffer)).await
    }

    /// Subscribe to several keys delivered on one stream.
    pub async fn subscribe_many<I, K>(&self, keys: I) -> WsResult<mpsc::Receiver<T>>
    where
        I: IntoIterator<Item = K>,
        K: Into<SubscriptionKey>,
    {
        let keys: Vec<SubscriptionKey> = keys.into_iter().map(Into::into).collect();
        self.subscribe_many_with_buffer(keys, None).await
    }

    pub async fn subscribe_many_with_buffer<I>(
        &self,
        keys: I,
        buffer: Option<usize>,
    ) -> WsResult<mpsc::Receiver<T>>
    where
        I: IntoIterator<Item = SubscriptionKey>,
    {
        let keys: Vec<SubscriptionKey> = keys.into_iter().collect();

        if let Some(auth) = &self.auth {
            // Reject known conflicts before waiting on authentication.
            if let Some(conflict) = keys.iter().find(|k| self.registry.contains(k)) {
                return Err(WsError::AlreadySubscribed(conflict.to_string()));
            }
            auth.ensure_authenticated().await?;
        }

        self.registry.subscribe_many(keys, buffer)
    }

    pub fn unsubscribe(&self, key: impl Into<SubscriptionKey>) -> WsResult<()> {
        self.registry.unsubscribe(key)
    }

    pub fn unsubscribe_all(&self) -> WsResult<()> {
        self.registry.unsubscribe_all()
    }

    pub fn registry(&self) -> &Registry<T> {
        &self.registry
    }
}
