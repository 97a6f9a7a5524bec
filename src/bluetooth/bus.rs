// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filtered event bus for platform notifications.
//!
//! Platform backends publish bond and discovery notifications here. Each
//! subscriber registers a predicate and only receives the events it matches;
//! events rejected by one predicate stay available to every other subscriber.
//! A [`Subscription`] releases its registration exactly once, either through
//! [`Subscription::unsubscribe`] or on drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;

type Filter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

struct Subscriber<E> {
    filter: Filter<E>,
    tx: mpsc::UnboundedSender<E>,
}

struct BusInner<E> {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber<E>>>,
}

/// Multi-subscriber bus with per-subscriber filtering.
pub struct EventBus<E> {
    inner: Arc<BusInner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a subscriber that receives every event matching `filter`.
    pub fn subscribe<F>(&self, filter: F) -> Subscription<E>
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().insert(
            id,
            Subscriber {
                filter: Box::new(filter),
                tx,
            },
        );

        Subscription {
            id,
            rx,
            bus: Some(Arc::downgrade(&self.inner)),
        }
    }

    /// Deliver `event` to every matching subscriber. Returns the number of
    /// subscribers that received it.
    pub fn publish(&self, event: E) -> usize {
        let mut delivered = 0;
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|_, sub| {
            if !(sub.filter)(&event) {
                return true;
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// Number of live registrations.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

/// A live registration on an [`EventBus`].
pub struct Subscription<E> {
    id: u64,
    rx: mpsc::UnboundedReceiver<E>,
    bus: Option<Weak<BusInner<E>>>,
}

impl<E> Subscription<E> {
    /// Wait for the next matching event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Release the registration now instead of on drop.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(bus) = self.bus.take().and_then(|weak| weak.upgrade()) {
            bus.subscribers.lock().remove(&self.id);
            debug!("Released event subscription {}", self.id);
        }
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.release();
    }
}
