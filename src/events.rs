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

//! Listener callbacks and their delivery context.
//!
//! Inbound bytes, I/O errors and "connected" callbacks are never invoked from
//! the read task or the connect task. They are posted to an
//! [`EventDispatcher`], which runs them one at a time on its own task in the
//! order they were posted.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::bluetooth::SppError;

/// Sink for inbound bytes and asynchronous I/O errors.
pub trait DataListener: Send + Sync {
    /// Bytes received from the device, in arrival order.
    fn on_data(&self, data: &[u8]);

    /// The link failed after it was established.
    fn on_error(&self, error: &SppError);
}

/// Listener notification forwarded by [`ChannelListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Data(Vec<u8>),
    Error(String),
}

/// Listener that forwards notifications into an mpsc channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DataListener for ChannelListener {
    fn on_data(&self, data: &[u8]) {
        let _ = self.tx.send(LinkEvent::Data(data.to_vec()));
    }

    fn on_error(&self, error: &SppError) {
        let _ = self.tx.send(LinkEvent::Error(error.to_string()));
    }
}

/// One-shot callback run on the delivery context.
pub type Callback = Box<dyn FnOnce() + Send>;

enum Delivery {
    Data { generation: u64, bytes: Vec<u8> },
    Error { generation: u64, error: SppError },
    Callback(Callback),
}

struct Shared {
    listener: RwLock<Option<Arc<dyn DataListener>>>,
    /// Data and errors from generations below this value are dropped.
    floor: AtomicU64,
}

/// Serial delivery context for listener and callback invocations.
///
/// Must be created inside a Tokio runtime.
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
    shared: Arc<Shared>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            listener: RwLock::new(None),
            floor: AtomicU64::new(0),
        });

        tokio::spawn(run(rx, Arc::clone(&shared)));

        Self { tx, shared }
    }

    /// Replace the active listener. Already delivered data is not replayed.
    pub fn set_listener(&self, listener: Option<Arc<dyn DataListener>>) {
        *self.shared.listener.write() = listener;
    }

    /// Sender for one transport generation.
    pub fn sink(&self, generation: u64) -> DeliverySink {
        DeliverySink {
            tx: self.tx.clone(),
            generation,
        }
    }

    /// Run `callback` on the delivery context.
    pub fn post(&self, callback: Callback) {
        if self.tx.send(Delivery::Callback(callback)).is_err() {
            debug!("Delivery context gone, dropping callback");
        }
    }

    /// Drop every undelivered notification from `generation` and older.
    pub fn revoke_through(&self, generation: u64) {
        self.shared
            .floor
            .fetch_max(generation.saturating_add(1), Ordering::SeqCst);
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Posts listener notifications for one transport generation.
#[derive(Clone)]
pub struct DeliverySink {
    tx: mpsc::UnboundedSender<Delivery>,
    generation: u64,
}

impl DeliverySink {
    pub fn data(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(Delivery::Data {
            generation: self.generation,
            bytes,
        });
    }

    pub fn error(&self, error: SppError) {
        let _ = self.tx.send(Delivery::Error {
            generation: self.generation,
            error,
        });
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Delivery>, shared: Arc<Shared>) {
    while let Some(delivery) = rx.recv().await {
        match delivery {
            Delivery::Callback(callback) => callback(),
            Delivery::Data { generation, bytes } => {
                if let Some(listener) = current_listener(&shared, generation) {
                    listener.on_data(&bytes);
                }
            }
            Delivery::Error { generation, error } => {
                if let Some(listener) = current_listener(&shared, generation) {
                    listener.on_error(&error);
                }
            }
        }
    }
    debug!("Delivery context stopped");
}

fn current_listener(shared: &Shared, generation: u64) -> Option<Arc<dyn DataListener>> {
    if generation < shared.floor.load(Ordering::SeqCst) {
        return None;
    }
    shared.listener.read().clone()
}
