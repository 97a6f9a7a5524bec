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

//! Ordered outbound write pipeline.
//!
//! Payloads submitted while no transport exists are held in a pending queue.
//! Attaching a writer hands the whole pending queue to a fresh consumer task
//! under the same lock that installs the new outlet, so later submissions can
//! never overtake buffered ones.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::constants::config::CLOSE_GRACE_MS;

/// Why a consumer task stopped.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The pipeline detached from this writer.
    Closed,
    /// A write or flush failed. The consumer does not retry.
    Failed(io::Error),
    /// The transport was torn down.
    Cancelled,
}

struct Queue {
    pending: VecDeque<Vec<u8>>,
    outlet: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Single-consumer ordered send queue with pre-connection buffering.
pub struct SendPipeline {
    queue: Mutex<Queue>,
    chunk_size: usize,
}

impl SendPipeline {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                outlet: None,
            }),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Submit a payload. Never blocks; the payload is either handed to the
    /// running consumer or buffered until the next transport.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        let mut queue = self.queue.lock();

        let bytes = match queue.outlet.as_ref() {
            Some(outlet) => match outlet.send(bytes) {
                Ok(()) => return true,
                Err(mpsc::error::SendError(bytes)) => bytes,
            },
            None => bytes,
        };

        // Consumer is gone; keep the payload for the next transport.
        queue.outlet = None;
        queue.pending.push_back(bytes);
        true
    }

    /// Bind a consumer task to `writer`, flushing the pending queue first.
    pub fn attach<W>(&self, writer: W, cancel: CancellationToken) -> JoinHandle<WriteOutcome>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();

        let backlog = {
            let mut queue = self.queue.lock();
            queue.outlet = Some(tx);
            std::mem::take(&mut queue.pending)
        };

        if !backlog.is_empty() {
            info!("Flushing {} pending payload(s)", backlog.len());
        }

        tokio::spawn(write_loop(writer, backlog, rx, self.chunk_size, cancel))
    }

    /// Stop routing payloads to the current consumer.
    pub fn detach(&self) {
        self.queue.lock().outlet = None;
    }

    pub fn clear_pending(&self) {
        let mut queue = self.queue.lock();
        if !queue.pending.is_empty() {
            debug!("Discarding {} pending payload(s)", queue.pending.len());
        }
        queue.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.queue.lock().pending.len()
    }

    pub fn is_attached(&self) -> bool {
        self.queue
            .lock()
            .outlet
            .as_ref()
            .is_some_and(|outlet| !outlet.is_closed())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut backlog: VecDeque<Vec<u8>>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunk_size: usize,
    cancel: CancellationToken,
) -> WriteOutcome
where
    W: AsyncWrite + Send + Unpin,
{
    loop {
        let payload = match backlog.pop_front() {
            Some(payload) => payload,
            None => {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = rx.recv() => Some(next),
                };
                match next {
                    None => {
                        close(&mut writer).await;
                        return WriteOutcome::Cancelled;
                    }
                    Some(None) => {
                        close(&mut writer).await;
                        return WriteOutcome::Closed;
                    }
                    Some(Some(payload)) => payload,
                }
            }
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = write_payload(&mut writer, &payload, chunk_size) => Some(result),
        };

        match written {
            None => {
                close(&mut writer).await;
                return WriteOutcome::Cancelled;
            }
            Some(Err(e)) => {
                warn!("Write failed after {} byte payload: {}", payload.len(), e);
                return WriteOutcome::Failed(e);
            }
            Some(Ok(())) => {}
        }
    }
}

async fn write_payload<W>(writer: &mut W, payload: &[u8], chunk_size: usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for chunk in payload.chunks(chunk_size) {
        writer.write_all(chunk).await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn close<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(Duration::from_millis(CLOSE_GRACE_MS), writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Ignoring writer shutdown error: {}", e),
        Err(_) => debug!("Writer shutdown timed out"),
    }
}
