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

//! Inbound read loop for one transport.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::DeliverySink;

/// Why a read loop stopped.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The remote end closed the stream.
    Eof,
    Failed(io::Error),
    Cancelled,
}

/// Spawn a read loop on its own task.
pub fn spawn<R>(
    reader: R,
    buffer_size: usize,
    sink: DeliverySink,
    cancel: CancellationToken,
) -> JoinHandle<ReadOutcome>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(run(reader, buffer_size, sink, cancel))
}

/// Read until end of stream, failure or cancellation, forwarding every chunk
/// to `sink` as an owned copy.
pub async fn run<R>(
    mut reader: R,
    buffer_size: usize,
    sink: DeliverySink,
    cancel: CancellationToken,
) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("Read loop reached end of stream");
                return ReadOutcome::Eof;
            }
            Ok(n) => sink.data(buf[..n].to_vec()),
            Err(e) => return ReadOutcome::Failed(e),
        }
    }
}
