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

//! Error types for the SPP link.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a platform adapter implementation.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Bluetooth adapter unavailable")]
    Unavailable,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Bluetooth stack error: {0}")]
    Platform(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of a failed bonding wait.
#[derive(Debug, Error)]
pub enum BondError {
    #[error("Bond request could not be initiated: {0}")]
    RequestFailed(String),
    #[error("Bonding rejected by remote device")]
    Rejected,
    #[error("Bonding timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a failed socket strategy sequence.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("No SPP channel/UUID available after {attempts} attempts")]
    NoChannelAvailable { attempts: usize },
}

/// Public error taxonomy of the connection manager.
#[derive(Debug, Error)]
pub enum SppError {
    #[error("Invalid Bluetooth address: {0:?}")]
    InvalidAddress(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Bluetooth adapter unavailable")]
    AdapterUnavailable,
    #[error("Bond request failed: {0}")]
    BondRequestFailed(String),
    #[error("Bonding timed out after {0:?}")]
    BondTimeout(Duration),
    #[error("Bonding rejected")]
    BondRejected,
    #[error("No SPP channel/UUID available")]
    NoChannelAvailable,
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("A connect attempt is already in progress")]
    ConnectInProgress,
    #[error("Connect cancelled")]
    Cancelled,
    #[error("Bluetooth stack error: {0}")]
    Platform(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<AdapterError> for SppError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Unavailable => SppError::AdapterUnavailable,
            AdapterError::PermissionDenied(msg) => SppError::PermissionDenied(msg),
            AdapterError::DeviceNotFound(addr) => {
                SppError::Platform(format!("device not found: {addr}"))
            }
            AdapterError::Platform(msg) => SppError::Platform(msg),
            AdapterError::Io(e) => SppError::Io(e),
        }
    }
}

impl From<BondError> for SppError {
    fn from(err: BondError) -> Self {
        match err {
            BondError::RequestFailed(msg) => SppError::BondRequestFailed(msg),
            BondError::Rejected => SppError::BondRejected,
            BondError::Timeout(after) => SppError::BondTimeout(after),
        }
    }
}

impl From<ConnectError> for SppError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::NoChannelAvailable { .. } => SppError::NoChannelAvailable,
        }
    }
}
