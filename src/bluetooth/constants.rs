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

//! Serial Port Profile identifiers and link tuning defaults.

use uuid::Uuid;

/// Standard SPP service class UUID (0x1101 on the Bluetooth base UUID).
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Leading digits of the canonical SPP UUID string.
pub const SPP_UUID_PREFIX: &str = "00001101";

/// Direct RFCOMM channel attempts, tried in order: (channel, timeout in ms).
pub const DEFAULT_CHANNEL_ATTEMPTS: [(u8, u64); 2] = [(5, 3_000), (1, 2_000)];

/// Link tuning defaults.
pub mod config {
    /// Maximum wait for a bond to complete.
    pub const BOND_TIMEOUT_SECS: u64 = 15;

    /// Number of SDP UUID polls after a fetch request.
    pub const SDP_ATTEMPTS: u32 = 20;

    /// Spacing between SDP UUID polls.
    pub const SDP_RETRY_INTERVAL_MS: u64 = 100;

    /// Per-socket timeout for UUID based connects.
    pub const SDP_CONNECT_TIMEOUT_MS: u64 = 6_000;

    /// Outbound payloads are written in chunks of at most this many bytes.
    pub const CHUNK_SIZE: usize = 512;

    /// Read loop buffer size.
    pub const READ_BUFFER_SIZE: usize = 1024;

    /// Upper bound for the best-effort writer shutdown on teardown.
    pub const CLOSE_GRACE_MS: u64 = 250;
}

/// Returns true if the canonical form of `uuid` starts with `prefix`.
pub fn uuid_has_prefix(uuid: &Uuid, prefix: &str) -> bool {
    let canonical = uuid.hyphenated().to_string();
    canonical.len() >= prefix.len() && canonical[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SPP_UUID.to_string().to_lowercase(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_spp_prefix_match() {
        assert!(uuid_has_prefix(&SPP_UUID, SPP_UUID_PREFIX));
        assert!(uuid_has_prefix(&SPP_UUID, "00001101-0000"));

        let a2dp = Uuid::from_u128(0x0000110a_0000_1000_8000_00805f9b34fb);
        assert!(!uuid_has_prefix(&a2dp, SPP_UUID_PREFIX));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let custom = Uuid::from_u128(0xabcd1101_0000_1000_8000_00805f9b34fb);
        assert!(uuid_has_prefix(&custom, "ABCD1101"));
    }
}
