// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use super::DeviceId;

/// Rendezvous (HRW) hashing of tenants over devices
pub struct RendezvousHasher;

impl RendezvousHasher {
    /// Compute hash score for a (tenant, device) pair using HRW hashing with blake3
    pub fn compute_score(tenant: &str, device: DeviceId) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(tenant.as_bytes());
        hasher.update(&device.to_le_bytes());
        let hash = hasher.finalize();

        // First 8 bytes as u64
        let mut bytes_array = [0u8; 8];
        bytes_array.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes_array)
    }

    /// Devices sorted by score, highest first
    pub fn rank_devices(tenant: &str, devices: &[DeviceId]) -> Vec<(DeviceId, u64)> {
        let mut scores: Vec<_> = devices
            .iter()
            .map(|&d| (d, Self::compute_score(tenant, d)))
            .collect();
        scores.sort_by_key(|(_, score)| std::cmp::Reverse(*score));
        scores
    }

    /// The highest scoring device, None when there are no devices
    pub fn select(tenant: &str, devices: &[DeviceId]) -> Option<DeviceId> {
        devices
            .iter()
            .copied()
            .max_by_key(|&d| Self::compute_score(tenant, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let score1 = RendezvousHasher::compute_score("acme", 1);
        let score2 = RendezvousHasher::compute_score("acme", 1);
        assert_eq!(score1, score2);
        assert_ne!(score1, RendezvousHasher::compute_score("acme", 2));
    }

    #[test]
    fn test_select_matches_rank() {
        let devices: Vec<DeviceId> = (0..8).collect();
        for tenant in ["a", "b", "tenant-42", "globex"] {
            let ranked = RendezvousHasher::rank_devices(tenant, &devices);
            assert_eq!(ranked.len(), 8);
            assert_eq!(
                RendezvousHasher::select(tenant, &devices),
                Some(ranked[0].0)
            );
        }
        assert_eq!(RendezvousHasher::select("a", &[]), None);
    }

    #[test]
    fn test_stability_removing_devices() {
        let devices: Vec<DeviceId> = (0..5).collect();
        let tenants: Vec<String> = (0..50).map(|i| format!("tenant-{i}")).collect();

        // Removing a device only moves the tenants that were placed on it
        let without_two: Vec<DeviceId> = devices.iter().copied().filter(|&d| d != 2).collect();
        for tenant in &tenants {
            let before = RendezvousHasher::select(tenant, &devices);
            let after = RendezvousHasher::select(tenant, &without_two);
            if before != Some(2) {
                assert_eq!(before, after, "{tenant} moved although its device stayed");
            }
        }
    }
}
