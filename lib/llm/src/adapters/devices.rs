// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Device selection for the shared base model

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use super::TenantId;

pub mod hrw;

pub use hrw::RendezvousHasher;

pub type DeviceId = u32;

/// A device the base model is replicated on
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    activation: Mutex<()>,
}

impl Device {
    pub fn id(&self) -> DeviceId {
        self.id
    }
}

/// The devices requests are spread over.
///
/// Tenants are placed with rendezvous hashing so each one sticks to a single device
/// while the device set is stable. Base-model requests are spread round robin.
#[derive(Debug)]
pub struct DevicePool {
    devices: Vec<Device>,
    ids: Vec<DeviceId>,
    serialize_activation: bool,
    next_base: AtomicUsize,
}

/// Held for the duration of one inference call when activation is serialized
pub struct ActivationGuard<'a> {
    device: DeviceId,
    _lock: Option<MutexGuard<'a, ()>>,
}

impl ActivationGuard<'_> {
    pub fn device(&self) -> DeviceId {
        self.device
    }
}

impl DevicePool {
    /// `num_devices` is clamped to at least one
    pub fn new(num_devices: u32, serialize_activation: bool) -> Self {
        let ids: Vec<DeviceId> = (0..num_devices.max(1)).collect();
        let devices = ids
            .iter()
            .map(|&id| Device {
                id,
                activation: Mutex::new(()),
            })
            .collect();
        Self {
            devices,
            ids,
            serialize_activation,
            next_base: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn serialize_activation(&self) -> bool {
        self.serialize_activation
    }

    /// Device for a tenant's adapter, or for the base model when `tenant_id` is None
    pub fn select(&self, tenant_id: Option<&TenantId>) -> &Device {
        let index = match tenant_id {
            Some(tenant_id) => RendezvousHasher::select(tenant_id.as_str(), &self.ids)
                .map(|id| id as usize)
                .unwrap_or(0),
            None => self.next_base.fetch_add(1, Ordering::Relaxed) % self.devices.len(),
        };
        &self.devices[index]
    }

    /// Take the device for one inference call. Waits for the device's activation lock
    /// when activation is serialized.
    pub async fn enter<'a>(&self, device: &'a Device) -> ActivationGuard<'a> {
        let lock = if self.serialize_activation {
            Some(device.activation.lock().await)
        } else {
            None
        };
        ActivationGuard {
            device: device.id,
            _lock: lock,
        }
    }
}
