// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Settings shared by the scan and advertising sessions.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

use crate::api::{AdvertiseSettings, Fingerprint, ScanMode};
use crate::{Error, Result};

/// Default number of session events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration of a discovery node.
///
/// Both sessions of a node must be built from the same configuration so the scanner filters on the
/// fingerprint the advertiser broadcasts under.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub fingerprint: Fingerprint,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scan_mode: ScanMode,
    #[cfg_attr(feature = "serde", serde(default))]
    pub advertise: AdvertiseSettings,
    #[cfg_attr(feature = "serde", serde(default = "default_event_capacity"))]
    pub event_capacity: usize,
}

#[cfg(feature = "serde")]
fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl DiscoveryConfig {
    pub fn new(fingerprint: impl AsRef<str>) -> Result<Self> {
        Ok(Self::with_fingerprint(Fingerprint::new(fingerprint)?))
    }

    pub fn with_fingerprint(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            scan_mode: ScanMode::default(),
            advertise: AdvertiseSettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn scan_mode(mut self, mode: ScanMode) -> Self {
        self.scan_mode = mode;
        self
    }

    pub fn advertise_settings(mut self, settings: AdvertiseSettings) -> Self {
        self.advertise = settings;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Check settings that can't be enforced by construction, e.g. after deserializing.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::ZeroEventCapacity);
        }
        Ok(())
    }
}
