// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The `api` module contains the data types exchanged with the host platform and the traits a
//! platform binding implements to plug into peerbeacon.
//!
//! A platform binding implements [`Scanner`] (and [`Advertiser`] if it can act as a
//! broadcaster). Everything else in the crate is written against these traits.

pub mod address;
pub mod fingerprint;

pub use self::address::{ParseAddressError, PeerAddress};
pub use self::fingerprint::{uuid_from_u16, uuid_from_u32, Fingerprint};

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

use crate::advertise::AdvertiseData;
use crate::Result;

/// One sighting of a remote device, as reported by the platform's scanner.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEvent {
    pub peer_address: PeerAddress,
    /// Service identifier (as text) to payload. Keys are kept in lexicographic order, which is the
    /// order the registry checks them in.
    pub service_data: BTreeMap<String, Vec<u8>>,
    pub signal_strength: i16,
    pub display_name: Option<String>,
}

impl DiscoveryEvent {
    pub fn new(peer_address: impl Into<PeerAddress>, signal_strength: i16) -> Self {
        Self {
            peer_address: peer_address.into(),
            service_data: BTreeMap::new(),
            signal_strength,
            display_name: None,
        }
    }

    pub fn with_service_data(mut self, key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.service_data.insert(key.into(), data.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// A peer known to advertise under the configured fingerprint.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPeer {
    pub peer_address: PeerAddress,
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    pub last_service_data: Vec<u8>,
    pub last_signal_strength: i16,
    pub display_name: Option<String>,
    /// Index assigned at first match. Updates never change it.
    pub position: usize,
}

impl MatchedPeer {
    /// The advertised payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_text(&self) -> Option<String> {
        String::from_utf8(self.last_service_data.clone()).ok()
    }

    pub fn name_or_default(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Unnamed")
    }
}

impl Display for MatchedPeer {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} dBm {}",
            self.name_or_default(),
            self.peer_address,
            self.last_signal_strength,
            self.payload_text().as_deref().unwrap_or("Unknown")
        )
    }
}

/// What an ingested event did to the registry. Lets a presentation layer redraw a single row
/// instead of the whole list.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeNotification {
    NoChange,
    Inserted(usize),
    Updated(usize),
}

impl ChangeNotification {
    pub fn index(&self) -> Option<usize> {
        match *self {
            ChangeNotification::NoChange => None,
            ChangeNotification::Inserted(index) | ChangeNotification::Updated(index) => Some(index),
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeNotification::NoChange)
    }
}

/// Reasons the platform gives for a failed scan. Codes follow Android's `ScanCallback`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanFailure {
    AlreadyStarted,
    ApplicationRegistrationFailed,
    InternalError,
    FeatureUnsupported,
    OutOfHardwareResources,
    ScanningTooFrequently,
    Unknown(i32),
}

impl ScanFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ScanFailure::AlreadyStarted,
            2 => ScanFailure::ApplicationRegistrationFailed,
            3 => ScanFailure::InternalError,
            4 => ScanFailure::FeatureUnsupported,
            5 => ScanFailure::OutOfHardwareResources,
            6 => ScanFailure::ScanningTooFrequently,
            other => ScanFailure::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            ScanFailure::AlreadyStarted => 1,
            ScanFailure::ApplicationRegistrationFailed => 2,
            ScanFailure::InternalError => 3,
            ScanFailure::FeatureUnsupported => 4,
            ScanFailure::OutOfHardwareResources => 5,
            ScanFailure::ScanningTooFrequently => 6,
            ScanFailure::Unknown(code) => code,
        }
    }
}

impl Display for ScanFailure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?} (code {})", self, self.code())
    }
}

/// Reasons the platform gives for failing to start advertising. Codes follow Android's
/// `AdvertiseCallback`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvertiseFailure {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    InternalError,
    FeatureUnsupported,
    Unknown(i32),
}

impl AdvertiseFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AdvertiseFailure::DataTooLarge,
            2 => AdvertiseFailure::TooManyAdvertisers,
            3 => AdvertiseFailure::AlreadyStarted,
            4 => AdvertiseFailure::InternalError,
            5 => AdvertiseFailure::FeatureUnsupported,
            other => AdvertiseFailure::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match *self {
            AdvertiseFailure::DataTooLarge => 1,
            AdvertiseFailure::TooManyAdvertisers => 2,
            AdvertiseFailure::AlreadyStarted => 3,
            AdvertiseFailure::InternalError => 4,
            AdvertiseFailure::FeatureUnsupported => 5,
            AdvertiseFailure::Unknown(code) => code,
        }
    }
}

impl Display for AdvertiseFailure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?} (code {})", self, self.code())
    }
}

/// Items delivered by a [`Scanner`]'s event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Discovery(DiscoveryEvent),
    /// The running scan stopped because of a platform failure.
    Failed(ScanFailure),
}

/// Items delivered by an [`Advertiser`]'s event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseEvent {
    /// Advertising was accepted but the platform gave up on it later.
    Failed(AdvertiseFailure),
}

/// Trade-off between latency and power draw while scanning.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanMode {
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

/// The filter passed to [`Scanner::start_scan`]. Platforms that support hardware filtering should
/// only report devices with service data under `fingerprint`; others may report everything and
/// leave filtering to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanFilter {
    pub fingerprint: Fingerprint,
}

/// Scanning half of a platform's BLE stack.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Retrieve a stream of [`ScanEvent`]s. Sightings and asynchronous failures of a running scan
    /// arrive here.
    async fn events(&self) -> Result<Pin<Box<dyn Stream<Item = ScanEvent> + Send>>>;

    /// Start scanning. Failures the platform reports synchronously are returned as
    /// [`Error::ScanFailed`](crate::Error::ScanFailed).
    async fn start_scan(&self, filter: ScanFilter, mode: ScanMode) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;
}

/// Advertising mode, trading latency for power.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    #[default]
    High,
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", default)
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    /// Connectable advertisements carry an extra flags structure, which reduces the room left for
    /// service data.
    pub connectable: bool,
}

/// Broadcasting half of a platform's BLE stack.
#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Start broadcasting `data`. Platform refusals are returned as
    /// [`Error::AdvertiseFailed`](crate::Error::AdvertiseFailed).
    async fn start_advertising(&self, settings: &AdvertiseSettings, data: &AdvertiseData)
        -> Result<()>;

    async fn stop_advertising(&self) -> Result<()>;

    /// Failures the platform reports after [`start_advertising`](Self::start_advertising)
    /// returned. Platforms that only report failures synchronously can keep the default, which
    /// never yields.
    async fn events(&self) -> Result<Pin<Box<dyn Stream<Item = AdvertiseEvent> + Send>>> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(data: &[u8], name: Option<&str>) -> MatchedPeer {
        MatchedPeer {
            peer_address: PeerAddress::from("1F:2A:00:CC:22:F1"),
            last_service_data: data.to_vec(),
            last_signal_strength: -67,
            display_name: name.map(str::to_string),
            position: 0,
        }
    }

    #[test]
    fn renders_row() {
        assert_eq!(
            peer(b"hello", Some("Pixel")).to_string(),
            "Pixel 1F:2A:00:CC:22:F1 -67 dBm hello"
        );
        assert_eq!(
            peer(&[0xff, 0xfe], None).to_string(),
            "Unnamed 1F:2A:00:CC:22:F1 -67 dBm Unknown"
        );
    }

    #[test]
    fn failure_codes() {
        for code in 1..=6 {
            assert_eq!(ScanFailure::from_code(code).code(), code);
        }
        assert_eq!(ScanFailure::from_code(2), ScanFailure::ApplicationRegistrationFailed);
        assert_eq!(ScanFailure::from_code(42), ScanFailure::Unknown(42));

        for code in 1..=5 {
            assert_eq!(AdvertiseFailure::from_code(code).code(), code);
        }
        assert_eq!(AdvertiseFailure::from_code(1), AdvertiseFailure::DataTooLarge);
        assert_eq!(AdvertiseFailure::from_code(-3), AdvertiseFailure::Unknown(-3));
        assert_eq!(
            ScanFailure::InternalError.to_string(),
            "InternalError (code 3)"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn peer_serializes_to_json() {
        let original = peer(b"hi", Some("Pixel"));
        let json = serde_json::to_value(&original).unwrap();
        assert_eq!(json["peer_address"], "1F:2A:00:CC:22:F1");
        assert_eq!(json["last_service_data"], serde_json::json!([104, 105]));
        assert_eq!(json["display_name"], "Pixel");

        let back: MatchedPeer = serde_json::from_value(json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn change_index() {
        assert_eq!(ChangeNotification::NoChange.index(), None);
        assert_eq!(ChangeNotification::Inserted(3).index(), Some(3));
        assert!(ChangeNotification::Updated(0).is_change());
        assert!(!ChangeNotification::NoChange.is_change());
    }
}
