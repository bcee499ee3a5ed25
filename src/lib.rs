// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! peerbeacon finds nearby Bluetooth LE peers that run the same application and
//! lets the application announce itself to them.
//!
//! Peers recognise each other by a shared [`Fingerprint`](api::Fingerprint): a
//! service-data identifier under which every instance advertises a short
//! payload. Scanning and advertising themselves are done by the host platform;
//! this crate talks to it through the [`Scanner`](api::Scanner) and
//! [`Advertiser`](api::Advertiser) traits and keeps track of what was found.
//!
//! # Usage
//!
//! ```rust,no_run
//! use peerbeacon::api::Scanner;
//! use peerbeacon::config::DiscoveryConfig;
//! use peerbeacon::session::ScanSession;
//! use futures::stream::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example<S: Scanner + 'static>(scanner: S) -> peerbeacon::Result<()> {
//! let config = DiscoveryConfig::new("6e400001-b5a3-f393-e0a9-e50e24dcca9e")?;
//! let session = Arc::new(ScanSession::new(scanner, &config));
//!
//! let mut events = session.events();
//! session.start().await?;
//!
//! let pump = session.clone();
//! tokio::spawn(async move { pump.run().await });
//!
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//!     for peer in session.registry().snapshot() {
//!         println!("{}", peer);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::result;

pub mod advertise;
pub mod api;
mod common;
pub mod config;
pub mod registry;
pub mod session;

use crate::api::{AdvertiseFailure, ScanFailure};

/// The main error type returned by most methods in peerbeacon.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Scan failed: {0}")]
    ScanFailed(ScanFailure),

    #[error("Advertising failed: {0}")]
    AdvertiseFailed(AdvertiseFailure),

    #[error("A scan session is already running")]
    AlreadyScanning,

    #[error("No scan session is running")]
    NotScanning,

    #[error("Already advertising")]
    AlreadyAdvertising,

    #[error("Not advertising")]
    NotAdvertising,

    #[error("Invalid fingerprint: {0:?}")]
    InvalidFingerprint(String),

    #[error("Advertisement is {len} bytes, at most {max} fit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,

    #[error("{}", _0)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Convenience type for a result using the peerbeacon [`Error`] type.
pub type Result<T> = result::Result<T, Error>;

mod assertions {
    use crate::{advertise, api, registry, session, Error};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    // Shared between the scanner callback and whoever renders the list.
    assert_impl_all!(registry::DiscoveryRegistry: Debug, Send, Sync);
    assert_impl_all!(api::MatchedPeer: Clone, Debug, Send, Sync);
    assert_impl_all!(api::DiscoveryEvent: Clone, Debug, Send, Sync);
    assert_impl_all!(session::SessionEvent: Clone, Debug, Send, Sync);
    assert_impl_all!(advertise::AdvertiseData: Clone, Debug, Send, Sync);
    assert_impl_all!(api::AdvertiseEvent: Clone, Debug, Send, Sync);
    assert_impl_all!(Error: Debug, Send, Sync);
}
