// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Identifiers for discovered peers.

use std::fmt::{self, Debug, Display, Formatter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

/// Platform-assigned identifier of a remote device, stable for a scan session.
///
/// The value is opaque: on Android and Linux it is the MAC address rendered as
/// `AA:BB:CC:DD:EE:FF`, on Apple platforms a per-host UUID. Two addresses are
/// the same peer only if their text is identical; no normalisation happens.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", transparent)
)]
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct PeerAddress(String);

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ParseAddressError {
    #[error("MAC address has to be 6 bytes long")]
    IncorrectByteCount,
    #[error("Invalid digit in address: {0}")]
    InvalidDigit(#[from] std::num::ParseIntError),
}

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Render a MAC address the way Android reports it.
    ///
    /// ```
    /// # use peerbeacon::api::PeerAddress;
    /// let addr = PeerAddress::from_mac([0x2A, 0xCC, 0x00, 0x34, 0xFA, 0x00]);
    /// assert_eq!("2A:CC:00:34:FA:00", addr.as_str());
    /// ```
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let a = &mac;
        Self(format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Interpret the address as a MAC, either `aa:bb:cc:dd:ee:ff` or
    /// `aabbccddeeff`. Hex digits of either case are accepted.
    pub fn to_mac(&self) -> Result<[u8; 6], ParseAddressError> {
        if self.0.contains(':') {
            parse_mac_delim(&self.0)
        } else {
            parse_mac_no_delim(&self.0)
        }
    }
}

fn parse_mac_delim(s: &str) -> Result<[u8; 6], ParseAddressError> {
    let bytes = s
        .split(':')
        .map(|part| u8::from_str_radix(part, 16).map_err(ParseAddressError::InvalidDigit))
        .collect::<Result<Vec<u8>, _>>()?;

    <[u8; 6]>::try_from(bytes.as_slice()).map_err(|_| ParseAddressError::IncorrectByteCount)
}

fn parse_mac_no_delim(s: &str) -> Result<[u8; 6], ParseAddressError> {
    if s.len() != 12 || !s.is_ascii() {
        return Err(ParseAddressError::IncorrectByteCount);
    }

    let mut mac = [0; 6];
    for (byte, chunk) in mac.iter_mut().zip(s.as_bytes().chunks(2)) {
        // Chunks of an ASCII string are valid UTF-8.
        let part = std::str::from_utf8(chunk).unwrap_or_default();
        *byte = u8::from_str_radix(part, 16)?;
    }
    Ok(mac)
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for PeerAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(mac: [u8; 6]) -> Self {
        Self::from_mac(mac)
    }
}

impl AsRef<str> for PeerAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
