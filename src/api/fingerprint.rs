// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The service-data identifier peers advertise under, and the BLE short-UUID
//! conversions needed to build one.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

use crate::{Error, Result};

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BLUETOOTH_BASE_MASK: u128 = 0x00000000_ffff_ffff_ffff_ffffffffffff;
const BLUETOOTH_BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;

/// Convert a 32-bit BLE short UUID to a full 128-bit UUID by filling in the standard Bluetooth Base
/// UUID.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Convert a 16-bit BLE short UUID to a full 128-bit UUID by filling in the standard Bluetooth Base
/// UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Number of bytes a UUID takes in an advertisement: 2 or 4 when it is derived
/// from the Bluetooth Base UUID, 16 otherwise.
pub fn advertised_uuid_len(uuid: &Uuid) -> usize {
    let value = uuid.as_u128();
    if value & BLUETOOTH_BASE_MASK_16 == BLUETOOTH_BASE_UUID {
        2
    } else if value & BLUETOOTH_BASE_MASK == BLUETOOTH_BASE_UUID {
        4
    } else {
        16
    }
}

/// Identifier a peer's service-data entry must carry to be considered part of
/// this application's network.
///
/// Stored lowercased; [`matches`](Fingerprint::matches) compares ASCII
/// case-insensitively, so `"ABCD-1234"` and `"abcd-1234"` are the same
/// fingerprint. Any non-blank text is accepted, although only fingerprints that
/// parse as UUIDs can be advertised.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr", try_from = "String", into = "String")
)]
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(Error::InvalidFingerprint(id.to_string()));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    pub fn from_u16(short: u16) -> Self {
        uuid_from_u16(short).into()
    }

    pub fn from_u32(short: u32) -> Self {
        uuid_from_u32(short).into()
    }

    /// Whether a service-data key names this fingerprint. Only ASCII case is ignored; surrounding
    /// whitespace makes it a different key.
    pub fn matches(&self, key: &str) -> bool {
        self.0.eq_ignore_ascii_case(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fingerprint as a UUID, if it is one.
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }

    /// Render using the 16 or 32-bit short form when the fingerprint is a
    /// Bluetooth Base UUID.
    pub fn to_short_string(&self) -> String {
        match self.as_uuid() {
            Some(uuid) => match advertised_uuid_len(&uuid) {
                2 => format!("{:#06x}", (uuid.as_u128() >> 96) as u16),
                4 => format!("{:#010x}", (uuid.as_u128() >> 96) as u32),
                _ => self.0.clone(),
            },
            None => self.0.clone(),
        }
    }
}

impl From<Uuid> for Fingerprint {
    fn from(uuid: Uuid) -> Self {
        // Uuid's Display is the lowercase hyphenated form.
        Self(uuid.to_string())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
