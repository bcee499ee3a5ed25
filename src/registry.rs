// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! The discovery registry: which peers have been seen advertising under our fingerprint during the
//! current scan session, in the order they were first seen.

use std::collections::HashMap;
use std::sync::RwLock;

use log::{debug, trace};

use crate::api::{ChangeNotification, DiscoveryEvent, Fingerprint, MatchedPeer, PeerAddress};
use crate::common::util;

#[derive(Debug, Default)]
struct Entries {
    peers: Vec<MatchedPeer>,
    index: HashMap<PeerAddress, usize>,
}

/// Deduplicating, order-preserving store of matched peers.
///
/// `ingest` and `reset` take the write lock, so each insertion is assigned its position atomically
/// with respect to every other insertion. `snapshot` and the other readers share the read lock.
#[derive(Debug)]
pub struct DiscoveryRegistry {
    fingerprint: Fingerprint,
    entries: RwLock<Entries>,
}

impl DiscoveryRegistry {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Record a sighting.
    ///
    /// The event counts only if one of its service-data keys equals the fingerprint, ignoring
    /// case. Keys are checked in the map's (lexicographic) order and the first match supplies the
    /// payload. Events without such a key leave the registry untouched.
    pub fn ingest(&self, event: DiscoveryEvent) -> ChangeNotification {
        let DiscoveryEvent {
            peer_address,
            mut service_data,
            signal_strength,
            display_name,
        } = event;

        let key = match service_data
            .keys()
            .find(|key| self.fingerprint.matches(key))
            .cloned()
        {
            Some(key) => key,
            None => {
                trace!("Ignoring {}: no service data for {}", peer_address, self.fingerprint);
                return ChangeNotification::NoChange;
            }
        };
        let payload = service_data.remove(&key).unwrap_or_default();

        let mut entries = util::write(&self.entries);
        let existing = entries.index.get(&peer_address).copied();
        if let Some(position) = existing {
            let peer = &mut entries.peers[position];
            peer.last_service_data = payload;
            peer.last_signal_strength = signal_strength;
            peer.display_name = display_name;
            trace!("Updated peer {} at {}", peer_address, position);
            ChangeNotification::Updated(position)
        } else {
            let position = entries.peers.len();
            debug!(
                "Found peer {} ({}) at {}",
                peer_address,
                display_name.as_deref().unwrap_or("Unnamed"),
                position
            );
            entries.index.insert(peer_address.clone(), position);
            entries.peers.push(MatchedPeer {
                peer_address,
                last_service_data: payload,
                last_signal_strength: signal_strength,
                display_name,
                position,
            });
            ChangeNotification::Inserted(position)
        }
    }

    /// Forget every peer. Called when a new scan session starts.
    pub fn reset(&self) {
        let mut entries = util::write(&self.entries);
        debug!("Resetting registry, dropping {} peers", entries.peers.len());
        entries.peers.clear();
        entries.index.clear();
    }

    /// The matched peers, ordered by position.
    pub fn snapshot(&self) -> Vec<MatchedPeer> {
        util::read(&self.entries).peers.clone()
    }

    pub fn get(&self, address: &PeerAddress) -> Option<MatchedPeer> {
        let entries = util::read(&self.entries);
        entries
            .index
            .get(address)
            .map(|&position| entries.peers[position].clone())
    }

    pub fn len(&self) -> usize {
        util::read(&self.entries).peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
