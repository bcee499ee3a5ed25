// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Scan sessions: the `Idle → Scanning → Idle` lifecycle around a [`DiscoveryRegistry`].

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::stream::{Stream, StreamExt};
use log::{debug, error, info, trace};

use crate::api::{ChangeNotification, ScanEvent, ScanFailure, ScanFilter, ScanMode, Scanner};
use crate::common::{event_hub::EventHub, util};
use crate::config::DiscoveryConfig;
use crate::registry::DiscoveryRegistry;
use crate::{Error, Result};

#[cfg_attr(
    feature = "serde",
    derive(serde_cr::Serialize, serde_cr::Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
}

/// Notifications for whoever presents the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The registry was cleared for a new session.
    Reset,
    Changed(ChangeNotification),
    ScanFailed(ScanFailure),
}

/// Drives a [`Scanner`] and keeps the registry in step with what it reports.
///
/// Events are only ingested while the session is scanning. A platform failure ends the session;
/// it is reported through [`events`](ScanSession::events) and never retried.
pub struct ScanSession<S> {
    scanner: S,
    registry: Arc<DiscoveryRegistry>,
    scan_mode: ScanMode,
    state: Mutex<SessionState>,
    // Held across the platform call so start and stop can't interleave.
    transition: tokio::sync::Mutex<()>,
    events: EventHub<SessionEvent>,
}

impl<S: Scanner> ScanSession<S> {
    pub fn new(scanner: S, config: &DiscoveryConfig) -> Self {
        Self {
            scanner,
            registry: Arc::new(DiscoveryRegistry::new(config.fingerprint.clone())),
            scan_mode: config.scan_mode,
            state: Mutex::new(SessionState::Idle),
            transition: tokio::sync::Mutex::new(()),
            events: EventHub::new(config.event_capacity),
        }
    }

    pub fn registry(&self) -> &Arc<DiscoveryRegistry> {
        &self.registry
    }

    pub fn scanner(&self) -> &S {
        &self.scanner
    }

    pub fn state(&self) -> SessionState {
        *util::lock(&self.state)
    }

    /// Subscribe to session events emitted from now on.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = SessionEvent> + Send>> {
        self.events.event_stream()
    }

    /// Begin a new session: forget the previous session's peers, then ask the platform to scan.
    pub async fn start(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        if self.state() == SessionState::Scanning {
            return Err(Error::AlreadyScanning);
        }

        self.registry.reset();
        self.events.emit(SessionEvent::Reset);
        // Sightings may arrive before start_scan returns.
        self.set_state(SessionState::Scanning);

        let filter = ScanFilter {
            fingerprint: self.registry.fingerprint().clone(),
        };
        if let Err(e) = self.scanner.start_scan(filter, self.scan_mode).await {
            error!("Failed to start scan: {}", e);
            self.set_state(SessionState::Idle);
            return Err(e);
        }
        info!(
            "Scanning for peers advertising {}",
            self.registry.fingerprint().to_short_string()
        );
        Ok(())
    }

    /// End the session. Found peers stay in the registry until the next [`start`](Self::start).
    pub async fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        if self.state() == SessionState::Idle {
            return Err(Error::NotScanning);
        }

        let result = self.scanner.stop_scan().await;
        self.set_state(SessionState::Idle);
        match &result {
            Ok(()) => info!("Stopped scanning, {} peers found", self.registry.len()),
            Err(e) => error!("Failed to stop scan: {}", e),
        }
        result
    }

    /// Start when idle, stop when scanning. Returns the new state.
    pub async fn toggle(&self) -> Result<SessionState> {
        match self.state() {
            SessionState::Idle => self.start().await?,
            SessionState::Scanning => self.stop().await?,
        }
        Ok(self.state())
    }

    /// Apply one event from the scanner.
    pub fn handle(&self, event: ScanEvent) -> ChangeNotification {
        if self.state() != SessionState::Scanning {
            trace!("Dropping {:?}, no scan session running", event);
            return ChangeNotification::NoChange;
        }

        match event {
            ScanEvent::Discovery(discovery) => {
                let change = self.registry.ingest(discovery);
                if change.is_change() {
                    self.events.emit(SessionEvent::Changed(change));
                }
                change
            }
            ScanEvent::Failed(failure) => {
                error!("Scan failed: {}", failure);
                self.set_state(SessionState::Idle);
                self.events.emit(SessionEvent::ScanFailed(failure));
                ChangeNotification::NoChange
            }
        }
    }

    /// Feed every event from the scanner's stream through [`handle`](Self::handle) until the
    /// stream ends.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.scanner.events().await?;
        debug!("Listening for scan events");
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        debug!("Scan event stream ended");
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *util::lock(&self.state), state);
        if previous != state {
            self.events.emit(SessionEvent::StateChanged(state));
        }
    }
}
