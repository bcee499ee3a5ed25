// peerbeacon Source Code File
//
// Copyright 2020 Nonpolynomial Labs LLC. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Announcing ourselves to other peers: building the advertised service data and the
//! `Idle → Advertising → Idle` lifecycle around an [`Advertiser`].

use std::sync::Mutex;

use futures::stream::StreamExt;
use log::{debug, error, info, trace};
use uuid::Uuid;

use crate::api::fingerprint::advertised_uuid_len;
use crate::api::{AdvertiseEvent, AdvertiseSettings, Advertiser, Fingerprint};
use crate::common::util;
use crate::config::DiscoveryConfig;
use crate::{Error, Result};

/// Bytes available in a legacy advertising PDU.
pub const MAX_ADVERTISEMENT_LEN: usize = 31;

/// Length + AD type bytes preceding every AD structure.
const AD_HEADER_LEN: usize = 2;
/// The flags structure platforms add to connectable advertisements.
const FLAGS_LEN: usize = 3;

/// Contents of our advertisement: a single service-data entry under the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseData {
    pub fingerprint: Uuid,
    pub service_data: Vec<u8>,
    pub include_device_name: bool,
}

impl AdvertiseData {
    /// Advertise `text`, trimmed and UTF-8 encoded. The fingerprint must be a UUID.
    pub fn from_text(fingerprint: &Fingerprint, text: &str) -> Result<Self> {
        let fingerprint = fingerprint
            .as_uuid()
            .ok_or_else(|| Error::InvalidFingerprint(fingerprint.to_string()))?;
        Ok(Self {
            fingerprint,
            service_data: text.trim().as_bytes().to_vec(),
            include_device_name: false,
        })
    }

    /// Size of the advertisement on air, device name excluded.
    pub fn encoded_len(&self, settings: &AdvertiseSettings) -> usize {
        let flags = if settings.connectable { FLAGS_LEN } else { 0 };
        flags + AD_HEADER_LEN + advertised_uuid_len(&self.fingerprint) + self.service_data.len()
    }

    pub fn validate(&self, settings: &AdvertiseSettings) -> Result<()> {
        let len = self.encoded_len(settings);
        if len > MAX_ADVERTISEMENT_LEN {
            return Err(Error::PayloadTooLarge {
                len,
                max: MAX_ADVERTISEMENT_LEN,
            });
        }
        Ok(())
    }
}

#[cfg_attr(
    feature = "serde",
    derive(serde_cr::Serialize, serde_cr::Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdvertisingState {
    #[default]
    Idle,
    Advertising,
}

pub struct AdvertisingSession<A> {
    advertiser: A,
    fingerprint: Fingerprint,
    settings: AdvertiseSettings,
    state: Mutex<AdvertisingState>,
    transition: tokio::sync::Mutex<()>,
}

impl<A: Advertiser> AdvertisingSession<A> {
    pub fn new(advertiser: A, config: &DiscoveryConfig) -> Self {
        Self {
            advertiser,
            fingerprint: config.fingerprint.clone(),
            settings: config.advertise,
            state: Mutex::new(AdvertisingState::Idle),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn advertiser(&self) -> &A {
        &self.advertiser
    }

    pub fn state(&self) -> AdvertisingState {
        *util::lock(&self.state)
    }

    /// Start broadcasting `text`. Oversized payloads are rejected before the platform is asked;
    /// a platform refusal leaves the session idle.
    pub async fn start(&self, text: &str) -> Result<()> {
        let _transition = self.transition.lock().await;
        if self.state() == AdvertisingState::Advertising {
            return Err(Error::AlreadyAdvertising);
        }

        let data = AdvertiseData::from_text(&self.fingerprint, text)?;
        data.validate(&self.settings)?;

        if let Err(e) = self.advertiser.start_advertising(&self.settings, &data).await {
            error!("Advertising failure: {}", e);
            return Err(e);
        }
        *util::lock(&self.state) = AdvertisingState::Advertising;
        info!(
            "Advertising {} bytes under {}",
            data.service_data.len(),
            self.fingerprint
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        if self.state() == AdvertisingState::Idle {
            return Err(Error::NotAdvertising);
        }

        let result = self.advertiser.stop_advertising().await;
        *util::lock(&self.state) = AdvertisingState::Idle;
        match &result {
            Ok(()) => info!("Stopped advertising"),
            Err(e) => error!("Failed to stop advertising: {}", e),
        }
        result
    }

    /// Apply a failure the platform reported after advertising started. The session drops back to
    /// idle; nothing is retried. Events arriving while idle are ignored.
    pub fn handle(&self, event: AdvertiseEvent) {
        let mut state = util::lock(&self.state);
        if *state == AdvertisingState::Idle {
            trace!("Dropping {:?}, not advertising", event);
            return;
        }
        match event {
            AdvertiseEvent::Failed(failure) => {
                error!("Advertising failed: {}", failure);
                *state = AdvertisingState::Idle;
            }
        }
    }

    /// Feed every event from the advertiser's stream through [`handle`](Self::handle) until the
    /// stream ends.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.advertiser.events().await?;
        debug!("Listening for advertising events");
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        debug!("Advertising event stream ended");
        Ok(())
    }

    /// Start with `text` when idle, stop when advertising. Returns the new state.
    pub async fn toggle(&self, text: &str) -> Result<AdvertisingState> {
        match self.state() {
            AdvertisingState::Idle => self.start(text).await?,
            AdvertisingState::Advertising => self.stop().await?,
        }
        Ok(self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{uuid_from_u16, AdvertiseFailure};
    use async_trait::async_trait;
    use futures::channel::mpsc::{self, UnboundedSender};
    use futures::stream::Stream;
    use std::pin::Pin;
    use std::sync::Arc;

    const FINGERPRINT: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

    #[derive(Default)]
    struct MockAdvertiser {
        started: Mutex<Vec<AdvertiseData>>,
        refuse: Mutex<Option<AdvertiseFailure>>,
        senders: Mutex<Vec<UnboundedSender<AdvertiseEvent>>>,
    }

    impl MockAdvertiser {
        fn send(&self, event: AdvertiseEvent) {
            util::lock(&self.senders).retain(|sender| sender.unbounded_send(event).is_ok());
        }

        fn close(&self) {
            util::lock(&self.senders).clear();
        }
    }

    #[async_trait]
    impl Advertiser for MockAdvertiser {
        async fn start_advertising(
            &self,
            _settings: &AdvertiseSettings,
            data: &AdvertiseData,
        ) -> Result<()> {
            if let Some(failure) = *util::lock(&self.refuse) {
                return Err(Error::AdvertiseFailed(failure));
            }
            util::lock(&self.started).push(data.clone());
            Ok(())
        }

        async fn stop_advertising(&self) -> Result<()> {
            Ok(())
        }

        async fn events(&self) -> Result<Pin<Box<dyn Stream<Item = AdvertiseEvent> + Send>>> {
            let (sender, receiver) = mpsc::unbounded();
            util::lock(&self.senders).push(sender);
            Ok(Box::pin(receiver))
        }
    }

    /// Implements only the required methods, so the event stream is the default one.
    struct QuietAdvertiser;

    #[async_trait]
    impl Advertiser for QuietAdvertiser {
        async fn start_advertising(
            &self,
            _settings: &AdvertiseSettings,
            _data: &AdvertiseData,
        ) -> Result<()> {
            Ok(())
        }

        async fn stop_advertising(&self) -> Result<()> {
            Ok(())
        }
    }

    fn session() -> AdvertisingSession<MockAdvertiser> {
        let config = DiscoveryConfig::new(FINGERPRINT).unwrap();
        AdvertisingSession::new(MockAdvertiser::default(), &config)
    }

    #[test]
    fn payload_is_trimmed_utf8() {
        let fingerprint = Fingerprint::new(FINGERPRINT).unwrap();
        let data = AdvertiseData::from_text(&fingerprint, "  grüße \n").unwrap();
        assert_eq!(data.service_data, "grüße".as_bytes());
        assert_eq!(data.fingerprint.to_string(), FINGERPRINT);
        assert!(!data.include_device_name);
    }

    #[test]
    fn sizes_account_for_uuid_form_and_flags() {
        let settings = AdvertiseSettings::default();
        let long = AdvertiseData::from_text(&Fingerprint::new(FINGERPRINT).unwrap(), "abc").unwrap();
        assert_eq!(long.encoded_len(&settings), 2 + 16 + 3);

        let short = AdvertiseData::from_text(&uuid_from_u16(0xfeaa).into(), "abc").unwrap();
        assert_eq!(short.encoded_len(&settings), 2 + 2 + 3);

        let connectable = AdvertiseSettings {
            connectable: true,
            ..settings
        };
        assert_eq!(short.encoded_len(&connectable), 3 + 2 + 2 + 3);
    }

    #[test]
    fn rejects_oversized_payload() {
        let settings = AdvertiseSettings::default();
        let fingerprint = Fingerprint::new(FINGERPRINT).unwrap();

        let fits = AdvertiseData::from_text(&fingerprint, &"x".repeat(13)).unwrap();
        assert!(fits.validate(&settings).is_ok());

        let too_big = AdvertiseData::from_text(&fingerprint, &"x".repeat(14)).unwrap();
        assert!(matches!(
            too_big.validate(&settings),
            Err(Error::PayloadTooLarge { len: 32, max: 31 })
        ));
    }

    #[test]
    fn non_uuid_fingerprint_cannot_be_advertised() {
        let fingerprint = Fingerprint::new("abcd-1234").unwrap();
        assert!(matches!(
            AdvertiseData::from_text(&fingerprint, "hi"),
            Err(Error::InvalidFingerprint(_))
        ));
    }

    #[tokio::test]
    async fn start_and_stop() {
        let session = session();
        assert!(matches!(session.stop().await, Err(Error::NotAdvertising)));

        session.start("hello").await.unwrap();
        assert_eq!(session.state(), AdvertisingState::Advertising);
        assert!(matches!(
            session.start("again").await,
            Err(Error::AlreadyAdvertising)
        ));
        assert_eq!(
            util::lock(&session.advertiser().started)[0].service_data,
            b"hello"
        );

        assert_eq!(session.toggle("").await.unwrap(), AdvertisingState::Idle);
    }

    #[tokio::test]
    async fn platform_refusal_leaves_session_idle() {
        let session = session();
        *util::lock(&session.advertiser().refuse) = Some(AdvertiseFailure::TooManyAdvertisers);

        let result = session.start("hello").await;
        assert!(matches!(
            result,
            Err(Error::AdvertiseFailed(AdvertiseFailure::TooManyAdvertisers))
        ));
        assert_eq!(session.state(), AdvertisingState::Idle);
    }

    #[tokio::test]
    async fn oversized_text_never_reaches_platform() {
        let session = session();
        let result = session.start(&"x".repeat(40)).await;
        assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));
        assert!(util::lock(&session.advertiser().started).is_empty());
        assert_eq!(session.state(), AdvertisingState::Idle);
    }

    #[tokio::test]
    async fn late_failure_drops_back_to_idle() {
        let session = session();
        session.start("hello").await.unwrap();

        session.handle(AdvertiseEvent::Failed(AdvertiseFailure::InternalError));
        assert_eq!(session.state(), AdvertisingState::Idle);
        assert!(matches!(session.stop().await, Err(Error::NotAdvertising)));

        // Failures reported while idle change nothing, and a new start still works.
        session.handle(AdvertiseEvent::Failed(AdvertiseFailure::InternalError));
        assert_eq!(session.state(), AdvertisingState::Idle);
        session.start("again").await.unwrap();
        assert_eq!(session.state(), AdvertisingState::Advertising);
    }

    #[tokio::test]
    async fn run_pumps_advertiser_failures() {
        let session = Arc::new(session());
        session.start("hello").await.unwrap();

        let pump = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });
        // Wait for the pump to subscribe.
        while util::lock(&session.advertiser().senders).is_empty() {
            tokio::task::yield_now().await;
        }

        session
            .advertiser()
            .send(AdvertiseEvent::Failed(AdvertiseFailure::FeatureUnsupported));
        session.advertiser().close();
        pump.await.unwrap().unwrap();

        assert_eq!(session.state(), AdvertisingState::Idle);
    }

    #[tokio::test]
    async fn default_event_stream_ends_immediately() {
        let config = DiscoveryConfig::new(FINGERPRINT).unwrap();
        let session = AdvertisingSession::new(QuietAdvertiser, &config);
        session.start("hello").await.unwrap();
        session.run().await.unwrap();
        assert_eq!(session.state(), AdvertisingState::Advertising);
    }
}
