// Runs a scan session and an advertising session against a simulated radio.
//
// RUST_LOG=debug cargo run --example simulated_scan

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{Stream, StreamExt};
use peerbeacon::advertise::{AdvertiseData, AdvertisingSession};
use peerbeacon::api::{
    uuid_from_u16, AdvertiseSettings, Advertiser, DiscoveryEvent, PeerAddress, ScanEvent,
    ScanFilter, ScanMode, Scanner,
};
use peerbeacon::config::DiscoveryConfig;
use peerbeacon::session::{ScanSession, SessionEvent};
use rand::Rng;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FINGERPRINT: &str = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E";

const NEIGHBOURS: [([u8; 6], Option<&str>, &str); 4] = [
    ([0x2a, 0xcc, 0x00, 0x34, 0xfa, 0x00], Some("Pixel 7"), "hello from the kitchen"),
    ([0x1f, 0x2a, 0x00, 0xcc, 0x22, 0xf1], None, "anyone there?"),
    ([0x60, 0x11, 0x5e, 0x09, 0x3b, 0x42], Some("Galaxy S21"), "beacon #3"),
    ([0xd4, 0x81, 0x7a, 0x00, 0x10, 0x9c], Some("Tracker"), "not one of us"),
];

#[derive(Clone, Default)]
struct SimulatedScanner {
    senders: Arc<Mutex<Vec<UnboundedSender<ScanEvent>>>>,
    running: Arc<AtomicBool>,
}

impl SimulatedScanner {
    fn broadcast(&self, event: ScanEvent) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|sender| sender.unbounded_send(event.clone()).is_ok());
    }

    fn random_sighting(fingerprint: &str) -> ScanEvent {
        let mut rng = rand::rng();
        let (mac, name, text) = NEIGHBOURS[rng.random_range(0..NEIGHBOURS.len())];
        let mut event = DiscoveryEvent::new(PeerAddress::from_mac(mac), rng.random_range(-95..-40));
        if let Some(name) = name {
            event = event.with_display_name(name);
        }
        // The last neighbour runs some other application.
        let key = if text == "not one of us" {
            uuid_from_u16(0xfeaa).to_string()
        } else if rng.random_bool(0.5) {
            fingerprint.to_uppercase()
        } else {
            fingerprint.to_lowercase()
        };
        ScanEvent::Discovery(event.with_service_data(key, text.as_bytes()))
    }
}

#[async_trait]
impl Scanner for SimulatedScanner {
    async fn events(&self) -> peerbeacon::Result<Pin<Box<dyn Stream<Item = ScanEvent> + Send>>> {
        let (sender, receiver) = mpsc::unbounded();
        self.senders.lock().unwrap().push(sender);
        Ok(Box::pin(receiver))
    }

    async fn start_scan(&self, filter: ScanFilter, mode: ScanMode) -> peerbeacon::Result<()> {
        println!("Radio: scanning for {} ({:?})", filter.fingerprint, mode);
        self.running.store(true, Ordering::SeqCst);
        let radio = self.clone();
        let fingerprint = filter.fingerprint.to_string();
        tokio::spawn(async move {
            while radio.running.load(Ordering::SeqCst) {
                radio.broadcast(SimulatedScanner::random_sighting(&fingerprint));
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
        Ok(())
    }

    async fn stop_scan(&self) -> peerbeacon::Result<()> {
        println!("Radio: scan stopped");
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct SimulatedAdvertiser;

#[async_trait]
impl Advertiser for SimulatedAdvertiser {
    async fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertiseData,
    ) -> peerbeacon::Result<()> {
        println!(
            "Radio: advertising {:?} under {} ({} bytes on air)",
            String::from_utf8_lossy(&data.service_data),
            data.fingerprint,
            data.encoded_len(settings)
        );
        Ok(())
    }

    async fn stop_advertising(&self) -> peerbeacon::Result<()> {
        println!("Radio: advertising stopped");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let config = DiscoveryConfig::new(FINGERPRINT)?;
    config.validate()?;

    let advertising = AdvertisingSession::new(SimulatedAdvertiser, &config);
    advertising.start("  hi from the demo  ").await?;
    if let Err(e) = advertising.start("twice").await {
        println!("Second start refused: {}", e);
    }

    let session = Arc::new(ScanSession::new(SimulatedScanner::default(), &config));
    let mut events = session.events();
    let printer = {
        let session = session.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    SessionEvent::Changed(change) => {
                        if let Some(peer) = change.index().and_then(|i| {
                            session.registry().snapshot().into_iter().nth(i)
                        }) {
                            println!("{:?}: {}", change, peer);
                        }
                    }
                    other => println!("{:?}", other),
                }
            }
        })
    };

    let pump = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    session.start().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.stop().await?;
    advertising.stop().await?;

    println!("Peers found:");
    for peer in session.registry().snapshot() {
        println!("  #{} {}", peer.position, peer);
    }

    pump.abort();
    printer.abort();
    Ok(())
}
