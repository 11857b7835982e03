//! In-process loopback signaling client
//!
//! Simulates leg progression (dialing -> ringing -> active) without any
//! network, so the demo binary and examples can drive a full call
//! lifecycle. Every control command is confirmed by the matching event,
//! exactly like a real adapter.

use super::{IncomingOffer, LegController, LegEvent, SignalingClient};
use crate::domain::call::leg::LegState;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub struct LoopbackSignalingClient {
    events: mpsc::Sender<LegEvent>,
    offers: mpsc::Sender<IncomingOffer>,
    registered: AtomicBool,
    ring_delay: Duration,
    answer_delay: Duration,
    counter: AtomicU64,
}

impl LoopbackSignalingClient {
    /// Build a client plus the event/offer streams the orchestrator consumes.
    pub fn new(
        ring_delay: Duration,
        answer_delay: Duration,
    ) -> (
        Arc<Self>,
        mpsc::Receiver<LegEvent>,
        mpsc::Receiver<IncomingOffer>,
    ) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (offers_tx, offers_rx) = mpsc::channel(8);
        let client = Arc::new(Self {
            events: events_tx,
            offers: offers_tx,
            registered: AtomicBool::new(true),
            ring_delay,
            answer_delay,
            counter: AtomicU64::new(0),
        });
        (client, events_rx, offers_rx)
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    fn next_leg(&self) -> LoopbackLeg {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        LoopbackLeg {
            id: LegId::new(format!("loop-{n}")),
            events: self.events.clone(),
        }
    }

    /// Inject an inbound call; the returned controller rings until the
    /// orchestrator answers or hangs it up.
    pub async fn offer_incoming(&self, remote_address: &str) -> Arc<dyn LegController> {
        let leg: Arc<dyn LegController> = Arc::new(self.next_leg());
        let offer = IncomingOffer {
            leg: leg.clone(),
            remote_address: remote_address.to_string(),
        };
        let _ = self.offers.send(offer).await;
        leg
    }
}

#[async_trait]
impl SignalingClient for LoopbackSignalingClient {
    fn registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn dial(&self, destination: &str, caller_id: &str) -> Result<Arc<dyn LegController>> {
        let leg = self.next_leg();
        debug!(
            "loopback dial {} -> {} as leg {}",
            caller_id, destination, leg.id
        );

        // Simulated far end: ring, then answer.
        let events = self.events.clone();
        let leg_id = leg.id.clone();
        let ring_delay = self.ring_delay;
        let answer_delay = self.answer_delay;
        tokio::spawn(async move {
            tokio::time::sleep(ring_delay).await;
            if events
                .send(LegEvent::state(leg_id.clone(), LegState::Ringing))
                .await
                .is_err()
            {
                return;
            }
            tokio::time::sleep(answer_delay).await;
            let _ = events.send(LegEvent::state(leg_id, LegState::Active)).await;
        });

        Ok(Arc::new(leg))
    }
}

struct LoopbackLeg {
    id: LegId,
    events: mpsc::Sender<LegEvent>,
}

impl LoopbackLeg {
    async fn report(&self, state: LegState) -> Result<()> {
        let _ = self.events.send(LegEvent::state(self.id.clone(), state)).await;
        Ok(())
    }
}

#[async_trait]
impl LegController for LoopbackLeg {
    fn id(&self) -> LegId {
        self.id.clone()
    }

    async fn answer(&self) -> Result<()> {
        self.report(LegState::Active).await
    }

    async fn hangup(&self) -> Result<()> {
        self.report(LegState::Hangup).await
    }

    async fn hold(&self) -> Result<()> {
        self.report(LegState::Held).await
    }

    async fn unhold(&self) -> Result<()> {
        self.report(LegState::Active).await
    }

    async fn mute(&self) -> Result<()> {
        let _ = self
            .events
            .send(LegEvent::mute_changed(self.id.clone(), true))
            .await;
        Ok(())
    }

    async fn unmute(&self) -> Result<()> {
        let _ = self
            .events
            .send(LegEvent::mute_changed(self.id.clone(), false))
            .await;
        Ok(())
    }

    async fn send_dtmf(&self, digit: char) -> Result<()> {
        debug!("loopback dtmf '{}' on leg {}", digit, self.id);
        Ok(())
    }
}
