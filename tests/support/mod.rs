//! Shared fixtures: a scripted fake signaling client that records every
//! adapter command and emits only the events the test scripts, plus a
//! recording media router.

#![allow(dead_code)]

use async_trait::async_trait;
use palaver::application::orchestrator::CallOrchestrator;
use palaver::config::Config;
use palaver::domain::call::leg::LegState;
use palaver::domain::shared::error::CallError;
use palaver::domain::shared::result::Result;
use palaver::domain::shared::value_objects::LegId;
use palaver::infrastructure::media::MediaRouter;
use palaver::infrastructure::signaling::{
    IncomingOffer, LegController, LegEvent, SignalingClient,
};
use palaver::interface::handle::OrchestratorHandle;
use palaver::CallStatus;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCommand {
    Dial { leg_id: LegId, destination: String },
    Answer(LegId),
    Hangup(LegId),
    Hold(LegId),
    Unhold(LegId),
    Mute(LegId),
    Unmute(LegId),
    Dtmf(LegId, char),
}

struct Recorder {
    commands: Mutex<Vec<AdapterCommand>>,
    fail_hold: AtomicBool,
    fail_mute: AtomicBool,
    fail_dtmf: AtomicBool,
}

impl Recorder {
    fn record(&self, command: AdapterCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

pub struct FakeSignaling {
    recorder: Arc<Recorder>,
    events: mpsc::Sender<LegEvent>,
    offers: mpsc::Sender<IncomingOffer>,
    registered: AtomicBool,
    fail_dial: AtomicBool,
    counter: AtomicU64,
    dials: Mutex<VecDeque<(LegId, String)>>,
}

impl FakeSignaling {
    pub fn new() -> (
        Arc<Self>,
        mpsc::Receiver<LegEvent>,
        mpsc::Receiver<IncomingOffer>,
    ) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (offers_tx, offers_rx) = mpsc::channel(8);
        let fake = Arc::new(Self {
            recorder: Arc::new(Recorder {
                commands: Mutex::new(Vec::new()),
                fail_hold: AtomicBool::new(false),
                fail_mute: AtomicBool::new(false),
                fail_dtmf: AtomicBool::new(false),
            }),
            events: events_tx,
            offers: offers_tx,
            registered: AtomicBool::new(true),
            fail_dial: AtomicBool::new(false),
            counter: AtomicU64::new(0),
            dials: Mutex::new(VecDeque::new()),
        });
        (fake, events_rx, offers_rx)
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn set_fail_dial(&self, fail: bool) {
        self.fail_dial.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_hold(&self, fail: bool) {
        self.recorder.fail_hold.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_mute(&self, fail: bool) {
        self.recorder.fail_mute.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_dtmf(&self, fail: bool) {
        self.recorder.fail_dtmf.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<AdapterCommand> {
        self.recorder.commands.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&AdapterCommand) -> bool>(&self, predicate: F) -> usize {
        self.commands().iter().filter(|c| predicate(c)).count()
    }

    fn next_leg(&self) -> FakeLeg {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        FakeLeg {
            id: LegId::new(format!("leg-{n}")),
            recorder: self.recorder.clone(),
        }
    }

    /// Block until the orchestrator's next dial is observed.
    pub async fn wait_for_dial(&self) -> (LegId, String) {
        loop {
            if let Some(dial) = self.dials.lock().unwrap().pop_front() {
                return dial;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Block until some recorded command matches.
    pub async fn wait_for<F: Fn(&AdapterCommand) -> bool>(&self, predicate: F) {
        loop {
            if self.commands().iter().any(&predicate) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub async fn emit(&self, leg_id: &LegId, state: LegState) {
        self.events
            .send(LegEvent::state(leg_id.clone(), state))
            .await
            .expect("orchestrator gone");
    }

    pub async fn emit_mute(&self, leg_id: &LegId, muted: bool) {
        self.events
            .send(LegEvent::mute_changed(leg_id.clone(), muted))
            .await
            .expect("orchestrator gone");
    }

    /// Inject an inbound offer and return its leg id.
    pub async fn offer(&self, remote_address: &str) -> LegId {
        let leg = self.next_leg();
        let leg_id = leg.id.clone();
        self.offers
            .send(IncomingOffer {
                leg: Arc::new(leg),
                remote_address: remote_address.to_string(),
            })
            .await
            .expect("orchestrator gone");
        leg_id
    }
}

#[async_trait]
impl SignalingClient for FakeSignaling {
    fn registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    async fn dial(&self, destination: &str, _caller_id: &str) -> Result<Arc<dyn LegController>> {
        if self.fail_dial.load(Ordering::SeqCst) {
            return Err(CallError::AdapterCommandFailed("dial refused".to_string()));
        }
        let leg = self.next_leg();
        self.recorder.record(AdapterCommand::Dial {
            leg_id: leg.id.clone(),
            destination: destination.to_string(),
        });
        self.dials
            .lock()
            .unwrap()
            .push_back((leg.id.clone(), destination.to_string()));
        Ok(Arc::new(leg))
    }
}

struct FakeLeg {
    id: LegId,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl LegController for FakeLeg {
    fn id(&self) -> LegId {
        self.id.clone()
    }

    async fn answer(&self) -> Result<()> {
        self.recorder.record(AdapterCommand::Answer(self.id.clone()));
        Ok(())
    }

    async fn hangup(&self) -> Result<()> {
        self.recorder.record(AdapterCommand::Hangup(self.id.clone()));
        Ok(())
    }

    async fn hold(&self) -> Result<()> {
        if self.recorder.fail_hold.load(Ordering::SeqCst) {
            return Err(CallError::AdapterCommandFailed("hold refused".to_string()));
        }
        self.recorder.record(AdapterCommand::Hold(self.id.clone()));
        Ok(())
    }

    async fn unhold(&self) -> Result<()> {
        if self.recorder.fail_hold.load(Ordering::SeqCst) {
            return Err(CallError::AdapterCommandFailed("unhold refused".to_string()));
        }
        self.recorder.record(AdapterCommand::Unhold(self.id.clone()));
        Ok(())
    }

    async fn mute(&self) -> Result<()> {
        if self.recorder.fail_mute.load(Ordering::SeqCst) {
            return Err(CallError::AdapterCommandFailed("mute refused".to_string()));
        }
        self.recorder.record(AdapterCommand::Mute(self.id.clone()));
        Ok(())
    }

    async fn unmute(&self) -> Result<()> {
        if self.recorder.fail_mute.load(Ordering::SeqCst) {
            return Err(CallError::AdapterCommandFailed("unmute refused".to_string()));
        }
        self.recorder.record(AdapterCommand::Unmute(self.id.clone()));
        Ok(())
    }

    async fn send_dtmf(&self, digit: char) -> Result<()> {
        if self.recorder.fail_dtmf.load(Ordering::SeqCst) {
            return Err(CallError::AdapterCommandFailed("dtmf refused".to_string()));
        }
        self.recorder
            .record(AdapterCommand::Dtmf(self.id.clone(), digit));
        Ok(())
    }
}

pub struct FakeMedia {
    attached: Mutex<Vec<LegId>>,
    detached: Mutex<Vec<LegId>>,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attached: Mutex::new(Vec::new()),
            detached: Mutex::new(Vec::new()),
        })
    }

    pub fn attach_count(&self) -> usize {
        self.attached.lock().unwrap().len()
    }

    pub fn detach_count(&self) -> usize {
        self.detached.lock().unwrap().len()
    }

    pub fn was_attached(&self, leg_id: &LegId) -> bool {
        self.attached.lock().unwrap().contains(leg_id)
    }

    /// Legs attached and never detached.
    pub fn live_attachments(&self) -> Vec<LegId> {
        let detached = self.detached.lock().unwrap();
        self.attached
            .lock()
            .unwrap()
            .iter()
            .filter(|leg| !detached.contains(leg))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MediaRouter for FakeMedia {
    async fn attach(&self, leg_id: &LegId) -> Result<()> {
        self.attached.lock().unwrap().push(leg_id.clone());
        Ok(())
    }

    async fn detach(&self, leg_id: &LegId) -> Result<()> {
        self.detached.lock().unwrap().push(leg_id.clone());
        Ok(())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.caller.default_caller_id = Some("+15550001111".to_string());
    config
}

/// Wire an orchestrator over the fakes.
pub fn rig() -> (OrchestratorHandle, Arc<FakeSignaling>, Arc<FakeMedia>) {
    rig_with_config(test_config())
}

pub fn rig_with_config(
    config: Config,
) -> (OrchestratorHandle, Arc<FakeSignaling>, Arc<FakeMedia>) {
    let (signaling, leg_events, offers) = FakeSignaling::new();
    let media = FakeMedia::new();
    let handle = CallOrchestrator::spawn(
        config,
        signaling.clone(),
        media.clone(),
        leg_events,
        offers,
    );
    (handle, signaling, media)
}

/// Poll snapshots until the session reaches the given status.
pub async fn wait_for_status(handle: &OrchestratorHandle, status: CallStatus) {
    loop {
        if handle.snapshot().await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Dial out and script the far end answering; returns the primary leg id.
pub async fn establish_outbound(
    handle: &OrchestratorHandle,
    signaling: &FakeSignaling,
) -> LegId {
    let leg_id = handle
        .initiate_call("+15551234567", None)
        .await
        .expect("initiate failed");
    let (dialed, _) = signaling.wait_for_dial().await;
    assert_eq!(dialed, leg_id);
    signaling.emit(&leg_id, LegState::Active).await;
    wait_for_status(handle, CallStatus::Active).await;
    leg_id
}
