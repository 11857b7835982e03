//! Call session orchestrator
//!
//! A single-writer actor that drives one live call at a time. User
//! commands, leg notifications, inbound offers and timer firings all enter
//! through one mailbox and are processed strictly one at a time, so a
//! participant event, a transfer event and a user action arriving together
//! can never interleave writes to the session.
//!
//! The cleanup routine is the only path that clears the primary leg,
//! participants, the pending transfer and the timers together; it is
//! idempotent because both a timeout and a late notification may each try
//! to run it.

use crate::application::participants::ParticipantRegistry;
use crate::application::timers::{TimerKey, TimerManager};
use crate::application::transfer::TransferCoordinator;
use crate::config::Config;
use crate::domain::call::leg::{CallLeg, LegRole, LegState};
use crate::domain::call::session::{
    CallDirection, CallSession, CallSessionSnapshot, CallStatus,
};
use crate::domain::call::transfer::{TransferAttempt, TransferMode};
use crate::domain::session_log::{EndReason, SessionLog, SessionLogEntry};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::LegId;
use crate::infrastructure::media::MediaRouter;
use crate::infrastructure::signaling::{
    IncomingOffer, LegController, LegEvent, LegEventKind, SignalingClient,
};
use crate::interface::broadcaster::StatusBroadcaster;
use crate::interface::handle::OrchestratorHandle;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Commands accepted by the control loop. Each carries the responder the
/// final outcome is delivered on.
pub enum OrchestratorCommand {
    InitiateCall {
        destination: String,
        caller_id: Option<String>,
        responder: oneshot::Sender<Result<LegId>>,
    },
    AcceptIncoming {
        responder: oneshot::Sender<Result<()>>,
    },
    RejectIncoming {
        responder: oneshot::Sender<Result<()>>,
    },
    EndCall {
        responder: oneshot::Sender<Result<()>>,
    },
    ToggleHold {
        responder: oneshot::Sender<Result<bool>>,
    },
    ToggleMute {
        responder: oneshot::Sender<Result<bool>>,
    },
    SendDtmf {
        digit: char,
        responder: oneshot::Sender<Result<()>>,
    },
    AddParticipant {
        destination: String,
        responder: oneshot::Sender<Result<LegId>>,
    },
    TransferCall {
        destination: String,
        mode: TransferMode,
        responder: oneshot::Sender<Result<LegId>>,
    },
    GetSnapshot {
        responder: oneshot::Sender<Result<CallSessionSnapshot>>,
    },
    GetSessionLog {
        responder: oneshot::Sender<Result<Vec<SessionLogEntry>>>,
    },
}

/// A hold or mute intent waiting for the adapter's confirming event. The
/// local flag flips only once the confirmation arrives.
struct PendingToggle {
    target: bool,
    responder: oneshot::Sender<Result<bool>>,
}

pub struct CallOrchestrator {
    config: Config,
    signaling: Arc<dyn SignalingClient>,
    media: Arc<dyn MediaRouter>,
    broadcaster: StatusBroadcaster,

    session: CallSession,
    controllers: HashMap<LegId, Arc<dyn LegController>>,
    participants: ParticipantRegistry,
    transfers: TransferCoordinator,
    timers: TimerManager,
    log: SessionLog,

    pending_hold: Option<PendingToggle>,
    pending_mute: Option<PendingToggle>,
    /// Caller identity of the session in progress.
    active_caller_id: Option<String>,
    /// End reason noted when teardown began, consumed by cleanup.
    end_reason: Option<EndReason>,

    commands: mpsc::Receiver<OrchestratorCommand>,
    leg_events: mpsc::Receiver<LegEvent>,
    offers: mpsc::Receiver<IncomingOffer>,
    timer_rx: mpsc::UnboundedReceiver<TimerKey>,
}

impl CallOrchestrator {
    /// Spawn the control loop and return the handle the presentation layer
    /// uses to command it.
    pub fn spawn(
        config: Config,
        signaling: Arc<dyn SignalingClient>,
        media: Arc<dyn MediaRouter>,
        leg_events: mpsc::Receiver<LegEvent>,
        offers: mpsc::Receiver<IncomingOffer>,
    ) -> OrchestratorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.orchestrator.command_buffer.max(1));
        let broadcaster = StatusBroadcaster::new(config.orchestrator.status_capacity);
        let (timers, timer_rx) = TimerManager::new();
        let log = SessionLog::new(config.orchestrator.session_log_capacity);

        let orchestrator = Self {
            config,
            signaling,
            media,
            broadcaster: broadcaster.clone(),
            session: CallSession::new(),
            controllers: HashMap::new(),
            participants: ParticipantRegistry::new(),
            transfers: TransferCoordinator::new(),
            timers,
            log,
            pending_hold: None,
            pending_mute: None,
            active_caller_id: None,
            end_reason: None,
            commands: cmd_rx,
            leg_events,
            offers,
            timer_rx,
        };
        tokio::spawn(orchestrator.run());

        OrchestratorHandle::new(cmd_tx, broadcaster)
    }

    async fn run(mut self) {
        info!("call orchestrator started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("all orchestrator handles dropped, shutting down");
                        if !self.session.is_idle() {
                            self.cleanup(EndReason::Completed).await;
                        }
                        break;
                    }
                },
                event = self.leg_events.recv() => match event {
                    Some(event) => self.handle_leg_event(event).await,
                    None => {
                        debug!("signaling event stream closed, shutting down");
                        self.cleanup(EndReason::Failed).await;
                        break;
                    }
                },
                offer = self.offers.recv() => match offer {
                    Some(offer) => self.handle_offer(offer).await,
                    None => {
                        debug!("incoming offer stream closed, shutting down");
                        self.cleanup(EndReason::Failed).await;
                        break;
                    }
                },
                Some(key) = self.timer_rx.recv() => self.handle_timer(key).await,
            }
        }
        info!("call orchestrator stopped");
    }

    async fn handle_command(&mut self, command: OrchestratorCommand) {
        match command {
            OrchestratorCommand::InitiateCall {
                destination,
                caller_id,
                responder,
            } => {
                let result = self.initiate_call(destination, caller_id).await;
                let _ = responder.send(result);
            }
            OrchestratorCommand::AcceptIncoming { responder } => {
                let _ = responder.send(self.accept_incoming().await);
            }
            OrchestratorCommand::RejectIncoming { responder } => {
                let _ = responder.send(self.hang_up_session(EndReason::Rejected).await);
            }
            OrchestratorCommand::EndCall { responder } => {
                let _ = responder.send(self.hang_up_session(EndReason::Completed).await);
            }
            OrchestratorCommand::ToggleHold { responder } => {
                self.toggle_hold(responder).await;
            }
            OrchestratorCommand::ToggleMute { responder } => {
                self.toggle_mute(responder).await;
            }
            OrchestratorCommand::SendDtmf { digit, responder } => {
                let _ = responder.send(self.send_dtmf(digit).await);
            }
            OrchestratorCommand::AddParticipant {
                destination,
                responder,
            } => {
                self.add_participant(destination, responder).await;
            }
            OrchestratorCommand::TransferCall {
                destination,
                mode,
                responder,
            } => {
                self.transfer_call(destination, mode, responder).await;
            }
            OrchestratorCommand::GetSnapshot { responder } => {
                let _ = responder.send(Ok(self.session.snapshot()));
            }
            OrchestratorCommand::GetSessionLog { responder } => {
                let _ = responder.send(Ok(self.log.all()));
            }
        }
    }

    // ===== user commands =====

    async fn initiate_call(
        &mut self,
        destination: String,
        caller_id: Option<String>,
    ) -> Result<LegId> {
        if !self.session.is_idle() {
            return Err(CallError::InvalidState(
                "a call is already in progress".to_string(),
            ));
        }
        if !self.signaling.registered() {
            return Err(CallError::NotReady);
        }
        let caller_id = caller_id
            .or_else(|| self.config.caller.default_caller_id.clone())
            .ok_or(CallError::NoCallerId)?;

        let controller = self.signaling.dial(&destination, &caller_id).await?;
        let leg_id = controller.id();
        info!("outbound call to {} on leg {}", destination, leg_id);

        self.controllers.insert(leg_id.clone(), controller);
        self.active_caller_id = Some(caller_id);
        self.session
            .begin_outbound(CallLeg::new(leg_id.clone(), LegRole::Primary, destination));
        self.emit_snapshot();
        Ok(leg_id)
    }

    async fn accept_incoming(&mut self) -> Result<()> {
        if self.session.status != CallStatus::Incoming {
            return Err(CallError::InvalidState(
                "no incoming call to accept".to_string(),
            ));
        }
        let controller = self.primary_controller()?;
        controller.answer().await?;
        // The session moves to Active on the confirming notification.
        Ok(())
    }

    /// Shared implementation of `reject_incoming` and `end_call`: hang
    /// everything up and run the unconditional cleanup.
    async fn hang_up_session(&mut self, reason: EndReason) -> Result<()> {
        if self.session.is_idle() {
            return Err(CallError::InvalidState("no call in progress".to_string()));
        }
        // A remote hangup observed earlier takes precedence in the log.
        let reason = self.end_reason.take().unwrap_or(reason);
        info!("ending call ({:?})", reason);
        self.cleanup(reason).await;
        Ok(())
    }

    async fn toggle_hold(&mut self, responder: oneshot::Sender<Result<bool>>) {
        if !self.session.primary_is_established() {
            let _ = responder.send(Err(CallError::InvalidState(
                "call is not established".to_string(),
            )));
            return;
        }
        if self.session.transferring {
            let _ = responder.send(Err(CallError::InvalidState(
                "transfer in progress".to_string(),
            )));
            return;
        }
        if self.pending_hold.is_some() {
            let _ = responder.send(Err(CallError::InvalidState(
                "hold change already pending".to_string(),
            )));
            return;
        }
        let controller = match self.primary_controller() {
            Ok(controller) => controller,
            Err(error) => {
                let _ = responder.send(Err(error));
                return;
            }
        };

        let target = !self.session.held;
        let result = if target {
            controller.hold().await
        } else {
            controller.unhold().await
        };
        match result {
            // Flag flips when the confirming notification arrives.
            Ok(()) => self.pending_hold = Some(PendingToggle { target, responder }),
            Err(error) => {
                warn!("hold command rejected by adapter: {}", error);
                self.broadcaster.operation_failed("hold", &error);
                let _ = responder.send(Err(error));
            }
        }
    }

    async fn toggle_mute(&mut self, responder: oneshot::Sender<Result<bool>>) {
        if !self.session.primary_is_established() {
            let _ = responder.send(Err(CallError::InvalidState(
                "call is not established".to_string(),
            )));
            return;
        }
        if self.pending_mute.is_some() {
            let _ = responder.send(Err(CallError::InvalidState(
                "mute change already pending".to_string(),
            )));
            return;
        }
        let controller = match self.primary_controller() {
            Ok(controller) => controller,
            Err(error) => {
                let _ = responder.send(Err(error));
                return;
            }
        };

        let target = !self.session.muted;
        let result = if target {
            controller.mute().await
        } else {
            controller.unmute().await
        };
        match result {
            Ok(()) => self.pending_mute = Some(PendingToggle { target, responder }),
            Err(error) => {
                warn!("mute command rejected by adapter: {}", error);
                self.broadcaster.operation_failed("mute", &error);
                let _ = responder.send(Err(error));
            }
        }
    }

    async fn send_dtmf(&mut self, digit: char) -> Result<()> {
        if !self.session.primary_is_active() {
            return Err(CallError::InvalidState("call is not active".to_string()));
        }
        let controller = self.primary_controller()?;
        if let Err(error) = controller.send_dtmf(digit).await {
            // DTMF failures are logged and surfaced, never fatal.
            warn!("dtmf '{}' failed: {}", digit, error);
            self.broadcaster.operation_failed("dtmf", &error);
        }
        Ok(())
    }

    async fn add_participant(
        &mut self,
        destination: String,
        responder: oneshot::Sender<Result<LegId>>,
    ) {
        if !self.session.primary_is_active() || self.session.transferring {
            let _ = responder.send(Err(CallError::NoActiveCall));
            return;
        }
        let caller_id = match self.effective_caller_id() {
            Some(caller_id) => caller_id,
            None => {
                let _ = responder.send(Err(CallError::NoCallerId));
                return;
            }
        };

        match self.signaling.dial(&destination, &caller_id).await {
            Ok(controller) => {
                let leg_id = controller.id();
                info!("adding participant {} on leg {}", destination, leg_id);
                self.controllers.insert(leg_id.clone(), controller);
                // Registered before any progress event can arrive, so a
                // concurrent end_call is guaranteed to find this leg.
                self.session.participants.push(CallLeg::new(
                    leg_id.clone(),
                    LegRole::Participant,
                    destination,
                ));
                self.participants.register(leg_id.clone(), responder);
                self.timers.arm(
                    TimerKey::ParticipantAnswer(leg_id),
                    self.config.orchestrator.participant_answer_timeout(),
                );
                self.emit_snapshot();
            }
            Err(error) => {
                warn!("participant dial to {} failed: {}", destination, error);
                self.broadcaster.operation_failed("add_participant", &error);
                let _ = responder.send(Err(error));
            }
        }
    }

    async fn transfer_call(
        &mut self,
        destination: String,
        mode: TransferMode,
        responder: oneshot::Sender<Result<LegId>>,
    ) {
        if !self.session.primary_is_established() {
            let _ = responder.send(Err(CallError::NoActiveCall));
            return;
        }
        if self.transfers.in_progress() {
            let _ = responder.send(Err(CallError::TransferInProgress));
            return;
        }
        // An unconfirmed hold toggle would race the handshake's own hold
        // and corrupt the rollback snapshot.
        if self.pending_hold.is_some() {
            let _ = responder.send(Err(CallError::InvalidState(
                "hold change already pending".to_string(),
            )));
            return;
        }
        let caller_id = match self.effective_caller_id() {
            Some(caller_id) => caller_id,
            None => {
                let _ = responder.send(Err(CallError::NoCallerId));
                return;
            }
        };
        let controller = match self.primary_controller() {
            Ok(controller) => controller,
            Err(error) => {
                let _ = responder.send(Err(error));
                return;
            }
        };

        // Snapshot the hold state, then park the primary for the handshake.
        let prior_primary_held = self.session.held;
        if !prior_primary_held {
            if let Err(error) = controller.hold().await {
                warn!("transfer aborted, primary could not be held: {}", error);
                let _ = responder.send(Err(error));
                return;
            }
            self.set_primary_state(LegState::Held);
            self.session.held = true;
        }

        match self.signaling.dial(&destination, &caller_id).await {
            Ok(candidate) => {
                let leg_id = candidate.id();
                info!(
                    "transfer ({:?}) to {} on candidate leg {}",
                    mode, destination, leg_id
                );
                self.controllers.insert(leg_id.clone(), candidate);
                let attempt = TransferAttempt::new(
                    destination.clone(),
                    mode,
                    CallLeg::new(leg_id.clone(), LegRole::TransferCandidate, destination),
                    prior_primary_held,
                );
                self.transfers.begin(attempt, responder);
                self.session.transferring = true;
                self.session.recompute_status();
                self.timers.arm(
                    TimerKey::TransferAnswer(leg_id),
                    self.config.orchestrator.transfer_answer_timeout(),
                );
                self.emit_snapshot();
            }
            Err(error) => {
                // The dial itself failed: the primary must not be left
                // stuck on hold.
                warn!("transfer dial to {} failed: {}", destination, error);
                if !prior_primary_held {
                    if let Err(unhold_error) = controller.unhold().await {
                        warn!("rollback unhold failed: {}", unhold_error);
                    }
                    self.set_primary_state(LegState::Active);
                    self.session.held = false;
                }
                self.broadcaster.operation_failed("transfer", &error);
                let _ = responder.send(Err(error));
                self.emit_snapshot();
            }
        }
    }

    // ===== signaling events =====

    async fn handle_leg_event(&mut self, event: LegEvent) {
        debug!("leg event: {:?}", event);
        let LegEvent { leg_id, kind } = event;
        if self.session.is_primary(&leg_id) {
            self.on_primary_event(leg_id, kind).await;
        } else if self.transfers.is_candidate(&leg_id) {
            self.on_candidate_event(kind).await;
        } else if self.session.is_participant(&leg_id) {
            self.on_participant_event(leg_id, kind).await;
        } else if self.session.is_parked(&leg_id) {
            self.on_parked_event(leg_id, kind).await;
        } else {
            debug!("event for unknown or removed leg {} ignored", leg_id);
        }
    }

    async fn on_primary_event(&mut self, leg_id: LegId, kind: LegEventKind) {
        match kind {
            LegEventKind::MuteChanged(muted) => {
                if matches!(&self.pending_mute, Some(pending) if pending.target == muted) {
                    let pending = self.pending_mute.take().unwrap();
                    let _ = pending.responder.send(Ok(muted));
                }
                self.session.muted = muted;
                self.emit_snapshot();
            }
            LegEventKind::State(state) => self.on_primary_state(leg_id, state).await,
        }
    }

    async fn on_primary_state(&mut self, leg_id: LegId, state: LegState) {
        match state {
            LegState::Dialing => {}
            LegState::Ringing => {
                if self.session.status == CallStatus::Connecting {
                    self.set_primary_state(LegState::Ringing);
                    self.session.status = CallStatus::Ringing;
                    self.emit_snapshot();
                }
            }
            LegState::Active => {
                let first_answer = self.session.answered_at.is_none();
                self.set_primary_state(LegState::Active);
                if first_answer {
                    info!("call answered on leg {}", leg_id);
                    self.session.mark_answered();
                    self.attach_primary_media().await;
                    self.timers.start_ticker();
                }
                if matches!(&self.pending_hold, Some(pending) if !pending.target) {
                    let pending = self.pending_hold.take().unwrap();
                    let _ = pending.responder.send(Ok(false));
                }
                self.session.held = false;
                if matches!(
                    self.session.status,
                    CallStatus::Incoming | CallStatus::Connecting | CallStatus::Ringing
                ) {
                    self.session.status = CallStatus::Active;
                }
                self.session.recompute_status();
                self.emit_snapshot();
            }
            LegState::Held => {
                self.set_primary_state(LegState::Held);
                if matches!(&self.pending_hold, Some(pending) if pending.target) {
                    let pending = self.pending_hold.take().unwrap();
                    let _ = pending.responder.send(Ok(true));
                }
                self.session.held = true;
                self.session.recompute_status();
                self.emit_snapshot();
            }
            LegState::Hangup => {
                info!("primary leg {} hung up by remote", leg_id);
                self.set_primary_state(LegState::Hangup);
                self.session.status = CallStatus::Ending;
                self.end_reason = Some(EndReason::RemoteHangup);
                self.timers
                    .arm(TimerKey::EndGrace, self.config.orchestrator.end_grace());
                self.emit_snapshot();
            }
            LegState::Destroyed => {
                // Hard terminal: no grace period.
                info!("primary leg {} destroyed", leg_id);
                self.set_primary_state(LegState::Destroyed);
                let reason = self.end_reason.take().unwrap_or(EndReason::RemoteHangup);
                self.cleanup(reason).await;
            }
            LegState::Failed => {
                warn!("primary leg {} failed", leg_id);
                self.set_primary_state(LegState::Failed);
                self.broadcaster.operation_failed(
                    "call",
                    &CallError::AdapterCommandFailed("primary leg failed".to_string()),
                );
                self.cleanup(EndReason::Failed).await;
            }
        }
    }

    async fn on_candidate_event(&mut self, kind: LegEventKind) {
        let LegEventKind::State(state) = kind else {
            return;
        };
        match state {
            LegState::Dialing | LegState::Held => {}
            LegState::Ringing => {
                if let Some(candidate) = self.transfers.candidate_mut() {
                    candidate.state = LegState::Ringing;
                }
            }
            LegState::Active => self.complete_transfer().await,
            LegState::Hangup | LegState::Destroyed | LegState::Failed => {
                self.fail_transfer(CallError::TransferRejected, false).await;
            }
        }
    }

    async fn on_participant_event(&mut self, leg_id: LegId, kind: LegEventKind) {
        let LegEventKind::State(state) = kind else {
            return;
        };
        match state {
            LegState::Dialing => {}
            LegState::Ringing | LegState::Held => {
                if let Some(participant) = self.session.find_participant_mut(&leg_id) {
                    participant.state = state;
                    self.emit_snapshot();
                }
            }
            LegState::Active => {
                // The answer may race the 45 s deadline; the timer checks
                // the pending slot before acting, so this side wins here.
                self.timers
                    .cancel(&TimerKey::ParticipantAnswer(leg_id.clone()));
                if let Some(participant) = self.session.find_participant_mut(&leg_id) {
                    participant.state = LegState::Active;
                }
                self.attach_participant_media(&leg_id).await;
                self.participants.resolve_answered(&leg_id);
                self.session.recompute_status();
                info!("participant leg {} connected", leg_id);
                self.emit_snapshot();
            }
            LegState::Hangup | LegState::Destroyed | LegState::Failed => {
                self.timers
                    .cancel(&TimerKey::ParticipantAnswer(leg_id.clone()));
                if self
                    .participants
                    .reject(&leg_id, CallError::ParticipantRejected)
                {
                    self.broadcaster
                        .operation_failed("add_participant", &CallError::ParticipantRejected);
                }
                if let Some(leg) = self.session.remove_participant(&leg_id) {
                    self.detach_media_if_attached(&leg).await;
                }
                self.controllers.remove(&leg_id);
                self.session.recompute_status();
                info!("participant leg {} left", leg_id);
                self.emit_snapshot();
            }
        }
    }

    async fn on_parked_event(&mut self, leg_id: LegId, kind: LegEventKind) {
        let LegEventKind::State(state) = kind else {
            return;
        };
        if state.is_terminal() {
            debug!("parked leg {} reached terminal state", leg_id);
            if let Some(leg) = self.session.remove_parked(&leg_id) {
                self.detach_media_if_attached(&leg).await;
            }
            self.controllers.remove(&leg_id);
        }
    }

    async fn handle_offer(&mut self, offer: IncomingOffer) {
        let IncomingOffer {
            leg,
            remote_address,
        } = offer;
        if !self.session.is_idle() {
            warn!("incoming call from {} rejected: session busy", remote_address);
            if let Err(error) = leg.hangup().await {
                warn!("busy rejection hangup failed: {}", error);
            }
            return;
        }

        let leg_id = leg.id();
        info!("incoming call from {} on leg {}", remote_address, leg_id);
        self.controllers.insert(leg_id.clone(), leg);
        let mut primary = CallLeg::new(leg_id, LegRole::Primary, remote_address);
        primary.state = LegState::Ringing;
        self.session.begin_inbound(primary);
        self.emit_snapshot();
    }

    // ===== timers =====

    async fn handle_timer(&mut self, key: TimerKey) {
        // The firing just delivered is spent; retire its deadline entry.
        self.timers.acknowledge(&key);
        match key {
            TimerKey::DurationTick => {
                if self.session.status.counts_duration() {
                    self.session.duration_seconds += 1;
                    self.emit_snapshot();
                }
            }
            TimerKey::ParticipantAnswer(leg_id) => {
                // The leg's own terminal event may have won the race.
                if !self.participants.is_pending(&leg_id) {
                    return;
                }
                warn!("participant leg {} did not answer in time", leg_id);
                self.participants
                    .reject(&leg_id, CallError::ParticipantNoAnswer);
                self.broadcaster
                    .operation_failed("add_participant", &CallError::ParticipantNoAnswer);
                if let Some(leg) = self.session.remove_participant(&leg_id) {
                    self.hangup_leg_best_effort(&leg).await;
                    self.detach_media_if_attached(&leg).await;
                }
                self.controllers.remove(&leg_id);
                self.session.recompute_status();
                self.emit_snapshot();
            }
            TimerKey::TransferAnswer(leg_id) => {
                if !self.transfers.is_candidate(&leg_id) {
                    return;
                }
                self.fail_transfer(CallError::TransferNoAnswer, true).await;
            }
            TimerKey::EndGrace => {
                if self.session.status == CallStatus::Ending {
                    let reason = self.end_reason.take().unwrap_or(EndReason::RemoteHangup);
                    self.cleanup(reason).await;
                }
            }
        }
    }

    // ===== transfer resolution =====

    async fn complete_transfer(&mut self) {
        let Some(pending) = self.transfers.take() else {
            return;
        };
        let mode = pending.attempt.mode;
        self.timers
            .cancel(&TimerKey::TransferAnswer(pending.attempt.candidate.id.clone()));

        let mut new_primary = pending.attempt.candidate.clone();
        new_primary.state = LegState::Active;
        new_primary.promote_to_primary();

        let old_primary = self.session.primary.take();
        match mode {
            TransferMode::Blind => {
                // The original leg is abandoned once the target answers.
                if let Some(old) = old_primary {
                    self.hangup_leg_best_effort(&old).await;
                    self.detach_media_if_attached(&old).await;
                    self.controllers.remove(&old.id);
                }
            }
            TransferMode::Attended => {
                // Keep the original leg held; its bridging/disposition is
                // the signaling client's business.
                if let Some(old) = old_primary {
                    self.session.park(old);
                }
            }
        }

        match self.media.attach(&new_primary.id).await {
            Ok(()) => new_primary.media_attached = true,
            Err(error) => warn!("media attach failed for new primary: {}", error),
        }
        info!(
            "transfer ({:?}) completed, leg {} is now primary",
            mode, new_primary.id
        );

        let new_leg_id = new_primary.id.clone();
        self.session.primary = Some(new_primary);
        self.session.held = false;
        self.session.muted = false;
        self.session.transferring = false;
        self.session.mark_answered();
        self.session.recompute_status();
        self.timers.start_ticker();

        pending.resolve(Ok(new_leg_id));
        self.emit_snapshot();
    }

    async fn fail_transfer(&mut self, error: CallError, hangup_candidate: bool) {
        let Some(pending) = self.transfers.take() else {
            return;
        };
        let candidate = pending.attempt.candidate.clone();
        self.timers
            .cancel(&TimerKey::TransferAnswer(candidate.id.clone()));

        if hangup_candidate {
            self.hangup_leg_best_effort(&candidate).await;
        }
        self.detach_media_if_attached(&candidate).await;
        self.controllers.remove(&candidate.id);

        // Restore exactly the pre-transfer hold state; if the call was
        // already held before the transfer began it stays held. A primary
        // that died during the handshake is left to its own teardown path.
        if !pending.attempt.prior_primary_held && self.session.primary_is_established() {
            if let Ok(controller) = self.primary_controller() {
                if let Err(unhold_error) = controller.unhold().await {
                    warn!("rollback unhold failed: {}", unhold_error);
                }
            }
            self.set_primary_state(LegState::Active);
            self.session.held = false;
        }
        self.session.transferring = false;
        self.session.recompute_status();

        warn!(
            "transfer to {} failed: {}",
            pending.attempt.destination, error
        );
        self.broadcaster.operation_failed("transfer", &error);
        pending.resolve(Err(error));
        self.emit_snapshot();
    }

    // ===== cleanup =====

    /// The single teardown path. Idempotent: a second invocation finds the
    /// session idle and does nothing observable.
    async fn cleanup(&mut self, reason: EndReason) {
        if self.session.is_idle() && self.session.primary.is_none() {
            debug!("cleanup invoked on idle session, nothing to do");
            return;
        }
        info!("cleaning up session {} ({:?})", self.session.id, reason);

        self.timers.cancel_all();

        // Every in-flight operation resolves before the session goes idle;
        // no promise is left dangling.
        if let Some(pending) = self.pending_hold.take() {
            let _ = pending
                .responder
                .send(Err(CallError::CallEndedDuringOperation));
        }
        if let Some(pending) = self.pending_mute.take() {
            let _ = pending
                .responder
                .send(Err(CallError::CallEndedDuringOperation));
        }
        for leg_id in self
            .participants
            .drain_rejecting(CallError::CallEndedDuringOperation)
        {
            debug!("in-flight participant dial {} torn down by cleanup", leg_id);
        }

        // Collect every leg the session still owns, including an in-flight
        // transfer candidate.
        let mut legs: Vec<CallLeg> = Vec::new();
        legs.extend(std::mem::take(&mut self.session.participants));
        legs.extend(std::mem::take(&mut self.session.parked));
        if let Some(pending) = self.transfers.take() {
            legs.push(pending.attempt.candidate.clone());
            pending.resolve(Err(CallError::CallEndedDuringOperation));
        }
        let primary = self.session.primary.take();
        if let Some(primary) = &primary {
            legs.push(primary.clone());
        }
        self.session.transferring = false;

        // Hang up all live legs concurrently, best effort.
        let targets: Vec<(LegId, Arc<dyn LegController>)> = legs
            .iter()
            .filter(|leg| !leg.is_terminal())
            .filter_map(|leg| {
                self.controllers
                    .get(&leg.id)
                    .cloned()
                    .map(|controller| (leg.id.clone(), controller))
            })
            .collect();
        let results = join_all(targets.iter().map(|(_, controller)| controller.hangup())).await;
        for ((leg_id, _), result) in targets.iter().zip(results) {
            if let Err(error) = result {
                warn!("cleanup hangup failed for leg {}: {}", leg_id, error);
            }
        }

        // Release every media sink, the primary's included.
        for leg in legs.iter().filter(|leg| leg.media_attached) {
            if let Err(error) = self.media.detach(&leg.id).await {
                warn!("cleanup media detach failed for leg {}: {}", leg.id, error);
            }
        }

        if let (Some(primary), Some(started_at)) = (&primary, self.session.started_at) {
            self.log.push(SessionLogEntry {
                session_id: self.session.id,
                remote_address: primary.remote_address.clone(),
                direction: self
                    .session
                    .direction
                    .unwrap_or(CallDirection::Outbound),
                started_at,
                answered_at: self.session.answered_at,
                ended_at: Utc::now(),
                duration_seconds: self.session.duration_seconds,
                reason,
            });
        }

        self.controllers.clear();
        self.active_caller_id = None;
        self.end_reason = None;

        self.session.status = CallStatus::Ended;
        self.emit_snapshot();
        self.session.reset();
        self.emit_snapshot();
    }

    // ===== helpers =====

    fn emit_snapshot(&self) {
        self.broadcaster.updated(self.session.snapshot());
    }

    fn effective_caller_id(&self) -> Option<String> {
        self.active_caller_id
            .clone()
            .or_else(|| self.config.caller.default_caller_id.clone())
    }

    fn primary_controller(&self) -> Result<Arc<dyn LegController>> {
        let leg_id = self
            .session
            .primary
            .as_ref()
            .map(|primary| primary.id.clone())
            .ok_or(CallError::NoActiveCall)?;
        self.controllers
            .get(&leg_id)
            .cloned()
            .ok_or(CallError::NoActiveCall)
    }

    fn set_primary_state(&mut self, state: LegState) {
        if let Some(primary) = self.session.primary.as_mut() {
            primary.state = state;
        }
    }

    async fn attach_primary_media(&mut self) {
        let Some(leg_id) = self
            .session
            .primary
            .as_ref()
            .map(|primary| primary.id.clone())
        else {
            return;
        };
        match self.media.attach(&leg_id).await {
            Ok(()) => {
                if let Some(primary) = self.session.primary.as_mut() {
                    primary.media_attached = true;
                }
            }
            Err(error) => warn!("media attach failed for primary leg: {}", error),
        }
    }

    /// Each participant gets its own audio path, independent of the
    /// primary's sink.
    async fn attach_participant_media(&mut self, leg_id: &LegId) {
        match self.media.attach(leg_id).await {
            Ok(()) => {
                if let Some(participant) = self.session.find_participant_mut(leg_id) {
                    participant.media_attached = true;
                }
            }
            Err(error) => warn!("media attach failed for leg {}: {}", leg_id, error),
        }
    }

    async fn detach_media_if_attached(&mut self, leg: &CallLeg) {
        if !leg.media_attached {
            return;
        }
        if let Err(error) = self.media.detach(&leg.id).await {
            warn!("media detach failed for leg {}: {}", leg.id, error);
        }
    }

    async fn hangup_leg_best_effort(&mut self, leg: &CallLeg) {
        if leg.is_terminal() {
            return;
        }
        if let Some(controller) = self.controllers.get(&leg.id) {
            if let Err(error) = controller.hangup().await {
                warn!("hangup failed for leg {}: {}", leg.id, error);
            }
        }
    }
}
