//! Lifecycle controller - the top-level listening state machine
//!
//! Owns the single open [`Session`], opens and closes recognizer streams and
//! the audio recorder, and applies restart policy. Every input is handled to
//! completion before the next one is read, so no locking is needed.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::audio::{AudioCaptureCoordinator, AudioRecorder, RecorderEvent};
use crate::commands::{AppAction, Command, CommandMatcher, CommandTable, MatchResult, MatchedCommand};
use crate::config::{ControllerConfig, Settings};
use crate::events::{ListeningStatus, VoiceEvent};
use crate::recognition::{
    MicrophoneAccess, RecognitionSession, RecognizerError, RecognizerErrorKind, RecognizerEvent,
    SessionOutput, SpeechRecognizer, StreamId,
};
use crate::state::{ActiveKind, ListeningMode, Session, SessionId};

/// Requests issued by UI affordances (mic button, shortcuts)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    StartAmbient,
    StartActive(ActiveKind),
    Stop,
}

/// Everything the controller reacts to, delivered over one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerInput {
    Request(ControlRequest),
    Recognizer(RecognizerEvent),
    Recorder(RecorderEvent),
    /// Debounced ambient restart timer fired
    AmbientRestartDue { generation: u64 },
}

impl From<ControlRequest> for ControllerInput {
    fn from(request: ControlRequest) -> Self {
        ControllerInput::Request(request)
    }
}

impl From<RecognizerEvent> for ControllerInput {
    fn from(event: RecognizerEvent) -> Self {
        ControllerInput::Recognizer(event)
    }
}

impl From<RecorderEvent> for ControllerInput {
    fn from(event: RecorderEvent) -> Self {
        ControllerInput::Recorder(event)
    }
}

/// Platform collaborators the controller drives
pub struct Platform {
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub recorder: Box<dyn AudioRecorder>,
    pub microphone: Arc<dyn MicrophoneAccess>,
}

/// An active session requested while another session was still open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingStart {
    kind: ActiveKind,
    /// Ambient listening was running when the request came in
    resume_ambient: bool,
}

/// The lifecycle state machine
pub struct LifecycleController {
    config: ControllerConfig,
    settings: Arc<dyn Settings>,
    platform: Platform,
    matcher: CommandMatcher,
    session: Option<Session>,
    pending: Option<PendingStart>,
    next_id: u64,
    restart_generation: u64,
    disabled: bool,
    event_tx: broadcast::Sender<VoiceEvent>,
    mode_tx: watch::Sender<ListeningMode>,
    input_tx: mpsc::UnboundedSender<ControllerInput>,
}

impl LifecycleController {
    /// Create a controller
    ///
    /// `input_tx` must feed the receiver later passed to [`run`](Self::run);
    /// the controller uses it to deliver its own restart timers.
    pub fn new(
        platform: Platform,
        table: Arc<CommandTable>,
        settings: Arc<dyn Settings>,
        config: ControllerConfig,
        event_tx: broadcast::Sender<VoiceEvent>,
        input_tx: mpsc::UnboundedSender<ControllerInput>,
    ) -> Self {
        let matcher = CommandMatcher::with_dedupe_window(table, config.dedupe_window);
        let (mode_tx, _) = watch::channel(ListeningMode::Idle);
        Self {
            config,
            settings,
            platform,
            matcher,
            session: None,
            pending: None,
            next_id: 0,
            restart_generation: 0,
            disabled: false,
            event_tx,
            mode_tx,
            input_tx,
        }
    }

    /// Get the current mode
    pub fn mode(&self) -> ListeningMode {
        self.session.as_ref().map_or(ListeningMode::Idle, |s| s.mode)
    }

    /// Subscribe to mode changes
    pub fn watch_mode(&self) -> watch::Receiver<ListeningMode> {
        self.mode_tx.subscribe()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether recognition was found unsupported and the subsystem shut off
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Run the controller, processing inputs until the channel closes
    pub async fn run(&mut self, mut input_rx: mpsc::UnboundedReceiver<ControllerInput>) {
        info!("lifecycle controller started in Idle mode");

        while let Some(input) = input_rx.recv().await {
            self.handle(input).await;
        }

        info!("lifecycle controller stopped");
    }

    /// Handle a single input
    pub async fn handle(&mut self, input: ControllerInput) {
        match input {
            ControllerInput::Request(ControlRequest::StartAmbient) => self.start_ambient().await,
            ControllerInput::Request(ControlRequest::StartActive(kind)) => {
                self.start_active(kind).await
            }
            ControllerInput::Request(ControlRequest::Stop) => self.stop(),
            ControllerInput::Recognizer(event) => self.on_recognizer_event(event).await,
            ControllerInput::Recorder(event) => self.on_recorder_event(event).await,
            ControllerInput::AmbientRestartDue { generation } => {
                self.on_ambient_restart_due(generation).await
            }
        }
    }

    /// Start watching for a wake phrase
    ///
    /// No-op while any session is open or an active start is pending.
    pub async fn start_ambient(&mut self) {
        if self.disabled {
            return;
        }
        if let Some(session) = &self.session {
            debug!(mode = %session.mode, "start ambient ignored, session open");
            return;
        }
        if self.pending.is_some() {
            debug!("start ambient ignored, active start pending");
            return;
        }
        self.open_session(ListeningMode::AmbientListening, false).await;
    }

    /// Start an active session
    ///
    /// An open session in another mode (ambient included) is stopped first;
    /// the new session opens once the old one has been finalized.
    pub async fn start_active(&mut self, kind: ActiveKind) {
        if self.disabled {
            return;
        }
        self.cancel_ambient_restart();
        let requested = ListeningMode::from(kind);

        let Some(session) = &self.session else {
            self.open_session(requested, false).await;
            return;
        };

        if session.mode == requested && session.is_active {
            debug!(mode = %requested, "already listening in requested mode");
            return;
        }

        let resume_ambient = session.mode == ListeningMode::AmbientListening
            || self.pending.is_some_and(|p| p.resume_ambient);
        info!(from = %session.mode, to = %requested, "switching session, waiting for teardown");
        self.pending = Some(PendingStart {
            kind,
            resume_ambient,
        });
        self.stop_session();
    }

    /// Request the open session to stop
    ///
    /// Teardown happens when the recognizer reports the stream ended.
    pub fn stop(&mut self) {
        self.pending = None;
        self.cancel_ambient_restart();
        self.stop_session();
    }

    fn stop_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.is_active {
            return;
        }

        // Must flip before anything else: an `Ended` arriving from here on
        // finalizes instead of restarting.
        session.is_active = false;

        let mode = session.mode;
        let stream = session.recognition.stream();
        let id = session.id;
        let has_capture = session.capture.is_some();

        info!(%mode, %stream, "stopping session");
        self.platform.recognizer.stop(stream);
        if has_capture {
            self.platform.recorder.stop(id);
        }
        self.emit(VoiceEvent::status(
            ListeningStatus::Stopping,
            format!("Stopping {}", describe(mode)),
        ));
    }

    async fn open_session(&mut self, mode: ListeningMode, resume_ambient: bool) {
        if !self.ensure_supported() {
            return;
        }

        if let Err(denied) = self.platform.microphone.request().await {
            warn!(%mode, reason = %denied.reason, "microphone access denied");
            self.emit(VoiceEvent::PermissionDenied {
                message: denied.to_string(),
            });
            if resume_ambient && self.settings.hands_free_enabled() {
                self.schedule_ambient_restart();
            }
            return;
        }

        // Requests may have been queued while waiting on the microphone, but
        // none of them ran, so nothing can have opened a session meanwhile.
        debug_assert!(self.session.is_none());

        let id = self.next_session_id();
        let stream = self.next_stream_id();
        let options = mode.stream_options();

        if let Err(e) = self.platform.recognizer.start(stream, options) {
            self.on_start_failure(mode, e, resume_ambient);
            return;
        }

        let capture = if mode == ListeningMode::ActiveDictation {
            let mut capture = AudioCaptureCoordinator::new(id, self.platform.recorder.mime_type());
            if let Err(e) = self.platform.recorder.start(id) {
                warn!(%id, error = %e, "recorder failed to start, dictating without audio");
                capture.mark_recorder_unavailable();
            }
            Some(capture)
        } else {
            None
        };

        let recognition = RecognitionSession::new(stream, options);
        self.session = Some(Session::new(id, mode, recognition, capture));
        self.publish_mode();

        info!(%mode, %id, %stream, "session opened");
        self.emit(VoiceEvent::ListeningStarted { mode });
        self.emit(VoiceEvent::status(
            ListeningStatus::Listening,
            format!("Listening {}", describe(mode)),
        ));
    }

    fn on_start_failure(&mut self, mode: ListeningMode, error: RecognizerError, resume_ambient: bool) {
        match error {
            RecognizerError::Unsupported => self.disable("speech recognition is not supported"),
            RecognizerError::Backend(reason) => {
                warn!(%mode, %reason, "recognizer failed to start");
                self.emit(VoiceEvent::status(
                    ListeningStatus::Error,
                    format!("Could not start listening: {}", reason),
                ));
                if resume_ambient && self.settings.hands_free_enabled() {
                    self.schedule_ambient_restart();
                }
            }
        }
    }

    fn ensure_supported(&mut self) -> bool {
        if self.disabled {
            return false;
        }
        if !self.platform.recognizer.is_supported() {
            self.disable("speech recognition is not supported on this platform");
            return false;
        }
        true
    }

    /// Shut the subsystem off for good; reported once
    fn disable(&mut self, message: &str) {
        if self.disabled {
            return;
        }
        warn!(message, "voice control disabled");
        self.disabled = true;
        self.pending = None;
        self.cancel_ambient_restart();
        self.emit(VoiceEvent::RecognitionUnsupported {
            message: message.to_string(),
        });
    }

    async fn on_recognizer_event(&mut self, event: RecognizerEvent) {
        let outputs = match self.session.as_mut() {
            Some(session) if session.recognition.stream() == event.stream => {
                session.recognition.handle(event.kind)
            }
            _ => {
                debug!(stream = %event.stream, kind = ?event.kind, "event from superseded stream dropped");
                return;
            }
        };

        for output in outputs {
            match output {
                SessionOutput::Started => debug!(stream = %event.stream, "recognizer stream started"),
                SessionOutput::Interim(text) => self.on_interim(event.stream, text),
                SessionOutput::Final(text) => self.on_final(event.stream, text).await,
                SessionOutput::Error(kind) => self.on_stream_error(kind),
                SessionOutput::Ended => self.on_stream_ended(event.stream).await,
            }
        }
    }

    /// The session if it is still the one that owns `stream`
    fn session_for(&mut self, stream: StreamId) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|s| s.recognition.stream() == stream)
    }

    fn on_interim(&mut self, stream: StreamId, text: String) {
        let Some(session) = self.session_for(stream) else {
            return;
        };
        session.stream_restarts = 0;
        if session.mode != ListeningMode::ActiveDictation {
            debug!(mode = %session.mode, transcript = %text, "interim result");
            return;
        }

        if self.matcher.could_be_command_prefix(&text) {
            debug!(transcript = %text, "interim withheld, may be a command");
            return;
        }
        self.emit(VoiceEvent::DictationUpdate { transcript: text });
    }

    async fn on_final(&mut self, stream: StreamId, text: String) {
        let Some(session) = self.session_for(stream) else {
            return;
        };
        session.stream_restarts = 0;
        let mode = session.mode;
        let is_active = session.is_active;

        match mode {
            ListeningMode::AmbientListening => {
                if is_active {
                    self.on_ambient_final(&text).await;
                }
            }
            ListeningMode::ActiveCommand => {
                if !is_active {
                    debug!(transcript = %text, "command session closing, result ignored");
                    return;
                }
                match self.matcher.match_final(&text, mode) {
                    MatchResult::Execute(matched) => self.dispatch(matched).await,
                    MatchResult::Suppressed(matched) => {
                        debug!(keyword = %matched.keyword, "duplicate command result consumed");
                    }
                    MatchResult::Unmatched => {
                        info!(transcript = %text, "unrecognized command");
                        self.emit(VoiceEvent::CommandUnrecognized { transcript: text });
                    }
                }
                if self.mode() == ListeningMode::ActiveCommand {
                    self.stop_session();
                }
            }
            ListeningMode::ActiveDictation => match self.matcher.match_final(&text, mode) {
                // A late result of a stopping session must not reopen or
                // re-stop anything.
                MatchResult::Execute(matched) if !is_active && matched.command.changes_lifecycle() => {
                    debug!(keyword = %matched.keyword, "dictation stopping, lifecycle command ignored");
                }
                MatchResult::Execute(matched) => self.dispatch(matched).await,
                MatchResult::Suppressed(matched) => {
                    debug!(keyword = %matched.keyword, "duplicate command result consumed");
                }
                MatchResult::Unmatched => {
                    if let Some(session) = self.session.as_mut() {
                        session.append_transcript(&text);
                    }
                    self.emit(VoiceEvent::DictationFinalized { transcript: text });
                }
            },
            ListeningMode::Idle => {}
        }
    }

    async fn on_ambient_final(&mut self, text: &str) {
        let Some(wake) = self.matcher.table().match_wake_phrase(text).cloned() else {
            debug!(transcript = %text, "no wake phrase");
            return;
        };
        info!(phrase = %wake.phrase, mode = ?wake.mode, "wake phrase detected");
        self.emit(VoiceEvent::status(
            ListeningStatus::WakeDetected,
            format!("Heard \"{}\"", wake.phrase),
        ));
        self.start_active(wake.mode).await;
    }

    async fn dispatch(&mut self, matched: MatchedCommand) {
        match matched.command {
            Command::App(action) => {
                info!(?action, keyword = %matched.keyword, "executing command");
                self.emit(VoiceEvent::CommandExecute {
                    command: action,
                    keyword: matched.keyword,
                });
                match action {
                    AppAction::StartDictation => self.start_active(ActiveKind::Dictation).await,
                    AppAction::StopListening => self.stop(),
                    _ => {}
                }
            }
            Command::Editor(action) => {
                info!(?action, keyword = %matched.keyword, "forwarding editor command");
                self.emit(VoiceEvent::EditorCommand {
                    action,
                    keyword: matched.keyword,
                });
            }
        }
    }

    fn on_stream_error(&mut self, kind: RecognizerErrorKind) {
        if kind.is_transient() {
            debug!(error = %kind, "transient recognizer error");
            return;
        }
        if kind.is_unsupported() {
            self.stop();
            self.disable(&format!("speech recognition unavailable ({})", kind));
            return;
        }
        match kind {
            RecognizerErrorKind::NotAllowed => {
                warn!("microphone access revoked during session");
                self.emit(VoiceEvent::PermissionDenied {
                    message: "microphone access denied".to_string(),
                });
                self.pending = None;
                self.stop_session();
            }
            other => {
                warn!(error = %other, "recognizer error");
                self.emit(VoiceEvent::status(
                    ListeningStatus::Error,
                    format!("Speech recognition error: {}", other),
                ));
            }
        }
    }

    async fn on_stream_ended(&mut self, stream: StreamId) {
        let max_restarts = self.config.max_stream_restarts;
        let Some(session) = self.session_for(stream) else {
            return;
        };

        if session.is_active {
            if session.mode == ListeningMode::AmbientListening {
                info!("ambient recognizer ended on its own");
                session.is_active = false;
            } else if session.stream_restarts >= max_restarts {
                warn!(restarts = session.stream_restarts, "recognizer keeps ending, giving up");
                session.is_active = false;
                if session.capture.is_some() {
                    let id = session.id;
                    self.platform.recorder.stop(id);
                }
                self.emit(VoiceEvent::status(
                    ListeningStatus::Error,
                    "Speech recognition stopped responding",
                ));
            } else {
                self.restart_stream().await;
                return;
            }
        }

        let ready = match self.session.as_mut().and_then(|s| s.capture.as_mut()) {
            Some(capture) => capture.recognizer_ended(),
            None => true,
        };
        if ready {
            self.finish_session().await;
        } else {
            debug!("recognizer ended, waiting for recorder to flush");
        }
    }

    /// Reopen the recognizer stream of the current session in the same mode
    async fn restart_stream(&mut self) {
        let stream = self.next_stream_id();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let options = session.recognition.options();
        session.stream_restarts += 1;
        session.recognition = RecognitionSession::new(stream, options);
        info!(mode = %session.mode, %stream, restarts = session.stream_restarts, "restarting recognizer stream");

        let error = match self.platform.recognizer.start(stream, options) {
            Ok(()) => {
                self.emit(VoiceEvent::status(ListeningStatus::Restarting, "Still listening"));
                return;
            }
            Err(e) => e,
        };

        warn!(error = %error, "recognizer restart failed");
        if error == RecognizerError::Unsupported {
            self.disable("speech recognition is not supported");
        }

        // The new stream never opened, so no `Ended` will follow; finalize
        // as if it had been stopped.
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.is_active = false;
        let ready = match session.capture.as_mut() {
            Some(capture) => {
                let id = session.id;
                self.platform.recorder.stop(id);
                capture.recognizer_ended()
            }
            None => true,
        };
        if ready {
            self.finish_session().await;
        }
    }

    async fn on_recorder_event(&mut self, event: RecorderEvent) {
        let Some(session) = self.session.as_mut() else {
            debug!(session = %event.session(), "recorder event without session dropped");
            return;
        };
        let Some(capture) = session
            .capture
            .as_mut()
            .filter(|c| c.session() == event.session())
        else {
            debug!(session = %event.session(), "recorder event from superseded session dropped");
            return;
        };

        match event {
            RecorderEvent::DataAvailable { data, .. } => capture.push_chunk(data),
            RecorderEvent::Stopped { .. } => {
                let ready = capture.recorder_stopped();
                if session.is_active {
                    warn!(id = %session.id, "recorder stopped before the session");
                } else if ready {
                    self.finish_session().await;
                }
            }
        }
    }

    /// Tear the session down and decide what listens next
    async fn finish_session(&mut self) {
        if !self.close_session() {
            return;
        }

        if let Some(pending) = self.pending.take() {
            self.open_session(pending.kind.into(), pending.resume_ambient).await;
        } else if !self.disabled && self.settings.hands_free_enabled() {
            self.schedule_ambient_restart();
        } else {
            self.emit(VoiceEvent::status(ListeningStatus::Idle, "Not listening"));
        }
    }

    /// Finalize audio and emit `ListeningFinished`. Returns false if no session was open.
    fn close_session(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let mode = session.mode;
        let duration_ms = session.duration_ms();
        let audio_artifact = session.capture.and_then(AudioCaptureCoordinator::finalize);

        info!(
            %mode,
            id = %session.id,
            duration_ms,
            transcript_len = session.transcript_buffer.len(),
            "session finished"
        );
        self.publish_mode();
        self.emit(VoiceEvent::ListeningFinished {
            mode,
            audio_artifact,
            duration_ms,
        });
        true
    }

    fn schedule_ambient_restart(&mut self) {
        self.restart_generation += 1;
        let generation = self.restart_generation;
        let delay = self.config.ambient_restart_delay;
        let input_tx = self.input_tx.clone();

        debug!(generation, delay_ms = delay.as_millis() as u64, "ambient restart scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = input_tx.send(ControllerInput::AmbientRestartDue { generation });
        });
    }

    fn cancel_ambient_restart(&mut self) {
        self.restart_generation += 1;
    }

    async fn on_ambient_restart_due(&mut self, generation: u64) {
        if generation != self.restart_generation {
            debug!(generation, "stale ambient restart ignored");
            return;
        }
        if !self.settings.hands_free_enabled() {
            debug!("hands-free disabled, not restarting ambient listening");
            return;
        }
        self.start_ambient().await;
    }

    fn next_session_id(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId(self.next_id)
    }

    fn next_stream_id(&mut self) -> StreamId {
        self.next_id += 1;
        StreamId(self.next_id)
    }

    fn publish_mode(&self) {
        let mode = self.mode();
        self.mode_tx.send_if_modified(|current| {
            if *current == mode {
                return false;
            }
            *current = mode;
            true
        });
    }

    fn emit(&self, event: VoiceEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}

fn describe(mode: ListeningMode) -> &'static str {
    match mode {
        ListeningMode::Idle => "nothing",
        ListeningMode::AmbientListening => "for wake phrase",
        ListeningMode::ActiveCommand => "for a command",
        ListeningMode::ActiveDictation => "for dictation",
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
