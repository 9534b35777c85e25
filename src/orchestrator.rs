//! Lifecycle of email-auth scans between the caller and the engine.
//!
//! One orchestrator owns at most one in-flight scan. Every scan gets a fresh
//! [`ScanId`]; engine events carrying any other id are stale and dropped, so a
//! superseded scan can never paint over the current one.
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::{event_channel, DiagnosticEngine, EngineEvent, EventReceiver, EventSender, ScanDispatch, ScanReceiver};
use crate::error::ScanError;
use crate::render::{self, DisplayFragment};
use crate::types::{ProgressUpdate, ScanId, ScanOutcome, ScanRequest};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    InProgress { scan: ScanId },
}

/// Output side owned by an orchestrator instance.
pub trait FragmentSink {
    fn present(&mut self, fragment: DisplayFragment);

    fn state_changed(&mut self, _state: ScanState) {}

    /// A state change and the fragment that goes with it. Sinks read by
    /// other tasks override this so both land in one update.
    fn publish(&mut self, state: ScanState, fragment: DisplayFragment) {
        self.state_changed(state);
        self.present(fragment);
    }
}

pub struct Orchestrator<S> {
    engine: Arc<dyn DiagnosticEngine>,
    sink: S,
    events: EventSender,
    state: ScanState,
    last_id: u64,
    cancel: Option<CancellationToken>,
}

impl<S: FragmentSink> Orchestrator<S> {
    /// Build an orchestrator and the receiver its engine events arrive on.
    pub fn new(engine: Arc<dyn DiagnosticEngine>, sink: S) -> (Self, EventReceiver) {
        let (events, rx) = event_channel();
        let orchestrator = Self {
            engine,
            sink,
            events,
            state: ScanState::Idle,
            last_id: 0,
            cancel: None,
        };
        (orchestrator, rx)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ScanState::Idle
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Dispatch a scan without waiting for the engine.
    ///
    /// A scan already in flight is superseded: its token is cancelled and its
    /// remaining events are ignored.
    pub fn start_scan(&mut self, request: ScanRequest) -> Result<ScanId, ScanError> {
        self.supersede();

        if request.domain.trim().is_empty() {
            info!("scan rejected: no domain given");
            let err = ScanError::MissingDomain;
            self.show(ScanState::Idle, render::render_error(err.to_string()));
            return Err(err);
        }

        self.last_id += 1;
        let scan = ScanId(self.last_id);
        let cancel = CancellationToken::new();
        self.show(ScanState::InProgress { scan }, DisplayFragment::Blank);

        let dispatch = ScanDispatch {
            scan,
            domain: request.domain.trim().to_string(),
            selector_hint: request.selector_hint,
            cancel: cancel.clone(),
            events: self.events.clone(),
        };
        match self.engine.scan_email_auth(dispatch) {
            Ok(()) => {
                info!(%scan, domain = %request.domain, "scan started");
                self.cancel = Some(cancel);
                Ok(scan)
            }
            Err(e) => {
                error!(%scan, "engine dispatch failed: {e}");
                self.show(ScanState::Idle, render::render_unexpected(&e));
                Err(ScanError::Dispatch(e.to_string()))
            }
        }
    }

    /// Feed one engine event through the receiver callbacks.
    pub fn handle(&mut self, event: EngineEvent) {
        event.deliver(self);
    }

    /// Cancel the scan in flight. The caller publishes the next state.
    fn supersede(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let ScanState::InProgress { scan } = self.state {
            debug!(%scan, "superseding scan in flight");
        }
    }

    fn is_current(&self, scan: ScanId) -> bool {
        self.state == ScanState::InProgress { scan }
    }

    fn finish(&mut self, fragment: DisplayFragment) {
        self.cancel = None;
        self.show(ScanState::Idle, fragment);
    }

    fn show(&mut self, state: ScanState, fragment: DisplayFragment) {
        if self.state == state {
            self.sink.present(fragment);
        } else {
            self.state = state;
            self.sink.publish(state, fragment);
        }
    }
}

impl<S: FragmentSink> ScanReceiver for Orchestrator<S> {
    fn on_progress(&mut self, scan: ScanId, update: ProgressUpdate) {
        if !self.is_current(scan) {
            debug!(%scan, ?update, "dropping stale progress");
            return;
        }
        self.sink.present(render::render_progress(
            update.percentage(),
            update.completed,
            update.total,
        ));
    }

    fn on_outcome(&mut self, scan: ScanId, outcome: ScanOutcome) {
        if !self.is_current(scan) {
            debug!(%scan, "dropping stale outcome");
            return;
        }
        let fragment = match outcome {
            ScanOutcome::Failure { message } => {
                info!(%scan, %message, "scan failed");
                render::render_error(message)
            }
            ScanOutcome::Success {
                results,
                checked_selectors,
            } => {
                info!(%scan, records = results.len(), selectors = checked_selectors.len(), "scan finished");
                render::render_results(&results, &checked_selectors)
            }
        };
        self.finish(fragment);
    }

    fn on_fault(&mut self, scan: ScanId, detail: String) {
        if !self.is_current(scan) {
            debug!(%scan, %detail, "dropping fault of stale scan");
            return;
        }
        error!(%scan, %detail, "engine fault");
        self.finish(render::render_unexpected(detail));
    }
}

/// Requests accepted by [`run_session`].
#[derive(Debug)]
pub enum SessionCommand {
    Start {
        request: ScanRequest,
        reply: oneshot::Sender<Result<ScanId, ScanError>>,
    },
}

/// Own the orchestrator on a single task, interleaving caller commands with
/// engine callbacks. Returns when every command sender is dropped.
pub async fn run_session<S: FragmentSink>(
    mut orchestrator: Orchestrator<S>,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut events: EventReceiver,
) {
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Start { request, reply }) => {
                    let _ = reply.send(orchestrator.start_scan(request));
                }
                None => break,
            },
            Some(event) = events.recv() => orchestrator.handle(event),
        }
    }
    debug!("session closed");
}

/// Process engine events until the current scan resolves.
pub async fn drive_until_idle<S: FragmentSink>(orchestrator: &mut Orchestrator<S>, events: &mut EventReceiver) {
    while !orchestrator.is_idle() {
        match events.recv().await {
            Some(event) => orchestrator.handle(event),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{Check, CheckReply};
    use crate::error::EngineError;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl DiagnosticEngine for Unreachable {
        fn scan_email_auth(&self, _dispatch: ScanDispatch) -> Result<(), EngineError> {
            Err(EngineError::Closed)
        }

        async fn run_check(&self, _check: &Check) -> Result<CheckReply, EngineError> {
            Err(EngineError::Closed)
        }
    }

    #[derive(Default)]
    struct Collect(Vec<DisplayFragment>);

    impl FragmentSink for Collect {
        fn present(&mut self, fragment: DisplayFragment) {
            self.0.push(fragment);
        }
    }

    #[test]
    fn dispatch_failure_returns_to_idle() {
        let (mut orch, _rx) = Orchestrator::new(Arc::new(Unreachable), Collect::default());
        let err = orch.start_scan(ScanRequest::new("example.com", None)).unwrap_err();
        assert!(matches!(err, ScanError::Dispatch(_)));
        assert!(orch.is_idle());
        match orch.sink().0.last() {
            Some(DisplayFragment::Error { message, detail }) => {
                assert_eq!(message, render::UNEXPECTED_ERROR);
                assert_eq!(detail.as_deref(), Some("engine stream closed"));
            }
            other => panic!("unexpected fragment {other:?}"),
        }
    }

    #[test]
    fn progress_while_idle_is_dropped() {
        let (mut orch, _rx) = Orchestrator::new(Arc::new(Unreachable), Collect::default());
        orch.handle(EngineEvent::progress(ScanId(1), 1, 3));
        assert!(orch.sink().0.is_empty());
    }
}
