//! Boundary to the external diagnostic engine.
//!
//! The engine does the actual network work; this side only launches it and
//! relays what it reports. Scan events flow back over an unbounded channel,
//! each tagged with the [`ScanId`] it belongs to.
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::checks::{Check, CheckReply};
use crate::error::EngineError;
use crate::types::{ProgressUpdate, ScanId, ScanOutcome};
use crate::wire::{decode_line, CheckPayload, WireEvent};

/// Callback pushed by the engine while a scan runs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEvent {
    pub scan: ScanId,
    pub kind: EngineEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEventKind {
    Progress(ProgressUpdate),
    Outcome(ScanOutcome),
    /// The binding layer lost the engine (crash, closed stream, no outcome).
    Fault(String),
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Receiver side of the engine callbacks.
pub trait ScanReceiver {
    fn on_progress(&mut self, scan: ScanId, update: ProgressUpdate);
    fn on_outcome(&mut self, scan: ScanId, outcome: ScanOutcome);
    fn on_fault(&mut self, scan: ScanId, detail: String);
}

impl EngineEvent {
    pub fn progress(scan: ScanId, completed: u64, total: u64) -> Self {
        Self {
            scan,
            kind: EngineEventKind::Progress(ProgressUpdate::new(completed, total)),
        }
    }

    pub fn outcome(scan: ScanId, outcome: ScanOutcome) -> Self {
        Self {
            scan,
            kind: EngineEventKind::Outcome(outcome),
        }
    }

    pub fn fault(scan: ScanId, detail: impl Into<String>) -> Self {
        Self {
            scan,
            kind: EngineEventKind::Fault(detail.into()),
        }
    }

    /// Route this event to the matching receiver callback.
    pub fn deliver<R: ScanReceiver + ?Sized>(self, receiver: &mut R) {
        match self.kind {
            EngineEventKind::Progress(update) => receiver.on_progress(self.scan, update),
            EngineEventKind::Outcome(outcome) => receiver.on_outcome(self.scan, outcome),
            EngineEventKind::Fault(detail) => receiver.on_fault(self.scan, detail),
        }
    }
}

/// Everything the engine needs to run one email-auth scan.
#[derive(Debug, Clone)]
pub struct ScanDispatch {
    pub scan: ScanId,
    pub domain: String,
    pub selector_hint: Option<String>,
    /// Fired when a newer scan supersedes this one.
    pub cancel: CancellationToken,
    pub events: EventSender,
}

impl ScanDispatch {
    /// Push an event for this scan. Returns false once nobody is listening.
    pub fn emit(&self, kind: EngineEventKind) -> bool {
        self.events
            .send(EngineEvent {
                scan: self.scan,
                kind,
            })
            .is_ok()
    }
}

#[async_trait]
pub trait DiagnosticEngine: Send + Sync {
    /// Start a scan and return immediately; progress and the outcome arrive
    /// later through `dispatch.events`. An `Err` means the engine could not
    /// be reached at all.
    fn scan_email_auth(&self, dispatch: ScanDispatch) -> Result<(), EngineError>;

    /// Request/response diagnostics (lookup, port, ping, traceroute, whois).
    async fn run_check(&self, check: &Check) -> Result<CheckReply, EngineError>;
}

/// Engine implemented by an external helper program speaking line-delimited JSON.
///
/// Scans run `<program> [args..] email-auth <domain> [<selector>]`; checks run
/// `<program> [args..] <check> <args..>`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> EngineError {
        EngineError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl DiagnosticEngine for CommandEngine {
    #[tracing::instrument(skip_all, fields(scan = %dispatch.scan, domain = %dispatch.domain))]
    fn scan_email_auth(&self, dispatch: ScanDispatch) -> Result<(), EngineError> {
        let mut cmd = self.command();
        cmd.arg("email-auth").arg(&dispatch.domain);
        if let Some(selector) = &dispatch.selector_hint {
            cmd.arg(selector);
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let stdout = child.stdout.take().ok_or(EngineError::Closed)?;
        info!(pid = child.id(), "email-auth scan dispatched");

        let span = tracing::Span::current();
        tokio::spawn(relay_scan(child, stdout, dispatch).instrument(span));
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(check = check.name()))]
    async fn run_check(&self, check: &Check) -> Result<CheckReply, EngineError> {
        let output = self
            .command()
            .args(check.engine_args())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = if stdout.trim().is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            stdout.into_owned()
        };
        debug!(status = %output.status, bytes = text.len(), "check finished");

        match check {
            Check::Nslookup { .. } => match serde_json::from_str::<CheckPayload>(text.trim())? {
                CheckPayload::Failure { error } => Ok(CheckReply::Failure(error)),
                CheckPayload::Records(records) => Ok(CheckReply::Records(records)),
            },
            _ => match serde_json::from_str::<CheckPayload>(text.trim()) {
                Ok(CheckPayload::Failure { error }) => Ok(CheckReply::Failure(error)),
                _ => Ok(CheckReply::Text(text)),
            },
        }
    }
}

/// Forward the engine's stdout as events until it reports an outcome, the
/// stream ends, or the scan is cancelled.
async fn relay_scan(mut child: Child, stdout: ChildStdout, dispatch: ScanDispatch) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            _ = dispatch.cancel.cancelled() => {
                debug!("scan superseded; stopping engine");
                stop_engine(&mut child).await;
                return;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(line = %String::from_utf8_lossy(&buf), "ignoring non UTF-8 engine output: {e}");
                        continue;
                    }
                };
                match decode_line(line) {
                    Ok(None) => {}
                    Ok(Some(WireEvent::Progress { completed, total })) => {
                        let update = ProgressUpdate::new(completed, total);
                        if !dispatch.emit(EngineEventKind::Progress(update)) {
                            return;
                        }
                    }
                    Ok(Some(WireEvent::Outcome(payload))) => {
                        dispatch.emit(EngineEventKind::Outcome(payload.into()));
                        reap_engine(&mut child, &dispatch.cancel).await;
                        return;
                    }
                    Err(e) => warn!(line = line.trim_end(), "ignoring undecodable engine output: {e}"),
                }
            }
            Err(e) => {
                dispatch.emit(EngineEventKind::Fault(EngineError::Io(e).to_string()));
                stop_engine(&mut child).await;
                return;
            }
        }
    }

    let status = match child.wait().await {
        Ok(status) => status.to_string(),
        Err(e) => e.to_string(),
    };
    let err = EngineError::NoOutcome { status };
    warn!("{err}");
    dispatch.emit(EngineEventKind::Fault(err.to_string()));
}

/// Wait for an engine that already reported its outcome, unless the scan is
/// superseded first.
async fn reap_engine(child: &mut Child, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("engine still running after its outcome; stopping it");
            stop_engine(child).await;
        }
        status = child.wait() => {
            if let Err(e) = status {
                warn!("failed to reap engine: {e}");
            }
        }
    }
}

async fn stop_engine(child: &mut Child) {
    if let Err(e) = child.kill().await {
        warn!("failed to stop engine: {e}");
    }
}
