use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netdiag_rs::checks::{Check, CheckInput};
use netdiag_rs::engine::{CommandEngine, DiagnosticEngine};
use netdiag_rs::orchestrator::{drive_until_idle, FragmentSink, Orchestrator};
use netdiag_rs::render::{self, DisplayFragment};
use netdiag_rs::server;
use netdiag_rs::types::ScanRequest;

/// netdiag-rs — network diagnostic shell (email-auth scans, DNS lookup, port, ping, traceroute, WHOIS).
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netdiag-rs",
    version,
    about = "Network diagnostic shell with progress reporting and a tiny embedded web UI.",
    long_about = None
)]
struct Cli {
    /// Diagnostic engine program that performs the actual network work.
    #[arg(long, env = "NETDIAG_ENGINE", default_value = "netdiag-engine")]
    engine: String,

    /// Extra argument passed to the engine before the subcommand (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Run an email-auth (SPF/DKIM/DMARC) scan for this domain.
    #[arg(long)]
    domain: Option<String>,

    /// DKIM selector to query instead of probing candidates.
    #[arg(long)]
    selector: Option<String>,

    /// Run a one-shot check: nslookup, port, ping, traceroute or whois.
    #[arg(long)]
    check: Option<String>,

    /// Host, domain or query for `--check`.
    #[arg(long, default_value = "")]
    target: String,

    /// Port for `--check port`.
    #[arg(long)]
    port: Option<String>,

    /// DNS server for `--check nslookup` (system default when omitted).
    #[arg(long)]
    server: Option<String>,

    /// Start the embedded HTTP UI server.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address the UI server binds to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory with the static UI files.
    #[arg(long = "ui-dir", default_value = "ui")]
    ui_dir: PathBuf,
}

/// Prints fragments as they arrive; progress is redrawn in place on stderr.
#[derive(Default)]
struct TerminalSink {
    progress_shown: bool,
    failed: bool,
}

impl FragmentSink for TerminalSink {
    fn present(&mut self, fragment: DisplayFragment) {
        match &fragment {
            DisplayFragment::Blank => {}
            DisplayFragment::Progress { .. } => {
                let mut err = std::io::stderr();
                let _ = write!(err, "\r{fragment}");
                let _ = err.flush();
                self.progress_shown = true;
            }
            DisplayFragment::Error { .. } => {
                self.end_progress();
                self.failed = true;
                eprintln!("{fragment}");
            }
            DisplayFragment::Results { .. } | DisplayFragment::Text { .. } => {
                self.end_progress();
                println!("{fragment}");
            }
        }
    }
}

impl TerminalSink {
    fn end_progress(&mut self) {
        if std::mem::take(&mut self.progress_shown) {
            eprintln!();
        }
    }
}

fn init_telemetry() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,netdiag_rs=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_telemetry();
    let cli = Cli::parse();

    info!(
        engine = %cli.engine,
        engine_args = ?cli.engine_args,
        serve_ui = cli.serve_ui,
        "netdiag-rs starting"
    );
    let engine: Arc<dyn DiagnosticEngine> =
        Arc::new(CommandEngine::new(cli.engine.clone()).args(cli.engine_args.clone()));

    if cli.serve_ui {
        let bind = cli.bind.clone();
        let ui_dir = cli.ui_dir.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, engine, ui_dir).await {
                tracing::error!("HTTP UI server error: {e}");
            }
        });
    }

    let mut ok = true;
    if let Some(domain) = cli.domain.clone() {
        ok &= run_scan(engine.clone(), ScanRequest::new(domain, cli.selector.clone())).await;
    }
    if let Some(kind) = cli.check.clone() {
        let input = CheckInput {
            kind,
            target: cli.target.clone(),
            port: cli.port.clone(),
            server: cli.server.clone(),
        };
        ok &= run_check(engine.as_ref(), input).await;
    }

    if cli.serve_ui {
        info!("press Ctrl+C to stop the server");
        let _ = tokio::signal::ctrl_c().await;
    } else if cli.domain.is_none() && cli.check.is_none() {
        warn!("nothing to do: pass --domain, --check or --serve-ui");
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run_scan(engine: Arc<dyn DiagnosticEngine>, request: ScanRequest) -> bool {
    let (mut orchestrator, mut events) = Orchestrator::new(engine, TerminalSink::default());
    if orchestrator.start_scan(request).is_err() {
        return false;
    }
    drive_until_idle(&mut orchestrator, &mut events).await;
    !orchestrator.sink().failed
}

async fn run_check(engine: &dyn DiagnosticEngine, input: CheckInput) -> bool {
    let mut sink = TerminalSink::default();
    match Check::try_from(input) {
        Ok(check) => match engine.run_check(&check).await {
            Ok(reply) => sink.present(render::render_check(&check, &reply)),
            Err(e) => sink.present(render::render_unexpected(e)),
        },
        Err(e) => sink.present(render::render_error(e.to_string())),
    }
    !sink.failed
}
