//! powerd - power profile arbitration daemon
//!
//! The binary wires the pieces together: parses arguments, initializes
//! tracing, loads the persisted state, binds the control socket, and
//! hands everything to the event loop on a current-thread runtime. The
//! loop owns all state; every other task only moves bytes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use powerd_core::auth::UidAuthorizer;
use powerd_core::events::plugin_event_channel;
use powerd_core::store::{default_state_path, StateStore};
use powerd_daemon::plugins;
use powerd_daemon::protocol::{default_socket_path, ProtocolServer};
use powerd_daemon::service::{Daemon, DaemonEvent};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// powerd - power profile arbitration daemon
#[derive(Parser, Debug)]
#[command(name = "powerd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the control socket
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Path to the persisted state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Show extra debugging information
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build runtime: {err}");
            return ExitCode::FAILURE;
        },
    };

    ExitCode::from(runtime.block_on(run(args)))
}

async fn run(args: Args) -> u8 {
    info!("starting powerd {}", powerd_daemon::version());

    let store = StateStore::load(args.state_file.unwrap_or_else(default_state_path));

    let socket_path = args.socket.unwrap_or_else(default_socket_path);
    let server = match ProtocolServer::bind(&socket_path) {
        Ok(server) => server,
        Err(err) => {
            error!("{err}");
            return 1;
        },
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (plugin_events, mut plugin_rx) = plugin_event_channel();

    // Bridge plugin events into the loop's single channel.
    let bridge = events_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = plugin_rx.recv().await {
            if bridge.send(DaemonEvent::Plugin(event)).is_err() {
                break;
            }
        }
    });

    spawn_signal_handler(SignalKind::interrupt(), events_tx.clone());
    spawn_signal_handler(SignalKind::terminate(), events_tx.clone());

    tokio::spawn(server.serve(events_tx));

    let mut daemon = Daemon::new(
        store,
        plugins::default_registry(),
        plugin_events,
        Box::new(UidAuthorizer::new()),
    );
    if let Err(err) = daemon.start() {
        error!("exiting: {err}");
        return 1;
    }

    daemon.run(events_rx).await
}

fn spawn_signal_handler(kind: SignalKind, events: mpsc::UnboundedSender<DaemonEvent>) {
    tokio::spawn(async move {
        let mut stream = match signal(kind) {
            Ok(stream) => stream,
            Err(err) => {
                error!("cannot install signal handler: {err}");
                return;
            },
        };
        if stream.recv().await.is_some() {
            let _ = events.send(DaemonEvent::Shutdown);
        }
    });
}
