use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use chaos_mesh::config::load_config;
use chaos_mesh::daemon::GrpcDaemonConnector;
use chaos_mesh::dns::{DnsClient, GrpcDnsClient, DNS_GRPC_PORT};
use chaos_mesh::faultserver::GrpcFaultServerConnector;
use chaos_mesh::{init_global_logger, ChaosController, ClusterStore, KubeStore, LogEventRecorder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // =========================================================================
    // CONFIGURATION
    // =========================================================================
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref()).context("loading controller configuration")?;

    // =========================================================================
    // LOGGING - MUST COME BEFORE ANY log::* CALL
    // =========================================================================
    let collector = init_global_logger(log::LevelFilter::Info, config.log_dir.as_deref())
        .context("installing the log collector")?;
    log::info!("[Main] chaos-controller-manager {} starting", chaos_mesh::VERSION);

    // =========================================================================
    // CLUSTER AND RPC CLIENTS
    // =========================================================================
    let store: Arc<dyn ClusterStore> = Arc::new(
        KubeStore::try_default()
            .await
            .context("connecting to the Kubernetes API")?,
    );
    let daemons = Arc::new(GrpcDaemonConnector::new(
        Arc::clone(&store),
        config.chaos_daemon_port,
        config.rpc_timeout(),
    ));
    let fault_servers = Arc::new(GrpcFaultServerConnector::new(config.rpc_timeout()));
    if config.dns_server_address.is_empty() {
        log::warn!("[Main] No chaos DNS service configured; DNS chaos will fail to apply");
    }
    let dns: Arc<dyn DnsClient> = Arc::new(GrpcDnsClient::new(
        format!("{}:{}", config.dns_server_address, DNS_GRPC_PORT),
        config.rpc_timeout(),
    ));

    let controller = ChaosController::from_config(
        &config,
        Arc::clone(&store),
        daemons,
        fault_servers,
        dns,
        Arc::new(LogEventRecorder::default()),
    )
    .context("building the controller")?;

    // =========================================================================
    // SHUTDOWN SIGNALS
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut terminate = signal(SignalKind::terminate()).context("installing the SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("[Main] SIGINT received"),
            _ = terminate.recv() => log::info!("[Main] SIGTERM received"),
        }
        let _ = shutdown_tx.send(true);
    });

    let result = controller.run(shutdown_rx).await;

    log::info!("[Main] Shut down");
    if let Err(e) = collector.flush_blocking() {
        eprintln!("[Main] WARNING: Failed to flush logs: {}", e);
    }
    result.context("controller loop")
}
