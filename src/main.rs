//! MySQL Restore Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client, starts
//! the watches that feed the local caches, and runs the restore controller.

use std::sync::{Arc, OnceLock};

use k8s_openapi::api::core::v1::Pod;
use kube::{runtime::watcher::Config as WatcherConfig, Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mysql_restore_operator::{
    adapters::{
        informer, KubeConditionUpdater, KubeEventRecorder, KubeRestoreWriter, ReflectorStore,
    },
    config::OperatorConfig,
    controllers::RestoreController,
    crd::{MySqlBackup, MySqlCluster, MySqlRestore},
    metrics,
    reconcilers::restore::RestoreReconciler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = OperatorConfig::from_env()?;
    info!(?config, "Starting MySQL Restore Operator");

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let shutdown = CancellationToken::new();
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, shutdown.clone()));

    // The reconciler needs the stores and the stores need the add handler;
    // the watches are only polled once the controller has been stored.
    let controller_slot: Arc<OnceLock<Arc<RestoreController>>> = Arc::new(OnceLock::new());
    let admit = {
        let slot = controller_slot.clone();
        move |restore: &MySqlRestore| match slot.get() {
            Some(controller) => {
                controller.on_add(restore);
            }
            None => warn!("Restore observed before controller was ready"),
        }
    };

    let (restores, restore_watch) =
        informer(api(&client, &config), WatcherConfig::default(), admit);
    let (clusters, cluster_watch) = watch_only::<MySqlCluster>(&client, &config);
    let (backups, backup_watch) = watch_only::<MySqlBackup>(&client, &config);
    let (pods, pod_watch) = informer(
        api::<Pod>(&client, &config),
        WatcherConfig::default().labels(mysql_restore_operator::crd::ROLE_LABEL),
        |_: &Pod| {},
    );

    let reconciler = RestoreReconciler {
        restores: Arc::new(restores),
        clusters: Arc::new(clusters),
        backups: Arc::new(backups),
        pods: Arc::new(pods),
        writer: Arc::new(KubeRestoreWriter::new(client.clone())),
        conditions: Arc::new(KubeConditionUpdater::new(client.clone())),
        recorder: Arc::new(KubeEventRecorder::new(client.clone())),
    };
    let controller = Arc::new(RestoreController::new(reconciler, &config));
    let _ = controller_slot.set(controller.clone());

    let watches = tokio::spawn(async move {
        futures::join!(restore_watch, cluster_watch, backup_watch, pod_watch);
    });

    let mut run = tokio::spawn(controller.run(shutdown.clone(), config.workers));

    let result = tokio::select! {
        res = &mut run => controller_result(res),
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
            shutdown.cancel();
            controller_result(run.await)
        }
    };

    // Stop the metrics server and the watches.
    shutdown.cancel();
    watches.abort();
    if let Ok(Err(e)) = metrics_handle.await {
        error!(error = %e, "Metrics server failed");
    }

    info!("MySQL Restore Operator stopped");
    result
}

fn controller_result(
    res: Result<mysql_restore_operator::Result<()>, tokio::task::JoinError>,
) -> anyhow::Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.is_shutdown() => {
            info!("Stopped before caches synced");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Restore controller failed");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn api<K>(client: &Client, config: &OperatorConfig) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match &config.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn watch_only<K>(
    client: &Client,
    config: &OperatorConfig,
) -> (ReflectorStore<K>, futures::future::BoxFuture<'static, ()>)
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug
        + Send
        + Sync
        + 'static,
{
    informer(api(client, config), WatcherConfig::default(), |_: &K| {})
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
