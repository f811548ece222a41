// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon wiring and HTTP server
//!
//! Builds repositories, the bus, the delivery gateway and every application
//! service from the loaded configuration, registers all bus consumers and
//! then serves the HTTP API until SIGTERM / Ctrl+C.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use fabric_core::application::{
    create_repositories, ArgoStatusReconciler, AuthConfigService, CentralEventProcessor, Collaborators,
    DexSecretWriter, StandardAuthConfigService, StandardGitWebhookService, StandardGlobalTagService,
    StandardSsoLoginService, StandardTriggerAuditService, StandardWorkflowEventPublisher, WorkflowEventProcessor,
};
use fabric_core::domain::config::{FabricConfigManifest, HttpConfig};
use fabric_core::domain::repository::{PostgresConfig, StorageBackend};
use fabric_core::infrastructure::crypto::{SecretClassifier, SecretSanitizer};
use fabric_core::infrastructure::db::Database;
use fabric_core::infrastructure::pubsub::{DeliverySettings, InMemoryPubSub, TopicRegistry};
use fabric_core::infrastructure::{ConfigEnforcer, DeliveryGateway, KubernetesSecretStore};
use fabric_core::presentation::api::{self, AppState};

pub async fn start_daemon(config_path: Option<PathBuf>, port_override: Option<u16>) -> Result<()> {
    info!("Fabric daemon starting (PID: {})", std::process::id());

    let config = FabricConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;
    info!(name = %config.metadata.name, "Configuration loaded");

    install_metrics_exporter(&spec.http);

    // Persistence
    let database = Database::from_config(&spec.database)
        .await
        .context("Failed to connect to database")?;
    let (backend, pool) = match (&database, &spec.database.url) {
        (Some(db), Some(url)) => (
            StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: url.clone(),
            }),
            Some(db.get_pool().clone()),
        ),
        _ => {
            warn!("No database configured, state is kept in memory only");
            (StorageBackend::InMemory, None)
        }
    };
    let repositories = create_repositories(&backend, pool);

    // Bus and collaborators
    let bus = Arc::new(InMemoryPubSub::new(
        TopicRegistry::default(),
        DeliverySettings::from(&spec.bus),
    ));
    let gateway = Arc::new(
        DeliveryGateway::from_config(&spec.delivery_gateway, spec.security.api_token.clone())
            .context("Failed to build delivery gateway client")?,
    );
    let collaborators = Collaborators::from_gateway(gateway);

    // Global configuration services
    let auth_config = Arc::new(StandardAuthConfigService::new(repositories.auth_configs.clone()));
    if let Err(e) = auth_config.reload_cache().await {
        warn!(error = %e, "Initial auth config cache load failed");
    }
    let secret_store =
        Arc::new(KubernetesSecretStore::from_config(&spec.dex).context("Failed to build Kubernetes client")?);
    let sso = Arc::new(StandardSsoLoginService::new(
        repositories.sso_logins.clone(),
        auth_config.clone(),
        DexSecretWriter::new(secret_store, &spec.dex),
        collaborators.oidc_listener.clone(),
    ));
    let global_tags = Arc::new(StandardGlobalTagService::new(repositories.global_tags.clone()));
    let publisher = Arc::new(StandardWorkflowEventPublisher::new(
        bus.clone(),
        repositories.cd_workflows.clone(),
        collaborators.installed_apps.clone(),
    ));
    let git_webhooks = Arc::new(StandardGitWebhookService::new(repositories.git_hosts.clone(), publisher));
    if spec.security.api_token.is_none() {
        warn!("No api token configured, trigger audit snapshots are disabled");
    }
    let trigger_audits = Arc::new(StandardTriggerAuditService::new(
        repositories.workflow_snapshots.clone(),
        SecretSanitizer::new(SecretClassifier::from_config(&spec.security)),
        spec.security.api_token.clone(),
    ));

    // Consumers
    let workflow_events = Arc::new(WorkflowEventProcessor::new(
        bus.clone(),
        &repositories,
        collaborators.clone(),
    ));
    let argo_status = Arc::new(ArgoStatusReconciler::new(bus.clone(), &repositories, collaborators));
    CentralEventProcessor::new(workflow_events, argo_status)
        .subscribe_all()
        .await
        .context("Failed to register bus consumers")?;
    info!("All bus consumers registered");

    let app = api::app(AppState {
        auth_config,
        sso,
        global_tags,
        git_webhooks,
        trigger_audits,
        enforcer: Arc::new(ConfigEnforcer::from_config(&spec.rbac)),
        start_time: Instant::now(),
    });

    let port = port_override.unwrap_or(spec.http.port);
    let addr = format!("{}:{}", spec.http.bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Daemon shutting down, draining bus consumers");
    bus.close().await;

    Ok(())
}

fn install_metrics_exporter(http: &HttpConfig) {
    let addr: SocketAddr = match format!("{}:{}", http.bind_address, http.metrics_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, "Invalid metrics listen address, metrics disabled");
            return;
        }
    };
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!("Prometheus metrics exposed on {}", addr),
        Err(e) => warn!(error = %e, "Failed to install Prometheus exporter"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
