use anyhow::{Context, Result};
use charge_manager::api::{create_router, AppState};
use charge_manager::config::{new_engine_config, AppConfig};
use charge_manager::scheduler::ChargingScheduler;
use charge_manager::service::ChargingService;
use charge_manager::sources::token::OAuthClient;
use charge_manager::sources::{IoniqSource, TeslaSource, TokenManager, VehicleSource};
use charge_manager::store::{error_sink, Database, ErrorSink};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charge_manager=info".into()),
        )
        .init();

    info!("Charge manager starting...");

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if !config.tesla.enabled && !config.tesla.mock_mode {
        warn!("Primary vehicle API disabled, using mock readings");
        config.tesla.mock_mode = true;
    }
    info!(
        host = %config.server.host,
        port = config.server.port,
        mock_mode = config.tesla.mock_mode,
        charge_threshold = config.engine.charge_threshold,
        minimum_charge = config.engine.minimum_charge,
        update_interval_minutes = config.scheduler.update_interval_minutes,
        "Configuration loaded"
    );

    let db = Arc::new(
        Database::open(&config.database.path).context("Failed to initialize database")?,
    );
    let (errors, error_writer) = ErrorSink::spawn(Arc::clone(&db), error_sink::DEFAULT_CAPACITY);

    let http_client = reqwest::Client::new();

    // Primary vehicle. Live auth failure falls back to mock readings.
    let tokens = if config.tesla.mock_mode {
        None
    } else {
        let oauth = OAuthClient {
            token_url: config.tesla.token_url.clone(),
            client_id: config.tesla.client_id.clone(),
            client_secret: config.tesla.client_secret.clone(),
        };
        match TokenManager::load(
            "tesla",
            oauth,
            http_client.clone(),
            config.tesla.refresh_token.as_deref(),
            Some(Arc::clone(&db)),
        ) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(error = %e, "No vehicle API credentials");
                None
            }
        }
    };
    let tesla = Arc::new(TeslaSource::new(config.tesla.clone(), http_client.clone(), tokens));
    if let Err(e) = tesla.authenticate().await {
        error!(error = %e, "Vehicle API authentication failed, continuing in mock mode");
        errors.report("tesla", e.error_type(), e.to_string());
        tesla.set_mock_mode(true);
    }

    let secondary: Option<Arc<dyn VehicleSource>> = if config.ioniq.enabled {
        let ioniq = IoniqSource::new(&config.ioniq);
        ioniq.authenticate().await?;
        info!(vehicle = %ioniq.name(), "Secondary vehicle enabled");
        Some(Arc::new(ioniq))
    } else {
        None
    };

    let engine = new_engine_config(config.engine);
    let service = Arc::new(
        ChargingService::new(
            tesla,
            secondary,
            engine,
            Arc::clone(&db),
            Arc::new(charge_manager::notify::Notifier::new()),
            errors.clone(),
        )
        .with_max_reading_age(chrono::Duration::minutes(config.scheduler.max_reading_age_minutes)),
    );

    let scheduler = Arc::new(ChargingScheduler::new(
        Arc::clone(&service),
        config.scheduler.clone(),
    ));
    scheduler.start();

    let router = create_router(AppState {
        service: Arc::clone(&service),
        scheduler: Arc::clone(&scheduler),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Dashboard listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    scheduler.stop();
    futures::future::join_all(service.sources().map(|source| source.close())).await;
    server_handle.abort();
    error_writer.abort();

    info!("Charge manager stopped");
    Ok(())
}
