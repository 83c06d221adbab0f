pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{
    metrics::metrics_middleware, request_id::request_id_middleware,
    security_headers::security_headers_middleware,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{
    AssignmentGate, BookingRepository, GatewayClient, Notifier, SettlementEngine, WalletLedger,
};

#[derive(Clone)]
pub struct AppState {
    pub db: mongodb::Database,
    pub config: Config,
    pub repository: BookingRepository,
    pub wallet: WalletLedger,
    pub gateway: GatewayClient,
    pub notifier: Notifier,
    pub assignment: AssignmentGate,
    pub settlement: SettlementEngine,
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    db: mongodb::Database,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some("booking-service".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = BookingRepository::new(&db);
        let wallet = WalletLedger::new(&db);
        repository.init_indexes().await?;
        wallet.init_indexes().await?;

        let gateway = GatewayClient::new(config.gateway.clone());
        if gateway.is_configured() {
            tracing::info!("Payment gateway client initialized");
        } else {
            tracing::warn!("Gateway credentials not configured - payment features will be limited");
        }

        let notifier = Notifier::new(config.notifier.clone());
        services::init_metrics();

        let assignment = AssignmentGate::new(repository.clone(), wallet.clone());
        let settlement = SettlementEngine::new(repository.clone(), wallet.clone(), gateway.clone());

        let state = AppState {
            db: db.clone(),
            config: config.clone(),
            repository,
            wallet,
            gateway,
            notifier,
            assignment,
            settlement,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/metrics", get(handlers::metrics))
            // Booking lifecycle
            .route("/bookings", post(handlers::bookings::create_booking))
            .route("/bookings/:id", get(handlers::bookings::get_booking))
            .route("/bookings/:id/assign", post(handlers::bookings::assign_partner))
            .route("/bookings/:id/start", post(handlers::bookings::start_service))
            .route(
                "/bookings/:id/complete",
                post(handlers::bookings::complete_service),
            )
            .route("/bookings/:id/cancel", post(handlers::bookings::cancel_booking))
            .route("/bookings/:id/rating", post(handlers::bookings::rate_booking))
            // Wallet and gateway
            .route("/wallet/recharge", post(handlers::payments::recharge))
            .route(
                "/wallet/:customer_id/transactions",
                get(handlers::payments::list_wallet_transactions),
            )
            .route("/payments/verify", post(handlers::payments::verify_payment))
            .route("/webhooks/razorpay", post(handlers::payments::webhook))
            .route(
                "/transactions/:id",
                get(handlers::payments::get_transaction),
            )
            .layer(from_fn(security_headers_middleware))
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        // Port 0 binds a random free port, which the tests rely on.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            db,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &mongodb::Database {
        &self.db
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on port {}", self.port);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
