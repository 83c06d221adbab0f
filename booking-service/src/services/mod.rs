pub mod assignment;
pub mod cancellation;
pub mod commission;
pub mod gateway;
pub mod lifecycle;
pub mod metrics;
pub mod notifier;
pub mod repository;
pub mod settlement;
pub mod wallet;

pub use assignment::AssignmentGate;
pub use gateway::GatewayClient;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::Notifier;
pub use repository::BookingRepository;
pub use settlement::SettlementEngine;
pub use wallet::WalletLedger;
