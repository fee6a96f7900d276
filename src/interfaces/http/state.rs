use super::auth::JwtConfig;
use crate::application::coordinator::SettlementCoordinator;
use crate::application::escrow::EscrowManager;
use crate::application::gateway::PaymentGateway;
use std::sync::Arc;

/// Shared application state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SettlementCoordinator>,
    pub gateway: Arc<PaymentGateway>,
    pub jwt: Arc<JwtConfig>,
}

impl AppState {
    pub fn new(coordinator: SettlementCoordinator, gateway: PaymentGateway, jwt: JwtConfig) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            gateway: Arc::new(gateway),
            jwt: Arc::new(jwt),
        }
    }

    pub fn escrow(&self) -> &EscrowManager {
        self.coordinator.escrow()
    }
}
