/*
 * Responsibility
 * - Shared handler context (AppState) attached to the Router
 * - Clone is cheap: everything behind Arc
 */
use std::sync::Arc;

use crate::repos::UserStore;
use crate::services::health::HealthProbe;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub health: Arc<HealthProbe>,
}

impl AppState {
    pub fn new(users: Arc<dyn UserStore>, health: Arc<HealthProbe>) -> Self {
        Self { users, health }
    }
}
