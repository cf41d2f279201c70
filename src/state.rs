// src/state.rs

use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;

use crate::{
    config::Config,
    ports::{
        Clock, ExamStore, KeyValueStore, LedgerStore, Notifier, PaymentGateway, PaymentStore,
        UserStore,
    },
    services::{
        attempts::AttemptService,
        catalog::Catalog,
        ledger::Ledger,
        sessions::SessionTokens,
        settlement::{Settlement, SigningSecrets},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub settlement: Settlement,
    pub attempts: AttemptService,
    pub sessions: SessionTokens,
    pub catalog: Catalog,
}

impl AppState {
    /// Wires every service onto one store that implements all storage ports.
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: LedgerStore + PaymentStore + UserStore + ExamStore + KeyValueStore + 'static,
    {
        let ledger = Ledger::new(store.clone());
        let settlement = Settlement::new(
            store.clone(),
            store.clone(),
            gateway,
            notifier.clone(),
            SigningSecrets::from(&config.razorpay),
        );
        let attempts = AttemptService::new(store.clone(), clock.clone());
        let sessions = SessionTokens::new(
            store.clone(),
            Duration::from_secs(config.magic_link_expiry),
            Duration::from_secs(config.portal_session_ttl),
            Duration::from_secs(config.login_throttle),
        );
        let catalog = Catalog::new(store.clone(), store.clone(), ledger);

        Self {
            config,
            users: store,
            notifier,
            clock,
            settlement,
            attempts,
            sessions,
            catalog,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Settlement {
    fn from_ref(state: &AppState) -> Self {
        state.settlement.clone()
    }
}

impl FromRef<AppState> for Catalog {
    fn from_ref(state: &AppState) -> Self {
        state.catalog.clone()
    }
}
