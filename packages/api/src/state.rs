use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use loyalty_hub_ledger::{
    CouponCatalog, DynAuditSink, LedgerConfig, LedgerStore, ReceiptService, RedemptionLedger,
};
use loyalty_hub_types::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};

use crate::middleware::error_reporting::ErrorSink;
use crate::store::{PostgresAuditSink, PostgresLedgerStore};

pub type AppState = Arc<State>;

/// Role claim of a bearer token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    Customer,
    ShopOwner,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: TokenRole,
    /// Shops a shop owner manages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shops: Vec<String>,
    /// Set by the hosted identity provider instead of the internal user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub exp: usize,
}

/// POS terminal resolved from an `x-api-key`
#[derive(Clone, Debug)]
pub struct CachedTerminal {
    pub terminal_id: String,
    pub shop_id: String,
    pub valid_until: Option<NaiveDateTime>,
}

#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    pub url: String,
    pub max_connections: u32,
    pub sql_logging: bool,
}

pub async fn connect_database(options: &DatabaseOptions) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(options.url.to_owned());
    opt.max_connections(options.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(options.sql_logging);

    Database::connect(opt).await
}

pub struct State {
    pub db: DatabaseConnection,
    pub ledger: RedemptionLedger,
    pub receipts: ReceiptService,
    pub catalog: CouponCatalog,
    pub error_sink: ErrorSink,
    decoding_key: DecodingKey,
    validation: Validation,
    /// Terminal cache: blake3(api key) -> terminal
    /// Short TTL (240s) to balance security vs performance
    pub terminal_cache: moka::sync::Cache<String, CachedTerminal>,
}

impl State {
    pub fn new(
        db: DatabaseConnection,
        store: Arc<dyn LedgerStore>,
        audit: DynAuditSink,
        ledger_config: LedgerConfig,
        jwt_secret: &str,
        error_sink: ErrorSink,
    ) -> Self {
        let ledger = RedemptionLedger::new(store.clone(), audit.clone(), ledger_config.clone());
        let receipts = ReceiptService::new(store, audit, ledger_config.store_timeout);
        let catalog = ledger.catalog();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        tracing::info!(
            backend = ledger.store().backend_name(),
            code_attempts = ledger_config.code_attempts,
            validity_secs = ledger_config.validity.num_seconds(),
            "Ledger ready"
        );

        Self {
            db,
            ledger,
            receipts,
            catalog,
            error_sink,
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
            terminal_cache: moka::sync::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(240))
                .build(),
        }
    }

    /// Production wiring: ledger and audit trail both on PostgreSQL.
    pub fn postgres(
        db: DatabaseConnection,
        ledger_config: LedgerConfig,
        jwt_secret: &str,
        error_sink: ErrorSink,
    ) -> Self {
        let shared = Arc::new(db.clone());
        let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(shared.clone()));
        let audit: DynAuditSink = Arc::new(PostgresAuditSink::new(shared));
        Self::new(db, store, audit, ledger_config, jwt_secret, error_sink)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(decoded.claims)
    }
}
