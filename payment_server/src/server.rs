use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    ledger::{LedgerClient, RpcLedgerClient},
    storage::{HttpContentStore, LocalContentStore},
    verifier::TransactionVerifier,
    OrderManagementApi,
    ReceiptApi,
    ReconciliationEngine,
    SettlementApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    routes::{health, Engine, NotifyPaymentRoute, OrderByIdRoute, OrderFailuresRoute, OrderReceiptRoute},
    workers::{receipt_issuance_hook, start_ledger_listener},
};

const EVENT_BUFFER_SIZE: usize = 100;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let ledger =
        RpcLedgerClient::new(config.node_url.clone(), config.payment_contract.clone(), config.poll_interval);

    let mut hooks = EventHooks::default();
    if !config.disable_receipts {
        match &config.storage_url {
            Some(url) => {
                info!("💻️ Receipt metadata goes to the content store at {url}");
                let mut storage = HttpContentStore::new(url.clone());
                if let Some(key) = &config.storage_api_key {
                    storage = storage.with_api_key(key.clone());
                }
                let api = ReceiptApi::new(db.clone(), ledger.clone(), storage, config.receipt_contract.clone());
                hooks.on_order_settled(receipt_issuance_hook(api));
            },
            None => {
                let storage = LocalContentStore::default();
                let api = ReceiptApi::new(db.clone(), ledger.clone(), storage, config.receipt_contract.clone());
                hooks.on_order_settled(receipt_issuance_hook(api));
            },
        }
    }
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start();

    let engine = build_engine(&config, db.clone(), ledger.clone(), producers);
    start_ledger_listener(ledger, engine.clone());
    let srv = create_server_instance(config, db, engine)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn build_engine<L: LedgerClient>(
    config: &ServerConfig,
    db: SqliteDatabase,
    ledger: L,
    producers: EventProducers,
) -> Engine<L> {
    let verifier = TransactionVerifier::new(ledger, config.payment_contract.clone(), config.min_confirmations);
    let settlement = SettlementApi::new(db.clone(), db.clone(), config.tokens.clone());
    ReconciliationEngine::new(verifier, settlement, db, config.retry_policy, producers)
}

pub fn create_server_instance<L: LedgerClient>(
    config: ServerConfig,
    db: SqliteDatabase,
    engine: Engine<L>,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderManagementApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("opg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(engine.clone()))
            .service(health)
            .service(NotifyPaymentRoute::<L>::new())
            .service(OrderByIdRoute::new())
            .service(OrderReceiptRoute::new())
            .service(OrderFailuresRoute::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    info!("💻️ Server is running on {host}:{port}");
    Ok(srv)
}
