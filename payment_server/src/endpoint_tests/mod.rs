use std::time::Duration;

use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use opg_common::Money;
use payment_engine::{
    db_types::{NewOrder, OrderId, TokenAddress, WalletAddress},
    events::{EventHandlers, EventHooks, EventProducers},
    exchange::ExchangeRate,
    storage::LocalContentStore,
    test_utils::{new_test_database, MemoryLedger},
    traits::{ExchangeRates, PaymentGatewayDatabase},
    OrderManagementApi,
    ReceiptApi,
    RetryPolicy,
    SqliteDatabase,
};
use serde_json::{json, Value};

use crate::{
    config::ServerConfig,
    routes::{health, Engine, NotifyPaymentRoute, OrderByIdRoute, OrderFailuresRoute, OrderReceiptRoute},
    server::build_engine,
    workers::receipt_issuance_hook,
};

const ONE_TOKEN: i128 = 1_000_000_000_000_000_000;

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::new("127.0.0.1", 0);
    config.payment_contract = WalletAddress::from(MemoryLedger::PAYMENT_CONTRACT);
    config.receipt_contract = WalletAddress::from("0xreceipts");
    config.min_confirmations = 1;
    // A single attempt keeps "transaction never appears" tests from sleeping for real.
    config.retry_policy = RetryPolicy { max_attempts: 1, ..RetryPolicy::default() };
    config
}

struct TestContext {
    db: SqliteDatabase,
    ledger: MemoryLedger,
    engine: Engine<MemoryLedger>,
}

impl TestContext {
    async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    async fn with_producers(producers: EventProducers) -> Self {
        let _ = env_logger::try_init();
        let db = new_test_database().await;
        // $10.00 at 25,000 base units per whole token expects 40 tokens.
        db.set_rate(&ExchangeRate::new(TokenAddress::native(), Money::from(25_000), None)).await.unwrap();
        let ledger = MemoryLedger::default();
        let engine = build_engine(&test_config(), db.clone(), ledger.clone(), producers);
        Self { db, ledger, engine }
    }

    async fn insert_order(&self, order_id: &str, total: i64) {
        let order =
            NewOrder::new(OrderId::from(order_id.to_string()), "cust-1".to_string(), Money::from(total));
        self.db.insert_order(order).await.unwrap();
    }

    fn paid_receipt(&self, tx: &str, order_id: &str, amount: i128) {
        self.ledger.insert_receipt(self.ledger.payment_receipt(tx, 10, "0xalice", "native", amount, order_id));
        self.ledger.set_height(20);
    }

    async fn call(&self, req: TestRequest) -> (StatusCode, Value) {
        let app = App::new()
            .app_data(web::Data::new(OrderManagementApi::new(self.db.clone())))
            .app_data(web::Data::new(self.engine.clone()))
            .service(health)
            .service(NotifyPaymentRoute::<MemoryLedger>::new())
            .service(OrderByIdRoute::new())
            .service(OrderReceiptRoute::new())
            .service(OrderFailuresRoute::new());
        let service = test::init_service(app).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)))
        };
        (status, body)
    }

    async fn notify(&self, order_id: &str, tx: &str) -> (StatusCode, Value) {
        let req = TestRequest::post()
            .uri("/payments/notify")
            .set_json(json!({ "order_id": order_id, "tx_hash": tx }));
        self.call(req).await
    }
}

#[actix_web::test]
async fn health_check() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.call(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("👍️\n"));
}

#[actix_web::test]
async fn order_query_returns_the_stored_order() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    let (status, body) = ctx.call(TestRequest::get().uri("/orders/oid-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], "oid-1");
    assert_eq!(body["payment_status"], "Pending");
    assert_eq!(body["total_price"], 1_000_000);
}

#[actix_web::test]
async fn unknown_order_is_a_404() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.call(TestRequest::get().uri("/orders/oid-404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "OrderNotFound");
}

#[actix_web::test]
async fn notification_settles_a_paid_order() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    ctx.paid_receipt("0xaaa", "oid-1", 40 * ONE_TOKEN);
    let (status, body) = ctx.notify("oid-1", "0xaaa").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "Completed");
    assert_eq!(body["status"], "Confirmed");
    assert_eq!(body["settled_tx"], "0xaaa");
    assert_eq!(body["payer_address"], "0xalice");
    // The order view reflects settlement.
    let (_, order) = ctx.call(TestRequest::get().uri("/orders/oid-1")).await;
    assert_eq!(order["payment_status"], "Completed");
}

#[actix_web::test]
async fn notification_for_a_missing_transaction_exhausts_retries() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    let (status, body) = ctx.notify("oid-1", "0xmissing").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "RetriesExhausted");
}

#[actix_web::test]
async fn underpayment_is_rejected_with_a_structured_error() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    ctx.paid_receipt("0xaaa", "oid-1", 39 * ONE_TOKEN);
    let (status, body) = ctx.notify("oid-1", "0xaaa").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "InsufficientAmount");
    let (_, order) = ctx.call(TestRequest::get().uri("/orders/oid-1")).await;
    assert_eq!(order["payment_status"], "Pending");
}

#[actix_web::test]
async fn a_transaction_cannot_settle_two_orders() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    ctx.insert_order("oid-2", 1_000_000).await;
    ctx.paid_receipt("0xaaa", "oid-1", 40 * ONE_TOKEN);
    let (status, _) = ctx.notify("oid-1", "0xaaa").await;
    assert_eq!(status, StatusCode::OK);
    // Same transaction, different order: the receipt names oid-1, so this is a mismatch.
    let (status, body) = ctx.notify("oid-2", "0xaaa").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "OrderMismatch");
}

#[actix_web::test]
async fn failed_settlements_show_up_in_the_audit_trail() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    ctx.paid_receipt("0xaaa", "oid-1", 39 * ONE_TOKEN);
    let (status, _) = ctx.notify("oid-1", "0xaaa").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = ctx.call(TestRequest::get().uri("/orders/oid-1/failures")).await;
    assert_eq!(status, StatusCode::OK);
    let failures = body.as_array().expect("failures must be a JSON array");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["tx_hash"], "0xaaa");
}

#[actix_web::test]
async fn receipt_status_is_empty_until_minting_completes() {
    let ctx = TestContext::new().await;
    ctx.insert_order("oid-1", 1_000_000).await;
    let (status, body) = ctx.call(TestRequest::get().uri("/orders/oid-1/receipt")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "exists": false }));
}

#[actix_web::test]
async fn settlement_triggers_receipt_issuance_via_the_event_hook() {
    let _ = env_logger::try_init();
    // Wire the receipt hook the way run_server does, against the in-memory ledger.
    let db = new_test_database().await;
    db.set_rate(&ExchangeRate::new(TokenAddress::native(), Money::from(25_000), None)).await.unwrap();
    let ledger = MemoryLedger::default();
    let receipt_api = ReceiptApi::new(
        db.clone(),
        ledger.clone(),
        LocalContentStore::default(),
        WalletAddress::from("0xreceipts"),
    );
    let mut hooks = EventHooks::default();
    hooks.on_order_settled(receipt_issuance_hook(receipt_api));
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start();
    let engine = build_engine(&test_config(), db.clone(), ledger.clone(), producers);
    let ctx = TestContext { db, ledger, engine };

    ctx.insert_order("oid-1", 1_000_000).await;
    ctx.paid_receipt("0xaaa", "oid-1", 40 * ONE_TOKEN);
    let (status, _) = ctx.notify("oid-1", "0xaaa").await;
    assert_eq!(status, StatusCode::OK);

    // Issuance runs on the event handler task; poll the receipt endpoint briefly.
    let mut receipt = Value::Null;
    for _ in 0..50 {
        let (_, body) = ctx.call(TestRequest::get().uri("/orders/oid-1/receipt")).await;
        if body["exists"] == json!(true) {
            receipt = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(receipt["token_id"], "receipt-1");
    assert_eq!(receipt["tx_hash"], "0xmint-1");
    assert!(receipt["metadata_uri"].as_str().unwrap().starts_with("local://"));
}
