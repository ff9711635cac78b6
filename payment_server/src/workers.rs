//! Background workers started alongside the HTTP server.
use std::{sync::Arc, time::Duration};

use log::*;
use payment_engine::{
    events::{Handler, OrderSettledEvent},
    ledger::LedgerClient,
    traits::{PaymentGatewayDatabase, StorageBackend},
    ReceiptApi,
};
use tokio::task::JoinHandle;

use crate::routes::Engine;

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// Start the ledger event listener. Payments observed on-chain are fed into the
/// reconciliation engine without waiting for a client notification.
///
/// Do not await the returned JoinHandle, as it runs indefinitely: if the subscription
/// ever ends, the worker re-arms it.
pub fn start_ledger_listener<L: LedgerClient>(ledger: L, engine: Engine<L>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🕰️ Ledger payment listener started");
        loop {
            match ledger.subscribe().await {
                Ok(events) => {
                    engine.listen(events).await;
                    warn!("🕰️ The payment event stream ended. Re-subscribing.");
                },
                Err(e) => {
                    warn!("🕰️ Could not subscribe to payment events ({e}). Retrying in {RESUBSCRIBE_DELAY:?}.");
                },
            }
            tokio::time::sleep(RESUBSCRIBE_DELAY).await;
        }
    })
}

/// The order-settled hook that mints a receipt for every newly settled order.
///
/// Issuance is idempotent, so replayed events and manual re-issuance are harmless.
pub fn receipt_issuance_hook<B, L, S>(api: ReceiptApi<B, L, S>) -> Handler<OrderSettledEvent>
where
    B: PaymentGatewayDatabase,
    L: LedgerClient,
    S: StorageBackend,
{
    Arc::new(move |event: OrderSettledEvent| {
        let api = api.clone();
        Box::pin(async move {
            let order_id = event.order.order_id.clone();
            match api.issue(&order_id).await {
                Ok(receipt) => info!("🕰️ Receipt token {} issued for order {order_id}", receipt.token_id),
                Err(e) => error!("🕰️ Could not issue a receipt for order {order_id}: {e}"),
            }
        })
    })
}

#[cfg(test)]
mod test {
    use opg_common::Money;
    use payment_engine::{
        db_types::{NewOrder, OrderId, PaymentStatus, TokenAddress, TxHash, WalletAddress},
        events::{EventHandlers, EventHooks},
        exchange::ExchangeRate,
        test_utils::{new_test_database, MemoryLedger},
        traits::{ExchangeRates, PaymentGatewayDatabase},
    };

    use super::*;
    use crate::{config::ServerConfig, server::build_engine};

    const ONE_TOKEN: i128 = 1_000_000_000_000_000_000;

    #[tokio::test]
    async fn listener_rearms_after_the_event_stream_closes() {
        let _ = env_logger::try_init();
        let db = new_test_database().await;
        // Pause only after the database has connected under real time: with the clock
        // paused, tokio auto-advances past the pool's acquire timeout during connect.
        tokio::time::pause();
        db.set_rate(&ExchangeRate::new(TokenAddress::native(), Money::from(25_000), None)).await.unwrap();
        let ledger = MemoryLedger::default();
        let mut config = ServerConfig::new("127.0.0.1", 0);
        config.payment_contract = WalletAddress::from(MemoryLedger::PAYMENT_CONTRACT);
        config.min_confirmations = 1;
        let handlers = EventHandlers::new(10, EventHooks::default());
        let producers = handlers.producers();
        handlers.start();
        let engine = build_engine(&config, db.clone(), ledger.clone(), producers);
        let worker = start_ledger_listener(ledger.clone(), engine);

        for _ in 0..100 {
            if ledger.subscriber_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ledger.subscriber_count(), 1, "the listener never took its first subscription");

        // Sever the stream. The worker must come back for a fresh subscription.
        ledger.drop_subscribers();
        for _ in 0..100 {
            if ledger.subscriber_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert_eq!(ledger.subscriber_count(), 1, "the listener did not re-arm after the stream closed");

        // A payment observed on the new stream still settles its order.
        let order =
            NewOrder::new(OrderId::from("oid-9".to_string()), "cust-1".to_string(), Money::from(1_000_000));
        db.insert_order(order).await.unwrap();
        ledger.insert_receipt(ledger.payment_receipt("0xlate", 10, "0xalice", "native", 40 * ONE_TOKEN, "oid-9"));
        ledger.set_height(20);
        ledger.emit("0xlate", "oid-9", "0xalice", "native", 40 * ONE_TOKEN).await;
        let mut settled = None;
        for _ in 0..100 {
            let order = db.fetch_order_by_order_id(&OrderId::from("oid-9".to_string())).await.unwrap().unwrap();
            if order.payment_status == PaymentStatus::Completed {
                settled = Some(order);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let settled = settled.expect("the payment on the re-armed stream was not settled");
        assert_eq!(settled.settled_tx, Some(TxHash::from("0xlate")));
        worker.abort();
    }
}
