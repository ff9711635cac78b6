use std::{collections::HashMap, sync::Arc};

use log::*;
use tokio::{
    sync::{mpsc, watch, Mutex},
    time::sleep,
};

use super::{ReconciliationError, RequestOutcome, RetryPolicy, VerificationRequest};
use crate::{
    db_types::{OrderId, TxHash},
    events::{EventProducers, OrderSettledEvent, SettlementFailedEvent},
    ledger::{LedgerClient, PaymentEvent},
    settlement::SettlementApi,
    traits::{ExchangeRates, PaymentGatewayDatabase, SettledOrder},
    verifier::{TransactionVerifier, VerificationResult},
};

type RequestKey = (OrderId, TxHash);
type OutcomeReceiver = watch::Receiver<Option<RequestOutcome>>;

pub struct ReconciliationEngine<B, R, L> {
    verifier: TransactionVerifier<L>,
    settlement: SettlementApi<B, R>,
    db: B,
    policy: RetryPolicy,
    producers: EventProducers,
    in_flight: Arc<Mutex<HashMap<RequestKey, OutcomeReceiver>>>,
}

impl<B: Clone, R: Clone, L: Clone> Clone for ReconciliationEngine<B, R, L> {
    fn clone(&self) -> Self {
        Self {
            verifier: self.verifier.clone(),
            settlement: self.settlement.clone(),
            db: self.db.clone(),
            policy: self.policy,
            producers: self.producers.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<B, R, L> ReconciliationEngine<B, R, L>
where
    B: PaymentGatewayDatabase,
    R: ExchangeRates,
    L: LedgerClient,
{
    pub fn new(
        verifier: TransactionVerifier<L>,
        settlement: SettlementApi<B, R>,
        db: B,
        policy: RetryPolicy,
        producers: EventProducers,
    ) -> Self {
        Self { verifier, settlement, db, policy, producers, in_flight: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Drive a payment notification to its terminal outcome.
    ///
    /// Blocks until the (possibly coalesced) verification request settles the order or
    /// fails terminally. Transient errors are retried internally per the [`RetryPolicy`];
    /// the error returned here is always terminal for this request.
    pub async fn process(&self, order_id: OrderId, tx_hash: TxHash) -> Result<SettledOrder, ReconciliationError> {
        let mut outcome_rx = self.submit(order_id, tx_hash).await;
        let outcome =
            outcome_rx.wait_for(|o| o.is_some()).await.map_err(|_| ReconciliationError::Cancelled)?.clone();
        match outcome {
            Some(RequestOutcome::Settled(settled)) => Ok(settled),
            Some(RequestOutcome::Failed(e)) => Err(e),
            None => Err(ReconciliationError::Cancelled),
        }
    }

    /// Enqueue a verification request, coalescing with any in-flight request for the same
    /// `(order_id, tx_hash)` pair, and return a handle on its outcome.
    pub async fn submit(&self, order_id: OrderId, tx_hash: TxHash) -> OutcomeReceiver {
        let key = (order_id.clone(), tx_hash.clone());
        let mut in_flight = self.in_flight.lock().await;
        if let Some(existing) = in_flight.get(&key) {
            trace!("🔄️ Verification of {tx_hash} for order {order_id} is already in flight. Coalescing.");
            return existing.clone();
        }
        let (outcome_tx, outcome_rx) = watch::channel(None);
        in_flight.insert(key.clone(), outcome_rx.clone());
        drop(in_flight);
        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.run_request(order_id, tx_hash).await;
            engine.in_flight.lock().await.remove(&key);
            // Waiters hold their own receiver clones, so a send error just means nobody
            // is listening anymore.
            let _ = outcome_tx.send(Some(outcome));
        });
        outcome_rx
    }

    /// Consume payment events from a ledger subscription, enqueueing a verification
    /// request for each. Runs until the stream closes.
    pub async fn listen(&self, mut events: mpsc::Receiver<PaymentEvent>) {
        info!("🔄️ Payment event listener started.");
        while let Some(event) = events.recv().await {
            debug!("🔄️ Observed payment of {} for order {} in transaction {}", event.amount, event.order_id, event.tx_hash);
            let _ = self.submit(event.order_id, event.tx_hash).await;
        }
        info!("🔄️ Payment event stream closed. Listener shutting down.");
    }

    async fn run_request(&self, order_id: OrderId, tx_hash: TxHash) -> RequestOutcome {
        let mut request = VerificationRequest::new(order_id.clone(), tx_hash.clone());
        let outcome = loop {
            request.begin_attempt();
            match self.verifier.verify(&tx_hash, &order_id).await {
                Ok(payment) => break self.settle_verified(payment).await,
                Err(e) if e.is_retryable() => {
                    if request.attempts >= self.policy.max_attempts {
                        warn!(
                            "🔄️ Giving up on transaction {tx_hash} for order {order_id} after {} attempts: {e}",
                            request.attempts
                        );
                        break RequestOutcome::Failed(ReconciliationError::RetriesExhausted {
                            tx_hash: tx_hash.clone(),
                            attempts: request.attempts,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.policy.delay(request.attempts);
                    debug!(
                        "🔄️ Attempt {} to verify transaction {tx_hash} for order {order_id} failed ({e}). \
                         Retrying in {delay:?}.",
                        request.attempts
                    );
                    sleep(delay).await;
                },
                Err(e) => {
                    warn!("🔄️ Transaction {tx_hash} cannot settle order {order_id}: {e}");
                    self.record_failure(&order_id, &tx_hash, &e.to_string()).await;
                    break RequestOutcome::Failed(e.into());
                },
            }
        };
        request.complete(&outcome);
        trace!(
            "🔄️ Request for transaction {} on order {order_id} finished in state {:?} after {} attempts",
            request.tx_hash, request.state, request.attempts
        );
        outcome
    }

    async fn settle_verified(&self, payment: VerificationResult) -> RequestOutcome {
        match self.settlement.settle(&payment).await {
            Ok(settled) => {
                if settled.newly_settled {
                    self.producers.publish_order_settled(OrderSettledEvent::new(settled.order.clone())).await;
                }
                RequestOutcome::Settled(settled)
            },
            Err(e) => {
                warn!("🔄️ Settlement of order {} by transaction {} failed: {e}", payment.order_id, payment.tx_hash);
                if e.is_payment_mismatch() {
                    self.record_failure(&payment.order_id, &payment.tx_hash, &e.to_string()).await;
                }
                RequestOutcome::Failed(e.into())
            },
        }
    }

    async fn record_failure(&self, order_id: &OrderId, tx_hash: &TxHash, reason: &str) {
        if let Err(e) = self.db.record_settlement_failure(order_id, tx_hash, reason).await {
            error!("🔄️ Could not record the settlement failure for order {order_id} ({reason}): {e}");
        }
        self.producers
            .publish_settlement_failed(SettlementFailedEvent::new(order_id.clone(), tx_hash.clone(), reason.to_string()))
            .await;
    }
}
