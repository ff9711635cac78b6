//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST
//! go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are async all the way down: the payment notification handler in particular
//! parks on the reconciliation engine's outcome channel, which can span several retry
//! backoffs, and must never block a worker thread while it waits.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use payment_engine::{
    db_types::OrderId,
    ledger::LedgerClient,
    OrderManagementApi,
    ReconciliationEngine,
    SqliteDatabase,
};

use crate::{data_objects::{PaymentNotification, ReceiptStatus}, errors::ServerError};

/// The engine as wired by this server: SQLite for orders and rates, a pluggable ledger.
pub type Engine<L> = ReconciliationEngine<SqliteDatabase, SqliteDatabase, L>;

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

route!(notify_payment => Post "/payments/notify" impl LedgerClient);
route!(order_by_id => Get "/orders/{order_id}");
route!(order_receipt => Get "/orders/{order_id}/receipt");
route!(order_failures => Get "/orders/{order_id}/failures");

//----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------  Notify  -----------------------------------------------------
/// Route handler for the `POST /payments/notify` endpoint.
///
/// Drives the notified transaction through verification and settlement, waiting for the
/// terminal outcome. Duplicate notifications for an in-flight payment attach to the
/// existing request rather than starting a second one.
pub async fn notify_payment<TLedgerClient: LedgerClient>(
    engine: web::Data<Engine<TLedgerClient>>,
    body: web::Json<PaymentNotification>,
) -> Result<HttpResponse, ServerError> {
    let notification = body.into_inner();
    debug!(
        "💻️ Payment notification for order {} (tx {})",
        notification.order_id, notification.tx_hash
    );
    let settled = engine.process(notification.order_id, notification.tx_hash).await?;
    Ok(HttpResponse::Ok().json(settled.order))
}

//----------------------------------------------  Orders  -----------------------------------------------------
/// Route handler for the `GET /orders/{order_id}` endpoint.
pub async fn order_by_id(
    path: web::Path<String>,
    api: web::Data<OrderManagementApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

/// Route handler for the `GET /orders/{order_id}/receipt` endpoint.
///
/// A missing receipt on an existing order is not an error; it renders as
/// `{"exists": false}` because issuance is asynchronous.
pub async fn order_receipt(
    path: web::Path<String>,
    api: web::Data<OrderManagementApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    if api.fetch_order(&order_id).await?.is_none() {
        return Err(ServerError::NoRecordFound(format!("Order {order_id}")));
    }
    let status = api.fetch_receipt(&order_id).await?.map(ReceiptStatus::from).unwrap_or_else(ReceiptStatus::none);
    Ok(HttpResponse::Ok().json(status))
}

/// Route handler for the `GET /orders/{order_id}/failures` endpoint.
///
/// The settlement-failure audit trail for an order, oldest first. Meant for operators
/// reconciling mismatched payments by hand.
pub async fn order_failures(
    path: web::Path<String>,
    api: web::Data<OrderManagementApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    if api.fetch_order(&order_id).await?.is_none() {
        return Err(ServerError::NoRecordFound(format!("Order {order_id}")));
    }
    let failures = api.settlement_failures(&order_id).await?;
    Ok(HttpResponse::Ok().json(failures))
}
