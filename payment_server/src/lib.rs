//! # OPG server
//! This module hosts the HTTP surface of the order payment gateway. It is responsible for:
//! accepting payment notifications from storefront clients, serving order and receipt
//! queries, and running the background workers (the ledger event listener and the receipt
//! issuance hook) alongside the web server.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for
//! more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /payments/notify`: Drive a claimed payment through verification and settlement.
//! * `GET /orders/{order_id}`: The current view of an order.
//! * `GET /orders/{order_id}/receipt`: The receipt status for an order.
//! * `GET /orders/{order_id}/failures`: The settlement-failure audit trail for an order.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
