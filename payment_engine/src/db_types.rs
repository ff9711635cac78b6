use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use opg_common::{Money, TokenAmount};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        TxHash         -------------------------------------------------------
/// A ledger transaction hash. Stored and compared verbatim; the engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TxHash(pub String);

impl From<String> for TxHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TxHash {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     WalletAddress     -------------------------------------------------------
/// A lightweight wrapper around a string representing a wallet address on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct WalletAddress(pub String);

impl From<String> for WalletAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for WalletAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     TokenAddress      -------------------------------------------------------
/// Identifies the asset a payment was made in: the contract address of a token, or
/// [`TokenAddress::NATIVE`] for the chain's native coin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TokenAddress(pub String);

impl TokenAddress {
    pub const NATIVE: &'static str = "native";

    pub fn native() -> Self {
        Self(Self::NATIVE.to_string())
    }

    pub fn is_native(&self) -> bool {
        self.0 == Self::NATIVE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TokenAddress {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TokenAddress {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for TokenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     OrderStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order has been created and is awaiting payment.
    Pending,
    /// Payment has settled and the order is confirmed for fulfilment.
    Confirmed,
    /// The order is on its way to the customer.
    Shipping,
    /// The order has been delivered.
    Delivered,
    /// The order has been cancelled.
    Cancelled,
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "Pending"),
            OrderStatus::Confirmed => write!(f, "Confirmed"),
            OrderStatus::Shipping => write!(f, "Shipping"),
            OrderStatus::Delivered => write!(f, "Delivered"),
            OrderStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Shipping" => Ok(Self::Shipping),
            "Delivered" => Ok(Self::Delivered),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatus::Pending
        })
    }
}

//--------------------------------------    PaymentStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// No settled payment has been recorded for the order yet.
    Pending,
    /// A verified payment has settled the order in full.
    Completed,
    /// Payment failed terminally and needs manual attention.
    Failed,
    /// The payment was refunded after settlement.
    Refunded,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Completed => write!(f, "Completed"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------        Order          -------------------------------------------------------
/// The authoritative purchase record. Created by the storefront at checkout; the ledger
/// payment fields are populated exclusively by settlement, and `settled_tx` is immutable
/// and globally unique once set.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    /// The order total in the platform's base currency.
    pub total_price: Money,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    /// The wallet that paid for the order. May differ from the customer's login wallet.
    pub payer_address: Option<WalletAddress>,
    /// The hash of the transaction that settled this order.
    pub settled_tx: Option<TxHash>,
    /// The verified on-chain amount, in base units of `settled_token`.
    pub settled_amount: Option<TokenAmount>,
    pub settled_token: Option<TokenAddress>,
    /// Confirmation depth observed at verification time.
    pub confirmations: Option<i64>,
    pub settled_at: Option<DateTime<Utc>>,
    /// The proof-of-purchase token, once issued.
    pub receipt_token_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// The order_id as assigned by the storefront
    pub order_id: OrderId,
    /// The customer_id as assigned by the storefront
    pub customer_id: String,
    /// The total price of the order in the base currency
    pub total_price: Money,
    /// The base currency of the order
    pub currency: String,
    pub payment_method: String,
    /// The time the order was created on the storefront
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, customer_id: String, total_price: Money) -> Self {
        Self {
            order_id,
            customer_id,
            total_price,
            currency: "USD".to_string(),
            payment_method: "crypto".to_string(),
            created_at: Utc::now(),
        }
    }
}

//--------------------------------------       Receipt         -------------------------------------------------------
/// A proof-of-purchase token minted for a settled order. One-to-one with orders.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Receipt {
    pub id: i64,
    pub order_id: OrderId,
    pub token_id: String,
    /// Content-addressed location of the receipt metadata.
    pub metadata_uri: String,
    pub mint_tx: TxHash,
    pub minted_at: DateTime<Utc>,
}

//--------------------------------------  SettlementFailure    -------------------------------------------------------
/// Audit record of a terminal settlement/verification failure, kept so that operators can
/// reconcile mismatched payments manually rather than have them vanish into logs.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SettlementFailure {
    pub id: i64,
    pub order_id: OrderId,
    pub tx_hash: TxHash,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
