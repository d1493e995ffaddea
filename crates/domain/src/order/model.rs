//! Order, its line items, and its payments.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentId, ProductId, PromotionId, UserId, Version};
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The state of an order.
///
/// Transitions are monotonic:
/// ```text
/// Pending ──┬──► Paid
///           └──► Canceled
/// ```
/// Paid and Canceled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Awaiting full payment; the only state that permits transitions.
    #[default]
    Pending,

    /// Cumulative payments reached the total (terminal).
    Paid,

    /// Canceled before payment completed (terminal).
    Canceled,
}

impl OrderStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Canceled)
    }

    /// Returns the lowercase wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    /// Case-insensitive; unknown strings are rejected rather than
    /// defaulted to a variant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "canceled" => Ok(OrderStatus::Canceled),
            other => Err(DomainError::Validation(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    EWallet,
}

impl PaymentMethod {
    /// Returns the lowercase wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "banktransfer",
            PaymentMethod::EWallet => "ewallet",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    /// Case-insensitive; unknown strings are rejected rather than
    /// defaulted to cash.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "banktransfer" => Ok(PaymentMethod::BankTransfer),
            "ewallet" => Ok(PaymentMethod::EWallet),
            other => Err(DomainError::Validation(format!(
                "unknown payment method: {other}"
            ))),
        }
    }
}

/// A line in an order. Owned exclusively by its order; the unit price is
/// a snapshot taken at order time and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Creates a new line item.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns quantity times unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An append-only payment row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
}

/// An order with its items and payments.
///
/// Invariant: `total_amount == sum of line totals - discount_amount`, clamped
/// at zero. Orders are never deleted; cancellation is a state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub user_id: UserId,
    pub promotion_id: Option<PromotionId>,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub discount_amount: Money,
    /// Insertion order is line order.
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    /// Optimistic concurrency token, owned by the repository.
    pub version: Version,
}

impl Order {
    /// Creates a Pending order, computing the total from the line items
    /// and clamping it at zero.
    pub fn create(
        user_id: UserId,
        customer_id: Option<CustomerId>,
        promotion_id: Option<PromotionId>,
        discount_amount: Money,
        items: Vec<OrderItem>,
    ) -> Self {
        let gross: Money = items.iter().map(OrderItem::line_total).sum();
        Self {
            id: OrderId::new(),
            customer_id,
            user_id,
            promotion_id,
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            total_amount: gross.sub_clamped(discount_amount),
            discount_amount,
            items,
            payments: Vec::new(),
            version: Version::initial(),
        }
    }

    /// Returns the sum of all payments posted so far.
    pub fn total_paid(&self) -> Money {
        self.payments.iter().map(|p| p.amount).sum()
    }

    /// Appends a payment and settles the order once cumulative payments
    /// reach the total.
    ///
    /// Partial payments leave the order Pending. Payments past full
    /// settlement are recorded but do not change state - Paid stays
    /// Paid. Posting against a Canceled order is rejected.
    pub fn accrue_payment(
        &mut self,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<Payment, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::Validation(
                "payment amount must be positive".to_string(),
            ));
        }
        if self.status == OrderStatus::Canceled {
            return Err(DomainError::InvalidOperation(
                "cannot pay a canceled order".to_string(),
            ));
        }

        let payment = Payment {
            id: PaymentId::new(),
            order_id: self.id,
            amount,
            method,
            paid_at: Utc::now(),
        };
        self.payments.push(payment.clone());

        if self.status == OrderStatus::Pending && self.total_paid() >= self.total_amount {
            self.status = OrderStatus::Paid;
        }

        Ok(payment)
    }

    /// Cancels the order.
    ///
    /// Only valid from Pending; canceling an already-Canceled order is an
    /// idempotent no-op; canceling a Paid order is rejected.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Canceled;
                Ok(())
            }
            OrderStatus::Canceled => Ok(()),
            OrderStatus::Paid => Err(DomainError::InvalidOperation(
                "cannot cancel a paid order".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with_total(cents: i64) -> Order {
        Order::create(
            UserId::new(),
            None,
            None,
            Money::zero(),
            vec![OrderItem::new("SKU-1", 1, Money::from_cents(cents))],
        )
    }

    #[test]
    fn test_total_is_items_minus_discount() {
        let order = Order::create(
            UserId::new(),
            Some(CustomerId::new()),
            None,
            Money::from_cents(2000),
            vec![
                OrderItem::new("SKU-1", 2, Money::from_cents(5000)),
                OrderItem::new("SKU-2", 1, Money::from_cents(5000)),
            ],
        );

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount.cents(), 13_000);
    }

    #[test]
    fn test_total_clamped_at_zero() {
        let order = Order::create(
            UserId::new(),
            None,
            None,
            Money::from_cents(10_000),
            vec![OrderItem::new("SKU-1", 1, Money::from_cents(500))],
        );
        assert_eq!(order.total_amount, Money::zero());
    }

    #[test]
    fn test_full_payment_settles_order() {
        let mut order = order_with_total(13_000);

        order
            .accrue_payment(Money::from_cents(13_000), PaymentMethod::Card)
            .unwrap();

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payments.len(), 1);
    }

    #[test]
    fn test_partial_payment_stays_pending() {
        let mut order = order_with_total(13_000);

        order
            .accrue_payment(Money::from_cents(5_000), PaymentMethod::Cash)
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);

        order
            .accrue_payment(Money::from_cents(8_000), PaymentMethod::Cash)
            .unwrap();

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.total_paid().cents(), 13_000);
    }

    #[test]
    fn test_overpayment_recorded_without_state_change() {
        let mut order = order_with_total(13_000);
        order
            .accrue_payment(Money::from_cents(13_000), PaymentMethod::Card)
            .unwrap();

        // Extra payment is accepted and recorded; the order stays Paid.
        order
            .accrue_payment(Money::from_cents(1_000), PaymentMethod::Cash)
            .unwrap();

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payments.len(), 2);
        assert_eq!(order.total_paid().cents(), 14_000);
    }

    #[test]
    fn test_non_positive_payment_rejected() {
        let mut order = order_with_total(1_000);
        let result = order.accrue_payment(Money::zero(), PaymentMethod::Cash);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_payment_against_canceled_order_rejected() {
        let mut order = order_with_total(1_000);
        order.cancel().unwrap();

        let result = order.accrue_payment(Money::from_cents(100), PaymentMethod::Cash);
        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
    }

    #[test]
    fn test_cancel_pending_is_terminal() {
        let mut order = order_with_total(1_000);
        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_cancel_canceled_is_noop() {
        let mut order = order_with_total(1_000);
        order.cancel().unwrap();
        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
    }

    #[test]
    fn test_cancel_paid_is_rejected() {
        let mut order = order_with_total(1_000);
        order
            .accrue_payment(Money::from_cents(1_000), PaymentMethod::EWallet)
            .unwrap();

        let result = order.cancel();
        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_zero_total_order_settles_on_first_payment_check() {
        // Discount larger than the items: total clamps to zero, so any
        // positive payment settles it.
        let mut order = Order::create(
            UserId::new(),
            None,
            None,
            Money::from_cents(10_000),
            vec![OrderItem::new("SKU-1", 1, Money::from_cents(500))],
        );

        order
            .accrue_payment(Money::from_cents(1), PaymentMethod::Cash)
            .unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_status_parsing_is_case_insensitive_and_total() {
        assert_eq!("Pending".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!("PAID".parse::<OrderStatus>().unwrap(), OrderStatus::Paid);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_method_parsing_is_case_insensitive_and_total() {
        assert_eq!(
            "BankTransfer".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankTransfer
        );
        assert_eq!("ewallet".parse::<PaymentMethod>().unwrap(), PaymentMethod::EWallet);
        assert!("iou".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_status_wire_form_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Canceled).unwrap(),
            "\"canceled\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"banktransfer\""
        );
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem::new("SKU-1", 3, Money::from_cents(1_050));
        assert_eq!(item.line_total().cents(), 3_150);
    }
}
