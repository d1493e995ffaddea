//! Order operations: creation, payment accrual, cancellation, and the
//! scoped read side.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId, PromotionId, UserId};
use serde::{Deserialize, Serialize};

use crate::lookup::ProductLookup;
use crate::repository::OrderRepository;
use crate::DomainError;

use super::{Order, OrderItem, OrderStatus, PaymentMethod};

/// Bounded retries when a versioned save loses to a concurrent writer.
const SAVE_RETRIES: u32 = 3;

/// Identity of the requester, as resolved by the calling layer.
///
/// Authorization itself is delegated: this core only honors the
/// privileged flag, which widens visibility and cancel permission past
/// the owner.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: UserId,
    pub is_privileged: bool,
}

impl Caller {
    /// A regular user acting on their own orders.
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_privileged: false,
        }
    }

    /// An elevated role seeing and acting on all orders.
    pub fn privileged(user_id: UserId) -> Self {
        Self {
            user_id,
            is_privileged: true,
        }
    }
}

/// One requested line of a new order; the price is resolved at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Fields for creating an order.
///
/// The discount amount comes from the caller, typically out of a prior
/// promotion validation.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub customer_id: Option<CustomerId>,
    pub promotion_id: Option<PromotionId>,
    pub discount_amount: Money,
    pub items: Vec<OrderLine>,
}

/// Aggregated order figures for the caller's visible orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub total_orders: usize,
    pub pending_orders: usize,
    pub paid_orders: usize,
    pub canceled_orders: usize,
    /// Revenue counts paid orders only.
    pub total_revenue: Money,
    pub total_discounts: Money,
    pub average_order_value: Money,
}

/// Service for the order lifecycle.
pub struct OrderService<R, L>
where
    R: OrderRepository,
    L: ProductLookup,
{
    repo: Arc<R>,
    lookup: Arc<L>,
}

impl<R, L> OrderService<R, L>
where
    R: OrderRepository,
    L: ProductLookup,
{
    /// Creates a service over the given repository and price lookup.
    pub fn new(repo: Arc<R>, lookup: Arc<L>) -> Self {
        Self { repo, lookup }
    }

    /// Creates an order in Pending state.
    ///
    /// Every product's price is resolved through the resilience-wrapped
    /// lookup with the caller's bearer token. Any unresolvable product
    /// fails the whole operation - no partial order is persisted.
    #[tracing::instrument(skip(self, request, bearer_token), fields(user = %caller.user_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        caller: &Caller,
        bearer_token: &str,
    ) -> Result<Order, DomainError> {
        if request.items.is_empty() {
            return Err(DomainError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            if line.quantity == 0 {
                return Err(DomainError::Validation(format!(
                    "quantity for product {} must be positive",
                    line.product_id
                )));
            }

            let quote = self
                .lookup
                .quote(&line.product_id, bearer_token)
                .await?
                .ok_or_else(|| {
                    DomainError::not_found(format!("product {} not found", line.product_id))
                })?;

            items.push(OrderItem::new(
                line.product_id.clone(),
                line.quantity,
                quote.price,
            ));
        }

        let order = Order::create(
            caller.user_id,
            request.customer_id,
            request.promotion_id,
            request.discount_amount,
            items,
        );
        self.repo.insert(order.clone()).await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Posts a payment against an order.
    ///
    /// Recomputes the cumulative paid amount including the new payment
    /// and settles the order once it covers the total. The
    /// reload-then-save cycle retries on version conflicts so concurrent
    /// postings against one order never lose a payment.
    #[tracing::instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn accrue_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        method: PaymentMethod,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        let mut became_paid = false;
        let order = self
            .mutate(order_id, caller, |order| {
                let before = order.status;
                order.accrue_payment(amount, method)?;
                became_paid = before == OrderStatus::Pending && order.status == OrderStatus::Paid;
                Ok(())
            })
            .await?;

        metrics::counter!("payments_recorded_total").increment(1);
        if became_paid {
            metrics::counter!("orders_paid_total").increment(1);
            tracing::info!(order_id = %order.id, "order fully paid");
        }
        Ok(order)
    }

    /// Cancels an order.
    ///
    /// Permitted only from Pending; canceling an already-Canceled order
    /// is an idempotent no-op; a Paid order is rejected.
    #[tracing::instrument(skip(self), fields(user = %caller.user_id))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        caller: &Caller,
    ) -> Result<Order, DomainError> {
        let mut canceled_now = false;
        let order = self
            .mutate(order_id, caller, |order| {
                let before = order.status;
                order.cancel()?;
                canceled_now = before == OrderStatus::Pending;
                Ok(())
            })
            .await?;

        if canceled_now {
            metrics::counter!("orders_canceled_total").increment(1);
            tracing::info!(order_id = %order.id, "order canceled");
        }
        Ok(order)
    }

    /// Loads an order visible to the caller.
    ///
    /// A foreign order looks the same as a missing one to a
    /// non-privileged caller - existence is not leaked.
    pub async fn get_order(&self, order_id: OrderId, caller: &Caller) -> Result<Order, DomainError> {
        let order = self
            .repo
            .get(order_id)
            .await?
            .filter(|o| Self::visible_to(o, caller))
            .ok_or_else(|| DomainError::not_found(format!("order {order_id} not found")))?;
        Ok(order)
    }

    /// Returns the caller's visible orders, oldest first.
    pub async fn list_orders(&self, caller: &Caller) -> Result<Vec<Order>, DomainError> {
        Ok(self.visible_orders(caller).await?)
    }

    /// Returns visible orders in the given status.
    pub async fn orders_by_status(
        &self,
        status: OrderStatus,
        caller: &Caller,
    ) -> Result<Vec<Order>, DomainError> {
        let orders = self.visible_orders(caller).await?;
        Ok(orders.into_iter().filter(|o| o.status == status).collect())
    }

    /// Returns visible orders created within `[start, end]`, inclusive.
    pub async fn orders_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        caller: &Caller,
    ) -> Result<Vec<Order>, DomainError> {
        let orders = self.visible_orders(caller).await?;
        Ok(orders
            .into_iter()
            .filter(|o| o.created_at >= start && o.created_at <= end)
            .collect())
    }

    /// Returns the `count` most recently created visible orders.
    pub async fn recent_orders(
        &self,
        count: usize,
        caller: &Caller,
    ) -> Result<Vec<Order>, DomainError> {
        let mut orders = self.visible_orders(caller).await?;
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at));
        orders.truncate(count);
        Ok(orders)
    }

    /// Aggregates the caller's visible orders.
    pub async fn order_summary(&self, caller: &Caller) -> Result<OrderSummary, DomainError> {
        let orders = self.visible_orders(caller).await?;

        let total_orders = orders.len();
        let pending_orders = orders.iter().filter(|o| o.status == OrderStatus::Pending).count();
        let paid_orders = orders.iter().filter(|o| o.status == OrderStatus::Paid).count();
        let canceled_orders = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Canceled)
            .count();
        let total_revenue: Money = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Paid)
            .map(|o| o.total_amount)
            .sum();
        let total_discounts: Money = orders.iter().map(|o| o.discount_amount).sum();
        let average_order_value = if paid_orders > 0 {
            Money::from_cents(total_revenue.cents() / paid_orders as i64)
        } else {
            Money::zero()
        };

        Ok(OrderSummary {
            total_orders,
            pending_orders,
            paid_orders,
            canceled_orders,
            total_revenue,
            total_discounts,
            average_order_value,
        })
    }

    fn visible_to(order: &Order, caller: &Caller) -> bool {
        caller.is_privileged || order.user_id == caller.user_id
    }

    async fn visible_orders(&self, caller: &Caller) -> Result<Vec<Order>, DomainError> {
        let orders = self.repo.list().await?;
        Ok(orders
            .into_iter()
            .filter(|o| Self::visible_to(o, caller))
            .collect())
    }

    /// Reload-then-mutate-then-save with bounded conflict retries.
    async fn mutate<F>(
        &self,
        order_id: OrderId,
        caller: &Caller,
        mut apply: F,
    ) -> Result<Order, DomainError>
    where
        F: FnMut(&mut Order) -> Result<(), DomainError>,
    {
        for _ in 0..SAVE_RETRIES {
            let mut order = self
                .repo
                .get(order_id)
                .await?
                .filter(|o| Self::visible_to(o, caller))
                .ok_or_else(|| DomainError::not_found(format!("order {order_id} not found")))?;

            apply(&mut order)?;

            match self.repo.save(&order).await {
                Ok(version) => {
                    order.version = version;
                    return Ok(order);
                }
                Err(DomainError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(%order_id, "save conflict, reloading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::ConcurrencyConflict {
            entity: "order",
            id: order_id.to_string(),
        })
    }
}
