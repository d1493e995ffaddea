//! Promotion validation and usage counting.

use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use common::{Money, PromotionId, Version};
use serde::{Deserialize, Serialize};

use crate::repository::PromotionRepository;
use crate::DomainError;

/// Bounded retries for the usage-count save against concurrent writers.
const SAVE_RETRIES: u32 = 3;

/// How a discount value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `discount_value` percent of the order amount.
    Percent,
    /// `discount_value` in whole currency units.
    Fixed,
}

impl FromStr for DiscountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "percent" => Ok(DiscountType::Percent),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(DomainError::Validation(format!(
                "unknown discount type: {other}"
            ))),
        }
    }
}

/// Whether a promotion can currently be used at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStatus {
    Active,
    Inactive,
}

impl FromStr for PromotionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(PromotionStatus::Active),
            "inactive" => Ok(PromotionStatus::Inactive),
            other => Err(DomainError::Validation(format!(
                "unknown promotion status: {other}"
            ))),
        }
    }
}

/// A discount code with its validity rules.
///
/// Invariant: when `usage_limit > 0`, `used_count` never exceeds it after
/// a counted use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    /// Validity window, both ends inclusive, date granularity.
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub min_order_amount: Money,
    /// 0 means unlimited.
    pub usage_limit: u32,
    pub used_count: u32,
    pub status: PromotionStatus,
    /// Optimistic concurrency token, owned by the repository.
    pub version: Version,
}

impl Promotion {
    /// Returns the discount this promotion grants on `order_amount`,
    /// clamped so the discount never exceeds the amount itself.
    pub fn discount_for(&self, order_amount: Money) -> Money {
        let discount = match self.discount_type {
            DiscountType::Percent => order_amount.percent(self.discount_value),
            DiscountType::Fixed => Money::from_major_f64(self.discount_value),
        };
        discount.min(order_amount)
    }

    /// Returns true if the usage limit is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit > 0 && self.used_count >= self.usage_limit
    }
}

/// Outcome of validating a code against an order amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionValidation {
    pub is_valid: bool,
    pub message: String,
    pub discount: Money,
}

impl PromotionValidation {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            discount: Money::zero(),
        }
    }

    fn valid(discount: Money) -> Self {
        Self {
            is_valid: true,
            message: "promotion is valid".to_string(),
            discount,
        }
    }
}

/// Pure validation of a stored promotion against an order.
///
/// Checks run in order - active, date window, minimum amount, usage
/// limit - and the first failure short-circuits with its reason and a
/// zero discount. Given identical inputs the result is identical.
pub fn evaluate(promotion: &Promotion, order_amount: Money, today: NaiveDate) -> PromotionValidation {
    if promotion.status != PromotionStatus::Active {
        return PromotionValidation::invalid("promotion is not active");
    }

    if today < promotion.starts_on || today > promotion.ends_on {
        return PromotionValidation::invalid("promotion is not valid for current date");
    }

    if order_amount < promotion.min_order_amount {
        return PromotionValidation::invalid(format!(
            "order amount must be at least {}",
            promotion.min_order_amount
        ));
    }

    if promotion.is_exhausted() {
        return PromotionValidation::invalid("promotion usage limit reached");
    }

    PromotionValidation::valid(promotion.discount_for(order_amount))
}

/// Fields for creating a promotion.
#[derive(Debug, Clone)]
pub struct NewPromotion {
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub min_order_amount: Money,
    pub usage_limit: u32,
}

/// Mutable fields of an existing promotion.
#[derive(Debug, Clone)]
pub struct PromotionUpdate {
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub min_order_amount: Money,
    pub usage_limit: u32,
    pub status: PromotionStatus,
}

/// Validation and bookkeeping for discount codes.
///
/// Validation itself has no side effects; the usage count is incremented
/// separately by the caller once the discounted order has gone through.
pub struct PromotionEngine<R: PromotionRepository> {
    repo: Arc<R>,
}

impl<R: PromotionRepository> PromotionEngine<R> {
    /// Creates an engine over the given repository.
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Creates a promotion.
    #[tracing::instrument(skip(self, promotion), fields(code = %promotion.code))]
    pub async fn create(&self, promotion: NewPromotion) -> Result<Promotion, DomainError> {
        if promotion.ends_on < promotion.starts_on {
            return Err(DomainError::Validation(
                "promotion ends before it starts".to_string(),
            ));
        }

        let promotion = Promotion {
            id: PromotionId::new(),
            code: promotion.code,
            description: promotion.description,
            discount_type: promotion.discount_type,
            discount_value: promotion.discount_value,
            starts_on: promotion.starts_on,
            ends_on: promotion.ends_on,
            min_order_amount: promotion.min_order_amount,
            usage_limit: promotion.usage_limit,
            used_count: 0,
            status: PromotionStatus::Active,
            version: Version::initial(),
        };
        self.repo.insert(promotion.clone()).await?;
        Ok(promotion)
    }

    /// Replaces the mutable fields of a promotion.
    #[tracing::instrument(skip(self, update))]
    pub async fn update(
        &self,
        id: PromotionId,
        update: PromotionUpdate,
    ) -> Result<Promotion, DomainError> {
        let mut promotion = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("promotion {id} not found")))?;

        promotion.description = update.description;
        promotion.discount_type = update.discount_type;
        promotion.discount_value = update.discount_value;
        promotion.starts_on = update.starts_on;
        promotion.ends_on = update.ends_on;
        promotion.min_order_amount = update.min_order_amount;
        promotion.usage_limit = update.usage_limit;
        promotion.status = update.status;

        promotion.version = self.repo.save(&promotion).await?;
        Ok(promotion)
    }

    /// Loads a promotion by code.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Promotion>, DomainError> {
        self.repo.get_by_code(code).await
    }

    /// Returns all promotions.
    pub async fn list(&self) -> Result<Vec<Promotion>, DomainError> {
        self.repo.list().await
    }

    /// Returns promotions usable today.
    pub async fn list_active(&self, today: NaiveDate) -> Result<Vec<Promotion>, DomainError> {
        let promotions = self.repo.list().await?;
        Ok(promotions
            .into_iter()
            .filter(|p| {
                p.status == PromotionStatus::Active
                    && p.starts_on <= today
                    && p.ends_on >= today
            })
            .collect())
    }

    /// Validates `code` against an order amount.
    ///
    /// An unknown code is an invalid result, not an error - the caller
    /// shows the reason to the user either way.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_amount: Money,
        today: NaiveDate,
    ) -> Result<PromotionValidation, DomainError> {
        let Some(promotion) = self.repo.get_by_code(code).await? else {
            return Ok(PromotionValidation::invalid("promotion code not found"));
        };

        let validation = evaluate(&promotion, order_amount, today);
        if !validation.is_valid {
            tracing::debug!(code, reason = %validation.message, "promotion rejected");
        }
        Ok(validation)
    }

    /// Counts one confirmed use of `code`.
    ///
    /// Called after the discounted order was persisted. Refuses when the
    /// limit is already exhausted so `used_count` never exceeds
    /// `usage_limit`.
    #[tracing::instrument(skip(self))]
    pub async fn record_use(&self, code: &str) -> Result<(), DomainError> {
        for _ in 0..SAVE_RETRIES {
            let mut promotion = self
                .repo
                .get_by_code(code)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("promotion {code} not found")))?;

            if promotion.is_exhausted() {
                return Err(DomainError::InvalidOperation(
                    "promotion usage limit reached".to_string(),
                ));
            }

            promotion.used_count += 1;
            match self.repo.save(&promotion).await {
                Ok(_) => {
                    metrics::counter!("promotions_used_total").increment(1);
                    return Ok(());
                }
                Err(DomainError::ConcurrencyConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::ConcurrencyConflict {
            entity: "promotion",
            id: code.to_string(),
        })
    }
}
