use chrono::Utc;
use rizz_common::{Plan, Purchase, Result, RizzError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::storage::Storage;

pub const PLANS: [Plan; 3] = [
    Plan {
        id: 1,
        name: "Free",
        price: 0.0,
        credits: 20,
    },
    Plan {
        id: 2,
        name: "Pro Package",
        price: 40.0,
        credits: 120,
    },
    Plan {
        id: 3,
        name: "Premium Package",
        price: 199.0,
        credits: 2000,
    },
];

/// A completed payment reported by the payment layer.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub external_payment_id: String,
    pub user_id: Uuid,
    pub plan_id: i32,
    /// Paid amount; defaults to the plan price.
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PurchaseOutcome {
    pub purchase: Purchase,
    /// `false` when the payment id was already recorded.
    pub applied: bool,
    pub balance: i64,
}

pub struct CreditLedger {
    storage: Arc<dyn Storage>,
}

impl CreditLedger {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn plans() -> &'static [Plan] {
        &PLANS
    }

    pub fn plan(id: i32) -> Option<&'static Plan> {
        PLANS.iter().find(|plan| plan.id == id)
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<i64> {
        self.storage
            .get_user(user_id)
            .await?
            .map(|user| user.credit_balance)
            .ok_or_else(|| RizzError::NotFound(format!("User not found: {}", user_id)))
    }

    /// Returns the remaining balance.
    #[instrument(skip(self))]
    pub async fn consume(&self, user_id: Uuid, amount: i64) -> Result<i64> {
        let balance = self.storage.consume_credits(user_id, amount).await?;
        info!("User {} spent {} credit(s), {} left", user_id, amount, balance);
        Ok(balance)
    }

    #[instrument(skip(self))]
    pub async fn refund(&self, user_id: Uuid, amount: i64) -> Result<i64> {
        let balance = self.storage.add_credits(user_id, amount).await?;
        info!("Refunded {} credit(s) to user {}", amount, user_id);
        Ok(balance)
    }

    #[instrument(skip(self, request), fields(payment = %request.external_payment_id))]
    pub async fn record_purchase(&self, request: PurchaseRequest) -> Result<PurchaseOutcome> {
        let external_payment_id = request.external_payment_id.trim().to_string();
        if external_payment_id.is_empty() {
            return Err(RizzError::Validation(
                "external_payment_id is required".to_string(),
            ));
        }

        let plan = Self::plan(request.plan_id)
            .ok_or_else(|| RizzError::Validation(format!("Unknown plan: {}", request.plan_id)))?;
        if plan.price == 0.0 {
            return Err(RizzError::Validation(format!(
                "{} plan cannot be purchased",
                plan.name
            )));
        }

        let amount = request.amount.unwrap_or(plan.price);
        if !amount.is_finite() || amount < 0.0 {
            return Err(RizzError::Validation("amount must be non-negative".to_string()));
        }
        if (amount - plan.price).abs() > f64::EPSILON {
            warn!(
                "Payment {} amount {} differs from {} price {}",
                external_payment_id, amount, plan.name, plan.price
            );
        }

        let purchase = Purchase {
            id: Uuid::new_v4(),
            external_payment_id,
            user_id: request.user_id,
            plan_id: plan.id,
            amount,
            credits: plan.credits,
            created_at: Utc::now(),
        };

        let (purchase, applied) = self.storage.record_purchase(&purchase).await?;
        let balance = self.balance(purchase.user_id).await?;

        Ok(PurchaseOutcome {
            purchase,
            applied,
            balance,
        })
    }

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<Purchase>> {
        self.storage.list_purchases(user_id).await
    }
}
