use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{FinanceError, FinanceResult};

const WEEKS_PER_MONTH_HUNDREDTHS: i64 = 433;
pub const UPCOMING_WEEK_DAYS: i64 = 7;
pub const UPCOMING_MONTH_DAYS: i64 = 30;
const FALLBACK_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(FinanceError::validation(
                "billing_cycle must be one of weekly/monthly/quarterly/yearly",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(FinanceError::validation(
                "status must be one of active/paused/cancelled",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: i64,
    pub name: String,
    pub cost_cents: i64,
    pub billing_cycle: BillingCycle,
    pub next_billing_date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CategoryCost {
    pub count: usize,
    pub monthly_cost_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SubscriptionSummary {
    pub total_active: usize,
    pub monthly_cost_cents: i64,
    pub yearly_cost_cents: i64,
    pub upcoming_this_week: usize,
    pub upcoming_this_month: usize,
    pub by_category: BTreeMap<String, CategoryCost>,
}

fn div_round(numerator: i64, denominator: i64) -> i64 {
    let half = denominator / 2;
    if numerator >= 0 {
        numerator.saturating_add(half) / denominator
    } else {
        numerator.saturating_sub(half) / denominator
    }
}

pub fn monthly_equivalent_cents(cost_cents: i64, cycle: BillingCycle) -> i64 {
    match cycle {
        BillingCycle::Weekly => {
            div_round(cost_cents.saturating_mul(WEEKS_PER_MONTH_HUNDREDTHS), 100)
        }
        BillingCycle::Monthly => cost_cents,
        BillingCycle::Quarterly => div_round(cost_cents, 3),
        BillingCycle::Yearly => div_round(cost_cents, 12),
    }
}

// Skips the monthly rounding step so non-weekly cycles scale back exactly.
pub fn yearly_equivalent_cents(cost_cents: i64, cycle: BillingCycle) -> i64 {
    match cycle {
        BillingCycle::Weekly => div_round(
            cost_cents.saturating_mul(WEEKS_PER_MONTH_HUNDREDTHS * 12),
            100,
        ),
        BillingCycle::Monthly => cost_cents.saturating_mul(12),
        BillingCycle::Quarterly => cost_cents.saturating_mul(4),
        BillingCycle::Yearly => cost_cents,
    }
}

// Past-due dates count too.
pub fn is_due_within(sub: &Subscription, today: NaiveDate, days: i64) -> bool {
    sub.next_billing_date <= today + Duration::days(days)
}

fn category_key(sub: &Subscription) -> String {
    let trimmed = sub.category.trim();
    if trimmed.is_empty() {
        FALLBACK_CATEGORY.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn compute_subscription_summary(
    subscriptions: &[Subscription],
    today: NaiveDate,
) -> SubscriptionSummary {
    let mut summary = SubscriptionSummary::default();
    for sub in subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active)
    {
        let monthly = monthly_equivalent_cents(sub.cost_cents, sub.billing_cycle);
        summary.total_active += 1;
        summary.monthly_cost_cents = summary.monthly_cost_cents.saturating_add(monthly);
        summary.yearly_cost_cents = summary
            .yearly_cost_cents
            .saturating_add(yearly_equivalent_cents(sub.cost_cents, sub.billing_cycle));
        if is_due_within(sub, today, UPCOMING_WEEK_DAYS) {
            summary.upcoming_this_week += 1;
        }
        if is_due_within(sub, today, UPCOMING_MONTH_DAYS) {
            summary.upcoming_this_month += 1;
        }
        let entry = summary.by_category.entry(category_key(sub)).or_default();
        entry.count += 1;
        entry.monthly_cost_cents = entry.monthly_cost_cents.saturating_add(monthly);
    }
    summary
}

pub fn upcoming_payments(
    subscriptions: &[Subscription],
    today: NaiveDate,
    days: i64,
) -> Vec<&Subscription> {
    let mut due = subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active && is_due_within(s, today, days))
        .collect::<Vec<_>>();
    due.sort_by(|a, b| {
        a.next_billing_date
            .cmp(&b.next_billing_date)
            .then(a.id.cmp(&b.id))
    });
    due
}
