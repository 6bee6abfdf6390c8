use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::{FinanceError, FinanceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(FinanceError::validation(
                "type must be one of income/expense",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub amount_cents: i64,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Yearly,
    Custom,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "custom" => Ok(Self::Custom),
            _ => Err(FinanceError::validation(
                "period_type must be one of monthly/yearly/custom",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseLimit {
    pub id: i64,
    pub category: String,
    pub limit_amount_cents: i64,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitStatus {
    pub id: i64,
    pub category: String,
    pub limit_amount_cents: i64,
    pub spent_cents: i64,
    pub remaining_cents: i64,
    pub exceeded: bool,
    pub exceeded_by_cents: i64,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceededTransaction {
    pub transaction: Transaction,
    pub limit_id: i64,
    pub limit_amount_cents: i64,
    pub running_total_cents: i64,
    pub exceeded_by_cents: i64,
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LimitStatusCounts {
    pub active: usize,
    pub exceeded: usize,
    pub on_track: usize,
}

pub fn in_period(transaction_date: NaiveDateTime, limit: &ExpenseLimit) -> bool {
    let day = transaction_date.date();
    limit.start_date <= day && day <= limit.end_date
}

fn counts_against(tx: &Transaction, limit: &ExpenseLimit) -> bool {
    tx.tx_type == TransactionType::Expense
        && tx.category == limit.category
        && in_period(tx.date, limit)
}

pub fn spend_for(limit: &ExpenseLimit, transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .filter(|tx| counts_against(tx, limit))
        .fold(0_i64, |acc, tx| acc.saturating_add(tx.amount_cents))
}

pub fn evaluate_limit(limit: &ExpenseLimit, spent_cents: i64) -> LimitStatus {
    let exceeded = spent_cents > limit.limit_amount_cents;
    LimitStatus {
        id: limit.id,
        category: limit.category.clone(),
        limit_amount_cents: limit.limit_amount_cents,
        spent_cents,
        remaining_cents: limit.limit_amount_cents.saturating_sub(spent_cents),
        exceeded,
        exceeded_by_cents: if exceeded {
            spent_cents.saturating_sub(limit.limit_amount_cents)
        } else {
            0
        },
        period_type: limit.period_type,
        start_date: limit.start_date,
        end_date: limit.end_date,
    }
}

pub fn compute_limit_statuses(
    limits: &[ExpenseLimit],
    transactions: &[Transaction],
) -> Vec<LimitStatus> {
    limits
        .iter()
        .map(|limit| evaluate_limit(limit, spend_for(limit, transactions)))
        .collect()
}

pub fn count_statuses(statuses: &[LimitStatus]) -> LimitStatusCounts {
    let exceeded = statuses.iter().filter(|s| s.exceeded).count();
    LimitStatusCounts {
        active: statuses.len(),
        exceeded,
        on_track: statuses.len() - exceeded,
    }
}

// Attribution replays by ascending date, ties by id, whatever the fetch order.
pub fn attribution_order(transactions: &[Transaction]) -> Vec<&Transaction> {
    let mut ordered = transactions.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    ordered
}

pub fn compute_exceeded_transactions(
    limits: &[ExpenseLimit],
    transactions: &[Transaction],
) -> Vec<ExceededTransaction> {
    let ordered = attribution_order(transactions);
    let mut out = Vec::new();
    for limit in limits {
        let mut running_total = 0_i64;
        for tx in ordered.iter().filter(|tx| counts_against(tx, limit)) {
            running_total = running_total.saturating_add(tx.amount_cents);
            if running_total > limit.limit_amount_cents {
                out.push(ExceededTransaction {
                    transaction: (*tx).clone(),
                    limit_id: limit.id,
                    limit_amount_cents: limit.limit_amount_cents,
                    running_total_cents: running_total,
                    exceeded_by_cents: running_total.saturating_sub(limit.limit_amount_cents),
                    period_type: limit.period_type,
                    start_date: limit.start_date,
                    end_date: limit.end_date,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn expense(id: i64, category: &str, cents: i64, date: &str) -> Transaction {
        Transaction {
            id,
            amount_cents: cents,
            description: format!("tx {id}"),
            category: category.to_string(),
            tx_type: TransactionType::Expense,
            date: at(date),
        }
    }

    fn limit(id: i64, category: &str, cents: i64, start: &str, end: &str) -> ExpenseLimit {
        ExpenseLimit {
            id,
            category: category.to_string(),
            limit_amount_cents: cents,
            period_type: PeriodType::Custom,
            start_date: day(start),
            end_date: day(end),
        }
    }

    #[test]
    fn period_bounds_are_inclusive_at_day_granularity() {
        let l = limit(1, "Food", 100, "2026-03-01", "2026-03-31");
        assert!(in_period(at("2026-03-01 00:00:00"), &l));
        assert!(in_period(at("2026-03-31 23:59:59"), &l));
        assert!(!in_period(at("2026-02-28 23:59:59"), &l));
        assert!(!in_period(at("2026-04-01 00:00:00"), &l));
    }

    #[test]
    fn spend_ignores_income_other_categories_and_out_of_period() {
        let l = limit(1, "Food", 10_000, "2026-03-01", "2026-03-31");
        let mut income = expense(4, "Food", 9_999, "2026-03-10 12:00:00");
        income.tx_type = TransactionType::Income;
        let txs = vec![
            expense(1, "Food", 1_250, "2026-03-02 08:00:00"),
            expense(2, "Bills", 5_000, "2026-03-02 08:00:00"),
            expense(3, "Food", 700, "2026-04-01 08:00:00"),
            income,
            expense(5, "Food", 50, "2026-03-31 21:00:00"),
        ];
        assert_eq!(spend_for(&l, &txs), 1_300);
        assert_eq!(spend_for(&l, &[]), 0);
    }

    #[test]
    fn threshold_is_strict() {
        let l = limit(1, "Food", 10_000, "2026-03-01", "2026-03-31");
        let at_limit = evaluate_limit(&l, 10_000);
        assert!(!at_limit.exceeded);
        assert_eq!(at_limit.remaining_cents, 0);
        assert_eq!(at_limit.exceeded_by_cents, 0);

        let over = evaluate_limit(&l, 10_001);
        assert!(over.exceeded);
        assert_eq!(over.exceeded_by_cents, 1);
        assert_eq!(over.remaining_cents, -1);
    }

    #[test]
    fn zero_limit_is_exceeded_by_any_spend() {
        let l = limit(1, "Fun", 0, "2026-03-01", "2026-03-31");
        let statuses =
            compute_limit_statuses(&[l], &[expense(1, "Fun", 1, "2026-03-03 10:00:00")]);
        assert!(statuses[0].exceeded);
        assert_eq!(statuses[0].exceeded_by_cents, 1);
    }

    #[test]
    fn empty_inputs_yield_empty_or_zero_status() {
        let txs = vec![expense(1, "Food", 500, "2026-03-02 08:00:00")];
        assert!(compute_limit_statuses(&[], &txs).is_empty());

        let limits = vec![
            limit(1, "Food", 100, "2026-03-01", "2026-03-31"),
            limit(2, "Bills", 100, "2026-03-01", "2026-03-31"),
        ];
        let statuses = compute_limit_statuses(&limits, &[]);
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.spent_cents == 0 && !s.exceeded));
        assert_eq!(
            count_statuses(&statuses),
            LimitStatusCounts {
                active: 2,
                exceeded: 0,
                on_track: 2
            }
        );
    }

    #[test]
    fn status_computation_is_repeatable_and_keeps_input_order() {
        let limits = vec![
            limit(7, "Food", 5_000, "2026-03-01", "2026-03-31"),
            limit(3, "Food", 5_000, "2026-02-01", "2026-02-28"),
        ];
        let txs = vec![
            expense(1, "Food", 6_000, "2026-03-02 08:00:00"),
            expense(2, "Food", 1_000, "2026-02-10 08:00:00"),
        ];
        let first = compute_limit_statuses(&limits, &txs);
        let second = compute_limit_statuses(&limits, &txs);
        assert_eq!(first, second);
        assert_eq!(first[0].id, 7);
        assert!(first[0].exceeded);
        assert_eq!(first[1].id, 3);
        assert_eq!(first[1].spent_cents, 1_000);
    }

    #[test]
    fn categories_with_overlapping_periods_stay_isolated() {
        let limits = vec![
            limit(1, "Food", 1_000, "2026-03-01", "2026-03-31"),
            limit(2, "Transportation", 1_000, "2026-03-15", "2026-04-15"),
        ];
        let txs = vec![
            expense(1, "Food", 900, "2026-03-20 08:00:00"),
            expense(2, "Transportation", 300, "2026-03-20 09:00:00"),
        ];
        let statuses = compute_limit_statuses(&limits, &txs);
        assert_eq!(statuses[0].spent_cents, 900);
        assert_eq!(statuses[1].spent_cents, 300);
    }

    #[test]
    fn second_of_two_transactions_crosses_the_limit() {
        let limits = vec![limit(1, "Food", 5_000, "2026-03-01", "2026-03-31")];
        let txs = vec![
            expense(1, "Food", 3_000, "2026-03-02 08:00:00"),
            expense(2, "Food", 3_000, "2026-03-03 08:00:00"),
        ];
        let exceeded = compute_exceeded_transactions(&limits, &txs);
        assert_eq!(exceeded.len(), 1);
        assert_eq!(exceeded[0].transaction.id, 2);
        assert_eq!(exceeded[0].exceeded_by_cents, 1_000);
        assert_eq!(exceeded[0].running_total_cents, 6_000);
    }

    #[test]
    fn attribution_depends_on_date_order_not_fetch_order() {
        let limits = vec![limit(1, "Food", 5_000, "2026-03-01", "2026-03-31")];
        let big_first = vec![
            expense(1, "Food", 6_000, "2026-03-02 08:00:00"),
            expense(2, "Food", 1_000, "2026-03-03 08:00:00"),
        ];
        let flagged = compute_exceeded_transactions(&limits, &big_first);
        assert_eq!(
            flagged.iter().map(|e| e.transaction.id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(flagged[0].exceeded_by_cents, 1_000);
        assert_eq!(flagged[1].exceeded_by_cents, 2_000);

        let small_first = vec![
            expense(1, "Food", 6_000, "2026-03-03 08:00:00"),
            expense(2, "Food", 1_000, "2026-03-02 08:00:00"),
        ];
        let flagged = compute_exceeded_transactions(&limits, &small_first);
        assert_eq!(
            flagged.iter().map(|e| e.transaction.id).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(flagged[0].exceeded_by_cents, 2_000);

        let mut reversed_fetch = big_first.clone();
        reversed_fetch.reverse();
        assert_eq!(
            compute_exceeded_transactions(&limits, &reversed_fetch),
            compute_exceeded_transactions(&limits, &big_first)
        );
    }

    #[test]
    fn same_day_ties_break_by_id() {
        let limits = vec![limit(1, "Food", 1_000, "2026-03-01", "2026-03-31")];
        let txs = vec![
            expense(9, "Food", 800, "2026-03-02 08:00:00"),
            expense(4, "Food", 800, "2026-03-02 08:00:00"),
        ];
        let flagged = compute_exceeded_transactions(&limits, &txs);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].transaction.id, 9);
    }

    #[test]
    fn first_transaction_alone_can_exceed() {
        let limits = vec![limit(1, "Bills", 1_000, "2026-03-01", "2026-03-31")];
        let txs = vec![expense(1, "Bills", 1_500, "2026-03-01 00:00:00")];
        let flagged = compute_exceeded_transactions(&limits, &txs);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].exceeded_by_cents, 500);
    }

    #[test]
    fn overlapping_limits_each_attribute_the_same_transaction() {
        let limits = vec![
            limit(1, "Food", 1_000, "2026-03-01", "2026-03-31"),
            limit(2, "Food", 500, "2026-03-10", "2026-03-20"),
        ];
        let txs = vec![expense(1, "Food", 1_200, "2026-03-15 12:00:00")];
        let flagged = compute_exceeded_transactions(&limits, &txs);
        assert_eq!(
            flagged.iter().map(|e| e.limit_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(flagged[0].exceeded_by_cents, 200);
        assert_eq!(flagged[1].exceeded_by_cents, 700);
    }

    #[test]
    fn huge_amounts_saturate_instead_of_overflowing() {
        let limits = vec![limit(1, "Food", 5_000, "2026-03-01", "2026-03-31")];
        let txs = vec![
            expense(1, "Food", 9_000_000_000_000_000_000, "2026-03-02 10:00:00"),
            expense(2, "Food", 9_000_000_000_000_000_000, "2026-03-03 10:00:00"),
        ];
        let statuses = compute_limit_statuses(&limits, &txs);
        assert_eq!(statuses[0].spent_cents, i64::MAX);
        assert!(statuses[0].exceeded);
        assert_eq!(statuses[0].remaining_cents, 5_000 - i64::MAX);

        let flagged = compute_exceeded_transactions(&limits, &txs);
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[1].running_total_cents, i64::MAX);
    }

    #[test]
    fn amounts_at_the_input_cap_sum_exactly() {
        let cap = crate::value_parsing::MAX_AMOUNT_CENTS;
        let limits = vec![limit(1, "Rent", cap, "2026-03-01", "2026-03-31")];
        let txs = (1..=3)
            .map(|id| expense(id, "Rent", cap, "2026-03-05 09:00:00"))
            .collect::<Vec<_>>();
        let status = &compute_limit_statuses(&limits, &txs)[0];
        assert_eq!(status.spent_cents, cap * 3);
        assert_eq!(status.exceeded_by_cents, cap * 2);
    }
}
