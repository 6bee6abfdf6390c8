pub mod api;
mod backup;
mod budgets;
pub mod config;
mod dashboard;
mod debts;
pub mod errors;
mod expense_limits;
mod goals;
mod ledger_db;
pub mod limit_engine;
pub mod preferences;
mod reports;
pub mod subscription_engine;
mod subscriptions;
#[cfg(test)]
mod test_support;
mod transactions;
mod value_parsing;

pub use api::{dispatch, ApiError, Method};
pub use backup::{
    export_backup_at_db_path, import_backup_at_db_path, BackupImportRequest, BackupSettings,
    BackupTransaction,
};
pub use budgets::{create_budget_at_db_path, query_budgets_at_db_path, BudgetCreateRequest};
pub use config::{default_ledger_db_path, init_tracing, AppConfig};
pub use dashboard::{query_dashboard_at_db_path, DashboardQueryRequest};
pub use debts::{
    create_debt_at_db_path, delete_debt_at_db_path, query_debt_summary_at_db_path,
    query_debts_at_db_path, summarize_debts, update_debt_status_at_db_path, Debt,
    DebtCreateRequest, DebtDeleteRequest, DebtStatus, DebtStatusUpdateRequest, DebtSummary,
    DebtSummaryQueryRequest, DebtType, DebtsQueryRequest, PersonDebtGroup,
};
pub use errors::{FinanceError, FinanceResult};
pub use expense_limits::{
    delete_expense_limit_at_db_path, derive_period, query_exceeded_transactions_at_db_path,
    query_expense_limit_status_at_db_path, query_expense_limits_at_db_path,
    upsert_expense_limit_at_db_path, ExceededTransactionsQueryRequest, ExpenseLimitDeleteRequest,
    ExpenseLimitStatusQueryRequest, ExpenseLimitUpsertRequest,
};
pub use goals::{create_goal_at_db_path, query_goals_at_db_path, GoalCreateRequest};
pub use ledger_db::{
    apply_embedded_migrations, inspect_status_at_path, open_ledger,
    query_admin_db_stats_at_path, reset_admin_db_data_at_path,
    reset_admin_transaction_data_at_path, LedgerAdminResetRequest, LedgerDbMigrateResult,
    LedgerDbStatus, ADMIN_RESET_CONFIRM_PHRASE,
};
pub use limit_engine::{
    compute_exceeded_transactions, compute_limit_statuses, count_statuses, in_period, spend_for,
    ExceededTransaction, ExpenseLimit, LimitStatus, LimitStatusCounts, PeriodType, Transaction,
    TransactionType,
};
pub use preferences::{
    format_amount, Currency, MemoryPreferencesStore, PreferencesStore, SqlitePreferencesStore,
    Theme, UserPreferences,
};
pub use reports::{
    build_period_report, export_report_csv_at_db_path, query_report_at_db_path, PeriodReport,
    ReportExportRequest, ReportQueryRequest,
};
pub use subscription_engine::{
    compute_subscription_summary, monthly_equivalent_cents, upcoming_payments,
    yearly_equivalent_cents, BillingCycle, Subscription, SubscriptionStatus, SubscriptionSummary,
};
pub use subscriptions::{
    create_subscription_at_db_path, delete_subscription_at_db_path,
    query_subscription_summary_at_db_path, query_subscriptions_at_db_path,
    query_upcoming_subscriptions_at_db_path, update_subscription_at_db_path,
    SubscriptionDeleteRequest, SubscriptionSummaryQueryRequest, SubscriptionUpsertRequest,
    SubscriptionsQueryRequest, UpcomingSubscriptionsQueryRequest,
};
pub use transactions::{
    create_transaction_at_db_path, delete_transaction_at_db_path, query_monthly_stats_at_db_path,
    query_transactions_at_db_path, MonthlyStatsQueryRequest, TransactionCreateRequest,
    TransactionDeleteRequest, TransactionsQueryRequest,
};
pub use value_parsing::AmountInput;
