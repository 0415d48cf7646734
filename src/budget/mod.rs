//! Monthly budgets: the ceiling per owner, the spending aggregator and the
//! alert monitor.

mod aggregation;
mod alert;
mod core;

pub use aggregation::{BudgetStatus, budget_status, monthly_spend, percent_used};
pub use alert::{
    AlertBand, AlertCheck, AlertDecision, AlertEvent, AlertFailure, AlertRun,
    check_budget_alerts, create_budget_alert_table, evaluate, evaluate_and_notify,
};
pub use core::{Budget, BudgetId, create_budget_table, current_budget, set_budget};
