use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// A categorized transaction extracted from a statement line.
///
/// `amount` is always a non-negative magnitude; `reversal` marks records
/// (virtual-debit corrections and refunds) that negate an earlier purchase.
/// `visa_debit_id` ties an original purchase to a later correction or refund
/// of the same underlying transaction and drives the resolver pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expense {
    pub date: NaiveDate,
    pub page: String,
    pub category: String,
    pub amount: Decimal,
    pub line: String,
    pub visa_debit_id: Option<String>,
    pub reversal: bool,
}

/// A returned-item (non-sufficient-funds) record.
///
/// Reported separately from expenses; never categorized or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Nsf {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub line: String,
}
