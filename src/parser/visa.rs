use std::sync::LazyLock;

use color_eyre::eyre::{anyhow, Context};
use color_eyre::Result;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::categories::CategoryIndex;
use crate::model::Expense;

use super::{
    month_alternation, month_number, parse_amount, Classified, DateTracker, LineClassifier,
};

/// Classifier for visa credit-card statements.
///
/// Item lines start with uppercase transaction and posting date tokens
/// (`"APR 27 APR 27 ..."`). The extracted text does not always keep the
/// dollar amount on the item line: it may land on one of the next two lines
/// as a trailing `$<amount>` token, so a category match triggers a bounded
/// lookahead and reports how many lines it consumed.
pub struct VisaClassifier;

const VISA_TABLE_HEADER: &str = "TRANSACTION POSTINGACTIVITY DESCRIPTION AMOUNT ($)DATE DATE";

/// How many lines past the matched one may carry the amount.
const AMOUNT_LOOKAHEAD: usize = 2;

const DAY_FIELD: &str = "day";
const MONTH_FIELD: &str = "month";
const AMOUNT_FIELD: &str = "amount";

static DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<{MONTH_FIELD}>{months}) (?P<{DAY_FIELD}>\d{{1,2}})\b",
        months = month_alternation().to_uppercase()
    ))
    .expect("regex")
});

static TRAILING_DOLLAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\$(?P<{AMOUNT_FIELD}>(?:\d{{1,3}},?)+\.\d{{2}})$"
    ))
    .expect("regex")
});

static LEADING_DATES_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:(?:{months}) \d{{1,2}} ?){{1,2}}",
        months = month_alternation().to_uppercase()
    ))
    .expect("regex")
});

/// Finds the amount for a matched item: inline first, then on the next up to
/// [`AMOUNT_LOOKAHEAD`] lines. Returns the amount and the number of extra
/// lines consumed.
fn find_amount(lines: &[&str], index: usize) -> Result<Option<(Decimal, usize)>> {
    for offset in 0..=AMOUNT_LOOKAHEAD {
        let Some(line) = lines.get(index + offset) else {
            break;
        };
        if let Some(groups) = TRAILING_DOLLAR_REGEX.captures(line) {
            return Ok(Some((parse_amount(&groups[AMOUNT_FIELD])?, offset)));
        }
    }
    Ok(None)
}

/// The display line used when the matched rule has no label: the line with
/// its leading transaction/posting date tokens and any inline trailing
/// amount stripped.
fn fallback_line(line: &str) -> String {
    let without_dates = LEADING_DATES_REGEX.replace(line, "");
    TRAILING_DOLLAR_REGEX
        .replace(&without_dates, "")
        .trim()
        .to_string()
}

impl LineClassifier for VisaClassifier {
    fn start_marker(&self) -> &'static str {
        VISA_TABLE_HEADER
    }

    fn classify(
        &self,
        categories: &CategoryIndex,
        tracker: &mut DateTracker,
        lines: &[&str],
        index: usize,
        _previous_line: &str,
    ) -> Result<Classified> {
        let line = lines[index];

        if let Some(groups) = DATE_REGEX.captures(line) {
            let day: u32 = groups[DAY_FIELD]
                .parse()
                .with_context(|| format!("Could not parse day '{}'", &groups[DAY_FIELD]))?;
            let month = month_number(&groups[MONTH_FIELD])
                .ok_or_else(|| anyhow!("Unknown month abbreviation '{}'", &groups[MONTH_FIELD]))?;
            let date = tracker.advance(month, day)?;
            debug!(%date, "changed current date");
        }

        let Some(rule) = categories.matching(line) else {
            return Ok(Classified::skip());
        };

        let (amount, lookahead) = find_amount(lines, index)?.ok_or_else(|| {
            anyhow!("Could not find an amount within {AMOUNT_LOOKAHEAD} lines of '{line}'")
        })?;
        if lookahead > 0 {
            debug!(lookahead, "found amount on a following line");
        }
        let expense = Expense {
            date: tracker.require_date(line)?,
            page: rule.page.clone(),
            category: rule.category.clone(),
            amount,
            line: rule
                .label
                .clone()
                .unwrap_or_else(|| fallback_line(line)),
            visa_debit_id: None,
            reversal: false,
        };
        Ok(Classified::expense(expense, lookahead))
    }
}
