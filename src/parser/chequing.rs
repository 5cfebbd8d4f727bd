use std::sync::LazyLock;

use color_eyre::eyre::{anyhow, Context};
use color_eyre::Result;
use regex::Regex;
use tracing::debug;

use crate::categories::CategoryIndex;
use crate::model::{Expense, Nsf};

use super::{
    month_alternation, month_number, parse_amount, Classified, DateTracker, LineClassifier,
};

/// Classifier for chequing-account statements.
///
/// Transaction items start after the withdrawals/deposits table header. Each
/// item line carries its amount inline, and may be preceded by a date token
/// (`"15 Jan"`); undated lines inherit the last seen date. Two special line
/// shapes exist on top of the category-matched items:
///
/// - `"Item returned NSF <amount>"`, a returned item, reported separately;
/// - `"Visa Debit <purchase|correction|refund> - <id>"`, a virtual-debit
///   header announcing that the *next* line describes the identified
///   transaction; corrections and refunds mark that record as a reversal.
pub struct ChequingClassifier;

const CHEQUING_TABLE_HEADER: &str = "Date Description Withdrawals ($) Deposits ($) Balance ($)";

const DAY_FIELD: &str = "day";
const MONTH_FIELD: &str = "month";
const AMOUNT_FIELD: &str = "amount";
const KIND_FIELD: &str = "kind";
const ID_FIELD: &str = "id";

static DATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?P<{DAY_FIELD}>\d{{1,2}}) (?P<{MONTH_FIELD}>{months})\b",
        months = month_alternation()
    ))
    .expect("regex")
});

static DOLLAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\d{1,3},?)+\.\d{2}").expect("regex"));

static NSF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^Item returned NSF (?P<{AMOUNT_FIELD}>(?:\d{{1,3}},?)+\.\d{{2}})"
    ))
    .expect("regex")
});

static VISA_DEBIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"Visa Debit (?P<{KIND_FIELD}>purchase|correction|refund) - (?P<{ID_FIELD}>\d+)"
    ))
    .expect("regex")
});

static INTERAC_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Interac purchase - \d+\s").expect("regex"));

/// Virtual-debit context announced by the previous line.
struct VirtualDebit {
    id: String,
    reversal: bool,
}

fn virtual_debit_context(previous_line: &str) -> Option<VirtualDebit> {
    let groups = VISA_DEBIT_REGEX.captures(previous_line)?;
    let kind = &groups[KIND_FIELD];
    let id = groups[ID_FIELD].to_owned();
    let reversal = kind != "purchase";
    debug!(%id, kind, "virtual debit context");
    Some(VirtualDebit { id, reversal })
}

/// The display line used when the matched rule has no label: the line
/// truncated at the amount, with the date token and the Interac
/// transaction-id prefix stripped.
fn fallback_line(line: &str, amount_start: usize) -> String {
    let prefix = line[..amount_start].trim_end();
    let without_date = DATE_REGEX.replace(prefix, "");
    INTERAC_PREFIX_REGEX
        .replace(without_date.trim_start(), "")
        .trim()
        .to_string()
}

impl LineClassifier for ChequingClassifier {
    fn start_marker(&self) -> &'static str {
        CHEQUING_TABLE_HEADER
    }

    fn classify(
        &self,
        categories: &CategoryIndex,
        tracker: &mut DateTracker,
        lines: &[&str],
        index: usize,
        previous_line: &str,
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

        if let Some(groups) = NSF_REGEX.captures(line) {
            let nsf = Nsf {
                date: tracker.require_date(line)?,
                amount: parse_amount(&groups[AMOUNT_FIELD])?,
                line: line.to_string(),
            };
            debug!(%nsf.amount, "item returned NSF");
            return Ok(Classified::nsf(nsf));
        }

        let Some(rule) = categories.matching(line) else {
            return Ok(Classified::skip());
        };

        let amount_match = DOLLAR_REGEX
            .find(line)
            .ok_or_else(|| anyhow!("Could not find an amount in '{line}'"))?;
        let amount = parse_amount(amount_match.as_str())?;
        let virtual_debit = virtual_debit_context(previous_line);
        let expense = Expense {
            date: tracker.require_date(line)?,
            page: rule.page.clone(),
            category: rule.category.clone(),
            amount,
            line: rule
                .label
                .clone()
                .unwrap_or_else(|| fallback_line(line, amount_match.start())),
            visa_debit_id: virtual_debit.as_ref().map(|debit| debit.id.clone()),
            reversal: virtual_debit.is_some_and(|debit| debit.reversal),
        };
        Ok(Classified::expense(expense, 0))
    }
}
