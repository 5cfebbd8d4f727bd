mod chequing;
mod visa;

use chrono::{Datelike, NaiveDate};
use color_eyre::eyre::{anyhow, Context};
use color_eyre::Result;
use rust_decimal::Decimal;
use tracing::debug;

use crate::categories::CategoryIndex;
use crate::model::{Expense, Nsf};

use chequing::ChequingClassifier;
use visa::VisaClassifier;

/// Statement-name markers used to pick a classifier for a statement file.
const CHEQUING_NAME_MARKER: &str = "Chequing";
const VISA_NAME_MARKER: &str = "Visa";

pub(crate) const MONTH_ABBREVS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `Jan|Feb|...|Dec`, for embedding in date regexes.
pub(crate) fn month_alternation() -> String {
    MONTH_ABBREVS.join("|")
}

/// Month number for a three-letter abbreviation, case-insensitive.
pub(crate) fn month_number(abbrev: &str) -> Option<u32> {
    MONTH_ABBREVS
        .iter()
        .position(|month| month.eq_ignore_ascii_case(abbrev))
        .map(|index| index as u32 + 1)
}

/// Parses a currency magnitude such as `1,234.56` into a `Decimal`.
pub(crate) fn parse_amount(raw: &str) -> Result<Decimal> {
    raw.replace(',', "")
        .parse()
        .with_context(|| format!("Could not parse amount '{raw}'"))
}

/// Tracks the active transaction date while scanning a statement.
///
/// Statement lines carry only day and month; the year is inferred from the
/// statement's start date and rolled over at the two calendar boundaries a
/// statement can cross:
///
/// 1. the first dated line is in December: the statement started in the
///    prior calendar year, so the tracked year is decremented before the
///    date is built;
/// 2. a December line is followed by a January line: the statement spans
///    the year end, so the tracked year is incremented.
///
/// Lines without a date token inherit the current date unchanged.
#[derive(Debug)]
pub struct DateTracker {
    current_date: Option<NaiveDate>,
    current_year: i32,
}

impl DateTracker {
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            current_date: None,
            current_year: start_date.year(),
        }
    }

    /// Applies a date token found at the start of a line and returns the
    /// resolved date.
    pub fn advance(&mut self, month: u32, day: u32) -> Result<NaiveDate> {
        if self.current_date.is_none() && month == 12 {
            debug!(
                year = self.current_year - 1,
                "statement starts in December of the prior year"
            );
            self.current_year -= 1;
        }
        if let Some(previous) = self.current_date {
            if previous.month() == 12 && month == 1 {
                debug!(year = self.current_year + 1, "statement crosses the year end");
                self.current_year += 1;
            }
        }
        let date = NaiveDate::from_ymd_opt(self.current_year, month, day).ok_or_else(|| {
            anyhow!(
                "Could not build a valid date from year={}, month={month}, day={day}",
                self.current_year
            )
        })?;
        self.current_date = Some(date);
        Ok(date)
    }

    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current_date
    }

    /// The tracked date, required by a line that produces a record.
    fn require_date(&self, line: &str) -> Result<NaiveDate> {
        self.current_date
            .ok_or_else(|| anyhow!("No transaction date in effect for line '{line}'"))
    }
}

/// What the classifier made of one line.
pub enum LineOutcome {
    /// Noise, a header/footer, or a bare date line.
    Skip,
    Expense(Expense),
    Nsf(Nsf),
}

/// A classification outcome plus the number of lines beyond the current one
/// consumed by amount lookahead. The scanner advances its cursor past those
/// lines so they are not reprocessed as independent candidates.
pub struct Classified {
    pub outcome: LineOutcome,
    pub lookahead: usize,
}

impl Classified {
    fn skip() -> Self {
        Self {
            outcome: LineOutcome::Skip,
            lookahead: 0,
        }
    }

    fn expense(expense: Expense, lookahead: usize) -> Self {
        Self {
            outcome: LineOutcome::Expense(expense),
            lookahead,
        }
    }

    fn nsf(nsf: Nsf) -> Self {
        Self {
            outcome: LineOutcome::Nsf(nsf),
            lookahead: 0,
        }
    }
}

/// Format-specific line recognition for one statement family.
pub trait LineClassifier {
    /// The header line that marks the start of transaction items on a page.
    fn start_marker(&self) -> &'static str;

    /// Classifies `lines[index]`. `previous_line` is the last line already
    /// fed to the classifier, possibly carried over from the prior page;
    /// lines after `index` are available for amount lookahead.
    fn classify(
        &self,
        categories: &CategoryIndex,
        tracker: &mut DateTracker,
        lines: &[&str],
        index: usize,
        previous_line: &str,
    ) -> Result<Classified>;
}

/// The records produced by one page, plus the final previous-line value to
/// seed the next page's scan.
pub struct PageScan {
    pub expenses: Vec<Expense>,
    pub nsfs: Vec<Nsf>,
    pub last_line: String,
}

/// Scans one statement line by line, page by page.
///
/// Owns the per-statement date-tracker state; one instance per statement,
/// never shared.
pub struct StatementParser<'a> {
    categories: &'a CategoryIndex,
    tracker: DateTracker,
    classifier: Box<dyn LineClassifier>,
}

impl<'a> StatementParser<'a> {
    /// Picks a classifier by matching the statement's identifying name
    /// against the known format markers. `None` when no format matches.
    pub fn for_statement(
        name: &str,
        start_date: NaiveDate,
        categories: &'a CategoryIndex,
    ) -> Option<Self> {
        let classifier: Box<dyn LineClassifier> = if name.contains(CHEQUING_NAME_MARKER) {
            Box::new(ChequingClassifier)
        } else if name.contains(VISA_NAME_MARKER) {
            Box::new(VisaClassifier)
        } else {
            return None;
        };
        Some(Self {
            categories,
            tracker: DateTracker::new(start_date),
            classifier,
        })
    }

    /// Processes one page of extracted text lines.
    ///
    /// Lines before the format's header marker are skipped. A page with no
    /// marker yields no records and passes `previous_line` through
    /// unchanged. Date-tracker state persists across pages.
    pub fn process_page(&mut self, lines: &[&str], previous_line: &str) -> Result<PageScan> {
        let mut found_start = false;
        let mut previous = previous_line.to_string();
        let mut expenses = Vec::new();
        let mut nsfs = Vec::new();

        let mut index = 0;
        while index < lines.len() {
            let line = lines[index];
            if line == self.classifier.start_marker() {
                debug!(line_number = index + 1, "found header");
                found_start = true;
                index += 1;
                continue;
            }
            if !found_start {
                index += 1;
                continue;
            }

            let classified =
                self.classifier
                    .classify(self.categories, &mut self.tracker, lines, index, &previous)?;
            previous = line.to_string();
            match classified.outcome {
                LineOutcome::Skip => {}
                LineOutcome::Expense(expense) => expenses.push(expense),
                LineOutcome::Nsf(nsf) => nsfs.push(nsf),
            }
            index += 1 + classified.lookahead;
        }

        Ok(PageScan {
            expenses,
            nsfs,
            last_line: previous,
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    use helpers::*;

    #[test]
    fn should_keep_the_start_year_for_ordinary_dates() {
        let mut tracker = DateTracker::new(date(2023, 6, 1));
        assert_eq!(date(2023, 6, 15), tracker.advance(6, 15).expect("date"));
        assert_eq!(date(2023, 7, 2), tracker.advance(7, 2).expect("date"));
    }

    #[test]
    fn should_roll_back_the_year_when_the_first_date_is_in_december() {
        let mut tracker = DateTracker::new(date(2023, 1, 5));
        assert_eq!(date(2022, 12, 28), tracker.advance(12, 28).expect("date"));
        // January after the December start lands back in the statement year
        assert_eq!(date(2023, 1, 3), tracker.advance(1, 3).expect("date"));
    }

    #[test]
    fn should_roll_back_the_year_even_when_the_statement_starts_in_december() {
        let mut tracker = DateTracker::new(date(2023, 12, 14));
        assert_eq!(date(2022, 12, 20), tracker.advance(12, 20).expect("date"));
        assert_eq!(date(2023, 1, 4), tracker.advance(1, 4).expect("date"));
    }

    #[test]
    fn should_roll_forward_the_year_across_a_december_january_boundary() {
        let mut tracker = DateTracker::new(date(2023, 12, 14));
        assert_eq!(date(2023, 11, 30), tracker.advance(11, 30).expect("date"));
        assert_eq!(date(2023, 12, 20), tracker.advance(12, 20).expect("date"));
        assert_eq!(date(2024, 1, 4), tracker.advance(1, 4).expect("date"));
        assert_eq!(date(2024, 1, 9), tracker.advance(1, 9).expect("date"));
    }

    #[test]
    fn should_not_roll_the_year_for_a_late_december_date_after_the_first() {
        let mut tracker = DateTracker::new(date(2023, 12, 14));
        tracker.advance(11, 30).expect("date");
        assert_eq!(date(2023, 12, 1), tracker.advance(12, 1).expect("date"));
    }

    #[test]
    fn should_reject_an_invalid_calendar_date() {
        let mut tracker = DateTracker::new(date(2023, 6, 1));
        assert!(tracker.advance(2, 30).is_err());
        assert_eq!(None, tracker.current_date());
    }

    #[test]
    fn should_pick_the_classifier_from_the_statement_name() {
        let categories = CategoryIndex::default();
        assert!(StatementParser::for_statement(
            "Chequing Account 2023-02-10",
            date(2023, 2, 10),
            &categories
        )
        .is_some());
        assert!(StatementParser::for_statement(
            "Visa Statement 2023-02-10",
            date(2023, 2, 10),
            &categories
        )
        .is_some());
        assert!(
            StatementParser::for_statement("Mystery 2023-02-10", date(2023, 2, 10), &categories)
                .is_none()
        );
    }

    #[test]
    fn should_produce_no_records_before_the_header_marker() {
        let categories = coffee_categories();
        let mut parser = chequing_parser(&categories, date(2023, 1, 5));
        let scan = parser
            .process_page(
                &[
                    "Some preamble",
                    "15 Jan Interac purchase - 1234 COFFEE SHOP 4.50",
                ],
                "",
            )
            .expect("scan");
        assert!(scan.expenses.is_empty());
        assert!(scan.nsfs.is_empty());
    }

    #[test]
    fn should_pass_the_previous_line_through_a_page_with_no_header() {
        let categories = coffee_categories();
        let mut parser = chequing_parser(&categories, date(2023, 1, 5));
        let scan = parser
            .process_page(&["Closing balance 1,234.56"], "carried over")
            .expect("scan");
        assert!(scan.expenses.is_empty());
        assert_eq!("carried over", scan.last_line);
    }

    #[test]
    fn should_keep_tracker_state_across_pages() {
        let categories = coffee_categories();
        let mut parser = chequing_parser(&categories, date(2023, 1, 5));
        let first = parser
            .process_page(&[chequing_header(), "15 Jan Opening balance"], "")
            .expect("scan");
        assert!(first.expenses.is_empty());
        // The second page's expense has no date token and inherits 15 Jan
        let second = parser
            .process_page(&[chequing_header(), "COFFEE SHOP 4.50"], &first.last_line)
            .expect("scan");
        assert_eq!(1, second.expenses.len());
        assert_eq!(date(2023, 1, 15), second.expenses[0].date);
    }

    mod helpers {
        use chrono::NaiveDate;

        use super::super::chequing::ChequingClassifier;
        use super::super::*;

        pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
            NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
        }

        pub(super) fn coffee_categories() -> CategoryIndex {
            crate::categories::test_support::index_from_json(
                r#"{ "Food": { "Dining": { "COFFEE SHOP": "Coffee" } } }"#,
            )
        }

        pub(super) fn chequing_header() -> &'static str {
            ChequingClassifier.start_marker()
        }

        pub(super) fn chequing_parser(
            categories: &CategoryIndex,
            start_date: NaiveDate,
        ) -> StatementParser<'_> {
            StatementParser::for_statement("Chequing Account", start_date, categories)
                .expect("parser")
        }
    }
}
