use std::collections::HashMap;

use tracing::debug;

use crate::model::Expense;

/// Removes matched original/correction pairs of virtual-debit expenses.
///
/// A correction or refund line carries the same correlation id as the
/// purchase it cancels, so both records describe money that was never spent.
/// The pass walks the list in order: the first record carrying an id is
/// remembered; the second record with the same id removes both. Only one
/// removal pair per id: a third or later occurrence is logged and left in
/// place, and records without an id are never touched. Running the pass on
/// its own output removes nothing further.
pub fn resolve_corrections(mut expenses: Vec<Expense>) -> Vec<Expense> {
    debug!(count = expenses.len(), "resolving virtual debit corrections");

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut removed = vec![false; expenses.len()];
    for (index, expense) in expenses.iter().enumerate() {
        let Some(id) = expense.visa_debit_id.as_deref() else {
            continue;
        };
        match first_seen.get(id) {
            Some(&original) if !removed[original] => {
                debug!(%id, "removing corrected expense pair");
                removed[original] = true;
                removed[index] = true;
            }
            Some(_) => {
                debug!(%id, "correction pair already removed, leaving record");
            }
            None => {
                first_seen.insert(id.to_owned(), index);
            }
        }
    }

    let mut index = 0;
    expenses.retain(|_| {
        let keep = !removed[index];
        index += 1;
        keep
    });
    debug!(count = expenses.len(), "expenses remain after resolving");
    expenses
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    use helpers::*;

    #[test]
    fn should_remove_a_purchase_and_its_correction() {
        let resolved = resolve_corrections(vec![
            expense("Coffee", Some("111"), false),
            expense("Groceries", None, false),
            expense("Coffee", Some("111"), true),
        ]);
        assert_eq!(vec![expense("Groceries", None, false)], resolved);
    }

    #[test]
    fn should_keep_an_unpaired_purchase() {
        let expenses = vec![
            expense("Coffee", Some("111"), false),
            expense("Groceries", Some("222"), false),
            expense("Coffee", Some("111"), true),
        ];
        let resolved = resolve_corrections(expenses);
        assert_eq!(vec![expense("Groceries", Some("222"), false)], resolved);
        assert!(!resolved[0].reversal);
    }

    #[test]
    fn should_never_touch_records_without_an_id() {
        let expenses = vec![
            expense("Coffee", None, false),
            expense("Coffee", None, false),
        ];
        assert_eq!(expenses.clone(), resolve_corrections(expenses));
    }

    #[test]
    fn should_pair_only_the_first_two_occurrences_of_an_id() {
        let resolved = resolve_corrections(vec![
            expense("Coffee", Some("111"), false),
            expense("Coffee", Some("111"), true),
            expense("Coffee", Some("111"), false),
        ]);
        assert_eq!(vec![expense("Coffee", Some("111"), false)], resolved);
    }

    #[test]
    fn should_be_idempotent() {
        let resolved = resolve_corrections(vec![
            expense("Coffee", Some("111"), false),
            expense("Coffee", Some("111"), true),
            expense("Coffee", Some("111"), false),
            expense("Groceries", Some("222"), false),
        ]);
        assert_eq!(resolved.clone(), resolve_corrections(resolved));
    }

    mod helpers {
        use chrono::NaiveDate;

        use super::super::*;
        use super::dec;

        pub(super) fn expense(line: &str, visa_debit_id: Option<&str>, reversal: bool) -> Expense {
            Expense {
                date: NaiveDate::from_ymd_opt(2023, 1, 15).expect("valid date"),
                page: "Food".to_owned(),
                category: "Dining".to_owned(),
                amount: dec!(4.50),
                line: line.to_owned(),
                visa_debit_id: visa_debit_id.map(str::to_owned),
                reversal,
            }
        }
    }
}
