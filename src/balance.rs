use std::collections::HashMap;

use crate::schemas::{Expense, UserEmail};

pub type Balance = HashMap<UserEmail, f64>;

/// Net position of each member over the unsettled expenses: positive means
/// the member is owed money.
pub fn compute_balance(expenses: &[Expense]) -> Balance {
    let mut balance = Balance::new();
    for expense in expenses.iter().filter(|expense| is_open(expense)) {
        let amount = expense.amount;
        *balance.entry(expense.paid_by.clone()).or_insert(0.0) += amount;
        let share = amount / expense.split_between.len() as f64;
        for member in &expense.split_between {
            *balance.entry(member.clone()).or_insert(0.0) -= share;
        }
    }
    balance
}

pub fn total_amount(expenses: &[Expense]) -> f64 {
    expenses.iter().map(|expense| expense.amount).sum()
}

pub(crate) fn is_open(expense: &Expense) -> bool {
    !expense.settled && !expense.split_between.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn expense(amount: f64, paid_by: &str, split_between: &[&str]) -> Expense {
        Expense {
            id: crate::schemas::new_id(),
            group_id: "g1".to_string(),
            amount,
            description: "test".to_string(),
            paid_by: paid_by.to_string(),
            split_between: split_between.iter().map(|m| m.to_string()).collect(),
            date: Utc::now(),
            settled: false,
            receipt_id: None,
        }
    }

    #[test]
    fn payer_is_credited_and_members_debited() {
        let balance = compute_balance(&[expense(30.0, "a", &["a", "b", "c"])]);
        assert_eq!(balance["a"], 20.0);
        assert_eq!(balance["b"], -10.0);
        assert_eq!(balance["c"], -10.0);
    }

    #[test]
    fn settled_and_unsplit_expenses_are_ignored() {
        let mut settled = expense(50.0, "a", &["b"]);
        settled.settled = true;
        let unsplit = expense(10.0, "b", &[]);
        let balance = compute_balance(&[settled, unsplit, expense(8.0, "b", &["a"])]);
        assert_eq!(balance.len(), 2);
        assert_eq!(balance["a"], -8.0);
        assert_eq!(balance["b"], 8.0);
    }

    #[test]
    fn total_includes_settled_expenses() {
        let mut settled = expense(50.0, "a", &["b"]);
        settled.settled = true;
        assert_eq!(total_amount(&[settled, expense(12.5, "b", &["a"])]), 62.5);
        assert_eq!(total_amount(&[]), 0.0);
    }
}
