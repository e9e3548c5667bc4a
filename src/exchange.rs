use crate::balance::{compute_balance, is_open};
use crate::schemas::{Expense, UserEmail};
use serde::Serialize;
use std::collections::HashMap;
use std::mem::swap;

// Anything below half a cent is rounding noise.
const CENT_EPSILON: f64 = 0.005;

#[derive(Clone, Debug)]
struct PersonalBalance {
    email: UserEmail,
    balance: f64,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct MemberPair {
    first: UserEmail,
    second: UserEmail,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub payer: UserEmail,
    pub receiver: UserEmail,
    pub amount: f64,
}

// The exchanges that will be made if no simplification happens
fn get_naive_exchanges(expenses: &[Expense]) -> Vec<Exchange> {
    let mut balances_between_members: HashMap<MemberPair, f64> = HashMap::new();

    for expense in expenses.iter().filter(|expense| is_open(expense)) {
        let share = expense.amount / expense.split_between.len() as f64;
        for member in &expense.split_between {
            if *member == expense.paid_by {
                continue;
            }
            let mut pair = MemberPair {
                first: expense.paid_by.clone(),
                second: member.clone(),
            };
            let mut amount = share;

            // Alphabetical order keeps every debt between the same two
            // members on the same entry
            if pair.first > pair.second {
                swap(&mut pair.first, &mut pair.second);
                amount = -amount;
            }

            *balances_between_members.entry(pair).or_insert(0.0) += amount;
        }
    }

    // A positive balance means `second` owes `first`
    let mut exchanges = Vec::new();
    for (pair, balance) in balances_between_members {
        if balance.abs() < CENT_EPSILON {
            continue;
        }
        let mut payer = pair.second;
        let mut receiver = pair.first;
        if balance < 0.0 {
            swap(&mut payer, &mut receiver);
        }
        exchanges.push(Exchange {
            payer,
            receiver,
            amount: round_to_2_decimals(balance.abs()),
        });
    }
    exchanges
}

// Greedily matches the largest debtor with the largest creditor
fn get_simplified_exchanges(
    mut payers: Vec<PersonalBalance>,
    mut receivers: Vec<PersonalBalance>,
) -> Vec<Exchange> {
    payers.sort_by(|a, b| a.balance.total_cmp(&b.balance));
    receivers.sort_by(|a, b| a.balance.total_cmp(&b.balance));

    let mut exchanges = Vec::new();
    while let (Some(payer), Some(receiver)) = (payers.last_mut(), receivers.last_mut()) {
        let amount = payer.balance.min(receiver.balance);
        exchanges.push(Exchange {
            payer: payer.email.clone(),
            receiver: receiver.email.clone(),
            amount: round_to_2_decimals(amount),
        });
        payer.balance -= amount;
        receiver.balance -= amount;
        if payer.balance < CENT_EPSILON {
            payers.pop();
        }
        if receiver.balance < CENT_EPSILON {
            receivers.pop();
        }
    }
    exchanges
}

fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Suggested payments that settle every open expense of a group.
pub fn get_exchanges(expenses: &[Expense]) -> Vec<Exchange> {
    // Divide members into payers and receivers
    let mut payers = Vec::new();
    let mut receivers = Vec::new();
    for (email, balance) in compute_balance(expenses) {
        let member = PersonalBalance {
            email,
            balance: balance.abs(),
        };
        if balance <= -CENT_EPSILON {
            payers.push(member);
        } else if balance >= CENT_EPSILON {
            receivers.push(member);
        }
    }

    let naive_exchanges = get_naive_exchanges(expenses);
    let simplified_exchanges = get_simplified_exchanges(payers, receivers);

    // The greedy pass is not guaranteed to beat the pairwise one
    if simplified_exchanges.len() < naive_exchanges.len() {
        simplified_exchanges
    } else {
        naive_exchanges
    }
}
