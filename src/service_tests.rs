use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;

use crate::auth::Actor;
use crate::error::ApiError;
use crate::memory::InMemoryStore;
use crate::schemas::{Group, NotificationKind, Receipt, User};
use crate::service::{GroupService, NewExpense, NewReminder, NewTask};
use crate::store::Store;
use crate::urgency::Urgency;

fn actor(name: &str) -> Actor {
    Actor {
        email: format!("{name}@example.com"),
        username: name.to_string(),
    }
}

fn user(name: &str) -> User {
    User {
        id: crate::schemas::new_id(),
        email: format!("{name}@example.com"),
        username: name.to_string(),
        push_token: None,
    }
}

async fn fixture() -> (InMemoryStore, GroupService, Group) {
    let store = InMemoryStore::new();
    for name in ["alice", "bob", "carol"] {
        store.insert_user(user(name));
    }
    let service = GroupService::new(Arc::new(store.clone()));
    let group = service.create_group(&actor("alice"), " Flat ").await.unwrap();
    let group = service
        .add_member(&actor("alice"), &group.id, "bob@example.com")
        .await
        .unwrap();
    (store, service, group)
}

fn expense(amount: f64, split_between: &[&str]) -> NewExpense {
    NewExpense {
        amount,
        description: "Groceries".to_string(),
        paid_by: None,
        split_between: split_between.iter().map(|m| m.to_string()).collect(),
        date: None,
        receipt_id: None,
    }
}

#[tokio::test]
async fn creator_is_the_only_initial_member() {
    let store = InMemoryStore::new();
    let service = GroupService::new(Arc::new(store));
    let group = service.create_group(&actor("alice"), " Flat ").await.unwrap();
    assert_eq!(group.name, "Flat");
    assert_eq!(group.created_by, "alice@example.com");
    assert_eq!(group.members, vec!["alice@example.com"]);

    let err = service.create_group(&actor("alice"), "  ").await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn adding_a_member_notifies_them() {
    let (store, _, group) = fixture().await;
    assert_eq!(group.members, vec!["alice@example.com", "bob@example.com"]);

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].recipient_email, "bob@example.com");
    assert!(matches!(
        &notifications[0].kind,
        NotificationKind::GroupAddition { added_by, group_name, .. }
            if added_by == "alice@example.com" && group_name == "Flat"
    ));
}

#[tokio::test]
async fn adding_an_unknown_user_writes_nothing() {
    let (store, service, group) = fixture().await;
    let before = store.notifications().len();

    let err = service
        .add_member(&actor("alice"), &group.id, "nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "User not found"));

    let stored = store.get_group(&group.id).await.unwrap().unwrap();
    assert_eq!(stored, group);
    assert_eq!(store.notifications().len(), before);
}

#[tokio::test]
async fn member_emails_are_normalized() {
    let (store, service, group) = fixture().await;
    service
        .add_member(&actor("bob"), &group.id, "  CAROL@example.com ")
        .await
        .unwrap();
    let stored = store.get_group(&group.id).await.unwrap().unwrap();
    assert_eq!(
        stored.members,
        vec!["alice@example.com", "bob@example.com", "carol@example.com"]
    );
}

#[tokio::test]
async fn removing_a_member_only_touches_the_member_list() {
    let (store, service, group) = fixture().await;
    let updated = service
        .remove_member(&actor("alice"), &group.id, "bob@example.com")
        .await
        .unwrap();

    let stored = store.get_group(&group.id).await.unwrap().unwrap();
    assert_eq!(stored, updated);
    assert_eq!(stored.members, vec!["alice@example.com"]);
    assert_eq!(stored.name, group.name);
    assert_eq!(stored.created_by, group.created_by);
}

#[tokio::test]
async fn only_the_creator_removes_members_and_cannot_be_removed() {
    let (_, service, group) = fixture().await;
    let err = service
        .remove_member(&actor("bob"), &group.id, "alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = service
        .remove_member(&actor("alice"), &group.id, "alice@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn outsiders_cannot_read_a_group() {
    let (_, service, group) = fixture().await;
    let err = service.details(&actor("carol"), &group.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let err = service.details(&actor("alice"), "missing").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn total_expense_sums_every_expense() {
    let (_, service, group) = fixture().await;
    let alice = actor("alice");
    let first = service
        .add_expense(&alice, &group.id, expense(12.5, &["alice@example.com", "bob@example.com"]))
        .await
        .unwrap();
    service
        .add_expense(&alice, &group.id, expense(7.5, &["bob@example.com"]))
        .await
        .unwrap();
    service
        .set_expense_settled(&alice, &group.id, &first.id, true)
        .await
        .unwrap();

    let details = service.details(&alice, &group.id).await.unwrap();
    assert_eq!(details.expenses.len(), 2);
    assert_eq!(details.total_expense, 20.0);

    service.delete_expense(&alice, &group.id, &first.id).await.unwrap();
    let details = service.details(&alice, &group.id).await.unwrap();
    assert_eq!(details.total_expense, 7.5);
}

#[tokio::test]
async fn expenses_notify_split_members_except_the_actor() {
    let (store, service, group) = fixture().await;
    let before = store.notifications().len();
    let created = service
        .add_expense(
            &actor("alice"),
            &group.id,
            expense(30.0, &["alice@example.com", "Bob@example.com"]),
        )
        .await
        .unwrap();
    assert_eq!(created.paid_by, "alice@example.com");
    assert!(!created.settled);

    let notifications = store.notifications();
    assert_eq!(notifications.len(), before + 1);
    let last = &notifications[before];
    assert_eq!(last.recipient_email, "bob@example.com");
    assert!(matches!(
        last.kind,
        NotificationKind::GroupExpense { amount, .. } if amount == 30.0
    ));
}

#[tokio::test]
async fn invalid_expenses_are_rejected() {
    let (_, service, group) = fixture().await;
    for bad in [expense(0.0, &["bob@example.com"]), expense(f64::NAN, &["bob@example.com"]), expense(5.0, &[])] {
        let err = service
            .add_expense(&actor("alice"), &group.id, bad)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}

#[tokio::test]
async fn deleting_an_expense_removes_its_receipt() {
    let (store, service, group) = fixture().await;
    store.insert_receipt(Receipt {
        id: "r1".to_string(),
        image_url: Some("https://example.com/r1.jpg".to_string()),
    });
    let mut new_expense = expense(10.0, &["bob@example.com"]);
    new_expense.receipt_id = Some("r1".to_string());
    let created = service
        .add_expense(&actor("alice"), &group.id, new_expense)
        .await
        .unwrap();

    service
        .delete_expense(&actor("alice"), &group.id, &created.id)
        .await
        .unwrap();
    assert!(!store.has_receipt("r1"));
    assert!(store.list_expenses(&group.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn receipt_failures_do_not_block_expense_deletion() {
    let (store, service, group) = fixture().await;
    store.insert_receipt(Receipt {
        id: "r1".to_string(),
        image_url: None,
    });
    let mut new_expense = expense(10.0, &["bob@example.com"]);
    new_expense.receipt_id = Some("r1".to_string());
    let created = service
        .add_expense(&actor("alice"), &group.id, new_expense)
        .await
        .unwrap();

    store.set_receipts_unavailable(true);
    service
        .delete_expense(&actor("alice"), &group.id, &created.id)
        .await
        .unwrap();
    assert!(store.list_expenses(&group.id).await.unwrap().is_empty());
    assert!(store.has_receipt("r1"));
}

#[tokio::test]
async fn tasks_notify_the_assignee_and_carry_urgency() {
    let (store, service, group) = fixture().await;
    let before = store.notifications().len();
    let task = service
        .add_task(
            &actor("alice"),
            &group.id,
            NewTask {
                title: " Take out bins ".to_string(),
                assigned_to: "bob@example.com".to_string(),
                due_date: Utc::now() - chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(task.title, "Take out bins");

    let notifications = store.notifications();
    assert_eq!(notifications.len(), before + 1);
    assert!(matches!(
        &notifications[before].kind,
        NotificationKind::TaskAssigned { title, .. } if title == "Take out bins"
    ));

    service
        .set_task_completed(&actor("bob"), &group.id, &task.id, true)
        .await
        .unwrap();
    let details = service.details(&actor("bob"), &group.id).await.unwrap();
    assert!(details.tasks[0].item.completed);
    assert_eq!(details.tasks[0].urgency, Urgency::Overdue);

    service.delete_task(&actor("bob"), &group.id, &task.id).await.unwrap();
    let err = service
        .delete_task(&actor("bob"), &group.id, &task.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn reminders_are_sorted_and_notify_other_members() {
    let (store, service, group) = fixture().await;
    let before = store.notifications().len();
    let later = NewReminder {
        title: "Rent".to_string(),
        due_date: Utc::now() + chrono::Duration::days(3),
    };
    let sooner = NewReminder {
        title: "Water plants".to_string(),
        due_date: Utc::now() + chrono::Duration::hours(2),
    };
    service.add_reminder(&actor("alice"), &group.id, later).await.unwrap();
    let sooner = service.add_reminder(&actor("alice"), &group.id, sooner).await.unwrap();
    assert_eq!(store.notifications().len(), before + 2);

    let err = service
        .add_reminder(
            &actor("alice"),
            &group.id,
            NewReminder {
                title: "   ".to_string(),
                due_date: Utc::now(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "Please enter a reminder"));

    service
        .set_reminder_completed(&actor("bob"), &group.id, &sooner.id, true)
        .await
        .unwrap();
    let details = service.details(&actor("alice"), &group.id).await.unwrap();
    let titles: Vec<&str> = details
        .reminders
        .iter()
        .map(|reminder| reminder.item.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Water plants", "Rent"]);
    assert!(details.reminders[0].item.completed);
    assert_eq!(details.reminders[0].urgency, Urgency::Imminent);
    assert_eq!(details.reminders[1].urgency, Urgency::Normal);
}

#[tokio::test]
async fn only_the_creator_deletes_a_group() {
    let (store, service, group) = fixture().await;
    let err = service.delete_group(&actor("bob"), &group.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(ref msg) if msg == "Only group creator can delete the group"));
    assert!(store.get_group(&group.id).await.unwrap().is_some());
}

#[tokio::test]
async fn deleting_a_group_removes_everything_and_notifies_members() {
    let (store, service, group) = fixture().await;
    let alice = actor("alice");
    service
        .add_expense(&alice, &group.id, expense(10.0, &["bob@example.com"]))
        .await
        .unwrap();
    service
        .add_task(
            &alice,
            &group.id,
            NewTask {
                title: "Vacuum".to_string(),
                assigned_to: "bob@example.com".to_string(),
                due_date: Utc::now(),
            },
        )
        .await
        .unwrap();
    service
        .add_reminder(
            &alice,
            &group.id,
            NewReminder {
                title: "Rent".to_string(),
                due_date: Utc::now(),
            },
        )
        .await
        .unwrap();
    let other = service.create_group(&alice, "Trip").await.unwrap();
    service
        .add_expense(&alice, &other.id, expense(5.0, &["alice@example.com"]))
        .await
        .unwrap();

    service.delete_group(&alice, &group.id).await.unwrap();

    assert!(store.get_group(&group.id).await.unwrap().is_none());
    assert!(store.list_expenses(&group.id).await.unwrap().is_empty());
    assert!(store.list_tasks(&group.id).await.unwrap().is_empty());
    assert!(store.list_reminders(&group.id).await.unwrap().is_empty());
    assert_eq!(store.list_expenses(&other.id).await.unwrap().len(), 1);

    let deletions: Vec<_> = store
        .notifications()
        .into_iter()
        .filter(|n| matches!(n.kind, NotificationKind::GroupDeletion { .. }))
        .collect();
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].recipient_email, "bob@example.com");

    let err = service.delete_group(&alice, &group.id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn settle_up_covers_open_expenses() {
    let (_, service, group) = fixture().await;
    let alice = actor("alice");
    service
        .add_expense(
            &alice,
            &group.id,
            expense(20.0, &["alice@example.com", "bob@example.com"]),
        )
        .await
        .unwrap();

    let balance = service.balances(&alice, &group.id).await.unwrap();
    assert_eq!(balance["alice@example.com"], 10.0);
    assert_eq!(balance["bob@example.com"], -10.0);

    let exchanges = service.settle_up(&alice, &group.id).await.unwrap();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].payer, "bob@example.com");
    assert_eq!(exchanges[0].receiver, "alice@example.com");
    assert_eq!(exchanges[0].amount, 10.0);
}

#[tokio::test]
async fn notifications_are_listed_per_recipient() {
    let (_, service, group) = fixture().await;
    service
        .add_reminder(
            &actor("alice"),
            &group.id,
            NewReminder {
                title: "Rent".to_string(),
                due_date: Utc::now(),
            },
        )
        .await
        .unwrap();

    let bobs = service.notifications(&actor("bob")).await.unwrap();
    assert_eq!(bobs.len(), 2);
    assert!(bobs
        .iter()
        .any(|n| matches!(n.kind, NotificationKind::GroupReminder { .. })));
    assert!(service.notifications(&actor("alice")).await.unwrap().is_empty());
}

#[tokio::test]
async fn watch_ticks_on_group_changes() {
    let (_, service, group) = fixture().await;
    let mut changes = service.watch(&actor("bob"), &group.id).await.unwrap();

    service
        .add_expense(&actor("alice"), &group.id, expense(3.0, &["bob@example.com"]))
        .await
        .unwrap();

    let tick = tokio::time::timeout(Duration::from_secs(1), changes.next())
        .await
        .expect("change expected");
    assert!(matches!(tick, Some(Ok(()))));
}
