//! Process-local `Store` for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::{StoreError, StoreResult};
use crate::schemas::{Expense, Group, Notification, Receipt, Reminder, Task, User};
use crate::store::{ChangeStream, Feed, Store};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
struct Change {
    feed: Feed,
    group_id: String,
}

#[derive(Default)]
struct Collections {
    users: Vec<User>,
    receipts: HashMap<String, Receipt>,
    groups: HashMap<String, Group>,
    expenses: Vec<Expense>,
    tasks: Vec<Task>,
    reminders: Vec<Reminder>,
    notifications: Vec<Notification>,
}

#[derive(Clone)]
pub struct InMemoryStore {
    data: Arc<RwLock<Collections>>,
    changes: broadcast::Sender<Change>,
    receipts_unavailable: Arc<AtomicBool>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            data: Arc::new(RwLock::new(Collections::default())),
            changes,
            receipts_unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn insert_user(&self, user: User) {
        self.write().users.push(user);
    }

    pub fn insert_receipt(&self, receipt: Receipt) {
        self.write().receipts.insert(receipt.id.clone(), receipt);
    }

    pub fn has_receipt(&self, receipt_id: &str) -> bool {
        self.read().receipts.contains_key(receipt_id)
    }

    /// Makes every receipt call fail, as an unreachable receipts collection would.
    pub fn set_receipts_unavailable(&self, unavailable: bool) {
        self.receipts_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.read().notifications.clone()
    }

    // A poisoned lock only means another thread panicked mid-test; the data
    // itself is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, feed: Feed, group_id: &str) {
        // No subscribers is not an error.
        let _ = self.changes.send(Change {
            feed,
            group_id: group_id.to_string(),
        });
    }

    fn check_receipts(&self) -> StoreResult<()> {
        if self.receipts_unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("receipts"))
        } else {
            Ok(())
        }
    }
}

fn update_where<T>(
    items: &mut [T],
    matches: impl Fn(&T) -> bool,
    update: impl FnOnce(&mut T),
) -> bool {
    match items.iter_mut().find(|item| matches(item)) {
        Some(item) => {
            update(item);
            true
        }
        None => false,
    }
}

fn remove_where<T>(items: &mut Vec<T>, matches: impl Fn(&T) -> bool) -> bool {
    let before = items.len();
    items.retain(|item| !matches(item));
    items.len() != before
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()
            .users
            .iter()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        self.write().groups.insert(group.id.clone(), group.clone());
        self.publish(Feed::Group, &group.id);
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> StoreResult<Option<Group>> {
        Ok(self.read().groups.get(group_id).cloned())
    }

    async fn add_group_member(&self, group_id: &str, email: &str) -> StoreResult<bool> {
        let found = match self.write().groups.get_mut(group_id) {
            Some(group) => {
                if !group.has_member(email) {
                    group.members.push(email.to_string());
                }
                true
            }
            None => false,
        };
        if found {
            self.publish(Feed::Group, group_id);
        }
        Ok(found)
    }

    async fn set_group_members(&self, group_id: &str, members: &[String]) -> StoreResult<bool> {
        let found = match self.write().groups.get_mut(group_id) {
            Some(group) => {
                group.members = members.to_vec();
                true
            }
            None => false,
        };
        if found {
            self.publish(Feed::Group, group_id);
        }
        Ok(found)
    }

    async fn delete_group(
        &self,
        group_id: &str,
        notifications: &[Notification],
    ) -> StoreResult<bool> {
        {
            let mut data = self.write();
            if data.groups.remove(group_id).is_none() {
                return Ok(false);
            }
            data.expenses.retain(|expense| expense.group_id != group_id);
            data.tasks.retain(|task| task.group_id != group_id);
            data.reminders.retain(|reminder| reminder.group_id != group_id);
            data.notifications.extend_from_slice(notifications);
        }
        for feed in Feed::ALL {
            self.publish(feed, group_id);
        }
        Ok(true)
    }

    async fn list_expenses(&self, group_id: &str) -> StoreResult<Vec<Expense>> {
        Ok(self
            .read()
            .expenses
            .iter()
            .filter(|expense| expense.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn get_expense(&self, group_id: &str, expense_id: &str) -> StoreResult<Option<Expense>> {
        Ok(self
            .read()
            .expenses
            .iter()
            .find(|expense| expense.group_id == group_id && expense.id == expense_id)
            .cloned())
    }

    async fn insert_expense(&self, expense: &Expense) -> StoreResult<()> {
        self.write().expenses.push(expense.clone());
        self.publish(Feed::Expenses, &expense.group_id);
        Ok(())
    }

    async fn set_expense_settled(
        &self,
        group_id: &str,
        expense_id: &str,
        settled: bool,
    ) -> StoreResult<bool> {
        let found = update_where(
            &mut self.write().expenses,
            |expense| expense.group_id == group_id && expense.id == expense_id,
            |expense| expense.settled = settled,
        );
        if found {
            self.publish(Feed::Expenses, group_id);
        }
        Ok(found)
    }

    async fn delete_expense(&self, group_id: &str, expense_id: &str) -> StoreResult<bool> {
        let found = remove_where(&mut self.write().expenses, |expense| {
            expense.group_id == group_id && expense.id == expense_id
        });
        if found {
            self.publish(Feed::Expenses, group_id);
        }
        Ok(found)
    }

    async fn receipt_exists(&self, receipt_id: &str) -> StoreResult<bool> {
        self.check_receipts()?;
        Ok(self.has_receipt(receipt_id))
    }

    async fn delete_receipt(&self, receipt_id: &str) -> StoreResult<bool> {
        self.check_receipts()?;
        Ok(self.write().receipts.remove(receipt_id).is_some())
    }

    async fn list_tasks(&self, group_id: &str) -> StoreResult<Vec<Task>> {
        Ok(self
            .read()
            .tasks
            .iter()
            .filter(|task| task.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.write().tasks.push(task.clone());
        self.publish(Feed::Tasks, &task.group_id);
        Ok(())
    }

    async fn set_task_completed(
        &self,
        group_id: &str,
        task_id: &str,
        completed: bool,
    ) -> StoreResult<bool> {
        let found = update_where(
            &mut self.write().tasks,
            |task| task.group_id == group_id && task.id == task_id,
            |task| task.completed = completed,
        );
        if found {
            self.publish(Feed::Tasks, group_id);
        }
        Ok(found)
    }

    async fn delete_task(&self, group_id: &str, task_id: &str) -> StoreResult<bool> {
        let found = remove_where(&mut self.write().tasks, |task| {
            task.group_id == group_id && task.id == task_id
        });
        if found {
            self.publish(Feed::Tasks, group_id);
        }
        Ok(found)
    }

    async fn list_reminders(&self, group_id: &str) -> StoreResult<Vec<Reminder>> {
        let mut reminders: Vec<Reminder> = self
            .read()
            .reminders
            .iter()
            .filter(|reminder| reminder.group_id == group_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|reminder| reminder.due_date);
        Ok(reminders)
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()> {
        self.write().reminders.push(reminder.clone());
        self.publish(Feed::Reminders, &reminder.group_id);
        Ok(())
    }

    async fn set_reminder_completed(
        &self,
        group_id: &str,
        reminder_id: &str,
        completed: bool,
    ) -> StoreResult<bool> {
        let found = update_where(
            &mut self.write().reminders,
            |reminder| reminder.group_id == group_id && reminder.id == reminder_id,
            |reminder| reminder.completed = completed,
        );
        if found {
            self.publish(Feed::Reminders, group_id);
        }
        Ok(found)
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.write().notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, recipient_email: &str) -> StoreResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .read()
            .notifications
            .iter()
            .filter(|notification| notification.recipient_email == recipient_email)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn watch(&self, feed: Feed, group_id: &str) -> StoreResult<ChangeStream> {
        let receiver = self.changes.subscribe();
        let group_id = group_id.to_string();
        let changes = stream::unfold(receiver, move |mut receiver| {
            let group_id = group_id.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(change) if change.feed == feed && change.group_id == group_id => {
                            return Some((Ok::<_, StoreError>(()), receiver))
                        }
                        Ok(_) => continue,
                        // Missed changes still mean the feed must be re-read.
                        Err(RecvError::Lagged(_)) => return Some((Ok(()), receiver)),
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(changes.boxed())
    }
}
