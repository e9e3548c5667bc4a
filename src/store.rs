use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreResult;
use crate::schemas::{Expense, Group, Notification, Reminder, Task, User};

/// Yields once per change that may affect the watched feed.
pub type ChangeStream = BoxStream<'static, StoreResult<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feed {
    Group,
    Expenses,
    Tasks,
    Reminders,
}

impl Feed {
    pub const ALL: [Feed; 4] = [Feed::Group, Feed::Expenses, Feed::Tasks, Feed::Reminders];
}

/// Remote document store backing a group.
///
/// Child mutations are scoped by `(group_id, id)` and return whether a
/// document matched.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn insert_group(&self, group: &Group) -> StoreResult<()>;
    async fn get_group(&self, group_id: &str) -> StoreResult<Option<Group>>;
    /// Adds the member unless already present.
    async fn add_group_member(&self, group_id: &str, email: &str) -> StoreResult<bool>;
    /// Replaces the member list, leaving every other field alone.
    async fn set_group_members(&self, group_id: &str, members: &[String]) -> StoreResult<bool>;
    /// Deletes the group with its expenses, tasks and reminders and inserts
    /// `notifications`, all in one atomic commit. Returns `false` without
    /// writing anything if the group does not exist.
    async fn delete_group(&self, group_id: &str, notifications: &[Notification])
        -> StoreResult<bool>;

    async fn list_expenses(&self, group_id: &str) -> StoreResult<Vec<Expense>>;
    async fn get_expense(&self, group_id: &str, expense_id: &str) -> StoreResult<Option<Expense>>;
    async fn insert_expense(&self, expense: &Expense) -> StoreResult<()>;
    async fn set_expense_settled(
        &self,
        group_id: &str,
        expense_id: &str,
        settled: bool,
    ) -> StoreResult<bool>;
    async fn delete_expense(&self, group_id: &str, expense_id: &str) -> StoreResult<bool>;

    async fn receipt_exists(&self, receipt_id: &str) -> StoreResult<bool>;
    async fn delete_receipt(&self, receipt_id: &str) -> StoreResult<bool>;

    async fn list_tasks(&self, group_id: &str) -> StoreResult<Vec<Task>>;
    async fn insert_task(&self, task: &Task) -> StoreResult<()>;
    async fn set_task_completed(
        &self,
        group_id: &str,
        task_id: &str,
        completed: bool,
    ) -> StoreResult<bool>;
    async fn delete_task(&self, group_id: &str, task_id: &str) -> StoreResult<bool>;

    async fn list_reminders(&self, group_id: &str) -> StoreResult<Vec<Reminder>>;
    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()>;
    async fn set_reminder_completed(
        &self,
        group_id: &str,
        reminder_id: &str,
        completed: bool,
    ) -> StoreResult<bool>;

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
    async fn list_notifications(&self, recipient_email: &str) -> StoreResult<Vec<Notification>>;

    async fn watch(&self, feed: Feed, group_id: &str) -> StoreResult<ChangeStream>;
}
