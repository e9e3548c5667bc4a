//! Group use cases.
//!
//! Every operation checks that the group exists and that the actor belongs
//! to it before touching the store. Notifications are written after the
//! primary write; failing to record one is logged and never fails the
//! operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::Actor;
use crate::balance::{compute_balance, total_amount, Balance};
use crate::error::ApiError;
use crate::exchange::{get_exchanges, Exchange};
use crate::schemas::{
    new_id, normalize_email, Expense, Group, Notification, NotificationKind, Reminder, Task,
    UserEmail,
};
use crate::store::{ChangeStream, Feed, Store};
use crate::urgency::{classify_now, Urgency};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub amount: f64,
    pub description: String,
    #[serde(default)]
    pub paid_by: Option<UserEmail>,
    pub split_between: Vec<UserEmail>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub receipt_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub assigned_to: UserEmail,
    pub due_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub title: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduled<T> {
    #[serde(flatten)]
    pub item: T,
    pub urgency: Urgency,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub email: UserEmail,
    pub admin: bool,
}

/// Everything the group screen shows, read in one go.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetails {
    pub group: Group,
    pub expenses: Vec<Expense>,
    pub tasks: Vec<Scheduled<Task>>,
    pub reminders: Vec<Scheduled<Reminder>>,
    pub members: Vec<Member>,
    pub total_expense: f64,
}

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn Store>,
}

impl GroupService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn load_group(&self, group_id: &str) -> Result<Group, ApiError> {
        self.store
            .get_group(group_id)
            .await
            .map_err(ApiError::store("Failed to load group details"))?
            .ok_or_else(|| ApiError::NotFound("Group not found".to_string()))
    }

    async fn member_group(&self, actor: &Actor, group_id: &str) -> Result<Group, ApiError> {
        let group = self.load_group(group_id).await?;
        if !group.has_member(&actor.email) {
            return Err(ApiError::Forbidden(
                "You are not a member of this group".to_string(),
            ));
        }
        Ok(group)
    }

    async fn notify(&self, notification: Notification) {
        if let Err(err) = self.store.insert_notification(&notification).await {
            warn!(
                error = %err,
                recipient = %notification.recipient_email,
                "failed to record notification"
            );
        }
    }

    pub async fn create_group(&self, actor: &Actor, name: &str) -> Result<Group, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Please enter a group name".to_string()));
        }
        let group = Group {
            id: new_id(),
            name: name.to_string(),
            created_by: actor.email.clone(),
            members: vec![actor.email.clone()],
        };
        self.store
            .insert_group(&group)
            .await
            .map_err(ApiError::store("Failed to create group"))?;
        info!(group_id = %group.id, created_by = %group.created_by, "group created");
        Ok(group)
    }

    pub async fn details(&self, actor: &Actor, group_id: &str) -> Result<GroupDetails, ApiError> {
        let group = self.member_group(actor, group_id).await?;
        let expenses = self
            .store
            .list_expenses(group_id)
            .await
            .map_err(ApiError::store("Failed to load group details"))?;
        let tasks = self
            .store
            .list_tasks(group_id)
            .await
            .map_err(ApiError::store("Failed to load group details"))?;
        let reminders = self
            .store
            .list_reminders(group_id)
            .await
            .map_err(ApiError::store("Failed to load group details"))?;

        let members = group
            .members
            .iter()
            .map(|email| Member {
                email: email.clone(),
                admin: *email == group.created_by,
            })
            .collect();
        Ok(GroupDetails {
            total_expense: total_amount(&expenses),
            expenses,
            tasks: tasks
                .into_iter()
                .map(|task| Scheduled {
                    urgency: classify_now(task.due_date),
                    item: task,
                })
                .collect(),
            reminders: reminders
                .into_iter()
                .map(|reminder| Scheduled {
                    urgency: classify_now(reminder.due_date),
                    item: reminder,
                })
                .collect(),
            members,
            group,
        })
    }

    pub async fn add_member(
        &self,
        actor: &Actor,
        group_id: &str,
        email: &str,
    ) -> Result<Group, ApiError> {
        let group = self.member_group(actor, group_id).await?;
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ApiError::BadRequest("Please enter an email".to_string()));
        }
        let user = self
            .store
            .find_user_by_email(&email)
            .await
            .map_err(ApiError::store("Failed to add member"))?;
        if user.is_none() {
            return Err(ApiError::BadRequest("User not found".to_string()));
        }

        let found = self
            .store
            .add_group_member(group_id, &email)
            .await
            .map_err(ApiError::store("Failed to add member"))?;
        if !found {
            return Err(ApiError::NotFound("Group not found".to_string()));
        }
        info!(group_id, member = %email, added_by = %actor.email, "member added");

        self.notify(Notification::unread(
            email.clone(),
            NotificationKind::GroupAddition {
                group_id: group_id.to_string(),
                group_name: group.name.clone(),
                added_by: actor.email.clone(),
                added_by_username: actor.username.clone(),
            },
        ))
        .await;

        let mut group = group;
        if !group.has_member(&email) {
            group.members.push(email);
        }
        Ok(group)
    }

    pub async fn remove_member(
        &self,
        actor: &Actor,
        group_id: &str,
        email: &str,
    ) -> Result<Group, ApiError> {
        let mut group = self.member_group(actor, group_id).await?;
        if group.created_by != actor.email {
            return Err(ApiError::Forbidden(
                "Only group creator can remove members".to_string(),
            ));
        }
        let email = normalize_email(email);
        if email == group.created_by {
            return Err(ApiError::BadRequest(
                "The group creator cannot be removed".to_string(),
            ));
        }

        group.members.retain(|member| *member != email);
        let found = self
            .store
            .set_group_members(group_id, &group.members)
            .await
            .map_err(ApiError::store("Failed to remove member"))?;
        if !found {
            return Err(ApiError::NotFound("Group not found".to_string()));
        }
        info!(group_id, member = %email, "member removed");
        Ok(group)
    }

    pub async fn add_expense(
        &self,
        actor: &Actor,
        group_id: &str,
        new_expense: NewExpense,
    ) -> Result<Expense, ApiError> {
        let group = self.member_group(actor, group_id).await?;
        if !new_expense.amount.is_finite() || new_expense.amount <= 0.0 {
            return Err(ApiError::BadRequest("Please enter a valid amount".to_string()));
        }
        let split_between: Vec<UserEmail> = new_expense
            .split_between
            .iter()
            .map(|email| normalize_email(email))
            .collect();
        if split_between.is_empty() {
            return Err(ApiError::BadRequest(
                "Please select who to split with".to_string(),
            ));
        }

        let expense = Expense {
            id: new_id(),
            group_id: group_id.to_string(),
            amount: new_expense.amount,
            description: new_expense.description.trim().to_string(),
            paid_by: new_expense
                .paid_by
                .as_deref()
                .map(normalize_email)
                .unwrap_or_else(|| actor.email.clone()),
            split_between,
            date: new_expense.date.unwrap_or_else(Utc::now),
            settled: false,
            receipt_id: new_expense.receipt_id,
        };
        self.store
            .insert_expense(&expense)
            .await
            .map_err(ApiError::store("Failed to add expense"))?;

        for member in expense
            .split_between
            .iter()
            .filter(|member| **member != actor.email)
        {
            self.notify(Notification::unread(
                member.clone(),
                NotificationKind::GroupExpense {
                    group_id: group_id.to_string(),
                    group_name: group.name.clone(),
                    created_by: actor.email.clone(),
                    created_by_username: actor.username.clone(),
                    amount: expense.amount,
                    description: expense.description.clone(),
                },
            ))
            .await;
        }
        Ok(expense)
    }

    pub async fn get_expense(
        &self,
        actor: &Actor,
        group_id: &str,
        expense_id: &str,
    ) -> Result<Expense, ApiError> {
        self.member_group(actor, group_id).await?;
        self.store
            .get_expense(group_id, expense_id)
            .await
            .map_err(ApiError::store("Failed to load expense"))?
            .ok_or_else(|| ApiError::NotFound("Expense not found".to_string()))
    }

    pub async fn set_expense_settled(
        &self,
        actor: &Actor,
        group_id: &str,
        expense_id: &str,
        settled: bool,
    ) -> Result<(), ApiError> {
        self.member_group(actor, group_id).await?;
        let found = self
            .store
            .set_expense_settled(group_id, expense_id, settled)
            .await
            .map_err(ApiError::store("Failed to update expense"))?;
        found
            .then_some(())
            .ok_or_else(|| ApiError::NotFound("Expense not found".to_string()))
    }

    pub async fn delete_expense(
        &self,
        actor: &Actor,
        group_id: &str,
        expense_id: &str,
    ) -> Result<(), ApiError> {
        let expense = self.get_expense(actor, group_id, expense_id).await?;

        if let Some(receipt_id) = &expense.receipt_id {
            if let Err(err) = self.delete_receipt(receipt_id).await {
                warn!(error = %err, receipt_id = %receipt_id, "failed to delete receipt, deleting expense anyway");
            }
        }

        let found = self
            .store
            .delete_expense(group_id, expense_id)
            .await
            .map_err(ApiError::store("Failed to delete expense"))?;
        if !found {
            return Err(ApiError::NotFound("Expense not found".to_string()));
        }
        info!(group_id, expense_id, "expense deleted");
        Ok(())
    }

    async fn delete_receipt(&self, receipt_id: &str) -> crate::error::StoreResult<()> {
        if self.store.receipt_exists(receipt_id).await? {
            self.store.delete_receipt(receipt_id).await?;
        }
        Ok(())
    }

    pub async fn add_task(
        &self,
        actor: &Actor,
        group_id: &str,
        new_task: NewTask,
    ) -> Result<Task, ApiError> {
        let group = self.member_group(actor, group_id).await?;
        let title = new_task.title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("Please enter a task".to_string()));
        }
        let task = Task {
            id: new_id(),
            group_id: group_id.to_string(),
            title: title.to_string(),
            assigned_to: normalize_email(&new_task.assigned_to),
            completed: false,
            due_date: new_task.due_date,
        };
        self.store
            .insert_task(&task)
            .await
            .map_err(ApiError::store("Failed to add task"))?;

        self.notify(Notification::unread(
            task.assigned_to.clone(),
            NotificationKind::TaskAssigned {
                group_id: group_id.to_string(),
                group_name: group.name,
                created_by: actor.email.clone(),
                created_by_username: actor.username.clone(),
                title: task.title.clone(),
                due_date: task.due_date,
            },
        ))
        .await;
        Ok(task)
    }

    pub async fn set_task_completed(
        &self,
        actor: &Actor,
        group_id: &str,
        task_id: &str,
        completed: bool,
    ) -> Result<(), ApiError> {
        self.member_group(actor, group_id).await?;
        let found = self
            .store
            .set_task_completed(group_id, task_id, completed)
            .await
            .map_err(ApiError::store("Failed to update task"))?;
        found
            .then_some(())
            .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
    }

    pub async fn delete_task(
        &self,
        actor: &Actor,
        group_id: &str,
        task_id: &str,
    ) -> Result<(), ApiError> {
        self.member_group(actor, group_id).await?;
        let found = self
            .store
            .delete_task(group_id, task_id)
            .await
            .map_err(ApiError::store("Failed to delete task"))?;
        found
            .then_some(())
            .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
    }

    pub async fn add_reminder(
        &self,
        actor: &Actor,
        group_id: &str,
        new_reminder: NewReminder,
    ) -> Result<Reminder, ApiError> {
        let group = self.member_group(actor, group_id).await?;
        let title = new_reminder.title.trim();
        if title.is_empty() {
            return Err(ApiError::BadRequest("Please enter a reminder".to_string()));
        }
        let reminder = Reminder {
            id: new_id(),
            group_id: group_id.to_string(),
            title: title.to_string(),
            due_date: new_reminder.due_date,
            created_by: actor.email.clone(),
            created_at: Utc::now(),
            completed: false,
        };
        self.store
            .insert_reminder(&reminder)
            .await
            .map_err(ApiError::store("Failed to add reminder"))?;

        for member in group.members.iter().filter(|member| **member != actor.email) {
            self.notify(Notification::unread(
                member.clone(),
                NotificationKind::GroupReminder {
                    group_id: group_id.to_string(),
                    group_name: group.name.clone(),
                    created_by: actor.email.clone(),
                    created_by_username: actor.username.clone(),
                    title: reminder.title.clone(),
                    due_date: reminder.due_date,
                },
            ))
            .await;
        }
        Ok(reminder)
    }

    pub async fn set_reminder_completed(
        &self,
        actor: &Actor,
        group_id: &str,
        reminder_id: &str,
        completed: bool,
    ) -> Result<(), ApiError> {
        self.member_group(actor, group_id).await?;
        let found = self
            .store
            .set_reminder_completed(group_id, reminder_id, completed)
            .await
            .map_err(ApiError::store("Failed to update reminder"))?;
        found
            .then_some(())
            .ok_or_else(|| ApiError::NotFound("Reminder not found".to_string()))
    }

    pub async fn delete_group(&self, actor: &Actor, group_id: &str) -> Result<(), ApiError> {
        let group = self.load_group(group_id).await?;
        if group.created_by != actor.email {
            return Err(ApiError::Forbidden(
                "Only group creator can delete the group".to_string(),
            ));
        }

        let notifications: Vec<Notification> = group
            .members
            .iter()
            .filter(|member| **member != actor.email)
            .map(|member| {
                Notification::unread(
                    member.clone(),
                    NotificationKind::GroupDeletion {
                        group_name: group.name.clone(),
                        deleted_by: actor.email.clone(),
                        deleted_by_username: actor.username.clone(),
                    },
                )
            })
            .collect();

        let deleted = self
            .store
            .delete_group(group_id, &notifications)
            .await
            .map_err(ApiError::store("Failed to delete group"))?;
        if !deleted {
            return Err(ApiError::NotFound("Group not found".to_string()));
        }
        info!(group_id, notified = notifications.len(), "group deleted");
        Ok(())
    }

    pub async fn balances(&self, actor: &Actor, group_id: &str) -> Result<Balance, ApiError> {
        self.member_group(actor, group_id).await?;
        let expenses = self
            .store
            .list_expenses(group_id)
            .await
            .map_err(ApiError::store("Failed to load balances"))?;
        Ok(compute_balance(&expenses))
    }

    pub async fn settle_up(&self, actor: &Actor, group_id: &str) -> Result<Vec<Exchange>, ApiError> {
        self.member_group(actor, group_id).await?;
        let expenses = self
            .store
            .list_expenses(group_id)
            .await
            .map_err(ApiError::store("Failed to load balances"))?;
        Ok(get_exchanges(&expenses))
    }

    pub async fn notifications(&self, actor: &Actor) -> Result<Vec<Notification>, ApiError> {
        self.store
            .list_notifications(&actor.email)
            .await
            .map_err(ApiError::store("Failed to load notifications"))
    }

    /// One tick per change to the group, its expenses, tasks or reminders.
    pub async fn watch(&self, actor: &Actor, group_id: &str) -> Result<ChangeStream, ApiError> {
        self.member_group(actor, group_id).await?;
        let mut feeds = Vec::with_capacity(Feed::ALL.len());
        for feed in Feed::ALL {
            feeds.push(
                self.store
                    .watch(feed, group_id)
                    .await
                    .map_err(ApiError::store("Failed to subscribe to group"))?,
            );
        }
        Ok(stream::select_all(feeds).boxed())
    }
}
