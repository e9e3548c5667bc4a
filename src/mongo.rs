use async_trait::async_trait;
use bson::{doc, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{ChangeStreamOptions, FindOptions, FullDocumentType};
use mongodb::{Client, ClientSession, Collection, Database};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::schemas::{Expense, Group, Notification, Receipt, Reminder, Task, User};
use crate::store::{ChangeStream, Feed, Store};

const GROUPS: &str = "groups";
const EXPENSES: &str = "groupExpenses";
const TASKS: &str = "groupTasks";
const REMINDERS: &str = "groupReminders";
const NOTIFICATIONS: &str = "notifications";
const USERS: &str = "users";
const RECEIPTS: &str = "receipts";

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        client
            .database(database)
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(Self::new(client, database))
    }

    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    fn groups(&self) -> Collection<Group> {
        self.database.collection(GROUPS)
    }

    fn expenses(&self) -> Collection<Expense> {
        self.database.collection(EXPENSES)
    }

    fn tasks(&self) -> Collection<Task> {
        self.database.collection(TASKS)
    }

    fn reminders(&self) -> Collection<Reminder> {
        self.database.collection(REMINDERS)
    }

    fn notifications(&self) -> Collection<Notification> {
        self.database.collection(NOTIFICATIONS)
    }

    async fn set_field(
        &self,
        collection: &str,
        group_id: &str,
        id: &str,
        field: &str,
        value: bool,
    ) -> StoreResult<bool> {
        let result = self
            .database
            .collection::<Document>(collection)
            .update_one(
                doc! { "_id": id, "groupId": group_id },
                doc! { "$set": { field: value } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_scoped(&self, collection: &str, group_id: &str, id: &str) -> StoreResult<bool> {
        let result = self
            .database
            .collection::<Document>(collection)
            .delete_one(doc! { "_id": id, "groupId": group_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_group_in(
        &self,
        session: &mut ClientSession,
        group_id: &str,
        notifications: &[Notification],
    ) -> StoreResult<bool> {
        let deleted = self
            .groups()
            .delete_one_with_session(doc! { "_id": group_id }, None, session)
            .await?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }
        let children = doc! { "groupId": group_id };
        for collection in [EXPENSES, TASKS, REMINDERS] {
            self.database
                .collection::<Document>(collection)
                .delete_many_with_session(children.clone(), None, session)
                .await?;
        }
        if !notifications.is_empty() {
            self.notifications()
                .insert_many_with_session(notifications, None, session)
                .await?;
        }
        Ok(true)
    }
}

async fn collect<T>(cursor: mongodb::Cursor<T>) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    Ok(cursor.try_collect::<Vec<T>>().await?)
}

fn feed_collection(feed: Feed) -> &'static str {
    match feed {
        Feed::Group => GROUPS,
        Feed::Expenses => EXPENSES,
        Feed::Tasks => TASKS,
        Feed::Reminders => REMINDERS,
    }
}

// Deletes carry no full document, so they can't be filtered by group and
// always count as a change.
fn feed_pipeline(feed: Feed, group_id: &str) -> Vec<Document> {
    let scoped = match feed {
        Feed::Group => doc! { "documentKey._id": group_id },
        _ => doc! { "fullDocument.groupId": group_id },
    };
    vec![doc! {
        "$match": { "$or": [scoped, { "operationType": "delete" }] }
    }]
}

#[async_trait]
impl Store for MongoStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .database
            .collection::<User>(USERS)
            .find_one(doc! { "email": email }, None)
            .await?)
    }

    async fn insert_group(&self, group: &Group) -> StoreResult<()> {
        self.groups().insert_one(group, None).await?;
        Ok(())
    }

    async fn get_group(&self, group_id: &str) -> StoreResult<Option<Group>> {
        Ok(self.groups().find_one(doc! { "_id": group_id }, None).await?)
    }

    async fn add_group_member(&self, group_id: &str, email: &str) -> StoreResult<bool> {
        let result = self
            .groups()
            .update_one(
                doc! { "_id": group_id },
                doc! { "$addToSet": { "members": email } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn set_group_members(&self, group_id: &str, members: &[String]) -> StoreResult<bool> {
        let result = self
            .groups()
            .update_one(
                doc! { "_id": group_id },
                doc! { "$set": { "members": members.to_vec() } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete_group(
        &self,
        group_id: &str,
        notifications: &[Notification],
    ) -> StoreResult<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        match self.delete_group_in(&mut session, group_id, notifications).await {
            Ok(true) => {
                session.commit_transaction().await?;
                Ok(true)
            }
            Ok(false) => {
                session.abort_transaction().await?;
                Ok(false)
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(error = %abort_err, group_id, "failed to abort group deletion");
                }
                Err(err)
            }
        }
    }

    async fn list_expenses(&self, group_id: &str) -> StoreResult<Vec<Expense>> {
        collect(self.expenses().find(doc! { "groupId": group_id }, None).await?).await
    }

    async fn get_expense(&self, group_id: &str, expense_id: &str) -> StoreResult<Option<Expense>> {
        Ok(self
            .expenses()
            .find_one(doc! { "_id": expense_id, "groupId": group_id }, None)
            .await?)
    }

    async fn insert_expense(&self, expense: &Expense) -> StoreResult<()> {
        self.expenses().insert_one(expense, None).await?;
        Ok(())
    }

    async fn set_expense_settled(
        &self,
        group_id: &str,
        expense_id: &str,
        settled: bool,
    ) -> StoreResult<bool> {
        self.set_field(EXPENSES, group_id, expense_id, "settled", settled)
            .await
    }

    async fn delete_expense(&self, group_id: &str, expense_id: &str) -> StoreResult<bool> {
        self.delete_scoped(EXPENSES, group_id, expense_id).await
    }

    async fn receipt_exists(&self, receipt_id: &str) -> StoreResult<bool> {
        let receipt = self
            .database
            .collection::<Receipt>(RECEIPTS)
            .find_one(doc! { "_id": receipt_id }, None)
            .await?;
        Ok(receipt.is_some())
    }

    async fn delete_receipt(&self, receipt_id: &str) -> StoreResult<bool> {
        let result = self
            .database
            .collection::<Receipt>(RECEIPTS)
            .delete_one(doc! { "_id": receipt_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_tasks(&self, group_id: &str) -> StoreResult<Vec<Task>> {
        collect(self.tasks().find(doc! { "groupId": group_id }, None).await?).await
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<()> {
        self.tasks().insert_one(task, None).await?;
        Ok(())
    }

    async fn set_task_completed(
        &self,
        group_id: &str,
        task_id: &str,
        completed: bool,
    ) -> StoreResult<bool> {
        self.set_field(TASKS, group_id, task_id, "completed", completed)
            .await
    }

    async fn delete_task(&self, group_id: &str, task_id: &str) -> StoreResult<bool> {
        self.delete_scoped(TASKS, group_id, task_id).await
    }

    async fn list_reminders(&self, group_id: &str) -> StoreResult<Vec<Reminder>> {
        let options = FindOptions::builder().sort(doc! { "dueDate": 1 }).build();
        let mut reminders = collect(
            self.reminders()
                .find(doc! { "groupId": group_id }, options)
                .await?,
        )
        .await?;
        // Dates are stored as RFC 3339 strings, whose order can drift from
        // chronological order when fractional seconds differ.
        reminders.sort_by_key(|reminder| reminder.due_date);
        Ok(reminders)
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> StoreResult<()> {
        self.reminders().insert_one(reminder, None).await?;
        Ok(())
    }

    async fn set_reminder_completed(
        &self,
        group_id: &str,
        reminder_id: &str,
        completed: bool,
    ) -> StoreResult<bool> {
        self.set_field(REMINDERS, group_id, reminder_id, "completed", completed)
            .await
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.notifications().insert_one(notification, None).await?;
        Ok(())
    }

    async fn list_notifications(&self, recipient_email: &str) -> StoreResult<Vec<Notification>> {
        let mut notifications = collect(
            self.notifications()
                .find(doc! { "recipientEmail": recipient_email }, None)
                .await?,
        )
        .await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn watch(&self, feed: Feed, group_id: &str) -> StoreResult<ChangeStream> {
        let options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .build();
        let collection = feed_collection(feed);
        let changes = self
            .database
            .collection::<Document>(collection)
            .watch(feed_pipeline(feed, group_id), options)
            .await?;
        debug!(collection, group_id, "opened change stream");
        Ok(changes
            .map(|event| event.map(|_| ()).map_err(StoreError::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_feed_matches_on_document_key() {
        let pipeline = feed_pipeline(Feed::Group, "g1");
        assert_eq!(
            pipeline,
            vec![doc! {
                "$match": { "$or": [
                    { "documentKey._id": "g1" },
                    { "operationType": "delete" },
                ] }
            }]
        );
    }

    #[test]
    fn child_feeds_match_on_group_id() {
        let pipeline = feed_pipeline(Feed::Tasks, "g1");
        let or = pipeline[0]
            .get_document("$match")
            .unwrap()
            .get_array("$or")
            .unwrap();
        assert_eq!(or[0].as_document().unwrap(), &doc! { "fullDocument.groupId": "g1" });
        assert_eq!(feed_collection(Feed::Tasks), "groupTasks");
        assert_eq!(feed_collection(Feed::Reminders), "groupReminders");
    }
}
