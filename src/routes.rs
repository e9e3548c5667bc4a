use actix_web::{delete, get, post, put, web, HttpResponse};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::service::{GroupService, NewExpense, NewReminder, NewTask};

#[derive(Deserialize, Serialize)]
struct GroupNameJson {
    name: String,
}

#[derive(Deserialize, Serialize)]
struct MemberJson {
    email: String,
}

#[derive(Deserialize, Serialize)]
struct CompletedJson {
    completed: bool,
}

#[derive(Deserialize, Serialize)]
struct SettledJson {
    settled: bool,
}

type GroupPath = web::Path<String>;
type ChildPath = web::Path<(String, String)>;

#[post("/groups")]
async fn create_group(
    service: web::Data<GroupService>,
    actor: Actor,
    json: web::Json<GroupNameJson>,
) -> Result<HttpResponse, ApiError> {
    let group = service.create_group(&actor, &json.name).await?;
    Ok(HttpResponse::Created().json(group))
}

#[get("/groups/{id}")]
async fn get_group(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.details(&actor, &id).await?))
}

#[delete("/groups/{id}")]
async fn delete_group(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
) -> Result<HttpResponse, ApiError> {
    service.delete_group(&actor, &id).await?;
    Ok(HttpResponse::NoContent().finish())
}

fn sse_event(event: &str, data: &str) -> web::Bytes {
    web::Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
}

/// Server-sent events: a full snapshot now and after every change. Ends with
/// `deleted` once the group is gone or `removed` once the actor left it.
#[get("/groups/{id}/events")]
async fn group_events(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let mut changes = service.watch(&actor, &id).await?;
    let service = service.into_inner();

    let events = async_stream::stream! {
        loop {
            match service.details(&actor, &id).await {
                Ok(details) => match serde_json::to_string(&details) {
                    Ok(data) => {
                        yield Ok::<_, ApiError>(sse_event("snapshot", &data));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, group_id = %id, "failed to encode snapshot");
                        break;
                    }
                },
                Err(ApiError::NotFound(_)) => {
                    yield Ok(sse_event("deleted", "{}"));
                    break;
                }
                Err(ApiError::Forbidden(_)) => {
                    yield Ok(sse_event("removed", "{}"));
                    break;
                }
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
            match changes.next().await {
                Some(Ok(())) => continue,
                Some(Err(err)) => {
                    tracing::error!(error = %err, group_id = %id, "change stream failed");
                    break;
                }
                None => break,
            }
        }
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events))
}

#[post("/groups/{id}/members")]
async fn add_member(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
    json: web::Json<MemberJson>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.add_member(&actor, &id, &json.email).await?))
}

#[delete("/groups/{id}/members/{email}")]
async fn remove_member(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
) -> Result<HttpResponse, ApiError> {
    let (id, email) = path.into_inner();
    Ok(HttpResponse::Ok().json(service.remove_member(&actor, &id, &email).await?))
}

#[post("/groups/{id}/expenses")]
async fn add_expense(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
    expense: web::Json<NewExpense>,
) -> Result<HttpResponse, ApiError> {
    let expense = service
        .add_expense(&actor, &id, expense.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(expense))
}

#[get("/groups/{id}/expenses/{expense_id}")]
async fn get_expense(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
) -> Result<HttpResponse, ApiError> {
    let (id, expense_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(service.get_expense(&actor, &id, &expense_id).await?))
}

#[put("/groups/{id}/expenses/{expense_id}/settled")]
async fn set_expense_settled(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
    json: web::Json<SettledJson>,
) -> Result<HttpResponse, ApiError> {
    let (id, expense_id) = path.into_inner();
    service
        .set_expense_settled(&actor, &id, &expense_id, json.settled)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/groups/{id}/expenses/{expense_id}")]
async fn delete_expense(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
) -> Result<HttpResponse, ApiError> {
    let (id, expense_id) = path.into_inner();
    service.delete_expense(&actor, &id, &expense_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/tasks")]
async fn add_task(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
    task: web::Json<NewTask>,
) -> Result<HttpResponse, ApiError> {
    let task = service.add_task(&actor, &id, task.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

#[put("/groups/{id}/tasks/{task_id}/completed")]
async fn set_task_completed(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
    json: web::Json<CompletedJson>,
) -> Result<HttpResponse, ApiError> {
    let (id, task_id) = path.into_inner();
    service
        .set_task_completed(&actor, &id, &task_id, json.completed)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/groups/{id}/tasks/{task_id}")]
async fn delete_task(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
) -> Result<HttpResponse, ApiError> {
    let (id, task_id) = path.into_inner();
    service.delete_task(&actor, &id, &task_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/groups/{id}/reminders")]
async fn add_reminder(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
    reminder: web::Json<NewReminder>,
) -> Result<HttpResponse, ApiError> {
    let reminder = service
        .add_reminder(&actor, &id, reminder.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(reminder))
}

#[put("/groups/{id}/reminders/{reminder_id}/completed")]
async fn set_reminder_completed(
    service: web::Data<GroupService>,
    actor: Actor,
    path: ChildPath,
    json: web::Json<CompletedJson>,
) -> Result<HttpResponse, ApiError> {
    let (id, reminder_id) = path.into_inner();
    service
        .set_reminder_completed(&actor, &id, &reminder_id, json.completed)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/groups/{id}/balance")]
async fn get_balance(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.balances(&actor, &id).await?))
}

#[get("/groups/{id}/settle-up")]
async fn settle_up(
    service: web::Data<GroupService>,
    actor: Actor,
    id: GroupPath,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.settle_up(&actor, &id).await?))
}

#[get("/notifications")]
async fn list_notifications(
    service: web::Data<GroupService>,
    actor: Actor,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.notifications(&actor).await?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create_group)
        .service(group_events)
        .service(get_balance)
        .service(settle_up)
        .service(add_member)
        .service(remove_member)
        .service(add_expense)
        .service(get_expense)
        .service(set_expense_settled)
        .service(delete_expense)
        .service(add_task)
        .service(set_task_completed)
        .service(delete_task)
        .service(add_reminder)
        .service(set_reminder_completed)
        .service(get_group)
        .service(delete_group)
        .service(list_notifications);
}
