use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::info;

use exphive::auth::AuthSecret;
use exphive::config::{Config, StoreConfig};
use exphive::memory::InMemoryStore;
use exphive::mongo::MongoStore;
use exphive::routes;
use exphive::service::GroupService;
use exphive::store::Store;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    exphive::init_tracing();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.store {
        StoreConfig::Mongo { uri, database } => {
            info!(database = %database, "connecting to MongoDB");
            Arc::new(MongoStore::connect(uri, database).await?)
        }
        StoreConfig::Memory => {
            info!("using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };
    info!("Connected");

    let service = web::Data::new(GroupService::new(store));
    let secret = web::Data::new(AuthSecret(config.auth_secret.clone()));

    info!(host = %config.host, port = config.port, "starting HTTP server");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(service.clone())
            .app_data(secret.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;
    Ok(())
}
