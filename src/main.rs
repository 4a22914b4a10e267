pub mod config;
pub mod dedup;
pub mod err;
pub mod issue;
pub mod mail;
pub mod models;
pub mod qr;
pub mod store;
pub mod students;
pub mod verify;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Serialize;

use crate::config::Config;
use crate::err::{Error, Fine, Maybe, Nothing};
use crate::mail::{PassMailer, SmtpMailer};

pub type Payload<T> = Result<Maybe<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Fine(value))
}

pub fn breaks<V>(err: Error) -> Payload<V>
where
    V: Serialize,
{
    Ok(Nothing(err))
}

pub fn bails<V, S: Into<String>>(err: S) -> Payload<V>
where
    V: Serialize,
{
    Ok(Nothing(Error::InternalError {
        kind: "Unknown",
        message: err.into(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = Config::from_env()?;
    let pool = store::connect(&config).await?;
    store::init_schema(&pool).await?;
    let mailer: Arc<dyn PassMailer> = Arc::new(SmtpMailer::new(&config.smtp)?);

    let app = Router::new()
        .route("/health", get(students::health))
        .route(
            "/students",
            get(students::list_students).post(students::add_student),
        )
        .route("/students/resolve", post(students::resolve_upload))
        .route("/students/generate-passes", post(issue::generate_passes))
        .route("/scanner/verify", post(verify::verify_pass))
        .layer(Extension(pool))
        .layer(Extension(mailer))
        .fallback(err::handler404.into_service());

    log::info!("Starting EventPass HTTP Server on http://{}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
