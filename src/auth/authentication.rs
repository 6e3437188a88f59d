use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use sqlx::SqlitePool;

use crate::db::find_worker;

use super::Caller;

pub const CALLER_HEADER: &str = "X-User-Id";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("caller_guard");
        let _guard = auth_span.enter();

        let Some(raw_id) = request.headers().get_one(CALLER_HEADER) else {
            tracing::debug!("Request carries no caller header");
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let Ok(worker_id) = raw_id.trim().parse::<i64>() else {
            tracing::warn!(header = %raw_id, "Malformed caller header");
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let db = match request.rocket().state::<SqlitePool>() {
            Some(pool) => pool,
            _ => {
                tracing::error!("Database pool not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        match find_worker(db, worker_id).await {
            Ok(Some(worker)) if worker.active => {
                tracing::debug!(caller_id = %worker.id, role = %worker.role, "Caller resolved");
                Outcome::Success(Caller::from(worker))
            }
            Ok(Some(worker)) => {
                tracing::warn!(caller_id = %worker.id, "Deactivated worker attempted a request");
                Outcome::Error((Status::Forbidden, ()))
            }
            Ok(None) => {
                tracing::warn!(caller_id = %worker_id, "Unknown caller");
                Outcome::Error((Status::Unauthorized, ()))
            }
            Err(err) => {
                tracing::error!(caller_id = %worker_id, error = ?err, "Failed to resolve caller");
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}
