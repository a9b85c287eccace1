mod cli;
mod enroll;
mod infra;
mod routes;
mod server;

use enrollment::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
