mod cli;
mod demo;
mod infra;
mod jobs;
mod routes;
mod server;

use leadflow::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
