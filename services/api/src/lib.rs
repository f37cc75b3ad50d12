mod cli;
mod infra;
mod offline;
mod routes;
mod server;

use hebelwatch::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
