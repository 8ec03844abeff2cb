mod cli;
mod demo;
pub mod error;
mod infra;
mod routes;
mod server;

use crate::error::ApiError;

pub async fn run() -> Result<(), ApiError> {
    cli::run().await
}
