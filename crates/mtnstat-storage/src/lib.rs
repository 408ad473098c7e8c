//! Storage Layer: the `StatusStore` contract, a Postgres-backed relational
//! implementation, and a DynamoDB-backed read-path implementation.

mod dynamo;
mod postgres;
#[cfg(test)]
mod sqlite_store;
mod store;

pub use dynamo::DynamoStore;
pub use postgres::PostgresStore;
pub use store::{RunStats, SaveManyOutcome, StatusStore};
