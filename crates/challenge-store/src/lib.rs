// Library root: re-exports all modules so integration tests and the CLI
// front end can access the crate's public API.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod repository;
pub mod schema;
pub mod selection;
pub mod storage;
pub mod store;
pub mod sync;
pub mod tabs;
