pub mod cleanup;
pub mod config;
pub mod middleware;
pub mod observability;
pub mod server;

pub use server::{Services, Stores, WardenServer, build_app};
