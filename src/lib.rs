#![doc = "The `todo_auth` library crate."]
#![doc = ""]
#![doc = "Identity and credential lifecycle for the task-tracking backend: registration with"]
#![doc = "deferred email verification, password login issuing access/refresh tokens, refresh,"]
#![doc = "federated sign-in and the per-request `AuthGate`. The binary (`main.rs`) wires these"]
#![doc = "into an actix-web server."]

pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

pub use error::AppError;
pub use state::{AppState, AuthSettings};
