pub mod state;
pub mod app;
pub(crate) mod handlers;
pub mod auth;
pub mod db;
pub mod error;
pub mod gallery;
pub mod storage;
