pub mod db;
pub mod models;
mod requests;
mod tables;

pub use db::{Database, DatabaseError, RequestError};
pub use tables::*;
