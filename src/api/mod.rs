pub mod comments;
pub mod error;
pub mod health;
pub mod openapi;
pub mod projects;
pub mod reports;

pub use error::ApiError;
