// Auth module - registration, login, and session management

pub mod cookies;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod service;
pub mod validators;

#[cfg(test)]
mod tests;

pub use extractors::SessionUser;
pub use routes::auth_routes;
