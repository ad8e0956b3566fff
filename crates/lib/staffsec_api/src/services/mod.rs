//! Business logic behind the admin handlers.

pub mod users;
