//! Domain types shared by the alerting engine, the notification crate and
//! the server binary.

pub mod id;
pub mod matcher;
pub mod types;
