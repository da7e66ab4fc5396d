pub mod api;
pub mod calendar;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod selection;
pub mod sweeper;
pub mod wal;
