pub mod config;
pub mod error;
pub mod fc;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod state;
pub mod stream;
