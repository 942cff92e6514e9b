pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod launcher;
pub mod relay;
pub mod schema;
pub mod service;
pub mod session;
pub mod shutdown;
pub mod stager;
pub mod store;
