pub mod api;
pub mod config;
pub mod http_response;
pub mod services;
