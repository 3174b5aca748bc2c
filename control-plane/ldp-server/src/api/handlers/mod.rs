pub mod api_key;
pub mod managed_service;
pub mod mongo;
pub mod project;
pub mod registry;
pub mod service;
pub mod token;
