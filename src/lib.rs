pub mod client;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod record;
pub mod report;
pub mod store;
pub mod submission;
pub mod validator;
