pub mod app;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod run_lock;
pub mod session;
pub mod summary;
pub mod tickets;
pub mod util;
pub mod validator;

pub use error::{PollError, PollResult};
pub use orchestrator::{Orchestrator, RunState};
pub use summary::Summary;
