pub mod config;
pub mod errors;
pub mod github;
pub mod memory;
pub mod parser;
pub mod pipeline;
pub mod review;
pub mod session;
pub mod stream;
pub mod util;
pub mod workflow;
