pub mod cli;
pub mod error;
pub mod model;
pub mod monitor;
pub mod output;
pub mod privilege;
pub mod schedule;
pub mod sink;
pub mod state;
pub mod system;
