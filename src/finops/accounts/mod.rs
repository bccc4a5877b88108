pub mod apply;
pub mod aws;
pub mod cloudhealth;
pub mod config;
pub mod error;
pub mod io;
pub mod matcher;
pub mod model;
pub mod plan;
pub mod report;
pub mod store;
pub mod workflow;

pub use error::{Result, ToolError};
