//! Core library for the finops-account-manager command line application.
//!
//! The library reconciles an AWS organization's account inventory with the
//! accounts registered in CloudHealth and renames CloudHealth records after
//! their AWS names. Dataset IO lives under [`finops::accounts::io`], the join
//! in [`finops::accounts::matcher`], plan construction and persistence in
//! [`finops::accounts::plan`] and [`finops::accounts::store`], and the
//! CloudHealth replay in [`finops::accounts::apply`]. The
//! [`finops::accounts::workflow`] module wires them together for the CLI.

pub mod finops;

pub use finops::accounts::{
    Result, ToolError, apply, aws, cloudhealth, config, error, io, matcher, model, plan, report,
    store, workflow,
};
