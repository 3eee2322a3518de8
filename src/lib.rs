//! healthmon - health-check collection and status storage.
//!
//! The collector side runs configured probes on an interval and reports
//! their results to the storage API. The storage side keeps the current
//! state of every check, appends history on status changes, and serves
//! grouped views of that state.

pub mod collector;
pub mod config;
pub mod db;
pub mod lifetime;
pub mod model;
pub mod probe;
pub mod state;
pub mod web;
