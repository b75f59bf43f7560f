//! Subscriber notification layer.
//!
//! [`SubscriberHost`] fans one inbound stream out to many handlers;
//! [`run`] feeds a host from a driver.

mod host;
mod runner;

pub use host::{HandlerError, HandlerResult, SubscriberHost, SubscriberReports};
pub use runner::run;
