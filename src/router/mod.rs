//! HTTP routes of the demo server.
pub mod login;
pub mod status;
