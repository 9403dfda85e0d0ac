pub mod classification;
pub mod configuration;
pub mod controller;
pub mod enforcement;
pub mod error_handling;
pub mod ledger;
pub mod plex;
pub mod session_source;
pub mod web_interface;

pub use controller::Controller;
