mod config;
mod logging;
mod service;
mod traggo;

pub use config::*;
pub use logging::*;
pub use service::*;
pub use traggo::*;

#[cfg(test)]
pub(crate) use service::fake;
