pub mod config;
pub mod endpoint;
pub mod error;
pub mod fault;
pub mod http;
pub mod latency;
pub mod namespace;
pub mod response;
pub mod telemetry;
pub mod test_utils;
pub mod utils;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
