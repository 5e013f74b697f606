pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod embedding;
pub mod filter;
pub mod history;
pub mod index;
pub mod memory;
pub mod message;
pub mod poller;
pub mod response;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
