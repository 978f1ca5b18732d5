pub mod client;
pub mod fetchers;
