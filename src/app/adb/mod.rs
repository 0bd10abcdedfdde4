pub mod gateway;
pub mod parse;
pub mod runner;
pub mod server;
