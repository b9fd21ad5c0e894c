pub mod anonymizer;
pub mod catalog;
pub mod cmd;
pub mod collector;
pub mod error;
pub mod fixture;
pub mod parser;
pub mod policy;
pub mod replayer;
pub mod serializer;

pub use error::{Error, Result};
