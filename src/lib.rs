#![doc = include_str!("../README.md")]

mod error;

pub mod framing;
pub mod words;

pub use error::{Error, Result};
