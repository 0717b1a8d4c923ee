//! NER backend implementations.

pub mod http;

pub use http::{HttpNerLoader, HttpNerModel};
