#![allow(clippy::missing_docs_in_private_items)]

pub mod chat;
pub mod generators;
pub mod podcast;
pub mod schemas;
