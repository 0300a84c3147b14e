#![doc = include_str!("../README.md")]
#![warn(
    clippy::pedantic,
    clippy::missing_docs_in_private_items,
    missing_docs,
    rust_2018_idioms
)]

pub mod dump;
pub mod extract;
pub mod io;
pub mod parser;
pub mod store;
pub mod tags;
pub mod token;
pub mod tokenizer;
pub mod tree;

pub use parser::{Parser, parse};
pub use token::{Pos, TagData, Token};
pub use tree::{Child, Node, NodeKind};
