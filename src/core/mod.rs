//! Core parsing primitives
//!
//! - `scanner`: memchr-based delimiter search over UTF-8 input
//! - `entities`: strict entity decoding and attribute escaping
//! - `attributes`: start tag splitting with raw attribute text
//! - `tokenizer`: lossless markup tokenizer

pub mod attributes;
pub mod entities;
pub mod scanner;
pub mod tokenizer;
