//! shardquery - Query compilation core for a field-indexed, sharded
//! key-value search engine
//!
//! Passes over a shared expression tree:
//! - `normalize`: expand literals across each field's normalizers
//! - `composite`: fold component comparisons into composite lookups
//! - `executable`: classify which subtrees the index can resolve and delay
//!   the partial ones
//! - `plan`: compile a per-record iterator plan and evaluate it
//!
//! Every pass takes the tree by reference and returns a new one, so a
//! caller may run them in any order and keep the inputs.

pub mod ast;
pub mod composite;
pub mod config;
pub mod errors;
pub mod executable;
pub mod metadata;
pub mod normalize;
pub mod plan;
