// lifewire — ownership, mutability and lifetime inference for wire graphs
//
// Library root. Stages run in the order create_facades, determine_variables,
// auto_borrow, set_types, validate, explicit_borrow; `pipeline` drives them.

pub mod auto_borrow;
pub mod create_facades;
pub mod determine_variables;
pub mod diag;
pub mod document;
pub mod dot;
pub mod explicit_borrow;
pub mod facade;
pub mod graph;
pub mod id;
pub mod lexer;
pub mod logging;
pub mod options;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod set_types;
pub mod types;
pub mod validate;
pub mod variable;
pub mod visit;
