//! jshell: an interactive command shell.
//!
//! A line goes through variable substitution, pipeline parsing and alias
//! expansion, then runs either as a single stage on the calling thread
//! (builtin, foreground program or background job) or as a pipeline with
//! one thread per stage connected by OS pipes.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod error;
pub mod executor;
pub mod expander;
pub mod history;
pub mod jobs;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod redirect;
pub mod resolver;
pub mod shell;
pub mod status;

pub use ast::{Pipeline, Redirect, Stage};
pub use shell::Shell;
