use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No fail handler registered: call register_fail_handler before run_specs")]
    NoFailHandler,

    #[error("Invalid spec tree: {0}")]
    Tree(String),

    #[error("Reporter error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Template error: {0}")]
    Template(String),
}

pub type Result<T> = std::result::Result<T, SuiteError>;
