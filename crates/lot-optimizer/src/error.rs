use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Invalid target amount: {0}")]
    InvalidTarget(f64),

    #[error("Invalid {term} tax rate: {rate} (must be within 0..=1)")]
    InvalidTaxRate { term: &'static str, rate: f64 },

    #[error("Duplicate lot index: {0}")]
    DuplicateLotIndex(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
