/// Failure of the billing walk itself.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("invalid input: usage total must be a finite non-negative number, got {0}")]
    InvalidInput(f64),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Slab table or threshold rejected at load time. Fatal to that configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// A value the caller was required to keep in range was not.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<BillingError> for CoreError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::InvalidInput(total) => {
                CoreError::InvalidInput(format!("usage total {total} is not billable"))
            }
        }
    }
}
