use thiserror::Error;

use crate::model::ContextError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Context(#[from] ContextError),
}
