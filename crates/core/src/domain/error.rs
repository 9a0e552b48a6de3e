// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("filename is empty after stripping path components")]
    EmptyFilename,

    #[error("filename '{0}' is reserved")]
    ReservedFilename(String),

    #[error("filename contains forbidden character {0:?}")]
    ForbiddenCharacter(char),

    #[error("filename exceeds {max} bytes")]
    FilenameTooLong { max: usize },

    #[error("filename '{0}' resolves outside the storage root")]
    OutsideRoot(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
