use super::types::{Cause, IeType, InterfaceType, MessageType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GtpError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid GTP version: {0}")]
    InvalidVersion(u8),

    #[error("IE nesting exceeds {0} levels")]
    RecursionLimit(usize),

    #[error("Wrong IE type: expected {expected:?}, got {actual:?}")]
    WrongIeType { expected: IeType, actual: IeType },

    #[error("Payload too short for {ie_type:?}: need {need}, have {have}")]
    PayloadTooShort { ie_type: IeType, need: usize, have: usize },

    #[error("Required IE missing: {ie_type:?}")]
    RequiredIeMissing { ie_type: IeType },

    #[error("{message_type:?} rejected with cause {cause:?} (subscriber: {imsi})")]
    CauseNotOk {
        message_type: MessageType,
        cause: Cause,
        imsi: String,
    },

    #[error("Session not found")]
    SessionNotFound,

    #[error("No bearer with EBI {0}")]
    BearerNotFound(u8),

    #[error("No TEID for interface {0:?}")]
    TeidNotFound(InterfaceType),

    #[error("Session already exists for subscriber {0}")]
    SessionExists(String),

    #[error("Unexpected message: {0:?}")]
    UnexpectedMessage(MessageType),

    #[error("No handler registered for {0:?}")]
    NoHandler(MessageType),

    #[error("TEID pool exhausted")]
    TeidExhausted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GtpError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        GtpError::Malformed(reason.into())
    }

    pub fn missing(ie_type: IeType) -> Self {
        GtpError::RequiredIeMissing { ie_type }
    }
}

pub type Result<T> = std::result::Result<T, GtpError>;
