//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository, platform, queue, storage and mail calls into
//!   use-case level APIs.
//! - Enforce permission and validation rules before any write.
//!
//! # Invariants
//! - Permission failures are returned before state is touched.
//! - A platform "no such object" answer for a contact is not an error.

use crate::export::ExportError;
use crate::mail::MailError;
use crate::model::label::LabelValidationError;
use crate::remote::RemoteError;
use crate::repo::RepoError;
use crate::storage::StorageError;
use crate::tasks::TaskError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod case_service;
pub mod export_service;
pub mod group_service;
pub mod label_service;
pub mod partner_service;
pub mod permissions;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for all use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Acting user may not perform the operation.
    PermissionDenied,
    NotFound { entity: &'static str, id: String },
    /// Input rejected before persistence.
    Validation(String),
    /// Operation does not apply to the object's current state.
    InvalidState(String),
    Conflict(String),
    Repo(RepoError),
    Remote(RemoteError),
    Storage(StorageError),
    Mail(MailError),
    Task(TaskError),
    Export(ExportError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Validation(message) => write!(f, "validation failed: {message}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Mail(err) => write!(f, "{err}"),
            Self::Task(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Mail(err) => Some(err),
            Self::Task(err) => Some(err),
            Self::Export(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Conflict(message) => Self::Conflict(message),
            other => Self::Repo(other),
        }
    }
}

impl From<RemoteError> for ServiceError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<MailError> for ServiceError {
    fn from(value: MailError) -> Self {
        Self::Mail(value)
    }
}

impl From<TaskError> for ServiceError {
    fn from(value: TaskError) -> Self {
        Self::Task(value)
    }
}

impl From<ExportError> for ServiceError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<LabelValidationError> for ServiceError {
    fn from(value: LabelValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}
