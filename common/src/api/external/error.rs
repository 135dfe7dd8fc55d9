// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the Corral control plane.

use crate::api::external::ResourceType;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use uuid::Uuid;

/// An error that can be generated within a control plane component
///
/// These may be generated while handling an operator request or as part of a
/// background operation.  Translation to a caller-facing representation
/// happens at exactly one boundary, so most of the system stays agnostic to
/// how errors are ultimately presented.
///
/// Where possible, reuse existing variants rather than inventing new ones to
/// distinguish cases that no programmatic consumer needs to distinguish.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// An object needed as part of this operation was not found.
    #[error("Object (of type {lookup_type:?}) not found: {type_name}")]
    ObjectNotFound { type_name: ResourceType, lookup_type: LookupType },
    /// An object already exists with the specified name or identifier.
    #[error("Object (of type {type_name:?}) already exists: {object_name}")]
    ObjectAlreadyExists { type_name: ResourceType, object_name: String },
    /// The request was well-formed, but the operation cannot be completed
    /// given the current state of the system.
    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },
    /// The caller is not authorized to perform the requested operation.
    #[error("Forbidden")]
    Forbidden,
    /// Admitting the request would push an account past its configured
    /// resource limit.  Any reservation taken for the request has already
    /// been rolled back when this is returned.
    #[error("Resource Exhausted: {message}")]
    ResourceExhausted { message: String },
    /// No host (or other placement target) can satisfy the request.
    #[error("Insufficient Capacity: {message}")]
    InsufficientCapacity { message: String },

    /// The system (or part of it) is unavailable.  Covers agent timeouts and
    /// lock contention; callers may retry.
    #[error("Service Unavailable: {internal_message}")]
    ServiceUnavailable { internal_message: String },
    /// The system encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
}

/// Indicates how an object was looked up (for an `ObjectNotFound` error)
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum LookupType {
    /// a specific name was requested
    ByName(String),
    /// a specific id was requested
    ById(Uuid),
}

impl LookupType {
    /// Returns an ObjectNotFound error appropriate for the case where this
    /// lookup failed
    pub fn into_not_found(self, type_name: ResourceType) -> Error {
        Error::ObjectNotFound { type_name, lookup_type: self }
    }
}

impl Error {
    /// Returns whether the error is likely transient and could reasonably be
    /// retried
    pub fn retryable(&self) -> bool {
        match self {
            Error::ServiceUnavailable { .. } => true,

            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::InvalidRequest { .. }
            | Error::Forbidden
            | Error::ResourceExhausted { .. }
            | Error::InsufficientCapacity { .. }
            | Error::InternalError { .. } => false,
        }
    }

    /// Generates an [`Error::ObjectNotFound`] error for a lookup by object
    /// name.
    pub fn not_found_by_name(type_name: ResourceType, name: &str) -> Error {
        LookupType::ByName(name.to_owned()).into_not_found(type_name)
    }

    /// Generates an [`Error::ObjectNotFound`] error for a lookup by object
    /// id.
    pub fn not_found_by_id(type_name: ResourceType, id: &Uuid) -> Error {
        LookupType::ById(*id).into_not_found(type_name)
    }

    /// Generates an [`Error::InternalError`] error with the specific message
    ///
    /// InternalError should be used for operational conditions that should
    /// not happen but that we cannot reasonably handle at runtime (e.g., an
    /// instance record pointing at a host that does not exist).
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /// Generates an [`Error::InvalidRequest`] error with the specific message
    ///
    /// This should be used for failures due possibly to invalid client input
    /// or operations applied in the wrong state.
    pub fn invalid_request(message: &str) -> Error {
        Error::InvalidRequest { message: message.to_owned() }
    }

    /// Generates an [`Error::ServiceUnavailable`] error with the specific
    /// message
    ///
    /// This should be used for transient failures where the caller might be
    /// expected to retry.  Logic errors or other problems indicating that a
    /// retry would not work should probably be an InternalError (if it's a
    /// server problem) or InvalidRequest (if it's a client problem) instead.
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable { internal_message: message.to_owned() }
    }

    /// Generates an [`Error::ResourceExhausted`] error for a quota failure.
    pub fn resource_exhausted(message: &str) -> Error {
        Error::ResourceExhausted { message: message.to_owned() }
    }

    /// Generates an [`Error::InsufficientCapacity`] error for a placement
    /// failure.
    pub fn insufficient_capacity(message: &str) -> Error {
        Error::InsufficientCapacity { message: message.to_owned() }
    }

    /// Given an [`Error`] with an internal message, return the same error
    /// with `context` prepended to it to provide more context
    ///
    /// If the error has no internal message, then it is returned unchanged.
    pub fn internal_context<C>(self, context: C) -> Error
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Error::ObjectNotFound { .. }
            | Error::ObjectAlreadyExists { .. }
            | Error::InvalidRequest { .. }
            | Error::ResourceExhausted { .. }
            | Error::InsufficientCapacity { .. }
            | Error::Forbidden => self,
            Error::InternalError { internal_message } => Error::InternalError {
                internal_message: format!("{}: {}", context, internal_message),
            },
            Error::ServiceUnavailable { internal_message } => {
                Error::ServiceUnavailable {
                    internal_message: format!(
                        "{}: {}",
                        context, internal_message
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use super::LookupType;
    use crate::api::external::ResourceType;

    #[test]
    fn test_retryable() {
        assert!(Error::unavail("agent gone").retryable());
        assert!(!Error::invalid_request("nope").retryable());
        assert!(!Error::resource_exhausted("over quota").retryable());
        assert!(!Error::insufficient_capacity("no hosts").retryable());
    }

    #[test]
    fn test_internal_context() {
        let error = Error::unavail("boom").internal_context("starting vm");
        assert_eq!(
            error,
            Error::ServiceUnavailable {
                internal_message: "starting vm: boom".to_string()
            }
        );

        // Variants with no internal message pass through unchanged.
        let error = LookupType::ByName("vm1".to_string())
            .into_not_found(ResourceType::Instance)
            .internal_context("ignored");
        assert_eq!(
            error,
            Error::ObjectNotFound {
                type_name: ResourceType::Instance,
                lookup_type: LookupType::ByName("vm1".to_string()),
            }
        );
    }
}
