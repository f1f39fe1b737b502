//! # PushSync Protocol
//!
//! Request descriptors and wire types for PushSync.
//!
//! This crate provides:
//! - [`RequestDescriptor`], the declarative shape of every remote call
//! - One descriptor per remote operation (registration, seen, sync,
//!   user data, mobile-originated messages)
//! - Request and response wire types with their JSON encodings
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod keys;
mod messages;
mod request;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    FetchedMessage, MoMessage, MoMessageResponse, MoMessageStatus, RegistrationResponse,
    SeenData, SeenMessagesResponse, SyncMessagesResponse, SyncRequest, UserDataResponse,
};
pub use request::{
    ApiPath, HttpMethod, MoMessageRequest, Parameters, RegistrationRequest, RequestDescriptor,
    SeenMessagesRequest, SyncMessagesRequest, UserDataRequest,
};
