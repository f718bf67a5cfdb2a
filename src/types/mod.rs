//! Type definitions for the inference service

pub mod frame;
pub mod request;
pub mod response;

pub use frame::{FeatureFrame, FeatureMatrix};
pub use request::{FeatureValue, Instance, InvocationRequest};
pub use response::{ErrorBody, InvocationResponse, PingResponse};
