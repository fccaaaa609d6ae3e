//! Outbound HTTP dispatch.

pub mod http;

use action_mapper::{RequestDescriptor, ResponseEnvelope};
use async_trait::async_trait;

use crate::types::GatewayResult;

pub use http::ReqwestDispatcher;

/// Sends a mapped request and returns the reply as a response envelope.
///
/// Implementations must put the numeric status under the `:status` header
/// and lowercase every header name.
#[async_trait]
pub trait HttpDispatch: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> GatewayResult<ResponseEnvelope>;
}
