use axum::http::StatusCode;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;

/// What every RPC handler returns: a status and a bincode body.
pub type RpcResponse = (StatusCode, Vec<u8>);

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, RpcResponse> {
    bincode::deserialize(body).map_err(|e| {
        tracing::warn!("Malformed request body: {}", e);
        (StatusCode::BAD_REQUEST, e.to_string().into_bytes())
    })
}

pub fn encode<T: Serialize>(value: &T) -> RpcResponse {
    match bincode::serialize(value) {
        Ok(bytes) => (StatusCode::OK, bytes),
        Err(e) => {
            tracing::error!("Failed to encode response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes())
        }
    }
}

pub fn failure(error: &anyhow::Error) -> RpcResponse {
    let status = match error.downcast_ref::<StoreError>() {
        Some(StoreError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
        Some(StoreError::State(_)) | Some(StoreError::Unavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string().into_bytes())
}

pub fn reply<T: Serialize>(result: anyhow::Result<T>) -> RpcResponse {
    match result {
        Ok(value) => encode(&value),
        Err(e) => {
            tracing::error!("Request failed: {:#}", e);
            failure(&e)
        }
    }
}

pub fn stopped() -> RpcResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        b"node is not running".to_vec(),
    )
}
