//! JSON-RPC Server
//!
//! Serves the upload and listing API over HTTP on localhost.

use crate::error::to_rpc_error;
use crate::handler::RpcHandler;
use crate::streams::StreamRegistry;
use crate::types::{
    AbortUploadRequest, CloseUploadRequest, ListMediaRequest, OpenUploadRequest,
    SendMessageRequest, StatsRequest,
};
use clipdock_core::application::ListingService;
use clipdock_core::error::AppError;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::{ErrorObjectOwned, Params};
use jsonrpsee::RpcModule;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 50051;

/// Upper bound for one request body (a 64 KiB chunk is ~88 KiB as base64)
const MAX_REQUEST_BODY_BYTES: u32 = 4 * 1024 * 1024;

/// Decode the single positional request object.
///
/// Malformed params (missing fields, bad base64) are validation errors.
fn parse_params<T: DeserializeOwned>(params: &Params<'_>) -> Result<T, ErrorObjectOwned> {
    params.one().map_err(|e| {
        to_rpc_error(AppError::Validation(format!("Invalid params: {}", e.message())))
    })
}

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        streams: Arc<StreamRegistry>,
        listing: ListingService,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(streams, listing)),
        }
    }

    /// Bind and start serving; returns the bound address and the server handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .max_request_body_size(MAX_REQUEST_BODY_BYTES)
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("media.upload.open.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: OpenUploadRequest = parse_params(&params)?;
                    handler.open_upload(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("media.upload.send.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: SendMessageRequest = parse_params(&params)?;
                    handler.send_message(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("media.upload.close.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CloseUploadRequest = parse_params(&params)?;
                    handler.close_upload(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("media.upload.abort.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: AbortUploadRequest = parse_params(&params)?;
                    handler.abort_upload(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("media.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListMediaRequest = parse_params(&params)?;
                    handler.list_media(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Admin APIs
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsRequest = parse_params(&params)?;
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server listening");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}
