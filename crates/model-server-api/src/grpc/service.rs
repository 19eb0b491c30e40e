//! gRPC service implementation
//!
//! This module implements the `GRPCInferenceService` defined in the proto file
//! on top of the shared [`InferenceDispatcher`].

use super::converters::{infer_request_from_proto, infer_response_to_proto};
use super::proto::{self, grpc_inference_service_server::GrpcInferenceService};
use crate::{dispatch::InferenceDispatcher, error::to_status, handlers::EXTENSIONS};
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument};

/// gRPC service implementation
#[derive(Clone)]
pub struct InferenceServiceImpl {
    dispatcher: InferenceDispatcher,
    server_name: String,
    server_version: String,
}

impl InferenceServiceImpl {
    /// Create a new gRPC service instance
    pub fn new(dispatcher: InferenceDispatcher) -> Self {
        Self {
            dispatcher,
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the name and version reported by `ServerMetadata`
    pub fn with_server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.server_name = name.into();
        self.server_version = version.into();
        self
    }

    pub fn dispatcher(&self) -> &InferenceDispatcher {
        &self.dispatcher
    }
}

#[tonic::async_trait]
impl GrpcInferenceService for InferenceServiceImpl {
    async fn server_live(
        &self,
        _request: Request<proto::ServerLiveRequest>,
    ) -> Result<Response<proto::ServerLiveResponse>, Status> {
        Ok(Response::new(proto::ServerLiveResponse { live: true }))
    }

    async fn server_ready(
        &self,
        _request: Request<proto::ServerReadyRequest>,
    ) -> Result<Response<proto::ServerReadyResponse>, Status> {
        Ok(Response::new(proto::ServerReadyResponse {
            ready: self.dispatcher.registry().is_ready(),
        }))
    }

    #[instrument(skip(self, request))]
    async fn model_ready(
        &self,
        request: Request<proto::ModelReadyRequest>,
    ) -> Result<Response<proto::ModelReadyResponse>, Status> {
        let req = request.into_inner();
        let ready = self
            .dispatcher
            .registry()
            .is_model_ready(&req.name)
            .map_err(to_status)?;
        Ok(Response::new(proto::ModelReadyResponse { ready }))
    }

    async fn server_metadata(
        &self,
        _request: Request<proto::ServerMetadataRequest>,
    ) -> Result<Response<proto::ServerMetadataResponse>, Status> {
        Ok(Response::new(proto::ServerMetadataResponse {
            name: self.server_name.clone(),
            version: self.server_version.clone(),
            extensions: EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }))
    }

    #[instrument(skip(self, request))]
    async fn model_metadata(
        &self,
        request: Request<proto::ModelMetadataRequest>,
    ) -> Result<Response<proto::ModelMetadataResponse>, Status> {
        let req = request.into_inner();
        let model = self.dispatcher.registry().get(&req.name).ok_or_else(|| {
            Status::not_found(format!("Model with name {} does not exist.", req.name))
        })?;
        Ok(Response::new(model.metadata().into()))
    }

    /// Run inference
    #[instrument(skip(self, request), fields(model, request_id))]
    async fn model_infer(
        &self,
        request: Request<proto::ModelInferRequest>,
    ) -> Result<Response<proto::ModelInferResponse>, Status> {
        let req = request.into_inner();
        let span = tracing::Span::current();
        span.record("model", req.model_name.as_str());
        span.record("request_id", req.id.as_str());

        let domain_request = infer_request_from_proto(req).map_err(to_status)?;
        debug!(inputs = domain_request.inputs.len(), "gRPC inference request");

        let response = self
            .dispatcher
            .infer(domain_request)
            .await
            .map_err(to_status)?;

        Ok(Response::new(infer_response_to_proto(response)))
    }

    #[instrument(skip(self, request))]
    async fn repository_model_unload(
        &self,
        request: Request<proto::RepositoryModelUnloadRequest>,
    ) -> Result<Response<proto::RepositoryModelUnloadResponse>, Status> {
        let req = request.into_inner();
        self.dispatcher
            .registry()
            .unload(&req.model_name)
            .map_err(to_status)?;
        info!("Model {} unloaded", req.model_name);

        Ok(Response::new(proto::RepositoryModelUnloadResponse {
            model_name: req.model_name,
            is_unloaded: true,
        }))
    }
}
