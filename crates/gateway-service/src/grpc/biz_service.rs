//! Business service: interceptor targets.
//!
//! The handlers carry no logic of their own; each answers with a dummy
//! acknowledgement. Their value is in the fully-qualified method paths the
//! authorization layer gates, audits and counts.

use proto_gen::gateway::biz_server::Biz;
use proto_gen::gateway::Nothing;
use tonic::{Request, Response, Status};

#[derive(Debug, Default, Clone)]
pub struct BizGrpcService;

fn ack() -> Response<Nothing> {
    Response::new(Nothing { dummy: true })
}

#[tonic::async_trait]
impl Biz for BizGrpcService {
    async fn check(&self, _request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(ack())
    }

    async fn add(&self, _request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(ack())
    }

    async fn test(&self, _request: Request<Nothing>) -> Result<Response<Nothing>, Status> {
        Ok(ack())
    }
}
