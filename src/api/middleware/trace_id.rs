use axum::{
    extract::Request,
    http::HeaderValue,
    response::Response,
};
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::infrastructure::logging::{TraceContext, TRACE_HEADER};

/// Trace ID를 모든 요청/응답에 부여하는 레이어
///
/// - x-trace-id 헤더가 없으면 생성해 요청 헤더에 넣음 (핸들러와 QueueManager가 같은 ID를 사용)
/// - 응답 헤더에도 같은 trace_id 추가
#[derive(Clone)]
pub struct TraceIdLayer;

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdService { inner }
    }
}

#[derive(Clone)]
pub struct TraceIdService<S> {
    inner: S,
}

impl<S> Service<Request> for TraceIdService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let trace_id = TraceContext::extract_or_generate(req.headers());
        let header_value = HeaderValue::from_str(&trace_id).ok();
        if let Some(value) = &header_value {
            req.headers_mut().insert(TRACE_HEADER, value.clone());
        }

        let future = self.inner.call(req);
        Box::pin(async move {
            let mut response = future.await?;
            if let Some(value) = header_value {
                response.headers_mut().insert(TRACE_HEADER, value);
            }
            Ok(response)
        })
    }
}
