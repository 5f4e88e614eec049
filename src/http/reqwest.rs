use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};

use crate::error::ChatError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

/// 基于 reqwest 的 HttpTransport
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 复用外部构造的 Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 创建带整体超时的 Client
    pub fn with_timeout(timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                ChatError::transport(format!("failed to create reqwest client: {err}"))
            })?;
        Ok(Self::new(client))
    }

    fn prepare(&self, request: HttpRequest) -> Result<RequestBuilder, ChatError> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ChatError::transport(format!("invalid header name: {err}")))?;
            // Header values may hold the API key; report only the header name.
            let value = HeaderValue::from_str(&value)
                .map_err(|_| ChatError::transport(format!("invalid header value for {name}")))?;
            headers.insert(name, value);
        }

        let builder = self.client.post(request.url).headers(headers).body(request.body);
        Ok(match request.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        })
    }

    async fn execute(&self, request: HttpRequest) -> Result<Response, ChatError> {
        self.prepare(request)?
            .send()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ChatError> {
        let response = self.execute(request).await?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| ChatError::transport(err.to_string()))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ChatError> {
        let response = self.execute(request).await?;
        let status = response.status().as_u16();
        let body: HttpBodyStream = response
            .bytes_stream()
            .map_ok(|bytes| bytes.to_vec())
            .map_err(|err| ChatError::transport(err.to_string()))
            .boxed();
        Ok(HttpStreamResponse { status, body })
    }
}

/// 便捷构造线程安全 Transport
pub fn default_dyn_transport(timeout: Duration) -> Result<DynHttpTransport, ChatError> {
    Ok(Arc::new(ReqwestTransport::with_timeout(timeout)?))
}
