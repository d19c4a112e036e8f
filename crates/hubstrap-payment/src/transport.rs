//! HTTP transport seam for protected requests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::PaymentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
	Get,
	Post,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
	Json(serde_json::Value),
	/// Raw bytes sent as `application/octet-stream`.
	Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
	pub method: HttpMethod,
	pub url: String,
	pub headers: Vec<(String, String)>,
	pub body: Option<RequestBody>,
}

impl HttpRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
	pub status: u16,
	pub body: Vec<u8>,
}

impl HttpResponse {
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self {
			status,
			body: body.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T, PaymentError> {
		serde_json::from_slice(&self.body).map_err(|e| {
			PaymentError::Encoding(format!("unexpected response body ({}): {e}", self.status))
		})
	}
}

/// Sends one HTTP request and returns status and body, whatever the status.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait HttpTransport: Send + Sync {
	async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PaymentError>;
}

/// Transport over a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
	client: reqwest::Client,
}

impl ReqwestTransport {
	pub fn new(timeout: Duration) -> Result<Self, PaymentError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| PaymentError::Http(format!("Failed to build HTTP client: {e}")))?;
		Ok(Self { client })
	}
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
	async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PaymentError> {
		let mut builder = match request.method {
			HttpMethod::Get => self.client.get(&request.url),
			HttpMethod::Post => self.client.post(&request.url),
		};
		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		builder = match request.body {
			Some(RequestBody::Json(value)) => builder.json(&value),
			Some(RequestBody::Binary(bytes)) => builder
				.header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
				.body(bytes),
			None => builder,
		};

		let response = builder
			.send()
			.await
			.map_err(|e| PaymentError::Http(format!("{} failed: {e}", request.url)))?;
		let status = response.status().as_u16();
		let body = response
			.bytes()
			.await
			.map_err(|e| PaymentError::Http(format!("Failed to read response body: {e}")))?;

		Ok(HttpResponse::new(status, body.to_vec()))
	}
}
