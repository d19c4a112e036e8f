//! Client for endpoints gated behind a per-request payment.

use alloy_primitives::{Address, U256};
use hubstrap_types::parse_address;
use std::sync::{Arc, Mutex};

use crate::{
	authorizer::PaymentAuthorizer,
	envelope::{PaymentChallenge, EXACT_SCHEME},
	transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestBody},
	PaymentError, RejectionKind,
};

pub type ProtectedResponse = HttpResponse;

/// Method, URL and optional body of one protected call.
#[derive(Debug, Clone, PartialEq)]
pub struct PaidRequest {
	pub method: HttpMethod,
	pub url: String,
	pub body: Option<RequestBody>,
}

impl PaidRequest {
	pub fn get(url: impl Into<String>) -> Self {
		Self {
			method: HttpMethod::Get,
			url: url.into(),
			body: None,
		}
	}

	pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
		Self {
			method: HttpMethod::Post,
			url: url.into(),
			body: Some(RequestBody::Json(body)),
		}
	}

	pub fn post_binary(url: impl Into<String>, body: Vec<u8>) -> Self {
		Self {
			method: HttpMethod::Post,
			url: url.into(),
			body: Some(RequestBody::Binary(body)),
		}
	}

	fn to_request(&self, headers: Vec<(String, String)>) -> HttpRequest {
		HttpRequest {
			method: self.method,
			url: self.url.clone(),
			headers,
			body: self.body.clone(),
		}
	}
}

/// Recipient and amount of every authorization this client signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTerms {
	pub payee: Address,
	pub amount: U256,
}

/// Sends requests with a freshly signed payment header each time.
///
/// When no payee is configured the first request goes out unpaid; the
/// server's 402 challenge then fixes the payee and amount for the rest of the
/// session, provided the amount does not exceed the configured limit.
pub struct ProtectedClient {
	authorizer: Arc<PaymentAuthorizer>,
	transport: Arc<dyn HttpTransport>,
	header: String,
	amount_limit: U256,
	terms: Mutex<Option<PaymentTerms>>,
}

impl ProtectedClient {
	pub fn new(
		authorizer: Arc<PaymentAuthorizer>,
		transport: Arc<dyn HttpTransport>,
		header: impl Into<String>,
		amount_limit: U256,
		payee: Option<Address>,
	) -> Self {
		let terms = payee.map(|payee| PaymentTerms {
			payee,
			amount: amount_limit,
		});
		Self {
			authorizer,
			transport,
			header: header.into(),
			amount_limit,
			terms: Mutex::new(terms),
		}
	}

	pub fn terms(&self) -> Option<PaymentTerms> {
		*self.terms.lock().unwrap_or_else(|p| p.into_inner())
	}

	fn store_terms(&self, terms: PaymentTerms) {
		*self.terms.lock().unwrap_or_else(|p| p.into_inner()) = Some(terms);
	}

	/// Sends `request` with a payment header and returns status and body.
	///
	/// Non-402 statuses are returned to the caller untouched. A 402 on a paid
	/// request becomes [`PaymentError::Rejected`] with the verifier's detail.
	pub async fn send(&self, request: PaidRequest) -> Result<ProtectedResponse, PaymentError> {
		let terms = match self.terms() {
			Some(terms) => terms,
			None => {
				let probe = self.transport.send(request.to_request(Vec::new())).await?;
				if probe.status != 402 {
					tracing::debug!(url = %request.url, status = probe.status, "Endpoint did not ask for payment");
					return Ok(probe);
				}
				let terms = self.terms_from_challenge(&probe)?;
				tracing::info!(payee = %terms.payee, amount = %terms.amount, "Payment terms accepted");
				self.store_terms(terms);
				terms
			},
		};

		let header = self
			.authorizer
			.authorize_header(terms.payee, terms.amount)
			.await?;
		let response = self
			.transport
			.send(request.to_request(vec![(self.header.clone(), header)]))
			.await?;

		if response.status == 402 {
			let detail = rejection_detail(&response);
			let kind = RejectionKind::classify(&detail);
			tracing::warn!(url = %request.url, %kind, detail = %detail, "Payment rejected");
			return Err(PaymentError::Rejected { kind, detail });
		}

		tracing::debug!(url = %request.url, status = response.status, "Protected request completed");
		Ok(response)
	}

	fn terms_from_challenge(&self, response: &HttpResponse) -> Result<PaymentTerms, PaymentError> {
		let challenge: PaymentChallenge = response.json()?;
		let settings = self.authorizer.settings();
		let requirement = challenge
			.accepts
			.iter()
			.find(|r| r.scheme == EXACT_SCHEME && r.network == settings.network)
			.ok_or_else(|| {
				PaymentError::Unsupported(format!(
					"no '{EXACT_SCHEME}' option on network '{}'",
					settings.network
				))
			})?;

		if let Some(asset) = &requirement.asset {
			let asset = parse_address(asset)?;
			if asset != settings.token.address {
				return Err(PaymentError::Unsupported(format!(
					"server asks for asset {asset}, configured token is {}",
					settings.token.address
				)));
			}
		}

		let amount = U256::from_str_radix(requirement.max_amount_required.trim(), 10)
			.map_err(|e| PaymentError::Unsupported(format!("amount: {e}")))?;
		if amount > self.amount_limit {
			return Err(PaymentError::AmountExceedsLimit {
				requested: amount,
				limit: self.amount_limit,
			});
		}

		Ok(PaymentTerms {
			payee: parse_address(&requirement.pay_to)?,
			amount,
		})
	}
}

fn rejection_detail(response: &HttpResponse) -> String {
	match response.json::<PaymentChallenge>() {
		Ok(PaymentChallenge {
			error: Some(error), ..
		}) => error,
		_ => {
			let text = response.text();
			if text.trim().is_empty() {
				"HTTP 402".to_string()
			} else {
				text
			}
		},
	}
}
