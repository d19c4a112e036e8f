//! Hub HTTP API over paid requests.

use alloy_primitives::Address;
use async_trait::async_trait;
use hubstrap_payment::{PaidRequest, ProtectedClient, ProtectedResponse};
use hubstrap_types::{Fid, SignerPublicKey};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
	message::{MessageHash, SignedMessage},
	HubError,
};

/// Reads and writes the workspace performs against a hub.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait HubInterface: Send + Sync {
	/// Identifier the hub has indexed for `address`, if any.
	async fn fid_by_address(&self, address: Address) -> Result<Option<Fid>, HubError>;

	/// Signer keys the hub currently considers active for `fid`.
	async fn signers_by_fid(&self, fid: Fid) -> Result<Vec<SignerPublicKey>, HubError>;

	/// Submits an encoded message and returns the hash the hub accepted.
	async fn submit_message(&self, message: SignedMessage) -> Result<MessageHash, HubError>;

	/// Whether the cast `(fid, hash)` is readable from the hub.
	async fn cast_exists(&self, fid: Fid, hash: MessageHash) -> Result<bool, HubError>;
}

#[derive(Debug, Deserialize)]
struct IdRegistryEvent {
	fid: u64,
}

#[derive(Debug, Deserialize)]
struct SignerEvents {
	#[serde(default)]
	events: Vec<SignerEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignerEvent {
	signer_event_body: SignerEventBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignerEventBody {
	key: String,
	event_type: String,
}

#[derive(Debug, Deserialize)]
struct SubmittedMessage {
	hash: MessageHash,
}

/// [`HubInterface`] over the hub's `/v1` HTTP API.
pub struct HubClient {
	base_url: String,
	client: Arc<ProtectedClient>,
}

impl HubClient {
	pub fn new(base_url: impl Into<String>, client: Arc<ProtectedClient>) -> Self {
		Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
			client,
		}
	}

	fn url(&self, path: &str) -> String {
		format!("{}/v1/{path}", self.base_url)
	}

	/// Sends `request`; a 404 becomes `None`, any other non-2xx an error.
	async fn fetch(&self, request: PaidRequest) -> Result<Option<ProtectedResponse>, HubError> {
		let response = self.client.send(request).await?;
		if response.status == 404 {
			return Ok(None);
		}
		if !response.is_success() {
			return Err(HubError::Http {
				status: response.status,
				detail: response.text(),
			});
		}
		Ok(Some(response))
	}
}

fn decode<T: serde::de::DeserializeOwned>(response: &ProtectedResponse, what: &str) -> Result<T, HubError> {
	serde_json::from_slice(&response.body).map_err(|e| HubError::Decode(format!("{what}: {e}")))
}

/// Replays add and remove events in order.
fn active_signers(events: SignerEvents) -> Result<Vec<SignerPublicKey>, HubError> {
	let mut active = BTreeSet::new();
	for event in events.events {
		let key: SignerPublicKey = event.signer_event_body.key.parse()?;
		match event.signer_event_body.event_type.as_str() {
			"SIGNER_EVENT_TYPE_ADD" => {
				active.insert(key.0);
			},
			"SIGNER_EVENT_TYPE_REMOVE" => {
				active.remove(&key.0);
			},
			_ => {},
		}
	}
	Ok(active.into_iter().map(SignerPublicKey).collect())
}

#[async_trait]
impl HubInterface for HubClient {
	async fn fid_by_address(&self, address: Address) -> Result<Option<Fid>, HubError> {
		let url = self.url(&format!("onChainIdRegistryEventByAddress?address={address}"));
		let Some(response) = self.fetch(PaidRequest::get(url)).await? else {
			return Ok(None);
		};
		let event: IdRegistryEvent = decode(&response, "id registry event")?;
		Ok((event.fid != 0).then_some(Fid(event.fid)))
	}

	async fn signers_by_fid(&self, fid: Fid) -> Result<Vec<SignerPublicKey>, HubError> {
		let url = self.url(&format!("onChainSignersByFid?fid={fid}"));
		let Some(response) = self.fetch(PaidRequest::get(url)).await? else {
			return Ok(Vec::new());
		};
		active_signers(decode(&response, "signer events")?)
	}

	async fn submit_message(&self, message: SignedMessage) -> Result<MessageHash, HubError> {
		let request = PaidRequest::post_binary(self.url("submitMessage"), message.bytes);
		let response = self.client.send(request).await?;
		if !response.is_success() {
			return Err(HubError::Http {
				status: response.status,
				detail: response.text(),
			});
		}
		let submitted: SubmittedMessage = decode(&response, "submitted message")?;
		if submitted.hash != message.hash {
			tracing::warn!(expected = %message.hash, returned = %submitted.hash, "Hub echoed a different message hash");
		}
		Ok(submitted.hash)
	}

	async fn cast_exists(&self, fid: Fid, hash: MessageHash) -> Result<bool, HubError> {
		let url = self.url(&format!("castById?fid={fid}&hash={hash}"));
		Ok(self.fetch(PaidRequest::get(url)).await?.is_some())
	}
}
