//! Composing and submitting application messages for one identity.

use hubstrap_identity::UsernameService;
use hubstrap_types::{unix_now, ActionKind, Fid, RateLimiter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::{
	mentions::{apply_mentions, parse_mentions},
	message::{
		CastAddBody, CastId, CastParent, FarcasterNetwork, MessageBody, MessageData, MessageHash,
		MessageSigner, UserDataKind,
	},
	HubError, HubInterface,
};

/// A post as the user wrote it, before mentions are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastDraft {
	pub text: String,
	pub embeds: Vec<String>,
	pub parent: Option<CastParent>,
}

impl CastDraft {
	pub fn new(text: impl Into<String>) -> Self {
		Self {
			text: text.into(),
			..Self::default()
		}
	}

	pub fn with_embed(mut self, url: impl Into<String>) -> Self {
		self.embeds.push(url.into());
		self
	}

	pub fn reply_to(mut self, parent: CastId) -> Self {
		self.parent = Some(CastParent::Cast(parent));
		self
	}

	pub fn in_channel(mut self, url: impl Into<String>) -> Self {
		self.parent = Some(CastParent::Url(url.into()));
		self
	}

	fn action(&self) -> ActionKind {
		match self.parent {
			Some(CastParent::Cast(_)) => ActionKind::Reply,
			_ => ActionKind::Post,
		}
	}
}

/// Whether a submitted post could be read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
	Verified,
	Unverified { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
	pub hash: MessageHash,
	pub verification: Verification,
}

/// Signs messages with the identity's delegated key and submits them.
pub struct CastSubmitter {
	hub: Arc<dyn HubInterface>,
	names: Option<Arc<UsernameService>>,
	signer: MessageSigner,
	fid: Fid,
	network: FarcasterNetwork,
	verify_delay: Duration,
}

impl CastSubmitter {
	pub fn new(
		hub: Arc<dyn HubInterface>,
		names: Option<Arc<UsernameService>>,
		signer: MessageSigner,
		fid: Fid,
		network: FarcasterNetwork,
		verify_delay: Duration,
	) -> Self {
		Self {
			hub,
			names,
			signer,
			fid,
			network,
			verify_delay,
		}
	}

	pub fn fid(&self) -> Fid {
		self.fid
	}

	/// Posts `draft`, then checks after the verify delay that the hub serves
	/// it. A failed read back is reported, not returned as an error.
	#[instrument(skip_all, fields(fid = %self.fid))]
	pub async fn post(&self, limiter: &mut RateLimiter, draft: CastDraft) -> Result<Submission, HubError> {
		let action = draft.action();
		let mut body = self.resolve_mentions(&draft.text).await;
		body.embeds = draft.embeds;
		body.parent = draft.parent;

		limiter.acquire(action).await;
		let hash = self.submit(MessageBody::CastAdd(body)).await?;
		tracing::info!(%hash, %action, "Cast submitted");

		let verification = self.verify(hash).await;
		Ok(Submission { hash, verification })
	}

	#[instrument(skip_all, fields(fid = %self.fid, %target_hash))]
	pub async fn remove_cast(
		&self,
		limiter: &mut RateLimiter,
		target_hash: MessageHash,
	) -> Result<MessageHash, HubError> {
		limiter.acquire(ActionKind::Post).await;
		self.submit(MessageBody::CastRemove { target_hash }).await
	}

	#[instrument(skip_all, fields(fid = %self.fid, %target_fid))]
	pub async fn follow(&self, limiter: &mut RateLimiter, target_fid: Fid) -> Result<MessageHash, HubError> {
		limiter.acquire(ActionKind::Follow).await;
		self.submit(MessageBody::LinkAdd { target_fid }).await
	}

	#[instrument(skip_all, fields(fid = %self.fid, %target_fid))]
	pub async fn unfollow(&self, limiter: &mut RateLimiter, target_fid: Fid) -> Result<MessageHash, HubError> {
		limiter.acquire(ActionKind::Follow).await;
		self.submit(MessageBody::LinkRemove { target_fid }).await
	}

	#[instrument(skip_all, fields(fid = %self.fid, %kind))]
	pub async fn set_user_data(
		&self,
		limiter: &mut RateLimiter,
		kind: UserDataKind,
		value: impl Into<String>,
	) -> Result<MessageHash, HubError> {
		limiter.acquire(ActionKind::Profile).await;
		self.submit(MessageBody::UserDataAdd {
			kind,
			value: value.into(),
		})
		.await
	}

	async fn submit(&self, body: MessageBody) -> Result<MessageHash, HubError> {
		let data = MessageData::new(self.fid, self.network, body, unix_now())?;
		let signed = self.signer.sign(&data);
		self.hub.submit_message(signed).await
	}

	async fn resolve_mentions(&self, text: &str) -> CastAddBody {
		let spans = parse_mentions(text);
		let mut resolved = Vec::with_capacity(spans.len());
		for span in &spans {
			let fid = match &self.names {
				Some(names) => match names.resolve(&span.name).await {
					Ok(fid) => fid,
					Err(e) => {
						tracing::warn!(name = %span.name, error = %e, "Mention lookup failed, keeping it as text");
						None
					},
				},
				None => None,
			};
			if fid.is_none() {
				tracing::debug!(name = %span.name, "Mention left unresolved");
			}
			resolved.push(fid);
		}
		apply_mentions(text, &spans, &resolved)
	}

	async fn verify(&self, hash: MessageHash) -> Verification {
		tokio::time::sleep(self.verify_delay).await;
		match self.hub.cast_exists(self.fid, hash).await {
			Ok(true) => Verification::Verified,
			Ok(false) => {
				tracing::warn!(%hash, "Cast not visible on the hub yet");
				Verification::Unverified {
					reason: "cast not found after submission".into(),
				}
			},
			Err(e) => {
				tracing::warn!(%hash, error = %e, "Could not read back cast");
				Verification::Unverified { reason: e.to_string() }
			},
		}
	}
}
