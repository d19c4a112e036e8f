//! Per-invocation state: configuration, account, components and the
//! stored identity for that account.

use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use hubstrap_account::{AccountInterface, LocalWallet};
use hubstrap_config::Config;
use hubstrap_core::{
	BootstrapContext, BootstrapOptions, BootstrapOrchestrator, BootstrapReport, CredentialRecord,
	CredentialStore, FileCredentialStore,
};
use hubstrap_hub::{CastSubmitter, MessageSigner};
use hubstrap_types::{Fid, Identity, SecretString, SignerKeyPair};
use std::sync::Arc;

use crate::cli::GlobalArgs;

pub struct Session {
	pub context: BootstrapContext,
	pub store: FileCredentialStore,
	/// Stored record for this account, if it has one.
	pub record: Option<CredentialRecord>,
	pub json: bool,
	private_key: SecretString,
}

impl Session {
	pub async fn open(args: &GlobalArgs) -> Result<Self> {
		let config = match &args.config {
			Some(path) => Config::from_file(path)
				.await
				.with_context(|| format!("loading {}", path.display()))?,
			None => Config::mainnet(),
		};

		let store = FileCredentialStore::new(&args.data_dir);
		let active = store.active().await?;
		let private_key = match &args.private_key {
			Some(key) => SecretString::from(key.as_str()),
			None => active
				.as_ref()
				.map(|record| record.owner_private_key.clone())
				.ok_or_else(|| {
					anyhow!("no account key: pass --private-key or set HUBSTRAP_PRIVATE_KEY")
				})?,
		};
		let account: Arc<dyn AccountInterface> = Arc::new(LocalWallet::new(&private_key)?);
		let record = active.filter(|record| record.owner_address == account.address());

		tracing::debug!(
			owner = %account.address(),
			stored_fid = ?record.as_ref().map(|r| r.fid),
			"Session opened"
		);

		Ok(Self {
			context: BootstrapContext::from_config(&config, account)?,
			store,
			record,
			json: args.json,
			private_key,
		})
	}

	pub fn owner(&self) -> Address {
		self.context.account.address()
	}

	pub fn require_record(&self) -> Result<&CredentialRecord> {
		self.record
			.as_ref()
			.ok_or_else(|| anyhow!("no stored identity for {}; run `hubstrap register` first", self.owner()))
	}

	pub fn identity(&self) -> Result<Identity> {
		let record = self.require_record()?;
		Ok(Identity {
			fid: record.fid,
			owner: record.owner_address,
		})
	}

	/// Stored signer, when both halves are present.
	pub fn stored_signer(&self) -> Option<SignerKeyPair> {
		let record = self.record.as_ref()?;
		Some(SignerKeyPair {
			public_key: record.signer_public_key?,
			private_key: record.signer_private_key.clone()?,
		})
	}

	pub fn submitter(&self) -> Result<CastSubmitter> {
		let record = self.require_record()?;
		let key = record
			.signer_private_key
			.as_ref()
			.ok_or_else(|| anyhow!("no stored signer for fid {}; run `hubstrap signer` first", record.fid))?;
		let signer = MessageSigner::from_secret(key)?;
		Ok(self.context.cast_submitter(record.fid, signer))
	}

	/// Loads or creates the record for `fid`, applies `update`, saves it and
	/// makes it the active identity.
	pub async fn update_record(
		&mut self,
		fid: Fid,
		update: impl FnOnce(&mut CredentialRecord),
	) -> Result<()> {
		let mut record = match self.store.load(fid).await? {
			Some(record) => record,
			None => CredentialRecord::new(fid, self.owner(), self.private_key.clone()),
		};
		update(&mut record);
		self.store.save(&record).await?;
		self.store.set_active(fid).await?;
		tracing::info!(%fid, path = %self.store.root().display(), "Credentials stored");
		self.record = Some(record);
		Ok(())
	}

	/// Runs the composed flow over this session's components.
	pub async fn bootstrap(self, options: BootstrapOptions) -> (Self, BootstrapReport) {
		let Self {
			context,
			store,
			record,
			json,
			private_key,
		} = self;
		let orchestrator = BootstrapOrchestrator::new(context);
		let report = orchestrator.run(options).await;
		let session = Self {
			context: orchestrator.into_context(),
			store,
			record,
			json,
			private_key,
		};
		(session, report)
	}
}
