//! Credential persistence.
//!
//! One JSON document per identity plus a pointer to the active one. Records
//! hold raw key material, so files are written owner-readable only where the
//! platform supports it.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hubstrap_types::{Fid, SecretString, SignerPublicKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("No credentials stored for fid {0}")]
	NotFound(Fid),
}

/// Everything needed to act as one identity later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
	pub fid: Fid,
	pub owner_address: Address,
	pub owner_private_key: SecretString,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signer_public_key: Option<SignerPublicKey>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signer_private_key: Option<SecretString>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
	pub fn new(fid: Fid, owner_address: Address, owner_private_key: SecretString) -> Self {
		let now = Utc::now();
		Self {
			fid,
			owner_address,
			owner_private_key,
			signer_public_key: None,
			signer_private_key: None,
			username: None,
			created_at: now,
			updated_at: now,
		}
	}

	/// Replaces the signer, e.g. after a stale one was re-issued.
	pub fn set_signer(&mut self, public_key: SignerPublicKey, private_key: SecretString) {
		self.signer_public_key = Some(public_key);
		self.signer_private_key = Some(private_key);
		self.updated_at = Utc::now();
	}

	pub fn set_username(&mut self, username: impl Into<String>) {
		self.username = Some(username.into());
		self.updated_at = Utc::now();
	}
}

/// Keyed record store with one active identity.
#[async_trait]
pub trait CredentialStore: Send + Sync {
	async fn load(&self, fid: Fid) -> Result<Option<CredentialRecord>, StoreError>;

	/// Inserts or replaces the record for `record.fid`.
	async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError>;

	/// Record the active pointer refers to, if any.
	async fn active(&self) -> Result<Option<CredentialRecord>, StoreError>;

	/// Points the active pointer at `fid`, which must already be stored.
	async fn set_active(&self, fid: Fid) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ActivePointer {
	fid: Fid,
}

/// [`CredentialStore`] over a directory of JSON files.
pub struct FileCredentialStore {
	root: PathBuf,
}

impl FileCredentialStore {
	const ACTIVE_FILE: &'static str = "active.json";

	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn record_path(&self, fid: Fid) -> PathBuf {
		self.root.join(format!("{fid}.json"))
	}

	async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
		let bytes = match fs::read(path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		serde_json::from_slice(&bytes)
			.map(Some)
			.map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))
	}

	/// Writes through a temporary file so a crash never leaves half a record.
	async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
		fs::create_dir_all(&self.root).await?;
		let bytes = serde_json::to_vec_pretty(value)
			.map_err(|e| StoreError::Serialization(e.to_string()))?;

		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, bytes).await?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
		}
		fs::rename(&tmp, path).await?;
		Ok(())
	}
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
	async fn load(&self, fid: Fid) -> Result<Option<CredentialRecord>, StoreError> {
		Self::read_json(&self.record_path(fid)).await
	}

	async fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
		self.write_json(&self.record_path(record.fid), record).await?;
		tracing::debug!(fid = %record.fid, "Credentials saved");
		Ok(())
	}

	async fn active(&self) -> Result<Option<CredentialRecord>, StoreError> {
		let pointer: Option<ActivePointer> =
			Self::read_json(&self.root.join(Self::ACTIVE_FILE)).await?;
		match pointer {
			Some(pointer) => self.load(pointer.fid).await,
			None => Ok(None),
		}
	}

	async fn set_active(&self, fid: Fid) -> Result<(), StoreError> {
		if !fs::try_exists(self.record_path(fid)).await? {
			return Err(StoreError::NotFound(fid));
		}
		self.write_json(&self.root.join(Self::ACTIVE_FILE), &ActivePointer { fid })
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::address;

	fn record(fid: u64) -> CredentialRecord {
		CredentialRecord::new(
			Fid(fid),
			address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
			SecretString::from("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"),
		)
	}

	#[tokio::test]
	async fn test_save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCredentialStore::new(dir.path());

		let mut saved = record(77);
		saved.set_signer(SignerPublicKey([3u8; 32]), SecretString::from("0x0303"));
		store.save(&saved).await.unwrap();

		assert_eq!(store.load(Fid(77)).await.unwrap(), Some(saved));
		assert_eq!(store.load(Fid(78)).await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_active_pointer_follows_set_active() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCredentialStore::new(dir.path().join("nested"));

		assert_eq!(store.active().await.unwrap(), None);
		store.save(&record(1)).await.unwrap();
		store.save(&record(2)).await.unwrap();

		store.set_active(Fid(2)).await.unwrap();
		assert_eq!(store.active().await.unwrap().map(|r| r.fid), Some(Fid(2)));
		store.set_active(Fid(1)).await.unwrap();
		assert_eq!(store.active().await.unwrap().map(|r| r.fid), Some(Fid(1)));
	}

	#[tokio::test]
	async fn test_unknown_fid_cannot_be_activated() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCredentialStore::new(dir.path());

		let err = store.set_active(Fid(9)).await.unwrap_err();
		assert!(matches!(err, StoreError::NotFound(Fid(9))));
	}

	#[tokio::test]
	async fn test_save_replaces_record() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCredentialStore::new(dir.path());

		let mut first = record(5);
		store.save(&first).await.unwrap();
		first.set_username("alice");
		store.save(&first).await.unwrap();

		let loaded = store.load(Fid(5)).await.unwrap().unwrap();
		assert_eq!(loaded.username.as_deref(), Some("alice"));
		assert!(!dir.path().join("5.json.tmp").exists());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_records_are_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::tempdir().unwrap();
		let store = FileCredentialStore::new(dir.path());
		store.save(&record(6)).await.unwrap();

		let mode = std::fs::metadata(dir.path().join("6.json")).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	#[tokio::test]
	async fn test_corrupt_record_is_a_serialization_error() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("4.json"), b"{ not json").unwrap();
		let store = FileCredentialStore::new(dir.path());

		assert!(matches!(store.load(Fid(4)).await, Err(StoreError::Serialization(_))));
	}
}
