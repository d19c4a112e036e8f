//! Username registry client.
//!
//! Usernames are off-chain: the registry server records a transfer of the
//! name to an identifier once the owner signs a `UserNameProof` for it. A
//! missing transfer means the name is free.

use alloy_primitives::{address, Address, Bytes, U256};
use alloy_sol_types::{sol, Eip712Domain};
use async_trait::async_trait;
use hubstrap_account::{sign_typed_data, AccountInterface};
use hubstrap_payment::{HttpMethod, HttpRequest, HttpTransport, RequestBody};
use hubstrap_types::{eip712, unix_now, Fid, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::IdentityError;

sol! {
	struct UserNameProof {
		string name;
		uint256 timestamp;
		address owner;
	}
}

const NAME_PROOF_DOMAIN_NAME: &str = "Farcaster name verification";
const NAME_PROOF_DOMAIN_VERSION: &str = "1";
const NAME_PROOF_CHAIN_ID: u64 = 1;
const NAME_PROOF_CONTRACT: Address = address!("e3be01d99baa8db9905b33a3ca391238234b79d1");

const MAX_NAME_LEN: usize = 16;

/// Domain the name registry checks claims against.
pub fn name_proof_domain() -> Eip712Domain {
	eip712::domain(
		NAME_PROOF_DOMAIN_NAME,
		NAME_PROOF_DOMAIN_VERSION,
		NAME_PROOF_CHAIN_ID,
		NAME_PROOF_CONTRACT,
	)
}

/// Accepts 1 to 16 characters of `[a-z0-9-]` not starting with a hyphen.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
	let invalid = |reason: &str| ValidationError::InvalidIdentifier(format!("username {name:?} {reason}"));
	if name.is_empty() || name.len() > MAX_NAME_LEN {
		return Err(invalid("must be 1 to 16 characters"));
	}
	if name.starts_with('-') {
		return Err(invalid("must not start with a hyphen"));
	}
	if !name
		.bytes()
		.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
	{
		return Err(invalid("may only contain a-z, 0-9 and -"));
	}
	Ok(())
}

/// Current holder of a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
	pub name: String,
	pub fid: Fid,
	pub owner: Address,
	pub timestamp: u64,
}

/// Signed request to move a name to an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameClaim {
	pub name: String,
	pub fid: Fid,
	pub owner: Address,
	pub timestamp: u64,
	pub signature: Bytes,
}

impl NameClaim {
	pub async fn sign(
		account: &dyn AccountInterface,
		fid: Fid,
		name: &str,
		timestamp: u64,
	) -> Result<Self, IdentityError> {
		let owner = account.address();
		let proof = UserNameProof {
			name: name.to_string(),
			timestamp: U256::from(timestamp),
			owner,
		};
		let signature = sign_typed_data(account, &proof, &name_proof_domain()).await?;
		Ok(Self {
			name: name.to_string(),
			fid,
			owner,
			timestamp,
			signature,
		})
	}

	pub fn verify(&self) -> Result<(), ValidationError> {
		let proof = UserNameProof {
			name: self.name.clone(),
			timestamp: U256::from(self.timestamp),
			owner: self.owner,
		};
		let signer = eip712::recover_signer(&proof, &name_proof_domain(), &self.signature)?;
		if signer != self.owner {
			return Err(ValidationError::InvalidAuthorization(format!(
				"name claim signed by {signer}, expected {}",
				self.owner
			)));
		}
		Ok(())
	}
}

/// Name registry server.
#[async_trait]
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait NameRegistryInterface: Send + Sync {
	/// Current holder of `name`, `None` when unclaimed.
	async fn lookup(&self, name: &str) -> Result<Option<NameRecord>, IdentityError>;

	async fn submit_claim(&self, claim: NameClaim) -> Result<NameRecord, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct TransferEnvelope {
	transfer: Transfer,
}

#[derive(Debug, Deserialize)]
struct Transfer {
	username: String,
	owner: Address,
	to: u64,
	timestamp: u64,
}

impl Transfer {
	/// A transfer to identifier 0 releases the name.
	fn into_record(self) -> Option<NameRecord> {
		(self.to != 0).then(|| NameRecord {
			name: self.username,
			fid: Fid(self.to),
			owner: self.owner,
			timestamp: self.timestamp,
		})
	}
}

/// HTTP client for the name registry's transfer API.
pub struct NameRegistryClient {
	base_url: String,
	transport: Arc<dyn HttpTransport>,
}

impl NameRegistryClient {
	pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
		Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
			transport,
		}
	}

	async fn send(&self, request: HttpRequest) -> Result<hubstrap_payment::HttpResponse, IdentityError> {
		self.transport
			.send(request)
			.await
			.map_err(|e| IdentityError::NameRegistry(e.to_string()))
	}
}

#[async_trait]
impl NameRegistryInterface for NameRegistryClient {
	async fn lookup(&self, name: &str) -> Result<Option<NameRecord>, IdentityError> {
		validate_name(name)?;
		let response = self
			.send(HttpRequest {
				method: HttpMethod::Get,
				url: format!("{}/transfers/current?name={name}", self.base_url),
				headers: Vec::new(),
				body: None,
			})
			.await?;
		if response.status == 404 {
			return Ok(None);
		}
		if !response.is_success() {
			return Err(IdentityError::NameRegistry(format!(
				"lookup of {name} returned {}: {}",
				response.status,
				response.text()
			)));
		}
		let envelope: TransferEnvelope = serde_json::from_slice(&response.body)
			.map_err(|e| IdentityError::Decode(format!("name registry transfer: {e}")))?;
		Ok(envelope.transfer.into_record())
	}

	async fn submit_claim(&self, claim: NameClaim) -> Result<NameRecord, IdentityError> {
		let body = serde_json::json!({
			"name": claim.name,
			"from": 0,
			"to": claim.fid.get(),
			"fid": claim.fid.get(),
			"owner": claim.owner.to_string(),
			"timestamp": claim.timestamp,
			"signature": claim.signature.to_string(),
		});
		let response = self
			.send(HttpRequest {
				method: HttpMethod::Post,
				url: format!("{}/transfers", self.base_url),
				headers: Vec::new(),
				body: Some(RequestBody::Json(body)),
			})
			.await?;
		if !response.is_success() {
			return Err(IdentityError::NameRegistry(format!(
				"claim of {} returned {}: {}",
				claim.name,
				response.status,
				response.text()
			)));
		}
		let envelope: TransferEnvelope = serde_json::from_slice(&response.body)
			.map_err(|e| IdentityError::Decode(format!("name registry transfer: {e}")))?;
		envelope.transfer.into_record().ok_or_else(|| {
			IdentityError::NameRegistry(format!("claim of {} was recorded as a release", claim.name))
		})
	}
}

/// Username operations on top of a registry.
pub struct UsernameService {
	registry: Arc<dyn NameRegistryInterface>,
}

impl UsernameService {
	pub fn new(registry: Arc<dyn NameRegistryInterface>) -> Self {
		Self { registry }
	}

	pub async fn check_availability(&self, name: &str) -> Result<bool, IdentityError> {
		validate_name(name)?;
		Ok(self.registry.lookup(name).await?.is_none())
	}

	pub async fn resolve(&self, name: &str) -> Result<Option<Fid>, IdentityError> {
		validate_name(name)?;
		Ok(self.registry.lookup(name).await?.map(|record| record.fid))
	}

	/// Claims `name` for `fid`. A name already held by `fid` is returned
	/// without a new claim.
	pub async fn register_name(
		&self,
		account: &dyn AccountInterface,
		fid: Fid,
		name: &str,
	) -> Result<NameRecord, IdentityError> {
		validate_name(name)?;
		if let Some(current) = self.registry.lookup(name).await? {
			if current.fid == fid {
				tracing::info!(%fid, name, "Username already registered");
				return Ok(current);
			}
			return Err(IdentityError::NameTaken(name.to_string()));
		}

		let claim = NameClaim::sign(account, fid, name, unix_now()).await?;
		let record = self.registry.submit_claim(claim).await?;
		tracing::info!(%fid, name, "Username registered");
		Ok(record)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{OWNER, TEST_PRIVATE_KEY};
	use hubstrap_account::LocalWallet;
	use hubstrap_payment::{HttpResponse, MockHttpTransport};
	use hubstrap_types::SecretString;
	use std::sync::Mutex;

	const REGISTRY: &str = "https://fnames.test";

	fn transfer_json(name: &str, to: u64) -> Vec<u8> {
		serde_json::to_vec(&serde_json::json!({
			"transfer": {
				"id": 5,
				"timestamp": 1_700_000_000u64,
				"username": name,
				"owner": OWNER.to_string(),
				"from": 0,
				"to": to,
				"user_signature": "0x00",
				"server_signature": "0x00",
			}
		}))
		.unwrap()
	}

	fn service(transport: MockHttpTransport) -> UsernameService {
		UsernameService::new(Arc::new(NameRegistryClient::new(
			format!("{REGISTRY}/"),
			Arc::new(transport),
		)))
	}

	#[test]
	fn test_name_validation() {
		assert!(validate_name("alice").is_ok());
		assert!(validate_name("a-1").is_ok());
		assert!(validate_name("sixteen-chars-ok").is_ok());
		assert!(validate_name("").is_err());
		assert!(validate_name("seventeen-chars-x").is_err());
		assert!(validate_name("-alice").is_err());
		assert!(validate_name("Alice").is_err());
		assert!(validate_name("al ice").is_err());
		assert!(validate_name("al.ice").is_err());
	}

	#[tokio::test]
	async fn test_missing_transfer_means_available() {
		let mut transport = MockHttpTransport::new();
		transport
			.expect_send()
			.withf(|req| req.url == "https://fnames.test/transfers/current?name=alice")
			.times(1)
			.returning(|_| Box::pin(async { Ok(HttpResponse::new(404, b"{}".to_vec())) }));

		assert!(service(transport).check_availability("alice").await.unwrap());
	}

	#[tokio::test]
	async fn test_resolve_reads_transfer_target() {
		let mut transport = MockHttpTransport::new();
		transport
			.expect_send()
			.returning(|_| Box::pin(async { Ok(HttpResponse::new(200, transfer_json("bob", 321))) }));

		let service = service(transport);
		assert_eq!(service.resolve("bob").await.unwrap(), Some(Fid(321)));
		assert!(!service.check_availability("bob").await.unwrap());
	}

	#[tokio::test]
	async fn test_released_name_is_available() {
		let mut transport = MockHttpTransport::new();
		transport
			.expect_send()
			.returning(|_| Box::pin(async { Ok(HttpResponse::new(200, transfer_json("carol", 0))) }));

		assert!(service(transport).check_availability("carol").await.unwrap());
	}

	#[tokio::test]
	async fn test_invalid_name_is_rejected_before_any_request() {
		let mut transport = MockHttpTransport::new();
		transport.expect_send().never();

		let err = service(transport).check_availability("Not_Valid").await.unwrap_err();
		assert!(matches!(err, IdentityError::Invalid(_)));
	}

	#[tokio::test]
	async fn test_register_name_posts_signed_claim() {
		let posted = Arc::new(Mutex::new(None));
		let captured = posted.clone();
		let mut transport = MockHttpTransport::new();
		transport
			.expect_send()
			.withf(|req| req.method == HttpMethod::Get)
			.times(1)
			.returning(|_| Box::pin(async { Ok(HttpResponse::new(404, Vec::new())) }));
		transport
			.expect_send()
			.withf(|req| req.method == HttpMethod::Post && req.url == "https://fnames.test/transfers")
			.times(1)
			.returning(move |req| {
				*captured.lock().unwrap() = req.body;
				Box::pin(async { Ok(HttpResponse::new(200, transfer_json("alice", 4242))) })
			});
		let wallet = LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap();

		let record = service(transport)
			.register_name(&wallet, Fid(4242), "alice")
			.await
			.unwrap();

		assert_eq!(record.fid, Fid(4242));
		let Some(RequestBody::Json(body)) = posted.lock().unwrap().clone() else {
			panic!("claim was not posted as JSON");
		};
		assert_eq!(body["name"], "alice");
		assert_eq!(body["to"], 4242);
		assert_eq!(body["from"], 0);

		let signature: Bytes = body["signature"].as_str().unwrap().parse().unwrap();
		let claim = NameClaim {
			name: "alice".into(),
			fid: Fid(4242),
			owner: OWNER,
			timestamp: body["timestamp"].as_u64().unwrap(),
			signature,
		};
		claim.verify().unwrap();
	}

	#[tokio::test]
	async fn test_name_held_by_another_identity_is_taken() {
		let mut transport = MockHttpTransport::new();
		transport
			.expect_send()
			.withf(|req| req.method == HttpMethod::Get)
			.returning(|_| Box::pin(async { Ok(HttpResponse::new(200, transfer_json("alice", 9))) }));
		transport
			.expect_send()
			.withf(|req| req.method == HttpMethod::Post)
			.never();
		let wallet = LocalWallet::new(&SecretString::from(TEST_PRIVATE_KEY)).unwrap();

		let err = service(transport)
			.register_name(&wallet, Fid(4242), "alice")
			.await
			.unwrap_err();
		assert!(matches!(err, IdentityError::NameTaken(name) if name == "alice"));
	}
}
