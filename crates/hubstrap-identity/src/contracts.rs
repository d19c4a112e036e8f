//! Identity contract bindings and the shared identifier lookup.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use hubstrap_delivery::DeliveryService;
use hubstrap_types::{Fid, Identity, Transaction};

use crate::{IdentityContracts, IdentityError};

sol! {
	interface IIdGateway {
		function price() external view returns (uint256);
		function register(address recovery) external payable returns (uint256 fid, uint256 overpayment);
	}

	interface IIdRegistry {
		function idOf(address owner) external view returns (uint256);
	}

	interface IKeyGateway {
		function add(uint32 keyType, bytes calldata key, uint8 metadataType, bytes calldata metadata) external payable;
	}

	interface IKeyRegistry {
		struct KeyData {
			uint8 state;
			uint32 keyType;
		}

		function keyDataOf(uint256 fid, bytes calldata key) external view returns (KeyData memory);
	}

	interface ISignedKeyRequestValidator {
		struct SignedKeyRequestMetadata {
			uint256 requestFid;
			address requestSigner;
			bytes signature;
			uint256 deadline;
		}

		function encodeMetadata(SignedKeyRequestMetadata calldata metadata) external pure returns (bytes memory);
	}
}

/// Key type for Ed25519 signer keys.
pub const KEY_TYPE_ED25519: u32 = 1;
/// Metadata type for a signed key request.
pub const METADATA_TYPE_SIGNED_KEY_REQUEST: u8 = 1;
/// `KeyData.state` of a key that is currently authorized.
pub const KEY_STATE_ADDED: u8 = 1;

/// Reads the identifier owned by `owner`. The registry answers zero for an
/// address without one.
pub async fn lookup_identity(
	delivery: &DeliveryService,
	contracts: &IdentityContracts,
	owner: Address,
) -> Result<Option<Identity>, IdentityError> {
	let call = IIdRegistry::idOfCall { owner };
	let data = delivery
		.call(Transaction::call(
			contracts.chain_id,
			contracts.id_registry,
			call.abi_encode(),
		))
		.await?;
	let id = IIdRegistry::idOfCall::abi_decode_returns(&data)
		.map_err(|e| IdentityError::Decode(format!("idOf response: {e}")))?;
	if id.is_zero() {
		return Ok(None);
	}
	let fid = u64::try_from(id)
		.map_err(|_| IdentityError::Decode(format!("identifier {id} does not fit in u64")))?;
	Ok(Some(Identity {
		fid: Fid(fid),
		owner,
	}))
}

pub(crate) fn fid_word(fid: Fid) -> U256 {
	U256::from(fid.get())
}
