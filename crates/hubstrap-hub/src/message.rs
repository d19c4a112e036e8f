//! Hub message encoding and signing.
//!
//! Messages are protobuf. Only the handful of message kinds this workspace
//! sends are supported, so the encoder is written out by hand against the
//! field numbers below rather than generated. Proto3 rules apply: scalar
//! fields holding their default value are omitted, repeated scalars are
//! packed.

use ed25519_dalek::{Signer, SigningKey};
use hubstrap_types::{Fid, SecretString, SignerPublicKey, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use crate::HubError;

/// Unix time of the hub epoch (2021-01-01T00:00:00Z).
pub const FARCASTER_EPOCH: u64 = 1_609_459_200;
/// Longest cast text in bytes.
pub const MAX_CAST_BYTES: usize = 320;
pub const MAX_EMBEDS: usize = 2;
pub const MAX_USER_DATA_BYTES: usize = 256;

const HASH_SCHEME_BLAKE3: u64 = 1;
const SIGNATURE_SCHEME_ED25519: u64 = 1;
const HASH_LEN: usize = 20;

mod field {
	pub const DATA_TYPE: u32 = 1;
	pub const DATA_FID: u32 = 2;
	pub const DATA_TIMESTAMP: u32 = 3;
	pub const DATA_NETWORK: u32 = 4;
	pub const DATA_CAST_ADD: u32 = 5;
	pub const DATA_CAST_REMOVE: u32 = 6;
	pub const DATA_USER_DATA: u32 = 12;
	pub const DATA_LINK: u32 = 14;

	pub const MESSAGE_DATA: u32 = 1;
	pub const MESSAGE_HASH: u32 = 2;
	pub const MESSAGE_HASH_SCHEME: u32 = 3;
	pub const MESSAGE_SIGNATURE: u32 = 4;
	pub const MESSAGE_SIGNATURE_SCHEME: u32 = 5;
	pub const MESSAGE_SIGNER: u32 = 6;

	pub const CAST_MENTIONS: u32 = 2;
	pub const CAST_PARENT_CAST_ID: u32 = 3;
	pub const CAST_TEXT: u32 = 4;
	pub const CAST_MENTIONS_POSITIONS: u32 = 5;
	pub const CAST_EMBEDS: u32 = 6;
	pub const CAST_PARENT_URL: u32 = 7;

	pub const CAST_ID_FID: u32 = 1;
	pub const CAST_ID_HASH: u32 = 2;
	pub const EMBED_URL: u32 = 1;
	pub const CAST_REMOVE_TARGET: u32 = 1;

	pub const USER_DATA_TYPE: u32 = 1;
	pub const USER_DATA_VALUE: u32 = 2;

	pub const LINK_TYPE: u32 = 1;
	pub const LINK_TARGET_FID: u32 = 3;
}

/// Minimal protobuf writer.
#[derive(Default)]
struct ProtoWriter {
	buf: Vec<u8>,
}

impl ProtoWriter {
	fn varint(&mut self, mut value: u64) {
		while value >= 0x80 {
			self.buf.push((value as u8 & 0x7f) | 0x80);
			value >>= 7;
		}
		self.buf.push(value as u8);
	}

	fn key(&mut self, field: u32, wire_type: u8) {
		self.varint((u64::from(field) << 3) | u64::from(wire_type));
	}

	fn uint(&mut self, field: u32, value: u64) {
		if value != 0 {
			self.key(field, 0);
			self.varint(value);
		}
	}

	fn bytes(&mut self, field: u32, value: &[u8]) {
		if !value.is_empty() {
			self.len_delimited(field, value);
		}
	}

	fn string(&mut self, field: u32, value: &str) {
		self.bytes(field, value.as_bytes());
	}

	/// Embedded message; written even when empty so the oneof is set.
	fn message(&mut self, field: u32, nested: ProtoWriter) {
		self.len_delimited(field, &nested.buf);
	}

	fn packed(&mut self, field: u32, values: impl IntoIterator<Item = u64>) {
		let mut inner = ProtoWriter::default();
		for value in values {
			inner.varint(value);
		}
		self.bytes(field, &inner.buf);
	}

	fn len_delimited(&mut self, field: u32, value: &[u8]) {
		self.key(field, 2);
		self.varint(value.len() as u64);
		self.buf.extend_from_slice(value);
	}

	fn finish(self) -> Vec<u8> {
		self.buf
	}
}

/// 20-byte truncated BLAKE3 digest identifying a message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHash(pub [u8; HASH_LEN]);

impl MessageHash {
	pub fn of(data: &[u8]) -> Self {
		let digest = blake3::hash(data);
		let mut hash = [0u8; HASH_LEN];
		hash.copy_from_slice(&digest.as_bytes()[..HASH_LEN]);
		Self(hash)
	}

	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for MessageHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "MessageHash({})", self.to_hex())
	}
}

impl fmt::Display for MessageHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl FromStr for MessageHash {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
			.map_err(|e| ValidationError::InvalidIdentifier(format!("message hash: {e}")))?;
		let hash: [u8; HASH_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
			ValidationError::InvalidIdentifier(format!("message hash must be 20 bytes, got {}", v.len()))
		})?;
		Ok(Self(hash))
	}
}

impl Serialize for MessageHash {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for MessageHash {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer)?
			.parse()
			.map_err(serde::de::Error::custom)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastId {
	pub fid: Fid,
	pub hash: MessageHash,
}

impl CastId {
	fn encode(&self) -> ProtoWriter {
		let mut w = ProtoWriter::default();
		w.uint(field::CAST_ID_FID, self.fid.get());
		w.bytes(field::CAST_ID_HASH, &self.hash.0);
		w
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastParent {
	Cast(CastId),
	Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CastAddBody {
	pub text: String,
	pub mentions: Vec<Fid>,
	/// Byte offsets into `text` where each mention is rendered.
	pub mentions_positions: Vec<u32>,
	pub embeds: Vec<String>,
	pub parent: Option<CastParent>,
}

impl CastAddBody {
	fn validate(&self) -> Result<(), ValidationError> {
		if self.text.len() > MAX_CAST_BYTES {
			return Err(ValidationError::InvalidIdentifier(format!(
				"cast text is {} bytes, limit is {MAX_CAST_BYTES}",
				self.text.len()
			)));
		}
		if self.embeds.len() > MAX_EMBEDS {
			return Err(ValidationError::InvalidIdentifier(format!(
				"at most {MAX_EMBEDS} embeds per cast"
			)));
		}
		if self.mentions.len() != self.mentions_positions.len() {
			return Err(ValidationError::InvalidIdentifier(
				"every mention needs exactly one position".into(),
			));
		}
		if let Some(position) = self
			.mentions_positions
			.iter()
			.find(|p| **p as usize > self.text.len())
		{
			return Err(ValidationError::InvalidIdentifier(format!(
				"mention position {position} is past the end of the text"
			)));
		}
		if self.text.is_empty() && self.embeds.is_empty() && self.mentions.is_empty() {
			return Err(ValidationError::InvalidIdentifier("cast is empty".into()));
		}
		Ok(())
	}

	fn encode(&self) -> ProtoWriter {
		let mut w = ProtoWriter::default();
		w.packed(field::CAST_MENTIONS, self.mentions.iter().map(Fid::get));
		if let Some(CastParent::Cast(cast_id)) = &self.parent {
			w.message(field::CAST_PARENT_CAST_ID, cast_id.encode());
		}
		w.string(field::CAST_TEXT, &self.text);
		w.packed(
			field::CAST_MENTIONS_POSITIONS,
			self.mentions_positions.iter().map(|p| u64::from(*p)),
		);
		for url in &self.embeds {
			let mut embed = ProtoWriter::default();
			embed.string(field::EMBED_URL, url);
			w.message(field::CAST_EMBEDS, embed);
		}
		if let Some(CastParent::Url(url)) = &self.parent {
			w.string(field::CAST_PARENT_URL, url);
		}
		w
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDataKind {
	Pfp = 1,
	Display = 2,
	Bio = 3,
	Url = 5,
	Username = 6,
}

impl fmt::Display for UserDataKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Pfp => "pfp",
			Self::Display => "display",
			Self::Bio => "bio",
			Self::Url => "url",
			Self::Username => "username",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
	CastAdd(CastAddBody),
	CastRemove { target_hash: MessageHash },
	LinkAdd { target_fid: Fid },
	LinkRemove { target_fid: Fid },
	UserDataAdd { kind: UserDataKind, value: String },
}

impl MessageBody {
	fn message_type(&self) -> u64 {
		match self {
			Self::CastAdd(_) => 1,
			Self::CastRemove { .. } => 2,
			Self::LinkAdd { .. } => 5,
			Self::LinkRemove { .. } => 6,
			Self::UserDataAdd { .. } => 11,
		}
	}

	fn validate(&self) -> Result<(), ValidationError> {
		match self {
			Self::CastAdd(body) => body.validate(),
			Self::UserDataAdd { kind, value } if value.len() > MAX_USER_DATA_BYTES => {
				Err(ValidationError::InvalidIdentifier(format!(
					"{kind} is {} bytes, limit is {MAX_USER_DATA_BYTES}",
					value.len()
				)))
			},
			_ => Ok(()),
		}
	}

	fn encode_into(&self, w: &mut ProtoWriter) {
		match self {
			Self::CastAdd(body) => w.message(field::DATA_CAST_ADD, body.encode()),
			Self::CastRemove { target_hash } => {
				let mut body = ProtoWriter::default();
				body.bytes(field::CAST_REMOVE_TARGET, &target_hash.0);
				w.message(field::DATA_CAST_REMOVE, body);
			},
			Self::LinkAdd { target_fid } | Self::LinkRemove { target_fid } => {
				let mut body = ProtoWriter::default();
				body.string(field::LINK_TYPE, "follow");
				body.uint(field::LINK_TARGET_FID, target_fid.get());
				w.message(field::DATA_LINK, body);
			},
			Self::UserDataAdd { kind, value } => {
				let mut body = ProtoWriter::default();
				body.uint(field::USER_DATA_TYPE, *kind as u64);
				body.string(field::USER_DATA_VALUE, value);
				w.message(field::DATA_USER_DATA, body);
			},
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarcasterNetwork {
	#[default]
	Mainnet = 1,
	Testnet = 2,
	Devnet = 3,
}

/// Seconds since the hub epoch.
pub fn farcaster_timestamp(unix_secs: u64) -> Result<u32, ValidationError> {
	let offset = unix_secs.checked_sub(FARCASTER_EPOCH).ok_or_else(|| {
		ValidationError::InvalidIdentifier(format!("timestamp {unix_secs} predates the hub epoch"))
	})?;
	u32::try_from(offset)
		.map_err(|_| ValidationError::InvalidIdentifier(format!("timestamp {unix_secs} is too far ahead")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageData {
	pub fid: Fid,
	pub timestamp: u32,
	pub network: FarcasterNetwork,
	pub body: MessageBody,
}

impl MessageData {
	/// Validates `body` and stamps it with `unix_secs`.
	pub fn new(
		fid: Fid,
		network: FarcasterNetwork,
		body: MessageBody,
		unix_secs: u64,
	) -> Result<Self, ValidationError> {
		body.validate()?;
		Ok(Self {
			fid,
			timestamp: farcaster_timestamp(unix_secs)?,
			network,
			body,
		})
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut w = ProtoWriter::default();
		w.uint(field::DATA_TYPE, self.body.message_type());
		w.uint(field::DATA_FID, self.fid.get());
		w.uint(field::DATA_TIMESTAMP, u64::from(self.timestamp));
		w.uint(field::DATA_NETWORK, self.network as u64);
		self.body.encode_into(&mut w);
		w.finish()
	}
}

/// Encoded message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage {
	pub hash: MessageHash,
	/// Encoded `MessageData` the hash covers.
	pub data: Vec<u8>,
	/// Encoded `Message` envelope.
	pub bytes: Vec<u8>,
}

/// Ed25519 signer key used for application messages.
pub struct MessageSigner {
	key: SigningKey,
}

impl MessageSigner {
	/// Loads the hex-encoded 32-byte seed of a signer key.
	pub fn from_secret(secret: &SecretString) -> Result<Self, HubError> {
		let seed = secret.with_exposed(|raw| {
			let raw = raw.trim();
			hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).map(Zeroizing::new)
		});
		let seed = seed.map_err(|_| ValidationError::InvalidKey("signer key is not hex".into()))?;
		let seed: &[u8; 32] = seed.as_slice().try_into().map_err(|_| {
			ValidationError::InvalidKey(format!("signer key must be 32 bytes, got {}", seed.len()))
		})?;
		Ok(Self {
			key: SigningKey::from_bytes(seed),
		})
	}

	pub fn public_key(&self) -> SignerPublicKey {
		SignerPublicKey(self.key.verifying_key().to_bytes())
	}

	pub fn sign(&self, data: &MessageData) -> SignedMessage {
		let data_bytes = data.encode();
		let hash = MessageHash::of(&data_bytes);
		let signature = self.key.sign(&hash.0);

		let mut w = ProtoWriter::default();
		w.bytes(field::MESSAGE_DATA, &data_bytes);
		w.bytes(field::MESSAGE_HASH, &hash.0);
		w.uint(field::MESSAGE_HASH_SCHEME, HASH_SCHEME_BLAKE3);
		w.bytes(field::MESSAGE_SIGNATURE, &signature.to_bytes());
		w.uint(field::MESSAGE_SIGNATURE_SCHEME, SIGNATURE_SCHEME_ED25519);
		w.bytes(field::MESSAGE_SIGNER, self.public_key().as_bytes());

		SignedMessage {
			hash,
			data: data_bytes,
			bytes: w.finish(),
		}
	}
}

impl fmt::Debug for MessageSigner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MessageSigner")
			.field("public_key", &self.public_key())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Signature, Verifier, VerifyingKey};

	const SEED: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

	fn signer() -> MessageSigner {
		MessageSigner::from_secret(&SecretString::from(SEED)).unwrap()
	}

	fn data(body: MessageBody) -> MessageData {
		MessageData {
			fid: Fid(2),
			timestamp: 100,
			network: FarcasterNetwork::Mainnet,
			body,
		}
	}

	#[test]
	fn test_varint_encoding() {
		let mut w = ProtoWriter::default();
		w.varint(1);
		w.varint(300);
		w.varint(u64::from(u32::MAX));
		assert_eq!(w.finish(), vec![0x01, 0xac, 0x02, 0xff, 0xff, 0xff, 0xff, 0x0f]);
	}

	#[test]
	fn test_link_add_encoding() {
		let bytes = data(MessageBody::LinkAdd {
			target_fid: Fid(3),
		})
		.encode();

		let mut expected = vec![0x08, 0x05, 0x10, 0x02, 0x18, 0x64, 0x20, 0x01, 0x72, 0x0a];
		expected.extend_from_slice(&[0x0a, 0x06]);
		expected.extend_from_slice(b"follow");
		expected.extend_from_slice(&[0x18, 0x03]);
		assert_eq!(bytes, expected);
	}

	#[test]
	fn test_link_remove_differs_only_in_type() {
		let add = data(MessageBody::LinkAdd { target_fid: Fid(3) }).encode();
		let remove = data(MessageBody::LinkRemove { target_fid: Fid(3) }).encode();
		assert_eq!(add[1], 0x05);
		assert_eq!(remove[1], 0x06);
		assert_eq!(add[2..], remove[2..]);
	}

	#[test]
	fn test_cast_add_encoding_with_mention_and_embed() {
		let body = CastAddBody {
			text: "hi !".into(),
			mentions: vec![Fid(5)],
			mentions_positions: vec![3],
			embeds: vec!["https://a.b".into()],
			parent: None,
		};
		let bytes = data(MessageBody::CastAdd(body)).encode();

		let mut cast = vec![0x12, 0x01, 0x05];
		cast.extend_from_slice(&[0x22, 0x04]);
		cast.extend_from_slice(b"hi !");
		cast.extend_from_slice(&[0x2a, 0x01, 0x03]);
		cast.extend_from_slice(&[0x32, 0x0d, 0x0a, 0x0b]);
		cast.extend_from_slice(b"https://a.b");

		let mut expected = vec![0x08, 0x01, 0x10, 0x02, 0x18, 0x64, 0x20, 0x01, 0x2a];
		expected.push(cast.len() as u8);
		expected.extend_from_slice(&cast);
		assert_eq!(bytes, expected);
	}

	#[test]
	fn test_user_data_encoding() {
		let bytes = data(MessageBody::UserDataAdd {
			kind: UserDataKind::Username,
			value: "alice".into(),
		})
		.encode();
		assert_eq!(&bytes[..2], &[0x08, 0x0b]);
		assert_eq!(&bytes[8..], &[0x62, 0x09, 0x08, 0x06, 0x12, 0x05, b'a', b'l', b'i', b'c', b'e']);
	}

	#[test]
	fn test_signed_message_hash_and_signature() {
		let signer = signer();
		let signed = signer.sign(&data(MessageBody::LinkAdd {
			target_fid: Fid(3),
		}));

		let digest = blake3::hash(&signed.data);
		assert_eq!(&signed.hash.0[..], &digest.as_bytes()[..20]);

		let verifying = VerifyingKey::from_bytes(signer.public_key().as_bytes()).unwrap();
		// Signature is the fourth field: after data, hash and hash scheme.
		let data_field = 2 + signed.data.len();
		let sig_start = data_field + 2 + 20 + 2 + 2;
		let signature = Signature::from_slice(&signed.bytes[sig_start..sig_start + 64]).unwrap();
		assert!(verifying.verify(&signed.hash.0, &signature).is_ok());

		assert_eq!(signed.bytes[0], 0x0a);
		assert_eq!(signed.bytes[1] as usize, signed.data.len());
		assert_eq!(&signed.bytes[signed.bytes.len() - 32..], signer.public_key().as_bytes());
	}

	#[test]
	fn test_cast_limits_are_enforced() {
		let long = CastAddBody {
			text: "x".repeat(MAX_CAST_BYTES + 1),
			..Default::default()
		};
		assert!(MessageData::new(Fid(1), FarcasterNetwork::Mainnet, MessageBody::CastAdd(long), 1_700_000_000).is_err());

		let embeds = CastAddBody {
			text: "links".into(),
			embeds: vec!["a".into(), "b".into(), "c".into()],
			..Default::default()
		};
		assert!(MessageData::new(Fid(1), FarcasterNetwork::Mainnet, MessageBody::CastAdd(embeds), 1_700_000_000).is_err());

		let empty = CastAddBody::default();
		assert!(MessageData::new(Fid(1), FarcasterNetwork::Mainnet, MessageBody::CastAdd(empty), 1_700_000_000).is_err());
	}

	#[test]
	fn test_timestamp_is_relative_to_epoch() {
		assert_eq!(farcaster_timestamp(FARCASTER_EPOCH + 42).unwrap(), 42);
		assert!(farcaster_timestamp(FARCASTER_EPOCH - 1).is_err());
	}

	#[test]
	fn test_message_hash_parses_hex() {
		let hash: MessageHash = "0x000102030405060708090a0b0c0d0e0f10111213".parse().unwrap();
		assert_eq!(hash.0[19], 0x13);
		assert!("0x0001".parse::<MessageHash>().is_err());
	}

	#[test]
	fn test_signer_rejects_short_seed() {
		assert!(MessageSigner::from_secret(&SecretString::from("0x0102")).is_err());
		assert!(MessageSigner::from_secret(&SecretString::from("zz")).is_err());
	}
}
