//! On-disk encodings for a persisted [`Credential`].
//!
//! Two formats are supported:
//!
//! - [`TokenCodec::Json`]: a human-readable object with an RFC 3339 expiry.
//! - [`TokenCodec::Binary`]: a compact framed record.
//!
//! The binary frame is laid out as:
//!
//! ```text
//! "DCTK" | version: u8 | flags: u8
//! access_token | [refresh_token] | token_type | scope      (u32 BE length + UTF-8)
//! [expiry: i128 BE unix nanoseconds]
//! sha256(all preceding bytes): [u8; 32]
//! ```
//!
//! Decoding failures of either format surface as [`StoreError::Corrupt`].

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Credential, DEFAULT_TOKEN_TYPE, ScopeSet, TokenSecret},
	store::StoreError,
};

const MAGIC: &[u8; 4] = b"DCTK";
const VERSION: u8 = 1;
const FLAG_REFRESH: u8 = 0b01;
const FLAG_EXPIRY: u8 = 0b10;
const DIGEST_LEN: usize = 32;

/// Encoding used to persist a credential.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCodec {
	/// Pretty-printed JSON object.
	#[default]
	Json,
	/// Framed binary record with an integrity digest.
	Binary,
}
impl TokenCodec {
	/// Encodes a credential into bytes.
	pub fn encode(self, credential: &Credential) -> Result<Vec<u8>, StoreError> {
		match self {
			Self::Json => serde_json::to_vec_pretty(&JsonRecord::from(credential))
				.map_err(|e| StoreError::Serialization { message: e.to_string() }),
			Self::Binary => encode_binary(credential),
		}
	}

	/// Decodes bytes produced by [`encode`](Self::encode).
	pub fn decode(self, bytes: &[u8]) -> Result<Credential, StoreError> {
		match self {
			Self::Json => {
				let mut de = serde_json::Deserializer::from_slice(bytes);
				let record: JsonRecord = serde_path_to_error::deserialize(&mut de)
					.map_err(|e| StoreError::corrupt(e.to_string()))?;

				Ok(record.into())
			},
			Self::Binary => decode_binary(bytes),
		}
	}
}

#[derive(Serialize, Deserialize)]
struct JsonRecord {
	access_token: TokenSecret,
	#[serde(default)]
	refresh_token: Option<TokenSecret>,
	#[serde(default = "default_token_type")]
	token_type: String,
	#[serde(default, with = "time::serde::rfc3339::option")]
	expiry: Option<OffsetDateTime>,
	#[serde(default)]
	scope: ScopeSet,
}
// Restored verbatim so any persisted credential reloads unchanged.
impl From<JsonRecord> for Credential {
	fn from(record: JsonRecord) -> Self {
		Self {
			access_token: record.access_token,
			refresh_token: record.refresh_token,
			token_type: record.token_type,
			expiry: record.expiry,
			scope: record.scope,
		}
	}
}
impl From<&Credential> for JsonRecord {
	fn from(credential: &Credential) -> Self {
		Self {
			access_token: credential.access_token.clone(),
			refresh_token: credential.refresh_token.clone(),
			token_type: credential.token_type.clone(),
			expiry: credential.expiry,
			scope: credential.scope.clone(),
		}
	}
}

fn default_token_type() -> String {
	DEFAULT_TOKEN_TYPE.into()
}

fn encode_binary(credential: &Credential) -> Result<Vec<u8>, StoreError> {
	let mut buf = Vec::with_capacity(128);
	let mut flags = 0;

	if credential.refresh_token.is_some() {
		flags |= FLAG_REFRESH;
	}
	if credential.expiry.is_some() {
		flags |= FLAG_EXPIRY;
	}

	buf.extend_from_slice(MAGIC);
	buf.push(VERSION);
	buf.push(flags);
	put_str(&mut buf, credential.access_token.expose())?;

	if let Some(refresh) = &credential.refresh_token {
		put_str(&mut buf, refresh.expose())?;
	}

	put_str(&mut buf, &credential.token_type)?;
	put_str(&mut buf, &credential.scope.normalized())?;

	if let Some(expiry) = credential.expiry {
		buf.extend_from_slice(&expiry.unix_timestamp_nanos().to_be_bytes());
	}

	let digest = Sha256::digest(&buf);

	buf.extend_from_slice(&digest);

	Ok(buf)
}

fn put_str(buf: &mut Vec<u8>, value: &str) -> Result<(), StoreError> {
	let len = u32::try_from(value.len()).map_err(|_| StoreError::Serialization {
		message: format!("field of {} bytes exceeds the binary frame limit", value.len()),
	})?;

	buf.extend_from_slice(&len.to_be_bytes());
	buf.extend_from_slice(value.as_bytes());

	Ok(())
}

fn decode_binary(bytes: &[u8]) -> Result<Credential, StoreError> {
	let Some(body_len) = bytes.len().checked_sub(DIGEST_LEN) else {
		return Err(StoreError::corrupt("record is shorter than its digest"));
	};
	let (body, digest) = bytes.split_at(body_len);

	if Sha256::digest(body).as_slice() != digest {
		return Err(StoreError::corrupt("digest mismatch"));
	}

	let mut reader = FrameReader { rest: body };

	if reader.take(MAGIC.len())? != MAGIC {
		return Err(StoreError::corrupt("unrecognized magic"));
	}

	let version = reader.u8()?;

	if version != VERSION {
		return Err(StoreError::corrupt(format!("unsupported version {version}")));
	}

	let flags = reader.u8()?;
	let access_token = reader.string()?;
	let refresh_token = if flags & FLAG_REFRESH != 0 { Some(reader.string()?) } else { None };
	let token_type = reader.string()?;
	let scope = reader
		.string()?
		.parse::<ScopeSet>()
		.map_err(|e| StoreError::corrupt(format!("invalid scope: {e}")))?;
	let expiry = if flags & FLAG_EXPIRY != 0 {
		let nanos = i128::from_be_bytes(reader.array()?);

		Some(
			OffsetDateTime::from_unix_timestamp_nanos(nanos)
				.map_err(|e| StoreError::corrupt(format!("invalid expiry: {e}")))?,
		)
	} else {
		None
	};

	if !reader.rest.is_empty() {
		return Err(StoreError::corrupt("trailing bytes after record"));
	}

	Ok(Credential {
		access_token: TokenSecret::new(access_token),
		refresh_token: refresh_token.map(TokenSecret::new),
		token_type,
		expiry,
		scope,
	})
}

struct FrameReader<'a> {
	rest: &'a [u8],
}
impl<'a> FrameReader<'a> {
	fn take(&mut self, n: usize) -> Result<&'a [u8], StoreError> {
		if self.rest.len() < n {
			return Err(StoreError::corrupt("record is truncated"));
		}

		let (head, tail) = self.rest.split_at(n);

		self.rest = tail;

		Ok(head)
	}

	fn u8(&mut self) -> Result<u8, StoreError> {
		Ok(self.take(1)?[0])
	}

	fn array<const N: usize>(&mut self) -> Result<[u8; N], StoreError> {
		let mut out = [0; N];

		out.copy_from_slice(self.take(N)?);

		Ok(out)
	}

	fn string(&mut self) -> Result<String, StoreError> {
		let len = u32::from_be_bytes(self.array()?) as usize;
		let raw = self.take(len)?;

		String::from_utf8(raw.to_vec()).map_err(|e| StoreError::corrupt(e.to_string()))
	}
}
