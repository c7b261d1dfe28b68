// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HMAC signatures for event deliveries.
//!
//! The signed message is `"<unix-timestamp>.<payload>"`, where `payload` is the
//! exact request body. The collector recomputes the digest over the same bytes,
//! so the body must be signed after serialization and sent unchanged.
//!
//! ```
//! use error_explorer_signature::{Signer, SigningAlgorithm};
//!
//! let signer = Signer::new("secret", SigningAlgorithm::Sha256);
//! let body = br#"{"message":"boom"}"#;
//! let headers = signer.build_headers(body, Some(1_700_000_000));
//! assert_eq!(headers.timestamp, "1700000000");
//! assert!(signer.verify_at(body, &headers.signature, 1_700_000_000, 300, 1_700_000_010));
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use error_explorer_common_secret::SecretString;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the unix timestamp (seconds) that was signed.
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
/// Default freshness window for [`Signer::verify`].
pub const DEFAULT_MAX_AGE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum SignatureError {
	#[error("unsupported signing algorithm: {0} (expected sha256, sha384 or sha512)")]
	UnsupportedAlgorithm(String),
}

/// Digest used inside the HMAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningAlgorithm {
	#[default]
	Sha256,
	Sha384,
	Sha512,
}

impl fmt::Display for SigningAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Sha256 => write!(f, "sha256"),
			Self::Sha384 => write!(f, "sha384"),
			Self::Sha512 => write!(f, "sha512"),
		}
	}
}

impl FromStr for SigningAlgorithm {
	type Err = SignatureError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"sha256" => Ok(Self::Sha256),
			"sha384" => Ok(Self::Sha384),
			"sha512" => Ok(Self::Sha512),
			_ => Err(SignatureError::UnsupportedAlgorithm(s.to_string())),
		}
	}
}

/// Signature and timestamp header values for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
	pub signature: String,
	pub timestamp: String,
}

impl SignatureHeaders {
	/// Header name/value pairs, ready to attach to a request.
	pub fn pairs(&self) -> [(&'static str, &str); 2] {
		[
			(SIGNATURE_HEADER, self.signature.as_str()),
			(TIMESTAMP_HEADER, self.timestamp.as_str()),
		]
	}
}

/// Signs and verifies payloads with a fixed key and algorithm.
///
/// The key is never printed; `Debug` shows `[REDACTED]`.
#[derive(Debug, Clone)]
pub struct Signer {
	secret: SecretString,
	algorithm: SigningAlgorithm,
}

impl Signer {
	pub fn new(secret: impl Into<SecretString>, algorithm: SigningAlgorithm) -> Self {
		Self {
			secret: secret.into(),
			algorithm,
		}
	}

	/// Builds a signer from an algorithm name, failing on anything other than
	/// `sha256`, `sha384` or `sha512`.
	pub fn from_name(secret: impl Into<SecretString>, algorithm: &str) -> Result<Self, SignatureError> {
		Ok(Self::new(secret, algorithm.parse()?))
	}

	pub fn algorithm(&self) -> SigningAlgorithm {
		self.algorithm
	}

	/// Hex digest of `"<timestamp>.<payload>"`.
	pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
		hex::encode(self.digest(&signed_message(payload, timestamp)))
	}

	/// Signs with the current time.
	pub fn sign_now(&self, payload: &[u8]) -> (String, i64) {
		let timestamp = Utc::now().timestamp();
		(self.sign(payload, timestamp), timestamp)
	}

	/// Signature and timestamp headers; `timestamp` defaults to now.
	pub fn build_headers(&self, payload: &[u8], timestamp: Option<i64>) -> SignatureHeaders {
		let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp());
		SignatureHeaders {
			signature: self.sign(payload, timestamp),
			timestamp: timestamp.to_string(),
		}
	}

	/// Checks authenticity and freshness against the current clock.
	pub fn verify(&self, payload: &[u8], signature: &str, timestamp: i64, max_age_secs: i64) -> bool {
		self.verify_at(payload, signature, timestamp, max_age_secs, Utc::now().timestamp())
	}

	/// Both checks must pass: the signature matches (constant-time comparison)
	/// and `|now - timestamp| <= max_age_secs`.
	pub fn verify_at(
		&self,
		payload: &[u8],
		signature: &str,
		timestamp: i64,
		max_age_secs: i64,
		now: i64,
	) -> bool {
		let fresh = now.abs_diff(timestamp) <= max_age_secs.unsigned_abs();

		let authentic = match hex::decode(signature) {
			Ok(expected) => self.digest_matches(&signed_message(payload, timestamp), &expected),
			Err(_) => false,
		};

		authentic && fresh
	}

	fn digest(&self, message: &[u8]) -> Vec<u8> {
		let key = self.secret.expose().as_bytes();
		match self.algorithm {
			SigningAlgorithm::Sha256 => hmac_digest::<Hmac<Sha256>>(key, message),
			SigningAlgorithm::Sha384 => hmac_digest::<Hmac<Sha384>>(key, message),
			SigningAlgorithm::Sha512 => hmac_digest::<Hmac<Sha512>>(key, message),
		}
	}

	fn digest_matches(&self, message: &[u8], expected: &[u8]) -> bool {
		let key = self.secret.expose().as_bytes();
		match self.algorithm {
			SigningAlgorithm::Sha256 => hmac_verify::<Hmac<Sha256>>(key, message, expected),
			SigningAlgorithm::Sha384 => hmac_verify::<Hmac<Sha384>>(key, message, expected),
			SigningAlgorithm::Sha512 => hmac_verify::<Hmac<Sha512>>(key, message, expected),
		}
	}
}

fn signed_message(payload: &[u8], timestamp: i64) -> Vec<u8> {
	let prefix = format!("{timestamp}.");
	let mut message = Vec::with_capacity(prefix.len() + payload.len());
	message.extend_from_slice(prefix.as_bytes());
	message.extend_from_slice(payload);
	message
}

// HMAC accepts keys of any length, so key setup cannot fail in practice.
fn hmac_digest<M: Mac + KeyInit>(key: &[u8], message: &[u8]) -> Vec<u8> {
	match <M as Mac>::new_from_slice(key) {
		Ok(mut mac) => {
			mac.update(message);
			mac.finalize().into_bytes().to_vec()
		}
		Err(_) => Vec::new(),
	}
}

fn hmac_verify<M: Mac + KeyInit>(key: &[u8], message: &[u8], expected: &[u8]) -> bool {
	match <M as Mac>::new_from_slice(key) {
		Ok(mut mac) => {
			mac.update(message);
			mac.verify_slice(expected).is_ok()
		}
		Err(_) => false,
	}
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	fn algorithm() -> impl Strategy<Value = SigningAlgorithm> {
		prop_oneof![
			Just(SigningAlgorithm::Sha256),
			Just(SigningAlgorithm::Sha384),
			Just(SigningAlgorithm::Sha512),
		]
	}

	proptest! {
		#[test]
		fn prop_sign_is_deterministic_and_verifies(
			algorithm in algorithm(),
			secret in "[a-zA-Z0-9]{1,64}",
			payload in proptest::collection::vec(any::<u8>(), 0..512),
			ts in 0i64..4_000_000_000,
		) {
			let signer = Signer::new(secret.as_str(), algorithm);
			let sig = signer.sign(&payload, ts);
			prop_assert_eq!(&sig, &signer.sign(&payload, ts));
			prop_assert!(signer.verify_at(&payload, &sig, ts, 300, ts));
		}

		#[test]
		fn prop_changing_any_input_changes_signature(
			secret in "[a-z]{1,32}",
			payload in proptest::collection::vec(any::<u8>(), 1..256),
			ts in 0i64..4_000_000_000,
		) {
			let signer = Signer::new(secret.as_str(), SigningAlgorithm::Sha256);
			let sig = signer.sign(&payload, ts);

			let other_secret = Signer::new(format!("{secret}x"), SigningAlgorithm::Sha256);
			prop_assert_ne!(&sig, &other_secret.sign(&payload, ts));

			let mut other_payload = payload.clone();
			other_payload[0] = other_payload[0].wrapping_add(1);
			prop_assert_ne!(&sig, &signer.sign(&other_payload, ts));

			prop_assert_ne!(&sig, &signer.sign(&payload, ts + 1));
		}
	}
}
