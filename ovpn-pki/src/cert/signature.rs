use openssl::{pkey::PKey, rsa::Rsa};
use rcgen::{KeyPair, SignatureAlgorithm};

use crate::{config::EcCurve, Algorithm, Error, Result};

/// Prepare the crypto backends for use. Call once at process start; safe
/// to call again.
pub fn init() {
	openssl::init();
}

/// A freshly generated key pair together with the algorithm it signs with.
pub struct Signature {
	pub alg: &'static SignatureAlgorithm,
	pub key_pair: KeyPair,
}

impl Signature {
	pub fn new(algorithm: &Algorithm) -> Result<Self> {
		match algorithm {
			Algorithm::Rsa { key_size } => Self::rsa(*key_size),
			Algorithm::Ecdsa { curve } => Self::ecdsa(*curve),
			Algorithm::EdDsa => Self::ed25519(),
		}
	}
	/// ring cannot generate RSA keys, so they come from OpenSSL and are
	/// handed to rcgen as PKCS#8.
	pub fn rsa(key_size: u32) -> Result<Self> {
		let alg = &rcgen::PKCS_RSA_SHA256;
		let pkey: PKey<_> = Rsa::generate(key_size)?.try_into()?;
		let key_pem = String::from_utf8(pkey.private_key_to_pem_pkcs8()?)
			.map_err(|e| Error::Crypto(e.to_string()))?;
		let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, alg)?;

		Ok(Self { alg, key_pair })
	}
	pub fn ecdsa(curve: EcCurve) -> Result<Self> {
		let alg = Algorithm::Ecdsa { curve }.signature_algorithm();
		let key_pair = KeyPair::generate_for(alg)?;

		Ok(Self { alg, key_pair })
	}
	pub fn ed25519() -> Result<Self> {
		let alg = &rcgen::PKCS_ED25519;
		let key_pair = KeyPair::generate_for(alg)?;

		Ok(Self { alg, key_pair })
	}
}

/// Parse a stored private key, insisting that it belongs to `algorithm`.
pub fn load_key_pair(key_pem: &str, algorithm: &Algorithm) -> Result<KeyPair> {
	let expected = algorithm.signature_algorithm();
	let key_pair = KeyPair::from_pem(key_pem)
		.map_err(|e| Error::StoreCorrupt(format!("unreadable private key: {e}")))?;
	if key_pair.algorithm() == expected {
		return Ok(key_pair);
	}
	Err(Error::StoreCorrupt(format!(
		"private key is {:?}, store is configured for {algorithm}",
		key_pair.algorithm()
	)))
}
