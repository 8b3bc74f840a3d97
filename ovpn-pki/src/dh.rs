//! Diffie-Hellman parameters for RSA servers.

use openssl::dh::Dh;

use crate::{Algorithm, Error, PkiConfig, Result};

const GENERATOR: u32 = 2;

/// PEM encoded `DH PARAMETERS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParameters {
	pem: String,
}

impl DhParameters {
	/// Generate parameters when the store's algorithm needs them.
	///
	/// Returns `Ok(None)` for ECDSA and EdDSA stores. For RSA the prime is
	/// as long as the RSA modulus. This is slow (seconds to minutes) and a
	/// failure is not retried.
	pub fn generate(config: &PkiConfig) -> Result<Option<Self>> {
		match config.algorithm {
			Algorithm::Rsa { key_size } => {
				tracing::info!(bits = key_size, "generating DH parameters, this may take a while");
				Self::with_prime_len(key_size).map(Some)
			},
			Algorithm::Ecdsa { .. } | Algorithm::EdDsa => Ok(None),
		}
	}

	pub fn with_prime_len(bits: u32) -> Result<Self> {
		let dh = Dh::generate_params(bits, GENERATOR)?;
		let pem = String::from_utf8(dh.params_to_pem()?).map_err(|e| Error::Crypto(e.to_string()))?;
		Ok(Self { pem })
	}

	/// Wrap parameters read back from disk, checking they parse.
	pub fn from_pem(pem: String) -> Result<Self> {
		Dh::params_from_pem(pem.as_bytes())
			.map_err(|e| Error::StoreCorrupt(format!("unreadable DH parameters: {e}")))?;
		Ok(Self { pem })
	}

	pub fn pem(&self) -> &str {
		&self.pem
	}

	/// Bit length of the prime.
	pub fn bits(&self) -> Result<u32> {
		let dh = Dh::params_from_pem(self.pem.as_bytes())?;
		Ok(dh.prime_p().num_bits() as u32)
	}
}
