//! Issuer and leaf certificate generation on top of [rcgen].

mod params;
pub(crate) use params::now;
pub use params::CertificateBuilder;
mod ca;
pub use ca::{CaParams, Issuer, ISSUER_NAME, ISSUER_SERIAL};
mod entity;
pub use entity::{
	create_leaf, EndEntityParams, IssuedLeaf, LeafCertificate, LeafRequest, LeafStatus, Role,
};
mod signature;
pub use signature::{init, Signature};

use crate::store::{Changeset, FileMode};

#[derive(Debug, Clone)]
/// Pem serialized Certificate and Pem serialized corresponding private key
pub struct PemCertifiedKey {
	pub cert_pem: String,
	pub private_key_pem: String,
}

impl PemCertifiedKey {
	/// Queue both halves for writing; the key file is private.
	pub fn stage(&self, changes: &mut Changeset, cert_file: &str, key_file: &str) {
		changes.put(cert_file, &self.cert_pem, FileMode::Public);
		changes.put(key_file, &self.private_key_pem, FileMode::Private);
	}
}

#[cfg(test)]
mod tests {
	use crate::cert::PemCertifiedKey;
	use crate::store::{Changeset, FileMode};

	#[test]
	fn stages_cert_and_private_key() {
		let pck = PemCertifiedKey {
			cert_pem: "x".into(),
			private_key_pem: "y".into(),
		};
		let mut changes = Changeset::default();
		pck.stage(&mut changes, "ca.crt", "ca.key");

		let staged: Vec<_> = changes
			.files()
			.map(|f| (f.name.as_str(), f.contents.as_str(), f.mode))
			.collect();
		assert_eq!(
			staged,
			vec![
				("ca.crt", "x", FileMode::Public),
				("ca.key", "y", FileMode::Private)
			]
		);
	}
}
