use rand::Rng;
use rcgen::{
	CertificateParams, CertificateSigningRequestParams, ExtendedKeyUsagePurpose, IsCa, KeyPair,
	KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{ca::Issuer, params::CertificateBuilder, signature::Signature};
use crate::{config::validate_name, Algorithm, PkiConfig, Result};

const SERVER_NAME: &str = "server";
const CLIENT_PREFIX: &str = "client";

/// What a leaf certificate is allowed to authenticate as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Server,
	Client,
}

impl Role {
	/// Constrain `params` to this role. The issuer calls this on every
	/// request it signs; whatever the CSR asked for is replaced.
	pub(crate) fn apply(self, params: &mut CertificateParams, algorithm: &Algorithm) {
		params.is_ca = IsCa::ExplicitNoCa;
		params.use_authority_key_identifier_extension = true;
		params.key_usages = key_usages(algorithm);
		params.extended_key_usages = vec![match self {
			Role::Server => ExtendedKeyUsagePurpose::ServerAuth,
			Role::Client => ExtendedKeyUsagePurpose::ClientAuth,
		}];
	}
	/// Identifier used when the caller gives no common name.
	pub fn default_name(self, config: &PkiConfig) -> String {
		match self {
			Role::Server => config.generated_name(SERVER_NAME),
			Role::Client => {
				let id: u32 = rand::thread_rng().gen();
				config.generated_name(&format!("{CLIENT_PREFIX}-{id:08x}"))
			},
		}
	}
}

fn key_usages(algorithm: &Algorithm) -> Vec<KeyUsagePurpose> {
	match algorithm {
		Algorithm::Rsa { .. } => vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyEncipherment,
		],
		Algorithm::Ecdsa { .. } => vec![
			KeyUsagePurpose::DigitalSignature,
			KeyUsagePurpose::KeyAgreement,
		],
		Algorithm::EdDsa => vec![KeyUsagePurpose::DigitalSignature],
	}
}

/// [CertificateParams] from which a leaf signing request can be built
pub struct EndEntityParams {
	params: CertificateParams,
	common_name: String,
	role: Role,
}

impl EndEntityParams {
	/// Initialize `EndEntityParams`
	/// CA constraints and the authority key identifier cannot be requested
	/// in a CSR; [`Role::apply`] adds them when the issuer signs.
	pub fn new(params: CertificateParams, common_name: &str, role: Role) -> Self {
		Self {
			params,
			common_name: common_name.to_string(),
			role,
		}
	}
	/// Return `&self.params`.
	pub fn params(&self) -> &CertificateParams {
		&self.params
	}
	/// Serialize a CSR for `key_pair` and parse it back the way the
	/// issuer receives it.
	pub fn request(self, key_pair: &KeyPair) -> Result<LeafRequest> {
		let csr_pem = self.params.serialize_request(key_pair)?.pem()?;
		let csr = CertificateSigningRequestParams::from_pem(&csr_pem)?;
		Ok(LeafRequest {
			role: self.role,
			common_name: self.common_name,
			csr,
		})
	}
}

/// A parsed CSR plus the role and subject it is to be signed for.
pub struct LeafRequest {
	pub role: Role,
	pub common_name: String,
	pub csr: CertificateSigningRequestParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafStatus {
	Valid,
	Revoked,
}

/// Metadata of a signed server or client certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafCertificate {
	pub common_name: String,
	pub serial: u64,
	#[serde(with = "time::serde::rfc3339")]
	pub not_before: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub not_after: OffsetDateTime,
	pub role: Role,
	pub status: LeafStatus,
	pub cert_pem: String,
}

impl LeafCertificate {
	pub fn is_valid(&self) -> bool {
		self.status == LeafStatus::Valid
	}
	/// One-way transition; there is no way back to valid.
	pub(crate) fn mark_revoked(&mut self) {
		self.status = LeafStatus::Revoked;
	}
}

/// A leaf straight out of the factory, still holding its private key.
#[derive(Debug, Clone)]
pub struct IssuedLeaf {
	pub certificate: LeafCertificate,
	pub key_pem: String,
	/// Another valid leaf already uses this common name.
	pub duplicate_name: bool,
}

/// Generate a keypair of the issuer's family, wrap it in a CSR for
/// `common_name` (or a generated name) and have `issuer` sign it.
pub fn create_leaf(
	issuer: &mut Issuer,
	role: Role,
	common_name: Option<&str>,
	config: &PkiConfig,
	existing: &[LeafCertificate],
) -> Result<IssuedLeaf> {
	let common_name = match common_name {
		Some(name) => name.to_string(),
		None => role.default_name(config),
	};
	validate_name(&common_name)?;

	let duplicate_name = existing
		.iter()
		.any(|leaf| leaf.is_valid() && leaf.common_name == common_name);
	if duplicate_name {
		tracing::warn!(
			common_name = %common_name,
			"a valid certificate with this common name already exists; issuing another"
		);
	}

	let Signature { key_pair, .. } = Signature::new(&issuer.algorithm())?;
	let request = CertificateBuilder::new(&common_name)
		.end_entity(role)
		.request(&key_pair)?;
	let certificate = issuer.sign(request, config.valid_days)?;
	tracing::info!(
		common_name = %certificate.common_name,
		serial = certificate.serial,
		role = ?role,
		"issued leaf certificate"
	);

	Ok(IssuedLeaf {
		certificate,
		key_pem: key_pair.serialize_pem(),
		duplicate_name,
	})
}
