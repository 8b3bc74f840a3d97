use rcgen::{
	BasicConstraints, Certificate, CertificateParams, CertificateRevocationListParams,
	DistinguishedName, DnType, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams,
	SerialNumber,
};
use ring::digest;
use time::OffsetDateTime;

use super::{
	entity::{LeafCertificate, LeafRequest, LeafStatus},
	params::{self, validity_window, CertificateBuilder},
	signature::{self, Signature},
	PemCertifiedKey,
};
use crate::{revoke::RevocationLedger, Algorithm, Error, PkiConfig, Result};

/// Subject common name of the issuer, before any suffix.
pub const ISSUER_NAME: &str = "OpenVPN CA";
/// The issuer's own serial; leaves are numbered after it.
pub const ISSUER_SERIAL: u64 = 1;

pub struct CaParams {
	params: CertificateParams,
}

impl CaParams {
	pub fn new(mut params: CertificateParams) -> Self {
		params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
		params.key_usages.push(KeyUsagePurpose::DigitalSignature);
		params.key_usages.push(KeyUsagePurpose::KeyCertSign);
		params.key_usages.push(KeyUsagePurpose::CrlSign);
		params.serial_number = Some(SerialNumber::from(ISSUER_SERIAL));
		Self { params }
	}
	/// Return `&self.params`.
	pub fn params(&self) -> &CertificateParams {
		&self.params
	}
	pub fn valid_for(mut self, not_before: OffsetDateTime, valid_days: u32) -> Self {
		let (not_before, not_after) = validity_window(not_before, valid_days, None);
		self.params.not_before = not_before;
		self.params.not_after = not_after;
		self
	}
	pub fn build(self, key_pair: &KeyPair) -> Result<Certificate> {
		Ok(self.params.self_signed(key_pair)?)
	}
}

/// The certificate authority of a store: the only key that signs leaves.
pub struct Issuer {
	cert: Certificate,
	key_pair: KeyPair,
	cert_pem: String,
	algorithm: Algorithm,
	not_before: OffsetDateTime,
	not_after: OffsetDateTime,
	next_serial: u64,
}

impl Issuer {
	/// Generate the CA keypair and self-sign it for `config.valid_days`.
	pub fn create(config: &PkiConfig) -> Result<Self> {
		let Signature { key_pair, .. } = Signature::new(&config.algorithm)?;
		let cert = CertificateBuilder::new(&config.generated_name(ISSUER_NAME))
			.certificate_authority()
			.valid_for(params::now(), config.valid_days)
			.build(&key_pair)?;
		let (not_before, not_after) = (cert.params().not_before, cert.params().not_after);

		Ok(Self {
			cert_pem: cert.pem(),
			cert,
			key_pair,
			algorithm: config.algorithm,
			not_before,
			not_after,
			next_serial: ISSUER_SERIAL + 1,
		})
	}

	/// Rebuild the issuer from persisted material. The stored PEM is kept
	/// verbatim; rcgen's signing handle is regenerated from it.
	pub fn from_pem(
		cert_pem: &str,
		key_pem: &str,
		algorithm: Algorithm,
		next_serial: u64,
	) -> Result<Self> {
		let key_pair = signature::load_key_pair(key_pem, &algorithm)?;
		let params = CertificateParams::from_ca_cert_pem(cert_pem)
			.map_err(|e| Error::StoreCorrupt(format!("unreadable issuer certificate: {e}")))?;
		let (not_before, not_after) = (params.not_before, params.not_after);
		let cert = params.self_signed(&key_pair)?;

		Ok(Self {
			cert,
			key_pair,
			cert_pem: cert_pem.to_string(),
			algorithm,
			not_before,
			not_after,
			next_serial: next_serial.max(ISSUER_SERIAL + 1),
		})
	}

	/// Sign a leaf request. Allocates the next serial, applies the role's
	/// usages and never lets the leaf outlive the issuer.
	pub fn sign(&mut self, request: LeafRequest, valid_days: u32) -> Result<LeafCertificate> {
		let LeafRequest {
			role,
			common_name,
			mut csr,
		} = request;

		let serial = self.next_serial;
		let (not_before, not_after) =
			validity_window(params::now(), valid_days, Some(self.not_after));
		role.apply(&mut csr.params, &self.algorithm);
		csr.params.distinguished_name = DistinguishedName::new();
		csr.params
			.distinguished_name
			.push(DnType::CommonName, common_name.as_str());
		csr.params.serial_number = Some(SerialNumber::from(serial));
		csr.params.not_before = not_before;
		csr.params.not_after = not_after;

		let cert = csr.signed_by(&self.cert, &self.key_pair)?;
		self.next_serial += 1;

		Ok(LeafCertificate {
			common_name,
			serial,
			not_before,
			not_after,
			role,
			status: LeafStatus::Valid,
			cert_pem: cert.pem(),
		})
	}

	/// Sign a CRL listing every ledger entry.
	pub fn crl(&self, ledger: &RevocationLedger, valid_days: u32) -> Result<String> {
		let this_update = params::now();
		let (_, next_update) = validity_window(this_update, valid_days, None);
		let revoked_certs = ledger
			.entries()
			.iter()
			.map(|entry| RevokedCertParams {
				serial_number: SerialNumber::from(entry.serial),
				revocation_time: entry.revocation_date,
				reason_code: None,
				invalidity_date: None,
			})
			.collect();
		let params = CertificateRevocationListParams {
			this_update,
			next_update,
			crl_number: SerialNumber::from(ledger.entries().len() as u64 + 1),
			issuing_distribution_point: None,
			revoked_certs,
			key_identifier_method: KeyIdMethod::Sha256,
		};
		Ok(params.signed_by(&self.cert, &self.key_pair)?.pem()?)
	}

	/// SHA-256 over the issuer's DER, colon separated upper-case hex.
	pub fn fingerprint(&self) -> Result<String> {
		let der = pem::parse(&self.cert_pem)
			.map_err(|e| Error::StoreCorrupt(format!("issuer certificate: {e}")))?;
		let hash = digest::digest(&digest::SHA256, der.contents());
		Ok(hash
			.as_ref()
			.iter()
			.map(|b| format!("{b:02X}"))
			.collect::<Vec<_>>()
			.join(":"))
	}

	pub fn serialize_pem(&self) -> PemCertifiedKey {
		PemCertifiedKey {
			cert_pem: self.cert_pem.clone(),
			private_key_pem: self.key_pair.serialize_pem(),
		}
	}
	pub fn cert_pem(&self) -> &str {
		&self.cert_pem
	}
	pub fn algorithm(&self) -> Algorithm {
		self.algorithm
	}
	pub fn not_before(&self) -> OffsetDateTime {
		self.not_before
	}
	pub fn not_after(&self) -> OffsetDateTime {
		self.not_after
	}
	/// Serial the next signed leaf will receive.
	pub fn next_serial(&self) -> u64 {
		self.next_serial
	}
}
