use rcgen::{CertificateParams, DistinguishedName, DnType};
use time::{Duration, OffsetDateTime};

use super::{ca::CaParams, entity::EndEntityParams, Role};

/// Builder to configure [CertificateParams] to be finalized
/// into either the issuer or a leaf request.
pub struct CertificateBuilder {
	params: CertificateParams,
	common_name: String,
}

impl CertificateBuilder {
	/// Start from rcgen defaults with `common_name` as the only subject
	/// attribute.
	/// # Example
	/// ```
	/// # use ovpn_pki::cert::CertificateBuilder;
	/// let builder = CertificateBuilder::new("server");
	/// ```
	pub fn new(common_name: &str) -> Self {
		let mut params = CertificateParams::default();
		// override default Common Name
		params.distinguished_name = DistinguishedName::new();
		params
			.distinguished_name
			.push(DnType::CommonName, common_name);
		Self {
			params,
			common_name: common_name.to_string(),
		}
	}
	/// Set options for the issuer certificate
	pub fn certificate_authority(self) -> CaParams {
		CaParams::new(self.params)
	}
	/// Set options for a server or client leaf
	pub fn end_entity(self, role: Role) -> EndEntityParams {
		EndEntityParams::new(self.params, &self.common_name, role)
	}
}

/// Validity window starting at `not_before`, `valid_days` long, never
/// extending past `cap` when one is given.
pub(crate) fn validity_window(
	not_before: OffsetDateTime,
	valid_days: u32,
	cap: Option<OffsetDateTime>,
) -> (OffsetDateTime, OffsetDateTime) {
	let not_after = not_before + Duration::days(i64::from(valid_days));
	let not_after = match cap {
		Some(cap) if cap < not_after => cap,
		_ => not_after,
	};
	(not_before, not_after)
}

/// Certificates carry whole-second timestamps; trimming here keeps the
/// stored metadata equal to what a parser reads back.
pub(crate) fn now() -> OffsetDateTime {
	let now = OffsetDateTime::now_utc();
	now.replace_nanosecond(0).unwrap_or(now)
}
