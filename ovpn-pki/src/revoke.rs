//! Revocation ledger and the revoke-by-name operation.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{cert::LeafCertificate, Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
	pub serial: u64,
	#[serde(with = "time::serde::rfc3339")]
	pub revocation_date: OffsetDateTime,
}

/// Append-only record of revoked serials, in revocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevocationLedger {
	entries: Vec<RevocationEntry>,
}

impl RevocationLedger {
	pub fn entries(&self) -> &[RevocationEntry] {
		&self.entries
	}
	pub fn contains(&self, serial: u64) -> bool {
		self.entries.iter().any(|entry| entry.serial == serial)
	}
	fn append(&mut self, serial: u64, revocation_date: OffsetDateTime) {
		self.entries.push(RevocationEntry {
			serial,
			revocation_date,
		});
	}
}

/// Revoke the most recent valid leaf named `common_name`.
///
/// Matching is exact. If several valid leaves share the name only the one
/// with the highest serial is revoked. When every leaf with that name is
/// already revoked this fails with [`Error::AlreadyRevoked`] instead of
/// silently succeeding.
pub fn revoke(
	leaves: &mut [LeafCertificate],
	ledger: &mut RevocationLedger,
	common_name: &str,
	now: OffsetDateTime,
) -> Result<LeafCertificate> {
	let valid_matches = leaves
		.iter()
		.filter(|leaf| leaf.common_name == common_name && leaf.is_valid())
		.count();
	let target = leaves
		.iter_mut()
		.filter(|leaf| leaf.common_name == common_name)
		.max_by_key(|leaf| (leaf.is_valid(), leaf.serial));

	let Some(leaf) = target else {
		return Err(Error::CertificateNotFound(common_name.to_string()));
	};
	if !leaf.is_valid() || ledger.contains(leaf.serial) {
		return Err(Error::AlreadyRevoked {
			name: common_name.to_string(),
			serial: leaf.serial,
		});
	}
	leaf.mark_revoked();
	ledger.append(leaf.serial, now);

	if valid_matches > 1 {
		tracing::warn!(
			common_name,
			remaining = valid_matches - 1,
			"other valid certificates share this common name and were not revoked"
		);
	}
	tracing::info!(common_name, serial = leaf.serial, "revoked certificate");
	Ok(leaf.clone())
}
