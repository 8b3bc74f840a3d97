use std::{io, path::PathBuf};

use thiserror::Error;

/// A specialized `Result` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of an [`Error`], used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Bad mode, option or missing argument.
	Usage,
	/// A value was supplied but is not acceptable.
	Validation,
	/// The PKI root path is unusable.
	Path,
	/// A cryptographic primitive failed.
	Crypto,
	/// The store is not in the state the operation needs.
	State,
	/// Reading or writing store material failed.
	Io,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("missing required option --{0}")]
	MissingArgument(&'static str),
	#[error("unsupported algorithm `{0}` (expected one of rsa, ecdsa, eddsa)")]
	UnsupportedAlgorithm(String),
	#[error("unsupported curve `{0}` (see `ovpn-pki curves`)")]
	UnsupportedCurve(String),
	#[error("{option} `{value}` is not valid: {reason}")]
	InvalidOption {
		option: &'static str,
		value: String,
		reason: &'static str,
	},
	#[error("invalid common name `{0}`: use 1-64 characters from [A-Za-z0-9._@-], not starting with '.'")]
	InvalidCommonName(String),
	#[error("path {} not found", .0.display())]
	PathNotFound(PathBuf),
	#[error("cryptographic operation failed: {0}")]
	Crypto(String),
	#[error("no issuer found in {}; run `ovpn-pki init` first", .0.display())]
	IssuerMissing(PathBuf),
	#[error("an issuer already exists in {}; refusing to overwrite it", .0.display())]
	IssuerExists(PathBuf),
	#[error("issuer private key {} is unavailable", .0.display())]
	IssuerKeyUnavailable(PathBuf),
	#[error("store {} is locked by another invocation (remove {} if stale)", .root.display(), .lock.display())]
	StoreLocked { root: PathBuf, lock: PathBuf },
	#[error("store material is corrupt: {0}")]
	StoreCorrupt(String),
	#[error("no valid certificate named `{0}`")]
	CertificateNotFound(String),
	#[error("certificate `{name}` (serial {serial}) is already revoked")]
	AlreadyRevoked { name: String, serial: u64 },
	#[error(transparent)]
	Io(#[from] io::Error),
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::MissingArgument(_) => ErrorKind::Usage,
			Error::UnsupportedAlgorithm(_)
			| Error::UnsupportedCurve(_)
			| Error::InvalidOption { .. }
			| Error::InvalidCommonName(_) => ErrorKind::Validation,
			Error::PathNotFound(_) => ErrorKind::Path,
			Error::Crypto(_) => ErrorKind::Crypto,
			Error::IssuerMissing(_)
			| Error::IssuerExists(_)
			| Error::IssuerKeyUnavailable(_)
			| Error::StoreLocked { .. }
			| Error::StoreCorrupt(_)
			| Error::CertificateNotFound(_)
			| Error::AlreadyRevoked { .. } => ErrorKind::State,
			Error::Io(_) => ErrorKind::Io,
		}
	}

	/// True for failures raised because the requested thing does not exist.
	pub fn is_not_found(&self) -> bool {
		matches!(
			self,
			Error::IssuerMissing(_) | Error::CertificateNotFound(_) | Error::PathNotFound(_)
		)
	}
}

impl From<rcgen::Error> for Error {
	fn from(err: rcgen::Error) -> Self {
		Error::Crypto(err.to_string())
	}
}

impl From<openssl::error::ErrorStack> for Error {
	fn from(err: openssl::error::ErrorStack) -> Self {
		Error::Crypto(err.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::StoreCorrupt(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn validation_errors_are_classified() {
		assert_eq!(
			Error::UnsupportedAlgorithm("dsa".into()).kind(),
			ErrorKind::Validation
		);
		assert_eq!(
			Error::UnsupportedCurve("brainpool".into()).kind(),
			ErrorKind::Validation
		);
		assert_eq!(Error::MissingArgument("commonname").kind(), ErrorKind::Usage);
	}

	#[test]
	fn state_errors_report_not_found() {
		let err = Error::IssuerMissing(PathBuf::from("/tmp/pki"));
		assert_eq!(err.kind(), ErrorKind::State);
		assert!(err.is_not_found());
		assert!(!Error::AlreadyRevoked {
			name: "alice".into(),
			serial: 2
		}
		.is_not_found());
	}

	#[test]
	fn crypto_errors_convert() {
		let err: Error = rcgen::Error::KeyGenerationUnavailable.into();
		assert_eq!(err.kind(), ErrorKind::Crypto);
	}
}
