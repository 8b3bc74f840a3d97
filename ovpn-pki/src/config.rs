//! Validated PKI settings.
//!
//! Raw option strings are collected in [`ConfigOptions`] and turned into a
//! [`PkiConfig`] before any key material is generated, so a typo never costs
//! a half-initialised store.

use std::{fmt, path::PathBuf};

use rcgen::SignatureAlgorithm;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_KEY_SIZE: u32 = 2048;
pub const DEFAULT_VALID_DAYS: u32 = 3650;
pub const DEFAULT_CURVE: EcCurve = EcCurve::Secp384r1;
/// The only curve EdDSA keys are generated on.
pub const EDDSA_CURVE: &str = "ED25519";
pub const DEFAULT_PORT: u16 = 1194;
pub const DEFAULT_HOST: &str = "localhost";

const MIN_RSA_BITS: u32 = 2048;
const MAX_RSA_BITS: u32 = 8192;
const MAX_VALID_DAYS: u32 = 36500;
const MAX_NAME_LEN: usize = 64;
/// Longest name generated before the suffix is appended.
const LONGEST_GENERATED_BASE: &str = "client-00000000";

/// Named curves usable for ECDSA issuers and leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcCurve {
	#[serde(rename = "secp256r1")]
	Secp256r1,
	#[serde(rename = "secp384r1")]
	Secp384r1,
}

impl EcCurve {
	pub const ALL: [EcCurve; 2] = [EcCurve::Secp256r1, EcCurve::Secp384r1];

	/// Parse a curve name; matching is case-insensitive and accepts the
	/// common OpenSSL and NIST aliases.
	pub fn from_name(name: &str) -> Result<Self> {
		match name.to_lowercase().as_str() {
			"secp256r1" | "prime256v1" | "p-256" | "p256" => Ok(EcCurve::Secp256r1),
			"secp384r1" | "p-384" | "p384" => Ok(EcCurve::Secp384r1),
			_ => Err(Error::UnsupportedCurve(name.to_string())),
		}
	}
	pub fn name(self) -> &'static str {
		match self {
			EcCurve::Secp256r1 => "secp256r1",
			EcCurve::Secp384r1 => "secp384r1",
		}
	}
	pub fn aliases(self) -> &'static [&'static str] {
		match self {
			EcCurve::Secp256r1 => &["prime256v1", "p-256"],
			EcCurve::Secp384r1 => &["p-384"],
		}
	}
	fn signature_algorithm(self) -> &'static SignatureAlgorithm {
		match self {
			EcCurve::Secp256r1 => &rcgen::PKCS_ECDSA_P256_SHA256,
			EcCurve::Secp384r1 => &rcgen::PKCS_ECDSA_P384_SHA384,
		}
	}
}

impl fmt::Display for EcCurve {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Key algorithm shared by the issuer and every leaf of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum Algorithm {
	Rsa { key_size: u32 },
	Ecdsa { curve: EcCurve },
	EdDsa,
}

impl Default for Algorithm {
	fn default() -> Self {
		Algorithm::Rsa {
			key_size: DEFAULT_KEY_SIZE,
		}
	}
}

impl Algorithm {
	/// Build an algorithm from its family name plus the family specific
	/// parameters. `key_size` is only consulted for RSA and `curve` only
	/// for the elliptic families.
	pub fn from_parts(family: &str, key_size: u32, curve: Option<&str>) -> Result<Self> {
		match family.to_lowercase().as_str() {
			"rsa" => Ok(Algorithm::Rsa { key_size }),
			"ecdsa" => {
				let curve = curve.map_or(Ok(DEFAULT_CURVE), EcCurve::from_name)?;
				Ok(Algorithm::Ecdsa { curve })
			},
			"eddsa" => match curve {
				Some(name) if !name.eq_ignore_ascii_case(EDDSA_CURVE) => {
					Err(Error::UnsupportedCurve(name.to_string()))
				},
				_ => Ok(Algorithm::EdDsa),
			},
			_ => Err(Error::UnsupportedAlgorithm(family.to_string())),
		}
	}
	pub fn family(&self) -> &'static str {
		match self {
			Algorithm::Rsa { .. } => "rsa",
			Algorithm::Ecdsa { .. } => "ecdsa",
			Algorithm::EdDsa => "eddsa",
		}
	}
	pub fn key_size(&self) -> Option<u32> {
		match self {
			Algorithm::Rsa { key_size } => Some(*key_size),
			Algorithm::Ecdsa { .. } | Algorithm::EdDsa => None,
		}
	}
	pub fn curve_name(&self) -> Option<&'static str> {
		match self {
			Algorithm::Rsa { .. } => None,
			Algorithm::Ecdsa { curve } => Some(curve.name()),
			Algorithm::EdDsa => Some(EDDSA_CURVE),
		}
	}
	/// Only RSA servers need Diffie-Hellman parameters; ECDSA servers use
	/// ECDH and EdDSA servers use predefined groups.
	pub fn requires_dh(&self) -> bool {
		match self {
			Algorithm::Rsa { .. } => true,
			Algorithm::Ecdsa { .. } | Algorithm::EdDsa => false,
		}
	}
	pub fn signature_algorithm(&self) -> &'static SignatureAlgorithm {
		match self {
			Algorithm::Rsa { .. } => &rcgen::PKCS_RSA_SHA256,
			Algorithm::Ecdsa { curve } => curve.signature_algorithm(),
			Algorithm::EdDsa => &rcgen::PKCS_ED25519,
		}
	}
}

impl fmt::Display for Algorithm {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Algorithm::Rsa { key_size } => write!(f, "rsa-{key_size}"),
			Algorithm::Ecdsa { curve } => write!(f, "ecdsa-{curve}"),
			Algorithm::EdDsa => write!(f, "eddsa-{EDDSA_CURVE}"),
		}
	}
}

/// Transport the OpenVPN server listens on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
	#[default]
	Udp,
	Tcp,
}

impl Proto {
	pub fn from_name(name: &str) -> Result<Self> {
		match name.to_lowercase().as_str() {
			"udp" => Ok(Proto::Udp),
			"tcp" => Ok(Proto::Tcp),
			_ => Err(Error::InvalidOption {
				option: "proto",
				value: name.to_string(),
				reason: "expected udp or tcp",
			}),
		}
	}
}

impl fmt::Display for Proto {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Proto::Udp => f.write_str("udp"),
			Proto::Tcp => f.write_str("tcp"),
		}
	}
}

/// Where clients reach the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
	pub host: String,
	pub port: u16,
	pub proto: Proto,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			host: DEFAULT_HOST.into(),
			port: DEFAULT_PORT,
			proto: Proto::Udp,
		}
	}
}

/// Settings for one store. Fixed for the duration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkiConfig {
	#[serde(skip)]
	pub root_path: PathBuf,
	pub algorithm: Algorithm,
	pub valid_days: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name_suffix: Option<String>,
	#[serde(default)]
	pub server: ServerSettings,
}

impl PkiConfig {
	/// Defaults: RSA-2048, ten years, no suffix.
	pub fn new(root_path: impl Into<PathBuf>) -> Self {
		Self {
			root_path: root_path.into(),
			algorithm: Algorithm::default(),
			valid_days: DEFAULT_VALID_DAYS,
			name_suffix: None,
			server: ServerSettings::default(),
		}
	}
	pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
		self.algorithm = algorithm;
		self
	}
	/// Append the configured suffix to a generated identifier.
	pub fn generated_name(&self, base: &str) -> String {
		match &self.name_suffix {
			Some(suffix) => format!("{base}-{suffix}"),
			None => base.to_string(),
		}
	}
}

/// Unvalidated option values as they arrive from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
	pub algorithm: Option<String>,
	pub keysize: Option<String>,
	pub curve: Option<String>,
	pub validdays: Option<String>,
	pub suffix: Option<String>,
	pub host: Option<String>,
	pub port: Option<String>,
	pub proto: Option<String>,
}

impl ConfigOptions {
	pub fn into_config(self, root_path: impl Into<PathBuf>) -> Result<PkiConfig> {
		let key_size = match self.keysize {
			Some(raw) => parse_number("keysize", &raw, MIN_RSA_BITS, MAX_RSA_BITS)?,
			None => DEFAULT_KEY_SIZE,
		};
		if key_size % 256 != 0 {
			return Err(Error::InvalidOption {
				option: "keysize",
				value: key_size.to_string(),
				reason: "must be a multiple of 256",
			});
		}
		let valid_days = match self.validdays {
			Some(raw) => parse_number("validdays", &raw, 1, MAX_VALID_DAYS)?,
			None => DEFAULT_VALID_DAYS,
		};
		let family = self.algorithm.as_deref().unwrap_or("rsa");
		let algorithm = Algorithm::from_parts(family, key_size, self.curve.as_deref())?;
		if let (Algorithm::Rsa { .. }, Some(curve)) = (algorithm, &self.curve) {
			tracing::warn!(curve = %curve, "curve is ignored for RSA stores");
		}
		if let Some(suffix) = &self.suffix {
			validate_name(suffix).map_err(|_| Error::InvalidOption {
				option: "suffix",
				value: suffix.clone(),
				reason: "use characters from [A-Za-z0-9._@-]",
			})?;
			validate_name(&format!("{LONGEST_GENERATED_BASE}-{suffix}")).map_err(|_| {
				Error::InvalidOption {
					option: "suffix",
					value: suffix.clone(),
					reason: "too long for generated names",
				}
			})?;
		}

		let mut server = ServerSettings::default();
		if let Some(host) = self.host {
			if host.is_empty() || host.chars().any(char::is_whitespace) {
				return Err(Error::InvalidOption {
					option: "host",
					value: host,
					reason: "must be a non-empty host name or address",
				});
			}
			server.host = host;
		}
		if let Some(port) = self.port {
			server.port = parse_number("port", &port, 1, u16::MAX as u32)? as u16;
		}
		if let Some(proto) = self.proto {
			server.proto = Proto::from_name(&proto)?;
		}

		Ok(PkiConfig {
			root_path: root_path.into(),
			algorithm,
			valid_days,
			name_suffix: self.suffix,
			server,
		})
	}
}

fn parse_number(option: &'static str, raw: &str, min: u32, max: u32) -> Result<u32> {
	let value: u32 = raw.trim().parse().map_err(|_| Error::InvalidOption {
		option,
		value: raw.to_string(),
		reason: "not a number",
	})?;
	if !(min..=max).contains(&value) {
		return Err(Error::InvalidOption {
			option,
			value: raw.to_string(),
			reason: "out of range",
		});
	}
	Ok(value)
}

/// Common names double as file names, so they are restricted to a
/// portable character set.
pub(crate) fn validate_name(name: &str) -> Result<()> {
	let valid_chars = name
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-'));
	if name.is_empty() || name.len() > MAX_NAME_LEN || name.starts_with('.') || !valid_chars {
		return Err(Error::InvalidCommonName(name.to_string()));
	}
	Ok(())
}
