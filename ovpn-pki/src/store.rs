//! On-disk layout of a PKI root and the staged, atomic way it is written.
//!
//! ```text
//! <root>/
//!   pki.json            index: config, next serial, issued leaves
//!   ca.crt  ca.key      issuer
//!   dh.pem              RSA stores only
//!   server.conf         rendered server config
//!   clients/*.ovpn      rendered client configs
//!   revocations.json    revocation ledger
//!   crl.pem             CRL signed from the ledger
//!   .lock               held while a pipeline mutates the store
//! ```

use std::{
	fs::{self, OpenOptions},
	io::{self, Write},
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
	cert::{Issuer, LeafCertificate},
	dh::DhParameters,
	revoke::RevocationLedger,
	Error, PkiConfig, Result,
};

pub const INDEX_FILE: &str = "pki.json";
pub const ISSUER_CERT_FILE: &str = "ca.crt";
pub const ISSUER_KEY_FILE: &str = "ca.key";
pub const DH_FILE: &str = "dh.pem";
pub const SERVER_CONFIG_FILE: &str = "server.conf";
pub const CLIENTS_DIR: &str = "clients";
pub const LEDGER_FILE: &str = "revocations.json";
pub const CRL_FILE: &str = "crl.pem";
pub const LOCK_FILE: &str = ".lock";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
	Public,
	/// Owner read/write only on unix.
	Private,
}

#[derive(Debug, Clone)]
pub struct StagedFile {
	/// Path relative to the store root.
	pub name: String,
	pub contents: String,
	pub mode: FileMode,
}

/// Files a pipeline wants written. Nothing touches disk until
/// [`PkiStore::save`].
#[derive(Debug, Default)]
pub struct Changeset {
	files: Vec<StagedFile>,
}

impl Changeset {
	/// Stage `contents` for `name`, replacing anything staged for it earlier.
	pub fn put(&mut self, name: &str, contents: impl Into<String>, mode: FileMode) {
		self.files.retain(|f| f.name != name);
		self.files.push(StagedFile {
			name: name.to_string(),
			contents: contents.into(),
			mode,
		});
	}
	pub fn files(&self) -> impl Iterator<Item = &StagedFile> {
		self.files.iter()
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreIndex {
	format_version: u32,
	config: PkiConfig,
	next_serial: u64,
	certificates: Vec<LeafCertificate>,
}

/// Everything a loaded store knows.
pub struct PkiState {
	pub config: PkiConfig,
	pub issuer: Issuer,
	pub leaves: Vec<LeafCertificate>,
	pub ledger: RevocationLedger,
	pub dh: Option<DhParameters>,
}

impl PkiState {
	pub fn stage_index(&self, changes: &mut Changeset) -> Result<()> {
		let index = StoreIndex {
			format_version: FORMAT_VERSION,
			config: self.config.clone(),
			next_serial: self.issuer.next_serial(),
			certificates: self.leaves.clone(),
		};
		changes.put(
			INDEX_FILE,
			serde_json::to_string_pretty(&index)?,
			FileMode::Public,
		);
		Ok(())
	}
	pub fn stage_ledger(&self, changes: &mut Changeset) -> Result<()> {
		changes.put(
			LEDGER_FILE,
			serde_json::to_string_pretty(&self.ledger)?,
			FileMode::Public,
		);
		Ok(())
	}
}

/// Relative path of the config rendered for a client leaf. The first leaf
/// with a name gets `<name>.ovpn`; later ones get `<name>+<serial>.ovpn`.
/// `+` never appears in a common name, so the two forms cannot collide.
pub fn client_config_name(leaf: &LeafCertificate, leaves: &[LeafCertificate]) -> String {
	let first = leaves
		.iter()
		.filter(|other| other.common_name == leaf.common_name)
		.map(|other| other.serial)
		.min()
		.unwrap_or(leaf.serial);
	if first >= leaf.serial {
		format!("{CLIENTS_DIR}/{}.ovpn", leaf.common_name)
	} else {
		format!("{CLIENTS_DIR}/{}+{}.ovpn", leaf.common_name, leaf.serial)
	}
}

/// A PKI rooted at an existing directory.
#[derive(Debug, Clone)]
pub struct PkiStore {
	root: PathBuf,
}

impl PkiStore {
	pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
		let root = root.into();
		if !root.is_dir() {
			return Err(Error::PathNotFound(root));
		}
		Ok(Self { root })
	}
	pub fn root(&self) -> &Path {
		&self.root
	}
	pub fn path(&self, name: &str) -> PathBuf {
		self.root.join(name)
	}
	/// True if any issuer material or an index is present, even from an
	/// interrupted init.
	pub fn is_initialized(&self) -> bool {
		[INDEX_FILE, ISSUER_CERT_FILE, ISSUER_KEY_FILE]
			.iter()
			.any(|name| self.path(name).exists())
	}
	/// Fail unless an issuer and an index exist.
	pub fn require_issuer(&self) -> Result<()> {
		if self.path(ISSUER_CERT_FILE).is_file() && self.path(INDEX_FILE).is_file() {
			Ok(())
		} else {
			Err(Error::IssuerMissing(self.root.clone()))
		}
	}

	pub fn load(&self) -> Result<PkiState> {
		self.require_issuer()?;
		let index: StoreIndex = serde_json::from_str(&self.read(INDEX_FILE)?)?;
		if index.format_version != FORMAT_VERSION {
			return Err(Error::StoreCorrupt(format!(
				"unsupported index format {}",
				index.format_version
			)));
		}
		let mut config = index.config;
		config.root_path = self.root.clone();

		let key_path = self.path(ISSUER_KEY_FILE);
		if !key_path.is_file() {
			return Err(Error::IssuerKeyUnavailable(key_path));
		}
		let issuer = Issuer::from_pem(
			&self.read(ISSUER_CERT_FILE)?,
			&self.read(ISSUER_KEY_FILE)?,
			config.algorithm,
			index.next_serial,
		)?;

		let ledger = if self.path(LEDGER_FILE).is_file() {
			serde_json::from_str(&self.read(LEDGER_FILE)?)?
		} else {
			RevocationLedger::default()
		};
		let dh = if config.algorithm.requires_dh() {
			if !self.path(DH_FILE).is_file() {
				return Err(Error::StoreCorrupt(format!(
					"{DH_FILE} is missing from an RSA store"
				)));
			}
			Some(DhParameters::from_pem(self.read(DH_FILE)?)?)
		} else {
			None
		};
		tracing::debug!(
			root = %self.root.display(),
			leaves = index.certificates.len(),
			revoked = ledger.entries().len(),
			"loaded store"
		);

		Ok(PkiState {
			config,
			issuer,
			leaves: index.certificates,
			ledger,
			dh,
		})
	}

	/// Write every staged file atomically, the index last so that a store
	/// with an index is always complete.
	pub fn save(&self, changes: &Changeset) -> Result<()> {
		let (index, rest): (Vec<_>, Vec<_>) = changes.files().partition(|f| f.name == INDEX_FILE);
		for file in rest.into_iter().chain(index) {
			let path = self.path(&file.name);
			write_atomic(&path, &file.contents, file.mode)?;
			tracing::debug!(path = %path.display(), "wrote");
		}
		Ok(())
	}

	/// Take the store's exclusive lock. Fails immediately if another
	/// invocation holds it.
	pub fn lock(&self) -> Result<StoreLock> {
		let path = self.path(LOCK_FILE);
		match OpenOptions::new().write(true).create_new(true).open(&path) {
			Ok(mut file) => {
				writeln!(file, "{}", std::process::id())?;
				Ok(StoreLock { path })
			},
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::StoreLocked {
				root: self.root.clone(),
				lock: path,
			}),
			Err(e) => Err(e.into()),
		}
	}

	fn read(&self, name: &str) -> Result<String> {
		Ok(fs::read_to_string(self.path(name))?)
	}
}

/// Removes the lock file when dropped.
#[derive(Debug)]
pub struct StoreLock {
	path: PathBuf,
}

impl Drop for StoreLock {
	fn drop(&mut self) {
		if let Err(e) = fs::remove_file(&self.path) {
			tracing::warn!(path = %self.path.display(), error = %e, "could not release store lock");
		}
	}
}

fn write_atomic(path: &Path, contents: &str, mode: FileMode) -> io::Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let file_name = path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	let tmp = path.with_file_name(format!(".{file_name}.tmp"));
	// a temp file left by a crash keeps its old permissions, so never reuse it
	match fs::remove_file(&tmp) {
		Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
		_ => {},
	}

	let mut opts = OpenOptions::new();
	opts.write(true).create_new(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		opts.mode(match mode {
			FileMode::Public => 0o644,
			FileMode::Private => 0o600,
		});
	}
	#[cfg(not(unix))]
	let _ = mode;

	let mut file = opts.open(&tmp)?;
	file.write_all(contents.as_bytes())?;
	file.sync_all()?;
	fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cert::{LeafStatus, Role};
	use assert_fs::prelude::*;

	fn leaf(name: &str, serial: u64) -> LeafCertificate {
		let now = rcgen::date_time_ymd(2024, 1, 1);
		LeafCertificate {
			common_name: name.into(),
			serial,
			not_before: now,
			not_after: now,
			role: Role::Client,
			status: LeafStatus::Valid,
			cert_pem: String::new(),
		}
	}

	#[test]
	fn open_requires_existing_directory() -> anyhow::Result<()> {
		let temp = assert_fs::TempDir::new()?;
		assert!(PkiStore::open(temp.path()).is_ok());
		let err = PkiStore::open(temp.path().join("missing")).unwrap_err();
		assert_eq!(err.kind(), crate::ErrorKind::Path);
		Ok(())
	}
	#[test]
	fn empty_store_is_not_found() -> anyhow::Result<()> {
		let temp = assert_fs::TempDir::new()?;
		let store = PkiStore::open(temp.path())?;
		assert!(!store.is_initialized());
		let err = store.load().err().expect("empty store must not load");
		assert!(matches!(err, Error::IssuerMissing(_)));
		assert!(err.is_not_found());
		Ok(())
	}
	#[test]
	fn save_writes_staged_files() -> anyhow::Result<()> {
		let temp = assert_fs::TempDir::new()?;
		let store = PkiStore::open(temp.path())?;
		let mut changes = Changeset::default();
		changes.put("clients/alice.ovpn", "first", FileMode::Private);
		changes.put("clients/alice.ovpn", "second", FileMode::Private);
		changes.put(CRL_FILE, "crl", FileMode::Public);
		store.save(&changes)?;

		temp.child("clients/alice.ovpn").assert("second");
		temp.child(CRL_FILE).assert("crl");
		temp.child("clients/.alice.ovpn.tmp")
			.assert(predicates::path::missing());

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let mode = fs::metadata(temp.child("clients/alice.ovpn").path())?
				.permissions()
				.mode();
			assert_eq!(mode & 0o777, 0o600);
		}
		Ok(())
	}
	#[cfg(unix)]
	#[test]
	fn stale_temp_file_does_not_leak_permissions() -> anyhow::Result<()> {
		use std::os::unix::fs::PermissionsExt;
		let temp = assert_fs::TempDir::new()?;
		let stale = temp.child(".ca.key.tmp");
		stale.write_str("half written")?;
		fs::set_permissions(stale.path(), fs::Permissions::from_mode(0o644))?;

		let store = PkiStore::open(temp.path())?;
		let mut changes = Changeset::default();
		changes.put(ISSUER_KEY_FILE, "secret", FileMode::Private);
		store.save(&changes)?;

		temp.child(ISSUER_KEY_FILE).assert("secret");
		stale.assert(predicates::path::missing());
		let mode = fs::metadata(temp.child(ISSUER_KEY_FILE).path())?
			.permissions()
			.mode();
		assert_eq!(mode & 0o777, 0o600);
		Ok(())
	}
	#[test]
	fn key_without_cert_still_counts_as_initialized() -> anyhow::Result<()> {
		let temp = assert_fs::TempDir::new()?;
		temp.child(ISSUER_KEY_FILE).write_str("left over")?;
		let store = PkiStore::open(temp.path())?;
		assert!(store.is_initialized());
		assert!(store.require_issuer().is_err());
		Ok(())
	}
	#[test]
	fn lock_is_exclusive_and_released() -> anyhow::Result<()> {
		let temp = assert_fs::TempDir::new()?;
		let store = PkiStore::open(temp.path())?;
		{
			let _guard = store.lock()?;
			temp.child(LOCK_FILE).assert(predicates::path::exists());
			let err = store.lock().unwrap_err();
			assert!(matches!(err, Error::StoreLocked { .. }));
		}
		temp.child(LOCK_FILE).assert(predicates::path::missing());
		assert!(store.lock().is_ok());
		Ok(())
	}
	#[test]
	fn client_config_names_stay_unique() {
		let leaves = vec![leaf("alice", 2), leaf("bob", 3), leaf("alice", 4)];
		assert_eq!(client_config_name(&leaves[0], &leaves), "clients/alice.ovpn");
		assert_eq!(client_config_name(&leaves[1], &leaves), "clients/bob.ovpn");
		assert_eq!(client_config_name(&leaves[2], &leaves), "clients/alice+4.ovpn");
	}
	#[test]
	fn dotted_names_do_not_shadow_repeats() {
		let leaves = vec![leaf("alice", 3), leaf("alice.5", 4), leaf("alice", 5)];
		let names: Vec<_> = leaves
			.iter()
			.map(|leaf| client_config_name(leaf, &leaves))
			.collect();
		assert_eq!(
			names,
			vec!["clients/alice.ovpn", "clients/alice.5.ovpn", "clients/alice+5.ovpn"]
		);
	}
}
