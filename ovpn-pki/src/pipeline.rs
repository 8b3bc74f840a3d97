//! The provisioning pipelines run by the command line.
//!
//! Each pipeline is a linear list of steps. Every step stages its output in
//! a [`Changeset`]; only the final `save` step writes to the store, so a
//! failure in any earlier step leaves the store as it was.

use crate::{
	cert::{self, create_leaf, IssuedLeaf, Issuer, LeafCertificate, Role},
	config::validate_name,
	dh::DhParameters,
	render::{render_client_config, render_server_config},
	revoke::{revoke, RevocationLedger},
	store::{
		client_config_name, Changeset, FileMode, PkiState, PkiStore, CRL_FILE, DH_FILE,
		ISSUER_CERT_FILE, ISSUER_KEY_FILE, SERVER_CONFIG_FILE,
	},
	Algorithm, Error, PkiConfig, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
	Start,
	Running(&'static str),
	Committed,
	Aborted { step: &'static str, error: String },
}

/// Runs named steps in order and remembers where it stopped.
#[derive(Debug)]
pub struct Pipeline {
	name: &'static str,
	state: PipelineState,
}

impl Pipeline {
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			state: PipelineState::Start,
		}
	}

	/// Run one step. An error moves the pipeline to
	/// [`PipelineState::Aborted`] and is handed back unchanged.
	pub fn step<T>(&mut self, step: &'static str, run: impl FnOnce() -> Result<T>) -> Result<T> {
		if matches!(
			self.state,
			PipelineState::Committed | PipelineState::Aborted { .. }
		) {
			return Err(Error::StoreCorrupt(format!(
				"pipeline {} already finished before step {step}",
				self.name
			)));
		}
		self.state = PipelineState::Running(step);
		tracing::info!(pipeline = self.name, step, "running");
		run().map_err(|error| {
			tracing::error!(pipeline = self.name, step, %error, "aborted");
			self.state = PipelineState::Aborted {
				step,
				error: error.to_string(),
			};
			error
		})
	}

	pub fn commit(&mut self) {
		tracing::info!(pipeline = self.name, "committed");
		self.state = PipelineState::Committed;
	}

	pub fn state(&self) -> &PipelineState {
		&self.state
	}
}

#[derive(Debug, Clone)]
pub struct InitReport {
	pub algorithm: Algorithm,
	pub issuer_fingerprint: String,
	pub server: LeafCertificate,
	/// Prime length of the generated DH parameters, RSA stores only.
	pub dh_bits: Option<u32>,
	/// Files written, relative to the store root.
	pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClientReport {
	pub certificate: LeafCertificate,
	pub config_file: String,
	/// Another valid certificate already carried this common name.
	pub duplicate_name: bool,
}

#[derive(Debug, Clone)]
pub struct RevokeReport {
	pub certificate: LeafCertificate,
	/// Entries in the ledger after this revocation.
	pub revoked_total: usize,
}

/// Create the issuer, the server leaf, DH parameters for RSA stores, the
/// server config and an empty CRL.
pub fn initialize(store: &PkiStore, mut config: PkiConfig) -> Result<InitReport> {
	if store.is_initialized() {
		return Err(Error::IssuerExists(store.root().to_path_buf()));
	}
	let _lock = store.lock()?;
	if store.is_initialized() {
		return Err(Error::IssuerExists(store.root().to_path_buf()));
	}
	config.root_path = store.root().to_path_buf();

	let mut pipeline = Pipeline::new("init");
	let mut changes = Changeset::default();

	let mut issuer = pipeline.step("create issuer", || Issuer::create(&config))?;
	let server = pipeline.step("create server leaf", || {
		create_leaf(&mut issuer, Role::Server, None, &config, &[])
	})?;
	let dh = pipeline.step("create dh parameters", || DhParameters::generate(&config))?;
	pipeline.step("render server config", || {
		let text = render_server_config(&issuer, &server, dh.as_ref(), &config);
		changes.put(SERVER_CONFIG_FILE, text, FileMode::Private);
		Ok(())
	})?;

	issuer
		.serialize_pem()
		.stage(&mut changes, ISSUER_CERT_FILE, ISSUER_KEY_FILE);
	if let Some(dh) = &dh {
		changes.put(DH_FILE, dh.pem(), FileMode::Public);
	}
	let state = PkiState {
		config,
		issuer,
		leaves: vec![server.certificate.clone()],
		ledger: RevocationLedger::default(),
		dh,
	};
	pipeline.step("sign crl", || stage_revocations(&state, &mut changes))?;
	pipeline.step("save", || {
		state.stage_index(&mut changes)?;
		store.save(&changes)
	})?;
	pipeline.commit();

	Ok(InitReport {
		algorithm: state.config.algorithm,
		issuer_fingerprint: state.issuer.fingerprint()?,
		server: server.certificate,
		dh_bits: state.dh.as_ref().map(DhParameters::bits).transpose()?,
		files: changes.files().map(|f| f.name.clone()).collect(),
	})
}

/// Issue a client leaf and render its config. Without a name one is
/// generated.
pub fn create_client(store: &PkiStore, common_name: Option<&str>) -> Result<ClientReport> {
	store.require_issuer()?;
	if let Some(name) = common_name {
		validate_name(name)?;
	}
	let _lock = store.lock()?;

	let mut pipeline = Pipeline::new("client");
	let mut changes = Changeset::default();

	let mut state = pipeline.step("load", || store.load())?;
	let IssuedLeaf {
		certificate,
		key_pem,
		duplicate_name,
	} = pipeline.step("create client leaf", || {
		create_leaf(
			&mut state.issuer,
			Role::Client,
			common_name,
			&state.config,
			&state.leaves,
		)
	})?;
	state.leaves.push(certificate.clone());
	let config_file = client_config_name(&certificate, &state.leaves);
	let issued = IssuedLeaf {
		certificate,
		key_pem,
		duplicate_name,
	};

	pipeline.step("render client config", || {
		let text = render_client_config(&state.issuer, &issued, &state.config);
		changes.put(&config_file, text, FileMode::Private);
		Ok(())
	})?;
	pipeline.step("save", || {
		state.stage_index(&mut changes)?;
		store.save(&changes)
	})?;
	pipeline.commit();

	Ok(ClientReport {
		certificate: issued.certificate,
		config_file,
		duplicate_name,
	})
}

/// Revoke the newest valid leaf named `common_name` and re-sign the CRL.
pub fn revoke_client(store: &PkiStore, common_name: &str) -> Result<RevokeReport> {
	store.require_issuer()?;
	let _lock = store.lock()?;

	let mut pipeline = Pipeline::new("revoke");
	let mut changes = Changeset::default();

	let mut state = pipeline.step("load", || store.load())?;
	let certificate = pipeline.step("revoke", || {
		revoke(
			&mut state.leaves,
			&mut state.ledger,
			common_name,
			cert::now(),
		)
	})?;
	pipeline.step("sign crl", || stage_revocations(&state, &mut changes))?;
	pipeline.step("save", || {
		state.stage_index(&mut changes)?;
		store.save(&changes)
	})?;
	pipeline.commit();

	Ok(RevokeReport {
		certificate,
		revoked_total: state.ledger.entries().len(),
	})
}

/// Every leaf the store has issued, in serial order.
pub fn list(store: &PkiStore) -> Result<Vec<LeafCertificate>> {
	let mut leaves = store.load()?.leaves;
	leaves.sort_by_key(|leaf| leaf.serial);
	Ok(leaves)
}

fn stage_revocations(state: &PkiState, changes: &mut Changeset) -> Result<()> {
	let crl = state.issuer.crl(&state.ledger, state.config.valid_days)?;
	changes.put(CRL_FILE, crl, FileMode::Public);
	state.stage_ledger(changes)
}
