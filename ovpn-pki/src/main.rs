use anyhow::{Context, Result};
use ovpn_pki::{cert, config::EcCurve, config::EDDSA_CURVE, store::PkiStore, Error};
use tracing_subscriber::EnvFilter;

mod args;
use args::Mode;

fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.with_target(false)
		.compact()
		.init();
	cert::init();

	let mode = args::options().run();
	let config = mode.config_options();
	match mode {
		Mode::Init { path, .. } => {
			let options = config.context("init options")?;
			let store = PkiStore::open(path)?;
			let config = options.into_config(store.root())?;
			let report = ovpn_pki::initialize(&store, config)?;
			println!("algorithm    {}", report.algorithm);
			println!("fingerprint  {}", report.issuer_fingerprint);
			if let Some(bits) = report.dh_bits {
				println!("dh           {bits} bits");
			}
			println!(
				"server       {} (serial {})",
				report.server.common_name, report.server.serial
			);
			for file in &report.files {
				println!("wrote        {}", store.root().join(file).display());
			}
		},
		Mode::Client { path, commonname } => {
			let store = PkiStore::open(path)?;
			let report = ovpn_pki::create_client(&store, commonname.as_deref())?;
			println!(
				"issued {} (serial {}), config {}",
				report.certificate.common_name,
				report.certificate.serial,
				store.root().join(&report.config_file).display()
			);
		},
		Mode::Revoke { path, commonname } => {
			let name = commonname.ok_or(Error::MissingArgument("commonname"))?;
			let store = PkiStore::open(path)?;
			let report = ovpn_pki::revoke_client(&store, &name)?;
			println!(
				"revoked {} (serial {}), {} revoked in total",
				report.certificate.common_name, report.certificate.serial, report.revoked_total
			);
		},
		Mode::List { path } => {
			let store = PkiStore::open(path)?;
			for leaf in ovpn_pki::list(&store)? {
				println!(
					"{:>6}  {:<7} {:<8} {}  {}",
					leaf.serial,
					format!("{:?}", leaf.status).to_lowercase(),
					format!("{:?}", leaf.role).to_lowercase(),
					leaf.not_after.date(),
					leaf.common_name
				);
			}
		},
		Mode::Curves => {
			for curve in EcCurve::ALL {
				println!("ecdsa  {curve} ({})", curve.aliases().join(", "));
			}
			println!("eddsa  {EDDSA_CURVE}");
		},
		Mode::Help => {
			if let Err(bpaf::ParseFailure::Stdout(usage, full)) =
				args::options().run_inner(&["--help"])
			{
				print!("{}", usage.monochrome(full));
			}
		},
		Mode::About => {
			println!(
				"{} {}\n{}",
				env!("CARGO_PKG_NAME"),
				env!("CARGO_PKG_VERSION"),
				env!("CARGO_PKG_DESCRIPTION")
			);
		},
	}
	Ok(())
}
