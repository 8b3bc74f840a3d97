//! Command Line argument parsing
use std::path::PathBuf;

use bpaf::{Bpaf, Parser};
use ovpn_pki::ConfigOptions;

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, generate(options), version)]
/// ovpn-pki: certificate authority, server and client certificates for OpenVPN
pub enum Mode {
	/// Create the issuer, the server certificate and the server config
	#[bpaf(command)]
	Init {
		#[bpaf(external(path))]
		path: PathBuf,
		/// RSA modulus length in bits (RSA only)
		#[bpaf(long, argument("BITS"))]
		keysize: Option<String>,
		/// Days every certificate stays valid
		#[bpaf(long, argument("DAYS"))]
		validdays: Option<String>,
		/// Key algorithm: rsa, ecdsa or eddsa
		#[bpaf(long, argument("NAME"))]
		algorithm: Option<String>,
		/// Named curve for ecdsa (see `curves`)
		#[bpaf(long, argument("NAME"))]
		curve: Option<String>,
		/// Appended to generated names
		#[bpaf(long, argument("SUFFIX"))]
		suffix: Option<String>,
		/// Host clients connect to
		#[bpaf(long, argument("HOST"))]
		host: Option<String>,
		/// Port the server listens on
		#[bpaf(long, argument("PORT"))]
		port: Option<String>,
		/// Transport: udp or tcp
		#[bpaf(long, argument("PROTO"))]
		proto: Option<String>,
	},
	/// Issue a client certificate and render its config
	#[bpaf(command)]
	Client {
		#[bpaf(external(path))]
		path: PathBuf,
		/// Subject common name, generated when omitted
		#[bpaf(long, argument("NAME"))]
		commonname: Option<String>,
	},
	/// Revoke the newest valid certificate with a common name
	#[bpaf(command)]
	Revoke {
		#[bpaf(external(path))]
		path: PathBuf,
		/// Subject common name to revoke
		#[bpaf(long, argument("NAME"))]
		commonname: Option<String>,
	},
	/// List issued certificates
	#[bpaf(command)]
	List {
		#[bpaf(external(path))]
		path: PathBuf,
	},
	/// List supported curve names
	#[bpaf(command)]
	Curves,
	/// Print usage
	#[bpaf(command)]
	Help,
	/// Print version information
	#[bpaf(command)]
	About,
}

fn path() -> impl Parser<PathBuf> {
	bpaf::long("path")
		.help("PKI root directory, must exist")
		.argument::<PathBuf>("DIR")
		.fallback(PathBuf::from("."))
}

impl Mode {
	/// Option values for `init`, unvalidated.
	pub fn config_options(&self) -> Option<ConfigOptions> {
		match self {
			Mode::Init {
				keysize,
				validdays,
				algorithm,
				curve,
				suffix,
				host,
				port,
				proto,
				..
			} => Some(ConfigOptions {
				algorithm: algorithm.clone(),
				keysize: keysize.clone(),
				curve: curve.clone(),
				validdays: validdays.clone(),
				suffix: suffix.clone(),
				host: host.clone(),
				port: port.clone(),
				proto: proto.clone(),
			}),
			_ => None,
		}
	}
}
