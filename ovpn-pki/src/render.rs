//! OpenVPN configuration files with the key material inlined.
//!
//! Rendering is a pure function of its inputs; nothing here touches disk.

use std::fmt;

use crate::{
	cert::{IssuedLeaf, Issuer},
	config::EcCurve,
	dh::DhParameters,
	store::CRL_FILE,
	Algorithm, PkiConfig,
};

const SERVER_SUBNET: &str = "10.8.0.0 255.255.255.0";

#[derive(Default)]
struct Directives {
	text: String,
}

impl Directives {
	fn line(&mut self, directive: impl fmt::Display) -> &mut Self {
		self.text.push_str(&directive.to_string());
		self.text.push('\n');
		self
	}
	fn inline(&mut self, tag: &str, pem: &str) -> &mut Self {
		self.line(format_args!("<{tag}>"))
			.line(pem.trim_end())
			.line(format_args!("</{tag}>"))
	}
	fn finish(&mut self) -> String {
		std::mem::take(&mut self.text)
	}
}

/// Name OpenSSL (and so OpenVPN's `ecdh-curve`) knows the curve by.
fn openssl_curve_name(curve: EcCurve) -> &'static str {
	match curve {
		EcCurve::Secp256r1 => "prime256v1",
		EcCurve::Secp384r1 => "secp384r1",
	}
}

pub fn render_server_config(
	issuer: &Issuer,
	server: &IssuedLeaf,
	dh: Option<&DhParameters>,
	config: &PkiConfig,
) -> String {
	let leaf = &server.certificate;
	let mut out = Directives::default();
	out.line(format_args!(
		"# {} (serial {}), {}",
		leaf.common_name,
		leaf.serial,
		issuer.algorithm()
	))
	.line(format_args!("port {}", config.server.port))
	.line(format_args!("proto {}", config.server.proto))
	.line("dev tun")
	.line("topology subnet")
	.line(format_args!("server {SERVER_SUBNET}"))
	.line("keepalive 10 120")
	.line("persist-key")
	.line("persist-tun")
	.line("remote-cert-tls client")
	.line(format_args!("crl-verify {CRL_FILE}"));
	if dh.is_none() {
		out.line("dh none");
	}
	if let Algorithm::Ecdsa { curve } = issuer.algorithm() {
		out.line(format_args!("ecdh-curve {}", openssl_curve_name(curve)));
	}
	out.line("verb 3")
		.inline("ca", issuer.cert_pem())
		.inline("cert", &leaf.cert_pem)
		.inline("key", &server.key_pem);
	if let Some(dh) = dh {
		out.inline("dh", dh.pem());
	}
	out.finish()
}

pub fn render_client_config(issuer: &Issuer, client: &IssuedLeaf, config: &PkiConfig) -> String {
	let leaf = &client.certificate;
	Directives::default()
		.line(format_args!(
			"# {} (serial {}), {}",
			leaf.common_name,
			leaf.serial,
			issuer.algorithm()
		))
		.line("client")
		.line("dev tun")
		.line(format_args!("proto {}", config.server.proto))
		.line(format_args!(
			"remote {} {}",
			config.server.host, config.server.port
		))
		.line("resolv-retry infinite")
		.line("nobind")
		.line("persist-key")
		.line("persist-tun")
		.line("remote-cert-tls server")
		.line("verb 3")
		.inline("ca", issuer.cert_pem())
		.inline("cert", &leaf.cert_pem)
		.inline("key", &client.key_pem)
		.finish()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		cert::{create_leaf, Role},
		config::Proto,
	};

	fn fixture(algorithm: Algorithm) -> crate::Result<(PkiConfig, Issuer, IssuedLeaf, IssuedLeaf)> {
		let mut config = PkiConfig::new("/pki").with_algorithm(algorithm);
		config.server.host = "vpn.example.org".into();
		config.server.proto = Proto::Tcp;
		let mut issuer = Issuer::create(&config)?;
		let server = create_leaf(&mut issuer, Role::Server, None, &config, &[])?;
		let client = create_leaf(&mut issuer, Role::Client, Some("alice"), &config, &[])?;
		Ok((config, issuer, server, client))
	}

	#[test]
	fn rendering_is_deterministic() -> crate::Result<()> {
		let (config, issuer, server, client) = fixture(Algorithm::EdDsa)?;
		assert_eq!(
			render_server_config(&issuer, &server, None, &config),
			render_server_config(&issuer, &server, None, &config)
		);
		assert_eq!(
			render_client_config(&issuer, &client, &config),
			render_client_config(&issuer, &client, &config)
		);
		Ok(())
	}
	#[test]
	fn server_config_inlines_material() -> crate::Result<()> {
		let (config, issuer, server, _) = fixture(Algorithm::EdDsa)?;
		let text = render_server_config(&issuer, &server, None, &config);
		assert!(text.contains("proto tcp\n"));
		assert!(text.contains("remote-cert-tls client\n"));
		assert!(text.contains("crl-verify crl.pem\n"));
		assert!(text.contains("dh none\n"));
		assert!(!text.contains("ecdh-curve"));
		assert!(text.contains(&format!("<ca>\n{}</ca>\n", issuer.cert_pem())));
		assert!(text.contains(&format!("<key>\n{}</key>\n", server.key_pem)));
		assert!(text.ends_with("</key>\n"));
		Ok(())
	}
	#[test]
	fn ecdsa_server_names_curve() -> crate::Result<()> {
		let (config, issuer, server, _) = fixture(Algorithm::Ecdsa {
			curve: EcCurve::Secp256r1,
		})?;
		let text = render_server_config(&issuer, &server, None, &config);
		assert!(text.contains("dh none\necdh-curve prime256v1\n"));
		Ok(())
	}
	#[test]
	fn rsa_server_inlines_dh() -> crate::Result<()> {
		crate::cert::init();
		let (config, issuer, server, _) = fixture(Algorithm::Rsa { key_size: 2048 })?;
		let dh = DhParameters::with_prime_len(512)?;
		let text = render_server_config(&issuer, &server, Some(&dh), &config);
		assert!(!text.contains("dh none"));
		assert!(text.ends_with(&format!("<dh>\n{}</dh>\n", dh.pem())));
		Ok(())
	}
	#[test]
	fn client_config_points_at_server() -> crate::Result<()> {
		let (config, issuer, _, client) = fixture(Algorithm::EdDsa)?;
		let text = render_client_config(&issuer, &client, &config);
		assert!(text.starts_with("# alice (serial 3), eddsa-ED25519\nclient\n"));
		assert!(text.contains("remote vpn.example.org 1194\n"));
		assert!(text.contains("remote-cert-tls server\n"));
		assert!(text.contains(&format!("<cert>\n{}</cert>\n", client.certificate.cert_pem)));
		Ok(())
	}
}
