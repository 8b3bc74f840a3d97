use std::fs;

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;
use x509_parser::prelude::{FromDer, X509Certificate};

fn ovpn_pki() -> Command {
	let mut cmd = Command::cargo_bin("ovpn-pki").expect("binary is built");
	cmd.env("RUST_LOG", "warn");
	cmd
}

fn serial_of(pem_text: &str) -> anyhow::Result<u64> {
	let der = pem::parse(pem_text)?;
	let (_, cert) = X509Certificate::from_der(der.contents())?;
	Ok(cert.serial.to_u64_digits()[0])
}

#[test]
fn init_with_defaults_uses_rsa_and_dh() -> anyhow::Result<()> {
	let temp = assert_fs::TempDir::new()?;
	ovpn_pki()
		.args(["init", "--path"])
		.arg(temp.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("rsa-2048").and(predicate::str::contains("2048 bits")));

	let index: serde_json::Value = serde_json::from_str(&fs::read_to_string(temp.child("pki.json").path())?)?;
	assert_eq!(index["config"]["algorithm"]["family"], "rsa");
	assert_eq!(index["config"]["algorithm"]["key_size"], 2048);
	assert_eq!(index["config"]["valid_days"], 3650);
	temp.child("dh.pem")
		.assert(predicate::str::starts_with("-----BEGIN DH PARAMETERS-----"));
	temp.child("server.conf")
		.assert(predicate::str::contains("<dh>").and(predicate::str::contains("<key>")));

	let ca = fs::read_to_string(temp.child("ca.crt").path())?;
	let der = pem::parse(&ca)?;
	let (_, cert) = X509Certificate::from_der(der.contents())?;
	let validity = cert.validity();
	let days = (validity.not_after.timestamp() - validity.not_before.timestamp()) / 86_400;
	assert_eq!(days, 3650);
	Ok(())
}

#[test]
fn eddsa_client_and_revoke() -> anyhow::Result<()> {
	let temp = assert_fs::TempDir::new()?;
	ovpn_pki()
		.args(["init", "--algorithm", "eddsa", "--path"])
		.arg(temp.path())
		.assert()
		.success();
	temp.child("dh.pem").assert(predicate::path::missing());
	temp.child("server.conf")
		.assert(predicate::str::contains("dh none"));

	ovpn_pki()
		.args(["client", "--commonname", "alice", "--path"])
		.arg(temp.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("serial 3"));
	let alice = temp.child("clients/alice.ovpn");
	alice.assert(predicate::str::contains("<cert>"));
	let conf = fs::read_to_string(alice.path())?;
	let cert_pem = conf
		.split("<cert>\n")
		.nth(1)
		.and_then(|rest| rest.split("</cert>").next())
		.unwrap_or_default();
	assert_eq!(serial_of(cert_pem)?, 3);

	ovpn_pki()
		.args(["revoke", "--commonname", "alice", "--path"])
		.arg(temp.path())
		.assert()
		.success();
	let ledger: serde_json::Value = serde_json::from_str(&fs::read_to_string(temp.child("revocations.json").path())?)?;
	assert_eq!(ledger.as_array().map(Vec::len), Some(1));
	assert_eq!(ledger[0]["serial"], 3);

	ovpn_pki()
		.args(["list", "--path"])
		.arg(temp.path())
		.assert()
		.success()
		.stdout(predicate::str::contains("revoked").and(predicate::str::contains("alice")));

	ovpn_pki()
		.args(["revoke", "--commonname", "alice", "--path"])
		.arg(temp.path())
		.assert()
		.failure()
		.code(1)
		.stderr(predicate::str::contains("already revoked"));
	Ok(())
}

#[test]
fn client_without_issuer_writes_nothing() -> anyhow::Result<()> {
	let temp = assert_fs::TempDir::new()?;
	ovpn_pki()
		.args(["client", "--path"])
		.arg(temp.path())
		.assert()
		.code(1)
		.stderr(predicate::str::contains("no issuer"));
	assert_eq!(fs::read_dir(temp.path())?.count(), 0);
	Ok(())
}

#[test]
fn second_init_is_refused() -> anyhow::Result<()> {
	let temp = assert_fs::TempDir::new()?;
	for expected in [0, 1] {
		ovpn_pki()
			.args(["init", "--algorithm", "ecdsa", "--curve", "p-256", "--path"])
			.arg(temp.path())
			.assert()
			.code(expected);
	}
	Ok(())
}

#[test]
fn bad_input_fails_before_any_write() -> anyhow::Result<()> {
	let temp = assert_fs::TempDir::new()?;
	let long_suffix = "s".repeat(49);
	for args in [
		&["init", "--keysize", "lots"][..],
		&["init", "--algorithm", "dsa"],
		&["init", "--algorithm", "ecdsa", "--curve", "secp521r1"],
		&["init", "--validdays", "0"],
		&["rotate"],
		&["init", "--colour", "red"],
		&["revoke"],
		&["init", "--algorithm", "eddsa", "--suffix", long_suffix.as_str()],
	] {
		ovpn_pki().args(args).current_dir(temp.path()).assert().code(1);
	}
	assert_eq!(fs::read_dir(temp.path())?.count(), 0);

	ovpn_pki()
		.args(["init", "--path"])
		.arg(temp.path().join("missing"))
		.assert()
		.code(1)
		.stderr(predicate::str::contains("not found"));
	Ok(())
}

#[test]
fn informational_modes_succeed() {
	ovpn_pki()
		.arg("curves")
		.assert()
		.success()
		.stdout(predicate::str::contains("secp384r1").and(predicate::str::contains("ED25519")));
	ovpn_pki()
		.arg("help")
		.assert()
		.success()
		.stdout(predicate::str::contains("init"));
	ovpn_pki()
		.arg("--help")
		.assert()
		.success();
	ovpn_pki()
		.arg("about")
		.assert()
		.success()
		.stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
