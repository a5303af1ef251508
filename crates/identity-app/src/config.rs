//! CLI & Config (SPEC_FULL.md §4.K). A `clap`-derived `Args` struct loading
//! an optional `serde_yaml` config file; flags override file values. Config
//! validation happens once at startup — invalid config is a fast, loud exit.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use identity_core::TrustDomain;
use serde::Deserialize;

/// `identityd` — the mesh identity issuance service.
#[derive(Parser, Debug)]
#[command(name = "identityd", version, about)]
pub struct Args {
	/// Path to a YAML config file. Flags below override file values when set.
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Address the Certify gRPC service binds to.
	#[arg(long)]
	pub listen_addr: Option<String>,

	/// Address the admin surface (/healthz, /readyz, /metrics) binds to.
	#[arg(long)]
	pub admin_addr: Option<String>,

	/// Directory watched for intermediate CA rotation (spec.md §6).
	#[arg(long)]
	pub issuer_dir: Option<PathBuf>,

	/// PEM bundle of trust-anchor (root) certificates.
	#[arg(long)]
	pub trust_anchors: Option<PathBuf>,

	/// Mesh control-namespace segment of the trust domain.
	#[arg(long)]
	pub control_namespace: Option<String>,

	/// Mesh domain segment of the trust domain.
	#[arg(long)]
	pub trust_domain: Option<String>,

	/// Issued leaf validity, Go-duration syntax (e.g. "24h").
	#[arg(long)]
	pub validity: Option<String>,

	/// Clock-skew allowance applied symmetrically, Go-duration syntax.
	#[arg(long)]
	pub clock_skew: Option<String>,

	/// Base URL of the orchestrator's TokenReview endpoint.
	#[arg(long)]
	pub token_review_url: Option<String>,
}

/// On-disk shape of `--config`. Every field is optional so a file may supply
/// a subset and let flags (or defaults) fill the rest.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FileConfig {
	listen_addr: Option<String>,
	admin_addr: Option<String>,
	issuer_dir: Option<PathBuf>,
	trust_anchors: Option<PathBuf>,
	control_namespace: Option<String>,
	trust_domain: Option<String>,
	validity: Option<String>,
	clock_skew: Option<String>,
	token_review_url: Option<String>,
}

/// Fully validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
	pub listen_addr: String,
	pub admin_addr: String,
	pub issuer_dir: PathBuf,
	pub trust_anchors: PathBuf,
	pub trust_domain: TrustDomain,
	pub validity: Duration,
	pub clock_skew: Duration,
	pub token_review_url: String,
}

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8443";
const DEFAULT_ADMIN_ADDR: &str = "0.0.0.0:9990";
const DEFAULT_VALIDITY: &str = "24h";
const DEFAULT_CLOCK_SKEW: &str = "60s";

impl Args {
	/// Merges the config file (if any) with flag overrides, then validates.
	pub fn into_config(self) -> anyhow::Result<Config> {
		let file = match &self.config {
			Some(path) => read_file_config(path)?,
			None => FileConfig::default(),
		};

		let listen_addr = self
			.listen_addr
			.or(file.listen_addr)
			.unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
		let admin_addr = self
			.admin_addr
			.or(file.admin_addr)
			.unwrap_or_else(|| DEFAULT_ADMIN_ADDR.to_string());
		let issuer_dir = self
			.issuer_dir
			.or(file.issuer_dir)
			.ok_or_else(|| anyhow::anyhow!("issuer-dir is required (flag --issuer-dir or config file)"))?;
		let trust_anchors = self
			.trust_anchors
			.or(file.trust_anchors)
			.ok_or_else(|| anyhow::anyhow!("trust-anchors is required (flag --trust-anchors or config file)"))?;
		let control_namespace = self
			.control_namespace
			.or(file.control_namespace)
			.ok_or_else(|| anyhow::anyhow!("control-namespace is required"))?;
		let trust_domain_name = self
			.trust_domain
			.or(file.trust_domain)
			.ok_or_else(|| anyhow::anyhow!("trust-domain is required"))?;
		let validity_str = self.validity.or(file.validity).unwrap_or_else(|| DEFAULT_VALIDITY.to_string());
		let clock_skew_str = self.clock_skew.or(file.clock_skew).unwrap_or_else(|| DEFAULT_CLOCK_SKEW.to_string());
		let token_review_url = self
			.token_review_url
			.or(file.token_review_url)
			.ok_or_else(|| anyhow::anyhow!("token-review-url is required"))?;

		let trust_domain = TrustDomain::new(control_namespace, trust_domain_name)
			.map_err(|e| anyhow::anyhow!("invalid trust domain: {e}"))?;
		let validity = parse_go_duration(&validity_str)?;
		let clock_skew = parse_go_duration(&clock_skew_str)?;

		Ok(Config {
			listen_addr,
			admin_addr,
			issuer_dir,
			trust_anchors,
			trust_domain,
			validity,
			clock_skew,
			token_review_url,
		})
	}
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
	let raw = std::fs::read_to_string(path)
		.map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
	serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))
}

/// Parses Go `time.ParseDuration` syntax ("24h", "60s", "1h30m"), the
/// convention the orchestrator ecosystem around this service already uses
/// for durations in its own YAML manifests.
fn parse_go_duration(input: &str) -> anyhow::Result<Duration> {
	let nanos = go_parse_duration::parse_duration(input)
		.map_err(|e| anyhow::anyhow!("invalid duration {input:?}: {e:?}"))?;
	if nanos < 0 {
		anyhow::bail!("duration {input:?} must not be negative");
	}
	Ok(Duration::from_nanos(nanos as u64))
}
