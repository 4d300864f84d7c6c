use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::OutputFormat;
use crate::pap::PapLevel;

/// Thin CLI surface: owns no business logic beyond building a
/// `ResolvedConfig` and handing off to `dispatch`. Alias expansion,
/// shell-completion generation, and a full flag validator are out of
/// scope (spec.md §1).
#[derive(Debug, Parser)]
#[command(name = "trident", version, about = "Keyless OSINT reconnaissance CLI")]
pub struct Cli {
	#[arg(long, global = true)]
	pub pap_limit: Option<PapLevel>,

	#[arg(long, global = true)]
	pub output: Option<OutputFormat>,

	#[arg(long, global = true)]
	pub concurrency: Option<usize>,

	#[arg(long, global = true)]
	pub proxy: Option<String>,

	#[arg(long, global = true)]
	pub user_agent: Option<String>,

	#[arg(long, global = true)]
	pub tls_fingerprint: Option<String>,

	#[arg(long, global = true)]
	pub patterns_file: Option<PathBuf>,

	#[arg(long, global = true, action = ArgAction::SetTrue, conflicts_with = "no_defang")]
	pub defang: bool,

	#[arg(long, global = true, action = ArgAction::SetTrue)]
	pub no_defang: bool,

	#[arg(short, long, global = true, action = ArgAction::SetTrue)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Per-backend lookups (dns, cymru, crtsh, threatminer, pgp, quad9, detect, identify).
	#[command(subcommand)]
	Services(ServiceCommand),
	/// Aggregate (multi-backend) recon.
	#[command(subcommand)]
	Aggregate(AggregateCommand),
	/// Version, backend listing, and pattern-file refresh.
	#[command(subcommand)]
	Utility(UtilityCommand),
}

#[derive(Debug, Subcommand)]
pub enum ServiceCommand {
	Dns(InputArgs),
	Cymru(InputArgs),
	Crtsh(InputArgs),
	Threatminer(InputArgs),
	Pgp(InputArgs),
	Quad9(InputArgs),
	Detect(InputArgs),
	Identify(IdentifyArgs),
}

#[derive(Debug, Subcommand)]
pub enum AggregateCommand {
	Apex(InputArgs),
}

#[derive(Debug, Subcommand)]
pub enum UtilityCommand {
	/// Print build/version information.
	Version,
	/// List the available backend services.
	Services,
	/// Refresh the on-disk pattern file from a URL.
	Download { url: String },
}

#[derive(Debug, Args)]
pub struct InputArgs {
	/// Domains, IPs, or other backend-specific inputs. Reads stdin (one per line) when omitted.
	pub inputs: Vec<String>,
}

#[derive(Debug, Args, Default)]
pub struct IdentifyArgs {
	#[arg(long = "cname")]
	pub cname: Vec<String>,
	#[arg(long = "mx")]
	pub mx: Vec<String>,
	#[arg(long = "ns")]
	pub ns: Vec<String>,
	#[arg(long = "txt")]
	pub txt: Vec<String>,
}

impl Cli {
	pub fn defang_override(&self) -> Option<bool> {
		if self.defang {
			Some(true)
		} else if self.no_defang {
			Some(false)
		} else {
			None
		}
	}
}
