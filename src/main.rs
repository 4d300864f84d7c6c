mod backends;
mod cli;
mod config;
mod detect;
mod dispatcher;
mod doh;
mod error;
mod http_client;
mod pap;
mod ratelimit;
mod render;
mod resolver;
mod retry;
mod service;
mod version;
mod worker;

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use backends::apex::ApexService;
use backends::crtsh::CrtShService;
use backends::cymru::CymruService;
use backends::detect_backend::DetectService;
use backends::dns::DnsService;
use backends::identify::{IdentifyInput, IdentifyService};
use backends::pgp::PgpService;
use backends::quad9::Quad9Service;
use backends::threatminer::ThreatMinerService;
use cli::{AggregateCommand, Cli, Command, IdentifyArgs, InputArgs, ServiceCommand, UtilityCommand};
use config::{RawConfig, ResolvedConfig};
use detect::{DetectionEngine, PatternStore};
use dispatcher::{dispatch, DispatchError, DispatchOutcome};
use http_client::{HttpClientConfig, HttpClientFactory};
use resolver::ResolverFactory;
use service::Service;

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	let config_dir = config::config_dir().ok_or_else(|| anyhow!("could not determine a config directory for this platform"))?;
	let raw = RawConfig {
		pap_limit: cli.pap_limit,
		output: cli.output,
		concurrency: cli.concurrency,
		proxy: cli.proxy.clone(),
		user_agent: cli.user_agent.clone(),
		tls_fingerprint: cli.tls_fingerprint.clone(),
		patterns_file: cli.patterns_file.clone(),
		defang: cli.defang_override(),
		verbose: Some(cli.verbose),
	};
	let cfg = config::resolve(raw, &config_dir)?;

	match cli.command {
		Command::Utility(UtilityCommand::Version) => {
			println!("{}", version::BuildInfo::new());
			return Ok(());
		},
		Command::Utility(UtilityCommand::Services) => {
			for name in ["dns", "cymru", "crtsh", "threatminer", "pgp", "quad9", "detect", "identify", "apex"] {
				println!("{name}");
			}
			return Ok(());
		},
		Command::Utility(UtilityCommand::Download { url }) => {
			let dest = config_dir.join("detect-downloaded.yaml");
			PatternStore::download(&url, &dest).await?;
			println!("wrote {}", dest.display());
			return Ok(());
		},
		Command::Services(service_cmd) => run_service(service_cmd, &cfg, &config_dir).await,
		Command::Aggregate(AggregateCommand::Apex(args)) => run_apex(args, &cfg, &config_dir).await,
	}
}

fn init_logging(verbose: bool) {
	let default_filter = if verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();
}

fn http_client_config(cfg: &ResolvedConfig) -> HttpClientConfig {
	HttpClientConfig {
		proxy: cfg.proxy.clone(),
		user_agent: cfg.user_agent.clone(),
		tls_fingerprint: cfg.tls_fingerprint.clone(),
		debug: cfg.verbose,
	}
}

fn detection_engine(cfg: &ResolvedConfig, config_dir: &std::path::Path) -> Result<DetectionEngine> {
	let patterns = PatternStore::load(cfg.patterns_file.as_deref(), config_dir)?;
	Ok(DetectionEngine::new(patterns))
}

async fn run_service(command: ServiceCommand, cfg: &ResolvedConfig, config_dir: &std::path::Path) -> Result<()> {
	let cancel = CancellationToken::new();

	match command {
		ServiceCommand::Dns(args) => {
			let resolver = ResolverFactory::build(cfg.proxy.as_deref());
			let svc = DnsService { resolver };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Cymru(args) => {
			let resolver = ResolverFactory::build(cfg.proxy.as_deref());
			let svc = CymruService { resolver };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Crtsh(args) => {
			let http = HttpClientFactory::build(&http_client_config(cfg), 1.0, 2)?;
			let svc = CrtShService { http };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Threatminer(args) => {
			let http = HttpClientFactory::build(&http_client_config(cfg), 1.0, 2)?;
			let svc = ThreatMinerService { http };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Pgp(args) => {
			let http = HttpClientFactory::build(&http_client_config(cfg), 1.0, 2)?;
			let svc = PgpService { http };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Quad9(args) => {
			let http = HttpClientFactory::build(&http_client_config(cfg), 5.0, 5)?;
			let svc = Quad9Service { http };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Detect(args) => {
			let resolver = ResolverFactory::build(cfg.proxy.as_deref());
			let engine = detection_engine(cfg, config_dir)?;
			let svc = DetectService { resolver, engine };
			run_and_render(&svc, args.inputs, cfg, &cancel).await
		},
		ServiceCommand::Identify(args) => run_identify(args, cfg, config_dir, &cancel).await,
	}
}

async fn run_apex(args: InputArgs, cfg: &ResolvedConfig, config_dir: &std::path::Path) -> Result<()> {
	let cancel = CancellationToken::new();
	let http = HttpClientFactory::build(&http_client_config(cfg), 5.0, 10)?;
	let engine = detection_engine(cfg, config_dir)?;
	let svc = ApexService { http, engine, pap_limit: cfg.pap_limit };
	run_and_render(&svc, args.inputs, cfg, &cancel).await
}

async fn run_identify(
	args: IdentifyArgs,
	cfg: &ResolvedConfig,
	config_dir: &std::path::Path,
	cancel: &CancellationToken,
) -> Result<()> {
	let engine = detection_engine(cfg, config_dir)?;
	let svc = IdentifyService { engine };
	let wire = IdentifyInput { cname: args.cname, mx: args.mx, ns: args.ns, txt: args.txt }.to_wire();
	run_and_render(&svc, vec![wire], cfg, cancel).await
}

async fn run_and_render(svc: &dyn Service, inputs: Vec<String>, cfg: &ResolvedConfig, cancel: &CancellationToken) -> Result<()> {
	match dispatch(cfg, svc, inputs, cancel).await {
		Ok(DispatchOutcome::Output(output)) => {
			render::write(&output, cfg.output, cfg.defang)?;
			Ok(())
		},
		Ok(DispatchOutcome::NoData) => Ok(()),
		Err(DispatchError::PapBlocked { service, required, limit }) => {
			eprintln!("{service}: requires pap >= {required}, configured limit is {limit}");
			std::process::exit(1);
		},
		Err(err) => {
			eprintln!("{err}");
			std::process::exit(1);
		},
	}
}
