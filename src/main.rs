use std::sync::Arc;

use clap::{Parser, Subcommand};
use openfinance_resource_core::demo_ports::{EchoInstitutionClient, InMemoryRepository, StaticDirectoryClient};
use openfinance_resource_core::ports::{InstitutionClientPort, ResilienceConfig, ResilientInstitutionClient};
use openfinance_resource_core::{config, Core};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "ofrc", about = "Open Finance resource core: discovery, sync, validation and monitoring")]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
	/// Run the core against an in-memory demo repository and institution (default)
	Run {
		/// Organization id seeded demo resources belong to
		#[arg(long, default_value = "demo-org")]
		organization_id: String,
		/// Number of demo resources/jobs to seed
		#[arg(long, default_value_t = 10)]
		seed_count: usize,
	},
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	let Commands::Run { organization_id, seed_count } = cli.command.unwrap_or(Commands::Run {
		organization_id: "demo-org".to_string(),
		seed_count: 10,
	});

	let obs_state = match openfinance_resource_core::observability::init_observability().await {
		Ok(s) => s,
		Err(e) => {
			eprintln!("warning: failed to initialize observability: {e}");
			openfinance_resource_core::observability::ObservabilityState::default()
		}
	};
	let _ = obs_state;

	let core_config = match config::load() {
		Ok(c) => c,
		Err(e) => {
			eprintln!("warning: failed to load config, using defaults: {e}");
			config::CoreConfig::default()
		}
	};

	let repository = Arc::new(InMemoryRepository::seeded(&organization_id, seed_count));
	let institution_client: Arc<dyn InstitutionClientPort> =
		Arc::new(ResilientInstitutionClient::new(EchoInstitutionClient, ResilienceConfig::default()));
	let directory_client = Arc::new(StaticDirectoryClient::new(&organization_id, seed_count));

	let core = Core::new(core_config, repository, institution_client, directory_client, vec![]);

	let token = CancellationToken::new();
	core.start(token.clone());

	println!("core running; press ctrl-c to stop");
	let _ = tokio::signal::ctrl_c().await;
	println!("shutting down");
	token.cancel();

	// Give the job worker its graceful-stop window before the process exits.
	tokio::time::sleep(std::time::Duration::from_secs(1)).await;
}
