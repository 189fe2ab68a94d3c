//! CLI command implementations

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use vigil_core::{hash_accumulator, operation_id_from_label, DeviceId, PolicyConfig, SystemClock};
use vigil_registry::RegistryExport;

use crate::scenario::{Scenario, ScenarioReport, ScenarioRunner};

/// Vigil - Governed accumulator registry tools
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Simulate, replay and audit a governed accumulator registry")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a JSON scenario against fresh state machines
    Simulate {
        /// Scenario file
        #[arg(long)]
        scenario: PathBuf,

        /// Policy file (JSON or TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the resulting registry export here
        #[arg(long)]
        export: Option<PathBuf>,

        /// Exit with an error if any step was rejected
        #[arg(long)]
        strict: bool,

        /// Start from the system clock instead of the scenario's start time
        #[arg(long)]
        wall_clock: bool,
    },

    /// Rebuild state from an export's event log and check its snapshot
    Replay {
        /// Export file written by `simulate --export`
        #[arg(long)]
        export: PathBuf,
    },

    /// Print the effective policy
    Policy {
        /// Policy file (JSON or TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Digest of an accumulator value
    Hash {
        /// Value (hex encoded)
        #[arg(long)]
        value: String,
    },

    /// Registry key of a device identifier
    DeviceKey {
        /// External device identifier
        #[arg(long)]
        id: String,
    },

    /// Operation id derived from a label
    OperationId {
        /// Human readable label, e.g. "revoke-batch-2024-03"
        #[arg(long)]
        label: String,
    },
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Simulate {
            scenario,
            config,
            export,
            strict,
            wall_clock,
        } => {
            let policy = load_policy(config.as_deref())?;
            let report = simulate(&scenario, policy, export.as_deref(), wall_clock)?;
            print_report(&report);

            if strict && report.rejected() > 0 {
                bail!("{} step(s) rejected", report.rejected());
            }
        }

        Commands::Replay { export } => {
            let loaded = RegistryExport::load(&export)
                .with_context(|| format!("Failed to read export {:?}", export))?;
            let replayed = loaded.verify().context("Export does not replay cleanly")?;

            println!("\n=== Replay ===\n");
            println!("Events:        {}", loaded.events.len());
            if let Some(at) = chrono::DateTime::from_timestamp(loaded.exported_at as i64, 0) {
                println!("Exported at:   {}", at.to_rfc3339());
            }
            println!("Version:       {}", replayed.version().unwrap_or_default());
            if let Some(hash) = replayed.hash() {
                println!("Hash:          0x{}", hash.to_hex());
            }
            println!("Paused:        {}", replayed.paused);
            if let Some(group) = replayed.authorized_group {
                println!("Group:         {}", group);
            }
            let (active, revoked) = replayed.devices.count_by_status();
            println!("Devices:       {} active, {} revoked", active, revoked);
            println!("\nSnapshot matches the event log.");
        }

        Commands::Policy { config } => {
            let policy = load_policy(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&policy)?);
        }

        Commands::Hash { value } => {
            let bytes = hex::decode(value.trim_start_matches("0x")).context("Invalid hex value")?;
            if bytes.is_empty() {
                bail!("Accumulator value is empty");
            }
            println!("0x{}", hash_accumulator(&bytes).to_hex());
        }

        Commands::DeviceKey { id } => {
            println!("0x{}", DeviceId::from(id.as_str()).key().to_hex());
        }

        Commands::OperationId { label } => {
            println!("0x{}", operation_id_from_label(&label).to_hex());
        }
    }

    Ok(())
}

fn load_policy(path: Option<&Path>) -> Result<PolicyConfig> {
    match path {
        Some(path) => {
            let policy = PolicyConfig::load(path)
                .with_context(|| format!("Failed to load policy {:?}", path))?;
            info!("Loaded policy from {:?}", path);
            Ok(policy)
        }
        None => Ok(PolicyConfig::default()),
    }
}

/// Load and run a scenario, optionally exporting the final registry
///
/// With `wall_clock` the run starts at the system time; steps still advance
/// a manual clock from there.
pub fn simulate(
    scenario_path: &Path,
    policy: PolicyConfig,
    export: Option<&Path>,
    wall_clock: bool,
) -> Result<ScenarioReport> {
    let mut scenario = Scenario::load(scenario_path)
        .with_context(|| format!("Failed to read scenario {:?}", scenario_path))?;
    if wall_clock {
        scenario = scenario.anchored_at(&SystemClock);
        info!("Anchored scenario at wall clock {}", scenario.start_secs);
    }
    info!(
        "Running {:?}: {} steps",
        scenario_path,
        scenario.steps.len()
    );

    let runner = ScenarioRunner::new(&scenario, policy).context("Scenario setup failed")?;
    let (report, registry) = runner.run(&scenario.steps);

    if let Some(path) = export {
        let exported_at = registry
            .events()
            .last()
            .map(|r| r.timestamp)
            .unwrap_or_default();
        RegistryExport::from_registry(&registry, exported_at).save(path)?;
        info!("Export written to {:?}", path);
    }

    for outcome in report.outcomes.iter().filter(|o| !o.ok) {
        warn!(
            "Step {} ({}) rejected: {}",
            outcome.index, outcome.action, outcome.detail
        );
    }
    Ok(report)
}

fn print_report(report: &ScenarioReport) {
    println!("\n=== Scenario ===\n");
    for outcome in &report.outcomes {
        let status = match &outcome.kind {
            None => "ok".to_string(),
            Some(kind) => format!("rejected ({})", kind),
        };
        println!(
            "{:>3} {:<15} {:<20} {}",
            outcome.index, outcome.action, status, outcome.detail
        );
    }

    let s = &report.snapshot;
    println!("\n=== Security Snapshot ===\n");
    println!("Authorized group: {}", s.authorized_group);
    println!("Threshold:        {} of {}", s.threshold, s.member_count);
    println!("Paused:           {}", s.paused);
    println!("Version:          {}", s.version);
    println!("Hash:             0x{}", s.current_hash.to_hex());
    println!("Last update:      {}", s.last_update);
    println!(
        "Devices:          {} active, {} revoked",
        s.active_devices, s.revoked_devices
    );
    println!("Governance:       {}", s.governance);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_core::Clock;

    const LIFECYCLE: &str = include_str!("../scenarios/lifecycle.json");

    #[test]
    fn test_simulate_writes_verifiable_export() {
        let temp = TempDir::new().unwrap();
        let scenario = temp.path().join("scenario.json");
        let export = temp.path().join("export.json");
        std::fs::write(&scenario, LIFECYCLE).unwrap();

        let report = simulate(&scenario, PolicyConfig::default(), Some(&export), false).unwrap();
        let loaded = RegistryExport::load(&export).unwrap();
        assert_eq!(loaded.snapshot, report.snapshot);

        let replayed = loaded.verify().unwrap();
        assert_eq!(replayed.version(), Some(report.snapshot.version));
    }

    #[test]
    fn test_policy_file_is_applied() {
        let temp = TempDir::new().unwrap();
        let scenario = temp.path().join("scenario.json");
        std::fs::write(&scenario, LIFECYCLE).unwrap();

        // A longer rate limit turns the first device registration away
        let policy = PolicyConfig {
            min_update_delay: 2,
            ..Default::default()
        };
        let config = temp.path().join("policy.toml");
        policy.save(&config).unwrap();

        let loaded = load_policy(Some(&config)).unwrap();
        assert_eq!(loaded.min_update_delay, 2);

        let strict = simulate(&scenario, loaded, None, false).unwrap();
        let relaxed = simulate(&scenario, PolicyConfig::default(), None, false).unwrap();
        assert!(strict.rejected() > relaxed.rejected());
    }

    #[test]
    fn test_wall_clock_run_exports_current_time() {
        let temp = TempDir::new().unwrap();
        let scenario = temp.path().join("scenario.json");
        let export = temp.path().join("export.json");
        std::fs::write(&scenario, LIFECYCLE).unwrap();

        let before = SystemClock.now();
        let report = simulate(&scenario, PolicyConfig::default(), Some(&export), true).unwrap();
        let scripted = simulate(&scenario, PolicyConfig::default(), None, false).unwrap();
        assert_eq!(report.rejected(), scripted.rejected());

        let loaded = RegistryExport::load(&export).unwrap();
        assert!(loaded.exported_at >= before);
        loaded.verify().unwrap();
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["vigil", "hash", "--value", "0xabcd"]).unwrap();
        assert!(matches!(cli.command, Commands::Hash { .. }));

        let cli = Cli::try_parse_from([
            "vigil",
            "simulate",
            "--scenario",
            "s.json",
            "--strict",
            "--wall-clock",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Simulate {
                strict: true,
                wall_clock: true,
                ..
            }
        ));
    }
}
