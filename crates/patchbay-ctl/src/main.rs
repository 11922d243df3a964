//! patchbay-ctl - Command-line control surface for the patchbay
//!
//! Composition root: constructs the preset store and the bank channel and
//! exposes their operations as subcommands. `recall` is the one
//! cross-component step, resolving a preset to its bank and sending that
//! bank's Program Change.
//!
//! Preset records live under `~/.config/patchbay/presets/` and MIDI settings
//! in `~/.config/patchbay/config.yaml` unless overridden with `--presets` /
//! `--config`.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};

use patchbay_core::{
    default_presets_dir, DirectoryStorage, NewPreset, Preset, PresetId, PresetPatch, PresetStore,
    RoutingMatrix,
};
use patchbay_midi::{default_config_path, BankChannel, MidiTransport, SystemTransport};

#[derive(Parser)]
#[command(name = "patchbay-ctl")]
#[command(about = "Control an MB-76 class patchbay: presets, banks, MIDI", long_about = None)]
struct Cli {
    /// Config document path (default: ~/.config/patchbay/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Preset record directory (default: ~/.config/patchbay/presets)
    #[arg(long, global = true)]
    presets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all presets
    List,

    /// Show one preset in full, including its routing matrix
    Show {
        /// Preset id
        id: String,
    },

    /// Create a preset
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        /// Device bank to recall (1-32)
        #[arg(long)]
        bank: u8,

        /// Free-text description
        #[arg(long, default_value = "")]
        description: String,

        /// Route spec `INPUT=OUT1,OUT2,...` (repeatable)
        #[arg(long = "route")]
        routes: Vec<String>,
    },

    /// Update fields of a preset (unsupplied fields stay unchanged)
    Update {
        /// Preset id
        id: String,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New device bank (1-32)
        #[arg(long)]
        bank: Option<u8>,

        /// New description
        #[arg(long)]
        description: Option<String>,

        /// Replace the routing matrix with these route specs (repeatable)
        #[arg(long = "route")]
        routes: Vec<String>,

        /// Clear the routing matrix
        #[arg(long, conflicts_with = "routes")]
        clear_routes: bool,
    },

    /// Delete a preset
    Delete {
        /// Preset id
        id: String,
    },

    /// Recall a preset's bank on the device
    Recall {
        /// Preset id
        id: String,
    },

    /// Recall a raw bank number (1-32)
    Bank {
        /// Bank number
        number: u8,
    },

    /// Send a raw Program Change (0-127)
    Program {
        /// Program number
        number: u8,
    },

    /// List available MIDI output devices
    Devices,

    /// Select the MIDI output device
    Device {
        /// Output device name, as shown by `devices`
        name: String,
    },

    /// Select the MIDI channel (1-16)
    Channel {
        /// Channel number
        number: u8,
    },

    /// Show channel status and preset count
    Status,

    /// Seed one default preset per bank into an empty store
    Seed,
}

fn main() -> anyhow::Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let presets_dir = cli.presets.clone().unwrap_or_else(default_presets_dir);

    let storage = DirectoryStorage::new(&presets_dir)
        .with_context(|| format!("Failed to open preset directory {:?}", presets_dir))?;
    let mut store = PresetStore::open(Box::new(storage))
        .with_context(|| format!("Failed to load presets from {:?}", presets_dir))?;

    // No MIDI backend is not fatal: the channel runs in mock mode and
    // everything except real sends keeps working.
    let transport: Option<Box<dyn MidiTransport>> = match SystemTransport::spawn() {
        Ok(t) => Some(Box::new(t)),
        Err(e) => {
            log::warn!("No usable MIDI backend ({}); MIDI commands run in mock mode", e);
            None
        }
    };
    let mut channel = BankChannel::new(transport, config_path);

    match cli.command {
        Commands::List => {
            let summaries = store.summary();
            if summaries.is_empty() {
                println!("No presets. Create one with `create` or seed defaults with `seed`.");
            } else {
                println!(
                    "{:<36}  {:>4}  {:<24}  {:>6}  {}",
                    "ID", "BANK", "NAME", "ROUTES", "UPDATED"
                );
                for s in summaries {
                    println!(
                        "{:<36}  {:>4}  {:<24}  {:>6}  {}",
                        s.id,
                        s.bank_number,
                        s.name,
                        s.route_count,
                        s.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        Commands::Show { id } => {
            let id = parse_preset_id(&id)?;
            let preset = store
                .get(id)
                .ok_or_else(|| anyhow!("No preset with id {}", id))?;
            print_preset(preset);
        }

        Commands::Create {
            name,
            bank,
            description,
            routes,
        } => {
            let preset = store.create(NewPreset {
                name,
                bank_number: bank,
                routing_matrix: parse_routes(&routes)?,
                description,
            })?;
            println!(
                "Created '{}' on bank {} (id {})",
                preset.name, preset.bank_number, preset.id
            );
        }

        Commands::Update {
            id,
            name,
            bank,
            description,
            routes,
            clear_routes,
        } => {
            let id = parse_preset_id(&id)?;
            let routing_matrix = if clear_routes {
                Some(RoutingMatrix::new())
            } else if routes.is_empty() {
                None
            } else {
                Some(parse_routes(&routes)?)
            };

            let preset = store.update(
                id,
                PresetPatch {
                    name,
                    bank_number: bank,
                    routing_matrix,
                    description,
                },
            )?;
            println!("Updated '{}' (bank {})", preset.name, preset.bank_number);
        }

        Commands::Delete { id } => {
            let id = parse_preset_id(&id)?;
            if store.delete(id)? {
                println!("Deleted {}", id);
            } else {
                println!("No preset with id {}", id);
            }
        }

        Commands::Recall { id } => {
            let id = parse_preset_id(&id)?;
            let preset = store
                .get(id)
                .ok_or_else(|| anyhow!("No preset with id {}", id))?;
            channel.recall_bank(preset.bank_number)?;
            println!("Recalled '{}' (bank {})", preset.name, preset.bank_number);
        }

        Commands::Bank { number } => {
            channel.recall_bank(number)?;
            match store.get_by_bank(number) {
                Some(preset) => println!("Recalled bank {} ('{}')", number, preset.name),
                None => println!("Recalled bank {} (no preset assigned)", number),
            }
        }

        Commands::Program { number } => {
            channel.send_program_change(number)?;
            println!("Sent Program Change {}", number);
        }

        Commands::Devices => {
            let status = channel.status();
            if status.available_devices.is_empty() {
                println!("No MIDI outputs available.");
            } else {
                for name in &status.available_devices {
                    let marker = if status.device.as_deref() == Some(name.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{} {}", marker, name);
                }
            }
        }

        Commands::Device { name } => {
            channel.select_device(&name)?;
            println!("Selected MIDI output '{}'", name);
        }

        Commands::Channel { number } => {
            channel.select_channel(number)?;
            println!("Using MIDI channel {}", number);
        }

        Commands::Status => {
            let status = channel.status();
            let transport = if status.transport_available {
                "available"
            } else {
                "unavailable (mock mode)"
            };
            println!("{:<10} {}", "Transport:", transport);
            println!(
                "{:<10} {}",
                "Connected:",
                if status.connected { "yes" } else { "no" }
            );
            println!(
                "{:<10} {}",
                "Device:",
                status.device.as_deref().unwrap_or("(none)")
            );
            println!("{:<10} {}", "Channel:", status.channel);
            if status.available_devices.is_empty() {
                println!("{:<10} (none)", "Outputs:");
            } else {
                println!("{:<10} {}", "Outputs:", status.available_devices.join(", "));
            }
            println!("{:<10} {}", "Presets:", store.len());
        }

        Commands::Seed => {
            let created = store.create_defaults()?;
            if created == 0 {
                println!("Store already has presets; nothing seeded.");
            } else {
                println!("Seeded {} default presets (banks 1-32).", created);
            }
        }
    }

    Ok(())
}

/// Print a preset's full field set, routing matrix included
fn print_preset(preset: &Preset) {
    println!("{:<13} {}", "Name:", preset.name);
    println!("{:<13} {}", "Id:", preset.id);
    println!("{:<13} {}", "Bank:", preset.bank_number);
    if !preset.description.is_empty() {
        println!("{:<13} {}", "Description:", preset.description);
    }
    println!(
        "{:<13} {}",
        "Created:",
        preset.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "{:<13} {}",
        "Updated:",
        preset.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if preset.routing_matrix.is_empty() {
        println!("{:<13} (none)", "Routes:");
    } else {
        println!("Routes:");
        for (input, outputs) in &preset.routing_matrix {
            let outs: Vec<String> = outputs.iter().map(u32::to_string).collect();
            println!("  in {:>3} -> {}", input, outs.join(", "));
        }
    }
}

fn parse_preset_id(s: &str) -> anyhow::Result<PresetId> {
    PresetId::parse(s).map_err(|_| anyhow!("Invalid preset id: '{}'", s))
}

/// Parse repeated `--route INPUT=OUT1,OUT2,...` flags into a routing matrix
fn parse_routes(specs: &[String]) -> anyhow::Result<RoutingMatrix> {
    let mut matrix = RoutingMatrix::new();
    for spec in specs {
        let (input, outputs) = parse_route_spec(spec)?;
        matrix.insert(input, outputs);
    }
    Ok(matrix)
}

/// Parse one `INPUT=OUT1,OUT2,...` route spec.
///
/// The input must be an integer (kept in its string form, as recorded in the
/// routing matrix); outputs may be empty for an input routed nowhere.
fn parse_route_spec(spec: &str) -> anyhow::Result<(String, Vec<u32>)> {
    let (input, outputs) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Route '{}' is not of the form INPUT=OUT1,OUT2,...", spec))?;

    let input = input.trim();
    if input.parse::<u32>().is_err() {
        bail!("Route '{}' input must be an integer", spec);
    }

    let mut parsed = Vec::new();
    for out in outputs.split(',') {
        let out = out.trim();
        if out.is_empty() {
            continue;
        }
        parsed.push(
            out.parse::<u32>()
                .map_err(|_| anyhow!("Route '{}' output '{}' is not an integer", spec, out))?,
        );
    }
    Ok((input.to_string(), parsed))
}
