/*!
# HMI Bridge Application

Bridges an instrument's UART telemetry feed to a serial HMI touch panel.

## Features

- Demultiplexes telemetry frames and panel button frames from one port
- Tracks current, power and the session maximum power
- Pushes display updates to the panel on a fixed interval
- Runs without a panel when the HMI port cannot be opened
- Live mode prints every decoded frame as a JSON line on stdout

## Usage

### From a configuration file
```bash
hmi-bridge --config hmi-bridge.toml
```

### Explicit ports
```bash
hmi-bridge run --telemetry-port /dev/ttyUSB0 --hmi-port /dev/ttyUSB1 --live
```

### Without a display
```bash
hmi-bridge run --no-hmi
```

Logs go to stderr; set `RUST_LOG=debug` for hex dumps of every frame.
*/

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bridge;
mod config;
mod serial;

use bridge::HmiBridge;
use config::BridgeConfig;

#[derive(Parser)]
#[command(name = "hmi-bridge")]
#[command(about = "UART bridge between instrument telemetry and an HMI touch panel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "hmi-bridge.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge, overriding ports from the configuration file
    Run(RunArgs),

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "hmi-bridge.toml")]
        output: PathBuf,
    },
}

/// Port settings given on the command line. Anything left out keeps the
/// value from the configuration file.
#[derive(Args, Debug)]
struct RunArgs {
    /// Serial device carrying telemetry
    #[arg(long)]
    telemetry_port: Option<String>,

    #[arg(long)]
    telemetry_baud: Option<u32>,

    /// Serial device of the HMI panel
    #[arg(long, conflicts_with = "no_hmi")]
    hmi_port: Option<String>,

    #[arg(long)]
    hmi_baud: Option<u32>,

    /// Run without a display even if one is configured
    #[arg(long)]
    no_hmi: bool,

    /// Print decoded frames as JSON lines on stdout
    #[arg(long)]
    live: bool,
}

impl RunArgs {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(port) = self.telemetry_port {
            config.telemetry.port = port;
        }
        if let Some(baud) = self.telemetry_baud {
            config.telemetry.baud_rate = baud;
        }
        if self.no_hmi {
            config.hmi.port = None;
        } else if let Some(port) = self.hmi_port {
            config.hmi.port = Some(port);
        }
        if let Some(baud) = self.hmi_baud {
            config.hmi.baud_rate = baud;
        }
        if self.live {
            config.output.live = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stderr keeps stdout clean for live JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Some(Commands::Run(args)) => {
            let mut config = BridgeConfig::load_or_default(&cli.config)?;
            args.apply(&mut config);
            run_bridge(config)
        }

        Some(Commands::Config { output }) => generate_config_file(output),

        None => {
            let config = BridgeConfig::load_or_default(&cli.config)?;
            run_bridge(config)
        }
    }
}

/// Run the bridge until Ctrl+C
fn run_bridge(config: BridgeConfig) -> Result<()> {
    info!("🚀 Starting HMI bridge");
    info!("📡 Telemetry: {} @ {}", config.telemetry.port, config.telemetry.baud_rate);
    match config.hmi.port.as_deref() {
        Some(port) => info!("🖥️ HMI: {} @ {}", port, config.hmi.baud_rate),
        None => info!("🖥️ HMI: none"),
    }
    if config.output.live {
        info!("📺 Live output mode (JSON on stdout)");
    }

    let mut bridge = HmiBridge::new(config);

    let running = bridge.get_running_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        running.store(false, std::sync::atomic::Ordering::SeqCst);
    })?;

    bridge.start()
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = BridgeConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   hmi-bridge --config {}", output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["hmi-bridge", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Some(Commands::Run(args)) => args,
            _ => panic!("expected run subcommand"),
        }
    }

    fn file_config() -> BridgeConfig {
        let mut config = BridgeConfig::new();
        config.telemetry.port = "/dev/ttyS4".to_string();
        config.telemetry.baud_rate = 57600;
        config.hmi.port = Some("/dev/ttyS5".to_string());
        config.hmi.baud_rate = 115200;
        config
    }

    #[test]
    fn test_run_without_flags_keeps_file_ports() {
        let mut config = file_config();
        run_args(&[]).apply(&mut config);
        assert_eq!(config, file_config());
    }

    #[test]
    fn test_run_flags_override_only_what_is_given() {
        let mut config = file_config();
        let argv = [
            "--telemetry-port",
            "/dev/ttyACM0",
            "--hmi-baud",
            "9600",
            "--live",
        ];
        run_args(&argv).apply(&mut config);

        assert_eq!(config.telemetry.port, "/dev/ttyACM0");
        assert_eq!(config.telemetry.baud_rate, 57600);
        assert_eq!(config.hmi.port.as_deref(), Some("/dev/ttyS5"));
        assert_eq!(config.hmi.baud_rate, 9600);
        assert!(config.output.live);
    }

    #[test]
    fn test_no_hmi_flag_runs_blind() {
        let mut config = file_config();
        run_args(&["--no-hmi"]).apply(&mut config);
        assert_eq!(config.hmi.port, None);

        let result = Cli::try_parse_from([
            "hmi-bridge",
            "run",
            "--no-hmi",
            "--hmi-port",
            "/dev/ttyS5",
        ]);
        assert!(result.is_err());
    }
}
