//! Command-line tool for checking a Blackbird matrix before adding it.
//!
//! Usage:
//!   cargo run --bin blackbird-probe -- add 10.0.0.50 --input-name 1="Apple TV"
//!   cargo run --bin blackbird-probe -- status 10.0.0.50
//!   cargo run --bin blackbird-probe -- power 10.0.0.50 off
//!   cargo run --bin blackbird-probe -- route 10.0.0.50 --output 2 --input 5

use blackbird_bridge::device_info::{DEFAULT_PORT, MAX_INPUTS, MAX_OUTPUTS};
use blackbird_bridge::entities::{ActionOutcome, InputSelect, PowerSwitch};
use blackbird_bridge::integration::ConfigFlow;
use blackbird_bridge::matrix::MatrixController;
use blackbird_bridge::naming::NameMap;
use blackbird_bridge::transport::TcpConnector;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "blackbird-probe")]
#[command(about = "Probe a Monoprice Blackbird matrix and build its config entry")]
struct Cli {
    /// Per-command timeout in seconds
    #[arg(long, env = "BLACKBIRD_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a matrix and print the config entry for it as JSON
    Add {
        host: String,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Input display name, e.g. `--input-name 1="Apple TV"`
        #[arg(long = "input-name", value_parser = parse_input_name)]
        input_names: Vec<(u8, String)>,

        /// Output display name, e.g. `--output-name 2=Projector`
        #[arg(long = "output-name", value_parser = parse_output_name)]
        output_names: Vec<(u8, String)>,
    },
    /// Print power and routing of a matrix as JSON
    Status {
        host: String,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Switch a matrix on or off
    Power {
        host: String,

        #[arg(value_enum)]
        state: PowerState,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Show an input on an output
    Route {
        host: String,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=MAX_OUTPUTS as i64))]
        output: u8,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=MAX_INPUTS as i64))]
        input: u8,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PowerState {
    On,
    Off,
}

fn parse_input_name(arg: &str) -> Result<(u8, String), String> {
    parse_name(arg, MAX_INPUTS)
}

fn parse_output_name(arg: &str) -> Result<(u8, String), String> {
    parse_name(arg, MAX_OUTPUTS)
}

/// `N=NAME` with `N` in 1..=max.
fn parse_name(arg: &str, max: u8) -> Result<(u8, String), String> {
    let (number, name) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected N=NAME, got {:?}", arg))?;
    let number: u8 = number
        .trim()
        .parse()
        .map_err(|_| format!("{:?} is not a number", number))?;
    if !(1..=max).contains(&number) {
        return Err(format!("{} is outside 1..={}", number, max));
    }
    Ok((number, name.to_string()))
}

/// Print `done` on success, otherwise exit with status 1.
fn report(outcome: ActionOutcome, done: &str) {
    match outcome {
        ActionOutcome::Applied => println!("{}", done),
        ActionOutcome::Unavailable | ActionOutcome::Ignored => {
            eprintln!("Error: the matrix did not accept the command");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout.max(1));
    let connector = TcpConnector::new();

    match cli.command {
        Commands::Add {
            host,
            port,
            input_names,
            output_names,
        } => {
            println!("Probing {}:{}...", host, port);
            let mut flow = ConfigFlow::new(&connector, timeout, Vec::new());
            let device = match flow.step_user(&host, port).await {
                Ok(device) => device,
                Err(e) => {
                    eprintln!("Error ({}): {}", e.form_key(), e);
                    std::process::exit(1);
                }
            };
            println!("Found {}", device.model);

            let inputs: BTreeMap<u8, String> = input_names.into_iter().collect();
            let outputs: BTreeMap<u8, String> = output_names.into_iter().collect();
            let entry = flow.step_names(device, &inputs, &outputs);
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Commands::Status { host, port } => {
            let controller = MatrixController::connect(&connector, &host, port, timeout).await?;
            let snapshot = controller.query_state().await;
            controller.disconnect().await;
            println!("{}", serde_json::to_string_pretty(&snapshot?)?);
        }
        Commands::Power { host, state, port } => {
            let controller =
                Arc::new(MatrixController::connect(&connector, &host, port, timeout).await?);
            let switch = PowerSwitch::new(controller.clone());
            let outcome = match state {
                PowerState::On => switch.turn_on().await,
                PowerState::Off => switch.turn_off().await,
            };
            controller.disconnect().await;
            report(outcome, &format!("{} powered {:?}", host, state));
        }
        Commands::Route {
            host,
            output,
            input,
            port,
        } => {
            let controller =
                Arc::new(MatrixController::connect(&connector, &host, port, timeout).await?);
            let names = Arc::new(NameMap::default());
            let select = InputSelect::new(controller.clone(), output, names.clone());
            let outcome = select.select(&names.input_name(input)).await;
            controller.disconnect().await;
            report(
                outcome,
                &format!("{} output {} shows input {}", host, output, input),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name() {
        assert_eq!(
            parse_input_name("1=Apple TV"),
            Ok((1, "Apple TV".to_string()))
        );
        assert_eq!(parse_output_name(" 8 =x=y"), Ok((8, "x=y".to_string())));
        assert!(parse_input_name("9=Nope").is_err());
        assert!(parse_input_name("Apple TV").is_err());
        assert!(parse_input_name("one=Apple TV").is_err());
    }

    #[test]
    fn test_cli_parses_repeated_names() {
        let cli = Cli::try_parse_from([
            "blackbird-probe",
            "add",
            "10.0.0.50",
            "--input-name",
            "1=Apple TV",
            "--input-name",
            "2=Xbox",
            "--output-name",
            "3=Projector",
        ])
        .unwrap();
        match cli.command {
            Commands::Add {
                host,
                port,
                input_names,
                output_names,
            } => {
                assert_eq!(host, "10.0.0.50");
                assert_eq!(port, 4001);
                assert_eq!(input_names.len(), 2);
                assert_eq!(output_names, vec![(3, "Projector".to_string())]);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_cli_parses_actions() {
        let cli = Cli::try_parse_from(["blackbird-probe", "power", "10.0.0.50", "off"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Power {
                state: PowerState::Off,
                ..
            }
        ));

        let cli = Cli::try_parse_from([
            "blackbird-probe",
            "route",
            "10.0.0.50",
            "--output",
            "2",
            "--input",
            "5",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Route {
                output: 2,
                input: 5,
                ..
            }
        ));

        assert!(
            Cli::try_parse_from(["blackbird-probe", "route", "h", "--output", "9", "--input", "1"])
                .is_err()
        );
    }
}
