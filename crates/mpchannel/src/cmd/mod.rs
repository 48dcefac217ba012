use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use mpchannel_frame::{Message, MessageKind};
use mpchannel_transport::{default_path, ChannelConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod encode;
pub mod listen;
pub mod send;
pub mod version;
pub mod worker;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the worker: execute power commands received on the channel.
    Worker(WorkerArgs),
    /// Send one power command to the worker.
    Send(SendArgs),
    /// Act as the worker end and print received commands without executing them.
    Listen(ListenArgs),
    /// Print the wire frame for a power command.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Worker(args) => worker::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Power action named on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PowerAction {
    Shutdown,
    Reboot,
    Sleep,
}

impl PowerAction {
    pub fn message(self, timeout: u64) -> Message {
        let kind = match self {
            PowerAction::Shutdown => MessageKind::Shutdown,
            PowerAction::Reboot => MessageKind::Reboot,
            PowerAction::Sleep => MessageKind::Sleep,
        };
        Message::new(kind, timeout)
    }
}

/// Channel address and polling, shared by every channel command.
#[derive(Args, Debug)]
pub struct ChannelArgs {
    /// FIFO path (Unix) or pipe name (Windows). Default: platform default.
    #[arg(long, env = "MPCHANNEL_PATH", value_name = "PATH")]
    pub path: Option<PathBuf>,
    /// Idle poll interval (e.g. 1s, 250ms).
    #[arg(long, env = "MPCHANNEL_POLL", default_value = "1s", value_name = "DURATION")]
    pub poll: String,
}

impl ChannelArgs {
    pub fn config(&self) -> CliResult<ChannelConfig> {
        let path = self.path.clone().unwrap_or_else(default_path);
        Ok(ChannelConfig::at(path).with_poll_interval(parse_duration(&self.poll)?))
    }
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Log received commands instead of executing them.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Action to request.
    #[arg(value_enum)]
    pub action: PowerAction,
    /// Seconds the worker should wait before acting.
    #[arg(long, short = 't', default_value_t = 0)]
    pub timeout: u64,
    #[command(flatten)]
    pub channel: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Exit after receiving N commands.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Action to encode.
    #[arg(value_enum)]
    pub action: PowerAction,
    /// Timeout field of the encoded message.
    #[arg(long, short = 't', default_value_t = 0)]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn channel_args_build_config() {
        let args = ChannelArgs {
            path: Some(PathBuf::from("/tmp/custom.pipe")),
            poll: "250ms".to_string(),
        };
        let config = args.config().unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/custom.pipe"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn channel_args_default_to_platform_path() {
        let args = ChannelArgs {
            path: None,
            poll: "1s".to_string(),
        };
        assert_eq!(args.config().unwrap().path, default_path());
    }

    #[test]
    fn action_builds_message() {
        assert_eq!(PowerAction::Reboot.message(4), Message::reboot(4));
        assert_eq!(PowerAction::Sleep.message(0), Message::sleep(0));
    }
}
