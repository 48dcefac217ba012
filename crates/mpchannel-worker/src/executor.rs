//! Power control executors.
//!
//! The dispatch loop hands every received command to a [`PowerExecutor`].
//! [`CommandExecutor`] runs the operating system's own power tools;
//! [`LoggingExecutor`] only logs what it would do.

use std::fmt;
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mpchannel_frame::{Message, MessageKind};
use tracing::info;

use crate::error::ExecutorError;

/// Carries out power commands on the local machine.
///
/// `timeout` is the delay in seconds the controller asked for before the
/// action takes effect.
pub trait PowerExecutor {
    fn shutdown(&self, timeout: u64) -> Result<(), ExecutorError>;

    fn reboot(&self, timeout: u64) -> Result<(), ExecutorError>;

    fn sleep(&self, timeout: u64) -> Result<(), ExecutorError>;

    /// Route a message to the matching action.
    fn execute(&self, message: &Message) -> Result<(), ExecutorError> {
        match *message {
            Message::Shutdown { timeout } => self.shutdown(timeout),
            Message::Reboot { timeout } => self.reboot(timeout),
            Message::Sleep { timeout } => self.sleep(timeout),
        }
    }
}

impl<T: PowerExecutor + ?Sized> PowerExecutor for Box<T> {
    fn shutdown(&self, timeout: u64) -> Result<(), ExecutorError> {
        (**self).shutdown(timeout)
    }

    fn reboot(&self, timeout: u64) -> Result<(), ExecutorError> {
        (**self).reboot(timeout)
    }

    fn sleep(&self, timeout: u64) -> Result<(), ExecutorError> {
        (**self).sleep(timeout)
    }
}

impl<T: PowerExecutor + ?Sized> PowerExecutor for Arc<T> {
    fn shutdown(&self, timeout: u64) -> Result<(), ExecutorError> {
        (**self).shutdown(timeout)
    }

    fn reboot(&self, timeout: u64) -> Result<(), ExecutorError> {
        (**self).reboot(timeout)
    }

    fn sleep(&self, timeout: u64) -> Result<(), ExecutorError> {
        (**self).sleep(timeout)
    }
}

/// Dry-run executor: logs the action and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

impl LoggingExecutor {
    fn log(kind: MessageKind, timeout: u64) -> Result<(), ExecutorError> {
        info!(action = %kind, timeout, "dry run: power command not executed");
        Ok(())
    }
}

impl PowerExecutor for LoggingExecutor {
    fn shutdown(&self, timeout: u64) -> Result<(), ExecutorError> {
        Self::log(MessageKind::Shutdown, timeout)
    }

    fn reboot(&self, timeout: u64) -> Result<(), ExecutorError> {
        Self::log(MessageKind::Reboot, timeout)
    }

    fn sleep(&self, timeout: u64) -> Result<(), ExecutorError> {
        Self::log(MessageKind::Sleep, timeout)
    }
}

/// One external command line, optionally started after a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Wait before running. Used where the tool itself takes no delay.
    pub delay: Duration,
}

impl PowerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| (*arg).to_string()).collect(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl fmt::Display for PowerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Maps an action and its timeout to the command that performs it.
pub type CommandPlanner = fn(MessageKind, u64) -> Option<PowerCommand>;

/// Linux: systemd-era `shutdown` and `systemctl suspend`, after `timeout`.
pub fn linux_command(kind: MessageKind, timeout: u64) -> Option<PowerCommand> {
    let delay = Duration::from_secs(timeout);
    let command = match kind {
        MessageKind::Shutdown => PowerCommand::new("shutdown", &["-h", "now"]),
        MessageKind::Reboot => PowerCommand::new("shutdown", &["-r", "now"]),
        MessageKind::Sleep => PowerCommand::new("systemctl", &["suspend"]),
    };
    Some(command.after(delay))
}

/// macOS: `shutdown` takes whole minutes; `pmset` has no delay.
pub fn macos_command(kind: MessageKind, timeout: u64) -> Option<PowerCommand> {
    let minutes = format!("+{}", timeout.div_ceil(60));
    Some(match kind {
        MessageKind::Shutdown => PowerCommand::new("shutdown", &["-h", &minutes]),
        MessageKind::Reboot => PowerCommand::new("shutdown", &["-r", &minutes]),
        MessageKind::Sleep => {
            PowerCommand::new("pmset", &["sleepnow"]).after(Duration::from_secs(timeout))
        }
    })
}

/// Windows: `shutdown /t` takes seconds.
///
/// Sleep has no command line here: `rundll32` mangles the arguments of
/// `SetSuspendState` and hibernates instead. [`CommandExecutor`] calls it
/// directly on Windows.
pub fn windows_command(kind: MessageKind, timeout: u64) -> Option<PowerCommand> {
    let seconds = timeout.to_string();
    match kind {
        MessageKind::Shutdown => Some(PowerCommand::new("shutdown", &["/s", "/t", &seconds])),
        MessageKind::Reboot => Some(PowerCommand::new("shutdown", &["/r", "/t", &seconds])),
        MessageKind::Sleep => None,
    }
}

/// The planner for the platform this binary was built for.
pub fn platform_command(kind: MessageKind, timeout: u64) -> Option<PowerCommand> {
    if cfg!(target_os = "linux") {
        linux_command(kind, timeout)
    } else if cfg!(target_os = "macos") {
        macos_command(kind, timeout)
    } else if cfg!(windows) {
        windows_command(kind, timeout)
    } else {
        None
    }
}

/// Executes power commands by running the platform's power tools.
///
/// Runs synchronously on the caller's thread, including any delay.
#[derive(Debug, Clone, Copy)]
pub struct CommandExecutor {
    planner: CommandPlanner,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::with_planner(platform_command)
    }

    pub fn with_planner(planner: CommandPlanner) -> Self {
        Self { planner }
    }

    /// The command that would run for `kind`, without running it.
    pub fn plan(&self, kind: MessageKind, timeout: u64) -> Option<PowerCommand> {
        (self.planner)(kind, timeout)
    }

    fn run(&self, kind: MessageKind, timeout: u64) -> Result<(), ExecutorError> {
        let Some(command) = self.plan(kind, timeout) else {
            return native_action(kind, timeout).unwrap_or_else(|| Err(ExecutorError::Unsupported(kind)));
        };

        wait_before(kind, command.delay);

        info!(action = %kind, command = %command, "executing power command");
        let status = Command::new(&command.program)
            .args(&command.args)
            .status()
            .map_err(|source| ExecutorError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ExecutorError::Failed {
                command: command.to_string(),
                status,
            })
        }
    }
}

fn wait_before(kind: MessageKind, delay: Duration) {
    if !delay.is_zero() {
        info!(action = %kind, ?delay, "waiting before power command");
        thread::sleep(delay);
    }
}

/// Actions carried out through a system call rather than a tool.
#[cfg(windows)]
fn native_action(kind: MessageKind, timeout: u64) -> Option<Result<(), ExecutorError>> {
    use windows_sys::Win32::System::Power::SetSuspendState;

    if kind != MessageKind::Sleep {
        return None;
    }

    wait_before(kind, Duration::from_secs(timeout));
    info!(action = %kind, "calling SetSuspendState");
    // SAFETY: no pointer arguments. Suspend (not hibernate), forced, wake events kept.
    let suspended = unsafe { SetSuspendState(false, true, false) };
    Some(if suspended {
        Ok(())
    } else {
        Err(ExecutorError::Native {
            call: "SetSuspendState",
            source: std::io::Error::last_os_error(),
        })
    })
}

#[cfg(not(windows))]
fn native_action(_kind: MessageKind, _timeout: u64) -> Option<Result<(), ExecutorError>> {
    None
}

impl PowerExecutor for CommandExecutor {
    fn shutdown(&self, timeout: u64) -> Result<(), ExecutorError> {
        self.run(MessageKind::Shutdown, timeout)
    }

    fn reboot(&self, timeout: u64) -> Result<(), ExecutorError> {
        self.run(MessageKind::Reboot, timeout)
    }

    fn sleep(&self, timeout: u64) -> Result<(), ExecutorError> {
        self.run(MessageKind::Sleep, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_commands_wait_for_timeout() {
        let shutdown = linux_command(MessageKind::Shutdown, 5).unwrap();
        assert_eq!(shutdown.to_string(), "shutdown -h now");
        assert_eq!(shutdown.delay, Duration::from_secs(5));

        let reboot = linux_command(MessageKind::Reboot, 0).unwrap();
        assert_eq!(reboot.to_string(), "shutdown -r now");
        assert!(reboot.delay.is_zero());

        let sleep = linux_command(MessageKind::Sleep, 2).unwrap();
        assert_eq!(sleep.to_string(), "systemctl suspend");
    }

    #[test]
    fn macos_rounds_timeout_up_to_minutes() {
        assert_eq!(
            macos_command(MessageKind::Shutdown, 0).unwrap().to_string(),
            "shutdown -h +0"
        );
        assert_eq!(
            macos_command(MessageKind::Reboot, 61).unwrap().to_string(),
            "shutdown -r +2"
        );
        let sleep = macos_command(MessageKind::Sleep, 3).unwrap();
        assert_eq!(sleep.to_string(), "pmset sleepnow");
        assert_eq!(sleep.delay, Duration::from_secs(3));
    }

    #[test]
    fn windows_passes_seconds_to_shutdown() {
        let shutdown = windows_command(MessageKind::Shutdown, 30).unwrap();
        assert_eq!(shutdown.to_string(), "shutdown /s /t 30");
        assert!(shutdown.delay.is_zero());
        assert_eq!(
            windows_command(MessageKind::Reboot, 0).unwrap().to_string(),
            "shutdown /r /t 0"
        );
    }

    #[test]
    fn windows_sleep_is_not_a_spawned_command() {
        assert_eq!(windows_command(MessageKind::Sleep, 5), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn windows_sleep_elsewhere_is_unsupported() {
        let executor = CommandExecutor::with_planner(windows_command);
        assert!(matches!(
            executor.sleep(0),
            Err(ExecutorError::Unsupported(MessageKind::Sleep))
        ));
    }

    #[test]
    fn execute_routes_by_variant() {
        fn echo(kind: MessageKind, timeout: u64) -> Option<PowerCommand> {
            match kind {
                MessageKind::Reboot => None,
                _ => Some(PowerCommand::new("true", &[]).after(Duration::from_millis(timeout))),
            }
        }
        let executor = CommandExecutor::with_planner(echo);
        assert!(matches!(
            executor.execute(&Message::reboot(1)),
            Err(ExecutorError::Unsupported(MessageKind::Reboot))
        ));
        assert_eq!(
            executor.plan(MessageKind::Sleep, 7).unwrap().delay,
            Duration::from_millis(7)
        );
    }

    #[test]
    fn logging_executor_never_fails() {
        let executor = LoggingExecutor;
        for kind in MessageKind::ALL {
            executor.execute(&Message::new(kind, 3)).unwrap();
        }
    }

    #[cfg(unix)]
    #[test]
    fn command_exit_status_is_reported() {
        fn planner(kind: MessageKind, _timeout: u64) -> Option<PowerCommand> {
            Some(match kind {
                MessageKind::Shutdown => PowerCommand::new("true", &[]),
                MessageKind::Reboot => PowerCommand::new("false", &[]),
                MessageKind::Sleep => PowerCommand::new("/nonexistent/mpchannel-power-tool", &[]),
            })
        }
        let executor = CommandExecutor::with_planner(planner);

        executor.shutdown(0).unwrap();
        assert!(matches!(
            executor.reboot(0),
            Err(ExecutorError::Failed { command, .. }) if command == "false"
        ));
        assert!(matches!(executor.sleep(0), Err(ExecutorError::Spawn { .. })));
    }
}
