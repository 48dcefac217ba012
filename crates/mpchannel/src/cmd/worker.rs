use mpchannel_worker::{CommandExecutor, DispatchLoop, LoggingExecutor, PowerExecutor};
use tracing::info;

use crate::cmd::WorkerArgs;
use crate::exit::{worker_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: WorkerArgs) -> CliResult<i32> {
    let config = args.channel.config()?;
    let executor: Box<dyn PowerExecutor + Send> = if args.dry_run {
        info!("dry run: power commands will only be logged");
        Box::new(LoggingExecutor)
    } else {
        Box::new(CommandExecutor::new())
    };

    let mut dispatch =
        DispatchLoop::open(&config, executor).map_err(|err| worker_error("worker setup failed", err))?;

    let stop = dispatch.stop_handle();
    ctrlc::set_handler(move || stop.stop()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;

    dispatch
        .run()
        .map_err(|err| worker_error("worker failed", err))?;
    Ok(SUCCESS)
}
