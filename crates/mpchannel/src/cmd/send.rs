use mpchannel_frame::Message;
use mpchannel_worker::{Connectivity, TransportConnectivity};

use crate::cmd::SendArgs;
use crate::exit::{worker_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_message, Event, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.channel.config()?;
    let message = args.action.message(args.timeout);

    let connectivity = TransportConnectivity::open(&config)
        .map_err(|err| worker_error("channel setup failed", err))?;
    deliver(&connectivity, &message)
        .map_err(|err| CliError::new(err.code, format!("{} ({})", err.message, config.path.display())))?;

    print_message(&message, Event::Sent, &config.path, format);
    Ok(SUCCESS)
}

fn deliver<C: Connectivity>(connectivity: &C, message: &Message) -> CliResult<()> {
    if connectivity.send(message) {
        Ok(())
    } else {
        Err(CliError::new(
            TRANSPORT_ERROR,
            format!("worker is not listening; {message} was dropped"),
        ))
    }
}
