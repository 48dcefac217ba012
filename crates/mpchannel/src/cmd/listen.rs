use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use mpchannel_transport::{open_transport, Role, Transport};

use crate::cmd::ListenArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, Event, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.channel.config()?;
    let transport: Arc<dyn Transport> = Arc::from(
        open_transport(Role::Server, &config).map_err(|err| transport_error("open failed", err))?,
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), transport.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if !transport.is_ready() {
            transport.connect();
            thread::sleep(config.poll_interval);
            continue;
        }

        let Some(message) = transport.read() else {
            continue;
        };

        print_message(&message, Event::Received, &config.path, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    transport.disconnect();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>, transport: Arc<dyn Transport>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        transport.disconnect();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
