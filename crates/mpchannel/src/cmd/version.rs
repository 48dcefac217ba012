use mpchannel_frame::registered_names;
use mpchannel_transport::default_path;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mpchannel {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: mpchannel");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("MPCHANNEL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "transport: {}",
        if cfg!(windows) { "named-pipe" } else { "fifo" }
    );
    println!("default_path: {}", default_path().display());
    println!("message_types: {}", registered_names().collect::<Vec<_>>().join(", "));
    println!("features: worker={}, cli=true", cfg!(feature = "worker"));

    Ok(SUCCESS)
}
