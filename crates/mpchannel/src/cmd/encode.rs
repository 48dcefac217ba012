use mpchannel_frame::encode_to_vec;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::print_raw;

/// Writes the frame bytes unchanged; `--format` does not apply.
pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let message = args.action.message(args.timeout);
    let wire = encode_to_vec(&message).map_err(|err| frame_error("encode failed", err))?;
    print_raw(&wire);
    Ok(SUCCESS)
}
