use std::fs;

use bytes::BytesMut;
use warpwire_frame::{Message, MessageDebug, MessageInit};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::print_raw;

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let msg = build_message(&args);
    let mut buf = BytesMut::new();
    msg.encode_atom(&mut buf)
        .map_err(|err| frame_error("encode failed", err))?;

    if let Some(path) = &args.raw {
        let raw = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        buf.extend_from_slice(&raw);
    }

    print_raw(&buf);
    Ok(SUCCESS)
}

fn build_message(args: &EncodeArgs) -> Message {
    Message {
        init: args.init.clone().map(|id| MessageInit { id }),
        debug: args.max_bitrate.map(|max_bitrate| MessageDebug { max_bitrate }),
    }
}
