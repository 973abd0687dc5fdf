use std::fs;
use std::io::Read;

use bytes::BytesMut;
use warpwire_frame::{decode_atom, Atom, FrameError, Message};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_inits, print_messages, InitOutput, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = read_input(&args)?;

    if args.init_stream {
        let (id, raw) = split_init_stream(&input)?;
        let init = InitOutput {
            id,
            priority: None,
            size: raw.len(),
        };
        print_inits(&[init], format);
        return Ok(SUCCESS);
    }

    let decoded = decode_all(&input).map_err(|err| frame_error("decode failed", err))?;
    print_messages(&decoded, format);
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    match &args.file {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err)),
        None => {
            let mut input = Vec::new();
            std::io::stdin()
                .read_to_end(&mut input)
                .map_err(|err| io_error("failed reading stdin", err))?;
            Ok(input)
        }
    }
}

/// Decode every atom in `input`. Leftover bytes that do not form a whole
/// atom are a truncation error.
pub(crate) fn decode_all(input: &[u8]) -> Result<Vec<(Atom, Message)>, FrameError> {
    let mut buf = BytesMut::from(input);
    let mut decoded = Vec::new();
    while let Some(atom) = decode_atom(&mut buf)? {
        let msg = Message::from_json(&atom.payload)?;
        decoded.push((atom, msg));
    }
    if !buf.is_empty() {
        return Err(FrameError::Truncated(buf.len()));
    }
    Ok(decoded)
}

/// Split an init channel into its announced id and the raw bytes after it.
pub(crate) fn split_init_stream(input: &[u8]) -> CliResult<(String, &[u8])> {
    let mut buf = BytesMut::from(input);
    let atom = decode_atom(&mut buf)
        .and_then(|atom| atom.ok_or(FrameError::Truncated(input.len())))
        .map_err(|err| frame_error("decode failed", err))?;
    let msg = Message::from_json(&atom.payload).map_err(|err| frame_error("decode failed", err))?;
    let init = msg.init.ok_or_else(|| {
        CliError::new(
            DATA_INVALID,
            "init stream does not start with an init message",
        )
    })?;
    Ok((init.id, &input[atom.wire_size()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in messages {
            msg.encode_atom(&mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn decode_all_returns_every_message() {
        let input = wire(&[Message::debug(500_000), Message::init("video")]);
        let decoded = decode_all(&input).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].1, Message::debug(500_000));
        assert_eq!(decoded[1].1, Message::init("video"));
        assert!(decode_all(&[]).unwrap().is_empty());
    }

    #[test]
    fn decode_all_rejects_trailing_bytes() {
        let mut input = wire(&[Message::debug(1)]);
        input.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(decode_all(&input), Err(FrameError::Truncated(3))));
    }

    #[test]
    fn split_init_stream_returns_raw_tail() {
        let mut input = wire(&[Message::init("audio")]);
        input.extend_from_slice(b"\x00\x00\x00\x10ftypdash");

        let (id, raw) = split_init_stream(&input).unwrap();
        assert_eq!(id, "audio");
        assert_eq!(raw, b"\x00\x00\x00\x10ftypdash");
    }

    #[test]
    fn split_init_stream_requires_init_message() {
        let input = wire(&[Message::debug(1)]);
        let err = split_init_stream(&input).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);

        let err = split_init_stream(&[0, 0]).unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
