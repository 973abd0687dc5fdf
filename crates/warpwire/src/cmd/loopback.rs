use std::fs;
use std::path::Path;
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use warpwire_frame::Message;
use warpwire_session::{session_code_name, MediaInit, Server, ServerConfig};
use warpwire_transport::mem;

use crate::cmd::decode::split_init_stream;
use crate::cmd::LoopbackArgs;
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
    TIMEOUT, USAGE,
};
use crate::output::{print_session, InitOutput, OutputFormat, SessionReport};

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let inits = args
        .inits
        .iter()
        .map(String::as_str)
        .map(load_init)
        .collect::<CliResult<Vec<_>>>()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    let report = runtime
        .block_on(async {
            tokio::time::timeout(timeout, exchange(inits, args.max_bitrate)).await
        })
        .map_err(|_| CliError::new(TIMEOUT, format!("loopback timed out after {timeout:?}")))??;

    print_session(&report, format);
    if report.close_code != 0 {
        return Err(CliError::new(
            FAILURE,
            format!("session closed with error: {}", report.close_reason),
        ));
    }
    Ok(SUCCESS)
}

/// Serve `inits` to one in-memory client and collect what it observed.
async fn exchange(inits: Vec<MediaInit>, max_bitrate: Option<u64>) -> CliResult<SessionReport> {
    let (listener, connector) = mem::listener();
    let server = Server::new(listener).with_config(ServerConfig {
        inits,
        ..ServerConfig::default()
    });
    let expected = server.config().inits.len();

    let cancel = CancellationToken::new();
    let server_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { server.run(cancel).await }
    });

    let mut peer = connector
        .connect()
        .map_err(|err| transport_error("connect failed", err))?;

    if let Some(bits_per_second) = max_bitrate {
        let mut hint = BytesMut::new();
        Message::debug(bits_per_second)
            .encode_atom(&mut hint)
            .map_err(|err| frame_error("encode failed", err))?;
        let mut sender = peer
            .open_uni()
            .map_err(|err| transport_error("open failed", err))?;
        sender
            .write_all(&hint)
            .await
            .map_err(|err| transport_error("send failed", err))?;
        sender
            .finish()
            .await
            .map_err(|err| transport_error("send failed", err))?;
        peer.wait_max_bandwidth(bits_per_second).await;
    }

    let mut received = Vec::with_capacity(expected);
    for _ in 0..expected {
        let mut incoming = peer
            .accept_uni()
            .await
            .map_err(|err| transport_error("accept failed", err))?;
        let bytes = incoming
            .read_to_end()
            .await
            .map_err(|err| transport_error("receive failed", err))?;
        let (id, raw) = split_init_stream(&bytes)?;
        tracing::debug!(id = %id, size = raw.len(), "received init");
        received.push(InitOutput {
            id,
            priority: Some(incoming.priority()),
            size: raw.len(),
        });
    }

    cancel.cancel();
    server_task
        .await
        .map_err(|err| CliError::new(INTERNAL, format!("server task failed: {err}")))?
        .map_err(|err| transport_error("server failed", err))?;

    let (close_code, close_reason) = peer.closed().await;
    Ok(SessionReport {
        inits: received,
        max_bandwidth: peer.max_bandwidth(),
        close_code,
        close_name: session_code_name(close_code),
        close_reason,
    })
}

/// Parse `ID=PATH` and load the init bytes.
fn load_init(arg: &str) -> CliResult<MediaInit> {
    let (id, path) = arg
        .split_once('=')
        .filter(|(id, path)| !id.is_empty() && !path.is_empty())
        .ok_or_else(|| CliError::new(USAGE, format!("--init must be ID=PATH, got {arg:?}")))?;
    let raw = fs::read(Path::new(path))
        .map_err(|err| io_error(&format!("failed reading {path}"), err))?;
    Ok(MediaInit::new(id, raw))
}

fn parse_timeout(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "timeout must not be empty"));
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
        .map_err(|_| CliError::new(USAGE, format!("invalid timeout value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
