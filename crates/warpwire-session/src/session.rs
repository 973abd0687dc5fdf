use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use warpwire_frame::{AtomReader, ChannelWriter, Message};
use warpwire_transport::{BidiChannel, Connection, RecvChannel};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::tasks::{Supervisor, Tasks};

/// Initialization payload announced to the peer when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInit {
    pub id: String,
    /// Sent verbatim after the `init` atom.
    pub raw: Bytes,
}

impl MediaInit {
    pub fn new(id: impl Into<String>, raw: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
        }
    }
}

/// One client session over an established connection.
///
/// Running a session drives four concurrent parts until one fails or the
/// caller cancels:
/// - refuse every bidirectional channel the peer opens
/// - read control messages from every unidirectional channel the peer opens
/// - announce each queued [`MediaInit`] on its own outbound channel, once
/// - supervise the per-channel readers, ending the session on the first error
pub struct Session<C> {
    conn: Arc<C>,
    inits: Vec<MediaInit>,
    config: SessionConfig,
}

impl<C: Connection> Session<C> {
    /// Bind a session to a connection.
    pub fn new(conn: Arc<C>) -> Result<Self> {
        Ok(Self {
            conn,
            inits: Vec::new(),
            config: SessionConfig::default(),
        })
    }

    /// Override session settings.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue an init for announcement.
    ///
    /// Inits are announced in the order first added. Adding an id that is
    /// already queued replaces its payload in place.
    pub fn add_init(&mut self, init: MediaInit) {
        match self.inits.iter_mut().find(|queued| queued.id == init.id) {
            Some(queued) => queued.raw = init.raw,
            None => self.inits.push(init),
        }
    }

    /// Inits queued for announcement.
    pub fn inits(&self) -> &[MediaInit] {
        &self.inits
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the session until it fails or `cancel` fires.
    ///
    /// Cancellation is a normal end and returns `Ok(())`. Any failure stops
    /// every other part of the session before its error is returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self {
            conn,
            inits,
            config,
        } = self;

        let mut supervisor = Supervisor::new(&cancel);
        let tasks = supervisor.tasks();
        tracing::info!(inits = inits.len(), "session started");

        supervisor.spawn(reject_bidi(Arc::clone(&conn), config.bidi_reject_code));
        supervisor.spawn(accept_uni(
            Arc::clone(&conn),
            tasks.clone(),
            config.stream_error_code,
        ));
        supervisor.spawn(announce(conn, tasks, inits, config));

        let result = supervisor.run().await;
        match &result {
            Ok(()) => tracing::info!("session ended"),
            Err(err) => tracing::warn!(error = %err, "session terminated"),
        }
        result
    }
}

async fn reject_bidi<C: Connection>(conn: Arc<C>, code: u32) -> Result<()> {
    loop {
        let mut channel = conn
            .accept_bi()
            .await
            .map_err(SessionError::AcceptBidirectional)?;
        tracing::debug!(code, "rejecting bidirectional stream");
        channel.stop(code);
    }
}

async fn accept_uni<C: Connection>(
    conn: Arc<C>,
    tasks: Tasks<SessionError>,
    error_code: u32,
) -> Result<()> {
    loop {
        let channel = conn
            .accept_uni()
            .await
            .map_err(SessionError::AcceptUnidirectional)?;
        tracing::trace!("accepted unidirectional stream");
        tasks.add(handle_stream(Arc::clone(&conn), channel, error_code));
    }
}

async fn handle_stream<C: Connection>(
    conn: Arc<C>,
    mut channel: C::Recv,
    error_code: u32,
) -> Result<()> {
    if let Err(err) = read_messages(conn.as_ref(), &mut channel).await {
        tracing::warn!(error = %err, code = error_code, "stream failed; stopping");
        channel.stop(error_code);
        return Err(SessionError::Stream(err));
    }
    tracing::trace!("stream finished");
    Ok(())
}

async fn read_messages<C: Connection>(
    conn: &C,
    channel: &mut C::Recv,
) -> warpwire_frame::Result<()> {
    let mut reader = AtomReader::new(channel);
    while let Some(msg) = reader.read_message().await? {
        apply(conn, msg);
    }
    Ok(())
}

fn apply<C: Connection>(conn: &C, msg: Message) {
    if let Some(init) = msg.init {
        // Peers have nothing to announce to us; the branch is accepted and ignored.
        tracing::trace!(id = %init.id, "ignoring init from peer");
    }
    if let Some(hint) = msg.debug {
        tracing::debug!(max_bitrate = hint.max_bitrate, "applying bandwidth limit");
        conn.set_max_bandwidth(hint.max_bitrate);
    }
}

async fn announce<C: Connection>(
    conn: Arc<C>,
    tasks: Tasks<SessionError>,
    inits: Vec<MediaInit>,
    config: SessionConfig,
) -> Result<()> {
    for init in &inits {
        write_init(conn.as_ref(), &tasks, init, &config).await?;
    }
    tracing::debug!(count = inits.len(), "inits announced");
    Ok(())
}

async fn write_init<C: Connection>(
    conn: &C,
    tasks: &Tasks<SessionError>,
    init: &MediaInit,
    config: &SessionConfig,
) -> Result<()> {
    let channel = conn
        .open_uni()
        .await
        .map_err(|source| SessionError::OpenStream {
            id: init.id.clone(),
            source,
        })?
        .ok_or_else(|| SessionError::MissingStream {
            id: init.id.clone(),
        })?;

    let (mut writer, drain) = ChannelWriter::new(channel, config.stream_error_code);
    tasks.add(async move { drain.run().await.map_err(SessionError::Drain) });

    let result = send_init(&mut writer, init, config.init_priority).await;
    if result.is_err() {
        writer.cancel(config.stream_error_code);
    }
    result
}

async fn send_init(writer: &mut ChannelWriter, init: &MediaInit, priority: i32) -> Result<()> {
    writer.set_priority(priority);
    writer
        .write_message(&Message::init(init.id.clone()))
        .map_err(|source| SessionError::InitHeader {
            id: init.id.clone(),
            source,
        })?;
    writer
        .write(init.raw.clone())
        .map_err(|source| SessionError::InitData {
            id: init.id.clone(),
            source,
        })?;
    writer
        .close()
        .await
        .map_err(|source| SessionError::InitClose {
            id: init.id.clone(),
            source,
        })?;
    tracing::debug!(id = %init.id, bytes = init.raw.len(), "init sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpwire_transport::mem;

    #[test]
    fn add_init_keeps_first_position_on_duplicate() {
        let (conn, _peer) = mem::pair();
        let mut session = Session::new(Arc::new(conn)).unwrap();
        session.add_init(MediaInit::new("video", &b"v1"[..]));
        session.add_init(MediaInit::new("audio", &b"a1"[..]));
        session.add_init(MediaInit::new("video", &b"v2"[..]));

        let inits = session.inits();
        assert_eq!(inits.len(), 2);
        assert_eq!(inits[0], MediaInit::new("video", &b"v2"[..]));
        assert_eq!(inits[1].id, "audio");
    }

    #[test]
    fn default_config_uses_protocol_codes() {
        let (conn, _peer) = mem::pair();
        let session = Session::new(Arc::new(conn)).unwrap();
        assert_eq!(session.config().bidi_reject_code, 1);
        assert_eq!(session.config().stream_error_code, 1);
        assert_eq!(session.config().init_priority, i32::MAX);
    }
}
