// src/core/ingest/syslog_server.rs

//! Syslog network sources. One listener runs per configured
//! `(protocol, port)` pair: UDP reads datagrams into a fixed receive
//! buffer, TCP accepts connections and frames each one into
//! newline-delimited messages. Both feed parsed records through the
//! ingestion pipeline and stop on the shutdown signal.

use super::IngestPipeline;
use super::coordinator::IngestionCoordinator;
use super::parsers::syslog::parse_syslog_message;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, warn};

/// Receive buffer for UDP datagrams.
const UDP_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyslogProtocol {
    Udp,
    Tcp,
}

/// A listener bound to one protocol/port pair.
#[async_trait]
pub trait SyslogListener: Send {
    /// The source tag records from this listener carry, e.g. `syslog-udp:514`.
    fn source_tag(&self) -> String;

    /// Runs until the shutdown signal fires.
    async fn run(self: Box<Self>, shutdown_rx: broadcast::Receiver<()>);
}

pub struct UdpSyslogListener {
    port: u16,
    pipeline: Arc<IngestPipeline>,
    coordinator: Arc<IngestionCoordinator>,
}

impl UdpSyslogListener {
    pub fn new(
        port: u16,
        pipeline: Arc<IngestPipeline>,
        coordinator: Arc<IngestionCoordinator>,
    ) -> Self {
        Self {
            port,
            pipeline,
            coordinator,
        }
    }
}

#[async_trait]
impl SyslogListener for UdpSyslogListener {
    fn source_tag(&self) -> String {
        format!("syslog-udp:{}", self.port)
    }

    async fn run(self: Box<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let source = self.source_tag();
        let socket = match UdpSocket::bind(("0.0.0.0", self.port)).await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to bind syslog UDP port {}: {}", self.port, e);
                return;
            }
        };
        info!("Syslog listener on UDP port {}.", self.port);

        let mut buf = [0u8; UDP_BUFFER_SIZE];
        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            if !self.coordinator.should_process_source(&source) {
                                continue;
                            }
                            let datagram = String::from_utf8_lossy(&buf[..len]);
                            for line in datagram.lines() {
                                let line = line.trim();
                                if line.is_empty() {
                                    continue;
                                }
                                let mut record = parse_syslog_message(line, &source);
                                record
                                    .metadata
                                    .entry("protocol".into())
                                    .or_insert_with(|| "udp".into());
                                self.pipeline.ingest_record(record).await;
                            }
                            debug!("Received {} byte syslog datagram from {}.", len, peer);
                        }
                        Err(e) => error!("Error receiving syslog datagram: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Syslog UDP listener on port {} shutting down.", self.port);
                    return;
                }
            }
        }
    }
}

pub struct TcpSyslogListener {
    port: u16,
    pipeline: Arc<IngestPipeline>,
    coordinator: Arc<IngestionCoordinator>,
}

impl TcpSyslogListener {
    pub fn new(
        port: u16,
        pipeline: Arc<IngestPipeline>,
        coordinator: Arc<IngestionCoordinator>,
    ) -> Self {
        Self {
            port,
            pipeline,
            coordinator,
        }
    }
}

#[async_trait]
impl SyslogListener for TcpSyslogListener {
    fn source_tag(&self) -> String {
        format!("syslog-tcp:{}", self.port)
    }

    async fn run(self: Box<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let source = self.source_tag();
        let listener = match TcpListener::bind(("0.0.0.0", self.port)).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind syslog TCP port {}: {}", self.port, e);
                return;
            }
        };
        info!("Syslog listener on TCP port {}.", self.port);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Syslog TCP connection from {}.", peer);
                            let pipeline = self.pipeline.clone();
                            let coordinator = self.coordinator.clone();
                            let source = source.clone();
                            let conn_shutdown = shutdown_rx.resubscribe();
                            tokio::spawn(async move {
                                handle_tcp_connection(
                                    stream,
                                    source,
                                    pipeline,
                                    coordinator,
                                    conn_shutdown,
                                )
                                .await;
                            });
                        }
                        Err(e) => error!("Error accepting syslog TCP connection: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Syslog TCP listener on port {} shutting down.", self.port);
                    return;
                }
            }
        }
    }
}

async fn handle_tcp_connection(
    stream: tokio::net::TcpStream,
    source: String,
    pipeline: Arc<IngestPipeline>,
    coordinator: Arc<IngestionCoordinator>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut frames = FramedRead::new(stream, LinesCodec::new());
    loop {
        tokio::select! {
            frame = frames.next() => {
                match frame {
                    Some(Ok(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if !coordinator.should_process_source(&source) {
                            continue;
                        }
                        let mut record = parse_syslog_message(line, &source);
                        record
                            .metadata
                            .entry("protocol".into())
                            .or_insert_with(|| "tcp".into());
                        pipeline.ingest_record(record).await;
                    }
                    Some(Err(e)) => {
                        warn!("Syslog TCP framing error: {}", e);
                        return;
                    }
                    None => return,
                }
            }
            _ = shutdown_rx.recv() => {
                return;
            }
        }
    }
}
