use core::fmt;
use core::fmt::Write as _;
use core::mem;

use embassy_net::Stack;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, with_timeout};
use embedded_tls::{Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, UnsecureProvider};
use heapless::String;

use super::mqtt::{ConnectOptions, Session};
use super::{Telemetry, TelemetryError, payload};
use crate::config::MqttConfig;
use crate::device::HardwareRng;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// The read side has to hold a full 16 KiB TLS record plus its framing.
pub const TLS_READ_LEN: usize = 16640;
pub const TLS_WRITE_LEN: usize = 4096;

/// TLS record buffers, lent to one connection at a time.
pub struct RecordBuffers<'a> {
    pub read: &'a mut [u8],
    pub write: &'a mut [u8],
}

enum Link<'a> {
    Idle(TcpSocket<'a>, RecordBuffers<'a>),
    Plain(TcpSocket<'a>),
    Tls(TlsConnection<'a, TcpSocket<'a>, Aes128GcmSha256>),
    /// The connect attempt failed or the link broke.
    Closed,
}

#[derive(Debug)]
pub struct LinkError;

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("broker link failed")
    }
}

impl core::error::Error for LinkError {}

impl embedded_io::Error for LinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl embedded_io_async::ErrorType for Link<'_> {
    type Error = LinkError;
}

impl embedded_io_async::Read for Link<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match self {
            Link::Plain(socket) => socket.read(buf).await.map_err(|_| LinkError),
            Link::Tls(tls) => tls.read(buf).await.map_err(|_| LinkError),
            Link::Idle(..) | Link::Closed => Err(LinkError),
        }
    }
}

impl embedded_io_async::Write for Link<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, LinkError> {
        match self {
            Link::Plain(socket) => socket.write(buf).await.map_err(|_| LinkError),
            Link::Tls(tls) => tls.write(buf).await.map_err(|_| LinkError),
            Link::Idle(..) | Link::Closed => Err(LinkError),
        }
    }

    async fn flush(&mut self) -> Result<(), LinkError> {
        match self {
            Link::Plain(socket) => socket.flush().await.map_err(|_| LinkError),
            Link::Tls(tls) => tls.flush().await.map_err(|_| LinkError),
            Link::Idle(..) | Link::Closed => Err(LinkError),
        }
    }
}

/// MQTT over TLS (or plain TCP when configured) for the life of one broker connection.
///
/// The client connects at most once. After any failure it stays closed and the owner builds a
/// new one over the same buffers.
pub struct MqttTelemetry<'a> {
    stack: Stack<'a>,
    link: Link<'a>,
    config: &'static MqttConfig,
    client_id: String<24>,
    connected: bool,
}

impl<'a> MqttTelemetry<'a> {
    pub fn new(
        stack: Stack<'a>,
        rx_buffer: &'a mut [u8],
        tx_buffer: &'a mut [u8],
        records: RecordBuffers<'a>,
        config: &'static MqttConfig,
    ) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        let mut client_id = String::new();
        let _ = write!(client_id, "pm-monitor-{}", crate::device::get_device_id());

        Self {
            stack,
            link: Link::Idle(socket, records),
            config,
            client_id,
            connected: false,
        }
    }

    fn close(&mut self) {
        if let Link::Plain(socket) = &mut self.link {
            socket.abort();
        }
        self.link = Link::Closed;
        self.connected = false;
    }

    async fn open(&mut self) -> Result<(), TelemetryError> {
        let Link::Idle(mut socket, records) = mem::replace(&mut self.link, Link::Closed) else {
            return Err(TelemetryError::Io);
        };

        let addresses = self
            .stack
            .dns_query(self.config.broker, DnsQueryType::A)
            .await
            .map_err(|_| TelemetryError::Dns)?;
        let address = addresses.first().copied().ok_or(TelemetryError::Dns)?;
        debug!(
            "mqtt: {} resolved to {}",
            self.config.broker,
            defmt::Display2Format(&address)
        );

        socket
            .connect((address, self.config.port))
            .await
            .map_err(|_| TelemetryError::Connect)?;

        self.link = if self.config.tls {
            let mut tls = TlsConnection::new(socket, records.read, records.write);
            let tls_config = TlsConfig::new().with_server_name(self.config.broker);
            let provider = UnsecureProvider::new::<Aes128GcmSha256>(HardwareRng::new());
            tls.open(TlsContext::new(&tls_config, provider))
                .await
                .map_err(|e| {
                    warn!("mqtt: TLS handshake failed: {}", defmt::Debug2Format(&e));
                    TelemetryError::Tls
                })?;
            Link::Tls(tls)
        } else {
            Link::Plain(socket)
        };

        let options = connect_options(&self.client_id, self.config);
        let mut session = Session::new(&mut self.link);
        with_timeout(REPLY_TIMEOUT, session.connect(&options))
            .await
            .map_err(|_| TelemetryError::Io)?
    }
}

fn connect_options<'c>(client_id: &'c str, config: &'static MqttConfig) -> ConnectOptions<'c> {
    let non_empty = |s: &'static str| (!s.is_empty()).then_some(s);
    ConnectOptions {
        client_id,
        username: non_empty(config.username),
        password: non_empty(config.key),
        keep_alive_secs: config.keep_alive.as_secs() as u16,
    }
}

impl Telemetry for MqttTelemetry<'_> {
    async fn ensure_connected(&mut self) -> Result<(), TelemetryError> {
        if self.connected {
            let result = match with_timeout(REPLY_TIMEOUT, Session::new(&mut self.link).ping()).await {
                Ok(result) => result,
                Err(_) => Err(TelemetryError::Io),
            };
            if let Err(e) = result {
                warn!("mqtt: keep-alive failed: {}", e);
                self.close();
            }
            return result;
        }

        info!(
            "mqtt: connecting to {}:{} (tls: {})",
            self.config.broker,
            self.config.port,
            self.config.tls
        );
        match self.open().await {
            Ok(()) => {
                info!("mqtt: connected as {}", self.client_id.as_str());
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn publish(&mut self, topic: &str, value: u16) -> Result<(), TelemetryError> {
        if !self.connected {
            return Err(TelemetryError::Io);
        }
        let text = payload(value);
        let result = Session::new(&mut self.link)
            .publish(topic, text.as_bytes())
            .await;
        if result.is_err() {
            self.close();
        }
        result
    }
}
