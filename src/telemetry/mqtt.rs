//! Minimal MQTT 3.1.1 client side: CONNECT, CONNACK, PUBLISH at QoS 0 and PINGREQ/PINGRESP.
//! Nothing is ever subscribed, so the broker only ever answers CONNECT and PINGREQ.

use embedded_io_async::{Read, Write};

use super::TelemetryError;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD0;

const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 0x04;

const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// Largest value the variable-length "remaining length" field can carry.
const MAX_REMAINING_LEN: usize = 268_435_455;

/// Enough for a CONNECT with credentials or a short PUBLISH.
pub const PACKET_BUF_LEN: usize = 256;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError {
    BufferTooSmall,
    Malformed,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Connack {
    pub session_present: bool,
    /// 0 = accepted, 1..=5 = refused for the reason the protocol assigns.
    pub return_code: u8,
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn u8(&mut self, byte: u8) -> Result<(), MqttError> {
        let slot = self.buf.get_mut(self.pos).ok_or(MqttError::BufferTooSmall)?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }

    fn u16(&mut self, value: u16) -> Result<(), MqttError> {
        self.bytes(&value.to_be_bytes())
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<(), MqttError> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or(MqttError::BufferTooSmall)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Length-prefixed UTF-8 string.
    fn string(&mut self, s: &str) -> Result<(), MqttError> {
        let len = u16::try_from(s.len()).map_err(|_| MqttError::Malformed)?;
        self.u16(len)?;
        self.bytes(s.as_bytes())
    }

    fn remaining_len(&mut self, mut len: usize) -> Result<(), MqttError> {
        if len > MAX_REMAINING_LEN {
            return Err(MqttError::Malformed);
        }
        loop {
            let mut byte = (len % 128) as u8;
            len /= 128;
            if len > 0 {
                byte |= 0x80;
            }
            self.u8(byte)?;
            if len == 0 {
                return Ok(());
            }
        }
    }
}

fn string_len(s: &str) -> usize {
    2 + s.len()
}

pub fn encode_connect(buf: &mut [u8], options: &ConnectOptions<'_>) -> Result<usize, MqttError> {
    let mut flags = FLAG_CLEAN_SESSION;
    let mut remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + string_len(options.client_id);
    if let Some(username) = options.username {
        flags |= FLAG_USERNAME;
        remaining += string_len(username);
    }
    if let Some(password) = options.password {
        // A password without a username is a protocol violation.
        if options.username.is_none() {
            return Err(MqttError::Malformed);
        }
        flags |= FLAG_PASSWORD;
        remaining += string_len(password);
    }

    let mut w = Writer::new(buf);
    w.u8(CONNECT)?;
    w.remaining_len(remaining)?;
    w.u16(PROTOCOL_NAME.len() as u16)?;
    w.bytes(PROTOCOL_NAME)?;
    w.u8(PROTOCOL_LEVEL)?;
    w.u8(flags)?;
    w.u16(options.keep_alive_secs)?;
    w.string(options.client_id)?;
    if let Some(username) = options.username {
        w.string(username)?;
    }
    if let Some(password) = options.password {
        w.string(password)?;
    }
    Ok(w.pos)
}

/// PUBLISH at QoS 0, no retain, no packet id.
pub fn encode_publish(buf: &mut [u8], topic: &str, payload: &[u8]) -> Result<usize, MqttError> {
    if topic.is_empty() {
        return Err(MqttError::Malformed);
    }
    let mut w = Writer::new(buf);
    w.u8(PUBLISH)?;
    w.remaining_len(string_len(topic) + payload.len())?;
    w.string(topic)?;
    w.bytes(payload)?;
    Ok(w.pos)
}

pub fn encode_pingreq(buf: &mut [u8]) -> Result<usize, MqttError> {
    let mut w = Writer::new(buf);
    w.u8(PINGREQ)?;
    w.u8(0)?;
    Ok(w.pos)
}

pub fn decode_connack(packet: &[u8; 4]) -> Result<Connack, MqttError> {
    if packet[0] != CONNACK || packet[1] != 2 || packet[2] & !0x01 != 0 {
        return Err(MqttError::Malformed);
    }
    Ok(Connack {
        session_present: packet[2] & 0x01 != 0,
        return_code: packet[3],
    })
}

pub fn is_pingresp(packet: &[u8; 2]) -> bool {
    *packet == [PINGRESP, 0]
}

/// One request/response exchange at a time over an already-open byte stream.
pub struct Session<T> {
    io: T,
    buf: [u8; PACKET_BUF_LEN],
}

impl<T: Read + Write> Session<T> {
    pub fn new(io: T) -> Self {
        Self {
            io,
            buf: [0; PACKET_BUF_LEN],
        }
    }

    /// Sends CONNECT and waits for an accepting CONNACK.
    pub async fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), TelemetryError> {
        let len = encode_connect(&mut self.buf, options)?;
        self.send(len).await?;

        let mut reply = [0u8; 4];
        self.io
            .read_exact(&mut reply)
            .await
            .map_err(|_| TelemetryError::Io)?;
        match decode_connack(&reply).map_err(|_| TelemetryError::Protocol)? {
            Connack { return_code: 0, .. } => Ok(()),
            Connack { return_code, .. } => Err(TelemetryError::Refused(return_code)),
        }
    }

    pub async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TelemetryError> {
        let len = encode_publish(&mut self.buf, topic, payload)?;
        self.send(len).await
    }

    pub async fn ping(&mut self) -> Result<(), TelemetryError> {
        let len = encode_pingreq(&mut self.buf)?;
        self.send(len).await?;

        let mut reply = [0u8; 2];
        self.io
            .read_exact(&mut reply)
            .await
            .map_err(|_| TelemetryError::Io)?;
        if !is_pingresp(&reply) {
            return Err(TelemetryError::Protocol);
        }
        Ok(())
    }

    async fn send(&mut self, len: usize) -> Result<(), TelemetryError> {
        self.io
            .write_all(&self.buf[..len])
            .await
            .map_err(|_| TelemetryError::Io)?;
        self.io.flush().await.map_err(|_| TelemetryError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeLink;

    #[test]
    fn connect_with_credentials() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "pm",
            username: Some("u"),
            password: Some("k"),
            keep_alive_secs: 60,
        };
        let len = encode_connect(&mut buf, &options).unwrap();
        assert_eq!(
            &buf[..len],
            &[
                0x10, 20, // fixed header
                0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0xC2, 0x00, 0x3C, // variable header
                0x00, 0x02, b'p', b'm', // client id
                0x00, 0x01, b'u', // username
                0x00, 0x01, b'k', // password
            ]
        );
    }

    #[test]
    fn connect_without_credentials_only_sets_clean_session() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "",
            username: None,
            password: None,
            keep_alive_secs: 0,
        };
        let len = encode_connect(&mut buf, &options).unwrap();
        assert_eq!(len, 14);
        assert_eq!(buf[9], FLAG_CLEAN_SESSION);
    }

    #[test]
    fn password_needs_username() {
        let mut buf = [0u8; 64];
        let options = ConnectOptions {
            client_id: "pm",
            username: None,
            password: Some("k"),
            keep_alive_secs: 60,
        };
        assert_eq!(encode_connect(&mut buf, &options), Err(MqttError::Malformed));
    }

    #[test]
    fn publish_qos0() {
        let mut buf = [0u8; 32];
        let len = encode_publish(&mut buf, "a/b", b"42").unwrap();
        assert_eq!(&buf[..len], &[0x30, 7, 0x00, 0x03, b'a', b'/', b'b', b'4', b'2']);
    }

    #[test]
    fn publish_uses_multibyte_remaining_length() {
        let mut buf = [0u8; 256];
        let payload = [b'x'; 200];
        let len = encode_publish(&mut buf, "t", &payload).unwrap();
        // 2 + 1 + 200 = 203 = 0xCB -> [0xCB, 0x01]
        assert_eq!(&buf[..3], &[0x30, 0xCB, 0x01]);
        assert_eq!(len, 1 + 2 + 203);
    }

    #[test]
    fn publish_rejects_short_buffer_and_empty_topic() {
        let mut buf = [0u8; 4];
        assert_eq!(
            encode_publish(&mut buf, "topic", b"1"),
            Err(MqttError::BufferTooSmall)
        );
        assert_eq!(encode_publish(&mut buf, "", b"1"), Err(MqttError::Malformed));
    }

    #[test]
    fn pingreq_is_two_bytes() {
        let mut buf = [0u8; 2];
        assert_eq!(encode_pingreq(&mut buf), Ok(2));
        assert_eq!(buf, [0xC0, 0x00]);
        assert_eq!(encode_pingreq(&mut buf[..1]), Err(MqttError::BufferTooSmall));
    }

    #[test]
    fn connack_decoding() {
        assert_eq!(
            decode_connack(&[0x20, 0x02, 0x01, 0x00]),
            Ok(Connack {
                session_present: true,
                return_code: 0
            })
        );
        assert_eq!(
            decode_connack(&[0x20, 0x02, 0x00, 0x05]),
            Ok(Connack {
                session_present: false,
                return_code: 5
            })
        );
        assert_eq!(decode_connack(&[0x30, 0x02, 0x00, 0x00]), Err(MqttError::Malformed));
        assert_eq!(decode_connack(&[0x20, 0x03, 0x00, 0x00]), Err(MqttError::Malformed));
    }

    fn options() -> ConnectOptions<'static> {
        ConnectOptions {
            client_id: "pm",
            username: Some("u"),
            password: Some("k"),
            keep_alive_secs: 60,
        }
    }

    #[futures_test::test]
    async fn session_connect_accepted() {
        let mut link = FakeLink::replying(&[0x20, 0x02, 0x00, 0x00]);
        Session::new(&mut link).connect(&options()).await.unwrap();
        assert_eq!(link.sent[0], 0x10);
    }

    #[futures_test::test]
    async fn session_connect_refused() {
        let mut link = FakeLink::replying(&[0x20, 0x02, 0x00, 0x04]);
        assert_eq!(
            Session::new(&mut link).connect(&options()).await,
            Err(TelemetryError::Refused(4))
        );
    }

    #[futures_test::test]
    async fn session_connect_without_reply_is_io_error() {
        let mut link = FakeLink::replying(&[0x20, 0x02]);
        assert_eq!(
            Session::new(&mut link).connect(&options()).await,
            Err(TelemetryError::Io)
        );
    }

    #[futures_test::test]
    async fn session_publish_writes_one_packet() {
        let mut link = FakeLink::replying(&[]);
        Session::new(&mut link).publish("u/feeds/pm25", b"42").await.unwrap();
        let mut expected = [0u8; 32];
        let len = encode_publish(&mut expected, "u/feeds/pm25", b"42").unwrap();
        assert_eq!(link.sent, &expected[..len]);
    }

    #[futures_test::test]
    async fn session_ping_expects_pingresp() {
        let mut ok = FakeLink::replying(&[0xD0, 0x00]);
        Session::new(&mut ok).ping().await.unwrap();
        assert_eq!(ok.sent, [0xC0, 0x00]);

        let mut wrong = FakeLink::replying(&[0x20, 0x00]);
        assert_eq!(Session::new(&mut wrong).ping().await, Err(TelemetryError::Protocol));
    }

    #[futures_test::test]
    async fn session_write_failure_is_io_error() {
        let mut link = FakeLink::broken();
        assert_eq!(
            Session::new(&mut link).publish("t", b"1").await,
            Err(TelemetryError::Io)
        );
    }
}
