//! Minimal HTTP client for the collector
//!
//! One TCP connection per exchange, plain HTTP on port 80. Requests are sent
//! as HTTP/1.0 so the collector answers with an unchunked body and closes the
//! connection, which marks the end of the response.

use core::fmt::Write;
use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_time::{Duration, WithTimeout};
use gardeneye_core::config::{HTTP_TIMEOUT_S, MAX_JSON_SIZE};
use gardeneye_core::sync::{DeviceId, Endpoint, Status, Transport, TransportError};
use heapless::String;
use log::{debug, warn};

const HTTP_PORT: u16 = 80;
const SOCKET_BUFFER: usize = 1536;
/// Room for the status line and headers in front of a body
const HEAD_ROOM: usize = 512;

pub struct HttpTransport<'a> {
    stack: Stack<'a>,
    hostname: &'a str,
    api_key: &'a str,
    device: DeviceId,
    rx_buffer: [u8; SOCKET_BUFFER],
    tx_buffer: [u8; SOCKET_BUFFER],
    message: [u8; MAX_JSON_SIZE + HEAD_ROOM],
}

impl<'a> HttpTransport<'a> {
    pub fn new(stack: Stack<'a>, hostname: &'a str, api_key: &'a str, device: DeviceId) -> Self {
        Self {
            stack,
            hostname,
            api_key,
            device,
            rx_buffer: [0; SOCKET_BUFFER],
            tx_buffer: [0; SOCKET_BUFFER],
            message: [0; MAX_JSON_SIZE + HEAD_ROOM],
        }
    }

    async fn resolve(&self) -> Result<IpAddress, TransportError> {
        if let Ok(address) = self.hostname.parse::<Ipv4Addr>() {
            return Ok(IpAddress::Ipv4(address));
        }

        let addresses = self
            .stack
            .dns_query(self.hostname, DnsQueryType::A)
            .await
            .map_err(|e| {
                warn!("DNS lookup of {} failed: {:?}", self.hostname, e);
                TransportError::Unreachable
            })?;
        addresses
            .first()
            .copied()
            .ok_or(TransportError::Unreachable)
    }

    /// Run one request and leave the raw response in `self.message`.
    /// Returns the status and the range of the body.
    async fn exchange(
        &mut self,
        method: &str,
        endpoint: Endpoint,
        body: &[u8],
    ) -> Result<(Status, usize, usize), TransportError> {
        let address = self.resolve().await?;

        let mut head: String<HEAD_ROOM> = String::new();
        write!(
            head,
            "{method} {path} HTTP/1.0\r\n\
             Host: {host}\r\n\
             mac: {device}\r\n\
             Authorization: Bearer {key}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {len}\r\n\
             Connection: close\r\n\r\n",
            path = endpoint.path(),
            host = self.hostname,
            device = self.device,
            key = self.api_key,
            len = body.len(),
        )
        .map_err(|_| TransportError::Io)?;

        let mut socket = TcpSocket::new(self.stack, &mut self.rx_buffer, &mut self.tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(HTTP_TIMEOUT_S)));
        socket
            .connect((address, HTTP_PORT))
            .await
            .map_err(|e| {
                warn!("Connect to {} failed: {:?}", self.hostname, e);
                TransportError::Unreachable
            })?;

        write_all(&mut socket, head.as_bytes()).await?;
        write_all(&mut socket, body).await?;
        socket.flush().await.map_err(|_| TransportError::Io)?;

        let mut filled = 0;
        loop {
            let Some(space) = self.message.get_mut(filled..).filter(|s| !s.is_empty()) else {
                socket.abort();
                return Err(TransportError::ResponseTooLarge);
            };
            match socket.read(space).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => return Err(TransportError::Io),
            }
        }
        socket.close();

        let response = &self.message[..filled];
        let body_start = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .map(|p| p + 4)
            .ok_or(TransportError::BadResponse)?;
        let status = parse_status(&response[..body_start]).ok_or(TransportError::BadResponse)?;

        debug!(
            "{} {} -> {} ({} body bytes)",
            method,
            endpoint.path(),
            status.0,
            filled - body_start
        );
        Ok((status, body_start, filled))
    }

    async fn bounded(
        &mut self,
        method: &str,
        endpoint: Endpoint,
        body: &[u8],
    ) -> Result<(Status, usize, usize), TransportError> {
        let timeout = Duration::from_secs(HTTP_TIMEOUT_S);
        match self.exchange(method, endpoint, body).with_timeout(timeout).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Transport for HttpTransport<'_> {
    async fn get(
        &mut self,
        endpoint: Endpoint,
        response: &mut [u8],
    ) -> Result<(Status, usize), TransportError> {
        let (status, start, end) = self.bounded("GET", endpoint, &[]).await?;
        let body = &self.message[start..end];
        response
            .get_mut(..body.len())
            .ok_or(TransportError::ResponseTooLarge)?
            .copy_from_slice(body);
        Ok((status, body.len()))
    }

    async fn post(&mut self, endpoint: Endpoint, body: &[u8]) -> Result<Status, TransportError> {
        let (status, _, _) = self.bounded("POST", endpoint, body).await?;
        Ok(status)
    }
}

async fn write_all(socket: &mut TcpSocket<'_>, mut bytes: &[u8]) -> Result<(), TransportError> {
    while !bytes.is_empty() {
        match socket.write(bytes).await {
            Ok(0) | Err(_) => return Err(TransportError::Io),
            Ok(n) => bytes = &bytes[n..],
        }
    }
    Ok(())
}

/// Status code from a `HTTP/1.x 200 OK` status line
fn parse_status(head: &[u8]) -> Option<Status> {
    let line = head.split(|&b| b == b'\n').next()?;
    let mut parts = core::str::from_utf8(line).ok()?.split_ascii_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok().map(Status)
}
