//! Minimal client for the adb server's smart-socket protocol (`host:transport`, `exec:`).

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct AdbServerClient {
    host: String,
    port: u16,
}

impl AdbServerClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, String> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| format!("Invalid adb server address {}:{}: {err}", self.host, self.port))?
            .next()
            .ok_or_else(|| format!("adb server address {}:{} did not resolve", self.host, self.port))
    }

    fn open(&self, timeout: Duration) -> Result<TcpStream, String> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|err| format!("Failed to reach adb server at {addr}: {err}"))?;
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|err| format!("Failed to set read timeout: {err}"))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|err| format!("Failed to set write timeout: {err}"))?;
        Ok(stream)
    }

    /// Runs `command` on the device through the `exec:` service and returns raw stdout.
    pub fn exec(&self, serial: &str, command: &str, timeout: Duration) -> Result<Vec<u8>, String> {
        let deadline = Instant::now() + timeout;
        let mut stream = self.open(timeout)?;
        send_request(&mut stream, &format!("host:transport:{serial}"))?;
        read_status(&mut stream)?;
        send_request(&mut stream, &format!("exec:{command}"))?;
        read_status(&mut stream)?;
        read_until_eof(&mut stream, deadline)
    }
}

pub fn encode_request(payload: &str) -> Vec<u8> {
    let mut encoded = format!("{:04x}", payload.len()).into_bytes();
    encoded.extend_from_slice(payload.as_bytes());
    encoded
}

fn send_request(stream: &mut TcpStream, payload: &str) -> Result<(), String> {
    stream
        .write_all(&encode_request(payload))
        .map_err(|err| format!("Failed to send adb request: {err}"))
}

fn read_status<R: Read>(reader: &mut R) -> Result<(), String> {
    let mut status = [0u8; 4];
    reader
        .read_exact(&mut status)
        .map_err(|err| format!("Failed to read adb status: {err}"))?;
    match &status {
        b"OKAY" => Ok(()),
        b"FAIL" => {
            let message = read_length_prefixed(reader)
                .unwrap_or_else(|_| "unknown failure".to_string());
            Err(format!("adb server refused request: {message}"))
        }
        other => Err(format!(
            "Unexpected adb status: {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn read_length_prefixed<R: Read>(reader: &mut R) -> Result<String, String> {
    let mut len_hex = [0u8; 4];
    reader
        .read_exact(&mut len_hex)
        .map_err(|err| format!("Failed to read message length: {err}"))?;
    let len_text = String::from_utf8_lossy(&len_hex).to_string();
    let len = usize::from_str_radix(&len_text, 16)
        .map_err(|_| format!("Invalid message length: {len_text}"))?;
    let mut message = vec![0u8; len];
    reader
        .read_exact(&mut message)
        .map_err(|err| format!("Failed to read message: {err}"))?;
    Ok(String::from_utf8_lossy(&message).to_string())
}

fn read_until_eof<R: Read>(reader: &mut R, deadline: Instant) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::<u8>::new();
    let mut temp = [0u8; 16 * 1024];
    loop {
        if Instant::now() > deadline {
            return Err("adb server command timed out".to_string());
        }
        match reader.read(&mut temp) {
            Ok(0) => break,
            Ok(count) => buffer.extend_from_slice(&temp[..count]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err("adb server command timed out".to_string());
            }
            Err(err) => return Err(format!("Failed to read command output: {err}")),
        }
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;

    #[test]
    fn encodes_length_prefix_as_hex() {
        assert_eq!(encode_request("host:version"), b"000chost:version".to_vec());
        assert_eq!(
            encode_request("host:transport:emulator-5554"),
            b"001chost:transport:emulator-5554".to_vec()
        );
    }

    #[test]
    fn status_fail_carries_server_message() {
        let mut reader = Cursor::new(b"FAIL0010device not found".to_vec());
        let err = read_status(&mut reader).expect_err("should fail");
        assert!(err.contains("device not found"));
    }

    #[test]
    fn exec_talks_smart_socket_protocol() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept");
            let mut requests = Vec::new();
            for _ in 0..2 {
                let mut len_hex = [0u8; 4];
                socket.read_exact(&mut len_hex).expect("len");
                let len = usize::from_str_radix(std::str::from_utf8(&len_hex).expect("utf8"), 16)
                    .expect("hex");
                let mut payload = vec![0u8; len];
                socket.read_exact(&mut payload).expect("payload");
                requests.push(String::from_utf8(payload).expect("utf8"));
                socket.write_all(b"OKAY").expect("okay");
            }
            socket.write_all(b"\x89PNG\r\n\x1a\npixels").expect("body");
            requests
        });

        let client = AdbServerClient::new("127.0.0.1", port);
        let output = client
            .exec("SERIAL1", "screencap -p", Duration::from_secs(5))
            .expect("exec");
        assert!(output.starts_with(b"\x89PNG"));

        let requests = server.join().expect("server thread");
        assert_eq!(requests, vec!["host:transport:SERIAL1", "exec:screencap -p"]);
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let client = AdbServerClient::new("127.0.0.1", port);
        assert!(client
            .exec("SERIAL1", "getprop", Duration::from_millis(500))
            .is_err());
    }
}
