//! Echo handler.
//!
//! Writes back whatever it reads. Output is not buffered: when the socket
//! stops accepting data mid-write, the remainder is dropped with a warning.

use crate::server::{Connection, Server};
use std::io;
use tracing::{debug, warn};

/// Size of the stack buffer used per read
pub const ECHO_BUFFER_SIZE: usize = 4096;

/// Reads once from a readable client and echoes the bytes back.
pub fn echo(conn: &mut Connection<'_>) {
    let mut buf = [0u8; ECHO_BUFFER_SIZE];

    match conn.read(&mut buf) {
        Ok(0) => {
            debug!(slot = conn.slot(), "Client disconnected");
            conn.shutdown();
        }
        Ok(n) => write_all(conn, &buf[..n]),
        Err(e) if is_transient(&e) => {}
        Err(e) => {
            warn!(slot = conn.slot(), error = %e, "Read failed");
            conn.shutdown();
        }
    }
}

/// Registers [`echo`] as the read handler of `server`.
pub fn install(server: &mut Server) {
    server.register_read_handler(echo);
}

fn write_all(conn: &mut Connection<'_>, mut data: &[u8]) {
    while !data.is_empty() {
        match conn.write(data) {
            Ok(0) => {
                conn.shutdown();
                return;
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!(slot = conn.slot(), dropped = data.len(), "Send buffer full, dropping echo");
                return;
            }
            Err(e) => {
                warn!(slot = conn.slot(), error = %e, "Write failed");
                conn.shutdown();
                return;
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    fn echo_server() -> Server {
        let config = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_capacity(4)
            .with_accept_timeout(Duration::from_millis(5))
            .with_client_timeout(Duration::from_millis(20));
        let mut server = Server::bind(config).unwrap();
        install(&mut server);
        server
    }

    #[test]
    fn test_echo_round_trip() {
        let mut server = echo_server();
        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client.write_all(b"hello plexor").unwrap();

        for _ in 0..20 {
            server.run_once();
            if server.stats().bytes_written >= 12 {
                break;
            }
        }

        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 12];
        client.read_exact(&mut buf).unwrap();

        assert_eq!(&buf, b"hello plexor");
        let stats = server.stats();
        assert_eq!(stats.bytes_read, 12);
        assert_eq!(stats.bytes_written, 12);
    }

    #[test]
    fn test_echo_closes_on_peer_eof() {
        let mut server = echo_server();
        let client = TcpStream::connect(server.local_addr()).unwrap();
        server.run_once();
        assert_eq!(server.active_count(), 1);

        drop(client);

        for _ in 0..20 {
            if server.active_count() == 0 {
                break;
            }
            server.run_once();
        }

        assert_eq!(server.active_count(), 0);
        assert_eq!(server.stats().connections_closed(), 1);
    }
}
