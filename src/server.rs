use std::{io, net::SocketAddr, sync::Arc};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    task::JoinSet,
};

use crate::{
    read_packet, write_reply, RequestDispatcher, ServerError, Transport, MAX_TCP_PACKET_SIZE,
    MAX_UDP_PACKET_SIZE,
};

// EDNS clients may send datagrams larger than the 512 bytes we answer with.
const UDP_RECV_BUFFER_SIZE: usize = 4096;

/// A UDP socket and a TCP listener on the same address, both feeding one dispatcher.
pub struct Server {
    udp: UdpSocket,
    tcp: TcpListener,
    dispatcher: Arc<RequestDispatcher>,
}

impl Server {
    /// Binds UDP first and then TCP on the very same address, so a port of 0 gives both
    /// transports the same ephemeral port.
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<RequestDispatcher>,
    ) -> Result<Server, ServerError> {
        let udp = UdpSocket::bind(addr)
            .await
            .map_err(ServerError::transport(Transport::Udp))?;
        let local = udp
            .local_addr()
            .map_err(ServerError::transport(Transport::Udp))?;
        let tcp = TcpListener::bind(local)
            .await
            .map_err(ServerError::transport(Transport::Tcp))?;

        Ok(Server {
            udp,
            tcp,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Serves until either listener stops. The other one is shut down before the outcome of
    /// the first is returned; there is no restart.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            udp,
            tcp,
            dispatcher,
        } = self;

        let mut listeners = JoinSet::new();
        listeners.spawn(serve_udp(Arc::new(udp), dispatcher.clone()));
        listeners.spawn(serve_tcp(tcp, dispatcher));

        supervise(listeners).await
    }
}

async fn supervise(mut listeners: JoinSet<Result<(), ServerError>>) -> Result<(), ServerError> {
    let outcome = match listeners.join_next().await {
        Some(Ok(result)) => result,
        Some(Err(e)) => Err(ServerError::from(e)),
        None => Ok(()),
    };

    listeners.shutdown().await;
    outcome
}

async fn serve_udp(
    socket: Arc<UdpSocket>,
    dispatcher: Arc<RequestDispatcher>,
) -> Result<(), ServerError> {
    let mut buf = vec![0u8; UDP_RECV_BUFFER_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if is_transient(&e) => {
                warn!("udp: {}", e);
                continue;
            }
            Err(e) => return Err(ServerError::transport(Transport::Udp)(e)),
        };

        if len == buf.len() {
            debug!("Datagram from {} filled the buffer and may have been cut short", src);
        }

        let request = buf[..len].to_vec();
        let socket = socket.clone();
        let dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            if let Some(reply) = respond(&dispatcher, &request, MAX_UDP_PACKET_SIZE).await {
                if let Err(e) = socket.send_to(&reply, src).await {
                    debug!("Failed to answer {} over udp: {}", src, e);
                }
            }
        });
    }
}

async fn serve_tcp(
    listener: TcpListener,
    dispatcher: Arc<RequestDispatcher>,
) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) if is_transient(&e) => {
                warn!("tcp: {}", e);
                continue;
            }
            Err(e) => return Err(ServerError::transport(Transport::Tcp)(e)),
        };

        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, &dispatcher).await {
                debug!("Connection from {} closed: {}", peer, e);
            }
        });
    }
}

// Messages on a stream are prefixed with their length as two bytes (RFC 1035 4.2.2). A client
// may send several on one connection.
async fn serve_connection(mut stream: TcpStream, dispatcher: &RequestDispatcher) -> io::Result<()> {
    loop {
        let len = match stream.read_u16().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut request = vec![0u8; len];
        stream.read_exact(&mut request).await?;

        let reply = match respond(dispatcher, &request, MAX_TCP_PACKET_SIZE).await {
            Some(reply) => reply,
            None => return Ok(()),
        };

        stream.write_u16(reply.len() as u16).await?;
        stream.write_all(&reply).await?;
    }
}

/// Wire bytes in, wire bytes out. `None` means there is nothing sensible to send back.
async fn respond(
    dispatcher: &RequestDispatcher,
    request: &[u8],
    max_size: usize,
) -> Option<Vec<u8>> {
    let reply = match read_packet(request) {
        Ok(packet) if packet.header.response => {
            debug!("Ignoring response {}", packet.header.id);
            return None;
        }
        Ok(packet) => dispatcher.dispatch(&packet).await,
        Err(e) => {
            warn!("Unreadable request: {}", e);
            RequestDispatcher::format_error(request)?
        }
    };

    match write_reply(&reply, max_size) {
        Ok(bytes) => {
            info!(
                "Reply {}: {:?} with {} answer(s)",
                reply.header.id,
                reply.rescode(),
                reply.answers.len()
            );
            Some(bytes)
        }
        Err(e) => {
            error!("Failed to encode reply {}: {}", reply.header.id, e);
            None
        }
    }
}

// Errors that concern one peer or one packet, not the socket itself.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{docker::testing::StaticInspector, ResponseCode};
    use pretty_assertions::assert_eq;
    use std::future::pending;
    use tokio::sync::oneshot;

    fn dispatcher() -> Arc<RequestDispatcher> {
        Arc::new(RequestDispatcher::new(Arc::new(StaticInspector::default())))
    }

    fn crash() -> Result<(), ServerError> {
        panic!("listener crashed")
    }

    #[tokio::test]
    async fn first_failure_stops_the_other_listener() {
        let (guard, released) = oneshot::channel::<()>();
        let mut listeners = JoinSet::new();
        listeners.spawn(async move {
            let _guard = guard;
            pending::<()>().await;
            Ok(())
        });
        listeners.spawn(async {
            Err(ServerError::transport(Transport::Tcp)(io::Error::new(
                io::ErrorKind::AddrInUse,
                "address in use",
            )))
        });

        match supervise(listeners).await {
            Err(ServerError::Transport { transport, .. }) => assert_eq!(transport, Transport::Tcp),
            other => panic!("expected a tcp failure, got {:?}", other),
        }
        // The pending listener was dropped, and its guard with it.
        assert!(released.await.is_err());
    }

    #[tokio::test]
    async fn panicking_listener_is_a_failure() {
        let mut listeners = JoinSet::new();
        listeners.spawn(async {
            pending::<()>().await;
            Ok(())
        });
        listeners.spawn(async { crash() });

        assert!(matches!(
            supervise(listeners).await,
            Err(ServerError::Task(_))
        ));
    }

    #[tokio::test]
    async fn taken_port_fails_to_bind() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        match Server::bind(addr, dispatcher()).await {
            Err(ServerError::Transport { transport, .. }) => assert_eq!(transport, Transport::Udp),
            Err(other) => panic!("expected a udp failure, got {:?}", other),
            Ok(_) => panic!("bound a port that was taken"),
        }
    }

    #[tokio::test]
    async fn both_transports_share_a_port() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), dispatcher())
            .await
            .unwrap();

        assert_eq!(server.tcp.local_addr().unwrap(), server.local_addr().unwrap());
    }

    #[tokio::test]
    async fn responses_are_not_answered() {
        let response = [0x0b, 0xad, 0x81, 0x80, 0, 0, 0, 0, 0, 0, 0, 0];

        assert_eq!(respond(&dispatcher(), &response, MAX_UDP_PACKET_SIZE).await, None);
    }

    fn request_for(qname: &[u8]) -> Vec<u8> {
        let mut request = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        request.extend_from_slice(qname);
        request.extend_from_slice(&[0, 1, 0, 1]);
        request
    }

    #[tokio::test]
    async fn replies_repeat_the_question_byte_for_byte() {
        let mut high_bytes = vec![63];
        high_bytes.extend_from_slice(&[0xff; 63]);
        high_bytes.push(0);
        let dotted_label = b"\x03a.b\x06docker\x00".to_vec();

        for qname in &[high_bytes, dotted_label] {
            let request = request_for(qname);

            let bytes = respond(&dispatcher(), &request, MAX_UDP_PACKET_SIZE)
                .await
                .unwrap();
            let reply = read_packet(&bytes).unwrap();

            assert_eq!(reply.header.id, 0x1234);
            assert_eq!(reply.rescode(), ResponseCode::REFUSED);
            assert_eq!(&bytes[12..], &request[12..]);
        }
    }

    #[tokio::test]
    async fn unreadable_requests_get_format_error() {
        let request = [0x0b, 0xad, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0, 0x05, 0x77];

        let bytes = respond(&dispatcher(), &request, MAX_UDP_PACKET_SIZE)
            .await
            .unwrap();
        let reply = read_packet(&bytes).unwrap();

        assert_eq!(reply.header.id, 0x0bad);
        assert_eq!(reply.rescode(), ResponseCode::FORMERR);
    }
}
