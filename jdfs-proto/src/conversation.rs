//! The RPC conversation layer (spec §4.5/§6), multiplexed onto the single
//! bidirectional TCP transport spec.md requires (spec §2 item 5, §6): one
//! connection carries both client-initiated conversations and the
//! server's unsolicited invalidation pushes, disambiguated by a one-byte
//! frame tag written ahead of every command/response frame.
//!
//! A *conversation* is one full round trip: a textual command name plus
//! positional object-token arguments, zero or more inline binary payloads,
//! an end-of-send marker; then an error-code token, zero or more result
//! tokens, zero or more binary payloads, and an end-of-receive marker.
//!
//! [`split`] turns one `TcpStream` into an [`RpcHandle`] (send commands,
//! send responses, make calls) and an [`InboundCommands`] (receive
//! commands the peer sent). A single background task owns the read half
//! and demultiplexes: a response frame completes the oldest outstanding
//! `call`, in wire order (the connection never reorders replies, so a
//! FIFO queue of waiters is all the demuxing this needs); a command frame
//! is handed to whichever side reads `InboundCommands` — `jdfsd`'s own
//! per-connection dispatch loop, or `jdfc`'s invalidation listener.
//!
//! Wire ordering is still a single-writer-at-a-time guarantee: `RpcHandle`
//! holds the write half behind a `tokio::sync::Mutex` taken for the
//! duration of one frame write, so two concurrent `call`s (one per FUSE
//! worker thread dispatching through the client, say) can never interleave
//! their bytes, and a waiter is registered under that same lock before the
//! request hits the wire, so the response queue can never race ahead of
//! what was actually sent.

use crate::token::Token;
use crate::wire::{read_i64, read_u32, write_i64, write_u32};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

const END_MARKER: u32 = 0xFFFF_FFFF;
const FRAME_COMMAND: u8 = 0;
const FRAME_RESPONSE: u8 = 1;

/// Writes one command frame: name, argument tokens, inline payloads, then
/// the end-of-send marker. Does not flush — callers batch with whatever
/// else the caller writes under the same lock.
pub async fn write_command<W: AsyncWrite + Unpin>(
    w: &mut W,
    name: &str,
    args: &[Token],
    payloads: &[&[u8]],
) -> io::Result<()> {
    write_u32(w, name.len() as u32).await?;
    w.write_all(name.as_bytes()).await?;
    write_u32(w, args.len() as u32).await?;
    for arg in args {
        arg.write(w).await?;
    }
    write_u32(w, payloads.len() as u32).await?;
    for payload in payloads {
        write_u32(w, payload.len() as u32).await?;
        w.write_all(payload).await?;
    }
    write_u32(w, END_MARKER).await?;
    w.flush().await
}

/// Reads one command frame as written by [`write_command`].
pub async fn read_command<R: AsyncRead + Unpin>(
    r: &mut R,
) -> io::Result<(String, Vec<Token>, Vec<Vec<u8>>)> {
    let name_len = read_u32(r).await? as usize;
    let mut name_buf = vec![0u8; name_len];
    r.read_exact(&mut name_buf).await?;
    let name = String::from_utf8(name_buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let arg_count = read_u32(r).await?;
    let mut args = Vec::with_capacity(arg_count as usize);
    for _ in 0..arg_count {
        args.push(Token::read(r).await?);
    }

    let payload_count = read_u32(r).await?;
    let mut payloads = Vec::with_capacity(payload_count as usize);
    for _ in 0..payload_count {
        let len = read_u32(r).await? as usize;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf).await?;
        payloads.push(buf);
    }

    let marker = read_u32(r).await?;
    if marker != END_MARKER {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing end-of-send marker"));
    }
    Ok((name, args, payloads))
}

/// Writes one response frame: error code, result tokens, payloads, marker.
pub async fn write_response<W: AsyncWrite + Unpin>(
    w: &mut W,
    error_code: i32,
    results: &[Token],
    payloads: &[&[u8]],
) -> io::Result<()> {
    write_i64(w, error_code as i64).await?;
    write_u32(w, results.len() as u32).await?;
    for result in results {
        result.write(w).await?;
    }
    write_u32(w, payloads.len() as u32).await?;
    for payload in payloads {
        write_u32(w, payload.len() as u32).await?;
        w.write_all(payload).await?;
    }
    write_u32(w, END_MARKER).await?;
    w.flush().await
}

/// Reads one response frame as written by [`write_response`].
pub async fn read_response<R: AsyncRead + Unpin>(
    r: &mut R,
) -> io::Result<(i32, Vec<Token>, Vec<Vec<u8>>)> {
    let error_code = read_i64(r).await? as i32;
    let result_count = read_u32(r).await?;
    let mut results = Vec::with_capacity(result_count as usize);
    for _ in 0..result_count {
        results.push(Token::read(r).await?);
    }
    let payload_count = read_u32(r).await?;
    let mut payloads = Vec::with_capacity(payload_count as usize);
    for _ in 0..payload_count {
        let len = read_u32(r).await? as usize;
        let mut buf = vec![0u8; len];
        r.read_exact(&mut buf).await?;
        payloads.push(buf);
    }
    let marker = read_u32(r).await?;
    if marker != END_MARKER {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "missing end-of-receive marker"));
    }
    Ok((error_code, results, payloads))
}

async fn write_tagged_command<W: AsyncWrite + Unpin>(w: &mut W, name: &str, args: &[Token], payloads: &[&[u8]]) -> io::Result<()> {
    w.write_u8(FRAME_COMMAND).await?;
    write_command(w, name, args, payloads).await
}

async fn write_tagged_response<W: AsyncWrite + Unpin>(w: &mut W, error_code: i32, results: &[Token], payloads: &[&[u8]]) -> io::Result<()> {
    w.write_u8(FRAME_RESPONSE).await?;
    write_response(w, error_code, results, payloads).await
}

enum Frame {
    Command(String, Vec<Token>, Vec<Vec<u8>>),
    Response(i32, Vec<Token>, Vec<Vec<u8>>),
}

async fn read_tagged_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Frame> {
    match r.read_u8().await? {
        FRAME_COMMAND => {
            let (name, args, payloads) = read_command(r).await?;
            Ok(Frame::Command(name, args, payloads))
        }
        FRAME_RESPONSE => {
            let (error, results, payloads) = read_response(r).await?;
            Ok(Frame::Response(error, results, payloads))
        }
        other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown frame tag {other}"))),
    }
}

/// One completed conversation's response.
#[derive(Debug, Clone)]
pub struct Response {
    pub error: i32,
    pub results: Vec<Token>,
    pub payloads: Vec<Vec<u8>>,
}

type Waiters = Arc<Mutex<VecDeque<oneshot::Sender<Response>>>>;

/// The write side of the multiplexed transport, shared by whichever side
/// needs to send: `jdfc`'s `RpcClient` calls through it, `jdfsd`'s
/// dispatch loop responds through it, and either side's notify pushes go
/// through it too.
#[derive(Clone)]
pub struct RpcHandle {
    write: Arc<Mutex<OwnedWriteHalf>>,
    waiters: Waiters,
}

/// The read side: every inbound command frame (conversations addressed to
/// this side, or unsolicited pushes), in arrival order. Inbound response
/// frames never reach here — they are consumed by the matching `call`
/// directly off the `waiters` queue.
pub struct InboundCommands {
    rx: mpsc::UnboundedReceiver<(String, Vec<Token>, Vec<Vec<u8>>)>,
}

/// Splits `stream` into a send handle and a receive handle, spawning the
/// one background task that reads and demultiplexes this connection for
/// its whole lifetime.
pub fn split(stream: TcpStream) -> (RpcHandle, InboundCommands) {
    let (read_half, write_half) = stream.into_split();
    let write = Arc::new(Mutex::new(write_half));
    let waiters: Waiters = Arc::new(Mutex::new(VecDeque::new()));
    let (tx, rx) = mpsc::unbounded_channel();

    let reader_waiters = waiters.clone();
    tokio::spawn(async move {
        let mut read_half: OwnedReadHalf = read_half;
        loop {
            match read_tagged_frame(&mut read_half).await {
                Ok(Frame::Response(error, results, payloads)) => {
                    let waiter = reader_waiters.lock().await.pop_front();
                    if let Some(sender) = waiter {
                        let _ = sender.send(Response { error, results, payloads });
                    }
                }
                Ok(Frame::Command(name, args, payloads)) => {
                    if tx.send((name, args, payloads)).is_err() {
                        return;
                    }
                }
                Err(_) => {
                    // Connection closed or corrupt: drop every outstanding
                    // waiter so an in-flight `call` fails immediately
                    // instead of hanging forever.
                    reader_waiters.lock().await.clear();
                    return;
                }
            }
        }
    });

    (RpcHandle { write, waiters }, InboundCommands { rx })
}

impl RpcHandle {
    /// Runs one full conversation: registers a waiter, sends the command
    /// frame, then awaits the matching response off the demux queue. The
    /// write lock is held only long enough to send — concurrent calls can
    /// have their requests queued back-to-back and each await its own
    /// reply independently, exactly as spec §5 describes.
    pub async fn call(&self, name: &str, args: &[Token], payloads: &[&[u8]]) -> io::Result<Response> {
        let (tx, rx) = oneshot::channel();
        {
            let mut write = self.write.lock().await;
            self.waiters.lock().await.push_back(tx);
            write_tagged_command(&mut *write, name, args, payloads).await?;
        }
        rx.await.map_err(|_| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before a response arrived"))
    }

    /// Fire-and-forget: a one-way push with no reply expected (the
    /// invalidation callbacks, spec §4.3/§6).
    pub async fn push(&self, name: &str, args: &[Token]) -> io::Result<()> {
        let mut write = self.write.lock().await;
        write_tagged_command(&mut *write, name, args, &[]).await
    }

    /// Replies to a command this handle's `InboundCommands` peer received.
    pub async fn respond(&self, error_code: i32, results: &[Token], payloads: &[&[u8]]) -> io::Result<()> {
        let mut write = self.write.lock().await;
        write_tagged_response(&mut *write, error_code, results, payloads).await
    }
}

impl InboundCommands {
    /// Waits for the next inbound command frame. Returns `None` once the
    /// connection has closed and no more frames will ever arrive.
    pub async fn recv(&mut self) -> Option<(String, Vec<Token>, Vec<Vec<u8>>)> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_round_trips_over_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let args = vec![Token::Int(1), Token::Str("hello".into())];
        let payload: &[u8] = b"payload-bytes";
        write_command(&mut a, "LookUpInode", &args, &[payload]).await.unwrap();
        let (name, got_args, payloads) = read_command(&mut b).await.unwrap();
        assert_eq!(name, "LookUpInode");
        assert_eq!(got_args, args);
        assert_eq!(payloads, vec![payload.to_vec()]);
    }

    #[tokio::test]
    async fn response_round_trips_with_multiple_payloads() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let results = vec![Token::Int(7)];
        write_response(&mut a, 0, &results, &[b"one", b"two"]).await.unwrap();
        let (error, got_results, payloads) = read_response(&mut b).await.unwrap();
        assert_eq!(error, 0);
        assert_eq!(got_results, results);
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    /// Two concurrent `call`s on the same `RpcHandle` never interleave
    /// their payload bytes on the wire, proving the write-lock-per-frame
    /// discipline actually serializes writers.
    #[tokio::test]
    async fn concurrent_calls_never_interleave_payload_bytes() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (handle, mut inbound) = split(stream);
            for _ in 0..2 {
                let (name, _args, _payloads) = inbound.recv().await.unwrap();
                let tag = if name == "WriteFile" { b'A' } else { b'B' };
                let body = vec![tag; 4096];
                handle.respond(0, &[], &[&body]).await.unwrap();
            }
        });

        let (client, _client_inbound) = split(TcpStream::connect(addr).await.unwrap());
        let c1 = client.clone();
        let c2 = client.clone();
        let (r1, r2) = tokio::join!(
            c1.call("WriteFile", &[Token::Int(1)], &[b"aaaa"]),
            c2.call("ReadFile", &[Token::Int(2)], &[b"bbbb"]),
        );
        let r1 = r1.unwrap();
        let r2 = r2.unwrap();
        for r in [&r1, &r2] {
            let payload = &r.payloads[0];
            let first = payload[0];
            assert!(first == b'A' || first == b'B');
            assert!(payload.iter().all(|&b| b == first));
        }
        assert_ne!(r1.payloads[0][0], r2.payloads[0][0]);
        server_task.await.unwrap();
    }

    /// A server-side push (e.g. an invalidation) and a client-side call's
    /// response share the same connection; the client's `InboundCommands`
    /// receives the push while the call's `Response` still resolves
    /// independently through the waiter queue.
    #[tokio::test]
    async fn push_and_response_are_demultiplexed_on_one_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (handle, mut inbound) = split(stream);
            let (name, _args, _payloads) = inbound.recv().await.unwrap();
            assert_eq!(name, "Mount");
            handle.push("InvalidateFileContent", &[Token::Int(1), Token::Int(0), Token::Int(4096)]).await.unwrap();
            handle.respond(0, &[Token::Int(1)], &[]).await.unwrap();
        });

        let (client, mut client_inbound) = split(TcpStream::connect(addr).await.unwrap());
        let call = client.call("Mount", &[], &[]);
        let recv = client_inbound.recv();
        let (resp, pushed) = tokio::join!(call, recv);
        assert_eq!(resp.unwrap().results, vec![Token::Int(1)]);
        let (pushed_name, _, _) = pushed.unwrap();
        assert_eq!(pushed_name, "InvalidateFileContent");
        server_task.await.unwrap();
    }

    /// A connection that closes mid-call drops its waiter rather than
    /// hanging the caller forever.
    #[tokio::test]
    async fn closed_connection_fails_a_pending_call_instead_of_hanging() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let (client, _inbound) = split(TcpStream::connect(addr).await.unwrap());
        let err = client.call("Mount", &[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
