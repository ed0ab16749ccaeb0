//! Connection drivers for the file server.
//!
//! # Responsibilities
//! - Run the HTTP/1.1 request loop over plaintext or TLS streams
//! - Serve `h2` connections through hyper
//! - Pick the driver from the negotiated protocol
//! - Record one response metric per reply
//!
//! # Design Decisions
//! - HTTP/1.1 uses the crate's own codec so the plaintext path can reach
//!   `sendfile`; hyper owns framing only for `h2`
//! - On `h2` a reply that would close an HTTP/1.1 connection (failures,
//!   redirects, listings, 304) starts a graceful shutdown: GOAWAY goes out,
//!   streams already in flight finish, then the connection ends

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::stream::try_unfold;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::CONNECTION;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

use crate::http::codec::{encode_head, read_request, Decoded};
use crate::http::request::PendingRequest;
use crate::http::response::{Reply, ReplyBody, StreamedFile};
use crate::http::transfer::Transport;
use crate::net::negotiate::{ApplicationProtocol, Negotiated};
use crate::observability::metrics;
use crate::static_files::StaticFileHandler;

/// Response body type handed to hyper.
pub type H2Body = UnsyncBoxBody<Bytes, io::Error>;

/// Serve a connection after protocol selection.
pub async fn serve_negotiated(
    negotiated: Negotiated,
    handler: Arc<StaticFileHandler>,
) -> io::Result<()> {
    match negotiated {
        Negotiated::Plain(stream) => serve_http1(stream, &handler).await,
        Negotiated::Tls {
            stream,
            protocol: ApplicationProtocol::Http2,
        } => serve_h2(*stream, handler).await.map_err(io::Error::other),
        Negotiated::Tls {
            stream,
            protocol: ApplicationProtocol::Http11,
        } => serve_http1(*stream, &handler).await,
    }
}

/// HTTP/1.1 request loop. Requests are answered one at a time, in order;
/// undecoded bytes carry over to the next iteration.
pub async fn serve_http1<S: Transport>(mut stream: S, handler: &StaticFileHandler) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let (decoded, has_body) = match read_request(&mut stream, &mut buf).await? {
            Decoded::Closed => break,
            Decoded::Request { request, has_body } => (Ok(request), has_body),
            Decoded::Invalid(err) => (Err(err), true),
        };

        let mut reply = handler.respond(decoded).await;
        if has_body {
            reply.close = true;
        }
        metrics::record_response(reply.status.as_u16());

        write_reply(&mut stream, &mut reply).await?;
        if reply.close {
            break;
        }
    }

    let _ = stream.shutdown().await;
    Ok(())
}

async fn write_reply<S: Transport>(stream: &mut S, reply: &mut Reply) -> io::Result<()> {
    let mut head = encode_head(reply.status, &reply.headers, reply.close);
    match &mut reply.body {
        ReplyBody::Empty => stream.write_all(&head).await?,
        ReplyBody::Full(body) => {
            head.extend_from_slice(body);
            stream.write_all(&head).await?;
        }
        ReplyBody::File(file) => {
            stream.write_all(&head).await?;
            stream.flush().await?;
            let sent = stream.send_file(file).await?;
            tracing::trace!(bytes = sent, "File body sent");
        }
    }
    stream.flush().await
}

/// Serve an `h2` connection until the peer goes away or a reply asks for
/// the connection to close.
pub async fn serve_h2<S>(stream: S, handler: Arc<StaticFileHandler>) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let closing = Arc::new(Notify::new());
    let service = {
        let closing = closing.clone();
        service_fn(move |request: Request<Incoming>| {
            let handler = handler.clone();
            let closing = closing.clone();
            async move {
                let pending =
                    PendingRequest::from_h2(request.method(), request.uri(), request.headers());
                let reply = handler.respond(Ok(pending)).await;
                metrics::record_response(reply.status.as_u16());
                if reply.close {
                    closing.notify_one();
                }
                Ok::<_, Infallible>(into_h2_response(reply))
            }
        })
    };

    let connection = http2::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => return result,
        _ = closing.notified() => {}
    }
    tracing::debug!("Closing h2 connection after failure reply");
    connection.as_mut().graceful_shutdown();
    connection.await
}

fn into_h2_response(reply: Reply) -> Response<H2Body> {
    let body: H2Body = match reply.body {
        ReplyBody::Empty => Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync(),
        ReplyBody::Full(bytes) => Full::new(bytes)
            .map_err(|never| match never {})
            .boxed_unsync(),
        ReplyBody::File(file) => file_body(file),
    };

    let mut response = Response::new(body);
    *response.status_mut() = reply.status;
    *response.headers_mut() = reply.headers;
    response.headers_mut().remove(CONNECTION);
    response
}

/// Chunked file body; hyper ends the stream after the last chunk.
fn file_body(file: StreamedFile) -> H2Body {
    let chunks = try_unfold(file, |mut file| async move {
        let next = file.read_chunk().await?;
        Ok::<_, io::Error>(next.map(|chunk| (Frame::data(chunk), file)))
    });
    StreamBody::new(chunks).boxed_unsync()
}
