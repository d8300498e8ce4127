/*!
 * Socket front end.
 *
 * Accepts TCP connections and serves newline delimited JSON requests on
 * each, answering every request line with one response line. A connection
 * that stays silent longer than the read timeout is closed. A line longer
 * than the configured limit is discarded and answered with
 * `INVALID_ARGUMENT`.
 */
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument, Span};

use devmodel_core::config::ServerConfig;
use devmodel_core::error::Error as CoreError;
use devmodel_core::logging::component_span;
use devmodel_core::status::StatusCode;
use devmodel_core::utils::{millis_to_timeout, spawn_and_log, with_timeout};

use crate::error::Result;
use crate::protocol::{Envelope, Response};
use crate::service::Service;

/// A bound socket front end
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    service: Arc<Service>,
    limits: ConnectionLimits,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionLimits {
    read_timeout: Option<Duration>,
    max_request_bytes: usize,
}

impl Server {
    /// Bind to the configured address and port
    pub async fn bind(config: &ServerConfig, service: Service) -> Result<Self> {
        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            service: Arc::new(service),
            limits: ConnectionLimits {
                read_timeout: millis_to_timeout(config.read_timeout_ms),
                max_request_bytes: config.max_request_bytes,
            },
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let service = Arc::clone(&self.service);
                            let span = component_span("connection", Some(&addr.to_string()));
                            spawn_and_log(
                                &format!("client {}", addr),
                                handle_connection(socket, service, self.limits).instrument(span),
                            );
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Serve connections forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }
}

async fn handle_connection(
    socket: TcpStream,
    service: Arc<Service>,
    limits: ConnectionLimits,
) -> Result<()> {
    debug!("Client connected");
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        let Some(read) = read_bounded(&mut reader, &mut buf, limits).await? else {
            debug!("Read timeout, closing connection");
            break;
        };
        if read == 0 {
            debug!("Client disconnected");
            break;
        }

        if buf.last() != Some(&b'\n') && buf.len() > limits.max_request_bytes {
            warn!("Discarding request longer than {} bytes", limits.max_request_bytes);
            loop {
                match read_bounded(&mut reader, &mut buf, limits).await? {
                    Some(0) | None => return Ok(()),
                    Some(_) if buf.last() == Some(&b'\n') => break,
                    Some(_) => {}
                }
            }
            let response = Response::failure(
                StatusCode::InvalidArgument,
                format!("Request exceeds {} bytes", limits.max_request_bytes),
            );
            write_response(&mut writer, &response).await?;
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Envelope>(line) {
            Ok(envelope) => dispatch(&service, envelope).await,
            Err(e) => Response::failure(
                StatusCode::InvalidArgument,
                format!("Malformed request: {}", e),
            ),
        };
        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

/// Read up to one byte past the request limit into `buf`, stopping after a
/// newline. `None` means the read timed out.
async fn read_bounded(
    reader: &mut BufReader<OwnedReadHalf>,
    buf: &mut Vec<u8>,
    limits: ConnectionLimits,
) -> Result<Option<usize>> {
    buf.clear();
    let limit = limits.max_request_bytes as u64 + 1;
    let next = async move {
        reader
            .take(limit)
            .read_until(b'\n', buf)
            .await
            .map_err(CoreError::from)
    };
    let read = match limits.read_timeout {
        Some(duration) => match with_timeout(duration, next).await {
            Ok(read) => read,
            Err(CoreError::Timeout(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        },
        None => next.await?,
    };
    Ok(Some(read))
}

/// Run one request on the blocking pool, since it locks a device
async fn dispatch(service: &Arc<Service>, envelope: Envelope) -> Response {
    let service = Arc::clone(service);
    let span = Span::current();
    match tokio::task::spawn_blocking(move || span.in_scope(|| service.handle(envelope))).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request task failed: {}", e);
            Response::failure(StatusCode::Unknown, "Unexpected failure while handling request")
        }
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let mut encoded = serde_json::to_vec(response)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    Ok(())
}
