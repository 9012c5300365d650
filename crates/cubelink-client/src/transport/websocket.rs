//! `tokio-tungstenite` transport.

use async_trait::async_trait;
use cubelink_settings::{ClientSettings, ConnectionSettings};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector as TlsConnector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument};

use super::{Connector, InboundSink, Link, Outbound};
use crate::errors::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects with `ws://` or `wss://` according to the settings.
///
/// With certificate validation disabled, any server certificate and host name
/// are accepted. Per-message compression is requested only if the underlying
/// library negotiates it; `tungstenite` currently does not, so the flag is
/// logged and the connection proceeds uncompressed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    #[instrument(skip_all, fields(generation = inbound.generation()))]
    async fn open(
        &self,
        settings: &ClientSettings,
        inbound: InboundSink,
    ) -> Result<Link, TransportError> {
        let conn = &settings.connection;
        let url = conn.url();
        let tls = tls_connector(conn)?;
        if conn.compression_enabled {
            debug!("permessage-deflate requested; transport sends uncompressed frames");
        }

        let (stream, response) =
            tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, true, tls)
                .await
                .map_err(connect_error)?;
        info!(%url, status = %response.status(), "websocket open");

        let (sink, stream) = stream.split();
        let (link, outbound) = Link::channel();
        let _ = tokio::spawn(write_loop(sink, outbound));
        let _ = tokio::spawn(read_loop(stream, inbound));
        Ok(link)
    }
}

fn tls_connector(conn: &ConnectionSettings) -> Result<Option<TlsConnector>, TransportError> {
    if !conn.tls_enabled || !conn.cert_validation_disabled {
        return Ok(None);
    }
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    Ok(Some(TlsConnector::NativeTls(tls)))
}

fn connect_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Url(e) => TransportError::InvalidUrl(e.to_string()),
        tungstenite::Error::Tls(e) => TransportError::Tls(e.to_string()),
        other => TransportError::Connect(other.to_string()),
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Text(frame) => {
                if let Err(err) = sink.send(Message::text(frame)).await {
                    debug!(%err, "websocket write failed");
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut stream: SplitStream<WsStream>, inbound: InboundSink) {
    let mut code = None;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if !inbound.text(text.as_str()) {
                    return;
                }
            }
            Ok(Message::Close(frame)) => {
                code = frame.map(|f| u16::from(f.code));
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "websocket read failed");
                break;
            }
        }
    }
    debug!(?code, "websocket closed");
    let _ = inbound.closed(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn plain_and_validated_tls_use_default_connector() {
        let mut conn = ConnectionSettings::default();
        assert!(tls_connector(&conn).unwrap().is_none());
        conn.tls_enabled = true;
        assert!(tls_connector(&conn).unwrap().is_none());
    }

    #[test]
    fn disabled_validation_builds_native_tls() {
        let conn = ConnectionSettings {
            tls_enabled: true,
            cert_validation_disabled: true,
            ..ConnectionSettings::default()
        };
        assert!(matches!(
            tls_connector(&conn),
            Ok(Some(TlsConnector::NativeTls(_)))
        ));
    }

    #[tokio::test]
    async fn refused_port_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut settings = ClientSettings::default();
        settings.connection.port = port;
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WebSocketConnector
            .open(&settings, InboundSink::new(1, tx))
            .await;
        assert_matches!(result, Err(TransportError::Connect(_)));
    }
}
