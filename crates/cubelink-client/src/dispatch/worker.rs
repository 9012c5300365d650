//! Connect worker: opens the socket off the dispatch task.

use std::sync::Arc;

use cubelink_settings::ClientSettings;
use tokio::sync::mpsc;
use tracing::debug;

use super::Event;
use crate::errors::TransportError;
use crate::transport::{Connector, InboundSink, Link};

/// Open a link, hand it to the dispatcher, then send the authentication frame.
///
/// The link is handed over first so the server's reply can never be
/// processed before the dispatcher knows about the link.
pub(super) async fn connect(
    connector: Arc<dyn Connector>,
    settings: Arc<ClientSettings>,
    auth_frame: String,
    inbound: InboundSink,
    events: mpsc::UnboundedSender<Event>,
) {
    let generation = inbound.generation();
    match open(connector.as_ref(), &settings, inbound.clone()).await {
        Ok(link) => {
            let handed = events
                .send(Event::ConnectFinished {
                    generation,
                    result: Ok(link.clone()),
                })
                .is_ok();
            if !handed {
                link.close();
                return;
            }
            if link.send_text(auth_frame).is_err() {
                debug!(generation, "link died before authentication was sent");
                let _ = inbound.closed(None);
            }
        }
        Err(err) => {
            let _ = events.send(Event::ConnectFinished {
                generation,
                result: Err(err),
            });
        }
    }
}

async fn open(
    connector: &dyn Connector,
    settings: &ClientSettings,
    inbound: InboundSink,
) -> Result<Link, TransportError> {
    if !settings.connection.is_configured() {
        return Err(TransportError::InvalidUrl(format!(
            "server address not configured ({})",
            settings.connection.url()
        )));
    }
    let limit = settings.timing.connect_timeout();
    tokio::time::timeout(limit, connector.open(settings, inbound))
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    struct Hanging;

    #[async_trait]
    impl Connector for Hanging {
        async fn open(
            &self,
            _settings: &ClientSettings,
            _inbound: InboundSink,
        ) -> Result<Link, TransportError> {
            std::future::pending().await
        }
    }

    struct Immediate {
        writer: std::sync::Mutex<Option<mpsc::UnboundedReceiver<crate::transport::Outbound>>>,
    }

    #[async_trait]
    impl Connector for Immediate {
        async fn open(
            &self,
            _settings: &ClientSettings,
            _inbound: InboundSink,
        ) -> Result<Link, TransportError> {
            let (link, rx) = Link::channel();
            if let Ok(mut slot) = self.writer.lock() {
                *slot = Some(rx);
            }
            Ok(link)
        }
    }

    fn sink() -> (InboundSink, mpsc::UnboundedSender<Event>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InboundSink::new(3, tx.clone()), tx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_connect_times_out() {
        let (inbound, tx, mut rx) = sink();
        let settings = Arc::new(ClientSettings::default());
        connect(Arc::new(Hanging), settings, "{}".into(), inbound, tx).await;
        assert_matches!(
            rx.recv().await,
            Some(Event::ConnectFinished {
                generation: 3,
                result: Err(TransportError::Timeout(d)),
            }) if d == Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn unconfigured_address_fails_without_opening() {
        let (inbound, tx, mut rx) = sink();
        let mut settings = ClientSettings::default();
        settings.connection.host.clear();
        connect(Arc::new(Hanging), Arc::new(settings), "{}".into(), inbound, tx).await;
        assert_matches!(
            rx.recv().await,
            Some(Event::ConnectFinished {
                result: Err(TransportError::InvalidUrl(_)),
                ..
            })
        );
    }

    #[tokio::test]
    async fn link_handed_over_before_auth_frame() {
        let (inbound, tx, mut rx) = sink();
        let connector = Arc::new(Immediate {
            writer: std::sync::Mutex::new(None),
        });
        connect(
            connector.clone(),
            Arc::new(ClientSettings::default()),
            "auth".into(),
            inbound,
            tx,
        )
        .await;

        assert_matches!(
            rx.recv().await,
            Some(Event::ConnectFinished { result: Ok(_), .. })
        );
        let mut writer = connector.writer.lock().unwrap().take().unwrap();
        assert_eq!(
            writer.recv().await,
            Some(crate::transport::Outbound::Text("auth".into()))
        );
    }
}
