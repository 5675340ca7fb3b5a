use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::connector::{ChannelConnector, ChannelEvent, ChannelSink, OpenChannel};

/// WebSocket channel connector
///
/// Each open channel runs two tasks: a writer draining queued outbound
/// messages and a reader forwarding inbound frames as [`ChannelEvent`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

enum Outbound {
    Data(Vec<u8>),
    Close,
}

#[async_trait::async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, url: Url) -> Result<OpenChannel> {
        info!("Connecting WebSocket at {}", url);

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("Failed to connect WebSocket at {}", url))?;

        info!("WebSocket connected: {}", url);

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let writer_url = url.clone();
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Data(data) => {
                        if let Err(e) = write.send(Message::Binary(data)).await {
                            warn!("WebSocket send to {} failed: {}", writer_url, e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        if let Err(e) = write.close().await {
                            debug!("WebSocket close for {} failed: {}", writer_url, e);
                        }
                        break;
                    }
                }
            }
            debug!("WebSocket writer stopped: {}", writer_url);
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => ChannelEvent::Text(text),
                    Ok(Message::Binary(data)) => ChannelEvent::Binary(data),
                    Ok(Message::Close(frame)) => {
                        debug!("WebSocket {} closed by peer: {:?}", url, frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("WebSocket {} read error: {}", url, e);
                        break;
                    }
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            let _ = event_tx.send(ChannelEvent::Closed);
        });

        Ok(OpenChannel {
            sink: Box::new(WsSink { tx: out_tx }),
            events: event_rx,
        })
    }
}

struct WsSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink for WsSink {
    fn send(&self, data: Vec<u8>) -> Result<()> {
        self.tx
            .send(Outbound::Data(data))
            .map_err(|_| anyhow!("WebSocket is closed"))
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}
