//! Does all communication related stuff with the web socket to the relay.
//! Uses ewebsock, which runs the socket on its own thread and hands us events without blocking.

use crate::codec::{decode, encode};
use crate::error::RelayError;
use crate::traits::{RelayClient, TransportEvent};
use ewebsock::WsEvent::{Closed, Error, Message, Opened};
use ewebsock::{WsMessage, WsReceiver, WsSender};
use protocol::{ClientMessage, RelayMessage, Sequenced};
use tracing::{info, warn};

/// The connection state of the socket as far as sending is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SocketState {
    Connecting,
    Open,
    Closed,
}

/// A [`RelayClient`] on top of a web socket.
pub struct WebSocketRelay {
    sender: WsSender,
    receiver: WsReceiver,
    state: SocketState,
}

impl WebSocketRelay {
    /// Starts connecting. The connection is usable once [`TransportEvent::Opened`] got polled.
    pub fn connect(url: &str) -> Result<Self, RelayError> {
        let options = ewebsock::Options::default();
        let (sender, receiver) =
            ewebsock::connect(url, options).map_err(RelayError::ConnectFailed)?;
        info!(url, "Connecting to relay.");
        Ok(WebSocketRelay {
            sender,
            receiver,
            state: SocketState::Connecting,
        })
    }
}

impl RelayClient for WebSocketRelay {
    fn send(&mut self, message: &ClientMessage) -> Result<(), RelayError> {
        match self.state {
            SocketState::Open => {}
            SocketState::Connecting => return Err(RelayError::NotConnected),
            SocketState::Closed => {
                return Err(RelayError::Closed("Connection already closed".to_string()));
            }
        }
        let frame = encode(message)?;
        self.sender.send(WsMessage::Binary(frame));
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut result = Vec::new();
        while let Some(event) = self.receiver.try_recv() {
            match event {
                Opened => {
                    self.state = SocketState::Open;
                    result.push(TransportEvent::Opened);
                }
                Message(WsMessage::Binary(frame)) => {
                    match decode::<Sequenced<RelayMessage>>(&frame) {
                        Ok(envelope) => result.push(TransportEvent::Message(envelope)),
                        Err(error) => warn!(%error, "Dropping undecodable relay frame."),
                    }
                }
                Message(_) => {} // Ignore other message types, keep checking.
                Closed => {
                    self.state = SocketState::Closed;
                    result.push(TransportEvent::Closed(
                        "Connection closed by server".to_string(),
                    ));
                    break;
                }
                Error(context) => {
                    self.state = SocketState::Closed;
                    result.push(TransportEvent::Closed(context));
                    break;
                }
            }
        }
        result
    }
}
