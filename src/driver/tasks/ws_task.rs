//! The background task that owns a single websocket attempt: it sends
//! heartbeats on their own cadence, forwards inbound gateway events, and
//! reports connection loss back to the driver loop.

use super::message::{CoreMessage, WsMessage};
use super::Interconnect;
use crate::driver::heartbeat::{HeartbeatAckResult, HeartbeatTicker};
use crate::events::GatewayEvent;
use crate::model::{payload::Heartbeat, payload::Speaking, Payload};
use crate::ws::{Error as WsError, ReceiverExt, SenderExt, WsStream};
use flume::Receiver;
use tokio::select;
use tracing::{debug, instrument, trace, warn};

pub(crate) struct WsTask {
    rx: Receiver<WsMessage>,
    ws_client: WsStream,
    dont_send: bool,
    ssrc: u32,
    speaking: bool,
    heartbeat: HeartbeatTicker,
}

impl WsTask {
    pub(crate) fn new(
        rx: Receiver<WsMessage>,
        ws_client: WsStream,
        ssrc: u32,
        heartbeat_interval: std::time::Duration,
    ) -> Self {
        Self {
            rx,
            ws_client,
            dont_send: false,
            ssrc,
            speaking: false,
            heartbeat: HeartbeatTicker::new(heartbeat_interval),
        }
    }

    #[instrument(skip(self, interconnect))]
    pub(crate) async fn run(&mut self, interconnect: &Interconnect) {
        loop {
            let mut ws_error: Option<WsError> = None;

            select! {
                () = self.heartbeat.deadline() => {
                    if let Err(e) = self.send_heartbeat().await {
                        ws_error = Some(e);
                    }
                }
                ws_msg = self.ws_client.recv_json_no_timeout(), if !self.dont_send => {
                    match ws_msg {
                        Err(e) => ws_error = Some(e),
                        Ok(Some(msg)) => self.process_ws(interconnect, msg),
                        Ok(None) => {},
                    }
                }
                inner_msg = self.rx.recv_async() => {
                    match inner_msg {
                        Ok(WsMessage::Ws(client)) => {
                            self.ws_client = *client;
                            self.dont_send = false;
                        },
                        Ok(WsMessage::SetKeepalive(interval)) => {
                            self.heartbeat.set_interval(interval);
                        },
                        Ok(WsMessage::Speaking(is_speaking)) => {
                            if is_speaking != self.speaking && !self.dont_send {
                                self.speaking = is_speaking;
                                if let Err(e) = self.send_speaking(is_speaking).await {
                                    ws_error = Some(e);
                                }
                            }
                        },
                        Err(flume::RecvError::Disconnected) => break,
                    }
                }
            }

            if let Some(e) = ws_error {
                self.dont_send = true;
                let close_code = close_code_of(&e);
                debug!("websocket task lost its connection: {e}");
                drop(interconnect.core.send(CoreMessage::ConnectionLost { close_code }));
                break;
            }
        }
    }

    async fn send_heartbeat(&mut self) -> Result<(), WsError> {
        let nonce = self.heartbeat.beat();
        trace!("sending heartbeat {nonce}");

        if !self.dont_send {
            self.ws_client.send_json(&Payload::Heartbeat(Heartbeat { nonce })).await?;
        }

        Ok(())
    }

    async fn send_speaking(&mut self, is_speaking: bool) -> Result<(), WsError> {
        trace!("changing speaking state to {is_speaking}");
        self.ws_client
            .send_json(&Payload::Speaking(Speaking {
                flags: if is_speaking { 1 } else { 0 },
                delay: 0,
                ssrc: self.ssrc,
            }))
            .await
    }

    fn process_ws(&mut self, interconnect: &Interconnect, value: Payload) {
        match value {
            Payload::Speaking(ev) => {
                interconnect.fire(GatewayEvent::SpeakingStateUpdate {
                    user_id: None,
                    ssrc: ev.ssrc,
                    speaking: ev.flags != 0,
                });
            },
            Payload::ClientConnect(ev) => {
                interconnect.fire(GatewayEvent::ClientConnect {
                    user_id: ev.user_id,
                    audio_ssrc: ev.audio_ssrc,
                });
            },
            Payload::ClientDisconnect(ev) => {
                interconnect.fire(GatewayEvent::ClientDisconnect { user_id: ev.user_id });
            },
            Payload::HeartbeatAck(ev) => match self.heartbeat.acknowledge(ev.nonce) {
                HeartbeatAckResult::Matched => trace!("heartbeat ack received"),
                HeartbeatAckResult::Mismatched { expected } =>
                    warn!("heartbeat nonce mismatch! expected {expected}, saw {}", ev.nonce),
                HeartbeatAckResult::Unsolicited => warn!("unsolicited heartbeat ack"),
            },
            other => trace!("received other gateway payload: {other:?}"),
        }
    }
}

fn close_code_of(err: &WsError) -> Option<u16> {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

    match err {
        WsError::WsClosed(Some(frame)) => match frame.code {
            WsCloseCode::Library(l) => Some(l),
            _ => None,
        },
        _ => None,
    }
}

#[instrument(skip(interconnect, task))]
pub(crate) async fn runner(interconnect: Interconnect, mut task: WsTask) {
    trace!("websocket task started");
    task.run(&interconnect).await;
    trace!("websocket task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::{
        frame::coding::CloseCode as WsCloseCode,
        CloseFrame,
    };

    #[test]
    fn library_close_code_is_extracted() {
        let frame = CloseFrame { code: WsCloseCode::Library(4015), reason: "".into() };
        let err = WsError::WsClosed(Some(frame));
        assert_eq!(close_code_of(&err), Some(4015));
    }

    #[test]
    fn non_library_close_code_is_none() {
        let frame = CloseFrame { code: WsCloseCode::Normal, reason: "".into() };
        let err = WsError::WsClosed(Some(frame));
        assert_eq!(close_code_of(&err), None);
    }

    #[test]
    fn no_frame_is_none() {
        assert_eq!(close_code_of(&WsError::WsClosed(None)), None);
    }
}
