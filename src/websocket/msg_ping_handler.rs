use tracing::{debug, error};
use chrono::Utc;
use crate::models::{PongMessage, SendMessage};
use crate::session::broadcast::{encode, Outbound};

/// Handle PingMessage. Answered by the transport, the engine never sees it.
pub fn handle_ping_message(connection_id: &str, outbound: &Outbound) {
    debug!("Ping message received on connection {}", connection_id);

    // Reply with pong
    let pong = SendMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() });
    let Some(pong_msg) = encode(&pong) else {
        return;
    };
    if outbound.send(pong_msg).is_err() {
        error!("Failed to send Pong message on connection {}", connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn replies_with_pong() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_ping_message("c1", &tx);
        let reply: SendMessage = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert!(matches!(reply, SendMessage::Pong(_)));
    }
}
