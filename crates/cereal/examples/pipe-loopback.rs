//! Two endpoints joined by an in-memory null-modem cable.
//!
//! Run with:
//!   cargo run --example pipe-loopback --features session

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::time::Duration;

    use cereal::session::{ConnectionManager, SessionConfig};
    use cereal::transport::TransportPort;

    let mut config = SessionConfig::default();
    config.settings.settle_delay = Duration::from_millis(10);
    config.baud_switch_pause = Duration::from_millis(10);

    let (server_tx, client_rx) = TransportPort::pipe_pair("server-tx", "client-rx")?;
    let (client_tx, server_rx) = TransportPort::pipe_pair("client-tx", "server-rx")?;

    let mut server = ConnectionManager::new(config.clone());
    let mut client = ConnectionManager::new(config);
    let server_events = server.take_events().ok_or("server events already taken")?;

    server.connect_with(server_tx, server_rx)?;
    client.connect_with(client_tx, client_rx)?;

    client.send_string(b"hello over the wire")?;
    client.change_baud(9600)?;
    client.disconnect()?;

    for event in server_events.iter() {
        eprintln!("server saw {}: {event:?}", event.kind());
        if event.is_terminal() {
            break;
        }
    }
    // The received shutdown already ended the server's session.
    assert!(!server.is_connected());
    server.disconnect()?;
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("pipe-loopback needs Unix socket pairs");
}
