// Server Module - TCP listener feeding JSON commands into the shared cloud state
use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::command::{last_object, Command};
use crate::state::CloudState;

pub const MAX_MESSAGE_BYTES: usize = 500;
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub async fn bind(ip: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{}:{}", ip, port);
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind command listener on {}", addr))
}

/// Accept connections forever, one task per client. Accept errors
/// (descriptor exhaustion, aborted handshakes) are logged and retried.
pub async fn serve(listener: TcpListener, state: Arc<CloudState>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept command connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        debug!("Command connection from {}", peer);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_connection(stream, &state).await;
        });
    }
}

/// Read one message (at most `MAX_MESSAGE_BYTES`, within `READ_TIMEOUT`),
/// apply it if it parses, then drop the connection.
async fn handle_connection(mut stream: TcpStream, state: &CloudState) {
    let mut buffer = vec![0u8; MAX_MESSAGE_BYTES];
    let mut len = 0;

    let read = tokio::time::timeout(READ_TIMEOUT, async {
        while len < MAX_MESSAGE_BYTES {
            let n = stream.read(&mut buffer[len..]).await?;
            if n == 0 {
                break;
            }
            len += n;
            if last_object(&String::from_utf8_lossy(&buffer[..len])).is_some() {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    })
    .await;

    match read {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!("Command connection read failed: {}", e);
            return;
        }
        Err(_) if len == 0 => {
            warn!("Connection timeout. No message received after {}s", READ_TIMEOUT.as_secs());
            return;
        }
        Err(_) => {}
    }

    let message = String::from_utf8_lossy(&buffer[..len]);
    let message = message.trim();
    if message.is_empty() {
        return;
    }
    debug!("Message received: {}", message);

    match Command::parse(message) {
        Ok(command) => state.apply(command),
        Err(e) => warn!("Ignoring command: {:#}", e),
    }
}

/// Run the command listener on its own thread with its own runtime
pub fn spawn_command_server(ip: String, port: u16, state: Arc<CloudState>) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new().name("commands".to_string()).spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to start command server runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            let listener = match bind(&ip, port).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("{:#}", e);
                    return;
                }
            };
            info!("Listening for commands on {}:{}", ip, port);
            serve(listener, state).await;
        });
    })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnimationMode, Rgb};
    use tokio::io::AsyncWriteExt;

    async fn start() -> (std::net::SocketAddr, Arc<CloudState>) {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(CloudState::new());
        tokio::spawn(serve(listener, Arc::clone(&state)));
        (addr, state)
    }

    async fn wait_for_generation(state: &CloudState, generation: u64) {
        for _ in 0..200 {
            if state.generation() >= generation {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("state never reached generation {}", generation);
    }

    #[tokio::test]
    async fn test_fixed_color_command_is_applied() {
        let (addr, state) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(br#"{"command":"fixed-color","red":12,"green":300,"blue":0}"#)
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        wait_for_generation(&state, 1).await;
        assert_eq!(state.mode(), AnimationMode::FixedColor);
        assert_eq!(state.color(), Rgb::new(12, 255, 0));
    }

    #[tokio::test]
    async fn test_object_completes_without_closing() {
        let (addr, state) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(br#"noise {"command":"rainbow"}"#).await.unwrap();

        wait_for_generation(&state, 1).await;
        assert_eq!(state.mode(), AnimationMode::Rainbow);
    }

    #[tokio::test]
    async fn test_failed_connections_do_not_stop_the_listener() {
        let (addr, state) = start().await;

        // closed without sending anything
        drop(TcpStream::connect(addr).await.unwrap());

        // closed mid-message
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"{\"command\":").await.unwrap();
        drop(client);

        // invalid UTF-8 and garbage
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[0xff, 0xfe, b'{', b'}']).await.unwrap();
        client.shutdown().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(br#"{"command":"rainbow"}"#).await.unwrap();
        client.shutdown().await.unwrap();

        wait_for_generation(&state, 1).await;
        assert_eq!(state.mode(), AnimationMode::Rainbow);
    }

    #[tokio::test]
    async fn test_malformed_command_changes_nothing() {
        let (addr, state) = start().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(br#"{"command":"fixed-color"}"#).await.unwrap();
        client.shutdown().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(br#"{"command":"patterns"}"#).await.unwrap();
        client.shutdown().await.unwrap();

        wait_for_generation(&state, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.generation(), 1);
        assert_eq!(state.mode(), AnimationMode::Patterns);
    }
}
