#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use sessionkeeper::auth::MemoryStore;
use sessionkeeper::session::SessionOptions;
use sessionkeeper::{SessionClient, SessionManager};

pub fn token(user_id: &str, email: &str, role: &str, exp: i64) -> String {
    let payload = serde_json::json!({
        "user_id": user_id,
        "email": email,
        "role": role,
        "exp": exp
    });
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

pub fn fresh_token(user_id: &str) -> String {
    let exp = (Utc::now() + chrono::Duration::hours(1)).timestamp();
    token(user_id, &format!("{}@example.com", user_id), "user", exp)
}

pub fn options(min_loading: Duration) -> SessionOptions {
    SessionOptions {
        min_loading,
        remote_logout_timeout: Duration::from_millis(300),
        remote_logout_on_stale_token: false,
    }
}

pub fn manager(base_url: &str, store: Arc<MemoryStore>, options: SessionOptions) -> SessionManager {
    let client = SessionClient::with_base_url(base_url).expect("client builds");
    SessionManager::new(options, store, client)
}

/// Accepts connections and never answers them.
pub async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Answers every request with `status` and a JSON `body` after `delay`.
pub async fn slow_server(delay: Duration, status: u16, body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                tokio::time::sleep(delay).await;
                let response = format!(
                    "HTTP/1.1 {} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}
