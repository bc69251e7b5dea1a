//! In-memory stand-in for the interpreter driver.
//!
//! Wires a [`MessageChannel`] to a task that reads requests and answers
//! with envelopes chosen by a test-supplied responder, so channel and
//! controller behavior can be checked without a Python process.

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use agentic_coder::kernel::channel::MessageChannel;

/// What the fake does after answering a request.
pub enum Reply {
    /// Write these envelopes and keep serving.
    Send(Vec<Value>),
    /// Write these envelopes, then close the output stream.
    SendAndClose(Vec<Value>),
}

/// Build one inbound envelope.
pub fn envelope(channel: &str, kind: &str, parent_id: Option<&str>, content: Value) -> Value {
    json!({
        "channel": channel,
        "kind": kind,
        "parent_id": parent_id,
        "content": content,
    })
}

pub fn stream(parent_id: &str, name: &str, text: &str) -> Value {
    envelope(
        "broadcast",
        "stream",
        Some(parent_id),
        json!({ "name": name, "text": text }),
    )
}

pub fn status(parent_id: &str, state: &str) -> Value {
    envelope(
        "broadcast",
        "status",
        Some(parent_id),
        json!({ "execution_state": state }),
    )
}

pub fn execute_result(parent_id: &str, text: &str) -> Value {
    envelope(
        "broadcast",
        "execute_result",
        Some(parent_id),
        json!({ "data": { "text/plain": text } }),
    )
}

/// Spawn a fake driver and return a channel connected to it.
///
/// `respond` receives every decoded request.
pub fn spawn<F>(respond: F) -> MessageChannel
where
    F: Fn(&Value) -> Reply + Send + 'static,
{
    let (host_in, driver_in) = tokio::io::duplex(64 * 1024);
    let (driver_out, host_out) = tokio::io::duplex(64 * 1024);

    tokio::spawn(serve(driver_in, driver_out, respond));

    MessageChannel::open("fake", host_in, host_out, None::<DuplexStream>, 16)
}

async fn serve<F>(input: DuplexStream, mut output: DuplexStream, respond: F)
where
    F: Fn(&Value) -> Reply + Send + 'static,
{
    let mut lines = BufReader::new(input).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let request: Value = serde_json::from_str(&line).expect("request is json");
        let (messages, close) = match respond(&request) {
            Reply::Send(messages) => (messages, false),
            Reply::SendAndClose(messages) => (messages, true),
        };
        for message in messages {
            let mut encoded = message.to_string();
            encoded.push('\n');
            if output.write_all(encoded.as_bytes()).await.is_err() {
                return;
            }
        }
        if close {
            return;
        }
    }
}

/// Correlation id of a request.
pub fn request_id(request: &Value) -> String {
    request["id"].as_str().expect("request id").to_owned()
}
