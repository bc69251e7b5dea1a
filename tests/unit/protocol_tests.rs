//! Unit tests for the interpreter wire model.

use agentic_coder::kernel::protocol::{
    parse_inbound_line, Channel, ExecutionState, KernelEvent, Request,
};

// ── Outbound ─────────────────────────────────────────────────

#[test]
fn execute_request_serializes_with_kind_tag() {
    let request = Request::execute("abc", "x = 1");
    let json: serde_json::Value = serde_json::to_value(&request).expect("serialize");

    assert_eq!(json["kind"], "execute");
    assert_eq!(json["id"], "abc");
    assert_eq!(json["code"], "x = 1");
    assert_eq!(json["silent"], false);
    assert_eq!(json["store_history"], true);
    assert_eq!(request.id(), "abc");
}

#[test]
fn ping_and_shutdown_carry_ids() {
    let ping = serde_json::to_string(&Request::Ping { id: "p".into() }).expect("ping");
    let shutdown =
        serde_json::to_string(&Request::Shutdown { id: "s".into() }).expect("shutdown");

    assert_eq!(ping, r#"{"kind":"ping","id":"p"}"#);
    assert_eq!(shutdown, r#"{"kind":"shutdown","id":"s"}"#);
}

// ── Inbound ──────────────────────────────────────────────────

#[test]
fn parses_stdout_and_stderr_streams() {
    let out = parse_inbound_line(
        r#"{"channel":"broadcast","kind":"stream","parent_id":"a","content":{"name":"stdout","text":"hi\n"}}"#,
    )
    .expect("parse")
    .expect("message");
    let err = parse_inbound_line(
        r#"{"channel":"broadcast","kind":"stream","parent_id":"a","content":{"name":"stderr","text":"warn"}}"#,
    )
    .expect("parse")
    .expect("message");

    assert_eq!(out.channel, Channel::Broadcast);
    assert_eq!(out.event, KernelEvent::Stdout("hi\n".into()));
    assert_eq!(err.event, KernelEvent::Stderr("warn".into()));
    assert!(out.is_reply_to("a"));
    assert!(!out.is_reply_to("b"));
}

#[test]
fn parses_execute_result_plain_text() {
    let message = parse_inbound_line(
        r#"{"channel":"broadcast","kind":"execute_result","parent_id":"a","content":{"data":{"text/plain":"[1, 2]"}}}"#,
    )
    .expect("parse")
    .expect("message");

    assert_eq!(message.event, KernelEvent::ExecuteResult("[1, 2]".into()));
}

#[test]
fn parses_status_and_ready() {
    let idle = parse_inbound_line(
        r#"{"channel":"broadcast","kind":"status","parent_id":"a","content":{"execution_state":"idle"}}"#,
    )
    .expect("parse")
    .expect("message");
    let ready = parse_inbound_line(
        r#"{"channel":"control","kind":"ready","parent_id":null,"content":{"pid":4242,"cwd":"/tmp"}}"#,
    )
    .expect("parse")
    .expect("message");

    assert_eq!(idle.event, KernelEvent::Status(ExecutionState::Idle));
    assert_eq!(ready.channel, Channel::Control);
    assert_eq!(ready.parent_id, None);
    assert_eq!(
        ready.event,
        KernelEvent::Ready {
            pid: 4242,
            cwd: "/tmp".into()
        }
    );
}

#[test]
fn error_defaults_missing_traceback() {
    let message = parse_inbound_line(
        r#"{"channel":"broadcast","kind":"error","parent_id":"a","content":{"ename":"ValueError","evalue":"bad"}}"#,
    )
    .expect("parse")
    .expect("message");

    assert_eq!(
        message.event,
        KernelEvent::Error {
            ename: "ValueError".into(),
            evalue: "bad".into(),
            traceback: Vec::new(),
        }
    );
}

#[test]
fn unknown_kind_is_preserved_not_rejected() {
    let message = parse_inbound_line(
        r#"{"channel":"broadcast","kind":"display_data","parent_id":"a","content":{}}"#,
    )
    .expect("parse")
    .expect("message");

    assert_eq!(message.event, KernelEvent::Unknown("display_data".into()));
}

#[test]
fn blank_line_yields_nothing() {
    assert!(parse_inbound_line("   ").expect("parse").is_none());
}

#[test]
fn malformed_lines_are_protocol_errors() {
    let cases = [
        "not json",
        r#"{"channel":"sideband","kind":"pong","content":{}}"#,
        r#"{"channel":"broadcast","kind":"stream","parent_id":"a","content":{"name":"stdout"}}"#,
        r#"{"channel":"broadcast","kind":"status","content":{"execution_state":"sleeping"}}"#,
    ];
    for line in cases {
        let err = parse_inbound_line(line).expect_err(line);
        assert!(
            err.to_string().starts_with("protocol:"),
            "expected protocol error for {line}, got {err}"
        );
    }
}
