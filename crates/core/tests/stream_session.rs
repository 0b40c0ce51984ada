//! Stream session behavior against an in-memory stream
//!
//! The controller side is simulated with channel-backed sink/source
//! halves, so these tests exercise the session loops without any
//! network transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rodent_core::dispatch::{CommandRegistry, HandlerReply};
use rodent_core::transport::{
    Command, Envelope, FramePayload, FrameSink, FrameSource, StreamPair, StreamSession,
};
use rodent_core::{Error, Result};

/// Sink half handing agent frames to the test
struct ChannelSink {
    tx: mpsc::Sender<Envelope>,
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Envelope) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| Error::Unavailable("controller went away".into()))
    }
}

/// Source half fed by the test
struct ChannelSource {
    rx: mpsc::Receiver<Envelope>,
}

#[async_trait]
impl FrameSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<Envelope>> {
        Ok(self.rx.recv().await)
    }
}

/// A sink whose writes never complete, to wedge the send loop
struct StuckSink;

#[async_trait]
impl FrameSink for StuckSink {
    async fn send(&mut self, _frame: Envelope) -> Result<()> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Controller handle around an open in-memory stream
struct Controller {
    to_agent: mpsc::Sender<Envelope>,
    from_agent: mpsc::Receiver<Envelope>,
}

fn open_session(registry: Arc<CommandRegistry>) -> (Arc<StreamSession>, Controller) {
    let (to_agent, agent_rx) = mpsc::channel(32);
    let (agent_tx, from_agent) = mpsc::channel(32);

    let pair = StreamPair {
        sink: Box::new(ChannelSink { tx: agent_tx }),
        source: Box::new(ChannelSource { rx: agent_rx }),
    };
    let session = StreamSession::open(pair, registry);

    (
        session,
        Controller {
            to_agent,
            from_agent,
        },
    )
}

fn command(correlation_id: &str, command_type: &str) -> Envelope {
    Envelope {
        session_id: "controller-side".to_string(),
        payload: FramePayload::Command(Command {
            correlation_id: correlation_id.to_string(),
            command_type: command_type.to_string(),
            target: String::new(),
            payload: Vec::new(),
        }),
    }
}

async fn next_frame(controller: &mut Controller) -> Envelope {
    tokio::time::timeout(Duration::from_secs(5), controller.from_agent.recv())
        .await
        .expect("agent should respond")
        .expect("stream open")
}

fn status_registry() -> Arc<CommandRegistry> {
    let registry = Arc::new(CommandRegistry::new());
    registry.register("system.status", |_ctx, _cmd| async {
        let payload = serde_json::json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        Ok(HandlerReply::new("ok", payload.to_string().into_bytes()))
    });
    registry
}

#[tokio::test]
async fn status_command_round_trips_with_correlation_id() {
    let (session, mut controller) = open_session(status_registry());

    controller
        .to_agent
        .send(command("abc123", "system.status"))
        .await
        .unwrap();

    let frame = next_frame(&mut controller).await;
    match frame.payload {
        FramePayload::Response(response) => {
            assert_eq!(response.correlation_id, "abc123");
            assert!(response.success);
            let body: serde_json::Value = serde_json::from_slice(&response.payload).unwrap();
            assert_eq!(body["status"], "healthy");
            assert!(body["timestamp"].is_string());
        }
        other => panic!("expected response, got {:?}", other),
    }

    // Exactly one outbound message for one command
    let extra =
        tokio::time::timeout(Duration::from_millis(200), controller.from_agent.recv()).await;
    assert!(extra.is_err(), "no second frame may be sent");

    session.shutdown().await;
}

#[tokio::test]
async fn unknown_command_yields_single_failure_response() {
    let (session, mut controller) = open_session(status_registry());

    controller
        .to_agent
        .send(command("zzz", "unknown.op"))
        .await
        .unwrap();

    let frame = next_frame(&mut controller).await;
    match frame.payload {
        FramePayload::Response(response) => {
            assert_eq!(response.correlation_id, "zzz");
            assert!(!response.success);
            assert!(
                response.message.contains("unsupported"),
                "message should identify the command as unsupported: {}",
                response.message
            );
        }
        other => panic!("expected response, got {:?}", other),
    }

    let extra =
        tokio::time::timeout(Duration::from_millis(200), controller.from_agent.recv()).await;
    assert!(extra.is_err());

    session.shutdown().await;
}

#[tokio::test]
async fn handler_error_becomes_failure_response_with_structured_payload() {
    let registry = Arc::new(CommandRegistry::new());
    registry.register("pool.destroy", |_ctx, _cmd| async {
        Err::<HandlerReply, _>(Error::InvalidInput("pool is busy".into()))
    });

    let (session, mut controller) = open_session(registry);
    controller
        .to_agent
        .send(command("err-1", "pool.destroy"))
        .await
        .unwrap();

    let frame = next_frame(&mut controller).await;
    match frame.payload {
        FramePayload::Response(response) => {
            assert_eq!(response.correlation_id, "err-1");
            assert!(!response.success);
            let body: serde_json::Value = serde_json::from_slice(&response.payload).unwrap();
            assert!(body["error"].as_str().unwrap().contains("pool is busy"));
        }
        other => panic!("expected response, got {:?}", other),
    }

    session.shutdown().await;
}

#[tokio::test]
async fn handler_panic_still_yields_a_response() {
    let registry = Arc::new(CommandRegistry::new());
    registry.register("panic.op", |_ctx, _cmd| async {
        if true {
            panic!("handler exploded");
        }
        Ok(HandlerReply::default())
    });

    let (session, mut controller) = open_session(registry);
    controller
        .to_agent
        .send(command("boom", "panic.op"))
        .await
        .unwrap();

    let frame = next_frame(&mut controller).await;
    match frame.payload {
        FramePayload::Response(response) => {
            assert_eq!(response.correlation_id, "boom");
            assert!(!response.success);
            assert!(response.message.contains("panicked"));
        }
        other => panic!("expected response, got {:?}", other),
    }

    session.shutdown().await;
}

#[tokio::test]
async fn config_update_is_acknowledged() {
    let (session, mut controller) = open_session(status_registry());

    controller
        .to_agent
        .send(Envelope {
            session_id: String::new(),
            payload: FramePayload::ConfigUpdate(rodent_core::transport::ConfigUpdate {
                correlation_id: "cfg-7".to_string(),
                payload: b"{}".to_vec(),
            }),
        })
        .await
        .unwrap();

    let frame = next_frame(&mut controller).await;
    match frame.payload {
        FramePayload::Ack(ack) => {
            assert_eq!(ack.correlation_id, "cfg-7");
            assert!(ack.success);
        }
        other => panic!("expected ack, got {:?}", other),
    }

    session.shutdown().await;
}

#[tokio::test]
async fn outbound_frames_carry_the_session_id() {
    let (session, mut controller) = open_session(status_registry());

    session
        .enqueue(Envelope::new(FramePayload::Ack(
            rodent_core::transport::Acknowledgement {
                correlation_id: "a-1".to_string(),
                success: true,
                message: String::new(),
            },
        )))
        .await
        .unwrap();

    let frame = next_frame(&mut controller).await;
    assert_eq!(frame.session_id, session.id());

    session.shutdown().await;
}

#[tokio::test]
async fn controller_close_terminates_the_session() {
    let (session, controller) = open_session(status_registry());
    assert!(session.is_active());

    // Dropping the controller handle closes both stream halves
    drop(controller);

    tokio::time::timeout(Duration::from_secs(5), session.closed())
        .await
        .expect("session must observe closure");
    assert!(!session.is_active());

    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn full_outbound_queue_surfaces_a_bounded_timeout() {
    let (to_agent, agent_rx) = mpsc::channel(8);
    let pair = StreamPair {
        sink: Box::new(StuckSink),
        source: Box::new(ChannelSource { rx: agent_rx }),
    };
    let session = StreamSession::open(pair, status_registry());
    drop(to_agent);

    let ack = || {
        Envelope::new(FramePayload::Ack(rodent_core::transport::Acknowledgement {
            correlation_id: "x".to_string(),
            success: true,
            message: String::new(),
        }))
    };

    // One frame wedges in the stuck sink; 100 fill the queue.
    for _ in 0..101 {
        if session.enqueue(ack()).await.is_err() {
            // Queue filled earlier than the worst case; still a bounded error
            return;
        }
    }

    let err = session.enqueue(ack()).await.unwrap_err();
    assert!(matches!(err, Error::QueueFull(_)), "got {:?}", err);
}
