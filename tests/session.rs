//! End-to-end sessions between a `Sender` and a `Receiver`.
//!
//! The receiver runs in its own tokio task, exactly as the server binary does
//! for each accepted connection. Most tests use the in-memory transport; the
//! last one goes over a real TCP loopback connection.

use std::io::Write;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use swarq::sink::SessionEvent;
use swarq::{
    Classification, Config, ConnectionEnd, ConnectionSummary, Error, MemoryTransport, NullSink,
    Receiver, RecordingSink, Role, Sender, SessionOutcome, TcpTransport,
};

fn config(chunk_size: usize) -> Config {
    Config {
        chunk_size,
        ack_timeout_ms: 500,
        rng_seed: Some(42),
        ..Config::default()
    }
}

fn spawn_receiver(
    transport: MemoryTransport,
    config: Config,
) -> JoinHandle<(ConnectionSummary, RecordingSink)> {
    tokio::spawn(async move {
        let mut receiver = Receiver::new(transport, config).expect("receiver");
        let mut sink = RecordingSink::new();
        let summary = receiver.run(&mut sink).await.expect("receiver run");
        (summary, sink)
    })
}

// ---------------------------------------------------------------------------
// Clean channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_helloworld_clean_channel() {
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(4));

    let mut sender = Sender::new(client, config(4)).unwrap();
    let mut sender_sink = RecordingSink::new();
    let report = sender.send_text("HELLOWORLD", &mut sender_sink).await.unwrap();
    sender.end_session().await.unwrap();

    assert!(report.outcome.is_completed());
    assert_eq!(report.chunks_acked, 3);
    assert_eq!(report.metrics.attempts, 3);
    assert_eq!(report.metrics.nacks, 0);
    assert_eq!(report.metrics.integrity_rate, 1.0);
    assert!(report.metrics.snr.is_infinite());

    let (summary, sink) = receiver.await.unwrap();
    assert_eq!(summary.end, ConnectionEnd::EndSignal);
    assert_eq!(summary.sessions_completed, 1);

    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].as_text(), Some("HELLOWORLD"));

    let metrics = sink.metrics()[0];
    assert_eq!(metrics.unique_acked, 3);
    assert_eq!(metrics.acked_bytes, 10);
    assert_eq!(metrics.integrity_rate, 1.0);
}

#[tokio::test]
async fn test_jpeg_bytes_are_classified() {
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(16));

    let mut image = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    image.extend((0..100u8).map(|b| b.wrapping_mul(37)));

    let mut sender = Sender::new(client, config(16)).unwrap();
    let report = sender
        .send_bytes(image.clone(), &mut NullSink)
        .await
        .unwrap();
    sender.end_session().await.unwrap();

    assert!(report.outcome.is_completed());
    assert_eq!(report.bytes_read, image.len() as u64);

    let (_, sink) = receiver.await.unwrap();
    let payload = sink.payloads()[0].clone();
    assert_eq!(payload.classification, Classification::binary(".jpg"));
    assert_eq!(payload.data.as_ref(), image.as_slice());
}

// ---------------------------------------------------------------------------
// Corrupting channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_corruption_aborts_after_budget() {
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(4));

    let mut sender = Sender::new(
        client,
        Config {
            corruption_probability: 1.0,
            ..config(4)
        },
    )
    .unwrap();
    let report = sender
        .send_text("HELLOWORLD", &mut NullSink)
        .await
        .unwrap();
    sender.end_session().await.unwrap();

    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(Error::RetryBudgetExhausted { chunk: 0, attempts: 5 })
    ));
    assert_eq!(report.metrics.attempts, 5);
    assert_eq!(report.metrics.nacks, 5);
    assert_eq!(report.metrics.integrity_rate, 0.0);
    assert_eq!(report.metrics.error_bits, 5 * 8);

    let (summary, sink) = receiver.await.unwrap();
    assert_eq!(summary.sessions_completed, 0);
    assert_eq!(summary.sessions_failed, 1);
    assert!(sink.payloads().is_empty());
    assert!(sink
        .events
        .iter()
        .any(|event| matches!(event, SessionEvent::Failed(Role::Receiver, 0, _))));
}

#[tokio::test]
async fn test_partial_corruption_recovers() {
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(8));

    let text = "The quick brown fox jumps over the lazy dog, again and again.";
    let mut sender = Sender::new(
        client,
        Config {
            corruption_probability: 0.3,
            max_retries: 50,
            ..config(8)
        },
    )
    .unwrap();
    let report = sender.send_text(text, &mut NullSink).await.unwrap();
    sender.end_session().await.unwrap();

    assert!(report.outcome.is_completed());
    let chunks = report.chunks_acked;
    assert_eq!(chunks, 8);
    assert_eq!(report.metrics.attempts, chunks + report.metrics.nacks);
    let expected = chunks as f64 / report.metrics.attempts as f64;
    assert!((report.metrics.integrity_rate - expected).abs() < 1e-12);
    assert_eq!(report.metrics.error_bits, report.metrics.nacks * 8);

    let (_, sink) = receiver.await.unwrap();
    assert_eq!(sink.payloads()[0].as_text(), Some(text));
    assert_eq!(sink.metrics()[0].nacks, report.metrics.nacks);
}

// ---------------------------------------------------------------------------
// Session boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_payload() {
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(4));

    let mut sender = Sender::new(client, config(4)).unwrap();
    let report = sender
        .send_bytes(Vec::<u8>::new(), &mut NullSink)
        .await
        .unwrap();
    sender.end_session().await.unwrap();

    assert!(report.outcome.is_completed());
    assert_eq!(report.metrics.attempts, 0);
    assert_eq!(report.metrics.integrity_rate, 0.0);

    let (summary, sink) = receiver.await.unwrap();
    assert_eq!(summary.sessions_failed, 1);
    assert!(sink.payloads().is_empty());
}

#[tokio::test]
async fn test_extension_tag_preamble() {
    let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
    file.write_all(b"plain bytes that look like text").unwrap();
    file.flush().unwrap();

    // With the tag preamble
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(8));
    let mut sender = Sender::new(client, config(8)).unwrap();
    let report = sender
        .send_file(file.path(), &mut NullSink)
        .await
        .unwrap();
    sender.end_session().await.unwrap();
    assert!(report.outcome.is_completed());

    let (_, sink) = receiver.await.unwrap();
    assert_eq!(sink.payloads()[0].classification, Classification::binary(".mp3"));

    // Without it the content sniffing decides
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(8));
    let mut sender = Sender::new(
        client,
        Config {
            send_extension_tag: false,
            ..config(8)
        },
    )
    .unwrap();
    sender
        .send_file(file.path(), &mut NullSink)
        .await
        .unwrap();
    sender.end_session().await.unwrap();

    let (_, sink) = receiver.await.unwrap();
    assert_eq!(sink.payloads()[0].classification, Classification::Text);
}

#[tokio::test]
async fn test_sender_closing_connection_ends_receiver() {
    let (client, server) = MemoryTransport::pair();
    let receiver = spawn_receiver(server, config(4));

    let mut sender = Sender::new(client, config(4)).unwrap();
    sender
        .send_text("first", &mut NullSink)
        .await
        .unwrap();
    drop(sender);

    let (summary, sink) = receiver.await.unwrap();
    assert_eq!(summary.end, ConnectionEnd::TransportClosed);
    assert_eq!(summary.sessions_completed, 1);
    assert_eq!(sink.payloads()[0].as_text(), Some("first"));
}

// ---------------------------------------------------------------------------
// TCP loopback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_tcp_multiple_sessions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let transport = TcpTransport::new(stream).expect("transport");
        let mut receiver = Receiver::new(transport, config(64)).expect("receiver");
        let mut sink = RecordingSink::new();
        let summary = receiver.run(&mut sink).await.expect("run");
        (summary, sink)
    });

    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend((0..500u32).map(|i| (i % 253) as u8));
    let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    file.write_all(&png).unwrap();
    file.flush().unwrap();

    let transport = TcpTransport::connect(addr).await.unwrap();
    let mut sender = Sender::new(transport, config(64)).unwrap();
    let mut sink = RecordingSink::new();

    let first = sender.send_text("hello over tcp", &mut sink).await.unwrap();
    let second = sender.send_file(file.path(), &mut sink).await.unwrap();
    let third = sender.send_text("bye", &mut sink).await.unwrap();
    sender.end_session().await.unwrap();

    assert!(first.outcome.is_completed());
    assert!(second.outcome.is_completed());
    assert!(third.outcome.is_completed());
    assert_eq!(second.bytes_read, png.len() as u64);
    assert_eq!(sink.completed_count(), 3);

    let (summary, received) = server.await.unwrap();
    assert_eq!(summary.end, ConnectionEnd::EndSignal);
    assert_eq!(summary.sessions_completed, 3);

    let payloads = received.payloads();
    assert_eq!(payloads[0].as_text(), Some("hello over tcp"));
    assert_eq!(payloads[1].classification, Classification::binary(".png"));
    assert_eq!(payloads[1].data.as_ref(), png.as_slice());
    assert_eq!(payloads[2].as_text(), Some("bye"));
}
