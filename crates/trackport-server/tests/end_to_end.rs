use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use trackport_protocol::{EventSink, MemorySink};
use trackport_server::{ServerConfig, ServerError, Service, ServiceContext};
use trackport_transport::TransportError;

const V100: &[u8] = b"TRK7,15,V100,02/01/2024 10:11:12,51.5072,-0.1276,270,64,3,1F\0";

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1".parse().expect("valid ip"),
        ports: vec![0],
        parse_interval: Duration::from_millis(50),
        cleanup_interval: Duration::from_millis(200),
        shutdown_grace: Duration::ZERO,
        shutdown_max_worker_age: Duration::ZERO,
        shutdown_drain_timeout: Duration::from_secs(2),
        ..ServerConfig::default()
    }
}

fn start(config: ServerConfig) -> (Service, Arc<MemorySink>, SocketAddr) {
    let sink = Arc::new(MemorySink::new());
    let dyn_sink: Arc<dyn EventSink> = sink.clone();
    let service = Service::start(Arc::new(ServiceContext::new(config, dyn_sink)))
        .expect("service should start");
    let addr = service.local_addrs()[0];
    (service, sink, addr)
}

async fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server should close the connection")
        .expect("read should succeed");
    out
}

async fn wait_for_events(sink: &MemorySink, count: usize) {
    for _ in 0..100 {
        if sink.events().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {count} events, sink has {}",
        sink.events().len()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_shot_frame_is_acked_closed_and_parsed() {
    let (service, sink, addr) = start(test_config());

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    client.write_all(V100).await.expect("send should succeed");

    let reply = read_all(&mut client).await;
    assert_eq!(reply, b"ACK,V100,15\r\n");

    wait_for_events(&sink, 1).await;
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tracker_id, "TRK7");
    assert_eq!(events[0].heading, Some(270));

    let report = service.shutdown().await.expect("shutdown should succeed");
    assert!(report.final_pass.is_some());
    assert!(sink.is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_tag_is_dropped_without_ack() {
    let (service, sink, addr) = start(test_config());

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    client
        .write_all(b"TRK1,1,ZZZZ,02/01/2024 10:00:00")
        .await
        .expect("send should succeed");

    assert!(read_all(&mut client).await.is_empty());
    service.shutdown().await.expect("shutdown should succeed");
    assert!(sink.events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn continuous_connection_acks_every_record() {
    let (service, sink, addr) = start(test_config());

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    let mut ack = [0u8; 64];
    for seq in 1..=3 {
        let record = format!("TRK2,{seq},V114,02/01/2024 09:00:0{seq},10.5,20.25,55");
        client
            .write_all(record.as_bytes())
            .await
            .expect("send should succeed");
        let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut ack))
            .await
            .expect("ack should arrive")
            .expect("read should succeed");
        assert_eq!(&ack[..n], format!("ACK,V114,{seq}\r\n").as_bytes());
    }

    client
        .write_all(b"TRK2,x,V114,bad")
        .await
        .expect("send should succeed");
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut ack))
        .await
        .expect("nack should arrive")
        .expect("read should succeed");
    assert_eq!(&ack[..n], b"NACK,V114\r\n");

    wait_for_events(&sink, 3).await;
    assert!(sink.events().iter().all(|e| e.tracker_id == "TRK2"));

    drop(client);
    service.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multi_chunk_transfer_completes_on_half_close() {
    let (service, sink, addr) = start(test_config());

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    client
        .write_all(b"CAM9,21,V210,02/01/2024 12:00:00,2,2\0")
        .await
        .expect("header chunk should send");
    tokio::time::sleep(Duration::from_millis(20)).await;
    client
        .write_all(&[0x10, 0x00, 0x00, 0x00, 0x01, 0x00])
        .await
        .expect("body chunk should send");
    tokio::time::sleep(Duration::from_millis(20)).await;
    client
        .write_all(&[0xFF, 0xFF, 0x03, 0x00, 0xFD, 0xFF])
        .await
        .expect("body chunk should send");
    client.shutdown().await.expect("half-close should succeed");

    // Freeze-frame transfers are not acknowledged.
    assert!(read_all(&mut client).await.is_empty());

    wait_for_events(&sink, 1).await;
    let data = sink.event_data();
    assert_eq!(data.len(), 3);
    assert_eq!(data[1].1.text.as_deref(), Some("1 3"));

    service.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_evicts_idle_connections() {
    let (service, _sink, addr) = start(test_config());

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.context().workers().len(), 1);

    let report = service.shutdown().await.expect("shutdown should succeed");
    assert_eq!(report.evicted + report.forced, 1);
    assert!(read_all(&mut client).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bind_conflict_is_a_transport_error() {
    let (service, _sink, addr) = start(test_config());

    let config = ServerConfig {
        ports: vec![addr.port()],
        ..test_config()
    };
    let sink: Arc<dyn EventSink> = Arc::new(MemorySink::new());
    let err = Service::start(Arc::new(ServiceContext::new(config, sink)))
        .err()
        .expect("second bind should fail");
    assert!(matches!(
        err,
        ServerError::Transport(TransportError::Bind { .. })
    ));

    service.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frame_refused_by_closed_buffer_is_nacked() {
    let (service, sink, addr) = start(test_config());
    service.context().buffer().close();

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    client.write_all(V100).await.expect("send should succeed");

    assert_eq!(read_all(&mut client).await, b"NACK,V100\r\n");
    service.shutdown().await.expect("shutdown should succeed");
    assert!(sink.events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn driver_lines_continue_on_same_connection() {
    let (service, sink, addr) = start(test_config());

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    client
        .write_all(b"TRK1,3,V109,02/01/2024 08:00:00,DRV42,9,pin=1234,+\r\n")
        .await
        .expect("first line should send");
    let mut ack = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut ack))
        .await
        .expect("first ack should arrive")
        .expect("read should succeed");
    assert_eq!(&ack[..n], b"ACK,V109,3\r\n");

    client
        .write_all(b"TRK1,4,V109,02/01/2024 08:00:01,DRV42,9,name=Ann\r\n")
        .await
        .expect("last line should send");
    assert_eq!(read_all(&mut client).await, b"ACK,V109,4\r\n");

    wait_for_events(&sink, 2).await;
    let events = sink.events();
    assert!(events
        .iter()
        .all(|e| e.driver_id.as_deref() == Some("DRV42")));
    let names: Vec<String> = sink
        .event_data()
        .into_iter()
        .map(|(_, row)| row.name)
        .collect();
    assert!(names.contains(&"pin".to_string()));
    assert!(names.contains(&"name".to_string()));

    service.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_transfer_is_dropped() {
    let config = ServerConfig {
        receive_buffer_size: 64,
        max_assembly_size: 64,
        ..test_config()
    };
    let (service, sink, addr) = start(config);

    let mut client = TcpStream::connect(addr).await.expect("client should connect");
    client
        .write_all(b"CAM9,22,V210,02/01/2024 12:00:00,2,2\0")
        .await
        .expect("header chunk should send");
    tokio::time::sleep(Duration::from_millis(20)).await;
    client
        .write_all(&[0xAB; 64])
        .await
        .expect("body chunk should send");

    // No half-close: only the size limit can end this transfer.
    let mut out = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut out))
        .await
        .expect("server should drop the connection");
    assert!(out.is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(sink.events().is_empty());
    assert!(service.context().workers().is_empty());
    service.shutdown().await.expect("shutdown should succeed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cleanup_sweeps_only_classified_idle_connections() {
    let config = ServerConfig {
        inactivity_timeout: Duration::from_millis(100),
        cleanup_interval: Duration::from_millis(50),
        ..test_config()
    };
    let (service, _sink, addr) = start(config);

    let mut silent = TcpStream::connect(addr).await.expect("silent client should connect");
    let mut tracker = TcpStream::connect(addr).await.expect("tracker should connect");
    tracker
        .write_all(b"TRK2,1,V114,02/01/2024 09:00:01,10.5,20.25,55")
        .await
        .expect("send should succeed");

    // The ACK arrives first, then the sweep closes the idle connection.
    assert_eq!(read_all(&mut tracker).await, b"ACK,V114,1\r\n");

    let mut byte = [0u8; 1];
    assert!(
        tokio::time::timeout(Duration::from_millis(300), silent.read(&mut byte))
            .await
            .is_err(),
        "unclassified connection should stay open"
    );
    assert_eq!(service.context().workers().len(), 1);

    service.shutdown().await.expect("shutdown should succeed");
}
