//! End-to-end tests against a minimal in-process MQTT 3.1.1 broker.

use raspi_sensor_mqtt_transport::{BrokerConfig, FlushLoop, MqttStatus, MqttTransport, Transport};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

const CONNECT: u8 = 0x10;
const PUBLISH_QOS0: u8 = 0x30;
const DISCONNECT: u8 = 0xE0;

/// Reads one control packet: (first header byte, body).
async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;

    let mut remaining = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.ok()?;
        remaining |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0u8; remaining];
    stream.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

/// Splits a QoS 0 PUBLISH body into topic and payload.
fn parse_publish(body: &[u8]) -> (String, String) {
    let len = usize::from(u16::from_be_bytes([body[0], body[1]]));
    let topic = String::from_utf8(body[2..2 + len].to_vec()).unwrap();
    let payload = String::from_utf8(body[2 + len..].to_vec()).unwrap();
    (topic, payload)
}

/// Accepts one client, answers CONNECT with `return_code` and records every
/// packet until DISCONNECT or EOF.
async fn spawn_broker(return_code: u8) -> (u16, JoinHandle<Vec<(u8, Vec<u8>)>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut packets = Vec::new();

        let (header, body) = read_packet(&mut stream).await.unwrap();
        assert_eq!(header & 0xF0, CONNECT);
        packets.push((header, body));

        stream
            .write_all(&[0x20, 0x02, 0x00, return_code])
            .await
            .unwrap();

        while let Some((header, body)) = read_packet(&mut stream).await {
            packets.push((header, body));
            if header == DISCONNECT {
                break;
            }
        }
        packets
    });

    (port, handle)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_publishes_are_flushed_before_disconnect() {
    let (port, broker) = spawn_broker(0).await;
    let config = BrokerConfig::new("fake-broker-test", "127.0.0.1", port);
    let mut transport = MqttTransport::new(&config).unwrap();

    transport.connect().await.unwrap();
    assert!(transport.is_connected());

    let mut flush = FlushLoop::start(&mut transport);
    assert!(flush.publish("garden/humidity", "55.4").await.is_success());
    assert!(flush.publish("garden/temperature", "21.0").await.is_success());
    flush.stop().await;

    let status = transport.disconnect().await;
    assert!(status.is_success(), "unexpected status: {status}");
    drop(transport);

    let packets = broker.await.unwrap();
    let publishes: Vec<_> = packets
        .iter()
        .filter(|(header, _)| *header == PUBLISH_QOS0)
        .map(|(_, body)| parse_publish(body))
        .collect();

    assert_eq!(
        publishes,
        vec![
            ("garden/humidity".to_string(), "55.4".to_string()),
            ("garden/temperature".to_string(), "21.0".to_string()),
        ]
    );
    assert_eq!(packets.last().map(|(h, _)| *h), Some(DISCONNECT));
}

#[tokio::test]
async fn test_refused_connect_reports_connack_code() {
    let (port, _broker) = spawn_broker(5).await;
    let config = BrokerConfig::new("fake-broker-test", "127.0.0.1", port);
    let mut transport = MqttTransport::new(&config).unwrap();

    let status = transport.connect().await.unwrap_err();
    assert_eq!(status.code, 5);
    assert!(status.message.contains("not authorised"));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_unreachable_broker_reports_errno() {
    let port = closed_port().await;
    let config = BrokerConfig::new("fake-broker-test", "127.0.0.1", port);
    let mut transport = MqttTransport::new(&config).unwrap();

    let status = transport.connect().await.unwrap_err();
    assert_eq!(status.code, MqttStatus::Errno.code());
}

#[tokio::test]
async fn test_credentials_are_sent_in_connect() {
    let (port, broker) = spawn_broker(0).await;
    let config =
        BrokerConfig::new("fake-broker-test", "127.0.0.1", port).with_credentials("pi", "s3cret");
    let mut transport = MqttTransport::new(&config).unwrap();

    transport.connect().await.unwrap();
    assert!(transport.disconnect().await.is_success());
    drop(transport);

    let packets = broker.await.unwrap();
    let (_, connect) = &packets[0];
    // Connect flags sit after the protocol name and level.
    let flags = connect[7];
    assert_eq!(flags & 0xC0, 0xC0);
    assert!(connect.windows(6).any(|w| w == b"s3cret"));
}
