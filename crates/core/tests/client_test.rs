// Integration tests for the typed client handles
//
// Tests cover:
// - Connect, create session, stream a query, close
// - Dropping a stream closes its reader
// - Closing a connection invalidates sessions and streams obtained from it
// - Adapting a query stream into a futures Stream

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use loper::{BridgeConfig, Client, Error};
use loper_runtime::Frame;
use loper_runtime::testing::{ScriptedTransport, TransportCall};

const URL: &str = "https://db.example.com/analytics";

fn client(transport: &ScriptedTransport) -> Client {
	Client::new(transport.shared(), BridgeConfig::default())
}

#[tokio::test]
async fn test_query_round_trip() {
	let transport = ScriptedTransport::new().with_session_ids(["abc123"]);
	transport.script_query(
		"SELECT 1;",
		[Frame::Data(Bytes::from_static(&[0x01, 0x02])), Frame::End],
	);
	let client = client(&transport);

	let connection = client.connect(URL, None).await.expect("Failed to connect");
	assert_eq!(connection.url().expect("Connection should be open").as_str(), URL);

	let session = connection.create_session().await.expect("Failed to create session");
	assert_eq!(session.global_id().as_str(), "abc123");

	let mut stream = session.execute_query("SELECT 1;").await.expect("Failed to execute query");
	assert_eq!(
		stream.collect_chunks().await.expect("Failed to read chunks"),
		vec![Bytes::from_static(&[0x01, 0x02])]
	);
	assert_eq!(stream.next().await.expect("Exhausted stream should not fail"), None);

	session.close().expect("Failed to close session");
	connection.close().expect("Failed to close connection");
	client.shutdown().await;

	assert!(transport.calls().contains(&TransportCall::CloseSession {
		session: "abc123".to_string()
	}));
}

#[tokio::test]
async fn test_dropping_stream_closes_reader() {
	let transport = ScriptedTransport::new();
	let _feed = transport.live_query("SELECT * FROM events;");
	let client = client(&transport);
	let connection = client.connect(URL, None).await.expect("Failed to connect");
	let session = connection.create_session().await.expect("Failed to create session");

	let stream = session
		.execute_query("SELECT * FROM events;")
		.await
		.expect("Failed to execute query");
	let reader = stream.handle();
	assert_eq!(client.bridge().live_counts().readers, 1);

	drop(stream);

	assert_eq!(client.bridge().live_counts().readers, 0);
	let err = client.bridge().pull(reader).await.unwrap_err();
	assert!(err.is_invalid_handle());
}

#[tokio::test]
async fn test_connection_close_invalidates_children() {
	let transport = ScriptedTransport::new();
	let _feed = transport.live_query("SELECT 1;");
	let client = client(&transport);
	let connection = client.connect(URL, None).await.expect("Failed to connect");
	let session = connection.create_session().await.expect("Failed to create session");
	let mut stream = session.execute_query("SELECT 1;").await.expect("Failed to execute query");

	connection.close().expect("Failed to close connection");

	assert!(matches!(stream.next().await, Err(Error::InvalidHandle { .. })));
	assert!(matches!(session.close(), Err(Error::InvalidHandle { .. })));
	assert!(matches!(
		session.execute_query("SELECT 2;").await,
		Err(Error::IllegalState { .. })
	));
	assert!(matches!(
		connection.create_session().await,
		Err(Error::IllegalState { .. })
	));
	// Closing the stream after the cascade is still harmless.
	stream.close();
}

#[tokio::test]
async fn test_into_stream_yields_chunks_in_order() {
	let transport = ScriptedTransport::new();
	transport.script_query(
		"SELECT n FROM series;",
		(0u8..5).map(|n| Frame::Data(Bytes::from(vec![n]))),
	);
	let client = client(&transport);
	let connection = client.connect(URL, None).await.expect("Failed to connect");
	let session = connection.create_session().await.expect("Failed to create session");

	let stream = session
		.execute_query("SELECT n FROM series;")
		.await
		.expect("Failed to execute query");
	let chunks: Vec<Bytes> = stream
		.into_stream()
		.map(|chunk| chunk.expect("Failed to pull"))
		.collect()
		.await;

	assert_eq!(chunks, (0u8..5).map(|n| Bytes::from(vec![n])).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_into_stream_ends_after_error() {
	let transport = ScriptedTransport::new();
	transport.script_query(
		"SELECT broken;",
		[
			Frame::Data(Bytes::from_static(b"ok")),
			Frame::Error("worker crashed".to_string()),
		],
	);
	let client = Client::from_bridge(Arc::clone(client(&transport).bridge()));
	let connection = client.connect(URL, None).await.expect("Failed to connect");
	let session = connection.create_session().await.expect("Failed to create session");

	let results: Vec<_> = session
		.execute_query("SELECT broken;")
		.await
		.expect("Failed to execute query")
		.into_stream()
		.collect()
		.await;

	assert_eq!(results.len(), 2);
	assert_eq!(results[0].as_ref().expect("First chunk should arrive"), &Bytes::from_static(b"ok"));
	assert!(matches!(&results[1], Err(Error::TransportFailure(message)) if message == "worker crashed"));
}
