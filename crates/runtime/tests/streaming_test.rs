// Integration tests for query streaming through the public bridge API
//
// Tests cover:
// - Large results through a small chunk buffer
// - Readers on several sessions pulled from separate tasks
// - Several tasks pulling the same reader
// - Closing a reader mid-stream while the transport keeps producing
// - History and config files used together with a bridge

use std::sync::Arc;

use bytes::Bytes;
use loper_runtime::testing::{ScriptedTransport, TransportCall};
use loper_runtime::{Bridge, BridgeConfig, FileHistory, Frame, HistoryConfig, HistoryStore, ReaderState};
use tempfile::TempDir;

const URL: &str = "https://db.example.com";

fn numbered(count: u32) -> Vec<Frame> {
	(0..count)
		.map(|i| Frame::Data(Bytes::from(i.to_be_bytes().to_vec())))
		.chain([Frame::End])
		.collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_large_result_through_small_buffer() {
	let transport = ScriptedTransport::new();
	transport.script_query("SELECT * FROM big;", numbered(500));
	let config = BridgeConfig {
		chunk_buffer: 1,
		..BridgeConfig::default()
	};
	let bridge = Bridge::new(transport.shared(), config);

	let connection = bridge
		.open_connection(URL, None)
		.await
		.expect("Failed to open connection");
	let (session, _) = bridge
		.create_session(connection)
		.await
		.expect("Failed to create session");
	let reader = bridge
		.execute_query(session, "SELECT * FROM big;")
		.await
		.expect("Failed to execute query");

	let mut expected = 0u32;
	while let Some(chunk) = bridge.pull(reader).await.expect("Failed to pull") {
		assert_eq!(&chunk[..], &expected.to_be_bytes()[..]);
		expected += 1;
	}
	assert_eq!(expected, 500);
	assert_eq!(
		bridge.queries().state(reader).expect("Exhausted reader should report its state"),
		ReaderState::Exhausted
	);
	assert_eq!(bridge.live_counts().readers, 0);

	bridge.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_on_separate_tasks() {
	let transport = ScriptedTransport::new();
	for i in 0..4 {
		transport.script_query(format!("q{i}"), numbered(100));
	}
	let bridge = Arc::new(Bridge::new(transport.shared(), BridgeConfig::default()));
	let connection = bridge
		.open_connection(URL, None)
		.await
		.expect("Failed to open connection");

	let mut tasks = Vec::new();
	for i in 0..4 {
		let (session, _) = bridge
			.create_session(connection)
			.await
			.expect("Failed to create session");
		let reader = bridge
			.execute_query(session, &format!("q{i}"))
			.await
			.expect("Failed to execute query");

		let bridge = Arc::clone(&bridge);
		tasks.push(tokio::spawn(async move {
			let mut seen = Vec::new();
			while let Some(chunk) = bridge.pull(reader).await.expect("Failed to pull") {
				let mut raw = [0u8; 4];
				raw.copy_from_slice(&chunk);
				seen.push(u32::from_be_bytes(raw));
			}
			seen
		}));
	}

	for task in tasks {
		let seen = task.await.expect("Reader task panicked");
		assert_eq!(seen, (0..100).collect::<Vec<_>>());
	}

	bridge.shutdown().await;
	assert_eq!(transport.count(|call| matches!(call, TransportCall::CloseSession { .. })), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pulls_share_one_reader() {
	let transport = ScriptedTransport::new();
	transport.script_query("SELECT * FROM shared;", numbered(200));
	let config = BridgeConfig {
		chunk_buffer: 1,
		..BridgeConfig::default()
	};
	let bridge = Arc::new(Bridge::new(transport.shared(), config));
	let connection = bridge
		.open_connection(URL, None)
		.await
		.expect("Failed to open connection");
	let (session, _) = bridge
		.create_session(connection)
		.await
		.expect("Failed to create session");
	let reader = bridge
		.execute_query(session, "SELECT * FROM shared;")
		.await
		.expect("Failed to execute query");

	let tasks: Vec<_> = (0..4)
		.map(|_| {
			let bridge = Arc::clone(&bridge);
			tokio::spawn(async move {
				let mut seen = Vec::new();
				while let Some(chunk) = bridge.pull(reader).await.expect("Failed to pull") {
					let mut raw = [0u8; 4];
					raw.copy_from_slice(&chunk);
					seen.push(u32::from_be_bytes(raw));
				}
				seen
			})
		})
		.collect();

	let mut all = Vec::new();
	for task in tasks {
		let seen = task.await.expect("Puller task panicked");
		// Each puller observes the stream in order, even while interleaved with others.
		assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
		all.extend(seen);
	}
	all.sort_unstable();
	assert_eq!(all, (0..200).collect::<Vec<_>>());

	bridge.shutdown().await;
}

#[tokio::test]
async fn test_close_reader_mid_stream() {
	let transport = ScriptedTransport::new();
	let feed = transport.live_query("SELECT * FROM tail;");
	let bridge = Bridge::new(transport.shared(), BridgeConfig::default());
	let connection = bridge
		.open_connection(URL, None)
		.await
		.expect("Failed to open connection");
	let (session, _) = bridge
		.create_session(connection)
		.await
		.expect("Failed to create session");
	let reader = bridge
		.execute_query(session, "SELECT * FROM tail;")
		.await
		.expect("Failed to execute query");

	feed.send(Frame::Data(Bytes::from_static(b"first"))).expect("Feed closed early");
	assert_eq!(
		bridge.pull(reader).await.expect("Failed to pull"),
		Some(Bytes::from_static(b"first"))
	);

	bridge.close_reader(reader);
	bridge.settle().await;

	// The pump dropped the transport stream, so the feed has no receiver.
	assert!(feed.send(Frame::Data(Bytes::from_static(b"late"))).is_err());
	assert!(bridge.pull(reader).await.unwrap_err().is_invalid_handle());
	assert!(
		bridge
			.sessions()
			.readers(session)
			.expect("Session should be open")
			.is_empty()
	);
}

#[tokio::test]
async fn test_history_alongside_bridge_config() {
	let tmp = TempDir::new().expect("Failed to create temp dir");
	let config_path = tmp.path().join("bridge.json");
	let config = BridgeConfig {
		chunk_buffer: 4,
		history: HistoryConfig {
			path: tmp.path().join("history.json"),
			max_entries: 3,
		},
	};
	config.save(&config_path).expect("Failed to save config");

	let loaded = BridgeConfig::load(&config_path).expect("Failed to load config");
	let history = FileHistory::from_config(&loaded.history);
	let transport = ScriptedTransport::new();
	let bridge = Bridge::new(transport.shared(), loaded);

	let connection = bridge
		.open_connection(URL, None)
		.await
		.expect("Failed to open connection");
	let (session, _) = bridge
		.create_session(connection)
		.await
		.expect("Failed to create session");
	for text in ["SELECT 1;", "SELECT 2;", "SELECT 3;", "SELECT 4;"] {
		history.append(text).expect("Failed to append history");
		let reader = bridge
			.execute_query(session, text)
			.await
			.expect("Failed to execute query");
		assert_eq!(bridge.pull(reader).await.expect("Failed to pull"), None);
		bridge.close_reader(reader);
	}

	let snapshot = history.load().expect("Failed to load history");
	assert_eq!(snapshot.entries, vec!["SELECT 2;", "SELECT 3;", "SELECT 4;"]);
	assert_eq!(snapshot.cursor, 3);
	assert_eq!(bridge.config().chunk_buffer, 4);

	bridge.shutdown().await;
}
