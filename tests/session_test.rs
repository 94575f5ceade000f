//! Session engine tests over a scripted transport
//!
//! Each test scripts the server side in reply segments and then checks
//! what the client wrote, when it started reading, and what it changed in
//! the working copy.

mod common;

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress};
use tempfile::TempDir;

use common::*;
use cvsr::admin::{AdminStore, LastKnownState, StandardAdminStore};
use cvsr::callbacks::{CallbackBuilder, ClientEvent, ClientCallbacks, FileChange, Progress};
use cvsr::config::{CompressionMode, GlobalOptions};
use cvsr::protocol::{ProtocolError, Request};
use cvsr::{BasicCommand, ClientError, Entry};

fn checkout() -> (TempDir, PathBuf) {
	let tmp = TempDir::new().unwrap();
	let wc = tmp.path().join("wc");
	working_dir(&wc, "mod", &[clean_entry("a.txt", "1.2", CLEAN_TIME), clean_entry("b.txt", "1.1", CLEAN_TIME)]);
	clean_file(&wc, "a.txt", b"alpha\n");
	clean_file(&wc, "b.txt", b"beta\n");
	(tmp, wc)
}

fn entry_of(wc: &std::path::Path, name: &str) -> Option<Entry> {
	StandardAdminStore::new().entry(&wc.join(name)).unwrap()
}

fn directory(repository: &str) -> Request {
	Request::Directory { local: ".".to_string(), repository: repository.to_string() }
}

/// Collects every event raised by the session.
#[derive(Default)]
struct Recorder {
	events: Mutex<Vec<ClientEvent>>,
}

impl ClientCallbacks for Recorder {
	fn on_event(&self, event: &ClientEvent) {
		self.events.lock().unwrap().push(event.clone());
	}
}

impl Recorder {
	fn events(&self) -> Vec<ClientEvent> {
		self.events.lock().unwrap().clone()
	}

	fn has_message(&self, text: &str) -> bool {
		self.events().iter().any(|e| matches!(e, ClientEvent::Message(m) if m.text == text))
	}
}

/// Inflate a zlib stream that was sync-flushed but never finished.
fn inflate(data: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(64 * 1024);
	Decompress::new(true).decompress_vec(data, &mut out, FlushDecompress::Sync).unwrap();
	out
}

// ============================================================================
// Pipelining
// ============================================================================

#[tokio::test]
async fn test_no_read_before_command() {
	let (_tmp, wc) = checkout();
	std::fs::write(wc.join("a.txt"), "changed\n").unwrap();
	let (mut session, transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("M status of a.txt\nok\n").session(&wc);
	let recorder = Arc::new(Recorder::default());
	session.add_listener(recorder.clone());

	let entry = entry_of(&wc, "a.txt").unwrap();
	let requests = vec![
		directory("/cvsroot/mod"),
		Request::entry(entry),
		Request::Modified { file: wc.join("a.txt"), binary: false },
		Request::Command("status".to_string()),
	];
	session.process_requests(requests).await.unwrap();

	let text = transcript.text();
	let at = transcript.written_at_segment();
	assert_eq!(at.len(), 2);
	// The greeting is read right after `valid-requests`
	assert!(text[..at[0]].ends_with("valid-requests\n"));
	// The reply to the command only after every request went out
	assert_eq!(at[1], transcript.written().len());
	assert!(text.ends_with("status\n"));

	let directory_at = text.find("Directory .\n/cvsroot/mod\n").unwrap();
	let entry_at = text.find("Entry /a.txt/1.2///\n").unwrap();
	let modified_at = text.find("Modified a.txt\n").unwrap();
	assert!(at[0] < directory_at && directory_at < entry_at && entry_at < modified_at);
	assert!(text.contains("\n8\nchanged\nstatus\n"));

	let events = recorder.events();
	let progress: Vec<&Progress> = events
		.iter()
		.filter_map(|e| match e {
			ClientEvent::Progress(p) => Some(p),
			_ => None,
		})
		.collect();
	assert_eq!(
		progress,
		vec![&Progress::RequestsCount(1), &Progress::FileSending(wc.join("a.txt")), &Progress::RequestsSent]
	);
	assert!(events.iter().any(|e| matches!(e, ClientEvent::Message(m) if m.text == "status of a.txt" && !m.error)));
}

#[tokio::test]
async fn test_handshake_sent_once_per_connection() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("ok\n").reply("ok\n").session(&wc);
	session = session.with_global_options(GlobalOptions { very_quiet: true, ..Default::default() });

	assert!(session.is_first_command());
	session
		.process_requests(vec![Request::Root("/cvsroot".to_string()), directory("/cvsroot/mod"), Request::Command("update".to_string())])
		.await
		.unwrap();
	assert!(!session.is_first_command());
	session
		.process_requests(vec![Request::Root("/cvsroot".to_string()), directory("/cvsroot/mod"), Request::Command("update".to_string())])
		.await
		.unwrap();

	let text = transcript.text();
	assert!(text.starts_with("Root /cvsroot\nUseUnchanged\nvalid-requests\nValid-responses "));
	assert_eq!(text.matches("Root /cvsroot\n").count(), 1);
	assert_eq!(text.matches("valid-requests\n").count(), 1);
	assert_eq!(text.matches("Global_option -Q\n").count(), 1);
	assert_eq!(text.matches("update\n").count(), 2);
	assert_eq!(session.valid_requests().len(), 15);
	assert_eq!(session.bytes_sent(), transcript.written().len() as u64);
}

#[tokio::test]
async fn test_gzip_stream_skipped_when_server_lacks_it() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("M plain text\nok\n").session(&wc);
	session = session.with_global_options(GlobalOptions {
		compression_level: 6,
		compression: CompressionMode::Stream,
		..Default::default()
	});

	session.process_requests(vec![directory("/cvsroot/mod"), Request::Command("update".to_string())]).await.unwrap();

	let text = transcript.text();
	assert!(!text.contains("Gzip-stream"));
	assert!(text.ends_with("update\n"));
}

#[tokio::test]
async fn test_gzip_stream_compresses_both_directions() {
	let (_tmp, wc) = checkout();
	let greeting = VALID_REQUESTS.replacen("Valid-requests ", "Valid-requests Gzip-stream ", 1);
	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(b"M compressed hello\nok\n").unwrap();
	let reply = encoder.finish().unwrap();
	let (mut session, transcript) = ScriptedServer::new().reply(greeting).reply(reply).session(&wc);
	session = session.with_global_options(GlobalOptions {
		compression_level: 6,
		compression: CompressionMode::Stream,
		..Default::default()
	});
	let recorder = Arc::new(Recorder::default());
	session.add_listener(recorder.clone());

	session.process_requests(vec![directory("/cvsroot/mod"), Request::Command("update".to_string())]).await.unwrap();

	let start = transcript.find_end(b"Gzip-stream 6\n").expect("compression requested");
	let compressed = &transcript.written()[start..];
	assert_eq!(inflate(compressed), b"Directory .\n/cvsroot/mod\nupdate\n");
	// The reply is only inflated once the command went out
	assert_eq!(transcript.written_at_segment().len(), 2);
	assert!(recorder.has_message("compressed hello"));
}

#[tokio::test]
async fn test_gzip_file_contents_compresses_payloads() {
	let (_tmp, wc) = checkout();
	let greeting = VALID_REQUESTS.replacen("Valid-requests ", "Valid-requests gzip-file-contents ", 1);
	let (mut session, transcript) = ScriptedServer::new().reply(greeting).reply("ok\n").session(&wc);
	session = session.with_global_options(GlobalOptions {
		compression_level: 6,
		compression: CompressionMode::FileContents,
		..Default::default()
	});

	session
		.process_requests(vec![
			directory("/cvsroot/mod"),
			Request::Modified { file: wc.join("a.txt"), binary: false },
			Request::Command("ci".to_string()),
		])
		.await
		.unwrap();

	let text = transcript.text();
	assert!(text.contains("gzip-file-contents 6\n"));
	let after_mode = &text[text.find("Modified a.txt\n").unwrap()..];
	let length_line = after_mode.lines().nth(2).unwrap();
	assert!(length_line.starts_with('z'), "payload length line was {:?}", length_line);
}

#[tokio::test]
async fn test_vanished_file_is_skipped() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) = ScriptedServer::new().reply(VALID_REQUESTS).reply("ok\n").session(&wc);

	session
		.process_requests(vec![
			directory("/cvsroot/mod"),
			Request::Modified { file: wc.join("gone.txt"), binary: false },
			Request::Command("ci".to_string()),
		])
		.await
		.unwrap();

	assert!(!transcript.contains("Modified gone.txt"));
	assert!(transcript.text().ends_with("Directory .\n/cvsroot/mod\nci\n"));
}

// ============================================================================
// Abort
// ============================================================================

#[tokio::test]
async fn test_abort_between_requests() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) = ScriptedServer::new()
		.reply(VALID_REQUESTS)
		.reply("ok\n")
		.abort_when_written("Argument a3\n")
		.session(&wc);

	let mut requests = vec![directory("/cvsroot/mod")];
	requests.extend((0..10).map(|i| Request::Argument(format!("a{}", i))));
	requests.push(Request::Command("update".to_string()));

	let result = session.process_requests(requests).await;
	assert!(matches!(result, Err(ClientError::Aborted)));
	assert!(session.is_aborted());
	assert!(transcript.contains("Argument a3\n"));
	assert!(!transcript.contains("Argument a4\n"));
	assert!(!transcript.contains("update\n"));
	// Only the greeting was ever read
	assert_eq!(transcript.written_at_segment().len(), 1);
}

#[tokio::test]
async fn test_abort_while_waiting_for_reply() {
	let (_tmp, wc) = checkout();
	let (mut session, _transcript) = ScriptedServer::new().reply(VALID_REQUESTS).hang_at_end().session(&wc);

	let abort = session.abort_handle();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		abort.abort();
	});

	let result = tokio::time::timeout(
		Duration::from_secs(5),
		session.process_requests(vec![directory("/cvsroot/mod"), Request::Command("update".to_string())]),
	)
	.await
	.expect("abort must end the read");
	assert!(matches!(result, Err(ClientError::Aborted)));
}

#[tokio::test]
async fn test_interrupted_read_aborts_session() {
	let (_tmp, wc) = checkout();
	let (mut session, _transcript) = ScriptedServer::new().reply(VALID_REQUESTS).interrupt_at_end().session(&wc);

	let result = session.process_requests(vec![directory("/cvsroot/mod"), Request::Command("update".to_string())]).await;

	assert!(matches!(result, Err(ClientError::Aborted)));
	assert!(session.is_aborted());
}

#[tokio::test]
async fn test_aborted_session_sends_nothing() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) = ScriptedServer::new().reply(VALID_REQUESTS).session(&wc);

	session.abort();
	let result = session.process_requests(vec![Request::Command("update".to_string())]).await;
	assert!(matches!(result, Err(ClientError::Aborted)));
	assert!(transcript.written().is_empty());
}

// ============================================================================
// Responses
// ============================================================================

#[tokio::test]
async fn test_server_error_after_side_effects() {
	let (_tmp, wc) = checkout();
	let reply = "Checked-in ./\n/cvsroot/mod/a.txt\n/a.txt/1.3///\n\
		Remove-entry ./\n/cvsroot/mod/b.txt\n\
		error  permission denied\n";
	let (mut session, _transcript) = ScriptedServer::new().reply(VALID_REQUESTS).reply(reply).session(&wc);

	let result =
		session.process_requests(vec![directory("/cvsroot/mod"), Request::Command("ci".to_string())]).await;

	match result {
		Err(ClientError::ServerError { message }) => assert_eq!(message, "permission denied"),
		other => panic!("expected a server error, got {:?}", other),
	}
	assert_eq!(entry_of(&wc, "a.txt").unwrap().revision, "1.3");
	assert!(entry_of(&wc, "b.txt").is_none());
}

#[tokio::test]
async fn test_bare_error_does_not_swallow_next_line() {
	let (_tmp, wc) = checkout();
	let (mut session, _transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("error\nM after the error\nok\n").session(&wc);
	let recorder = Arc::new(Recorder::default());
	session.add_listener(recorder.clone());

	let result = session.process_requests(vec![Request::Command("update".to_string())]).await;

	match result {
		Err(ClientError::ServerError { message }) => assert_eq!(message, "server reported an error"),
		other => panic!("expected a server error, got {:?}", other),
	}
	assert!(!recorder.has_message("M after the error"));
	assert!(!recorder.has_message("after the error"));
}

#[tokio::test]
async fn test_updated_file_is_written_with_mod_time() {
	let (_tmp, wc) = checkout();
	let reply = "Mod-time 10 Nov 2002 12:00:00 -0000\n\
		Updated ./\n/cvsroot/mod/a.txt\n/a.txt/1.3///\nu=rw,g=r,o=r\n6\nALPHA\n\
		ok\n";
	let (mut session, _transcript) = ScriptedServer::new().reply(VALID_REQUESTS).reply(reply).session(&wc);
	let written = Arc::new(Mutex::new(Vec::new()));
	let sink = written.clone();
	session.add_listener(
		CallbackBuilder::new()
			.on_file_written(move |path, change| sink.lock().unwrap().push((path.to_path_buf(), change)))
			.build(),
	);

	session.process_requests(vec![directory("/cvsroot/mod"), Request::Command("update".to_string())]).await.unwrap();

	assert_eq!(std::fs::read(wc.join("a.txt")).unwrap(), b"ALPHA\n");
	let entry = entry_of(&wc, "a.txt").unwrap();
	assert_eq!(entry.revision, "1.3");
	assert_eq!(entry.state, LastKnownState::Clean(CLEAN_TIME));
	assert_eq!(*written.lock().unwrap(), vec![(wc.join("a.txt"), FileChange::Updated)]);
}

#[tokio::test]
async fn test_unknown_response_is_protocol_error() {
	let (_tmp, wc) = checkout();
	let (mut session, _transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("Bogus-response x\n").session(&wc);

	let result = session.process_requests(vec![Request::Command("update".to_string())]).await;
	match result {
		Err(ClientError::Protocol(ProtocolError::UnknownResponse(token))) => assert_eq!(token, "Bogus-response"),
		other => panic!("expected an unknown response error, got {:?}", other),
	}
}

#[tokio::test]
async fn test_truncated_payload_leaves_working_copy_alone() {
	let (_tmp, wc) = checkout();
	let reply = "Updated ./\n/cvsroot/mod/a.txt\n/a.txt/1.3///\nu=rw,g=r,o=r\n100\nshort";
	let (mut session, _transcript) = ScriptedServer::new().reply(VALID_REQUESTS).reply(reply).session(&wc);

	let result = session.process_requests(vec![Request::Command("update".to_string())]).await;
	assert!(matches!(result, Err(ClientError::Protocol(ProtocolError::UnexpectedEndOfFile { .. }))));
	assert_eq!(std::fs::read(wc.join("a.txt")).unwrap(), b"alpha\n");
	assert_eq!(entry_of(&wc, "a.txt").unwrap().revision, "1.2");
}

#[tokio::test]
async fn test_empty_request_list_is_unconfigured() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) = ScriptedServer::new().reply(VALID_REQUESTS).session(&wc);

	let result = session.process_requests(Vec::new()).await;
	assert!(matches!(result, Err(ClientError::Unconfigured { .. })));
	assert!(transcript.written().is_empty());
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_execute_describes_working_copy() {
	let (_tmp, wc) = checkout();
	create_file(&wc.join("junk.tmp"), b"junk");
	let (mut session, transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("M up to date\nok\n").session(&wc);
	let terminated = Arc::new(Mutex::new(None));
	let sink = terminated.clone();
	session.add_listener(CallbackBuilder::new().on_terminated(move |error| *sink.lock().unwrap() = Some(error)).build());

	session.execute(&BasicCommand::new("status").option("-v")).await.unwrap();

	let text = transcript.text();
	assert_eq!(text.matches("Root /cvsroot\n").count(), 1);
	let body = &text[text.find("Valid-responses").unwrap()..];
	let body = &body[body.find('\n').unwrap() + 1..];
	assert_eq!(
		body,
		"Directory .\n/cvsroot/mod\n\
		Entry /a.txt/1.2///\nUnchanged a.txt\n\
		Entry /b.txt/1.1///\nUnchanged b.txt\n\
		Questionable junk.tmp\n\
		Argument -v\n\
		Directory .\n/cvsroot/mod\n\
		status\n"
	);
	assert_eq!(*terminated.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_execute_local_only_sends_flag() {
	let (_tmp, wc) = checkout();
	let (mut session, transcript) = ScriptedServer::new().reply(VALID_REQUESTS).reply("ok\n").session(&wc);

	session.execute(&BasicCommand::new("update").recursive(false).file(wc.join("a.txt"))).await.unwrap();

	let text = transcript.text();
	assert!(text.ends_with("Argument -l\nArgument a.txt\nDirectory .\n/cvsroot/mod\nupdate\n"));
}

#[tokio::test]
async fn test_execute_reports_failure_to_listeners() {
	let (_tmp, wc) = checkout();
	let (mut session, _transcript) =
		ScriptedServer::new().reply(VALID_REQUESTS).reply("error 13 no such module\n").session(&wc);
	let terminated = Arc::new(Mutex::new(None));
	let sink = terminated.clone();
	session.add_listener(CallbackBuilder::new().on_terminated(move |error| *sink.lock().unwrap() = Some(error)).build());

	let result = session.execute(&BasicCommand::new("update")).await;
	assert!(matches!(result, Err(ClientError::ServerError { ref message }) if message == "no such module"));
	assert_eq!(*terminated.lock().unwrap(), Some(true));
}
