mod common;

use std::collections::HashMap;

use common::*;
use tus_io::http::HttpMethod;
use tus_io::{Client, Error, Upload, UploadStream, OFFSET_UNKNOWN, SIZE_UNKNOWN};
use url::Url;

fn client(handler: &MockHandler) -> Client {
    Client::new(handler.clone(), Url::parse(BASE_URL).unwrap())
}

fn client_with_extensions(handler: &MockHandler, extensions: &[&str]) -> Client {
    client(handler).with_capabilities(capabilities(extensions))
}

fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn update_capabilities_parses_options_response() {
    let handler = MockHandler::new();
    handler.enqueue(
        MockReply::new(204)
            .without_version()
            .header("Tus-Version", "1.0.0,0.2.2")
            .header("Tus-Max-Size", "1048576")
            .header("Tus-Extension", "creation,termination,checksum")
            .header("Tus-Checksum-Algorithm", "sha1,md5,whirlpool"),
    );
    let client = client(&handler);

    let caps = client.update_capabilities().expect("update failed");
    assert_eq!(caps.protocol_versions, ["1.0.0", "0.2.2"]);
    assert_eq!(caps.max_size, 1_048_576);
    assert!(caps.supports_extension("termination"));
    assert_eq!(caps.checksum_algorithms, ["sha1", "md5"]);
    assert_eq!(client.capabilities().unwrap(), caps);

    let req = handler.request(0);
    assert_eq!(req.method, HttpMethod::Options);
    assert_eq!(req.url, BASE_URL);
    // OPTIONS requests must not carry the protocol version header.
    assert_eq!(req.header("Tus-Resumable"), None);
}

#[test]
fn update_capabilities_rejects_unexpected_status() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(500));
    let client = client(&handler);

    assert!(matches!(
        client.update_capabilities(),
        Err(Error::UnexpectedResponse { status: 500 })
    ));
}

#[test]
fn ensure_extension_fetches_capabilities_once() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(204).header("Tus-Extension", "creation"));
    let client = client(&handler);

    client.ensure_extension("creation").expect("should be there");
    assert!(matches!(
        client.ensure_extension("termination"),
        Err(Error::UnsupportedFeature(ext)) if ext == "termination"
    ));
    assert_eq!(handler.request_count(), 1, "capabilities fetched lazily, once");
}

#[test]
fn get_upload_fills_in_upload_state() {
    let handler = MockHandler::new();
    handler.enqueue(
        MockReply::new(200)
            .header("Upload-Offset", "1234")
            .header("Upload-Length", "2345")
            .header("Upload-Metadata", "filename cmVwb3J0LnBkZg==")
            .header("Upload-Concat", "partial"),
    );
    let client = client(&handler);

    let upload = client.get_upload("/foo/bar").expect("get_upload failed");
    assert_eq!(upload.location, "/foo/bar");
    assert_eq!(upload.remote_offset, 1234);
    assert_eq!(upload.remote_size, 2345);
    assert_eq!(upload.metadata, metadata(&[("filename", "report.pdf")]));
    assert!(upload.partial);

    let req = handler.request(0);
    assert_eq!(req.method, HttpMethod::Head);
    assert_eq!(req.url, "http://example.com/foo/bar");
    assert_eq!(req.header("Tus-Resumable"), Some("1.0.0"));
}

#[test]
fn get_upload_of_final_concatenation_in_progress() {
    let handler = MockHandler::new();
    handler.enqueue(
        MockReply::new(200)
            .header("Upload-Concat", "final")
            .header("Upload-Length", "2048"),
    );
    let client = client(&handler);

    let upload = client.get_upload("/foo/final").unwrap();
    assert_eq!(upload.remote_offset, OFFSET_UNKNOWN);
    assert_eq!(upload.remote_size, 2048);
    assert!(!upload.partial);
}

#[test]
fn get_upload_without_length_leaves_size_unknown() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(200).header("Upload-Offset", "0"));
    let client = client(&handler);

    let upload = client.get_upload("/foo/bar").unwrap();
    assert_eq!(upload.remote_size, SIZE_UNKNOWN);
}

#[test]
fn get_upload_requires_an_offset() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(200));
    let client = client(&handler);

    assert!(matches!(
        client.get_upload("/foo/bar"),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn get_upload_rejects_non_numeric_offset() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(200).header("Upload-Offset", "many"));
    let client = client(&handler);

    assert!(matches!(
        client.get_upload("/foo/bar"),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn get_upload_maps_missing_uploads() {
    for status in [404, 410, 403] {
        let handler = MockHandler::new();
        handler.enqueue(MockReply::new(status));
        let client = client(&handler);
        assert!(
            matches!(client.get_upload("/gone"), Err(Error::UploadDoesNotExist)),
            "status {} should map to UploadDoesNotExist",
            status
        );
    }
}

#[test]
fn create_upload_sends_creation_headers() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(201).header("Location", "/files/abc"));
    let client = client_with_extensions(&handler, &["creation"]);

    let upload = client
        .create_upload(1024, false, HashMap::new())
        .expect("create failed");
    assert_eq!(upload.location, "/files/abc");
    assert_eq!(upload.remote_size, 1024);
    assert_eq!(upload.remote_offset, 0);
    assert!(!upload.partial);

    let req = handler.request(0);
    assert_eq!(req.method, HttpMethod::Post);
    assert_eq!(req.url, BASE_URL);
    assert_eq!(req.header("Upload-Length"), Some("1024"));
    assert_eq!(req.header("Content-Length"), Some("0"));
    assert_eq!(req.header("Upload-Defer-Length"), None);
    assert_eq!(req.header("Upload-Concat"), None);
}

#[test]
fn create_upload_with_deferred_length() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(201).header("Location", "/files/deferred"));
    let client =
        client_with_extensions(&handler, &["creation", "creation-defer-length"]);

    let upload = client
        .create_upload(SIZE_UNKNOWN, false, HashMap::new())
        .expect("create failed");
    assert_eq!(upload.remote_size, SIZE_UNKNOWN);

    let req = handler.request(0);
    assert_eq!(req.header("Upload-Defer-Length"), Some("1"));
    assert_eq!(req.header("Upload-Length"), None);
}

#[test]
fn create_upload_partial_with_metadata_and_expiry() {
    let handler = MockHandler::new();
    handler.enqueue(
        MockReply::new(201)
            .header("Location", "/files/part")
            .header("Upload-Expires", "Wed, 25 Jun 2014 16:00:00 GMT"),
    );
    let client = client_with_extensions(&handler, &["creation"]);
    let meta = metadata(&[("filename", "report.pdf")]);

    let upload = client.create_upload(64, true, meta.clone()).unwrap();
    assert!(upload.partial);
    assert_eq!(upload.metadata, meta);
    assert!(upload.upload_expired.is_some());

    let req = handler.request(0);
    assert_eq!(req.header("Upload-Concat"), Some("partial"));
    assert_eq!(req.header("Upload-Metadata"), Some("filename cmVwb3J0LnBkZg=="));
}

#[test]
fn create_upload_maps_413_to_too_large() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(413));
    let client = client_with_extensions(&handler, &["creation"]);

    assert!(matches!(
        client.create_upload(1 << 40, false, HashMap::new()),
        Err(Error::UploadTooLarge)
    ));
}

#[test]
fn create_upload_requires_creation_extension() {
    let handler = MockHandler::new();
    let client = client_with_extensions(&handler, &["termination"]);

    assert!(matches!(
        client.create_upload(16, false, HashMap::new()),
        Err(Error::UnsupportedFeature(ext)) if ext == "creation"
    ));
    assert_eq!(handler.request_count(), 0);
}

#[test]
#[should_panic(expected = "upload size is negative")]
fn create_upload_panics_on_negative_size() {
    let handler = MockHandler::new();
    let client = client_with_extensions(&handler, &["creation"]);
    let _ = client.create_upload(-5, false, HashMap::new());
}

#[test]
fn create_upload_with_data_uploads_in_one_request() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(201).header("Location", "/files/with-data"));
    let client = client_with_extensions(&handler, &["creation-with-upload"]);
    let data = payload(11);

    let (upload, uploaded) = client
        .create_upload_with_data(&data, 11, false, HashMap::new())
        .expect("create with data failed");
    assert_eq!(uploaded, 11);
    assert_eq!(upload.location, "/files/with-data");
    assert_eq!(upload.remote_offset, 11);
    assert_eq!(upload.remote_size, 11);

    let req = handler.request(0);
    assert_eq!(req.method, HttpMethod::Post);
    assert_eq!(req.url, BASE_URL);
    assert_eq!(req.body, data);
    assert_eq!(req.header("Upload-Length"), Some("11"));
    assert_eq!(req.header("Upload-Offset"), None);
    assert_eq!(
        req.header("Content-Type"),
        Some("application/offset+octet-stream")
    );
}

#[test]
#[should_panic(expected = "upload size is negative")]
fn create_upload_with_data_panics_on_negative_size() {
    let handler = MockHandler::new();
    let client = client_with_extensions(&handler, &["creation-with-upload"]);
    let _ = client.create_upload_with_data(&payload(8), SIZE_UNKNOWN, false, HashMap::new());
}

#[test]
fn delete_upload_issues_delete() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(204));
    let client = client_with_extensions(&handler, &["termination"]);

    client
        .delete_upload(&Upload::new("/foo/bar", 64))
        .expect("delete failed");
    let req = handler.request(0);
    assert_eq!(req.method, HttpMethod::Delete);
    assert_eq!(req.url, "http://example.com/foo/bar");
}

#[test]
fn delete_upload_maps_gone_uploads() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(410));
    let client = client_with_extensions(&handler, &["termination"]);

    assert!(matches!(
        client.delete_upload(&Upload::new("/foo/bar", 64)),
        Err(Error::UploadDoesNotExist)
    ));
}

#[test]
fn concatenate_uploads_builds_final_upload() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(201).header("Location", "/foo/bar/baz"));
    let client = client_with_extensions(&handler, &["concatenation"]);

    let mut first = Upload::new("/foo/bar", 512);
    first.partial = true;
    let mut second = Upload::new("/foo/baz", 512);
    second.partial = true;

    let finished = client
        .concatenate_uploads(&[first, second], HashMap::new())
        .expect("concatenate failed");
    assert_eq!(finished.location, "/foo/bar/baz");
    assert!(!finished.partial);
    assert_eq!(finished.remote_size, SIZE_UNKNOWN);
    assert_eq!(finished.remote_offset, OFFSET_UNKNOWN);

    let req = handler.request(0);
    assert_eq!(req.method, HttpMethod::Post);
    assert_eq!(req.header("Upload-Concat"), Some("final;/foo/bar /foo/baz"));
}

#[test]
fn concatenate_rejects_non_partial_inputs_without_a_request() {
    let handler = MockHandler::new();
    let client = client_with_extensions(&handler, &["concatenation"]);

    let mut first = Upload::new("/foo/bar", 512);
    first.partial = true;
    let second = Upload::new("/foo/baz", 512);

    assert!(matches!(
        client.concatenate_uploads(&[first, second], HashMap::new()),
        Err(Error::NotPartial(location)) if location == "/foo/baz"
    ));
    assert_eq!(handler.request_count(), 0);
}

#[test]
fn concatenate_streams_rejects_non_partial_inputs_before_any_request() {
    // No capabilities cached: an extension check would have to issue a
    // lazy OPTIONS request, which must not happen for bad inputs.
    let handler = MockHandler::new();
    let client = client(&handler);

    let mut upload = Upload::new("/foo/bar", 512);
    upload.remote_offset = 100; // unfinished, and not partial either
    let stream = UploadStream::new(&client, upload);

    assert!(matches!(
        client.concatenate_streams(&[&stream], HashMap::new()),
        Err(Error::NotPartial(location)) if location == "/foo/bar"
    ));
    assert_eq!(handler.request_count(), 0);
}

#[test]
fn concatenate_streams_requires_unfinished_extension() {
    let handler = MockHandler::new();
    let client = client_with_extensions(&handler, &["concatenation"]);

    let mut upload = Upload::new("/foo/bar", 512);
    upload.partial = true;
    upload.remote_offset = 100; // not finished
    let stream = UploadStream::new(&client, upload);

    assert!(matches!(
        client.concatenate_streams(&[&stream], HashMap::new()),
        Err(Error::UnsupportedFeature(ext)) if ext == "concatenation-unfinished"
    ));
}

#[test]
fn concatenate_streams_of_finished_uploads() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(201).header("Location", "/foo/combined"));
    let client = client_with_extensions(&handler, &["concatenation"]);

    let mut upload = Upload::new("/foo/bar", 512);
    upload.partial = true;
    upload.remote_offset = 512;
    let stream = UploadStream::new(&client, upload);

    let finished = client
        .concatenate_streams(&[&stream], HashMap::new())
        .expect("concatenate failed");
    assert_eq!(finished.location, "/foo/combined");
}

#[test]
fn precondition_failed_cites_server_versions() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(412).header("Tus-Version", "0.2.2"));
    let client = client_with_extensions(&handler, &["termination"]);

    match client.delete_upload(&Upload::new("/foo/bar", 64)) {
        Err(Error::Protocol(msg)) => assert!(msg.contains("0.2.2"), "got {:?}", msg),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[test]
fn mismatched_response_version_is_a_protocol_error() {
    let handler = MockHandler::new();
    handler.enqueue(
        MockReply::new(200)
            .without_version()
            .header("Tus-Resumable", "0.2.2")
            .header("Upload-Offset", "0"),
    );
    let client = client(&handler);

    assert!(matches!(
        client.get_upload("/foo/bar"),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn missing_response_version_fails_only_success_statuses() {
    let handler = MockHandler::new();
    handler.enqueue(
        MockReply::new(200)
            .without_version()
            .header("Upload-Offset", "0"),
    );
    let client1 = client(&handler);
    assert!(matches!(
        client1.get_upload("/foo/bar"),
        Err(Error::Protocol(_))
    ));

    // A 404 without the header keeps its own meaning.
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(404).without_version());
    let client2 = client(&handler);
    assert!(matches!(
        client2.get_upload("/foo/bar"),
        Err(Error::UploadDoesNotExist)
    ));
}

#[test]
fn request_hook_can_add_headers() {
    let handler = MockHandler::new();
    handler.enqueue(MockReply::new(200).header("Upload-Offset", "0"));
    let client = client(&handler).with_request_hook(|req| {
        req.headers
            .insert("Authorization".to_owned(), "Bearer token".to_owned());
    });

    client.get_upload("/foo/bar").unwrap();
    assert_eq!(handler.request(0).header("Authorization"), Some("Bearer token"));
}

#[test]
fn cancelled_token_stops_requests_before_sending() {
    let handler = MockHandler::new();
    let token = tus_io::CancelToken::new();
    token.cancel();
    let client = client_with_extensions(&handler, &["termination"]).with_cancel_token(token);

    assert!(matches!(
        client.delete_upload(&Upload::new("/foo/bar", 64)),
        Err(Error::Transport(_))
    ));
    assert_eq!(handler.request_count(), 0);
}
