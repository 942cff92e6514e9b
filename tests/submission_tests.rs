//! End-to-end submission tests through the HTTP router.


use axum::http::StatusCode;
use mockito::{Matcher, Server};
use serde_json::{json, Value};

use calclabels::dispatcher::JobConfig;
use calclabels::schema::validate;
use test_harness::{
    compute_graph_request, mock_dispatch, segment_request, status_key_matcher,
    RecordingLauncher, TestApp,
};

fn callback_of(body: &str) -> String {
    let value: Value = serde_json::from_str(body).unwrap();
    value["result-callback"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_compute_graph_submission_returns_callback() {
    let mut server = Server::new_async().await;
    let (instance, status) = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(None);

    let (code, body) = app
        .post_json("/calculation/", &compute_graph_request(&server.url()))
        .await;

    assert_eq!(code, StatusCode::OK, "{body}");
    let callback = callback_of(&body);

    let dirs = app.session_dirs();
    assert_eq!(dirs.len(), 1);
    let session_id = dirs[0].file_name().unwrap().to_str().unwrap().to_string();
    assert_eq!(
        callback,
        format!(
            "{}/api/node/abc123/clusterjobstatus/key/{}",
            server.url(),
            session_id
        )
    );

    assert_eq!(app.launcher.launches(), vec![dirs[0].clone()]);
    instance.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn test_route_without_trailing_slash() {
    let mut server = Server::new_async().await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(None);

    let (code, _) = app
        .post_json("/calculation", &compute_graph_request(&server.url()))
        .await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn test_config_file_matches_validated_request() {
    let mut server = Server::new_async().await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(None);

    let doc = compute_graph_request(&server.url());
    let (code, body) = app.post_json("/calculation/", &doc).await;
    assert_eq!(code, StatusCode::OK);

    let dir = &app.session_dirs()[0];
    let raw = std::fs::read(dir.join("config.json")).unwrap();
    let config: JobConfig = serde_json::from_slice(&raw).unwrap();

    let mut expected = validate(&doc).unwrap();
    expected.dvid_server = None;
    assert_eq!(config.request, expected);
    assert_eq!(config.request.job_size, 500);
    assert_eq!(config.request.overlap_size, 40);
    assert_eq!(config.result_callback, callback_of(&body));
    assert_eq!(config.dvid_server, server.url());
    assert_eq!(
        config.session_id,
        dir.file_name().unwrap().to_str().unwrap()
    );

    let value: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(value["job-size"], 500);
    assert_eq!(value["overlap-size"], 40);
    assert_eq!(value["result-callback"], callback_of(&body));
}

#[tokio::test]
async fn test_unknown_algorithm_creates_nothing() {
    let mut server = Server::new_async().await;
    let _mocks = mock_dispatch(&mut server, 0).await;
    let app = TestApp::new(None);

    let mut doc = compute_graph_request(&server.url());
    doc["algorithm"] = json!("watershed");
    let (code, body) = app.post_json("/calculation/", &doc).await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("algorithm"), "{body}");
    assert!(app.session_dirs().is_empty());
    assert!(app.launcher.launches().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = TestApp::new(None);
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/calculation/")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.session_dirs().is_empty());
}

#[tokio::test]
async fn test_oversized_body_is_bad_request() {
    let app = TestApp::new(None);
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/calculation/")
        .body(axum::body::Body::from(vec![b' '; 3 * 1024 * 1024]))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.session_dirs().is_empty());
}

#[tokio::test]
async fn test_missing_store_location_fails_before_session() {
    let app = TestApp::new(None);
    let mut doc = compute_graph_request("unused");
    doc.as_object_mut().unwrap().remove("dvid-server");

    let (code, body) = app.post_json("/calculation/", &doc).await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("could not be located"), "{body}");
    assert!(app.session_dirs().is_empty());
}

#[tokio::test]
async fn test_store_discovered_through_proxy() {
    let mut server = Server::new_async().await;
    let proxy = server
        .mock("GET", "/services/dvid/node")
        .with_status(200)
        .with_body(json!({ "service-location": server.url() }).to_string())
        .create_async()
        .await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(Some(server.url()));

    let mut doc = compute_graph_request("unused");
    doc.as_object_mut().unwrap().remove("dvid-server");
    let (code, body) = app.post_json("/calculation/", &doc).await;

    assert_eq!(code, StatusCode::OK, "{body}");
    assert!(callback_of(&body).starts_with(&server.url()));
    proxy.assert_async().await;
}

#[tokio::test]
async fn test_segment_stages_artifacts_before_launch() {
    let mut server = Server::new_async().await;
    let classifier = server
        .mock("GET", "/api/node/abc123/classifiers/key/pixel.ilp")
        .with_status(200)
        .with_body("pixel-bytes")
        .create_async()
        .await;
    let agglom = server
        .mock("GET", "/api/node/abc123/classifiers/key/agglom.xml")
        .with_status(200)
        .with_body("<agglom/>")
        .create_async()
        .await;
    let synapses = server
        .mock("GET", "/api/node/abc123/annotations/syn.json")
        .with_status(200)
        .with_body(r#"{"data": []}"#)
        .create_async()
        .await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(None);

    let mut doc = segment_request(&server.url());
    doc["synapses"] = json!("syn.json");
    let (code, body) = app.post_json("/calculation/", &doc).await;
    assert_eq!(code, StatusCode::OK, "{body}");

    let dir = &app.session_dirs()[0];
    assert_eq!(std::fs::read(dir.join("classifier.ilp")).unwrap(), b"pixel-bytes");
    assert_eq!(
        std::fs::read(dir.join("agglomclassifier.xml")).unwrap(),
        b"<agglom/>"
    );
    assert_eq!(
        std::fs::read(dir.join("synapses.json")).unwrap(),
        br#"{"data": []}"#
    );
    assert!(!dir.join("graphclassifier.h5").exists());
    assert!(dir.join("config.json").exists());
    assert_eq!(app.launcher.launches().len(), 1);

    classifier.assert_async().await;
    agglom.assert_async().await;
    synapses.assert_async().await;
}

#[tokio::test]
async fn test_segment_stages_feature_file_from_classifiers() {
    let mut server = Server::new_async().await;
    let _classifiers = server
        .mock(
            "GET",
            Matcher::Regex(r"^/api/node/abc123/classifiers/key/(pixel\.ilp|agglom\.xml)$".into()),
        )
        .with_status(200)
        .with_body("blob")
        .create_async()
        .await;
    let features = server
        .mock("GET", "/api/node/abc123/classifiers/key/features.txt")
        .with_status(200)
        .with_body("moments\nhistogram\n")
        .create_async()
        .await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(None);

    let mut doc = segment_request(&server.url());
    doc["agglomfeaturefile"] = json!("features.txt");
    let (code, body) = app.post_json("/calculation/", &doc).await;
    assert_eq!(code, StatusCode::OK, "{body}");

    let dir = &app.session_dirs()[0];
    assert_eq!(
        std::fs::read(dir.join("agglomfeatures.txt")).unwrap(),
        b"moments\nhistogram\n"
    );
    features.assert_async().await;
}

#[tokio::test]
async fn test_artifact_name_is_one_path_segment() {
    // Nothing listens on port 1; the error names the URL that was tried.
    let app = TestApp::new(None);
    let mut doc = segment_request("127.0.0.1:1");
    doc["classifier"] = json!("../../x");
    let (code, body) = app.post_json("/calculation/", &doc).await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(
        body.contains("/api/node/abc123/classifiers/key/..%2F..%2Fx"),
        "{body}"
    );
    assert!(app.launcher.launches().is_empty());
}

#[tokio::test]
async fn test_uuid_with_path_segments_creates_nothing() {
    let mut server = Server::new_async().await;
    let writes = server
        .mock("POST", Matcher::Any)
        .with_status(200)
        .expect(0)
        .create_async()
        .await;
    let app = TestApp::new(None);

    let mut doc = compute_graph_request(&server.url());
    doc["uuid"] = json!("abc123/../../x");
    let (code, body) = app.post_json("/calculation/", &doc).await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("uuid"), "{body}");
    assert!(app.session_dirs().is_empty());
    writes.assert_async().await;
}

#[tokio::test]
async fn test_segment_without_classifier_never_dispatches() {
    for missing in ["classifier", "agglomclassifier"] {
        let mut server = Server::new_async().await;
        let (instance, status) = mock_dispatch(&mut server, 0).await;
        let app = TestApp::new(None);

        let mut doc = segment_request(&server.url());
        doc[missing] = json!("");
        let (code, body) = app.post_json("/calculation/", &doc).await;

        assert_eq!(code, StatusCode::BAD_REQUEST, "{missing}");
        assert!(body.contains("classifier"), "{body}");
        assert!(app.launcher.launches().is_empty());
        instance.assert_async().await;
        status.assert_async().await;
    }
}

#[tokio::test]
async fn test_unreachable_store_during_staging_never_launches() {
    // Nothing listens on port 1.
    let app = TestApp::new(None);
    let (code, body) = app
        .post_json("/calculation/", &segment_request("127.0.0.1:1"))
        .await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("Classifier could not be read from"), "{body}");
    assert!(body.contains("/api/node/abc123/classifiers/key/pixel.ilp"), "{body}");
    assert!(app.launcher.launches().is_empty());
}

#[tokio::test]
async fn test_failed_optional_artifact_keeps_earlier_files() {
    let mut server = Server::new_async().await;
    let _classifiers = server
        .mock("GET", Matcher::Regex(r"^/api/node/abc123/classifiers/key/(pixel\.ilp|agglom\.xml)$".into()))
        .with_status(200)
        .with_body("blob")
        .create_async()
        .await;
    let _graph = server
        .mock("GET", "/api/node/abc123/classifiers/key/graph.h5")
        .with_status(404)
        .create_async()
        .await;
    let (instance, _) = mock_dispatch(&mut server, 0).await;
    let app = TestApp::new(None);

    let mut doc = segment_request(&server.url());
    doc["graphclassifier"] = json!("graph.h5");
    let (code, body) = app.post_json("/calculation/", &doc).await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("Graph classifier"), "{body}");
    let dir = &app.session_dirs()[0];
    assert!(dir.join("classifier.ilp").exists());
    assert!(!dir.join("config.json").exists());
    assert!(app.launcher.launches().is_empty());
    instance.assert_async().await;
}

#[tokio::test]
async fn test_status_write_failure_is_reported() {
    let mut server = Server::new_async().await;
    let _instance = server
        .mock("POST", "/api/repo/abc123/instance")
        .with_status(200)
        .create_async()
        .await;
    let _status = server
        .mock("POST", status_key_matcher())
        .with_status(500)
        .create_async()
        .await;
    let app = TestApp::new(None);

    let (code, body) = app
        .post_json("/calculation/", &compute_graph_request(&server.url()))
        .await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("status could not be written"), "{body}");
    assert!(app.launcher.launches().is_empty());
}

#[tokio::test]
async fn test_launch_failure_is_reported() {
    let mut server = Server::new_async().await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::with_launcher(None, RecordingLauncher::failing());

    let (code, body) = app
        .post_json("/calculation/", &compute_graph_request(&server.url()))
        .await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("launch failed"), "{body}");
    // The job config stays behind for inspection.
    assert!(app.session_dirs()[0].join("config.json").exists());
}

#[tokio::test]
async fn test_form_submission() {
    let mut server = Server::new_async().await;
    let _mocks = mock_dispatch(&mut server, 1).await;
    let app = TestApp::new(None);

    let store = server.url().trim_start_matches("http://").to_string();
    let form = format!(
        "dvidserver={}&uuid=abc123&labelname=seg&algorithm=compute-graph\
         &bbox1=0%2C0%2C0&bbox2=100%2C100%2C100&jobsize=&classifier=",
        store
    );
    let (code, body) = app.post_form("/formhandler/", &form).await;
    assert_eq!(code, StatusCode::OK, "{body}");

    let dir = &app.session_dirs()[0];
    let config: JobConfig =
        serde_json::from_slice(&std::fs::read(dir.join("config.json")).unwrap()).unwrap();
    assert_eq!(config.request.job_size, 500);
    assert_eq!(config.request.bbox2, Some([100, 100, 100]));
}

#[tokio::test]
async fn test_form_rejects_non_numeric_job_size() {
    let app = TestApp::new(None);
    let (code, body) = app
        .post_form(
            "/formhandler/",
            "dvidserver=store&uuid=abc123&labelname=seg&algorithm=compute-graph\
             &bbox1=0%2C0%2C0&bbox2=1%2C1%2C1&jobsize=big",
        )
        .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body.contains("job-size"), "{body}");
    assert!(app.session_dirs().is_empty());
}

#[tokio::test]
async fn test_form_without_content_type_is_bad_request() {
    let app = TestApp::new(None);
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/formhandler/")
        .body(axum::body::Body::from("uuid=abc&labelname=x&algorithm=bogus"))
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.session_dirs().is_empty());
}
