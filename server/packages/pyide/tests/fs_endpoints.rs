// Workspace file HTTP endpoints.
include!("common/http.rs");

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_write_read_move_delete() {
    let app = TestApp::new();

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/files/src/main.py",
        Some(json!({ "content": "print('hi')\n" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "write file");
    assert_eq!(payload, json!({ "path": "src/main.py", "bytesWritten": 12 }));
    assert!(app.path("src/main.py").is_file(), "parent created");

    let (status, payload) = send_json(&app.app, Method::GET, "/api/files/src/main.py", None).await;
    assert_eq!(status, StatusCode::OK, "read file");
    assert_eq!(
        payload,
        json!({ "path": "src/main.py", "content": "print('hi')\n", "encoding": "utf8" })
    );

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/move",
        Some(json!({ "source": "src/main.py", "destination": "app/main.py" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "move file");
    assert_eq!(payload, json!({ "source": "src/main.py", "destination": "app/main.py" }));
    assert!(!app.path("src/main.py").exists());
    assert!(app.path("app/main.py").exists());

    let (status, payload) = send_json(&app.app, Method::DELETE, "/api/files/app", None).await;
    assert_eq!(status, StatusCode::OK, "delete directory");
    assert_eq!(payload, json!({ "path": "app" }));
    assert!(!app.path("app").exists());

    let (status, payload) = send_json(&app.app, Method::GET, "/api/files/app/main.py", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["type"], "not_found");
    assert_eq!(payload["status"], 404);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_empty_content_round_trips() {
    let app = TestApp::new();
    let (status, _) = send_json(
        &app.app,
        Method::POST,
        "/api/files/empty.py",
        Some(json!({ "content": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, payload) = send_json(&app.app, Method::GET, "/api/files/empty.py", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["content"], "");
    assert_eq!(payload["encoding"], "utf8");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_binary_content_uses_base64() {
    let app = TestApp::new();
    let (status, _) = send_json(
        &app.app,
        Method::POST,
        "/api/files/data.bin",
        Some(json!({ "content": "/wD+", "encoding": "base64" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(std::fs::read(app.path("data.bin")).unwrap(), [0xff, 0x00, 0xfe]);

    let (_, payload) = send_json(&app.app, Method::GET, "/api/files/data.bin", None).await;
    assert_eq!(payload["encoding"], "base64");
    assert_eq!(payload["content"], "/wD+");

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/files/data.bin",
        Some(json!({ "content": "not base64!", "encoding": "base64" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["type"], "invalid_request");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_listing_is_sorted_directories_first() {
    let app = TestApp::new();
    app.write("zeta.py", "");
    app.write("alpha.py", "");
    app.write("pkg/util.py", "");
    app.write("pkg/__pycache__/util.cpython-312.pyc", "");
    app.write("data/notes.txt", "");

    let (status, first) = send_json(&app.app, Method::GET, "/api/files", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send_json(&app.app, Method::GET, "/api/files", None).await;
    assert_eq!(first, second, "listing is idempotent");

    insta::assert_json_snapshot!(first, @r###"
    [
      {
        "name": "data",
        "type": "directory",
        "path": "data",
        "children": [
          {
            "name": "notes.txt",
            "type": "file",
            "path": "data/notes.txt"
          }
        ]
      },
      {
        "name": "pkg",
        "type": "directory",
        "path": "pkg",
        "children": [
          {
            "name": "util.py",
            "type": "file",
            "path": "pkg/util.py"
          }
        ]
      },
      {
        "name": "alpha.py",
        "type": "file",
        "path": "alpha.py"
      },
      {
        "name": "zeta.py",
        "type": "file",
        "path": "zeta.py"
      }
    ]
    "###);

    let (status, subtree) = send_json(&app.app, Method::GET, "/api/files/pkg", None).await;
    assert_eq!(status, StatusCode::OK, "directory read returns its tree");
    assert_eq!(subtree[0]["path"], "pkg/util.py");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_rejects_paths_outside_workspace() {
    let app = TestApp::new();

    let (status, payload) = send_json(
        &app.app,
        Method::GET,
        "/api/files/..%2F..%2Fetc%2Fpasswd",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["type"], "path_escape");

    let (status, _) = send_json(
        &app.app,
        Method::POST,
        "/api/mkdir",
        Some(json!({ "path": "../outside" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!app.workspace.path().parent().unwrap().join("outside").exists());

    let (status, _) = send_json(
        &app.app,
        Method::POST,
        "/api/move",
        Some(json!({ "from": "a.py", "to": "../../a.py" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_move_never_overwrites() {
    let app = TestApp::new();
    app.write("a.py", "a");
    app.write("b.py", "b");

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/move",
        Some(json!({ "from": "a.py", "to": "b.py" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(payload["type"], "conflict");
    assert_eq!(std::fs::read_to_string(app.path("b.py")).unwrap(), "b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fs_mkdir_duplicate_and_stat() {
    let app = TestApp::new();

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/mkdir",
        Some(json!({ "path": "pkg/sub" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, json!({ "path": "pkg/sub" }));
    assert!(app.path("pkg/sub").is_dir());

    app.write("pkg/mod.py", "x = 1\n");
    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/duplicate",
        Some(json!({ "path": "pkg/mod.py" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["destination"], "pkg/mod_copy.py");

    let (status, payload) = send_json(
        &app.app,
        Method::POST,
        "/api/duplicate",
        Some(json!({ "path": "pkg", "destination": "pkg2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, json!({ "source": "pkg", "destination": "pkg2" }));
    assert!(app.path("pkg2/mod_copy.py").is_file());

    let (status, payload) = send_json(&app.app, Method::GET, "/api/stat/pkg/mod.py", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["type"], "file");
    assert_eq!(payload["size"], 6);
    assert!(payload["modified"].is_string());

    let (status, payload) = send_json(&app.app, Method::GET, "/api/stat/pkg", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["type"], "directory");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stdlib_reads_are_confined() {
    let stdlib = tempfile::tempdir().unwrap();
    std::fs::write(stdlib.path().join("os.py"), "import abc\n").unwrap();
    let stdlib_dir = stdlib.path().to_path_buf();
    let app = TestApp::with_config(|config| config.stdlib_dir = Some(stdlib_dir));

    let (status, payload) = send_json(&app.app, Method::GET, "/api/stdlib/os.py", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["content"], "import abc\n");

    let (status, _) = send_json(&app.app, Method::GET, "/api/stdlib/..%2Fsecret", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn meta_endpoints() {
    let app = TestApp::new();

    let (status, payload) = send_json(&app.app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, json!({ "status": "ok" }));

    let (status, payload) = send_json(&app.app, Method::GET, "/api/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload["rootUri"]
        .as_str()
        .is_some_and(|uri| uri.starts_with("file://")));
    assert_eq!(payload["languageServer"], "pylsp");

    let (status, payload) = send_json(&app.app, Method::GET, "/api/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(payload["paths"]["/api/files/{path}"].is_object());
    assert!(payload["paths"]["/api/download"]["get"].is_object());
    assert!(payload["paths"]["/api/download/{path}"]["get"].is_object());

    let (status, payload) = send_json(&app.app, Method::GET, "/api/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(payload["type"], "not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn static_client_is_served_with_index_fallback() {
    let client = tempfile::tempdir().unwrap();
    std::fs::write(client.path().join("index.html"), "<html>ide</html>").unwrap();
    std::fs::write(client.path().join("app.js"), "console.log(1)").unwrap();
    let static_dir = client.path().to_path_buf();
    let app = TestApp::with_config(|config| config.static_dir = Some(static_dir));

    for (uri, expected) in [
        ("/", "<html>ide</html>"),
        ("/app.js", "console.log(1)"),
        ("/editor/main.py", "<html>ide</html>"),
    ] {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("static request");
        let (status, _headers, bytes) = send_request(&app.app, request).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(bytes.as_ref(), expected.as_bytes(), "{uri}");
    }

    let (status, payload) = send_json(&app.app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["status"], "ok");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lsp_requires_websocket_upgrade() {
    let app = TestApp::new();
    let (status, _) = send_json(&app.app, Method::GET, "/lsp", None).await;
    assert!(status.is_client_error(), "got {status}");
}
