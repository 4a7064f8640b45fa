// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

mod common;

use std::fs;

use webrouter::{codes, Engine, StaticFiles};

use common::{engine, get, header};

fn static_engine(dir: &std::path::Path, threshold: u64) -> Engine {
    let mut engine = engine();
    engine
        .register(
            "/static/*",
            "GET",
            StaticFiles::new(dir, "/static", 8).with_streaming_threshold(threshold),
            &[],
        )
        .unwrap();
    engine
}

#[test]
fn test_static_file_served_with_charset() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>Hello</h1>").unwrap();
    let engine = static_engine(dir.path(), 1024 * 1024);

    let (_, (status, headers, body)) = get(&engine, "/static/index.html");
    assert_eq!(status, 200);
    assert_eq!(body, "<h1>Hello</h1>");
    assert_eq!(header(&headers, "Content-Type"), Some("text/html; charset=utf-8"));
    assert_eq!(header(&headers, "Content-Length"), Some("14"));
}

#[test]
fn test_static_nested_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("css/theme")).unwrap();
    fs::write(dir.path().join("css/theme/main.css"), "body{}").unwrap();
    let engine = static_engine(dir.path(), 1024 * 1024);

    let (_, (status, headers, body)) = get(&engine, "/static/css/theme/main.css");
    assert_eq!(status, 200);
    assert_eq!(body, "body{}");
    assert_eq!(header(&headers, "Content-Type"), Some("text/css; charset=utf-8"));
}

#[test]
fn test_static_mount_root_serves_index() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "home").unwrap();
    let engine = static_engine(dir.path(), 1024 * 1024);

    let (_, (status, _, body)) = get(&engine, "/static");
    assert_eq!(status, 200);
    assert_eq!(body, "home");
}

#[test]
fn test_static_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let engine = static_engine(dir.path(), 1024 * 1024);

    let (response, (status, _, body)) = get(&engine, "/static/nope.png");
    assert_eq!(status, 404);
    assert_eq!(response.sub_code(), codes::STATIC_NOT_FOUND);
    assert_eq!(
        body,
        r#"{"Status":404,"Code":1004,"Message":"static resource not found"}"#
    );
}

#[test]
fn test_static_traversal_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let inner = dir.path().join("public");
    fs::create_dir(&inner).unwrap();
    fs::write(dir.path().join("secret.txt"), "secret").unwrap();
    let engine = static_engine(&inner, 1024 * 1024);

    let (response, (status, _, body)) = get(&engine, "/static/../secret.txt");
    assert_eq!(status, 400);
    assert_eq!(response.sub_code(), codes::INVALID_PATH);
    assert!(!body.contains("secret\""));
}

#[test]
fn test_static_large_file_streamed_once() {
    let dir = tempfile::tempdir().unwrap();
    let content = "0123456789".repeat(300);
    fs::write(dir.path().join("big.txt"), &content).unwrap();
    let engine = static_engine(dir.path(), 1000);

    let (response, (status, headers, body)) = get(&engine, "/static/big.txt");
    assert!(response.is_closed());
    assert_eq!(status, 200);
    assert_eq!(header(&headers, "Content-Length"), Some("3000"));
    assert_eq!(body, content);
}

#[test]
fn test_static_file_change_invalidates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, "[1]").unwrap();
    let engine = static_engine(dir.path(), 1024 * 1024);

    assert_eq!(get(&engine, "/static/data.json").1 .2, "[1]");

    fs::write(&path, "[1,2]").unwrap();
    let modified = fs::metadata(&path).unwrap().modified().unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(modified + std::time::Duration::from_secs(5))
        .unwrap();

    assert_eq!(get(&engine, "/static/data.json").1 .2, "[1,2]");
}
