// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 内置处理函数
//!
//! - [`StaticFiles`]：把挂载前缀之后的路径映射到磁盘上的文件；
//! - [`status_handler`]：以 JSON 返回服务器状态快照；
//! - [`stop_handler`]：延迟一段时间后发出停机信号。

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use log::{debug, info};

use crate::{
    cache::FileCache,
    config::Config,
    exception::ErrorSignal,
    param::mime_for,
    request::Request,
    response::Response,
    router::Handler,
    status::ServerStatus,
    util::split_segments,
};

/// 请求目录时返回的文件
pub const INDEX_FILE: &str = "index.html";

/// 静态文件处理函数，应注册在形如 `/static/*` 的路由上。
pub struct StaticFiles {
    root: PathBuf,
    /// 挂载前缀的段数，匹配时跳过这些段
    mount_depth: usize,
    cache: Arc<Mutex<FileCache>>,
    streaming_threshold: u64,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, mount: &str, cache_size: usize) -> Self {
        Self {
            root: root.into(),
            mount_depth: split_segments(mount).len(),
            cache: Arc::new(Mutex::new(FileCache::from_capacity(cache_size))),
            streaming_threshold: 10485760,
        }
    }

    pub fn from_config(config: &Config, mount: &str) -> Self {
        Self::new(config.www_root(), mount, config.cache_size())
            .with_streaming_threshold(config.streaming_threshold())
    }

    /// 超过该大小的文件直接流式写出，不进入缓存
    pub fn with_streaming_threshold(mut self, threshold: u64) -> Self {
        self.streaming_threshold = threshold;
        self
    }

    pub fn cache(&self) -> &Arc<Mutex<FileCache>> {
        &self.cache
    }

    /// 把请求路径映射到根目录下的文件，拒绝任何试图离开根目录的路径。
    fn resolve(&self, request: &Request) -> Result<PathBuf, ErrorSignal> {
        let relative: Vec<&str> = request
            .segments()
            .iter()
            .skip(self.mount_depth)
            .map(String::as_str)
            .collect();
        if relative
            .iter()
            .any(|s| *s == ".." || s.contains('\\') || s.contains('\0'))
        {
            return Err(ErrorSignal::invalid_path(request.path()));
        }

        let mut path = self.root.clone();
        for segment in relative.iter().filter(|s| **s != ".") {
            path.push(segment);
        }
        if path.is_dir() {
            path.push(INDEX_FILE);
        }
        if !path.is_file() {
            return Err(ErrorSignal::static_not_found(request.path()));
        }

        // 符号链接也不允许指向根目录之外
        if let (Ok(real), Ok(root)) = (path.canonicalize(), self.root.canonicalize()) {
            if !real.starts_with(&root) {
                return Err(ErrorSignal::invalid_path(request.path()));
            }
        }
        Ok(path)
    }

    fn load(&self, path: &Path, size: u64, modified: SystemTime) -> Result<Bytes, ErrorSignal> {
        let mut cache = match self.cache.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(content) = cache.find(path, modified) {
            debug!("缓存命中：{}", path.display());
            return Ok(content);
        }
        let content = Bytes::from(fs::read(path).map_err(|e| {
            ErrorSignal::static_not_found(&path.to_string_lossy())
                .with_detail(format!("failed to read {}: {}", path.display(), e))
        })?);
        if FileCache::should_cache(size, self.streaming_threshold) {
            cache.push(path, content.clone(), modified);
        }
        Ok(content)
    }
}

impl Handler for StaticFiles {
    fn handle(&self, request: &mut Request, response: &mut Response) -> Result<(), ErrorSignal> {
        let path = self.resolve(request)?;
        let metadata = fs::metadata(&path)
            .map_err(|_| ErrorSignal::static_not_found(request.path()))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        response.set_content_type(mime_for(extension));

        if metadata.len() > self.streaming_threshold {
            debug!(
                "[ID{}]文件大小{}超过阈值，使用流式传输",
                request.id(),
                metadata.len()
            );
            let mut file =
                File::open(&path).map_err(|_| ErrorSignal::static_not_found(request.path()))?;
            response.stream(&mut file, metadata.len()).map_err(|e| {
                ErrorSignal::unhandled(500, format!("streaming {} failed: {}", path.display(), e))
            })?;
            return Ok(());
        }

        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let content = self.load(&path, metadata.len(), modified)?;
        response.set_bytes(content);
        Ok(())
    }
}

/// 返回服务器状态快照的处理函数
pub fn status_handler(status: Arc<ServerStatus>) -> impl Handler {
    move |_: &mut Request, response: &mut Response| -> Result<(), ErrorSignal> {
        response.set_json(&status.snapshot())?;
        Ok(())
    }
}

/// 在 `delay` 之后发出停机信号的处理函数。立即返回，不等待停机完成。
pub fn stop_handler(status: Arc<ServerStatus>, delay: Duration) -> impl Handler {
    move |request: &mut Request, response: &mut Response| -> Result<(), ErrorSignal> {
        info!("[ID{}]收到停机请求，{}ms后停机", request.id(), delay.as_millis());
        let status = Arc::clone(&status);
        thread::Builder::new()
            .name("delayed-stop".to_string())
            .spawn(move || {
                thread::sleep(delay);
                status.request_shutdown();
            })
            .map_err(|e| ErrorSignal::unhandled(500, format!("failed to schedule stop: {}", e)))?;
        response.set_text("stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exception::codes, response::MemorySink, response::RenderSettings};
    use std::io::Write;

    fn serve(handler: &StaticFiles, path: &str) -> (Result<(), ErrorSignal>, Response, MemorySink) {
        let sink = MemorySink::new();
        let mut request = Request::new("GET", path);
        let mut response = Response::for_request(
            &request,
            Box::new(sink.clone()),
            Arc::new(RenderSettings::default()),
        );
        let result = handler.handle(&mut request, &mut response);
        (result, response, sink)
    }

    #[test]
    fn test_serves_file_with_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.js"), "let a = 1;").unwrap();
        let handler = StaticFiles::new(dir.path(), "/static", 4);

        let (result, response, _) = serve(&handler, "/static/app.js");
        assert!(result.is_ok());
        assert_eq!(response.content_type(), "text/javascript");
        assert_eq!(
            response.payload(),
            &crate::response::Payload::Bytes(Bytes::from("let a = 1;"))
        );
    }

    #[test]
    fn test_second_read_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "aaa").unwrap();
        let handler = StaticFiles::new(dir.path(), "/static", 4);

        serve(&handler, "/static/a.txt").0.unwrap();
        serve(&handler, "/static/a.txt").0.unwrap();
        let cache = handler.cache().lock().unwrap();
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_directory_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), "<h1>hi</h1>").unwrap();
        let handler = StaticFiles::new(dir.path(), "/", 4);

        let (result, response, _) = serve(&handler, "/");
        assert!(result.is_ok());
        assert_eq!(response.content_type(), "text/html");
    }

    #[test]
    fn test_missing_file_is_static_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let handler = StaticFiles::new(dir.path(), "/static", 4);

        let (result, _, _) = serve(&handler, "/static/none.css");
        let err = result.unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.code(), codes::STATIC_NOT_FOUND);
    }

    #[test]
    fn test_parent_segments_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let handler = StaticFiles::new(dir.path(), "/static", 4);

        let (result, _, _) = serve(&handler, "/static/../../etc/passwd");
        let err = result.unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.code(), codes::INVALID_PATH);
    }

    #[test]
    fn test_large_file_is_streamed() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("big.bin")).unwrap();
        file.write_all(&vec![1u8; 4096]).unwrap();
        let handler = StaticFiles::new(dir.path(), "/static", 4).with_streaming_threshold(1024);

        let (result, response, sink) = serve(&handler, "/static/big.bin");
        assert!(result.is_ok());
        assert!(response.is_closed());
        assert!(sink.as_string().contains("Content-Length: 4096\r\n"));
        assert!(handler.cache().lock().unwrap().is_empty());
    }

    #[test]
    fn test_status_handler_returns_snapshot() {
        let status = ServerStatus::shared();
        status.record_request();
        let handler = status_handler(Arc::clone(&status));

        let sink = MemorySink::new();
        let mut request = Request::new("GET", "/status");
        let mut response =
            Response::new(Box::new(sink), Arc::new(RenderSettings::default()));
        handler.handle(&mut request, &mut response).unwrap();

        match response.payload() {
            crate::response::Payload::Json(value) => assert_eq!(value["requests"], 1),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_stop_handler_requests_shutdown_later() {
        let status = ServerStatus::shared();
        let handler = stop_handler(Arc::clone(&status), Duration::from_millis(50));

        let mut request = Request::new("GET", "/stop");
        let mut response =
            Response::new(Box::new(MemorySink::new()), Arc::new(RenderSettings::default()));
        handler.handle(&mut request, &mut response).unwrap();
        assert!(!status.is_shutting_down());

        for _ in 0..100 {
            if status.is_shutting_down() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(status.is_shutting_down());
    }
}
