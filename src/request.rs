// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! 负责把连接上读到的请求头解析为 `Request`，并为分发引擎提供按需解析的数据：
//! 1. 请求行（方法、目标、版本）与常用标头在构造时一次性解析。
//! 2. 路径段、查询参数在第一次访问时解析并缓存。
//! 3. 请求体在第一次访问时才从连接上读取，读取失败或超过上限都会转为 `ErrorSignal`。
//!
//! 这些缓存只属于当前请求，不会在请求之间共享。

use std::{
    cell::OnceCell,
    fmt,
    io::{BufRead, Cursor, Read},
};

use bytes::Bytes;
use log::{debug, error};
use serde::de::DeserializeOwned;

use crate::{
    binder::PathParams,
    exception::{ErrorSignal, Exception},
    param::*,
    util::split_segments,
};

/// 请求头允许的最大字节数
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// 请求体默认上限（10MB）
pub const DEFAULT_MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

pub struct Request {
    /// 全局请求 ID，用于在多线程环境下追踪日志
    id: u128,
    /// 大写的请求方法
    method: String,
    /// 不含查询字符串的路径
    path: String,
    /// `?` 之后的原始查询字符串
    raw_query: String,
    version: HttpVersion,
    /// 按出现顺序保存的全部标头
    headers: Vec<(String, String)>,
    accept_encoding: Vec<HttpEncoding>,
    content_length: Option<u64>,
    max_body_size: u64,
    segments: OnceCell<Vec<String>>,
    query: OnceCell<Vec<(String, String)>>,
    /// 第一次读取的结果，失败同样保留，之后的访问返回同一个错误
    body: Option<Result<Bytes, ErrorSignal>>,
    body_source: Option<Box<dyn Read + Send>>,
    params: PathParams,
}

impl Request {
    /// 直接构造请求，供嵌入方与测试使用。
    pub fn new(method: &str, target: &str) -> Self {
        let (path, raw_query) = split_target(target);
        Self {
            id: 0,
            method: method.trim().to_ascii_uppercase(),
            path,
            raw_query,
            version: HttpVersion::V1_1,
            headers: Vec::new(),
            accept_encoding: Vec::new(),
            content_length: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            segments: OnceCell::new(),
            query: OnceCell::new(),
            body: None,
            body_source: None,
            params: PathParams::default(),
        }
    }

    pub fn with_id(mut self, id: u128) -> Self {
        self.id = id;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.content_length = Some(body.len() as u64);
        self.body_source = Some(Box::new(Cursor::new(body)));
        self.body = None;
        self
    }

    pub fn with_max_body_size(mut self, limit: u64) -> Self {
        self.max_body_size = limit;
        self
    }

    /// 从完整的字节缓冲区解析请求，请求头之后的字节作为请求体。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, rest) = match find_head_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end..]),
            None => (buffer, &buffer[buffer.len()..]),
        };
        let head = match std::str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let mut request = Self::parse_head(head, id)?;
        if !rest.is_empty() || request.content_length.is_some() {
            let length = request
                .content_length
                .map_or(rest.len(), |l| (l as usize).min(rest.len()));
            request.body_source = Some(Box::new(Cursor::new(rest[..length].to_vec())));
        }
        Ok(request)
    }

    /// 从连接上读取请求头，请求体保留在连接上，直到第一次访问时再读取。
    pub fn read_from<R>(mut reader: R, id: u128) -> Result<Self, Exception>
    where
        R: BufRead + Send + 'static,
    {
        let mut head = Vec::new();
        loop {
            let mut line = Vec::new();
            let n = match reader.read_until(b'\n', &mut line) {
                Ok(n) => n,
                Err(e) => {
                    error!("[ID{}]读取请求头时遇到错误: {}", id, e);
                    return Err(Exception::ConnectionClosed);
                }
            };
            if n == 0 {
                return Err(Exception::ConnectionClosed);
            }
            let blank = line == b"\r\n" || line == b"\n";
            if blank && head.is_empty() {
                // 请求之间多余的空行
                continue;
            }
            head.extend_from_slice(&line);
            if head.len() > MAX_HEAD_SIZE {
                error!("[ID{}]请求头超过{}字节", id, MAX_HEAD_SIZE);
                return Err(Exception::RequestHeadTooLarge);
            }
            if blank {
                break;
            }
        }
        let head = match String::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let mut request = Self::parse_head(&head, id)?;
        if let Some(length) = request.content_length {
            request.body_source = Some(Box::new(reader.take(length)));
        }
        Ok(request)
    }

    fn parse_head(head: &str, id: u128) -> Result<Self, Exception> {
        let mut lines = head.lines();
        let request_line = lines.next().unwrap_or_default();

        // 请求行 (e.g., "GET /index.html HTTP/1.1")
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequestLine);
        }

        let version = match parts[2].to_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let mut request = Self::new(parts[0], parts[1]).with_id(id);
        request.version = version;

        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                request.push_header(name.trim(), value.trim());
            }
        }
        debug!(
            "[ID{}]请求行解析完毕：{} {}，标头{}个",
            id,
            request.method,
            request.path,
            request.headers.len()
        );
        Ok(request)
    }

    fn push_header(&mut self, name: &str, value: &str) {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "content-length" => self.content_length = value.parse::<u64>().ok(),
            // 这里的逻辑比较简单，只要包含关键词即视为支持
            "accept-encoding" => {
                self.accept_encoding.clear();
                if value.contains("gzip") {
                    self.accept_encoding.push(HttpEncoding::Gzip);
                }
                if value.contains("deflate") {
                    self.accept_encoding.push(HttpEncoding::Deflate);
                }
                if value.contains("br") {
                    self.accept_encoding.push(HttpEncoding::Br);
                }
            }
            _ => {}
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// 路由匹配成功后由引擎调用，绑定 URL 参数。
    pub(crate) fn bind(&mut self, names: &[(String, usize)]) {
        self.params = PathParams::new(names, self.segments().to_vec());
    }
}

// --- 按需解析 ---

impl Request {
    /// 归一化后的路径段
    pub fn segments(&self) -> &[String] {
        self.segments
            .get_or_init(|| split_segments(&self.path).into_iter().map(String::from).collect())
    }

    /// 解码后的查询参数，保持出现顺序
    pub fn query_pairs(&self) -> &[(String, String)] {
        self.query.get_or_init(|| {
            url::form_urlencoded::parse(self.raw_query.as_bytes())
                .into_owned()
                .collect()
        })
    }

    /// 取查询参数，默认值语义与 URL 参数相同。
    pub fn query(&self, name: &str, default: &str) -> Result<String, ErrorSignal> {
        match self.query_pairs().iter().find(|(k, _)| k == name) {
            Some((_, v)) => Ok(v.clone()),
            None if default.is_empty() => Err(ErrorSignal::missing_parameter(name)),
            None => Ok(default.to_string()),
        }
    }

    /// 读取并缓存请求体。连接上的数据只读一次，读取失败后再次访问得到同一个错误。
    pub fn body(&mut self) -> Result<&Bytes, ErrorSignal> {
        if self.body.is_none() {
            let result = self.read_body();
            self.body = Some(result);
        }
        match self.body.get_or_insert_with(|| Ok(Bytes::new())) {
            Ok(bytes) => Ok(&*bytes),
            Err(signal) => Err(signal.clone()),
        }
    }

    pub fn body_text(&mut self) -> Result<String, ErrorSignal> {
        let body = self.body()?;
        String::from_utf8(body.to_vec())
            .map_err(|e| ErrorSignal::body_unreadable(format!("body is not UTF-8: {}", e)))
    }

    pub fn body_json<T: DeserializeOwned>(&mut self) -> Result<T, ErrorSignal> {
        let body = self.body()?;
        serde_json::from_slice(body).map_err(|e| ErrorSignal::invalid_json(e.to_string()))
    }

    fn read_body(&mut self) -> Result<Bytes, ErrorSignal> {
        let source = match self.body_source.take() {
            Some(s) => s,
            None => return Ok(Bytes::new()),
        };
        let limit = self.max_body_size;
        if let Some(length) = self.content_length {
            if length > limit {
                return Err(ErrorSignal::body_too_large(length, limit));
            }
        }
        let mut buffer = Vec::new();
        source
            .take(limit + 1)
            .read_to_end(&mut buffer)
            .map_err(|e| ErrorSignal::body_unreadable(e.to_string()))?;
        if buffer.len() as u64 > limit {
            return Err(ErrorSignal::body_too_large(buffer.len() as u64, limit));
        }
        if let Some(length) = self.content_length {
            if (buffer.len() as u64) < length {
                return Err(ErrorSignal::body_unreadable(format!(
                    "expected {} bytes, connection delivered {}",
                    length,
                    buffer.len()
                )));
            }
        }
        debug!("[ID{}]请求体读取完毕，{}字节", self.id, buffer.len());
        Ok(Bytes::from(buffer))
    }
}

// --- URL 参数 ---

impl Request {
    pub fn named_part(&self, name: &str, default: &str) -> Result<String, ErrorSignal> {
        self.params.named(name, default)
    }

    pub fn part(&self, index: usize, default: &str) -> Result<String, ErrorSignal> {
        self.params.positional(index, default)
    }

    pub fn named_part_int(&self, name: &str, default: i64) -> Result<i64, ErrorSignal> {
        self.params.named_int(name, default)
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// 按名称（大小写不敏感）取第一个标头值
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.raw_query)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish()
    }
}

fn split_target(target: &str) -> (String, String) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::codes;
    use serde_derive::Deserialize;

    /// 验证常规 GET 请求的解析，包括 Path 和 Headers
    #[test]
    fn test_parse_get_request() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Browser\r\nAccept-Encoding: gzip, deflate, br\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/");
        assert_eq!(request.user_agent(), "Test-Browser");
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
        assert!(request.accept_encoding().contains(&HttpEncoding::Deflate));
        assert!(request.accept_encoding().contains(&HttpEncoding::Br));
    }

    /// 任意方法都交给路由表裁决
    #[test]
    fn test_any_method_is_accepted() {
        let request_str = "DELETE /resource HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert_eq!(request.method(), "DELETE");
    }

    /// 验证请求方法的小写兼容性处理
    #[test]
    fn test_lowercase_method() {
        let request = Request::try_from(b"get / HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(request.method(), "GET");
    }

    #[test]
    fn test_http_1_0_accepted() {
        let request = Request::try_from(b"GET / HTTP/1.0\r\n\r\n", 0).unwrap();
        assert_eq!(request.version(), HttpVersion::V1_0);
    }

    /// 确保不支持的版本（如 HTTP/2.0）被正确拒绝
    #[test]
    fn test_unsupported_http_version() {
        let result = Request::try_from(b"GET / HTTP/2.0\r\nHost: localhost\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::UnsupportedHttpVersion);
    }

    #[test]
    fn test_malformed_request_line() {
        let result = Request::try_from(b"GET /a b HTTP/1.1\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequestLine);
        let result = Request::try_from(b"\r\n\r\n", 0);
        assert_eq!(result.unwrap_err(), Exception::MalformedRequestLine);
    }

    /// 验证 UTF-8 编码检查
    #[test]
    fn test_invalid_utf8() {
        let result = Request::try_from(&[0xFF, 0xFE, 0xFD], 0);
        assert_eq!(result.unwrap_err(), Exception::RequestIsNotUtf8);
    }

    /// 验证 Header 字段名是否大小写不敏感
    #[test]
    fn test_case_insensitive_headers() {
        let request_str =
            "GET / HTTP/1.1\r\nhost: localhost:7878\r\nuser-agent: Test\r\naccept-encoding: gzip\r\n\r\n";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.user_agent(), "Test");
        assert_eq!(request.header("HOST"), Some("localhost:7878"));
        assert!(request.accept_encoding().contains(&HttpEncoding::Gzip));
        assert!(!request.accept_encoding().contains(&HttpEncoding::Br));
    }

    /// 确保带查询参数的路径被拆分，查询参数按需解码
    #[test]
    fn test_path_with_query_string() {
        let request =
            Request::try_from(b"GET /page?id=123&name=a+b%21 HTTP/1.1\r\n\r\n", 0).unwrap();

        assert_eq!(request.path(), "/page");
        assert_eq!(request.raw_query(), "id=123&name=a+b%21");
        assert_eq!(request.query("id", "").unwrap(), "123");
        assert_eq!(request.query("name", "").unwrap(), "a b!");
        assert_eq!(request.query("absent", "fallback").unwrap(), "fallback");
        assert_eq!(
            request.query("absent", "").unwrap_err().code(),
            codes::MISSING_URL_PARAMETER
        );
    }

    #[test]
    fn test_segments_are_normalized() {
        let request = Request::new("GET", "//a///b/?x=1");
        assert_eq!(request.segments(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_body_from_buffer() {
        let request_str =
            "POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\ntest=valueEXTRA";
        let mut request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.content_length(), Some(10));
        assert_eq!(request.body_text().unwrap(), "test=value");
        // 第二次访问命中缓存
        assert_eq!(request.body().unwrap().as_ref(), b"test=value");
    }

    #[test]
    fn test_body_absent_is_empty() {
        let mut request = Request::new("GET", "/");
        assert!(request.body().unwrap().is_empty());
    }

    #[test]
    fn test_read_from_leaves_body_on_stream() {
        let raw = b"\r\nPOST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello world".to_vec();
        let mut request = Request::read_from(Cursor::new(raw), 3).unwrap();

        assert_eq!(request.id(), 3);
        assert_eq!(request.path(), "/echo");
        assert_eq!(request.body_text().unwrap(), "hello");
    }

    #[test]
    fn test_read_from_truncated_head() {
        let result = Request::read_from(Cursor::new(b"GET / HTTP/1.1\r\nHost: x".to_vec()), 0);
        assert_eq!(result.unwrap_err(), Exception::ConnectionClosed);
    }

    #[test]
    fn test_read_from_head_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..2000 {
            raw.extend_from_slice(format!("X-Filler-{}: value\r\n", i).as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        let result = Request::read_from(Cursor::new(raw), 0);
        assert_eq!(result.unwrap_err(), Exception::RequestHeadTooLarge);
    }

    #[test]
    fn test_truncated_body_is_unreadable() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 50\r\n\r\nshort".to_vec();
        let mut request = Request::read_from(Cursor::new(raw), 0).unwrap();
        let err = request.body().unwrap_err();
        assert_eq!(err.code(), codes::BODY_UNREADABLE);
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_body_too_large() {
        let mut request = Request::new("POST", "/").with_body("0123456789").with_max_body_size(4);
        let err = request.body().unwrap_err();
        assert_eq!(err.status(), 413);
        assert_eq!(err.code(), codes::BODY_TOO_LARGE);
    }

    #[test]
    fn test_failed_body_read_is_remembered() {
        let mut request = Request::new("POST", "/").with_body("0123456789").with_max_body_size(4);
        let first = request.body().unwrap_err();
        // 再次读取不能变成空请求体
        let second = request.body().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(second.code(), codes::BODY_TOO_LARGE);
        assert_eq!(request.body_text().unwrap_err().code(), codes::BODY_TOO_LARGE);

        let raw = b"POST / HTTP/1.1\r\nContent-Length: 50\r\n\r\nshort".to_vec();
        let mut request = Request::read_from(Cursor::new(raw), 0).unwrap();
        assert_eq!(request.body().unwrap_err().code(), codes::BODY_UNREADABLE);
        assert_eq!(request.body().unwrap_err().code(), codes::BODY_UNREADABLE);
    }

    #[test]
    fn test_body_json() {
        #[derive(Debug, Deserialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let mut request = Request::new("POST", "/").with_body(r#"{"x":1,"y":2}"#);
        let point: Point = request.body_json().unwrap();
        assert_eq!((point.x, point.y), (1, 2));

        let mut request = Request::new("POST", "/").with_body("{oops");
        let err = request.body_json::<Point>().unwrap_err();
        assert_eq!(err.code(), codes::INVALID_JSON);
    }
}
