// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 路由引擎在渲染响应时用到的 HTTP 协议常量：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 静态文件处理器使用的 MIME 类型映射表。
//! - HTTP 版本及内容编码的强类型枚举。

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// 无法确定可执行文件名时，`Server` 响应头使用的名称
pub const SERVER_NAME: &str = "webrouter";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 未知后缀或无后缀文件的 MIME 类型
pub const DEFAULT_MIME: &str = "application/octet-stream";

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 1xx: 信息响应 (Informational)
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");
        
        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(203, "Non-Authoritative Information");
        map.insert(204, "No Content");
        map.insert(205, "Reset Content");
        map.insert(206, "Partial Content");
        
        // 3xx: 重定向 (Redirection)
        map.insert(300, "Multiple Choices");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(305, "Use Proxy");
        // 306 已弃用 (Reserved)
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");
        
        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(402, "Payment Required");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(407, "Proxy Authentication Required");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(411, "Length Required");
        map.insert(412, "Precondition Failed");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(416, "Range Not Satisfiable");
        map.insert(417, "Expectation Failed");
        map.insert(418, "I'm a teapot");
        map.insert(421, "Misdirected Request");
        map.insert(422, "Unprocessable Content");
        map.insert(426, "Upgrade Required");
        
        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名到 MIME 类型的映射表。
    ///
    /// 字符集后缀由渲染阶段按配置统一追加，这里只记录裸类型。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        // 文本
        map.insert("css", "text/css");
        map.insert("csv", "text/csv");
        map.insert("htm", "text/html");
        map.insert("html", "text/html");
        map.insert("ics", "text/calendar");
        map.insert("js", "text/javascript");
        map.insert("mjs", "text/javascript");
        map.insert("md", "text/markdown");
        map.insert("txt", "text/plain");
        map.insert("xml", "text/xml");
        // 结构化数据
        map.insert("json", "application/json");
        map.insert("jsonld", "application/ld+json");
        map.insert("pdf", "application/pdf");
        map.insert("wasm", "application/wasm");
        map.insert("xhtml", "application/xhtml+xml");
        // 图片
        map.insert("avif", "image/avif");
        map.insert("bmp", "image/bmp");
        map.insert("gif", "image/gif");
        map.insert("ico", "image/x-icon");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("png", "image/png");
        map.insert("svg", "image/svg+xml");
        map.insert("webp", "image/webp");
        // 音视频
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("ogg", "audio/ogg");
        map.insert("wav", "audio/wav");
        map.insert("webm", "video/webm");
        // 字体
        map.insert("otf", "font/otf");
        map.insert("ttf", "font/ttf");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        // 压缩包
        map.insert("7z", "application/x-7z-compressed");
        map.insert("gz", "application/gzip");
        map.insert("tar", "application/x-tar");
        map.insert("zip", "application/zip");
        map
    };
}

/// 根据状态码查询原因短语，未收录的状态码返回 `"Unknown"`。
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("Unknown")
}

/// 根据文件后缀（不含 `.`，大小写不敏感）查询 MIME 类型。
pub fn mime_for(extension: &str) -> &'static str {
    MIME_TYPES
        .get(extension.to_ascii_lowercase().as_str())
        .copied()
        .unwrap_or(DEFAULT_MIME)
}

/// 判断内容类型是否为文本类，只有文本类才会追加字符集后缀。
pub fn is_textual(content_type: &str) -> bool {
    let lower = content_type.to_ascii_lowercase();
    lower.starts_with("text/")
        || lower.starts_with("application/json")
        || lower.starts_with("application/javascript")
        || lower.starts_with("application/xml")
        || lower.starts_with("application/xhtml+xml")
        || lower.starts_with("image/svg+xml")
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// zlib 压缩
    Deflate,
    /// Brotli 压缩
    Br,
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为状态行中使用的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}
