// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应状态模块
//!
//! `Response` 是一次请求独占的可变状态：状态码、子错误码、负载、内容类型、
//! 有序的多值标头，以及 `closed` 标志。拦截器与处理函数修改它，引擎在最后把它
//! 渲染到传输层。一旦 `closed` 为真，就不允许再向传输层写入任何内容。
//!
//! 处理函数也可以绕过渲染直接写出（例如大文件的流式传输），此时响应会被标记为已关闭，
//! 引擎不再渲染。

use std::{
    fmt,
    io::{self, Read, Write},
    sync::{Arc, Mutex},
};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::Utc;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error, warn};
use serde::Serialize;

use crate::{
    exception::{codes, ErrorSignal},
    param::*,
    request::Request,
    util::{executable_name, format_date},
};

/// 小于该长度的响应体不压缩
pub const COMPRESS_MIN_SIZE: usize = 1024;

/// 流式传输的默认块大小（256KB）
pub const DEFAULT_CHUNK_SIZE: usize = 262144;

/// 处理器没有指定内容类型时使用的类型
const FALLBACK_CONTENT_TYPE: &str = "text/plain";

/// 渲染阶段共享的只读设置，由配置构造，所有请求共用一份。
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// `Server` 标头的值
    pub server_name: String,
    /// 文本类内容追加的字符集，空字符串表示不追加
    pub charset: String,
    /// 是否按 `Accept-Encoding` 压缩响应体
    pub compress: bool,
    /// 流式传输的块大小
    pub chunk_size: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            server_name: executable_name(),
            charset: "utf-8".to_string(),
            compress: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// 响应负载
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Text(String),
    Bytes(Bytes),
    Json(serde_json::Value),
}

pub struct Response {
    id: u128,
    status_code: u16,
    sub_code: i32,
    /// 错误响应中返回给客户端的短消息
    message: Option<String>,
    payload: Payload,
    content_type: String,
    /// 标头名 -> 按插入顺序保存的值
    headers: Vec<(String, Vec<String>)>,
    closed: bool,
    head_only: bool,
    accept_encoding: Vec<HttpEncoding>,
    settings: Arc<RenderSettings>,
    out: Box<dyn Write + Send>,
    rendered: Option<Bytes>,
}

impl Response {
    pub fn new(out: Box<dyn Write + Send>, settings: Arc<RenderSettings>) -> Self {
        Self {
            id: 0,
            status_code: 200,
            sub_code: codes::NONE,
            message: None,
            payload: Payload::Empty,
            content_type: String::new(),
            headers: Vec::new(),
            closed: false,
            head_only: false,
            accept_encoding: Vec::new(),
            settings,
            out,
            rendered: None,
        }
    }

    /// 构造绑定到某个请求的响应：继承请求 ID、HEAD 语义与可接受的编码。
    pub fn for_request(
        request: &Request,
        out: Box<dyn Write + Send>,
        settings: Arc<RenderSettings>,
    ) -> Self {
        let mut response = Self::new(out, settings);
        response.id = request.id();
        response.head_only = request.is_head();
        response.accept_encoding = request.accept_encoding().to_vec();
        response
    }

    pub fn set_status(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self
    }

    pub fn set_sub_code(&mut self, code: i32) -> &mut Self {
        self.sub_code = code;
        self
    }

    /// 把响应置为错误状态。拦截器用它来否决请求。
    pub fn fail(&mut self, status: u16, sub_code: i32, message: impl Into<String>) -> &mut Self {
        self.status_code = status;
        self.sub_code = sub_code;
        self.message = Some(message.into());
        self
    }

    /// 用信号覆盖整个响应状态，之前的负载与标头全部丢弃。
    pub fn reset_for_signal(&mut self, signal: &ErrorSignal) {
        self.status_code = signal.status();
        self.sub_code = signal.code();
        self.message = Some(signal.message().to_string());
        self.payload = Payload::Empty;
        self.content_type.clear();
        self.headers.clear();
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.payload = Payload::Text(text.into());
        self
    }

    pub fn set_bytes(&mut self, bytes: impl Into<Bytes>) -> &mut Self {
        self.payload = Payload::Bytes(bytes.into());
        self
    }

    pub fn set_json_value(&mut self, value: serde_json::Value) -> &mut Self {
        self.payload = Payload::Json(value);
        self
    }

    /// 把可序列化的值设为 JSON 负载，序列化失败视为内部错误。
    pub fn set_json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ErrorSignal> {
        let value = serde_json::to_value(value)
            .map_err(|e| ErrorSignal::unhandled(500, format!("payload not serializable: {}", e)))?;
        Ok(self.set_json_value(value))
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.content_type = content_type.into();
        self
    }

    /// 追加一个标头值，同名标头的既有值保留。
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let name = strip_line_breaks(self.id, name);
        let value = strip_line_breaks(self.id, &value.into());
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value),
            None => self.headers.push((name, vec![value])),
        }
        self
    }

    /// 设置标头，替换同名标头的全部既有值。
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let name = strip_line_breaks(self.id, name);
        let value = strip_line_breaks(self.id, &value.into());
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, vec![value]));
        self
    }

    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    /// 重定向到 `location`
    pub fn redirect(&mut self, location: &str, status: u16) -> &mut Self {
        self.status_code = status;
        self.set_header("Location", location);
        self
    }
}

// --- 写出 ---

impl Response {
    /// 写出完整响应（状态行、标头、响应体）并关闭响应。
    pub fn send(&mut self, body: Vec<u8>) -> io::Result<()> {
        if self.closed {
            error!("[ID{}]响应已关闭，忽略重复写出", self.id);
            return Ok(());
        }
        let original = Bytes::from(body);
        let mut encoding = None;
        let mut wire_body = original.clone();
        if self.should_compress(original.len()) {
            encoding = decide_encoding(&self.accept_encoding);
            match compress(original.to_vec(), encoding) {
                Ok(c) => wire_body = Bytes::from(c),
                Err(e) => {
                    error!("[ID{}]压缩响应体失败: {}，返回未压缩内容", self.id, e);
                    encoding = None;
                }
            }
        }
        let head = self.head(wire_body.len() as u64, encoding);
        // 标记在写之前设置，写出失败也不允许再次写入
        self.closed = true;
        self.rendered = Some(original);
        self.out.write_all(head.as_bytes())?;
        if !self.head_only {
            self.out.write_all(&wire_body)?;
        }
        self.out.flush()
    }

    /// 绕过渲染，直接从 `reader` 流式写出 `length` 字节，并关闭响应。
    pub fn stream<R: Read>(&mut self, reader: &mut R, length: u64) -> io::Result<u64> {
        if self.closed {
            error!("[ID{}]响应已关闭，忽略流式写出", self.id);
            return Ok(0);
        }
        let head = self.head(length, None);
        self.closed = true;
        self.out.write_all(head.as_bytes())?;
        if self.head_only {
            self.out.flush()?;
            return Ok(0);
        }

        let mut buffer = vec![0u8; self.settings.chunk_size.max(1)];
        let mut total_sent = 0u64;
        let mut limited = reader.take(length);
        loop {
            let n = limited.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            self.out.write_all(&buffer[..n])?;
            total_sent += n as u64;
        }
        self.out.flush()?;
        debug!("[ID{}]流式传输完成，共发送 {} 字节", self.id, total_sent);
        Ok(total_sent)
    }

    fn should_compress(&self, length: usize) -> bool {
        self.settings.compress
            && !self.head_only
            && length >= COMPRESS_MIN_SIZE
            && !self.content_type.is_empty()
            && !should_skip_compression(&self.content_type)
    }

    /// 构造状态行与标头。`Content-Type`、`Server` 总是出现在其中。
    fn head(&self, content_length: u64, encoding: Option<HttpEncoding>) -> String {
        let mut head = format!(
            "{} {} {}{}",
            HttpVersion::V1_1,
            self.status_code,
            reason_phrase(self.status_code),
            CRLF
        );
        head.push_str(&format!("Content-Type: {}{}", self.wire_content_type(), CRLF));
        if let Some(e) = encoding {
            head.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        head.push_str(&format!("Content-Length: {}{}", content_length, CRLF));
        head.push_str(&format!("Date: {}{}", format_date(&Utc::now()), CRLF));
        head.push_str(&format!("Server: {}{}", self.settings.server_name, CRLF));
        head.push_str(&format!("Connection: close{}", CRLF));
        for (name, values) in &self.headers {
            for value in values {
                head.push_str(&format!("{}: {}{}", name, value, CRLF));
            }
        }
        head.push_str(CRLF);
        head
    }

    /// 追加字符集后缀后的内容类型
    ///
    /// 未设置内容类型时按 `text/plain` 处理。
    pub fn wire_content_type(&self) -> String {
        let content_type = match self.content_type.is_empty() {
            true => FALLBACK_CONTENT_TYPE,
            false => self.content_type.as_str(),
        };
        let charset = &self.settings.charset;
        if !charset.is_empty()
            && is_textual(content_type)
            && !content_type.to_ascii_lowercase().contains("charset")
        {
            format!("{}; charset={}", content_type, charset)
        } else {
            content_type.to_string()
        }
    }
}

// --- Getter 访问器实现 ---

impl Response {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn sub_code(&self) -> i32 {
        self.sub_code
    }

    /// 返回给客户端的短消息，未设置时使用状态码的原因短语。
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| reason_phrase(self.status_code))
    }

    pub fn information(&self) -> &str {
        reason_phrase(self.status_code)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn headers(&self) -> &[(String, Vec<String>)] {
        &self.headers
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_head_only(&self) -> bool {
        self.head_only
    }

    /// 最终渲染出的（未压缩）响应体
    pub fn rendered_body(&self) -> Option<&Bytes> {
        self.rendered.as_ref()
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("id", &self.id)
            .field("status_code", &self.status_code)
            .field("sub_code", &self.sub_code)
            .field("message", &self.message)
            .field("payload", &self.payload)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .field("closed", &self.closed)
            .finish()
    }
}

/// 写入内存的传输层，嵌入方与测试用它取回完整的响应报文。
#[derive(Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        match self.buffer.lock() {
            Ok(lock) => lock.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut lock = match self.buffer.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        lock.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    };

    if let Ok(ref compressed) = result {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }
    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/",
        "video/",
        "audio/",
        "application/zip",
        "application/x-rar",
        "application/x-7z-compressed",
        "application/gzip",
        "application/x-gzip",
        "application/octet-stream",
        "font/woff",
        "font/woff2",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type) && skip_type != "image/")
        || (mime_type.starts_with("image/") && !mime_type.starts_with("image/svg+xml"))
}

/// 优先 gzip，其次 deflate。brotli 压缩较慢，不参与自动协商。
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else {
        None
    }
}

/// 去掉标头中的 CR、LF 与 NUL，避免一个标头被拆成多行甚至多个响应
fn strip_line_breaks(id: u128, text: &str) -> String {
    const FORBIDDEN: [char; 3] = ['\r', '\n', '\0'];
    if !text.contains(FORBIDDEN) {
        return text.to_string();
    }
    warn!("[ID{}]标头中含有控制字符，已移除：{:?}", id, text);
    text.replace(FORBIDDEN, "")
}
