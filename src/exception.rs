// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中的两类异常：
//!
//! - [`Exception`]：宿主层面的失败（请求报文无法解析、配置文件无法读取等），
//!   发生在分发引擎接手请求之前，由服务器循环直接处理。
//! - [`ErrorSignal`]：分发引擎内部的结构化异常终止信号。任何一层（拦截器、处理函数、
//!   参数绑定、请求体读取）都可以通过返回 `Err(ErrorSignal)` 或 `panic_any(ErrorSignal)`
//!   中止当前请求。引擎在唯一的恢复点捕获它，并渲染为
//!   `{"Status": .., "Code": .., "Message": ..}` 形式的响应。
//!
//! `detail` 字段只写入日志，永远不会返回给客户端。

use std::{any::Any, fmt};

use log::{debug, error, info, warn};

/// 框架保留的子错误码（sub-code）。
///
/// 应用自定义的子错误码应避开 1000..1100 区间。
pub mod codes {
    /// 未指定子错误码
    pub const NONE: i32 = 0;
    /// 未携带结构化信号的 panic
    pub const UNHANDLED: i32 = 1000;
    /// 路由表中没有匹配的路径
    pub const PATH_NOT_FOUND: i32 = 1001;
    /// 缺少必需的 URL 参数
    pub const MISSING_URL_PARAMETER: i32 = 1002;
    /// URL 参数格式错误（例如无法解析为整数）
    pub const INVALID_PARAMETER: i32 = 1003;
    /// 静态资源不存在
    pub const STATIC_NOT_FOUND: i32 = 1004;
    /// 读取请求体失败
    pub const BODY_UNREADABLE: i32 = 1005;
    /// 请求体超过配置的上限
    pub const BODY_TOO_LARGE: i32 = 1006;
    /// 请求体不是合法的 JSON
    pub const INVALID_JSON: i32 = 1007;
    /// 请求路径非法（如目录遍历）
    pub const INVALID_PATH: i32 = 1008;
}

/// 服务器在进入分发引擎之前可能遇到的异常类型。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求头无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行不符合 `METHOD TARGET VERSION` 格式。
    MalformedRequestLine,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求头超过了允许的最大长度。
    RequestHeadTooLarge,
    /// 客户端在发送完整请求头之前关闭了连接。
    ConnectionClosed,
    /// 配置文件不存在或无法读取。
    ConfigUnreadable,
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request head can't be parsed in UTF-8"),
            MalformedRequestLine => write!(f, "Malformed request line"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            RequestHeadTooLarge => write!(f, "Request head too large"),
            ConnectionClosed => write!(f, "Connection closed before request head completed"),
            ConfigUnreadable => write!(f, "Config file can't be read"),
        }
    }
}

impl std::error::Error for Exception {}

/// 信号的严重程度，只决定日志级别，不影响响应的形态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// 结构化的异常终止信号。
///
/// 一旦产生，当前请求的应用代码不再继续执行，只有引擎的恢复点会处理它。
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSignal {
    severity: Severity,
    status: u16,
    code: i32,
    message: String,
    detail: String,
}

impl ErrorSignal {
    pub fn new(
        severity: Severity,
        status: u16,
        code: i32,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            status,
            code,
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// 以 panic 的方式抛出信号，适用于无法返回 `Result` 的深层调用。
    ///
    /// 引擎的恢复点会把载荷还原为原本的结构化信号。
    pub fn raise(self) -> ! {
        std::panic::panic_any(self)
    }

    pub fn route_not_found(method: &str, path: &str) -> Self {
        Self::new(
            Severity::Info,
            404,
            codes::PATH_NOT_FOUND,
            "path not found",
            format!("no route for {} {}", method, path),
        )
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(
            Severity::Info,
            400,
            codes::MISSING_URL_PARAMETER,
            format!("missing URL parameter: {}", name),
            format!("required parameter '{}' was not present", name),
        )
    }

    pub fn invalid_parameter(name: &str, value: &str) -> Self {
        Self::new(
            Severity::Info,
            400,
            codes::INVALID_PARAMETER,
            format!("invalid URL parameter: {}", name),
            format!("parameter '{}' has malformed value '{}'", name, value),
        )
    }

    pub fn static_not_found(path: &str) -> Self {
        Self::new(
            Severity::Info,
            404,
            codes::STATIC_NOT_FOUND,
            "static resource not found",
            format!("no file for {}", path),
        )
    }

    pub fn invalid_path(path: &str) -> Self {
        Self::new(
            Severity::Warn,
            400,
            codes::INVALID_PATH,
            "invalid path",
            format!("rejected path {}", path),
        )
    }

    pub fn body_unreadable(detail: impl Into<String>) -> Self {
        Self::new(
            Severity::Warn,
            400,
            codes::BODY_UNREADABLE,
            "request body unreadable",
            detail,
        )
    }

    pub fn body_too_large(length: u64, limit: u64) -> Self {
        Self::new(
            Severity::Warn,
            413,
            codes::BODY_TOO_LARGE,
            "request body too large",
            format!("content length {} exceeds limit {}", length, limit),
        )
    }

    pub fn invalid_json(detail: impl Into<String>) -> Self {
        Self::new(
            Severity::Info,
            400,
            codes::INVALID_JSON,
            "request body is not valid JSON",
            detail,
        )
    }

    /// 未携带结构化形态的失败（普通 panic、内部错误）。
    pub fn unhandled(status: u16, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, status, codes::UNHANDLED, "unhandled", detail)
    }

    /// 将 `catch_unwind` 得到的 panic 载荷转换为信号。
    ///
    /// 载荷本身是 `ErrorSignal` 时原样还原，其余情况一律视为 UNHANDLED，
    /// 状态码取 `panic_status`。
    pub fn from_panic(payload: Box<dyn Any + Send>, panic_status: u16) -> Self {
        match payload.downcast::<ErrorSignal>() {
            Ok(signal) => *signal,
            Err(payload) => Self::unhandled(panic_status, describe_panic(&*payload)),
        }
    }

    /// 按严重程度写日志。
    pub fn log(&self, id: u128) {
        match self.severity {
            Severity::Info => info!("[ID{}]{}", id, self),
            Severity::Warn => warn!("[ID{}]{}", id, self),
            Severity::Error => error!("[ID{}]{}", id, self),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

impl ErrorSignal {
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{}: {} ({})",
            self.severity, self.status, self.code, self.message, self.detail
        )
    }
}

impl std::error::Error for ErrorSignal {}

/// 把 panic 载荷描述为一行文本，`ErrorSignal` 载荷使用其 `Display`。
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(signal) = payload.downcast_ref::<ErrorSignal>() {
        signal.to_string()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 安装进程级 panic 钩子，panic 信息交给 `log` 输出，不再直接写到 stderr。
///
/// `ErrorSignal` 载荷由分发引擎的恢复点按严重程度记录，钩子只在 debug 级别留下抛出位置。
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |l| format!("{}:{}", l.file(), l.line()));
        let payload = info.payload();
        if payload.is::<ErrorSignal>() {
            debug!("{}处抛出了ErrorSignal：{}", location, describe_panic(payload));
        } else {
            let thread = std::thread::current();
            error!(
                "线程{}在{}处panic：{}",
                thread.name().unwrap_or("<unnamed>"),
                location,
                describe_panic(payload)
            );
        }
    }));
}
