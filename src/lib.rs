// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # webrouter
//!
//! 可嵌入的 HTTP 路由与分发引擎：基于路径段前缀树的路由（支持 `?` 与 `*` 通配符）、
//! 前置/后置拦截器链，以及保证只被捕获并渲染一次的结构化错误信号。

pub mod binder;
pub mod cache;
pub mod config;
pub mod engine;
pub mod exception;
pub mod handlers;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod status;
pub mod util;

pub use binder::PathParams;
pub use cache::FileCache;
pub use config::Config;
pub use engine::{Engine, Interceptor, Renderer};
pub use exception::{codes, ErrorSignal, Exception, Severity};
pub use handlers::{status_handler, stop_handler, StaticFiles};
pub use param::{HttpEncoding, HttpVersion};
pub use request::Request;
pub use response::{MemorySink, Payload, RenderSettings, Response};
pub use router::{Handler, RouteError, Router};
pub use server::Server;
pub use status::{ServerStatus, StatusSnapshot};
