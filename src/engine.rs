// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 分发引擎
//!
//! 一个请求在引擎中的完整流程：
//!
//! 1. 按精确路径查重定向表，命中则直接返回重定向；
//! 2. 依次执行前置拦截器，第一个把响应置为错误状态的拦截器否决本次请求；
//! 3. 按路径与方法匹配路由，找不到时产生 404 / PATH_NOT_FOUND 信号；
//! 4. 绑定 URL 参数并调用处理函数；
//! 5. 响应不是错误时依次执行后置拦截器，同样是第一个否决者生效；
//! 6. 响应已被处理函数关闭（直接写出）时不再渲染，否则按错误或正常路径渲染。
//!
//! 整个流程包裹在唯一的恢复点中。无论信号来自 `Err` 返回值还是 panic，
//! 恢复点都会覆盖此前的一切结果：计数、按严重程度记录日志，并在传输层尚未关闭时
//! 渲染错误响应。

use std::{
    collections::HashMap,
    io::Write,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use log::{debug, error, info, warn};
use serde_derive::Serialize;

use crate::{
    config::Config,
    exception::ErrorSignal,
    param::DEFAULT_MIME,
    request::Request,
    response::{Payload, RenderSettings, Response},
    router::{Handler, RouteError, Router},
    status::ServerStatus,
};

/// 前置或后置拦截器。把响应置为错误状态（>= 400）即为否决。
pub type Interceptor =
    Box<dyn Fn(&mut Request, &mut Response) -> Result<(), ErrorSignal> + Send + Sync>;

/// 把响应状态渲染为响应体。渲染器可以顺带修改内容类型与标头。
pub type Renderer =
    Box<dyn Fn(&Request, &mut Response) -> Result<Vec<u8>, ErrorSignal> + Send + Sync>;

/// 重定向的默认状态码（302 Found）
pub const DEFAULT_REDIRECT_STATUS: u16 = 302;

/// 错误响应在线路上的形态
#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "Status")]
    status: u16,
    #[serde(rename = "Code")]
    code: i32,
    #[serde(rename = "Message")]
    message: &'a str,
}

pub struct Engine {
    router: Router,
    before: Vec<Interceptor>,
    after: Vec<Interceptor>,
    redirects: HashMap<String, (String, u16)>,
    error_renderer: Option<Renderer>,
    default_renderer: Option<Renderer>,
    settings: Arc<RenderSettings>,
    panic_status: u16,
    status: Arc<ServerStatus>,
}

impl Engine {
    pub fn new(config: &Config) -> Self {
        Self::with_status(config, ServerStatus::shared())
    }

    /// 使用外部传入的状态对象构造，便于与服务器循环共享计数。
    pub fn with_status(config: &Config, status: Arc<ServerStatus>) -> Self {
        let mut engine = Self {
            router: Router::new(),
            before: Vec::new(),
            after: Vec::new(),
            redirects: HashMap::new(),
            error_renderer: None,
            default_renderer: None,
            settings: config.render_settings(),
            panic_status: config.panic_status(),
            status,
        };
        for (from, to) in config.redirects() {
            engine.add_redirect(from, to);
        }
        engine
    }

    /// 注册处理函数。`params` 依次为模式中每个 `?` 命名。
    pub fn register<H>(
        &mut self,
        pattern: &str,
        method: &str,
        handler: H,
        params: &[&str],
    ) -> Result<(), RouteError>
    where
        H: Handler + 'static,
    {
        self.router
            .register(pattern, method, Arc::new(handler), params)
    }

    /// 以闭包注册处理函数，闭包的参数类型由签名推断。
    pub fn route<F>(
        &mut self,
        pattern: &str,
        method: &str,
        params: &[&str],
        f: F,
    ) -> Result<(), RouteError>
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), ErrorSignal> + Send + Sync + 'static,
    {
        self.register(pattern, method, f, params)
    }

    pub fn add_before<F>(&mut self, interceptor: F)
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), ErrorSignal> + Send + Sync + 'static,
    {
        self.before.push(Box::new(interceptor));
    }

    pub fn add_after<F>(&mut self, interceptor: F)
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), ErrorSignal> + Send + Sync + 'static,
    {
        self.after.push(Box::new(interceptor));
    }

    /// 替换错误响应的渲染方式。渲染器失败时回退到内置的 JSON 形态。
    pub fn set_error_renderer<F>(&mut self, renderer: F)
    where
        F: Fn(&Request, &mut Response) -> Result<Vec<u8>, ErrorSignal> + Send + Sync + 'static,
    {
        self.error_renderer = Some(Box::new(renderer));
    }

    /// 替换正常响应的渲染方式
    pub fn set_default_renderer<F>(&mut self, renderer: F)
    where
        F: Fn(&Request, &mut Response) -> Result<Vec<u8>, ErrorSignal> + Send + Sync + 'static,
    {
        self.default_renderer = Some(Box::new(renderer));
    }

    pub fn add_redirect(&mut self, from: &str, to: &str) {
        self.add_redirect_with_status(from, to, DEFAULT_REDIRECT_STATUS);
    }

    pub fn add_redirect_with_status(&mut self, from: &str, to: &str, status: u16) {
        if self
            .redirects
            .insert(from.to_string(), (to.to_string(), status))
            .is_some()
        {
            warn!("重定向 {} 被重复注册，以最后一次为准", from);
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn status(&self) -> &Arc<ServerStatus> {
        &self.status
    }

    pub fn settings(&self) -> &Arc<RenderSettings> {
        &self.settings
    }

    pub fn panic_status(&self) -> u16 {
        self.panic_status
    }

    /// 在日志中列出路由表
    pub fn log_routes(&self) {
        info!("已注册{}条路由", self.router.len());
        for (method, pattern) in self.router.routes() {
            info!("  {:<7} {}", method, pattern);
        }
        for (from, (to, status)) in &self.redirects {
            info!("  {} {} -> {}", status, from, to);
        }
    }
}

// --- 分发 ---

impl Engine {
    /// 处理一个请求，并把响应写入 `out`。返回最终的响应状态以供检查。
    pub fn serve(&self, mut request: Request, out: Box<dyn Write + Send>) -> Response {
        let start_time = Instant::now();
        let id = request.id();
        let mut response = Response::for_request(&request, out, Arc::clone(&self.settings));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatch(&mut request, &mut response)
        }));
        let signal = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(signal)) => Some(signal),
            Err(payload) => Some(ErrorSignal::from_panic(payload, self.panic_status)),
        };
        if let Some(signal) = signal {
            self.recover(&request, &mut response, signal);
        }

        self.status.record_request();
        info!(
            "[ID{}] {}, {}, {}, {}, {}, {}ms",
            id,
            request.version(),
            request.method(),
            request.path(),
            response.status_code(),
            response.sub_code(),
            start_time.elapsed().as_millis()
        );
        response
    }

    fn dispatch(&self, request: &mut Request, response: &mut Response) -> Result<(), ErrorSignal> {
        if let Some((target, status)) = self.redirects.get(request.path()) {
            debug!("[ID{}]重定向 {} -> {}", request.id(), request.path(), target);
            response.redirect(target, *status);
            return self.render(request, response);
        }

        for interceptor in &self.before {
            interceptor(request, response)?;
            if response.is_error() {
                debug!(
                    "[ID{}]前置拦截器否决了请求，状态码{}",
                    request.id(),
                    response.status_code()
                );
                return self.render(request, response);
            }
        }

        let route = self
            .router
            .find(request.path(), request.method())
            .or_else(|| {
                // HEAD 请求没有专门的路由时按 GET 处理，渲染阶段不写出响应体
                if request.is_head() {
                    self.router.find(request.path(), "GET")
                } else {
                    None
                }
            })
            .ok_or_else(|| ErrorSignal::route_not_found(request.method(), request.path()))?;
        debug!(
            "[ID{}]匹配到路由 {} {}",
            request.id(),
            route.method(),
            route.pattern()
        );
        request.bind(route.params());
        route.handler().handle(request, response)?;

        if !response.is_error() {
            for interceptor in &self.after {
                interceptor(request, response)?;
                if response.is_error() {
                    debug!(
                        "[ID{}]后置拦截器否决了请求，状态码{}",
                        request.id(),
                        response.status_code()
                    );
                    break;
                }
            }
        }

        self.render(request, response)
    }

    fn render(&self, request: &Request, response: &mut Response) -> Result<(), ErrorSignal> {
        if response.is_closed() {
            debug!("[ID{}]响应已由处理函数写出", request.id());
            return Ok(());
        }
        let body = if response.is_error() {
            match &self.error_renderer {
                Some(renderer) => renderer(request, response)?,
                None => render_error(response),
            }
        } else {
            match &self.default_renderer {
                Some(renderer) => renderer(request, response)?,
                None => render_payload(response)?,
            }
        };
        self.send(response, body);
        Ok(())
    }

    /// 唯一的恢复点
    fn recover(&self, request: &Request, response: &mut Response, signal: ErrorSignal) {
        self.status.record_panic();
        signal.log(request.id());
        if response.is_closed() {
            warn!(
                "[ID{}]响应已写出，无法再返回错误信息：{}",
                request.id(),
                signal.message()
            );
            return;
        }
        response.reset_for_signal(&signal);

        let body = match &self.error_renderer {
            Some(renderer) => {
                match panic::catch_unwind(AssertUnwindSafe(|| renderer(request, response))) {
                    Ok(Ok(body)) => body,
                    _ => {
                        error!("[ID{}]自定义错误渲染失败，使用内置格式", request.id());
                        response.reset_for_signal(&signal);
                        render_error(response)
                    }
                }
            }
            None => render_error(response),
        };
        self.send(response, body);
    }

    fn send(&self, response: &mut Response, body: Vec<u8>) {
        if let Err(e) = response.send(body) {
            error!("[ID{}]写出响应失败: {}", response.id(), e);
        }
    }
}

/// 内置的错误渲染：`{"Status": .., "Code": .., "Message": ..}`
fn render_error(response: &mut Response) -> Vec<u8> {
    let body = ErrorBody {
        status: response.status_code(),
        code: response.sub_code(),
        message: response.message(),
    };
    // 只含基本类型的结构体，序列化不会失败
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    response.set_content_type("application/json");
    bytes
}

/// 内置的正常渲染：按负载类型输出，内容类型未设置时补上默认值。
fn render_payload(response: &mut Response) -> Result<Vec<u8>, ErrorSignal> {
    let (bytes, default_type) = match response.payload() {
        Payload::Empty => (Vec::new(), None),
        Payload::Text(text) => (text.clone().into_bytes(), Some("text/plain")),
        Payload::Bytes(bytes) => (bytes.to_vec(), Some(DEFAULT_MIME)),
        Payload::Json(value) => (
            serde_json::to_vec(value)
                .map_err(|e| ErrorSignal::unhandled(500, format!("json render failed: {}", e)))?,
            Some("application/json"),
        ),
    };
    if let Some(content_type) = default_type {
        if response.content_type().is_empty() {
            response.set_content_type(content_type);
        }
    }
    Ok(bytes)
}
