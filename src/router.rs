// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由模块
//!
//! 以路径段为键的前缀树（segment trie）。注册路径中的每一段可以是：
//! - 字面量：必须与请求路径中的对应段完全相等；
//! - `?`：匹配恰好一段，并按注册时给出的参数名绑定；
//! - `*`：必须是最后一段，匹配剩余的任意多段（包括零段），不绑定参数名。
//!
//! 匹配时每一层依次尝试字面量、`?`、`*`，选中第一个可用的子节点后不再回溯。
//! 因此注册顺序无关，但字面量分支会遮蔽同层的 `?` 分支：
//! 注册了 `/x/?/y` 与 `/x/lit/z` 时，`/x/lit/y` 匹配失败。
//!
//! 查找的复杂度只与请求路径的段数有关，与已注册的路由数量无关。

use std::{collections::HashMap, fmt, sync::Arc};

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::{exception::ErrorSignal, request::Request, response::Response, util::split_segments};

/// 单段通配符
pub const WILDCARD_ONE: &str = "?";
/// 后缀通配符
pub const WILDCARD_ALL: &str = "*";

lazy_static! {
    static ref PARAM_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// 请求处理函数。
///
/// 处理函数通过修改 `response` 产生结果，返回 `Err` 即中止当前请求。
/// 任何满足签名的闭包都自动实现该 trait。
pub trait Handler: Send + Sync {
    fn handle(&self, request: &mut Request, response: &mut Response) -> Result<(), ErrorSignal>;
}

impl<F> Handler for F
where
    F: Fn(&mut Request, &mut Response) -> Result<(), ErrorSignal> + Send + Sync,
{
    fn handle(&self, request: &mut Request, response: &mut Response) -> Result<(), ErrorSignal> {
        self(request, response)
    }
}

/// 注册路由时可能出现的错误，全部发生在启动阶段。
#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    /// 注册路径的第一段是 `*`
    WildcardAtRoot(String),
    /// 方法名为空
    EmptyMethod(String),
    /// 参数名数量与 `?` 的数量不一致
    ParameterCountMismatch {
        pattern: String,
        wildcards: usize,
        names: usize,
    },
    /// 参数名不是合法标识符
    InvalidParameterName(String),
    /// 同一路径与方法已经注册过
    DuplicateRoute { method: String, pattern: String },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::WildcardAtRoot(p) => {
                write!(f, "pattern {} must not start with a wildcard", p)
            }
            RouteError::EmptyMethod(p) => write!(f, "pattern {} registered without a method", p),
            RouteError::ParameterCountMismatch {
                pattern,
                wildcards,
                names,
            } => write!(
                f,
                "pattern {} has {} '?' segments but {} parameter names",
                pattern, wildcards, names
            ),
            RouteError::InvalidParameterName(n) => write!(f, "invalid parameter name '{}'", n),
            RouteError::DuplicateRoute { method, pattern } => {
                write!(f, "route {} {} is already registered", method, pattern)
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// 一条已注册的路由，创建后不可变。
pub struct Route {
    pattern: String,
    method: String,
    /// 参数名及其绑定的路径段下标
    params: Vec<(String, usize)>,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[(String, usize)] {
        &self.params
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("method", &self.method)
            .field("params", &self.params)
            .finish()
    }
}

/// 前缀树节点。对某个方法而言，节点是终结节点当且仅当 `routes` 中有该方法。
#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    routes: HashMap<String, Route>,
}

impl Node {
    fn collect(&self, out: &mut Vec<(String, String)>) {
        for route in self.routes.values() {
            out.push((route.method.clone(), route.pattern.clone()));
        }
        for child in self.children.values() {
            child.collect(out);
        }
    }
}

/// 路径前缀树。
///
/// 启动阶段通过 `&mut self` 注册，之后放进 `Arc` 只读共享，匹配时不需要加锁。
#[derive(Default)]
pub struct Router {
    root: Node,
    count: usize,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条路由。
    ///
    /// `*` 之后的段会被忽略。`param_names` 按顺序对应 `?` 段，数量必须一致。
    pub fn register(
        &mut self,
        pattern: &str,
        method: &str,
        handler: Arc<dyn Handler>,
        param_names: &[&str],
    ) -> Result<(), RouteError> {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err(RouteError::EmptyMethod(pattern.to_string()));
        }

        let segments = split_segments(pattern);
        if segments.first() == Some(&WILDCARD_ALL) {
            return Err(RouteError::WildcardAtRoot(pattern.to_string()));
        }
        let effective = match segments.iter().position(|s| *s == WILDCARD_ALL) {
            Some(index) => {
                if index + 1 < segments.len() {
                    warn!(
                        "路由{}中'*'之后的{}个路径段将被忽略",
                        pattern,
                        segments.len() - index - 1
                    );
                }
                &segments[..=index]
            }
            None => &segments[..],
        };

        let positions: Vec<usize> = effective
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == WILDCARD_ONE)
            .map(|(i, _)| i)
            .collect();
        if positions.len() != param_names.len() {
            return Err(RouteError::ParameterCountMismatch {
                pattern: pattern.to_string(),
                wildcards: positions.len(),
                names: param_names.len(),
            });
        }
        if let Some(bad) = param_names.iter().find(|n| !PARAM_NAME.is_match(n)) {
            return Err(RouteError::InvalidParameterName(bad.to_string()));
        }

        let mut node = &mut self.root;
        for segment in effective {
            node = node.children.entry(segment.to_string()).or_default();
        }
        if node.routes.contains_key(&method) {
            return Err(RouteError::DuplicateRoute {
                method,
                pattern: pattern.to_string(),
            });
        }

        let params = param_names
            .iter()
            .map(|n| n.to_string())
            .zip(positions)
            .collect();
        debug!("注册路由：{} {}", method, pattern);
        node.routes.insert(
            method.clone(),
            Route {
                pattern: pattern.to_string(),
                method,
                params,
                handler,
            },
        );
        self.count += 1;
        Ok(())
    }

    /// 按路径与方法查找路由，方法比较大小写不敏感。
    pub fn find(&self, path: &str, method: &str) -> Option<&Route> {
        let method = method.to_ascii_uppercase();
        let mut node = &self.root;
        for segment in split_segments(path) {
            let literal = if segment == WILDCARD_ONE || segment == WILDCARD_ALL {
                None
            } else {
                node.children.get(segment)
            };
            if let Some(child) = literal {
                node = child;
            } else if let Some(child) = node.children.get(WILDCARD_ONE) {
                node = child;
            } else if let Some(child) = node.children.get(WILDCARD_ALL) {
                // '*' 立即终结，吞掉剩余的所有段
                return child.routes.get(&method);
            } else {
                return None;
            }
        }
        node.routes.get(&method).or_else(|| {
            node.children
                .get(WILDCARD_ALL)
                .and_then(|child| child.routes.get(&method))
        })
    }

    /// 已注册的路由数量
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 所有路由的 `(方法, 路径)`，按路径排序，用于启动日志。
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.count);
        self.root.collect(&mut out);
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("routes", &self.routes()).finish()
    }
}
