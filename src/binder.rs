// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # URL 参数绑定
//!
//! 把匹配到的路由在注册时记录的 `(参数名, 段下标)` 与请求路径的各段对应起来。
//! 下标来自注册阶段而不是匹配阶段：同一深度上字面量段与 `?` 段属于不同的路由，
//! 参数名也不同。
//!
//! 所有查询都接受一个默认值。默认值为空字符串表示"必需参数"，
//! 缺失时返回 MISSING_URL_PARAMETER（400）；需要真正可选的参数时，
//! 调用方必须传入非空的占位默认值。

use crate::exception::ErrorSignal;

#[derive(Debug, Clone, Default)]
pub struct PathParams {
    names: Vec<(String, usize)>,
    segments: Vec<String>,
}

impl PathParams {
    pub fn new(names: &[(String, usize)], segments: Vec<String>) -> Self {
        Self {
            names: names.to_vec(),
            segments,
        }
    }

    /// 按参数名取值。
    pub fn named(&self, name: &str, default: &str) -> Result<String, ErrorSignal> {
        let value = self
            .names
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, position)| self.segments.get(*position));
        resolve(value, name, default)
    }

    /// 按路径段下标取值（从 0 开始，包含字面量段）。
    pub fn positional(&self, index: usize, default: &str) -> Result<String, ErrorSignal> {
        resolve(self.segments.get(index), &format!("#{}", index), default)
    }

    /// 按参数名取整数值。参数缺失时返回 `default`，格式错误时返回 400。
    pub fn named_int(&self, name: &str, default: i64) -> Result<i64, ErrorSignal> {
        let value = self
            .names
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, position)| self.segments.get(*position));
        match value {
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| ErrorSignal::invalid_parameter(name, v)),
            None => Ok(default),
        }
    }

    /// 已绑定的参数名
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|(n, _)| n.as_str())
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

fn resolve(value: Option<&String>, name: &str, default: &str) -> Result<String, ErrorSignal> {
    match value {
        Some(v) => Ok(v.clone()),
        None if default.is_empty() => Err(ErrorSignal::missing_parameter(name)),
        None => Ok(default.to_string()),
    }
}
