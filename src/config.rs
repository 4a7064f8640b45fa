// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 配置模块
//!
//! 配置文件可以是 TOML 或 JSON，按扩展名选择解析器（`.json` 之外一律按 TOML 处理）。
//! 缺省的键使用默认值；文件内容无法解析时记录错误并整体回退到默认配置。

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use log::{error, warn};
use serde_derive::{Deserialize, Serialize};

use crate::{exception::Exception, response::RenderSettings, util::executable_name};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_cache_size")]
    cache_size: usize,
    #[serde(default = "executable_name")]
    server_name: String,
    #[serde(default = "default_charset")]
    charset: String,
    #[serde(default = "default_panic_status")]
    panic_status: u16,
    #[serde(default = "default_max_body_size")]
    max_body_size: u64,
    #[serde(default = "default_streaming_threshold")]
    streaming_threshold: u64,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_compress")]
    compress: bool,
    #[serde(default = "default_stop_delay_ms")]
    stop_delay_ms: u64,
    /// 精确路径 -> 重定向目标
    #[serde(default)]
    redirects: HashMap<String, String>,
}

fn default_www_root() -> String {
    ".".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_cache_size() -> usize {
    5
}

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_panic_status() -> u16 {
    500
}

fn default_max_body_size() -> u64 {
    10485760 // 10MB
}

fn default_streaming_threshold() -> u64 {
    10485760 // 10MB
}

fn default_chunk_size() -> usize {
    262144 // 256KB
}

fn default_compress() -> bool {
    true
}

fn default_stop_delay_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        let mut config = Self {
            www_root: default_www_root(),
            port: default_port(),
            local: default_local(),
            worker_threads: 0,
            cache_size: default_cache_size(),
            server_name: executable_name(),
            charset: default_charset(),
            panic_status: default_panic_status(),
            max_body_size: default_max_body_size(),
            streaming_threshold: default_streaming_threshold(),
            chunk_size: default_chunk_size(),
            compress: default_compress(),
            stop_delay_ms: default_stop_delay_ms(),
            redirects: HashMap::new(),
        };
        config.normalize();
        config
    }

    /// 从文件载入配置。文件无法读取时返回错误，内容无法解析时回退到默认配置。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Exception> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                error!("无法读取配置文件 {}：{}", path.display(), e);
                return Err(Exception::ConfigUnreadable);
            }
        };
        let is_json = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        Ok(Self::parse(&content, is_json))
    }

    /// 解析配置文本
    pub fn parse(content: &str, is_json: bool) -> Self {
        let parsed: Result<Config, String> = if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            toml::from_str(content).map_err(|e| e.to_string())
        };
        let mut config = match parsed {
            Ok(c) => c,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        config.normalize();
        config
    }

    fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为5。");
            self.cache_size = default_cache_size();
        }
        if self.chunk_size == 0 {
            warn!("chunk_size被设置为0，该值将被改为默认值。");
            self.chunk_size = default_chunk_size();
        }
        if !(100..=599).contains(&self.panic_status) {
            warn!(
                "panic_status {} 不是合法的HTTP状态码，该值将被改为500。",
                self.panic_status
            );
            self.panic_status = default_panic_status();
        }
    }

    /// 渲染阶段使用的共享设置
    pub fn render_settings(&self) -> Arc<RenderSettings> {
        Arc::new(RenderSettings {
            server_name: self.server_name.clone(),
            charset: self.charset.clone(),
            compress: self.compress,
            chunk_size: self.chunk_size,
        })
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn set_www_root(&mut self, root: &str) -> &mut Self {
        self.www_root = root.to_string();
        self
    }

    pub fn set_panic_status(&mut self, status: u16) -> &mut Self {
        self.panic_status = status;
        self
    }

    pub fn set_server_name(&mut self, name: &str) -> &mut Self {
        self.server_name = name.to_string();
        self
    }

    pub fn set_streaming_threshold(&mut self, threshold: u64) -> &mut Self {
        self.streaming_threshold = threshold;
        self
    }

    pub fn set_stop_delay_ms(&mut self, delay: u64) -> &mut Self {
        self.stop_delay_ms = delay;
        self
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn panic_status(&self) -> u16 {
        self.panic_status
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    pub fn streaming_threshold(&self) -> u64 {
        self.streaming_threshold
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn stop_delay_ms(&self) -> u64 {
        self.stop_delay_ms
    }

    pub fn redirects(&self) -> &HashMap<String, String> {
        &self.redirects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.port(), 7878);
        assert!(config.local());
        assert_eq!(config.panic_status(), 500);
        assert_eq!(config.charset(), "utf-8");
        assert!(config.worker_threads() > 0);
        assert!(!config.server_name().is_empty());
        assert!(config.redirects().is_empty());
    }

    #[test]
    fn test_parse_toml_with_partial_keys() {
        let config = Config::parse(
            r#"
            port = 9000
            worker_threads = 2
            server_name = "gateway"
            panic_status = 503

            [redirects]
            "/old" = "/new"
            "#,
            false,
        );
        assert_eq!(config.port(), 9000);
        assert_eq!(config.worker_threads(), 2);
        assert_eq!(config.server_name(), "gateway");
        assert_eq!(config.panic_status(), 503);
        assert_eq!(config.cache_size(), 5);
        assert_eq!(config.redirects().get("/old").unwrap(), "/new");
    }

    #[test]
    fn test_parse_json() {
        let config = Config::parse(r#"{"port": 8081, "charset": "", "compress": false}"#, true);
        assert_eq!(config.port(), 8081);
        assert_eq!(config.charset(), "");
        assert!(!config.compress());
    }

    #[test]
    fn test_invalid_content_falls_back_to_defaults() {
        let config = Config::parse("port = \"not a number\"", false);
        assert_eq!(config.port(), 7878);
    }

    #[test]
    fn test_zero_values_are_normalized() {
        let config = Config::parse("cache_size = 0\nchunk_size = 0\npanic_status = 42", false);
        assert_eq!(config.cache_size(), 5);
        assert_eq!(config.chunk_size(), 262144);
        assert_eq!(config.panic_status(), 500);
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(br#"{"port": 6000}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port(), 6000);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert_eq!(err, Exception::ConfigUnreadable);
    }

    #[test]
    fn test_render_settings() {
        let mut config = Config::new();
        config.set_server_name("edge");
        let settings = config.render_settings();
        assert_eq!(settings.server_name, "edge");
        assert_eq!(settings.charset, "utf-8");
    }
}
