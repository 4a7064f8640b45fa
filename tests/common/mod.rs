// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#![allow(dead_code)]

use webrouter::{Config, Engine, MemorySink, Request, Response};

/// 解析响应报文：(状态码, 标头, 响应体)
pub fn parse_response(response: &str) -> (u16, Vec<(String, String)>, String) {
    let (head, body) = match response.split_once("\r\n\r\n") {
        Some((head, body)) => (head, body),
        None => (response, ""),
    };
    let mut lines = head.split("\r\n");

    // 解析状态行
    let status_code = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|c| c.parse::<u16>().ok())
        .unwrap_or(0);

    // 解析头部
    let headers = lines
        .filter_map(|l| l.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    (status_code, headers, body.to_string())
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub fn engine() -> Engine {
    let mut config = Config::new();
    config.set_server_name("webrouter-test");
    Engine::new(&config)
}

/// 把请求交给引擎，返回 (响应状态, 解析后的报文)
pub fn send(engine: &Engine, request: Request) -> (Response, (u16, Vec<(String, String)>, String)) {
    let sink = MemorySink::new();
    let response = engine.serve(request, Box::new(sink.clone()));
    let parsed = parse_response(&sink.as_string());
    (response, parsed)
}

pub fn get(engine: &Engine, path: &str) -> (Response, (u16, Vec<(String, String)>, String)) {
    send(engine, Request::new("GET", path))
}
