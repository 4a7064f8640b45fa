// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::{env, path::Path};

use chrono::{DateTime, Utc};

use crate::param::SERVER_NAME;

/// 按 `/` 切分路径并丢弃空段，首尾或重复的斜杠因此不影响结果。
///
/// 注册与匹配使用同一个函数，保证两端的归一化规则一致。
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// 当前进程的可执行文件名，用作默认的 `Server` 响应头。
pub fn executable_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|p| {
            Path::new(&p)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| SERVER_NAME.to_string())
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}
