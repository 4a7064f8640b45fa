// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 静态文件内容的 LRU 缓存，以文件修改时间判断缓存是否仍然有效。

use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::SystemTime,
};

use bytes::Bytes;
use log::{debug, warn};
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

pub struct FileCache {
    cache: LruCache<PathBuf, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl FileCache {
    /// 根据容量构造，容量为 0 时按 1 处理。
    pub fn from_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("文件缓存容量被设置为0，将改为1");
        }
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn push(&mut self, path: &Path, bytes: Bytes, modified_time: SystemTime) {
        let entry = CacheEntry {
            content: bytes,
            modified_time,
        };
        self.cache.put(path.to_path_buf(), entry);
    }

    /// 文件大小是否适合放入缓存
    pub fn should_cache(file_size: u64, threshold: u64) -> bool {
        file_size <= threshold
    }

    /// 查询有效缓存。修改时间不一致的条目会被移除。
    pub fn find(&mut self, path: &Path, current_modified_time: SystemTime) -> Option<Bytes> {
        let stale = match self.cache.get(path) {
            Some(entry) if entry.modified_time == current_modified_time => {
                self.hits += 1;
                return Some(entry.content.clone());
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            debug!("缓存条目已过期：{}", path.display());
            self.cache.pop(path);
        }
        self.misses += 1;
        None
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// (命中次数, 未命中次数)
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
