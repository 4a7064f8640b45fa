// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器状态
//!
//! 进程范围内共享的计数器与停机标志。所有字段都是原子量，可以在任意线程中更新。

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use log::info;
use serde_derive::Serialize;
use tokio::sync::Notify;

use crate::util::format_date;

#[derive(Debug)]
pub struct ServerStatus {
    started: DateTime<Utc>,
    requests: AtomicU64,
    panics: AtomicU64,
    active_connections: AtomicU64,
    shutdown: AtomicBool,
    notify: Notify,
}

/// 某一时刻的状态快照，用于状态接口与控制台输出。
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSnapshot {
    pub started: String,
    pub uptime_secs: i64,
    pub requests: u64,
    pub panics: u64,
    pub active_connections: u64,
    pub shutting_down: bool,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStatus {
    pub fn new() -> Self {
        Self {
            started: Utc::now(),
            requests: AtomicU64::new(0),
            panics: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn record_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_panic(&self) -> u64 {
        self.panics.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        // 防止计数下溢
        let _ = self
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// 发出停机信号，唤醒所有等待者。重复调用无副作用。
    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            info!("停机信号已发出");
        }
        self.notify.notify_waiters();
    }

    /// 等待停机信号
    pub async fn wait_for_shutdown(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutting_down() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            started: format_date(&self.started),
            uptime_secs: (Utc::now() - self.started).num_seconds(),
            requests: self.requests(),
            panics: self.panics(),
            active_connections: self.active_connections(),
            shutting_down: self.is_shutting_down(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_counters() {
        let status = ServerStatus::new();
        assert_eq!(status.record_request(), 1);
        assert_eq!(status.record_request(), 2);
        assert_eq!(status.record_panic(), 1);

        status.connection_opened();
        status.connection_opened();
        status.connection_closed();
        assert_eq!(status.active_connections(), 1);

        let snapshot = status.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.panics, 1);
        assert!(!snapshot.shutting_down);
    }

    #[test]
    fn test_connection_counter_does_not_underflow() {
        let status = ServerStatus::new();
        status.connection_closed();
        assert_eq!(status.active_connections(), 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let status = ServerStatus::new();
        let json = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(json["requests"], 0);
        assert_eq!(json["shutting_down"], false);
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let status = ServerStatus::shared();
        let waiter = {
            let status = Arc::clone(&status);
            tokio::spawn(async move { status.wait_for_shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        status.request_shutdown();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(status.is_shutting_down());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let status = ServerStatus::new();
        status.request_shutdown();
        tokio::time::timeout(Duration::from_millis(100), status.wait_for_shutdown())
            .await
            .unwrap();
    }
}
