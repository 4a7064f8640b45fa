// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 宿主循环
//!
//! 一个最小的 HTTP/1.1 服务器：tokio 负责接受连接，每个连接转换为阻塞的
//! `std::net::TcpStream` 后交给 `spawn_blocking`，在专属线程上同步地解析请求、
//! 调用分发引擎并写出响应。每个连接只处理一个请求（`Connection: close`）。

use std::{
    io::{self, BufReader, Read},
    net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream},
    sync::Arc,
    time::Duration,
};

use log::{debug, error, info, warn};
use tokio::net::TcpListener;

use crate::{config::Config, engine::Engine, exception::Exception, request::Request, response::Response};

/// 响应发出后等待客户端发完剩余数据的时间
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
    max_body_size: u64,
}

impl Server {
    /// 按配置绑定地址：`local` 为真时只监听回环地址。
    pub async fn bind(config: &Config, engine: Arc<Engine>) -> io::Result<Self> {
        let address = match config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        let socket = SocketAddrV4::new(address, config.port());
        let listener = TcpListener::bind(socket).await?;
        info!("服务端将在{}上监听Socket连接", listener.local_addr()?);
        Ok(Self {
            listener,
            engine,
            max_body_size: config.max_body_size(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// 接受连接直到收到停机信号
    pub async fn run(self) {
        let status = Arc::clone(self.engine.status());
        let mut id: u128 = 0;
        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = status.wait_for_shutdown() => {
                    info!("主循环接收到停机指令，正在退出...");
                    break;
                }
            };
            let (stream, addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("接受连接失败: {}", e);
                    continue;
                }
            };
            debug!("[ID{}]TCP连接已建立：{}", id, addr);

            let stream = match stream.into_std().and_then(|s| {
                s.set_nonblocking(false)?;
                Ok(s)
            }) {
                Ok(s) => s,
                Err(e) => {
                    error!("[ID{}]无法转换连接：{}", id, e);
                    continue;
                }
            };

            let engine = Arc::clone(&self.engine);
            let max_body_size = self.max_body_size;
            let task_id = id;
            tokio::spawn(async move {
                let result = tokio::task::spawn_blocking(move || {
                    handle_connection(stream, task_id, &engine, max_body_size)
                })
                .await;
                if let Err(e) = result {
                    error!("[ID{}]连接处理线程异常退出: {}", task_id, e);
                }
            });
            id += 1;
        }
    }
}

/// 处理单个连接上的一个请求
fn handle_connection(stream: TcpStream, id: u128, engine: &Engine, max_body_size: u64) {
    let status = engine.status();
    status.connection_opened();

    let (writer, control) = match stream.try_clone().and_then(|w| Ok((w, stream.try_clone()?))) {
        Ok(pair) => pair,
        Err(e) => {
            error!("[ID{}]无法复制TCPStream: {}", id, e);
            status.connection_closed();
            return;
        }
    };

    match Request::read_from(BufReader::new(stream), id) {
        Ok(request) => {
            let request = request.with_max_body_size(max_body_size);
            engine.serve(request, Box::new(writer));
        }
        Err(Exception::ConnectionClosed) => {
            debug!("[ID{}]客户端在发送请求前关闭了连接", id);
        }
        Err(e) => {
            warn!("[ID{}]请求无法解析：{}，返回400", id, e);
            let mut response = Response::new(Box::new(writer), Arc::clone(engine.settings()));
            response.set_status(400).set_content_type("text/plain");
            if let Err(e) = response.send(b"Bad Request".to_vec()) {
                error!("[ID{}]发送响应失败: {}", id, e);
            }
        }
    }
    drain(&control, id, max_body_size);
    status.connection_closed();
}

/// 关闭写方向后读掉客户端尚未被消费的数据。
///
/// 接收缓冲区里残留数据时关闭套接字，内核会发送 RST，客户端可能因此读不到完整的响应。
/// 最多丢弃 `limit` 字节，等待时间受 `DRAIN_TIMEOUT` 限制。
fn drain(stream: &TcpStream, id: u128, limit: u64) {
    if let Err(e) = stream.shutdown(Shutdown::Write) {
        debug!("[ID{}]关闭写方向失败: {}", id, e);
        return;
    }
    if let Err(e) = stream.set_read_timeout(Some(DRAIN_TIMEOUT)) {
        debug!("[ID{}]无法设置读取超时: {}", id, e);
        return;
    }
    match io::copy(&mut Read::take(stream, limit), &mut io::sink()) {
        Ok(0) => {}
        Ok(n) => debug!("[ID{}]丢弃了{}字节未读取的请求数据", id, n),
        Err(e) => debug!("[ID{}]丢弃剩余请求数据时中断: {}", id, e),
    }
}
