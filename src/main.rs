// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 示例服务器
//!
//! 载入配置，注册几条演示路由，然后启动宿主循环与后台管理控制台：
//! - `GET /calc/?/div/?`：整数除法，演示参数绑定与结构化错误；
//! - `GET /status`、`GET /stop`：服务器状态与延迟停机；
//! - `GET /static/*`：静态文件。

use std::{process, sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
};

use webrouter::{
    exception::install_panic_hook,
    handlers::{status_handler, stop_handler, StaticFiles},
    Config, Engine, ErrorSignal, Request, Response, RouteError, Server, ServerStatus, Severity,
};

/// 演示用的子错误码
const DIVIDE_BY_ZERO: i32 = 1;

fn main() {
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
        process::exit(1);
    }
    install_panic_hook();

    let config = match Config::from_file("config/development.toml") {
        Ok(c) => c,
        Err(e) => {
            warn!("{}，使用默认配置", e);
            Config::new()
        }
    };
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    let engine = match build_engine(&config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!("注册路由失败：{}", e);
            process::exit(1);
        }
    };
    engine.log_routes();

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("无法创建运行时：{}", e);
            process::exit(1);
        }
    };

    runtime.block_on(async move {
        let server = match Server::bind(&config, Arc::clone(&engine)).await {
            Ok(s) => s,
            Err(e) => {
                error!("无法绑定端口：{}，错误：{}", config.port(), e);
                return;
            }
        };
        tokio::spawn(console(Arc::clone(engine.status())));
        server.run().await;
    });
    // 控制台仍阻塞在标准输入上，不等待它结束
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("服务器已停止");
}

fn build_engine(config: &Config) -> Result<Engine, RouteError> {
    let mut engine = Engine::new(config);
    let status = Arc::clone(engine.status());

    engine.route("/calc/?/div/?", "GET", &["a", "b"], divide)?;
    engine.register("/status", "GET", status_handler(Arc::clone(&status)), &[])?;
    engine.register(
        "/stop",
        "GET",
        stop_handler(status, Duration::from_millis(config.stop_delay_ms())),
        &[],
    )?;
    engine.register("/static/*", "GET", StaticFiles::from_config(config, "/static"), &[])?;

    engine.add_before(|request, _| {
        if request.path().contains("/.") {
            warn!("[ID{}]拒绝访问隐藏路径：{}", request.id(), request.path());
            return Err(ErrorSignal::invalid_path(request.path()));
        }
        Ok(())
    });
    Ok(engine)
}

fn divide(request: &mut Request, response: &mut Response) -> Result<(), ErrorSignal> {
    let a = request.named_part_int("a", 0)?;
    let b = request.named_part_int("b", 0)?;
    if b == 0 {
        return Err(ErrorSignal::new(
            Severity::Info,
            400,
            DIVIDE_BY_ZERO,
            "division by zero",
            format!("{} / 0", a),
        ));
    }
    response.set_json_value(serde_json::json!({ "a": a, "b": b, "result": a / b }));
    Ok(())
}

/// 后台管理控制台
async fn console(status: Arc<ServerStatus>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器即将关闭...");
                status.request_shutdown();
                break;
            }
            "status" => {
                let snapshot = status.snapshot();
                println!("== Webserver 状态 ===");
                println!("启动时间: {}", snapshot.started);
                println!("已处理请求数: {}", snapshot.requests);
                println!("异常终止数: {}", snapshot.panics);
                println!("当前活跃连接数: {}", snapshot.active_connections);
                println!("====================");
            }
            "help" => {
                println!("== Webserver Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}
