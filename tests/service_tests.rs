//! Service 集成测试（Unix Socket + Client）

#[cfg(all(feature = "service", feature = "client"))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use info_collector::client::{connect, ClientConfig};
    use info_collector::protocol::{Push, Request, Response, CODE_BAD_REQUEST, CODE_UNKNOWN_COMMAND};
    use info_collector::service::{Service, ServiceConfig};
    use info_collector::{
        Agent, AgentRegistry, CollectedItem, CollectionError, CollectorConfig, EventType, Trigger,
    };
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};

    struct Headlines;

    #[async_trait]
    impl Agent for Headlines {
        fn name(&self) -> &str {
            "News"
        }

        async fn collect(&self) -> Result<Vec<CollectedItem>, CollectionError> {
            let item = json!({"title": "A"}).as_object().cloned().unwrap();
            Ok(vec![item])
        }
    }

    struct Throttled;

    #[async_trait]
    impl Agent for Throttled {
        fn name(&self) -> &str {
            "Market"
        }

        async fn collect(&self) -> Result<Vec<CollectedItem>, CollectionError> {
            Err(CollectionError::RateLimited)
        }
    }

    /// 在临时目录创建 Service（关闭启动采集，定时器间隔足够长）
    fn build_service() -> (TempDir, ServiceConfig, Arc<Service>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            data_dir: temp_dir.path().to_path_buf(),
            collector: CollectorConfig {
                interval: Duration::from_secs(3600),
                collect_on_start: false,
                ..Default::default()
            },
        };

        let registry = AgentRegistry::new()
            .with(Arc::new(Headlines))
            .unwrap()
            .with(Arc::new(Throttled))
            .unwrap();
        let service = Arc::new(Service::new(config.clone(), registry).unwrap());
        (temp_dir, config, service)
    }

    /// 启动 Unix Socket 服务并等待 socket 就绪
    async fn start_service() -> (TempDir, ServiceConfig, JoinHandle<()>) {
        let (temp_dir, config, service) = build_service();
        let handle = tokio::spawn(async move {
            let _ = service.run().await;
        });

        for _ in 0..50 {
            if config.socket_path().exists() {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        (temp_dir, config, handle)
    }

    fn client_config(config: &ServiceConfig) -> ClientConfig {
        ClientConfig::new("service-tests").with_data_dir(config.data_dir.clone())
    }

    #[tokio::test]
    async fn test_handshake_over_raw_socket() {
        let (_dir, config, handle) = start_service().await;

        let stream = UnixStream::connect(config.socket_path()).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let handshake = Request::Handshake {
            component: "test".to_string(),
            version: "1.0.0".to_string(),
        };
        let line = format!("{}\n", serde_json::to_string(&handshake).unwrap());
        writer.write_all(line.as_bytes()).await.unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        match serde_json::from_str::<Response>(&line).unwrap() {
            Response::HandshakeOk { service_version } => assert!(!service_version.is_empty()),
            other => panic!("Expected HandshakeOk, got {:?}", other),
        }

        // 非法 JSON
        writer.write_all(b"not json\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        match serde_json::from_str::<Response>(&line).unwrap() {
            Response::Error { code, .. } => assert_eq!(code, CODE_BAD_REQUEST),
            other => panic!("Expected Error, got {:?}", other),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_client_commands() {
        let (_dir, config, handle) = start_service().await;
        let mut client = connect(client_config(&config)).await.unwrap();
        assert!(!client.service_version().is_empty());

        let commands = client.list_commands().await.unwrap();
        let names: Vec<&str> = commands.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"collect_all"));
        assert!(names.contains(&"get_latest_data"));
        assert!(names.contains(&"get_agent_status"));

        // 采集前：没有数据，状态全部 Idle
        assert_eq!(client.get_latest_data(None).await.unwrap(), json!({}));
        let status = client.get_agent_status().await.unwrap();
        assert_eq!(status.len(), 2);

        let results = client.collect_all().await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert!(!results[1].is_success());

        assert_eq!(
            client.get_latest_data(None).await.unwrap(),
            json!({"News": [{"title": "A"}]})
        );
        assert_eq!(
            client.get_latest_data(Some("Market")).await.unwrap(),
            json!([])
        );

        let status = client.get_agent_status().await.unwrap();
        assert_eq!(status[1].last_error.as_deref(), Some("rate limited"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_unknown_command_returns_404() {
        let (_dir, config, handle) = start_service().await;
        let mut client = connect(client_config(&config)).await.unwrap();

        let response = client
            .request(&Request::call("get_everything", json!({})))
            .await
            .unwrap();
        match response {
            Response::Error { code, message } => {
                assert_eq!(code, CODE_UNKNOWN_COMMAND);
                assert!(message.contains("get_everything"));
            }
            other => panic!("Expected Error, got {:?}", other),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_subscriber_receives_cycle_pushes() {
        let (_dir, config, handle) = start_service().await;

        let mut watcher = connect(client_config(&config)).await.unwrap();
        watcher
            .subscribe(vec![EventType::CollectionCompleted, EventType::AgentFailed])
            .await
            .unwrap();

        let mut caller = connect(client_config(&config)).await.unwrap();
        caller.collect_all().await.unwrap();

        let mut saw_completed = false;
        let mut saw_failed = false;
        while !(saw_completed && saw_failed) {
            let push = timeout(Duration::from_secs(5), watcher.recv_push())
                .await
                .expect("push timed out")
                .expect("push channel closed");
            match push {
                Push::CollectionCompleted { trigger, results, .. } => {
                    assert_eq!(trigger, Trigger::OnDemand);
                    assert_eq!(results.len(), 2);
                    saw_completed = true;
                }
                Push::AgentFailed { agent, error, .. } => {
                    assert_eq!(agent, "Market");
                    assert_eq!(error, "rate limited");
                    saw_failed = true;
                }
            }
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_response_flushed_after_client_half_close() {
        let (_dir, config, handle) = start_service().await;

        for _ in 0..20 {
            let mut stream = UnixStream::connect(config.socket_path()).await.unwrap();
            stream
                .write_all(b"{\"type\":\"Call\",\"command\":\"get_agent_status\"}\n")
                .await
                .unwrap();
            stream.shutdown().await.unwrap();

            let mut output = String::new();
            timeout(Duration::from_secs(5), stream.read_to_string(&mut output))
                .await
                .expect("read timed out")
                .unwrap();
            assert!(output.contains("CallResult"), "missing response: {:?}", output);
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_serve_stream_over_duplex() {
        let (_dir, _config, service) = build_service();

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let serving = tokio::spawn(async move {
            service
                .serve_stream(BufReader::new(server_read), server_write)
                .await
        });

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"{\"type\":\"Call\",\"command\":\"collect_all\"}\n{not json\n")
            .await
            .unwrap();
        client_write.shutdown().await.unwrap();

        // EOF 后正常返回
        timeout(Duration::from_secs(5), serving)
            .await
            .expect("serve_stream did not return")
            .unwrap()
            .unwrap();

        let mut lines = BufReader::new(client_read).lines();

        let first = lines.next_line().await.unwrap().unwrap();
        match serde_json::from_str::<Response>(&first).unwrap() {
            Response::CallResult { command, data } => {
                assert_eq!(command, "collect_all");
                assert_eq!(data.as_array().unwrap().len(), 2);
                assert_eq!(data[0]["status"], "success");
                assert_eq!(data[1]["error"], "rate limited");
            }
            other => panic!("Expected CallResult, got {:?}", other),
        }

        let second = lines.next_line().await.unwrap().unwrap();
        match serde_json::from_str::<Response>(&second).unwrap() {
            Response::Error { code, .. } => assert_eq!(code, CODE_BAD_REQUEST),
            other => panic!("Expected Error, got {:?}", other),
        }

        assert!(lines.next_line().await.unwrap().is_none());
    }
}
