//! Integration tests for the gesture control HTTP API

#[cfg(feature = "server")]
mod server_tests {
    use gesture_control_agent::config::Config;
    use gesture_control_agent::server::{run, ServerConfig};
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_data_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gesture-server-test-{}", uuid::Uuid::new_v4()))
    }

    /// 21 synthetic keypoints; `spread` fans the fingers.
    fn hand(spread: f64) -> Vec<[f64; 3]> {
        let mut points = vec![[0.5, 0.5, 0.0]];
        for finger in 0..5 {
            let angle = -0.9 + finger as f64 * 0.45 * spread;
            for joint in 1..=4 {
                let r = 0.04 * joint as f64 + 0.02 * finger as f64;
                points.push([0.5 + r * angle.sin(), 0.5 - r * angle.cos(), 0.005 * joint as f64]);
            }
        }
        points
    }

    async fn start(data_dir: &PathBuf) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let config = Config {
            data_path: data_dir.clone(),
            ..Config::default()
        };
        start_with(config).await
    }

    async fn start_with(config: Config) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let (addr, shutdown_tx) = run(ServerConfig::new(0, config))
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_gestures_lists_supported_actions() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/api/gestures", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(body["gestures"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["actions"].as_array().map(Vec::len), Some(9));
        assert!(body["actions"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("PLAY_PAUSE")));

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_invalid_bulk_edit_is_rejected() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/api/gestures", addr))
            .json(&serde_json::json!([{ "label": "wave", "action": "TELEPORT" }]))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_GESTURE");

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_monitoring_requires_trained_model() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/api/toggle_control", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "MODEL_NOT_SYNCED");

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_record_train_and_monitor() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;
        let client = reqwest::Client::new();

        let progress: serde_json::Value = client
            .post(format!("http://{}/api/record", addr))
            .json(&serde_json::json!({
                "label": "open_palm",
                "action": "PLAY_PAUSE",
                "emoji": "✋",
                "target": 20
            }))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(progress["target"], 20);
        assert_eq!(progress["count"], 0);

        let mut last = serde_json::Value::Null;
        for i in 0..20 {
            last = client
                .post(format!("http://{}/api/frame", addr))
                .json(&serde_json::json!({ "landmarks": hand(1.0 + 0.02 * i as f64) }))
                .send()
                .await
                .expect("Failed to send request")
                .json()
                .await
                .expect("Failed to parse JSON");
        }
        assert_eq!(last["mode"], "idle");
        assert!(last["message"].as_str().unwrap_or("").contains("Saved 20 samples"));

        let status: serde_json::Value = reqwest::get(format!("http://{}/api/model_status", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(status["trained"], true);
        assert_eq!(status["synced"], true);
        assert_eq!(status["sample_counts"]["open_palm"], 20);

        let control: serde_json::Value = client
            .post(format!("http://{}/api/toggle_control", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(control["monitoring"], true);
        assert_eq!(control["mode"], "monitoring");

        let frame: serde_json::Value = client
            .post(format!("http://{}/api/frame", addr))
            .json(&serde_json::json!({ "landmarks": null }))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(frame["hand_detected"], false);
        assert_eq!(frame["gesture"], "none");

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_cancel_without_recording_conflicts() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/api/record/cancel", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/api/frame", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[tokio::test]
    async fn test_cors_allows_dev_server_ports() {
        let data_dir = test_data_dir();
        let (addr, shutdown_tx) = start(&data_dir).await;
        let client = reqwest::Client::new();

        for origin in ["http://localhost:5173", "http://127.0.0.1:3000"] {
            let response = client
                .request(reqwest::Method::OPTIONS, format!("http://{}/api/frame", addr))
                .header("Origin", origin)
                .header("Access-Control-Request-Method", "POST")
                .send()
                .await
                .expect("Failed to send request");
            let allowed = response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            assert_eq!(allowed.as_deref(), Some(origin));
        }

        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/api/frame", addr))
            .header("Origin", "http://example.com")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.headers().get("access-control-allow-origin").is_none());

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_monitoring_runs_configured_action_command() {
        let data_dir = test_data_dir();
        let marker = data_dir.join("muted");
        let mut config = Config {
            data_path: data_dir.clone(),
            ..Config::default()
        };
        config.actions.insert(
            gesture_control_agent::registry::GestureAction::Mute,
            vec!["touch".to_string(), marker.display().to_string()],
        );
        let (addr, shutdown_tx) = start_with(config).await;
        let client = reqwest::Client::new();

        client
            .post(format!("http://{}/api/record", addr))
            .json(&serde_json::json!({ "label": "fist", "action": "MUTE", "target": 20 }))
            .send()
            .await
            .expect("Failed to send request");
        for i in 0..20 {
            client
                .post(format!("http://{}/api/frame", addr))
                .json(&serde_json::json!({ "landmarks": hand(1.0 + 0.02 * i as f64) }))
                .send()
                .await
                .expect("Failed to send request");
        }
        let control: serde_json::Value = client
            .post(format!("http://{}/api/toggle_control", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(control["monitoring"], true);

        let mut performed = Vec::new();
        for _ in 0..3 {
            let frame: serde_json::Value = client
                .post(format!("http://{}/api/frame", addr))
                .json(&serde_json::json!({ "landmarks": hand(1.1) }))
                .send()
                .await
                .expect("Failed to send request")
                .json()
                .await
                .expect("Failed to parse JSON");
            performed.push(frame["action"].clone());
        }

        assert_eq!(performed.iter().filter(|a| !a.is_null()).count(), 1);
        assert!(marker.exists());

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(data_dir);
    }
}
