#[cfg(test)]
mod tests {
    use std::env;
    use std::time::Duration;

    use serial_test::serial;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::source::{FlagSource, MemorySource};
    use crate::test_support::support::unreachable_url;
    use crate::{Client, FeatureFlag, FlagError, BASE_URL_ENV, COD_FLAG};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Helper function to create a test client against the mock server
    fn create_test_client(server: &MockServer) -> Client {
        init_logging();
        Client::builder()
            .with_base_url(&server.uri())
            .build()
            .expect("Failed to build test client")
    }

    #[tokio::test]
    async fn test_client_initialization() {
        let client = Client::builder()
            .with_base_url("https://flags.example.com/")
            .with_timeout(Duration::from_secs(3))
            .build()
            .unwrap();

        assert_eq!(client.base_url(), "https://flags.example.com/");
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert!(client.debug_info().contains("flags.example.com"));
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_rejected() {
        let result = Client::builder().with_base_url("not a url").build();
        assert!(matches!(result, Err(FlagError::ConfigError(_))));

        let result = Client::builder().with_base_url("mailto:flags@example.com").build();
        assert!(matches!(result, Err(FlagError::ConfigError(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_base_url_from_environment() {
        env::set_var(BASE_URL_ENV, "http://toggles.internal:9000");
        let client = Client::builder().build().unwrap();
        assert_eq!(client.base_url(), "http://toggles.internal:9000/");

        // An explicit address wins over the environment
        let client = Client::builder()
            .with_base_url("http://other:1234")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://other:1234/");

        env::remove_var(BASE_URL_ENV);
        let client = Client::builder().build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:8084/");
    }

    #[tokio::test]
    async fn test_read_flag_from_api() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags/enableCodPayment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "enabled": true
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/flags/enableNewUI"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "enabled": false
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        assert!(client.is(COD_FLAG).enabled().await);
        assert!(!client.is("enableNewUI").enabled().await);
        assert!(client.fetch_flag(COD_FLAG).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_flag_fails_closed_on_missing_flag() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags/unknown"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "Feature flag not found"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        assert!(!client.read_flag("unknown").await);

        match client.fetch_flag("unknown").await {
            Err(FlagError::ApiError(message)) => {
                assert!(message.contains("404"));
                assert!(message.contains("Feature flag not found"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_flag_fails_closed_on_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags/enableCodPayment"))
            .respond_with(ResponseTemplate::new(200).set_body_string("enabled"))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        assert!(!client.is(COD_FLAG).enabled().await);
        assert!(matches!(
            client.fetch_flag(COD_FLAG).await,
            Err(FlagError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_read_flag_fails_closed_when_unreachable() {
        init_logging();
        let client = Client::builder()
            .with_base_url(&unreachable_url())
            .with_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert!(!client.read_flag(COD_FLAG).await);
        assert!(matches!(
            client.fetch_flag(COD_FLAG).await,
            Err(FlagError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_flag_name_is_a_single_path_segment() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags/cod%20payment%2Fv2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "enabled": true
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(client.read_flag("cod payment/v2").await);
    }

    #[tokio::test]
    async fn test_base_url_path_prefix_is_kept() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/toggles/api/flags/enableCodPayment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "enabled": true
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = Client::builder()
            .with_base_url(&format!("{}/toggles/", mock_server.uri()))
            .build()
            .unwrap();
        assert!(client.read_flag(COD_FLAG).await);
    }

    #[tokio::test]
    async fn test_empty_flag_name_is_rejected_without_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        assert!(!client.read_flag("").await);
        assert!(matches!(
            client.fetch_flag("  ").await,
            Err(FlagError::InvalidName(_))
        ));
        assert!(matches!(
            client.write_flag("", true).await,
            Err(FlagError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_write_flag_posts_enabled_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/flags/enableCodPayment"))
            .and(body_json(serde_json::json!({ "enabled": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Feature flag updated"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        client.is(COD_FLAG).set(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_flag_propagates_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/flags/enableCodPayment"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "Failed to update feature flag"
            })))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        match client.write_flag(COD_FLAG, false).await {
            Err(FlagError::ApiError(message)) => {
                assert!(message.contains("500"));
                assert!(message.contains("Failed to update feature flag"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_flag_propagates_transport_failure() {
        init_logging();
        let client = Client::builder()
            .with_base_url(&unreachable_url())
            .build()
            .unwrap();

        assert!(matches!(
            client.write_flag(COD_FLAG, true).await,
            Err(FlagError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_list_flags() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "enableCodPayment", "enabled": false },
                { "name": "enableNewUI", "enabled": true }
            ])))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);

        let flags = client.list_flags().await;
        assert_eq!(
            flags,
            vec![
                FeatureFlag::new("enableCodPayment", false),
                FeatureFlag::new("enableNewUI", true),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_flags_is_empty_on_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags"))
            .respond_with(ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({"error": "Internal Server Error"}))
            )
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        assert!(client.list_flags().await.is_empty());
    }

    #[tokio::test]
    async fn test_client_as_flag_source_reports_failures() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/flags/enableCodPayment"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = create_test_client(&mock_server);
        let source: &dyn FlagSource = &client;

        match source.fetch_flag(COD_FLAG).await {
            Err(FlagError::ApiError(message)) => assert!(message.contains("503")),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemorySource::new()
            .with_flag("enableNewUI", true)
            .with_flag(COD_FLAG, false);

        assert!(!source.fetch_flag(COD_FLAG).await.unwrap());
        assert!(matches!(
            source.fetch_flag("missing").await,
            Err(FlagError::NotFound(_))
        ));

        source.write_flag(COD_FLAG, true).await.unwrap();
        assert!(source.fetch_flag(COD_FLAG).await.unwrap());

        assert_eq!(
            source.flags().await,
            vec![
                FeatureFlag::new("enableCodPayment", true),
                FeatureFlag::new("enableNewUI", true),
            ]
        );

        assert!(matches!(
            source.write_flag("", true).await,
            Err(FlagError::InvalidName(_))
        ));
    }
}
