use crate::error::ApiError;
use async_trait::async_trait;
use configuration::ServiceConfig;
use core_types::{RequestDescriptor, ResultTable};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub mod error;
pub mod responses;
// --- Public API ---
pub use responses::{ErrorResponse, QueryRequest};

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// The abstract interface to the external data service.
///
/// Given a request's query and universe, the service asynchronously returns a table or
/// fails. Implementations are shared across concurrently running tasks, so every method
/// takes `&self`.
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Result<ResultTable, ApiError>;
}

/// A `QueryService` backed by the service's HTTP endpoint.
///
/// A 401 or 403 reply invalidates the session: that call and every later call on the same
/// client fail with `ApiError::SessionInvalidated`. Replies already received are unaffected.
pub struct HttpQueryService {
    client: reqwest::Client,
    query_url: String,
    timeout: Duration,
    invalidated: AtomicBool,
}

impl HttpQueryService {
    pub fn new(config: &ServiceConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let key = HeaderValue::from_str(&config.api_key)
                .map_err(|e| ApiError::InvalidConfig(format!("invalid API key: {e}")))?;
            headers.insert(API_KEY_HEADER, key);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            query_url: format!("{}/query", config.base_url.trim_end_matches('/')),
            timeout: config.timeout,
            invalidated: AtomicBool::new(false),
        })
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }
}

#[async_trait]
impl QueryService for HttpQueryService {
    async fn execute(&self, request: &RequestDescriptor) -> Result<ResultTable, ApiError> {
        if self.is_invalidated() {
            return Err(ApiError::SessionInvalidated(
                "an earlier request was rejected as unauthorized".to_string(),
            ));
        }

        let body = QueryRequest::from(request);
        debug!(request = %request.provenance(), expression = %body.expression, "Submitting query");

        let response = self
            .client
            .post(&self.query_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout(self.timeout)
                } else {
                    ApiError::Request(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str::<ResultTable>(&text)
                .map_err(|e| ApiError::Deserialization(e.to_string()));
        }

        let message = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(ErrorResponse {
                code: Some(code),
                message,
            }) => format!("{code}: {message}"),
            Ok(ErrorResponse { message, .. }) => message,
            Err(_) => text,
        };

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            if !self.invalidated.swap(true, Ordering::AcqRel) {
                warn!(status = status.as_u16(), %message, "Data service session invalidated");
            }
            return Err(ApiError::SessionInvalidated(message));
        }

        Err(ApiError::Service {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::routing::post;
    use core_types::{Expression, Provenance, Selection};
    use rust_decimal::Decimal;

    fn descriptor(label: &str) -> RequestDescriptor {
        RequestDescriptor::new(
            label,
            Expression::reference("UNIV"),
            vec![("OAS".to_string(), Expression::formula("SPREAD()"))],
            Provenance {
                index: 0,
                classification: "Maturity Bucket".to_string(),
                selection: Selection::All,
                universe_name: "Sector".to_string(),
                universe_label: label.to_string(),
                metrics: vec!["OAS".to_string()],
                offset: "current".to_string(),
            },
        )
    }

    async fn handler(headers: AxumHeaders, body: String) -> (AxumStatus, String) {
        let request: serde_json::Value = serde_json::from_str(&body).unwrap_or_default();
        match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
            Some("secret") => {}
            _ => {
                return (
                    AxumStatus::UNAUTHORIZED,
                    r#"{"message":"bad key"}"#.to_string(),
                );
            }
        }
        if request["universe"] == "BROKEN" {
            return (AxumStatus::BAD_REQUEST, "syntax error".to_string());
        }
        if request["universe"] == "CODED" {
            return (
                AxumStatus::UNPROCESSABLE_ENTITY,
                r#"{"code":"E42","message":"unknown field"}"#.to_string(),
            );
        }
        if request["universe"] == "HUGE" {
            return (
                AxumStatus::OK,
                r#"{"rows":[{"label":"HUGE","values":{"OAS":1e30}}]}"#.to_string(),
            );
        }
        let reply = serde_json::json!({
            "rows": [{"label": request["universe"], "values": {"OAS": 123.5, "YTW": null}}]
        });
        (AxumStatus::OK, reply.to_string())
    }

    async fn spawn_service() -> String {
        let app = Router::new().route("/query", post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base_url: String, api_key: &str) -> ServiceConfig {
        ServiceConfig {
            base_url,
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn posts_the_query_and_parses_the_table() {
        let base_url = spawn_service().await;
        let service = HttpQueryService::new(&config(base_url, "secret")).unwrap();

        let table = service.execute(&descriptor("UNIV")).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.number("UNIV", "OAS"), Some(Decimal::new(1235, 1)));
        assert!(table.value("UNIV", "YTW").unwrap().is_missing());
    }

    #[tokio::test]
    async fn service_errors_carry_status_and_message() {
        let base_url = spawn_service().await;
        let service = HttpQueryService::new(&config(base_url, "secret")).unwrap();

        let broken = RequestDescriptor::new(
            "broken",
            Expression::reference("BROKEN"),
            vec![],
            descriptor("x").provenance().clone(),
        );
        match service.execute(&broken).await {
            Err(ApiError::Service { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "syntax error");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!service.is_invalidated());
    }

    #[tokio::test]
    async fn error_code_is_prefixed_to_the_message() {
        let base_url = spawn_service().await;
        let service = HttpQueryService::new(&config(base_url, "secret")).unwrap();

        let coded = RequestDescriptor::new(
            "coded",
            Expression::reference("CODED"),
            vec![],
            descriptor("x").provenance().clone(),
        );
        match service.execute(&coded).await {
            Err(ApiError::Service { status, message }) => {
                assert_eq!(status, 422);
                assert_eq!(message, "E42: unknown field");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_range_number_is_a_deserialization_failure() {
        let base_url = spawn_service().await;
        let service = HttpQueryService::new(&config(base_url, "secret")).unwrap();

        let huge = RequestDescriptor::new(
            "huge",
            Expression::reference("HUGE"),
            vec![],
            descriptor("x").provenance().clone(),
        );
        assert!(matches!(
            service.execute(&huge).await,
            Err(ApiError::Deserialization(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_reply_invalidates_the_session() {
        let base_url = spawn_service().await;
        let service = HttpQueryService::new(&config(base_url, "wrong")).unwrap();

        assert!(matches!(
            service.execute(&descriptor("UNIV")).await,
            Err(ApiError::SessionInvalidated(message)) if message == "bad key"
        ));
        assert!(service.is_invalidated());
        assert!(matches!(
            service.execute(&descriptor("UNIV")).await,
            Err(ApiError::SessionInvalidated(_))
        ));
    }
}
