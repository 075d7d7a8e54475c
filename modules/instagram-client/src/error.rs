use thiserror::Error;

pub type Result<T> = std::result::Result<T, InstagramError>;

#[derive(Debug, Error)]
pub enum InstagramError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for InstagramError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InstagramError::Timeout(err.to_string())
        } else {
            InstagramError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for InstagramError {
    fn from(err: serde_json::Error) -> Self {
        InstagramError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stalled_request_is_a_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and never answer.
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let err: InstagramError = client
            .get(format!("http://{addr}/"))
            .send()
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, InstagramError::Timeout(_)), "got {err:?}");
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        let err: InstagramError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, InstagramError::Parse(_)));
    }
}
