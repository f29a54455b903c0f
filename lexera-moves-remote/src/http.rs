/// BoardApi over the tracker's REST endpoints.
///
///   GET  {base}/boards/{boardId}        -> BoardSnapshot
///   POST {base}/boards/{boardId}/moves  -> MoveAck (an empty body is an ack without revision)
use lexera_moves::api::BoardApi;
use lexera_moves::protocol::{MoveAck, MoveRequest};
use lexera_moves::types::BoardSnapshot;
use lexera_moves::MoveError;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped inside a single path segment.
pub(crate) const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone)]
pub struct HttpBoardApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBoardApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn board_url(&self, board_id: &str) -> String {
        format!(
            "{}/boards/{}",
            self.base_url,
            utf8_percent_encode(board_id, SEGMENT)
        )
    }
}

impl BoardApi for HttpBoardApi {
    async fn fetch_board(&self, board_id: &str) -> Result<BoardSnapshot, MoveError> {
        let url = self.board_url(board_id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MoveError::FetchFailed(format!("GET {} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(MoveError::FetchFailed(format!(
                "GET {} returned {}: {}",
                url, status, text
            )));
        }
        resp.json::<BoardSnapshot>()
            .await
            .map_err(|e| MoveError::FetchFailed(format!("Parse board {}: {}", board_id, e)))
    }

    async fn submit_move(&self, request: &MoveRequest) -> Result<MoveAck, MoveError> {
        let url = format!("{}/moves", self.board_url(&request.board_id));
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| MoveError::NetworkFailure(format!("POST {} failed: {}", url, e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MoveError::NetworkFailure(format!("Read response: {}", e)))?;

        if status.is_client_error() {
            return Err(MoveError::ServerRejected(rejection_message(&body, status)));
        }
        if !status.is_success() {
            return Err(MoveError::NetworkFailure(format!(
                "POST {} returned {}",
                url, status
            )));
        }
        if body.trim().is_empty() {
            return Ok(MoveAck::default());
        }
        serde_json::from_str(&body)
            .map_err(|e| MoveError::NetworkFailure(format!("Parse move response: {}", e)))
    }
}

/// `{"error": "..."}` / `{"message": "..."}` bodies, else the raw text.
fn rejection_message(body: &str, status: reqwest::StatusCode) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("error")
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
    });
    match message {
        Some(m) => m.to_string(),
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status.to_string(),
    }
}
