use std::{future::Future, pin::Pin, time::Duration};

use anyhow::Context;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use thiserror::Error;

use super::models::{RoomsRequest, ScheduleEvent};
use crate::ocr::RecognizedToken;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("schedule request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("schedule service answered HTTP {0}")]
    Status(u16),
    #[error("schedule service returned an empty body")]
    EmptyBody,
    #[error("schedule response is not an event list: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SubmitError>> + Send + 'a>>;

/// The remote timetable service.
pub trait ScheduleApi: Send + Sync {
    fn post_rooms<'a>(
        &'a self,
        date: NaiveDate,
        request: &'a RoomsRequest,
    ) -> ApiFuture<'a, Vec<ScheduleEvent>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReply {
    pub room_id: u32,
    pub token: RecognizedToken,
    pub events: Vec<ScheduleEvent>,
}

/// Posts `token` for `date`. `Ok(None)` means the room is unknown and nothing was sent.
pub async fn submit_token(
    api: &dyn ScheduleApi,
    token: &RecognizedToken,
    date: NaiveDate,
) -> Result<Option<ScheduleReply>, SubmitError> {
    let Some(request) = RoomsRequest::for_token(token) else {
        debug!("room {token} is not in the lookup table, nothing to submit");
        return Ok(None);
    };
    let room_id = request.room_id().unwrap_or_default();

    let events = api.post_rooms(date, &request).await?;
    info!(
        "schedule for {token} (room {room_id}) on {date}: {} event(s)",
        events.len()
    );
    Ok(Some(ScheduleReply {
        room_id,
        token: token.clone(),
        events,
    }))
}

pub struct HttpScheduleClient {
    client: Client,
    endpoint: String,
}

impl HttpScheduleClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl ScheduleApi for HttpScheduleClient {
    fn post_rooms<'a>(
        &'a self,
        date: NaiveDate,
        request: &'a RoomsRequest,
    ) -> ApiFuture<'a, Vec<ScheduleEvent>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .query(&[("date", date.format("%Y-%m-%d").to_string())])
                .json(request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SubmitError::Status(status.as_u16()));
            }

            let body = response.text().await?;
            if body.trim().is_empty() {
                return Err(SubmitError::EmptyBody);
            }
            Ok(serde_json::from_str::<Vec<ScheduleEvent>>(&body)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::find_token;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    struct RecordingApi {
        calls: Mutex<Vec<(NaiveDate, RoomsRequest)>>,
    }

    impl ScheduleApi for RecordingApi {
        fn post_rooms<'a>(
            &'a self,
            date: NaiveDate,
            request: &'a RoomsRequest,
        ) -> ApiFuture<'a, Vec<ScheduleEvent>> {
            self.calls.lock().unwrap().push((date, request.clone()));
            Box::pin(async { Ok(vec![json!({"title": "Algo"})]) })
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..split]
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                if key.trim().eq_ignore_ascii_case("content-length") {
                    value.trim().parse::<usize>().ok()
                } else {
                    None
                }
            })
            .unwrap_or(0);
        raw.len() >= split + 4 + content_length
    }

    /// Answers exactly one request, returning the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}/APICelcat/public/sallesmmi"), handle)
    }

    fn local_client(endpoint: String) -> HttpScheduleClient {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpScheduleClient::with_client(endpoint, client)
    }

    #[tokio::test]
    async fn unknown_room_never_calls_api() {
        let api = RecordingApi {
            calls: Mutex::new(Vec::new()),
        };
        let token = find_token("M77-TD").unwrap();
        let reply = submit_token(&api, &token, date()).await.unwrap();
        assert!(reply.is_none());
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn known_room_is_posted_once() {
        let api = RecordingApi {
            calls: Mutex::new(Vec::new()),
        };
        let token = find_token("M13-TP").unwrap();
        let reply = submit_token(&api, &token, date()).await.unwrap().unwrap();
        assert_eq!(reply.room_id, 62575);
        assert_eq!(reply.events.len(), 1);

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, date());
        assert_eq!(calls[0].1.salle[0].event_color, "#FFFFBF");
    }

    #[tokio::test]
    async fn http_client_posts_json_with_date_query() {
        let (endpoint, server) = serve_once("200 OK", r#"[{"title":"Réseaux","start":"08:00"}]"#).await;
        let client = local_client(endpoint);
        let request = RoomsRequest::for_token(&find_token("M03-TP").unwrap()).unwrap();

        let events = client.post_rooms(date(), &request).await.unwrap();
        assert_eq!(events, vec![json!({"title": "Réseaux", "start": "08:00"})]);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /APICelcat/public/sallesmmi?date=2026-10-17 HTTP/1.1"));
        let body = raw.split("\r\n\r\n").nth(1).unwrap();
        let sent: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            sent,
            json!({"salle": [{"id": 19393, "title": "M03-TP", "eventColor": "#FFFFBF"}]})
        );
    }

    #[tokio::test]
    async fn http_client_rejects_error_status() {
        let (endpoint, server) = serve_once("500 Internal Server Error", "oops").await;
        let client = local_client(endpoint);
        let request = RoomsRequest::for_token(&find_token("M01-TD").unwrap()).unwrap();

        let err = client.post_rooms(date(), &request).await.unwrap_err();
        assert!(matches!(err, SubmitError::Status(500)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_client_rejects_empty_body() {
        let (endpoint, server) = serve_once("200 OK", "").await;
        let client = local_client(endpoint);
        let request = RoomsRequest::for_token(&find_token("M01-TD").unwrap()).unwrap();

        let err = client.post_rooms(date(), &request).await.unwrap_err();
        assert!(matches!(err, SubmitError::EmptyBody));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_client_rejects_non_list_body() {
        let (endpoint, server) = serve_once("200 OK", r#"{"error":"bad date"}"#).await;
        let client = local_client(endpoint);
        let request = RoomsRequest::for_token(&find_token("M01-TD").unwrap()).unwrap();

        let err = client.post_rooms(date(), &request).await.unwrap_err();
        assert!(matches!(err, SubmitError::Decode(_)));
        server.await.unwrap();
    }
}
