use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

pub const STUB_API_KEY: &str = "sk-stub";

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum ReplyBehavior {
    /// A bare JSON object in `output_text`.
    Json,
    /// The JSON object wrapped in a markdown fence with some chatter.
    Fenced,
    /// Prose without any JSON object.
    Prose,
    /// HTTP 500 with an OpenAI-style error body.
    ServerError,
}

pub struct OpenAiStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(behavior: ReplyBehavior) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let authorized = request.headers().iter().any(|h| {
                    h.field.equiv("Authorization")
                        && h.value.as_str() == format!("Bearer {STUB_API_KEY}")
                });
                if !authorized {
                    let _ = request.respond(json_response(
                        401,
                        serde_json::json!({ "error": { "message": "invalid api key" } }),
                    ));
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }

                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                let format = parsed
                    .pointer("/text/format/type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if format != "json_object" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("expected json_object format")
                            .with_status_code(400),
                    );
                    continue;
                }

                let instructions = parsed
                    .get("instructions")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let payload = branch_payload(instructions);

                let output_text = match behavior {
                    ReplyBehavior::Json => payload.to_string(),
                    ReplyBehavior::Fenced => {
                        format!("Here is the analysis:\n```json\n{payload:#}\n```\nThanks.")
                    }
                    ReplyBehavior::Prose => "I cannot help with that right now.".to_string(),
                    ReplyBehavior::ServerError => {
                        let _ = request.respond(json_response(
                            500,
                            serde_json::json!({ "error": { "message": "upstream overloaded" } }),
                        ));
                        continue;
                    }
                };

                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "output": [
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": output_text }
                            ]
                        }
                    ],
                    "output_text": output_text
                });
                let _ = request.respond(json_response(200, response_body));
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn json_response(status: u16, body: Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

/// Picks the payload by the first field the instructions ask for.
fn branch_payload(instructions: &str) -> Value {
    if instructions.contains("entity_assessment") {
        serde_json::json!({
            "entity_assessment": "recognizable brand",
            "knowledge_panel_readiness": 64,
            "key_improvements": ["organization schema", "about page", "same-as links"],
        })
    } else if instructions.contains("credibility_assessment") {
        serde_json::json!({
            "credibility_assessment": "mostly credible",
            "neeat_scores": { "expertise": 70, "trustworthiness": 60 },
            "trust_signals": ["https", "contact details", "reviews"],
        })
    } else if instructions.contains("conversation_readiness") {
        serde_json::json!({
            "conversation_readiness": "partial",
            "query_patterns": ["what is", "how to", "best"],
            "engagement_score": 48,
            "gaps": ["faq", "how-to content", "short answers"],
        })
    } else if instructions.contains("platform_coverage") {
        serde_json::json!({
            "platform_coverage": { "search_engines": "indexed" },
            "visibility_scores": { "google": 72, "bing": 55 },
            "optimization_opportunities": ["video", "social profiles", "wikidata"],
        })
    } else {
        serde_json::json!({
            "strategic_recommendations": ["topic clusters", "entity markup", "faq hub"],
            "quick_wins": ["titles", "meta descriptions", "alt text"],
            "long_term_strategy": ["authority building", "content depth", "reviews"],
            "priority_matrix": { "high_impact_low_cost": "titles" },
        })
    }
}
