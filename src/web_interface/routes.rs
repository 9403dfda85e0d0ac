use futures::TryStreamExt;
use log::{debug, info, warn};
use warp::hyper::body::Buf;
use warp::multipart::FormData;
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{ApiError, HealthResponse, WebhookReply};
use crate::controller::{Monitor, SessionOutcome};
use crate::plex::WebhookPayload;

const MAX_WEBHOOK_BYTES: u64 = 64 * 1024;

/// GET /
pub fn dashboard_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(|| async move {
        let html = r#"<html><head><title>Plex VPN Blocker</title></head>
                <body><h1>Plex VPN Blocker is running</h1><p>See /health and /ledger for JSON.</p></body></html>"#;
        Ok::<_, Rejection>(reply::html(html))
    })
}

/// GET /health
pub fn health_route(
    monitor: Monitor,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let monitor = monitor.clone();
            async move {
                match health_report(&monitor) {
                    Some(health) => Ok::<_, Rejection>(
                        reply::with_status(reply::json(&health), StatusCode::OK).into_response(),
                    ),
                    None => Ok::<_, Rejection>(
                        reply::with_status(
                            reply::json(&ApiError {
                                message: "Monitor status unavailable".to_string(),
                            }),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        )
                        .into_response(),
                    ),
                }
            }
        })
}

/// GET /ledger
pub fn ledger_route(
    monitor: Monitor,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("ledger")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let ledger = monitor.ledger();
            async move {
                match ledger.entries().await {
                    Ok(list) => {
                        Ok::<_, Rejection>(reply::with_status(reply::json(&list), StatusCode::OK))
                    }
                    Err(_) => Ok::<_, Rejection>(reply::with_status(
                        reply::json(&ApiError {
                            message: "Failed to load ledger".to_string(),
                        }),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )),
                }
            }
        })
}

/// POST /webhook, answered with 404 when webhooks are disabled.
///
/// Plex itself posts `multipart/form-data` with the JSON document in the
/// `payload` field; a plain JSON body is accepted too.
pub fn webhook_route(
    monitor: Monitor,
    enabled: bool,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let enabled_guard = warp::any()
        .and_then(move || async move {
            if enabled {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one();

    warp::path("webhook")
        .and(warp::path::end())
        .and(warp::post())
        .and(enabled_guard)
        .and(warp::body::content_length_limit(MAX_WEBHOOK_BYTES))
        .and(webhook_body())
        .and_then(move |parsed: Result<WebhookPayload, String>| {
            let monitor = monitor.clone();
            async move {
                let (status, body) = match parsed {
                    Ok(payload) => process_webhook(&monitor, payload).await,
                    Err(e) => {
                        warn!("Rejecting webhook body: {}", e);
                        (
                            StatusCode::BAD_REQUEST,
                            WebhookReply::error("Invalid webhook payload", e),
                        )
                    }
                };
                Ok::<_, Rejection>(reply::with_status(reply::json(&body), status))
            }
        })
}

fn webhook_body(
) -> impl Filter<Extract = (Result<WebhookPayload, String>,), Error = Rejection> + Clone {
    let json = warp::body::json().map(|payload: WebhookPayload| Ok::<_, String>(payload));
    let form = warp::multipart::form()
        .max_length(MAX_WEBHOOK_BYTES)
        .then(payload_from_form);
    json.or(form).unify()
}

async fn payload_from_form(mut form: FormData) -> Result<WebhookPayload, String> {
    while let Some(part) = form.try_next().await.map_err(|e| e.to_string())? {
        if part.name() != "payload" {
            continue;
        }
        let bytes = part
            .stream()
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(chunk.chunk());
                Ok(acc)
            })
            .await
            .map_err(|e| e.to_string())?;
        return serde_json::from_slice(&bytes).map_err(|e| e.to_string());
    }
    Err("multipart body has no payload field".to_string())
}

pub fn health_report(monitor: &Monitor) -> Option<HealthResponse> {
    let status = monitor.status()?;
    Some(HealthResponse {
        status: if status.consecutive_failures == 0 {
            "ok"
        } else {
            "degraded"
        },
        monitor: status,
        cache_entries: monitor.cache_entries(),
        dry_run: monitor.settings().dry_run,
    })
}

/// Evaluates the session a `media.play` notification announces, through the
/// same claim and ledger path the poll loop uses.
pub async fn process_webhook(
    monitor: &Monitor,
    payload: WebhookPayload,
) -> (StatusCode, WebhookReply) {
    if !payload.is_playback_start() {
        debug!("Ignoring webhook event {:?}", payload.event);
        return (
            StatusCode::OK,
            WebhookReply::status("Ignored non-playback event"),
        );
    }

    let Some(address) = payload.public_address() else {
        warn!("Webhook for {} carried no public client address", payload.user());
        return (
            StatusCode::BAD_REQUEST,
            WebhookReply::status("Client IP not found in webhook payload"),
        );
    };

    let session_id = payload.session_id();
    if let Some(id) = &session_id {
        match monitor.ledger().has_been_processed(id).await {
            Ok(true) => {
                debug!("Webhook for session {} already handled", id);
                return (
                    StatusCode::OK,
                    WebhookReply::status("Session already handled"),
                );
            }
            Ok(false) => {}
            Err(e) => warn!("Cannot check ledger for webhook session {}: {}", id, e),
        }
    }

    let classification = match monitor.classify(address).await {
        Ok(classification) => classification,
        Err(e) => {
            warn!("Allowing webhook playback from {} unverified: {}", address, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                WebhookReply::error("Error querying VPN API", e.to_string()),
            );
        }
    };

    let flagged = monitor.is_flagged(classification.category);
    let Some(session_id) = session_id else {
        if flagged {
            warn!("Flagged webhook playback from {} has no session id", address);
            return (
                StatusCode::BAD_REQUEST,
                WebhookReply::status("Session ID not found"),
            );
        }
        return (StatusCode::OK, WebhookReply::status("Playback allowed"));
    };

    info!(
        "Webhook playback {} from {} ({})",
        session_id, address, classification.category
    );
    match monitor
        .evaluate_session(payload.to_session(address, session_id))
        .await
    {
        SessionOutcome::Blocked => (
            StatusCode::OK,
            WebhookReply::status("Playback stopped for VPN user"),
        ),
        SessionOutcome::WouldBlock => (
            StatusCode::OK,
            WebhookReply::status("Playback would be stopped (dry run)"),
        ),
        SessionOutcome::AlreadyProcessed | SessionOutcome::InFlight => (
            StatusCode::OK,
            WebhookReply::status("Session already handled"),
        ),
        SessionOutcome::Allowed => (StatusCode::OK, WebhookReply::status("Playback allowed")),
        SessionOutcome::EnforcementFailed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            WebhookReply::status("Failed to stop playback"),
        ),
        SessionOutcome::LedgerFailed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            WebhookReply::status("Failed to record decision"),
        ),
        SessionOutcome::Unknown => (
            StatusCode::INTERNAL_SERVER_ERROR,
            WebhookReply::status("Error querying VPN API"),
        ),
    }
}
