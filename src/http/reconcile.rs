//! Batched fragment reconciliation endpoint.
//!
//! Accepts the JSON-encoded expression list collected from placeholder
//! markers and answers with rendered content per unique expression. Bad
//! input is never a transport error: the page degrades to empty markers,
//! not a failed request.

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Form, State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::future::try_join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::CacheState;
use crate::engine::FragmentError;

/// Form field carrying the JSON array of fragment expressions.
#[derive(Debug, Deserialize)]
pub struct ReconcileParams {
    #[serde(default)]
    ajax_load_insertions: Option<String>,
}

/// One reconciled fragment in the response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledFragment {
    pub name: String,
    pub value: String,
}

/// `POST /ajax-load-insertions`.
pub async fn reconcile(
    State(cache): State<CacheState>,
    params: Result<Form<ReconcileParams>, FormRejection>,
) -> Result<Json<Vec<ReconciledFragment>>, EngineFailure> {
    let raw = match params {
        Ok(Form(ReconcileParams {
            ajax_load_insertions: Some(raw),
        })) if !raw.is_empty() => raw,
        Ok(_) => return Ok(Json(Vec::new())),
        Err(rejection) => {
            debug!(error = %rejection, "unreadable reconciliation form, returning empty list");
            return Ok(Json(Vec::new()));
        }
    };

    let expressions: Vec<String> = match serde_json::from_str(&raw) {
        Ok(expressions) => expressions,
        Err(err) => {
            debug!(error = %err, "malformed reconciliation payload, returning empty list");
            return Ok(Json(Vec::new()));
        }
    };

    // Set semantics: markers may repeat across a cached page, keep the first
    // occurrence of each expression.
    let mut seen = HashSet::new();
    let unique: Vec<String> = expressions
        .into_iter()
        .filter(|expr| seen.insert(expr.clone()))
        .collect();

    let renders = unique.iter().map(|expression| {
        let engine = &cache.engine;
        async move {
            let value = engine.render(expression).await?;
            Ok::<_, FragmentError>(ReconciledFragment {
                name: expression.clone(),
                value,
            })
        }
    });

    let fragments = try_join_all(renders).await.map_err(EngineFailure)?;
    counter!("snapcache_reconciled_fragments_total").increment(fragments.len() as u64);
    Ok(Json(fragments))
}

/// Rendering-engine failure surfaced through the endpoint.
///
/// The one error class the cache does not swallow; everything else on this
/// route answers with an empty list.
#[derive(Debug)]
pub struct EngineFailure(FragmentError);

impl IntoResponse for EngineFailure {
    fn into_response(self) -> Response {
        error!(error = %self.0, "fragment engine failed during reconciliation");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
