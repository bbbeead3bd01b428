/// WebFinger discovery endpoint
use crate::{
    activitypub::{render, render::LocalResource, routing},
    context::AppContext,
    error::{ApError, ApResult},
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;
use url::Url;

const JRD_CONTENT_TYPE: &str = "application/jrd+json";

/// Build webfinger routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/.well-known/webfinger", get(webfinger))
}

/// GET /.well-known/webfinger?resource=acct:user@host
///
/// Resolves `acct:` names and plain https URLs to the actor's discovery
/// document. `rel` parameters filter the returned links.
async fn webfinger(
    State(ctx): State<AppContext>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApResult<Response> {
    let resource = query
        .iter()
        .find(|(k, _)| k == "resource")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| ApError::Input("resource parameter is required".to_string()))?;

    let url = Url::parse(resource)
        .map_err(|_| ApError::Input("resource must be a URI".to_string()))?;

    let mut document = match url.scheme() {
        "acct" => acct_document(&ctx, url.path()).await?,
        "http" | "https" => {
            match routing::resolve_path(&ctx.store, url.path()).await? {
                Some(LocalResource::Actor(user)) => {
                    render::webfinger_document(&user, ctx.base_url())
                }
                _ => {
                    return Err(ApError::NotFound(format!(
                        "no discovery document for {}",
                        resource
                    )))
                }
            }
        }
        other => {
            return Err(ApError::Input(format!(
                "unsupported resource scheme {:?}",
                other
            )))
        }
    };

    let rels: Vec<&str> = query
        .iter()
        .filter(|(k, _)| k == "rel")
        .map(|(_, v)| v.as_str())
        .collect();
    if !rels.is_empty() {
        filter_links(&mut document, &rels);
    }

    let body = serde_json::to_vec(&document)
        .map_err(|e| ApError::Internal(format!("response serialization: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, JRD_CONTENT_TYPE)], body).into_response())
}

/// Look up `user@host`, guarding against requests for a foreign host
async fn acct_document(ctx: &AppContext, acct: &str) -> ApResult<Value> {
    let (username, hostname) = acct
        .rsplit_once('@')
        .ok_or_else(|| ApError::Input("acct resource must name user@host".to_string()))?;

    let own_hostname = ctx.base_url().host_str().unwrap_or_default();
    if hostname != own_hostname {
        tracing::warn!(
            requested = hostname,
            own = own_hostname,
            "webfinger request for foreign hostname; is the base URL misconfigured?"
        );
        return Err(ApError::Input(format!(
            "this node does not serve {}",
            hostname
        )));
    }

    let user = ctx
        .store
        .user_by_username(username)
        .await?
        .ok_or_else(|| ApError::NotFound(format!("no user {}", username)))?;

    Ok(render::webfinger_document(&user, ctx.base_url()))
}

/// Keep only links whose `rel` is among the requested values
fn filter_links(document: &mut Value, rels: &[&str]) {
    if let Some(links) = document.get_mut("links").and_then(Value::as_array_mut) {
        links.retain(|link| {
            link.get("rel")
                .and_then(Value::as_str)
                .map(|rel| rels.contains(&rel))
                .unwrap_or(false)
        });
    }
}
