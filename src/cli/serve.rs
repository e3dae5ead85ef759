//! HTTP server: one pipeline run per incoming request.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use percent_encoding::percent_decode_str;
use tiny_http::{Header, Response, Server, StatusCode};

use crate::asset::{Artifact, RequestContext};
use crate::config::Config;
use crate::core::PipelineError;
use crate::filter::FilterTable;
use crate::registry::Registry;
use crate::request::Request;
use crate::response::{Negotiation, gzip, negotiate};
use crate::utils::mime;
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

struct ServerState {
    config: Config,
    registry: Registry,
    filters: FilterTable,
}

/// Bind and serve until the process is terminated.
pub fn run(config: Config, interface: Option<IpAddr>, port: Option<u16>) -> Result<()> {
    let interface = interface.unwrap_or(config.serve.interface);
    let port = port.unwrap_or(config.serve.port);
    let (server, addr) = bind_with_retry(interface, port)?;
    log!("serve"; "serving {} at http://{}", config.webroot.display(), addr);

    let state = Arc::new(ServerState {
        config,
        registry: Registry::with_defaults(),
        filters: FilterTable::with_defaults(),
    });
    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        thread::spawn(move || handle(request, &state));
    }
    Ok(())
}

/// Bind to the specified interface and port, with automatic port retry.
fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < MAX_PORT_RETRIES => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to bind after {} attempts (ports {}-{}): {}",
                    MAX_PORT_RETRIES,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

fn handle(request: tiny_http::Request, state: &ServerState) {
    let url = request.url().to_string();
    let if_modified_since = header_value(&request, "if-modified-since");
    let if_none_match = header_value(&request, "if-none-match");
    let accept_gzip =
        header_value(&request, "accept-encoding").is_some_and(|v| v.contains("gzip"));
    let ctx = RequestContext {
        referer: header_value(&request, "referer"),
        host: header_value(&request, "host").map(strip_port),
    };

    let outcome = match run_pipeline(state, &url, &ctx) {
        Ok(artifact) => {
            let negotiation =
                negotiate(&artifact, if_modified_since.as_deref(), if_none_match.as_deref());
            if negotiation.not_modified {
                debug!("serve"; "304 {url}");
                respond_not_modified(request, &negotiation)
            } else {
                debug!("serve"; "200 {url} ({} bytes)", artifact.content.len());
                respond_artifact(request, artifact, &negotiation, accept_gzip)
            }
        }
        Err(e) => {
            log!("serve"; "{} {url}: {e}", e.status());
            respond_error(request, &e)
        }
    };
    if let Err(e) = outcome {
        debug!("serve"; "client connection dropped: {e}");
    }
}

/// Resolve and process one request URL.
fn run_pipeline(
    state: &ServerState,
    url: &str,
    ctx: &RequestContext,
) -> crate::core::Result<Artifact> {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let mut raw_params = parse_query(query);

    // Without URL rewriting the file list travels in ?files=
    let file_list = match raw_params.iter().position(|(k, _)| k == "files") {
        Some(pos) => raw_params.remove(pos).1,
        None => decode(path),
    };

    let mut request = Request::resolve(
        &file_list,
        raw_params,
        &state.config.webroot,
        &state.registry,
    )?;
    let asset = state.registry.resolve(&request.ext)?(&state.config);
    asset.process(&mut request, &state.filters, &state.config, ctx)
}

/// Decode a query string into ordered key/value pairs.
///
/// A valueless token shaped like `name[...]` is bracket-argument
/// shorthand: it appends to the preceding valueless parameter, so
/// `?resize&w[50]&h[100]` reads as `resize=w[50]h[100]`.
pub(crate) fn parse_query(query: &str) -> Vec<(String, String)> {
    let mut params: Vec<(String, String, bool)> = Vec::new();
    for token in query.split('&').filter(|t| !t.is_empty()) {
        match token.split_once('=') {
            Some((key, value)) => params.push((decode(key), decode(value), true)),
            None => {
                let decoded = decode(token);
                match params.last_mut() {
                    Some((_, value, false)) if is_bracket_argument(&decoded) => {
                        value.push_str(&decoded);
                    }
                    _ => params.push((decoded, String::new(), false)),
                }
            }
        }
    }
    params.into_iter().map(|(k, v, _)| (k, v)).collect()
}

fn is_bracket_argument(token: &str) -> bool {
    token
        .split_once('[')
        .is_some_and(|(name, rest)| {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric())
                && rest.ends_with(']')
        })
}

fn decode(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

fn header_value(request: &tiny_http::Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.to_string())
}

/// Drop a trailing `:port` from a Host header value. Bracketed IPv6
/// hosts keep their brackets, matching what `Url::host_str` returns.
fn strip_port(host: String) -> String {
    if let Some(rest) = host.strip_prefix('[') {
        if let Some((inner, _)) = rest.split_once(']') {
            return format!("[{inner}]");
        }
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host,
    }
}

fn respond_not_modified(request: tiny_http::Request, negotiation: &Negotiation) -> Result<()> {
    let response = Response::empty(StatusCode(304))
        .with_header(header("Cache-Control", "must-revalidate"))
        .with_header(header("ETag", &format!("\"{}\"", negotiation.etag)));
    request.respond(response)?;
    Ok(())
}

fn respond_artifact(
    request: tiny_http::Request,
    artifact: Artifact,
    negotiation: &Negotiation,
    accept_gzip: bool,
) -> Result<()> {
    let compress = accept_gzip && mime::is_text(artifact.content_type);
    let body = if compress {
        gzip(&artifact.content)?
    } else {
        artifact.content
    };

    let mut response = Response::from_data(body)
        .with_header(header("Content-Type", artifact.content_type))
        .with_header(header("Cache-Control", "must-revalidate"))
        .with_header(header("Last-Modified", &negotiation.last_modified))
        .with_header(header("ETag", &format!("\"{}\"", negotiation.etag)));
    if compress {
        response = response
            .with_header(header("Content-Encoding", "gzip"))
            .with_header(header("Vary", "Accept-Encoding"));
    }
    request.respond(response)?;
    Ok(())
}

fn respond_error(request: tiny_http::Request, error: &PipelineError) -> Result<()> {
    let response = Response::from_string(error.render_body())
        .with_status_code(StatusCode(error.status()))
        .with_header(header("Content-Type", mime::types::PLAIN))
        .with_header(header("Cache-Control", "no-store"));
    request.respond(response)?;
    Ok(())
}

fn header(key: &str, value: &str) -> Header {
    Header::from_bytes(key, value).unwrap()
}
