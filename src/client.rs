use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;

/// `base` + `route`, tolerating a missing or doubled slash.
pub fn route_url(base: &str, route: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}

/// GET one API route and decode its JSON body.
pub fn fetch_route(base: &str, route: &str, timeout: Duration) -> Result<Value> {
    let url = route_url(base, route);
    let client = Client::builder().timeout(timeout).build()?;
    let resp = client
        .get(&url)
        .send()
        .with_context(|| format!("Request to {} failed", url))?;
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        bail!("{} returned {}: {}", url, status, body.trim());
    }
    serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {}", url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_routes() {
        assert_eq!(
            route_url("http://127.0.0.1:5000", "/top-10/area"),
            "http://127.0.0.1:5000/top-10/area"
        );
        assert_eq!(
            route_url("http://127.0.0.1:5000/", "country/Chad"),
            "http://127.0.0.1:5000/country/Chad"
        );
    }

    #[test]
    fn unreachable_server_is_an_error() {
        // Port 9 (discard) is not expected to serve HTTP on the test host.
        let result = fetch_route("http://127.0.0.1:9", "/health/ping", Duration::from_secs(2));
        assert!(result.is_err());
    }
}
