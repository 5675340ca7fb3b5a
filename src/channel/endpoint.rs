use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

use super::connector::ChannelKind;
use crate::error::{Result, TranscriberError};

/// Parse the base endpoint of the transcription backend
///
/// Accepts `http`, `https`, `ws` and `wss` URLs.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| TranscriberError::Config(format!("invalid endpoint {:?}: {}", endpoint, e)))?;

    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => {
            return Err(TranscriberError::Config(format!(
                "unsupported endpoint scheme {:?}",
                other
            )))
        }
    }

    if url.cannot_be_a_base() {
        return Err(TranscriberError::Config(format!(
            "endpoint {:?} cannot be used as a base URL",
            endpoint
        )));
    }

    Ok(url)
}

/// Build the socket URL for one channel of a session
///
/// `<ws|wss>://<host>/<base-path>/<audio|relay>/<session_id>[?<params>]`
pub fn channel_url(
    endpoint: &Url,
    kind: ChannelKind,
    session_id: &Uuid,
    params: &BTreeMap<String, String>,
) -> Result<Url> {
    let mut url = endpoint.clone();

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TranscriberError::Config(format!(
                "unsupported endpoint scheme {:?}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TranscriberError::Config(format!("cannot rewrite scheme to {}", scheme)))?;

    url.path_segments_mut()
        .map_err(|_| TranscriberError::Config(format!("endpoint {} has no path", endpoint)))?
        .pop_if_empty()
        .push(kind.path_segment())
        .push(&session_id.to_string());

    url.set_fragment(None);
    url.set_query(None);
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> Uuid {
        Uuid::parse_str("6f1d2c2e-8d7b-4d6e-9a57-0c3f2b9e1a11").unwrap()
    }

    #[test]
    fn test_http_becomes_ws() {
        let endpoint = parse_endpoint("http://localhost:8080").unwrap();
        let url = channel_url(&endpoint, ChannelKind::Audio, &id(), &BTreeMap::new()).unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8080/audio/6f1d2c2e-8d7b-4d6e-9a57-0c3f2b9e1a11"
        );
    }

    #[test]
    fn test_https_becomes_wss_and_keeps_base_path() {
        let endpoint = parse_endpoint("https://gk.example.com/api/v1/").unwrap();
        let url = channel_url(&endpoint, ChannelKind::Relay, &id(), &BTreeMap::new()).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://gk.example.com/api/v1/relay/6f1d2c2e-8d7b-4d6e-9a57-0c3f2b9e1a11"
        );
    }

    #[test]
    fn test_socket_schemes_are_kept() {
        let endpoint = parse_endpoint("wss://gk.example.com/base").unwrap();
        let url = channel_url(&endpoint, ChannelKind::Audio, &id(), &BTreeMap::new()).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(
            url.path(),
            "/base/audio/6f1d2c2e-8d7b-4d6e-9a57-0c3f2b9e1a11"
        );
    }

    #[test]
    fn test_query_params_are_encoded() {
        let endpoint = parse_endpoint("http://localhost/gk").unwrap();
        let mut params = BTreeMap::new();
        params.insert("memo".to_string(), "hello world".to_string());
        params.insert("lang".to_string(), "en-US".to_string());

        let url = channel_url(&endpoint, ChannelKind::Audio, &id(), &params).unwrap();
        assert_eq!(url.query(), Some("lang=en-US&memo=hello+world"));

        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, params);
    }

    #[test]
    fn test_endpoint_query_and_fragment_are_dropped() {
        let endpoint = parse_endpoint("http://localhost/gk?stale=1#frag").unwrap();
        let url = channel_url(&endpoint, ChannelKind::Relay, &id(), &BTreeMap::new()).unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_invalid_endpoints() {
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(TranscriberError::Config(_))
        ));
        assert!(matches!(
            parse_endpoint("ftp://example.com"),
            Err(TranscriberError::Config(_))
        ));
        assert!(matches!(
            parse_endpoint("mailto:someone@example.com"),
            Err(TranscriberError::Config(_))
        ));
    }
}
