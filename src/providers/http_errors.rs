use anyhow::anyhow;
use std::error::Error as StdError;
use std::io::ErrorKind;

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_matches(err, ErrorKind::TimedOut, "timed out")
}

fn error_chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

/// Turns a transport failure into a message that says what to check.
/// `service` names the remote side ("model API", "arXiv API") and
/// `url_setting` the variable that configures its address.
pub(crate) fn api_request_error(
    err: reqwest::Error,
    service: &str,
    api_url: &str,
    url_setting: &str,
    connect_timeout_secs: u64,
) -> anyhow::Error {
    if err.is_timeout() || error_chain_has_timeout(&err) {
        return anyhow!(
            "Request to {} at '{}' timed out (connect timeout {}s). \
             Increase MODEL_CONNECT_TIMEOUT_SECS or check network and proxy settings.",
            service,
            api_url,
            connect_timeout_secs
        );
    }

    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return anyhow!(
                "Connection refused by {} at '{}'. \
                 Ensure the service is reachable and {} is correct.",
                service,
                api_url,
                url_setting
            );
        }

        return anyhow!(
            "Failed to connect to {} at '{}'. \
             Check {} and network connectivity.",
            service,
            api_url,
            url_setting
        );
    }

    anyhow!("Failed to call {} at '{}': {}", service, api_url, err)
}
