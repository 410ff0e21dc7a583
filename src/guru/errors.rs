//! Error types for the guru site client.

#[derive(Debug, thiserror::Error)]
pub enum GuruError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
}
