/// Client configuration.
///
/// Creation and viewing may be deployed apart: notes are created through
/// `api_addr` while share links point at `share_base_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Address of the note server (`host:port`).
    pub api_addr: String,
    /// Base of share links handed to recipients.
    pub share_base_url: String,
    /// Fetch attempts allowed per viewing session before giving up. Only
    /// transport failures consume attempts.
    pub max_fetch_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_addr: "127.0.0.1:4433".to_string(),
            share_base_url: "https://localhost".to_string(),
            max_fetch_attempts: 3,
        }
    }
}
