use clap::Parser;

use crate::llm::{ DEFAULT_API_KEY, DEFAULT_BASE_URL };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Provider Args ---
    /// Base URL of the OpenAI-compatible inference server (e.g., http://localhost:11434/v1 for Ollama)
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// API key sent as a bearer token. Local servers usually accept any value.
    #[arg(long, env = "OLLAMA_API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    pub api_key: String,

    /// Timeout in seconds for each model discovery request.
    #[arg(long, env = "DISCOVERY_TIMEOUT_SECS", default_value = "3")]
    pub discovery_timeout_secs: u64,

    /// Pause in milliseconds between streamed fragments. 0 disables the pause.
    #[arg(long, env = "STREAM_DELAY_MS", default_value = "0")]
    pub stream_delay_ms: u64,

    // --- General App Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8000")]
    pub server_addr: String,

    /// Path to the HTML document served at `/`.
    #[arg(long, env = "UI_PATH", default_value = "app/ui/index.html")]
    pub ui_path: String,

    /// Directory that receives one JSON file per chat interaction. Created on first write.
    #[arg(long, env = "LOG_DIR", default_value = "data/logs")]
    pub log_dir: String,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// Certificate and key paths, when TLS is enabled and both are present.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        if !self.enable_tls {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_ollama() {
        let args = Args::try_parse_from(["prompt-lab"]).unwrap();
        assert_eq!(args.server_addr, "127.0.0.1:8000");
        assert_eq!(args.discovery_timeout_secs, 3);
        assert_eq!(args.stream_delay_ms, 0);
        assert!(args.tls_paths().is_none());
    }

    #[test]
    fn tls_requires_flag_and_both_paths() {
        let args = Args::try_parse_from([
            "prompt-lab",
            "--tls-cert-path",
            "cert.pem",
            "--tls-key-path",
            "key.pem",
        ])
        .unwrap();
        assert!(args.tls_paths().is_none());

        let args = Args::try_parse_from([
            "prompt-lab",
            "--enable-tls",
            "--tls-cert-path",
            "cert.pem",
        ])
        .unwrap();
        assert!(args.tls_paths().is_none());

        let args = Args::try_parse_from([
            "prompt-lab",
            "--enable-tls",
            "--tls-cert-path",
            "cert.pem",
            "--tls-key-path",
            "key.pem",
        ])
        .unwrap();
        assert_eq!(args.tls_paths(), Some(("cert.pem", "key.pem")));
    }
}
