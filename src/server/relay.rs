use futures::StreamExt;
use log::{ error, info, warn };
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::history::InteractionLog;
use crate::llm::chat::FragmentStream;
use crate::models::chat::{ ChatRequest, LoggedResponse, StreamTranscript };

pub const CLIENT_DISCONNECTED: &str = "client disconnected";

/// Forwards provider fragments to the HTTP body while keeping the full
/// transcript. Exactly one log record is written when the relay ends,
/// whether the provider finished, failed, or the client went away. The
/// record is on disk before the returned channel closes.
pub fn relay_fragments(
    mut fragments: FragmentStream,
    request: ChatRequest,
    history: InteractionLog,
    delay: Duration
) -> mpsc::Receiver<Result<String, io::Error>> {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut transcript = String::new();
        let mut failure: Option<String> = None;
        let mut upstream_failed = false;

        loop {
            let item = tokio::select! {
                biased;
                _ = tx.closed() => {
                    warn!("Client disconnected while streaming {}", request.model_id);
                    failure = Some(CLIENT_DISCONNECTED.to_string());
                    break;
                }
                next = fragments.next() => match next {
                    Some(item) => item,
                    None => break,
                },
            };

            match item {
                Ok(piece) => {
                    if tx.send(Ok(piece.clone())).await.is_err() {
                        warn!("Client disconnected while streaming {}", request.model_id);
                        failure = Some(CLIENT_DISCONNECTED.to_string());
                        break;
                    }
                    // only what the client actually received
                    transcript.push_str(&piece);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    error!("Provider stream for {} failed: {}", request.model_id, e);
                    failure = Some(e.to_string());
                    upstream_failed = true;
                    break;
                }
            }
        }
        // Stop pulling from the provider before touching the disk.
        drop(fragments);

        if failure.is_none() {
            info!("Stream for {} complete ({} chars)", request.model_id, transcript.len());
        }
        let transcript = StreamTranscript {
            content: transcript,
            error: failure.clone(),
        };
        if let Err(e) = history.record(&request, LoggedResponse::Stream(transcript)).await {
            error!("Failed to log streamed interaction: {}", e);
        }

        if upstream_failed {
            let message = failure.unwrap_or_default();
            let _ = tx.send(Err(io::Error::other(message))).await;
        }
    });

    rx
}
