//! HTTP transport. Builds one request from a [`Transfer`] and drives it to
//! completion, feeding received bytes through [`Transfer::write`] and the
//! request body (if any) through [`Transfer::read`].

use crate::transfer::Transfer;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "fetch-gateway";
pub(crate) const READ_CHUNK_SIZE: usize = 64 * 1024;

pub enum AttemptOutcome {
    Completed { response_code: u16 },
    TransportError(String),
}

pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            // Peer verification is deliberately disabled: upstream hosts are
            // adversarial/arbitrary and this gateway's contract never
            // promised transport-level trust, only byte-identical retrieval.
            .danger_accept_invalid_certs(true)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build transport client");
        Self { client }
    }

    pub async fn perform(&self, transfer: &Arc<Transfer>) -> AttemptOutcome {
        let method = if transfer.body.is_some() {
            reqwest::Method::POST
        } else {
            reqwest::Method::GET
        };

        let mut builder = self.client.request(method, &transfer.url);
        for (name, value) in &transfer.headers {
            builder = builder.header(name, value);
        }
        if transfer.offset > 0 {
            builder = builder.header("Range", format!("bytes={}-", transfer.offset));
        }
        if transfer.body.is_some() {
            let cursor = transfer.clone();
            let stream = futures_util::stream::unfold(cursor, |cursor| async move {
                let chunk = cursor.read(READ_CHUNK_SIZE);
                if chunk.is_empty() {
                    None
                } else {
                    Some((Ok::<_, std::io::Error>(chunk), cursor))
                }
            });
            builder = builder.body(reqwest::Body::wrap_stream(stream));
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return AttemptOutcome::TransportError(e.to_string()),
        };
        let response_code = response.status().as_u16();

        let mut stream = response.bytes_stream();
        loop {
            match stream.next().await {
                Some(Ok(bytes)) => {
                    let written = transfer.write(&bytes);
                    crate::metrics::Counters::downloaded_bytes(written as u64);
                    if written < bytes.len() {
                        // The write callback signalled abort.
                        return AttemptOutcome::TransportError(
                            "write callback aborted transfer".to_string(),
                        );
                    }
                }
                Some(Err(e)) => return AttemptOutcome::TransportError(e.to_string()),
                None => break,
            }
        }

        AttemptOutcome::Completed { response_code }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
