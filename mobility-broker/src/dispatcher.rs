//! The Event Dispatcher (§4.G): fans one event out to every subscriber of
//! its type, serialized per subscriber (I5) but parallel across subscribers,
//! with bounded exponential-backoff retry.

use std::time::Duration;

use mobility_wire::{DispatchError, Event};

/// §9 Open Questions' decision: 3 attempts, base 100ms, cap 2s, no jitter —
/// deterministic so that §8's S5 can assert an exact attempt count.
const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Delivers `event` to every endpoint in `subscribers`, in order, each POST
/// going to `<endpoint>/triggered` (§4.G.2).
///
/// Subscribers are dispatched concurrently (`futures::future::join_all`);
/// within a single subscriber, retries are strictly sequential, preserving
/// I5. A 4xx response is logged and treated as non-fatal for the overall
/// dispatch (other subscribers still receive); a final failure after
/// retries on any subscriber is fatal and surfaces as [`DispatchError`].
pub async fn dispatch(
    client: &reqwest::Client,
    subscribers: &[String],
    event: &Event,
) -> Result<(), DispatchError> {
    let results = futures::future::join_all(
        subscribers
            .iter()
            .map(|endpoint| deliver_with_retry(client, endpoint, event)),
    )
    .await;

    for result in results {
        result?;
    }
    Ok(())
}

async fn deliver_with_retry(
    client: &reqwest::Client,
    endpoint: &str,
    event: &Event,
) -> Result<(), DispatchError> {
    let url = format!("{}/triggered", endpoint.trim_end_matches('/'));
    let mut attempts = 0;
    let mut backoff = BASE_BACKOFF;

    loop {
        attempts += 1;
        match client.post(&url).json(event).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) if response.status().is_client_error() => {
                tracing::warn!(
                    endpoint,
                    status = %response.status(),
                    event_type = %event.event_type,
                    "subscriber rejected event (non-retriable)"
                );
                return Ok(());
            }
            Ok(response) => {
                if attempts >= MAX_ATTEMPTS {
                    return Err(DispatchError::Rejected {
                        endpoint: endpoint.to_string(),
                        event_type: event.event_type.as_str().to_string(),
                        attempts,
                        reason: format!("HTTP {}", response.status()),
                    });
                }
            }
            Err(err) => {
                if attempts >= MAX_ATTEMPTS {
                    return Err(DispatchError::Rejected {
                        endpoint: endpoint.to_string(),
                        event_type: event.event_type.as_str().to_string(),
                        attempts,
                        reason: err.to_string(),
                    });
                }
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
