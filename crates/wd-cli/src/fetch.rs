use std::time::Duration;

use wd_compiler::lists::now_millis;
use wd_compiler::{CachedList, ListFormat};
use wd_core::RuleSetError;

use crate::sources::ListSource;

/// A list downloaded and parsed, ready to replace its cached copy.
pub struct Fetched {
    pub source: ListSource,
    pub list: CachedList,
}

/// Fetch every source concurrently, each download and parse in its own
/// task. Results come back in source order.
pub async fn fetch_all(
    sources: Vec<ListSource>,
    format: Option<ListFormat>,
    timeout: Duration,
) -> Vec<Result<Fetched, RuleSetError>> {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            return sources
                .into_iter()
                .map(|source| {
                    Err(RuleSetError::FetchFailed {
                        list: source.location,
                        reason: e.to_string(),
                    })
                })
                .collect()
        }
    };

    let handles: Vec<_> = sources
        .into_iter()
        .map(|source| {
            let client = client.clone();
            let location = source.location.clone();
            let handle = tokio::spawn(async move { fetch_one(client, source, format).await });
            (location, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (location, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(RuleSetError::FetchFailed {
                list: location,
                reason: e.to_string(),
            }),
        };
        results.push(result);
    }
    results
}

async fn fetch_one(client: reqwest::Client, source: ListSource, format: Option<ListFormat>) -> Result<Fetched, RuleSetError> {
    let failed = |reason: String| RuleSetError::FetchFailed {
        list: source.location.clone(),
        reason,
    };

    log::debug!("fetching {}", source.location);
    let response = client
        .get(&source.location)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {}", status)));
    }

    let text = response.text().await.map_err(|e| failed(e.to_string()))?;
    let meta = source.meta(format, &text);

    // Parsing is CPU-bound; keep it off the reactor threads.
    let list = tokio::task::spawn_blocking(move || CachedList::from_text(meta, &text, now_millis()))
        .await
        .map_err(|e| failed(e.to_string()))?;

    log::debug!(
        "{}: {} rules, {} lines skipped",
        source.location,
        list.rules.len(),
        list.skipped
    );

    Ok(Fetched { source, list })
}
