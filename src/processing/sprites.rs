//! # Sprite Size Prober
//!
//! Picks the smallest sprite (by encoded byte size) out of a set of candidate
//! URLs.
//!
//! ## Measuring
//! 1. `HEAD` the URL and trust `Content-Length` when present
//! 2. Otherwise `GET` the whole resource and count its bytes
//! 3. If both fail, the size is unbounded: the URL only wins when every
//!    candidate is unbounded
//!
//! Probes for different URLs run concurrently; the result does not depend
//! on which probe finishes first.

use futures::future::join_all;
use log::{debug, warn};

use super::fetcher::ImageFetcher;

/// Recursively collect every non-blank string in a PokéAPI `sprites` object,
/// in document order.
pub fn collect_sprite_urls(sprites: &serde_json::Value) -> Vec<String> {
    fn walk(value: &serde_json::Value, out: &mut Vec<String>) {
        match value {
            serde_json::Value::String(url) if !url.trim().is_empty() => out.push(url.clone()),
            serde_json::Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            serde_json::Value::Object(fields) => fields.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }

    let mut urls = Vec::new();
    walk(sprites, &mut urls);
    urls
}

/// Choose the candidate with the smallest known size.
///
/// `None` sizes are unbounded. Ties, including ties between unbounded
/// candidates, go to the earliest candidate.
pub fn pick_smallest<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = (String, Option<u64>)>,
{
    let mut candidates: Vec<(String, Option<u64>)> = candidates.into_iter().collect();
    // Stable sort: equal keys keep input order
    candidates.sort_by_key(|(_, size)| (size.is_none(), *size));
    candidates.into_iter().next().map(|(url, _)| url)
}

/// Measure every URL concurrently and return the smallest.
///
/// Returns `None` only for an empty input.
pub async fn select_smallest(fetcher: &ImageFetcher, urls: &[String]) -> Option<String> {
    if urls.is_empty() {
        return None;
    }

    let sizes = join_all(urls.iter().map(|url| measure(fetcher, url))).await;

    pick_smallest(urls.iter().cloned().zip(sizes))
}

/// Byte size of the resource at `url`, or `None` if it can't be determined.
pub async fn measure(fetcher: &ImageFetcher, url: &str) -> Option<u64> {
    match fetcher.probe_size(url).await {
        Ok(Some(size)) => return Some(size),
        Ok(None) => debug!("📏 No Content-Length for {}, fetching body", url),
        Err(e) => debug!("📏 Size probe failed ({:#}), fetching body", e),
    }

    match fetcher.fetch(url).await {
        Ok(body) => Some(body.len() as u64),
        Err(e) => {
            warn!("⚠️  Could not determine size of {}: {:#}", url, e);
            None
        }
    }
}
