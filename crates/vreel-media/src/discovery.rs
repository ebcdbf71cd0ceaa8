//! Candidate discovery via yt-dlp search.
//!
//! Results are filtered to a usable duration range and ranked by popularity.

use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use vreel_models::VideoCandidate;

use crate::error::{MediaError, MediaResult};

/// Shortest candidate kept, in seconds.
pub const MIN_DURATION_SECS: u64 = 60;
/// Longest candidate kept, in seconds.
pub const MAX_DURATION_SECS: u64 = 900;
/// Search size used when the caller has no preference.
pub const DEFAULT_MAX_RESULTS: usize = 15;

/// The subset of a yt-dlp info-json entry we read.
#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    thumbnail: Option<String>,
}

impl From<SearchEntry> for VideoCandidate {
    fn from(entry: SearchEntry) -> Self {
        let url = entry
            .webpage_url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));
        VideoCandidate {
            title: entry.title.unwrap_or_default(),
            url,
            duration_seconds: entry.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            view_count: entry.view_count.unwrap_or(0),
            thumbnail_url: entry.thumbnail,
            id: entry.id,
        }
    }
}

/// Parse yt-dlp `--dump-json` output (one JSON object per line).
///
/// Lines that fail to parse are skipped.
pub fn parse_search_output(output: &str) -> Vec<VideoCandidate> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match serde_json::from_str::<SearchEntry>(line) {
            Ok(entry) => Some(entry.into()),
            Err(e) => {
                debug!("Skipping unparseable search entry: {}", e);
                None
            }
        })
        .collect()
}

/// Keep candidates within the duration range, most viewed first.
///
/// The sort is stable, so equal view counts keep search order.
pub fn rank_candidates(candidates: Vec<VideoCandidate>) -> Vec<VideoCandidate> {
    let mut kept: Vec<VideoCandidate> = candidates
        .into_iter()
        .filter(|c| (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&c.duration_seconds))
        .collect();
    kept.sort_by(|a, b| b.view_count.cmp(&a.view_count));
    kept
}

/// Search for `keyword` and return ranked candidates.
pub async fn search_videos(keyword: &str, max_results: usize) -> MediaResult<Vec<VideoCandidate>> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Err(MediaError::acquisition("empty search keyword"));
    }
    let max_results = if max_results == 0 {
        DEFAULT_MAX_RESULTS
    } else {
        max_results
    };

    which::which("yt-dlp").map_err(|_| MediaError::YtDlpNotFound)?;

    let query = format!("ytsearch{}:{}", max_results, keyword);
    info!(keyword = %keyword, max_results, "Searching for candidates");

    let output = Command::new("yt-dlp")
        .args(["--dump-json", "--skip-download", "--no-warnings", &query])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| MediaError::acquisition(format!("failed to run yt-dlp: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // yt-dlp exits non-zero when a single entry fails; keep what we got
        if stdout.trim().is_empty() {
            let msg = stderr.lines().last().unwrap_or("unknown error");
            return Err(MediaError::acquisition(format!("search failed: {}", msg)));
        }
        warn!(keyword = %keyword, "Search completed with errors");
    }

    let found = parse_search_output(&stdout);
    let total = found.len();
    let ranked = rank_candidates(found);
    info!(keyword = %keyword, total, kept = ranked.len(), "Search complete");

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, duration: u64, views: u64) -> VideoCandidate {
        VideoCandidate {
            title: id.to_uppercase(),
            id: id.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", id),
            duration_seconds: duration,
            view_count: views,
            thumbnail_url: None,
        }
    }

    #[test]
    fn test_rank_filters_duration_bounds() {
        let ranked = rank_candidates(vec![
            candidate("short", 59, 1_000),
            candidate("min", 60, 10),
            candidate("max", 900, 20),
            candidate("long", 901, 5_000),
            candidate("unknown", 0, 9_999),
        ]);
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["max", "min"]);
    }

    #[test]
    fn test_rank_sorts_by_views_stably() {
        let ranked = rank_candidates(vec![
            candidate("a", 120, 5),
            candidate("b", 120, 50),
            candidate("c", 120, 5),
            candidate("d", 120, 0),
        ]);
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_parse_search_output() {
        let output = concat!(
            r#"{"id":"abc","title":"First","webpage_url":"https://www.youtube.com/watch?v=abc","duration":125.4,"view_count":1000,"thumbnail":"https://i.ytimg.com/abc.jpg"}"#,
            "\n",
            "not json\n",
            r#"{"id":"def","title":"Live","duration":null,"view_count":null}"#,
            "\n"
        );
        let candidates = parse_search_output(output);
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].duration_seconds, 125);
        assert_eq!(candidates[0].view_count, 1000);
        assert_eq!(
            candidates[0].thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/abc.jpg")
        );

        assert_eq!(candidates[1].duration_seconds, 0);
        assert_eq!(candidates[1].view_count, 0);
        assert_eq!(candidates[1].url, "https://www.youtube.com/watch?v=def");

        assert!(rank_candidates(candidates).iter().all(|c| c.id != "def"));
    }

    #[tokio::test]
    async fn test_empty_keyword_rejected() {
        assert!(search_videos("   ", 5).await.is_err());
    }
}
