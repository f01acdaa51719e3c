use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::api::{BlogSearch, MAX_PAGE_SIZE, MAX_START_OFFSET};
use crate::clean::NAME_COLUMN;
use crate::table::{self, AppendWriter};
use crate::text::clean_html;

/// Output schema for collected reviews, one row per (library, post).
pub const REVIEW_HEADERS: [&str; 6] = [
    "도서관명",
    "블로그제목",
    "블로그내용",
    "블로그링크",
    "블로그이름",
    "포스팅날짜",
];

const SORT_MODE: &str = "sim";

#[derive(Debug, Clone)]
pub struct Review {
    pub library: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub blogger: String,
    pub postdate: String,
}

/// Knobs for one batch run. The delays are courtesy pacing for the API,
/// not driven by provider feedback.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub reviews_per_library: usize,
    pub page_delay: Duration,
    pub library_delay: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            reviews_per_library: 5,
            page_delay: Duration::from_millis(500),
            library_delay: Duration::from_millis(1000),
        }
    }
}

/// Gather up to `max_reviews` blog posts for one library, paging through
/// results until the provider runs dry or the offset ceiling is reached.
///
/// A failed page fetch ends collection for this library as if exhausted;
/// the distinction only survives in the logs.
pub async fn collect_reviews(
    client: &impl BlogSearch,
    library: &str,
    max_reviews: usize,
    page_delay: Duration,
) -> Vec<Review> {
    let query = format!("{} 도서관", library);
    let display = MAX_PAGE_SIZE.min(max_reviews);

    let mut reviews = Vec::new();
    let mut start = 1usize;

    while reviews.len() < max_reviews {
        let Some(page) = client.search(&query, display, start, SORT_MODE).await else {
            break;
        };
        if page.items.is_empty() {
            break;
        }

        for item in page.items {
            reviews.push(Review {
                library: library.to_string(),
                title: clean_html(&item.title),
                description: clean_html(&item.description),
                link: item.link,
                blogger: item.bloggername,
                postdate: item.postdate,
            });
            if reviews.len() >= max_reviews {
                break;
            }
        }

        start += display;
        if reviews.len() >= max_reviews {
            break;
        }
        if start > MAX_START_OFFSET {
            info!(
                "offset ceiling reached for '{}' with {} reviews collected",
                query,
                reviews.len()
            );
            break;
        }
        tokio::time::sleep(page_delay).await;
    }

    reviews
}

/// Library names from a cleaned table, in input order.
pub fn load_libraries(path: &Path) -> Result<Vec<String>> {
    let table = table::read_table(path)?;
    let idx = table
        .column_index(NAME_COLUMN)
        .ok_or_else(|| anyhow!("'{}' column missing from {}", NAME_COLUMN, path.display()))?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| row.get(idx))
        .filter(|name| !name.is_empty())
        .cloned()
        .collect())
}

/// Names already present in the output file. Any read failure means a
/// fresh start, never an abort.
fn load_processed(path: &Path) -> HashSet<String> {
    if !path.exists() {
        return HashSet::new();
    }
    let table = match table::read_table(path) {
        Ok(table) => table,
        Err(e) => {
            warn!("could not read existing output {}: {}; starting fresh", path.display(), e);
            return HashSet::new();
        }
    };
    let Some(idx) = table.column_index(NAME_COLUMN) else {
        warn!("existing output {} has no name column; starting fresh", path.display());
        return HashSet::new();
    };
    let names: HashSet<String> = table
        .rows
        .iter()
        .filter_map(|row| row.get(idx))
        .filter(|name| !name.is_empty())
        .cloned()
        .collect();
    info!("{} libraries already present in {}", names.len(), path.display());
    names
}

/// Walk every library in order, collecting reviews and appending them to
/// the output file. Already-present libraries are skipped without an API
/// call. Returns the number of newly written rows.
pub async fn collect_all(
    client: &impl BlogSearch,
    libraries: &[String],
    output: &Path,
    config: &CollectorConfig,
) -> Result<usize> {
    let processed = load_processed(output);
    let mut writer = AppendWriter::open(output, &REVIEW_HEADERS)?;

    let pb = ProgressBar::new(libraries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut written = 0usize;
    for (i, library) in libraries.iter().enumerate() {
        if processed.contains(library) {
            pb.inc(1);
            continue;
        }

        pb.set_message(library.clone());
        let reviews =
            collect_reviews(client, library, config.reviews_per_library, config.page_delay).await;

        // Each row hits the disk before the next request goes out.
        for review in &reviews {
            writer.append(&[
                &review.library,
                &review.title,
                &review.description,
                &review.link,
                &review.blogger,
                &review.postdate,
            ])?;
            written += 1;
        }

        if (i + 1) % 10 == 0 {
            info!(
                "{}/{} libraries visited, {} rows written",
                i + 1,
                libraries.len(),
                written
            );
        }
        pb.inc(1);
        tokio::time::sleep(config.library_delay).await;
    }

    pb.finish_and_clear();
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BlogItem, SearchResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted provider: serves one canned page per request, then `None`.
    struct ScriptedSearch {
        pages: Mutex<VecDeque<Option<SearchResponse>>>,
        starts: Mutex<Vec<usize>>,
    }

    impl ScriptedSearch {
        fn new(pages: Vec<Option<SearchResponse>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                starts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.starts.lock().unwrap().len()
        }
    }

    impl BlogSearch for ScriptedSearch {
        async fn search(
            &self,
            _query: &str,
            _display: usize,
            start: usize,
            _sort: &str,
        ) -> Option<SearchResponse> {
            self.starts.lock().unwrap().push(start);
            self.pages.lock().unwrap().pop_front().flatten()
        }
    }

    fn page(items: usize) -> Option<SearchResponse> {
        Some(SearchResponse {
            items: (0..items)
                .map(|i| BlogItem {
                    title: format!("<b>포스트 {}</b>", i),
                    description: "한 줄 &quot;감상&quot;".to_string(),
                    link: format!("https://blog.example/{}", i),
                    bloggername: "블로거".to_string(),
                    postdate: "20240101".to_string(),
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn single_page_satisfies_request() {
        let provider = ScriptedSearch::new(vec![page(5)]);
        let reviews = collect_reviews(&provider, "중앙도서관", 5, Duration::ZERO).await;
        assert_eq!(reviews.len(), 5);
        assert_eq!(provider.calls(), 1);
        assert_eq!(reviews[0].library, "중앙도서관");
        assert_eq!(reviews[0].title, "포스트 0");
        assert_eq!(reviews[0].description, "한 줄 \"감상\"");
    }

    #[tokio::test]
    async fn empty_first_page_returns_nothing() {
        let provider = ScriptedSearch::new(vec![page(0)]);
        let reviews = collect_reviews(&provider, "없는도서관", 5, Duration::ZERO).await;
        assert!(reviews.is_empty());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn transport_failure_ends_collection() {
        let provider = ScriptedSearch::new(vec![None]);
        let reviews = collect_reviews(&provider, "중앙도서관", 5, Duration::ZERO).await;
        assert!(reviews.is_empty());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn short_page_triggers_another_request() {
        let provider = ScriptedSearch::new(vec![page(3), page(3)]);
        let reviews = collect_reviews(&provider, "구립도서관", 5, Duration::ZERO).await;
        assert_eq!(reviews.len(), 5);
        assert_eq!(provider.calls(), 2);
        // second request starts past the first page
        assert_eq!(provider.starts.lock().unwrap()[1], 6);
    }

    #[tokio::test]
    async fn offset_never_passes_the_ceiling() {
        let provider = ScriptedSearch::new((0..20).map(|_| page(100)).collect());
        let reviews = collect_reviews(&provider, "인기도서관", 5000, Duration::ZERO).await;
        assert_eq!(reviews.len(), 1000);
        assert_eq!(provider.calls(), 10);
        assert_eq!(*provider.starts.lock().unwrap().last().unwrap(), 901);
    }

    #[tokio::test]
    async fn resume_skips_processed_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("reviews.csv");
        {
            let mut writer = AppendWriter::open(&output, &REVIEW_HEADERS).unwrap();
            writer
                .append(&["기존도서관", "제목", "내용", "링크", "블로거", "20240101"])
                .unwrap();
        }

        let provider = ScriptedSearch::new(vec![page(2)]);
        let config = CollectorConfig {
            reviews_per_library: 2,
            page_delay: Duration::ZERO,
            library_delay: Duration::ZERO,
        };
        let libraries = vec!["기존도서관".to_string(), "신규도서관".to_string()];

        let written = collect_all(&provider, &libraries, &output, &config).await.unwrap();
        assert_eq!(written, 2);
        // no request was ever issued for the already-present library
        assert_eq!(provider.calls(), 1);

        let table = table::read_table(&output).unwrap();
        assert_eq!(table.rows.len(), 3);
        let new_rows = table.rows.iter().filter(|r| r[0] == "신규도서관").count();
        assert_eq!(new_rows, 2);
    }

    #[tokio::test]
    async fn fresh_output_gets_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("reviews.csv");

        let provider = ScriptedSearch::new(vec![page(1)]);
        let config = CollectorConfig {
            reviews_per_library: 1,
            page_delay: Duration::ZERO,
            library_delay: Duration::ZERO,
        };
        let libraries = vec!["새도서관".to_string()];

        let written = collect_all(&provider, &libraries, &output, &config).await.unwrap();
        assert_eq!(written, 1);

        let table = table::read_table(&output).unwrap();
        assert_eq!(table.headers, REVIEW_HEADERS.to_vec());
        assert_eq!(table.rows[0][0], "새도서관");
        assert_eq!(table.rows[0][1], "포스트 0");
    }
}
