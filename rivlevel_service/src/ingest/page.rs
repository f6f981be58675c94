/// Gauge page retrieval and document model.
///
/// A river page yields four things the pipeline needs: the gauge header
/// (`<h1 id=...>`), the HTML comments (one of which carries the generation
/// timestamp), the hydrograph image map whose `<area>` elements describe
/// individual readings in their `alt`/`title` text, and the tabular
/// observed/forecast sections.

use crate::ingest::annotations::RawAnnotation;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "rivlevel_service/0.1 (river level monitor)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to write raw page {path}: {source}")]
    Cache {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// One tabular section (`Observed`, `Forecast`) as a flat list of cell texts,
/// read in (datetime, level, flow) triples.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSection {
    pub name: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugePage {
    pub gauge_id: Option<String>,
    pub title: Option<String>,
    pub comments: Vec<String>,
    pub annotations: Vec<RawAnnotation>,
    pub sections: Vec<TableSection>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static HEADER: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static AREA: LazyLock<Selector> = LazyLock::new(|| selector("map area"));
static OBS_FORES: LazyLock<Selector> = LazyLock::new(|| selector(".obs_fores"));
static DATA_NAME: LazyLock<Selector> = LazyLock::new(|| selector(".data_name"));
static NAMES_INFOS: LazyLock<Selector> = LazyLock::new(|| selector(".names_infos"));

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_sections(document: &Html) -> Vec<TableSection> {
    let mut sections = Vec::new();
    for container in document.select(&OBS_FORES) {
        for block in container.children().filter_map(ElementRef::wrap) {
            let Some(name) = block
                .select(&DATA_NAME)
                .next()
                .map(element_text)
                .and_then(|text| text.split_whitespace().next().map(str::to_string))
            else {
                continue;
            };
            let cells = block.select(&NAMES_INFOS).map(element_text).collect();
            sections.push(TableSection { name, cells });
        }
    }
    sections
}

/// Parses a river page. Never fails: anything missing comes back empty.
pub fn parse_document(html: &str) -> GaugePage {
    let document = Html::parse_document(html);

    let header = document.select(&HEADER).next();
    let gauge_id = header.and_then(|h| h.value().attr("id")).map(str::to_string);
    let title = header.map(element_text).filter(|t| !t.is_empty());

    let comments = document
        .tree
        .values()
        .filter_map(|node| match node {
            Node::Comment(c) => Some(c.comment.to_string()),
            _ => None,
        })
        .collect();

    let annotations = document
        .select(&AREA)
        .map(|area| RawAnnotation {
            alt: area.value().attr("alt").map(str::to_string),
            title: area.value().attr("title").map(str::to_string),
        })
        .collect();

    GaugePage {
        gauge_id,
        title,
        comments,
        annotations,
        sections: read_sections(&document),
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Source of raw page HTML. The daemon only depends on this seam so tests
/// can serve canned pages.
pub trait PageFetcher {
    fn fetch_html(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(HttpPageFetcher { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text()?)
    }
}

/// File name for a cached raw page.
pub fn raw_cache_name(capture: DateTime<Utc>, gauge: &str) -> String {
    format!("{}_{}.rawhtml", capture.format("%Y-%m-%d_%H%M%SUTC"), gauge)
}

/// Keeps an exact copy of a fetched page for later replay.
pub fn cache_raw_html(
    dir: &Path,
    capture: DateTime<Utc>,
    gauge: &str,
    html: &str,
) -> Result<PathBuf, FetchError> {
    let path = dir.join(raw_cache_name(capture, gauge));
    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, html))
        .map_err(|source| FetchError::Cache {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}
