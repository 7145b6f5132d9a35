//! Domain extractors: search-engine result pages and job-board listings.
//!
//! Extraction runs against the current page using per-engine selector
//! tables; the save variants persist one text file per record under the
//! output directory (`Title:` / `URL:` / `Snippet:`-style lines).

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::RelayServer;
use super::support::{eval_json, internal, script_with_options};
use crate::capture::{Detail, opt_usize};
use crate::envelope::error::ToolError;
use crate::relay::{Relay, page_url_or_blank};

/// Per-engine selector tables for search result pages. DuckDuckGo uses
/// article elements with data-testid="result"; the title link carries the
/// URL in all three engines.
const SEARCH_ENGINES: &[(&str, &str, &str, &str)] = &[
    // (engine, result selector, title/link selector, snippet selector)
    ("duckduckgo", "article[data-testid='result']", "h2 > a", "div[data-result='snippet']"),
    ("google", "div.g", "h3", "div[data-sncf], div[style*='-webkit-line-clamp']"),
    ("bing", "li.b_algo", "h2 > a", ".b_caption p"),
];

const SEARCH_EXTRACT_JS: &str = r#"
(opts) => {
  const results = [];
  for (const node of document.querySelectorAll(opts.resultSelector)) {
    if (results.length >= opts.maxResults) break;
    const titleEl = node.querySelector(opts.titleSelector);
    if (!titleEl) continue;
    const linkEl = titleEl.closest('a') || titleEl.querySelector('a') || node.querySelector('a[href]');
    const snippetEl = node.querySelector(opts.snippetSelector);
    const href = linkEl ? linkEl.href : null;
    if (!href || !href.startsWith('http')) continue;
    results.push({
      rank: results.length + 1,
      title: (titleEl.innerText || '').trim().slice(0, 300),
      url: href,
      snippet: snippetEl ? (snippetEl.innerText || '').trim().slice(0, opts.maxSnippetChars) : '',
    });
  }
  return { results };
}
"#;

/// Job cards vary wildly between boards; the table lists container
/// candidates tried in order, with link + title resolved inside each card.
const JOBS_EXTRACT_JS: &str = r#"
(opts) => {
  const candidates = [
    '[data-job-id]', '[data-jk]', 'li[data-occludable-job-id]',
    'article[class*="job"]', 'div[class*="job-card"]', 'li[class*="job"]',
    'div[class*="JobCard"]', 'a[class*="job"]',
  ];
  let cards = [];
  for (const sel of candidates) {
    cards = Array.from(document.querySelectorAll(sel));
    if (cards.length >= 3) break;
  }
  const listings = [];
  const seen = new Set();
  for (const card of cards) {
    if (listings.length >= opts.maxListings) break;
    const link = card.matches('a[href]') ? card : card.querySelector('a[href]');
    if (!link || !link.href || !link.href.startsWith('http')) continue;
    if (seen.has(link.href)) continue;
    seen.add(link.href);
    const titleEl = card.querySelector('h1, h2, h3, h4, [class*="title"]') || link;
    const title = (titleEl.innerText || '').trim().split('\n')[0].slice(0, 200);
    if (!title) continue;
    const company = card.querySelector('[class*="company"], [class*="Company"], [data-testid*="company"]');
    const location = card.querySelector('[class*="location"], [class*="Location"]');
    listings.push({
      title,
      url: link.href,
      company: company ? (company.innerText || '').trim().slice(0, 120) : null,
      location: location ? (location.innerText || '').trim().slice(0, 120) : null,
      summary: (card.innerText || '').trim().replace(/\s+/g, ' ').slice(0, opts.maxSummaryChars),
    });
  }
  return { listings };
}
"#;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchExtractArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    /// duckduckgo | google | bing; auto-detected from the URL by default.
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub max_results: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchSaveArgs {
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub max_results: Option<u64>,
    /// Directory under the output directory (default "search").
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobsExtractArgs {
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub max_listings: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobsSaveArgs {
    #[serde(default)]
    pub max_listings: Option<u64>,
    /// Directory under the output directory (default "jobs").
    #[serde(default)]
    pub directory: Option<String>,
}

fn engine_table(engine: &str) -> Option<(&'static str, &'static str, &'static str, &'static str)> {
    SEARCH_ENGINES.iter().copied().find(|(name, ..)| *name == engine)
}

fn detect_engine(url: &str) -> &'static str {
    if url.contains("duckduckgo.") {
        "duckduckgo"
    } else if url.contains("bing.") {
        "bing"
    } else {
        "google"
    }
}

async fn extract_search(
    relay: &Relay,
    engine: Option<&str>,
    max_results: usize,
    max_snippet_chars: usize,
) -> Result<(String, Vec<Value>), ToolError> {
    let (_page_id, page) = relay.ensure_page().await?;
    let url = page_url_or_blank(&page).await;
    let engine = engine.map(str::to_string).unwrap_or_else(|| detect_engine(&url).to_string());
    let (name, result_sel, title_sel, snippet_sel) = engine_table(&engine)
        .ok_or_else(|| ToolError::not_found(format!("unknown search engine '{engine}'")))?;

    let script_opts = json!({
        "resultSelector": result_sel,
        "titleSelector": title_sel,
        "snippetSelector": snippet_sel,
        "maxResults": max_results,
        "maxSnippetChars": max_snippet_chars,
    });
    let raw = eval_json(&page, &script_with_options(SEARCH_EXTRACT_JS, &script_opts)).await?;
    let results = raw["results"].as_array().cloned().unwrap_or_default();
    Ok((name.to_string(), results))
}

async fn extract_jobs(
    relay: &Relay,
    max_listings: usize,
    max_summary_chars: usize,
) -> Result<Vec<Value>, ToolError> {
    let (_page_id, page) = relay.ensure_page().await?;
    let script_opts = json!({
        "maxListings": max_listings,
        "maxSummaryChars": max_summary_chars,
    });
    let raw = eval_json(&page, &script_with_options(JOBS_EXTRACT_JS, &script_opts)).await?;
    Ok(raw["listings"].as_array().cloned().unwrap_or_default())
}

/// Write one `Title:` / `URL:` / body-line text file per record.
async fn save_records(
    relay: &Relay,
    directory: &str,
    records: &[Value],
    body_key: &str,
    body_label: &str,
) -> Result<Vec<String>, ToolError> {
    let base = relay.config.output_dir.join(directory);
    let mut saved = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let title = record["title"].as_str().unwrap_or("untitled");
        let file_name = format!(
            "{:03}-{}.txt",
            index + 1,
            sanitize_filename::sanitize(title).chars().take(80).collect::<String>()
        );
        let path = base.join(&file_name);
        let target = relay.security.resolve_write(&path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(internal)?;
        }
        let body = format!(
            "Title: {}\nURL: {}\n{}: {}\n",
            title,
            record["url"].as_str().unwrap_or(""),
            body_label,
            record[body_key].as_str().unwrap_or(""),
        );
        tokio::fs::write(&target, body).await.map_err(internal)?;
        saved.push(target.display().to_string());
    }
    Ok(saved)
}

#[tool_router(router = extract_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(
        name = "search.extract_results",
        description = "Extract ranked results (title, URL, snippet) from the search results page currently open."
    )]
    pub async fn search_extract_results(
        &self,
        Parameters(args): Parameters<SearchExtractArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("search.extract_results", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(v) = args.max_results {
                overrides.insert("maxResults".into(), json!(v));
            }
            let options = relay.options("search.extract_results", detail, &overrides);
            let (engine, results) = extract_search(
                &relay,
                args.engine.as_deref(),
                opt_usize(&options, "maxResults", 10),
                opt_usize(&options, "maxSnippetChars", 200),
            )
            .await?;
            Ok(json!({
                "engine": engine,
                "count": results.len(),
                "results": results,
            }))
        })
        .await
    }

    #[tool(
        name = "search.save_results",
        description = "Extract search results and persist one text file per result under the output directory."
    )]
    pub async fn search_save_results(
        &self,
        Parameters(args): Parameters<SearchSaveArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("search.save_results", async |relay| {
            let (engine, results) = extract_search(
                &relay,
                args.engine.as_deref(),
                args.max_results.unwrap_or(20) as usize,
                400,
            )
            .await?;
            if results.is_empty() {
                return Err(ToolError::not_found(
                    "no search results found on the current page",
                ));
            }
            let directory = args.directory.as_deref().unwrap_or("search");
            let saved = save_records(&relay, directory, &results, "snippet", "Snippet").await?;
            Ok(json!({
                "engine": engine,
                "count": saved.len(),
                "files": saved,
            }))
        })
        .await
    }

    #[tool(
        name = "jobs.extract_listings",
        description = "Extract job listings (title, URL, company, location, summary) from the job-board page currently open."
    )]
    pub async fn jobs_extract_listings(
        &self,
        Parameters(args): Parameters<JobsExtractArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("jobs.extract_listings", async |relay| {
            let detail = args.detail.unwrap_or_default();
            let mut overrides = Map::new();
            if let Some(v) = args.max_listings {
                overrides.insert("maxListings".into(), json!(v));
            }
            let options = relay.options("jobs.extract_listings", detail, &overrides);
            let listings = extract_jobs(
                &relay,
                opt_usize(&options, "maxListings", 20),
                opt_usize(&options, "maxSummaryChars", 240),
            )
            .await?;
            Ok(json!({ "count": listings.len(), "listings": listings }))
        })
        .await
    }

    #[tool(
        name = "jobs.save_listings",
        description = "Extract job listings and persist one text file per listing under the output directory."
    )]
    pub async fn jobs_save_listings(
        &self,
        Parameters(args): Parameters<JobsSaveArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("jobs.save_listings", async |relay| {
            let listings =
                extract_jobs(&relay, args.max_listings.unwrap_or(40) as usize, 600).await?;
            if listings.is_empty() {
                return Err(ToolError::not_found(
                    "no job listings found on the current page",
                ));
            }
            let directory = args.directory.as_deref().unwrap_or("jobs");
            let saved = save_records(&relay, directory, &listings, "summary", "Summary").await?;
            Ok(json!({ "count": saved.len(), "files": saved }))
        })
        .await
    }
}
