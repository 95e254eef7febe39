use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::TableConfig;

/// One row of a remote table, fields are whatever the service returned.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TableRow {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl TableRow {
    /// Only string fields count, anything else reads as missing.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Read access to a remote, paginated table.
pub trait TableService: Send + Sync {
    /// Calls `on_page` once per page, in order, until the table is exhausted.
    /// Pages already delivered stay delivered if a later one fails.
    fn each_page(&self, table: &str, on_page: &mut dyn FnMut(Vec<TableRow>)) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ListRecordsPage {
    records: Vec<TableRow>,
    offset: Option<String>,
}

// Airtable's "list records" endpoint:
// https://airtable.com/developers/web/api/list-records
pub struct AirtableClient {
    client: Client,
    endpoint_url: String,
    api_key: String,
    base_id: String,
    page_size: u32,
}

impl AirtableClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(config: &TableConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(AirtableClient {
            client,
            endpoint_url: config.endpoint_url.clone(),
            api_key: config.api_key.clone(),
            base_id: config.base_id.clone(),
            page_size: config.page_size,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint_url)
            .with_context(|| format!("invalid endpoint url: {}", self.endpoint_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("endpoint url cannot be a base: {}", self.endpoint_url))?
            .pop_if_empty()
            .extend(["v0", self.base_id.as_str(), table]);
        Ok(url)
    }

    fn fetch_page(&self, url: &Url, offset: Option<&str>) -> Result<ListRecordsPage> {
        let mut query = vec![("pageSize", self.page_size.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let page = self
            .client
            .get(url.clone())
            .bearer_auth(&self.api_key)
            .query(&query)
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("request to {} failed", url))?
            .json::<ListRecordsPage>()
            .context("unexpected list records response")?;
        Ok(page)
    }
}

impl TableService for AirtableClient {
    fn each_page(&self, table: &str, on_page: &mut dyn FnMut(Vec<TableRow>)) -> Result<()> {
        let url = self.table_url(table)?;
        let mut offset: Option<String> = None;
        let mut page_count = 0;
        loop {
            let page = self.fetch_page(&url, offset.as_deref())?;
            page_count += 1;
            debug!("page {} of `{}`: {} rows", page_count, table, page.records.len());
            on_page(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(())
    }
}
