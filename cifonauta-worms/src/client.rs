//! WoRMS REST client
//!
//! Every request goes through [`AphiaClient::wire`], which retries
//! transient failures (connection errors, 5xx, 429) up to `max_attempts`
//! times. HTTP 204 is the service's "no match" answer and becomes `None`
//! or an empty list.

use crate::error::{Result, WormsError};
use crate::records::{AphiaRecord, Classification, Distribution, ExternalIdType, Source, Vernacular};
use chrono::{DateTime, SecondsFormat, Utc};
use cifonauta_common::config::WormsConfig;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = concat!("cifonauta/", env!("CARGO_PKG_VERSION"));

/// Names per request accepted by `AphiaRecordsByNames`
const RECORDS_BY_NAMES_LIMIT: usize = 500;
/// Names per request accepted by `AphiaRecordsByMatchNames`
const MATCH_NAMES_LIMIT: usize = 50;
/// Synonym hops followed by [`AphiaClient::best_match`]
const MAX_REDIRECTS: usize = 5;

/// WoRMS REST API client
pub struct AphiaClient {
    http_client: reqwest::Client,
    base_url: Url,
    max_attempts: u32,
    retry_delay: Duration,
}

impl AphiaClient {
    pub fn new(config: &WormsConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| WormsError::Parse(format!("base url {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(WormsError::Parse(format!(
                "base url {} cannot carry a path",
                config.base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WormsError::Network(e.to_string()))?;

        info!(base_url = %base_url, "WoRMS client ready");

        Ok(Self {
            http_client,
            base_url,
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Base pause between attempts; attempt `n` waits `n * delay`
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Perform a GET with retries
    async fn wire<T: DeserializeOwned>(&self, operation: &'static str, url: Url) -> Result<Option<T>> {
        let mut attempt = 1;
        loop {
            match self.fetch(&url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(operation, attempt, error = %e, "WoRMS request failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    error!(operation, attempts = attempt, error = %e, "Giving up on WoRMS request");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &Url) -> Result<Option<T>> {
        debug!(url = %url, "Querying WoRMS");

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| WormsError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(WormsError::NotFound(url.path().to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WormsError::Api(status.as_u16(), body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WormsError::Network(e.to_string()))?;
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| WormsError::Parse(e.to_string()))
    }

    /// AphiaID for an exact name
    ///
    /// `None` when nothing matches or the name is ambiguous.
    pub async fn aphia_id_by_name(&self, name: &str) -> Result<Option<i64>> {
        info!(name, "Searching AphiaID");
        let url = self.endpoint(&["AphiaIDByName", name]);
        let id: Option<i64> = self.wire("AphiaIDByName", url).await?;
        match id {
            Some(id) if id > 0 => Ok(Some(id)),
            Some(code) => {
                debug!(name, code, "Ambiguous or unknown name");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Records matching a name; `like` adds a trailing wildcard
    pub async fn records_by_name(&self, name: &str, like: bool) -> Result<Vec<AphiaRecord>> {
        info!(name, like, "Searching AphiaRecords");
        let mut url = self.endpoint(&["AphiaRecordsByName", name]);
        url.query_pairs_mut()
            .append_pair("like", bool_param(like))
            .append_pair("marine_only", "true");
        Ok(self.wire("AphiaRecordsByName", url).await?.unwrap_or_default())
    }

    pub async fn record_by_id(&self, aphia_id: i64) -> Result<Option<AphiaRecord>> {
        let url = self.endpoint(&["AphiaRecordByAphiaID", &aphia_id.to_string()]);
        self.wire("AphiaRecordByAphiaID", url).await
    }

    /// Current scientific name of an AphiaID
    pub async fn name_by_id(&self, aphia_id: i64) -> Result<Option<String>> {
        let url = self.endpoint(&["AphiaNameByAphiaID", &aphia_id.to_string()]);
        self.wire("AphiaNameByAphiaID", url).await
    }

    /// Full classification chain, including sub and super ranks
    pub async fn classification_by_id(&self, aphia_id: i64) -> Result<Option<Classification>> {
        let url = self.endpoint(&["AphiaClassificationByAphiaID", &aphia_id.to_string()]);
        self.wire("AphiaClassificationByAphiaID", url).await
    }

    /// Direct children
    pub async fn children_by_id(&self, aphia_id: i64) -> Result<Vec<AphiaRecord>> {
        let url = self.endpoint(&["AphiaChildrenByAphiaID", &aphia_id.to_string()]);
        Ok(self.wire("AphiaChildrenByAphiaID", url).await?.unwrap_or_default())
    }

    pub async fn synonyms_by_id(&self, aphia_id: i64) -> Result<Vec<AphiaRecord>> {
        let url = self.endpoint(&["AphiaSynonymsByAphiaID", &aphia_id.to_string()]);
        Ok(self.wire("AphiaSynonymsByAphiaID", url).await?.unwrap_or_default())
    }

    pub async fn vernaculars_by_id(&self, aphia_id: i64) -> Result<Vec<Vernacular>> {
        let url = self.endpoint(&["AphiaVernacularsByAphiaID", &aphia_id.to_string()]);
        Ok(self.wire("AphiaVernacularsByAphiaID", url).await?.unwrap_or_default())
    }

    pub async fn records_by_vernacular(&self, vernacular: &str, like: bool) -> Result<Vec<AphiaRecord>> {
        info!(vernacular, like, "Searching AphiaRecords by vernacular");
        let mut url = self.endpoint(&["AphiaRecordsByVernacular", vernacular]);
        url.query_pairs_mut().append_pair("like", bool_param(like));
        Ok(self.wire("AphiaRecordsByVernacular", url).await?.unwrap_or_default())
    }

    pub async fn record_by_external_id(
        &self,
        external_id: &str,
        id_type: ExternalIdType,
    ) -> Result<Option<AphiaRecord>> {
        let mut url = self.endpoint(&["AphiaRecordByExternalID", external_id]);
        url.query_pairs_mut().append_pair("type", id_type.as_str());
        self.wire("AphiaRecordByExternalID", url).await
    }

    pub async fn external_id_by_id(
        &self,
        aphia_id: i64,
        id_type: ExternalIdType,
    ) -> Result<Vec<String>> {
        let mut url = self.endpoint(&["AphiaExternalIDByAphiaID", &aphia_id.to_string()]);
        url.query_pairs_mut().append_pair("type", id_type.as_str());
        Ok(self.wire("AphiaExternalIDByAphiaID", url).await?.unwrap_or_default())
    }

    /// Records for each name, in input order
    ///
    /// Large inputs are split into several requests.
    pub async fn records_by_names(&self, names: &[&str], like: bool) -> Result<Vec<Vec<AphiaRecord>>> {
        let mut results = Vec::with_capacity(names.len());
        for chunk in names.chunks(RECORDS_BY_NAMES_LIMIT) {
            let mut url = self.endpoint(&["AphiaRecordsByNames"]);
            {
                let mut query = url.query_pairs_mut();
                for name in chunk {
                    query.append_pair("scientificnames[]", name);
                }
                query
                    .append_pair("like", bool_param(like))
                    .append_pair("marine_only", "true");
            }
            let batch: Vec<Vec<AphiaRecord>> =
                self.wire("AphiaRecordsByNames", url).await?.unwrap_or_default();
            results.extend(pad(batch, chunk.len()));
        }
        Ok(results)
    }

    /// Fuzzy (TAXAMATCH) records for each name, in input order
    pub async fn match_records_by_names(&self, names: &[&str]) -> Result<Vec<Vec<AphiaRecord>>> {
        let mut results = Vec::with_capacity(names.len());
        for chunk in names.chunks(MATCH_NAMES_LIMIT) {
            let mut url = self.endpoint(&["AphiaRecordsByMatchNames"]);
            {
                let mut query = url.query_pairs_mut();
                for name in chunk {
                    query.append_pair("scientificnames[]", name);
                }
                query.append_pair("marine_only", "true");
            }
            let batch: Vec<Vec<AphiaRecord>> =
                self.wire("AphiaRecordsByMatchNames", url).await?.unwrap_or_default();
            results.extend(pad(batch, chunk.len()));
        }
        Ok(results)
    }

    pub async fn distributions_by_id(&self, aphia_id: i64) -> Result<Vec<Distribution>> {
        let url = self.endpoint(&["AphiaDistributionsByAphiaID", &aphia_id.to_string()]);
        Ok(self.wire("AphiaDistributionsByAphiaID", url).await?.unwrap_or_default())
    }

    pub async fn sources_by_id(&self, aphia_id: i64) -> Result<Vec<Source>> {
        let url = self.endpoint(&["SourcesByAphiaID", &aphia_id.to_string()]);
        Ok(self.wire("SourcesByAphiaID", url).await?.unwrap_or_default())
    }

    /// Records added or modified in a time window, one page (`offset`
    /// starts at 1)
    pub async fn records_by_date(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        offset: u32,
    ) -> Result<Vec<AphiaRecord>> {
        let mut url = self.endpoint(&["AphiaRecordsByDate"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("startdate", &start.to_rfc3339_opts(SecondsFormat::Secs, true));
            if let Some(end) = end {
                query.append_pair("enddate", &end.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            query
                .append_pair("marine_only", "true")
                .append_pair("offset", &offset.max(1).to_string());
        }
        Ok(self.wire("AphiaRecordsByDate", url).await?.unwrap_or_default())
    }

    /// First accepted record for a name
    ///
    /// Synonyms and alternate representations are followed through their
    /// `valid_name`, a bounded number of times.
    pub async fn best_match(&self, name: &str) -> Result<Option<AphiaRecord>> {
        let mut query = name.trim().to_string();

        for _ in 0..=MAX_REDIRECTS {
            let records = self.records_by_name(&query, false).await?;

            if let Some(accepted) = records.iter().find(|r| r.is_accepted()) {
                return Ok(Some(accepted.clone()));
            }

            let next = records
                .iter()
                .find_map(|r| r.redirect_name())
                .map(str::to_string);
            match next {
                Some(valid) if valid != query => {
                    debug!(from = %query, to = %valid, "Following valid name");
                    query = valid;
                }
                _ => return Ok(None),
            }
        }

        warn!(name, "Too many synonym hops, no accepted record");
        Ok(None)
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Keep one entry per requested name even if the service answers short
fn pad(mut batch: Vec<Vec<AphiaRecord>>, len: usize) -> Vec<Vec<AphiaRecord>> {
    batch.resize_with(len, Vec::new);
    batch
}
