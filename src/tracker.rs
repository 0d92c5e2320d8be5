//! Issue-tracker access: released versions and fixed bug tickets.

use chrono::NaiveDate;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MinerError, Result};
use crate::model::{Issue, ReleaseName};

pub const DEFAULT_JIRA_URL: &str = "https://issues.apache.org/jira";
const PAGE_SIZE: usize = 100;

/// The issue-tracker queries the miner relies on
pub trait IssueTracker {
    /// Released versions ordered by release date
    fn released_versions(&self) -> Result<Vec<(ReleaseName, NaiveDate)>>;

    /// Every bug ticket resolved as fixed
    fn fixed_bugs(&self) -> Result<Vec<Issue>>;
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    name: String,
    #[serde(default)]
    released: bool,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<IssueEntry>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct IssueEntry {
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    created: String,
    resolutiondate: Option<String>,
    #[serde(default)]
    versions: Vec<VersionName>,
}

#[derive(Debug, Deserialize)]
struct VersionName {
    name: String,
}

/// Jira timestamps are `YYYY-MM-DDThh:mm:ss.sss+zzzz`; only the day is kept.
fn parse_day(timestamp: &str) -> Result<NaiveDate> {
    let day = timestamp.get(..10).unwrap_or(timestamp);
    Ok(NaiveDate::parse_from_str(day, "%Y-%m-%d")?)
}

/// Jira REST client for one project
pub struct JiraClient {
    base_url: String,
    project: String,
    client: Client,
    page_size: usize,
}

impl JiraClient {
    pub fn new(base_url: &str, project: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            client: Client::new(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn jql(&self) -> String {
        format!(
            "project = \"{}\" AND issuetype = Bug AND status in (Resolved, Closed) \
             AND resolution = Fixed ORDER BY created ASC",
            self.project
        )
    }

    fn decode<R: DeserializeOwned>(response: Response, what: &str) -> Result<R> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(MinerError::Tracker(format!("jira {what} failed ({status}): {body}")));
        }
        serde_json::from_str(&body)
            .map_err(|err| MinerError::Tracker(format!("malformed jira {what} response: {err}")))
    }

    fn search_page(&self, start_at: usize) -> Result<SearchResponse> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[
                ("jql", self.jql()),
                ("fields", "created,resolutiondate,versions".to_string()),
                ("startAt", start_at.to_string()),
                ("maxResults", self.page_size.to_string()),
            ])
            .send()?;
        Self::decode(response, "search")
    }
}

impl IssueTracker for JiraClient {
    fn released_versions(&self) -> Result<Vec<(ReleaseName, NaiveDate)>> {
        let url = format!("{}/rest/api/2/project/{}", self.base_url, self.project);
        let response = self.client.get(url).send()?;
        let project: ProjectResponse = Self::decode(response, "project lookup")?;

        let mut versions = Vec::new();
        for version in project.versions {
            match (version.released, version.release_date) {
                (true, Some(date)) => versions.push((version.name, parse_day(&date)?)),
                _ => debug!(version = %version.name, "Skipping unreleased version"),
            }
        }
        versions.sort_by_key(|(_, date)| *date);

        info!(project = %self.project, versions = versions.len(), "Fetched released versions");
        Ok(versions)
    }

    fn fixed_bugs(&self) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut start_at = 0;

        loop {
            let page = self.search_page(start_at)?;
            let fetched = page.issues.len();
            debug!(start_at, fetched, total = page.total, "Fetched ticket page");

            for entry in page.issues {
                let Some(resolved) = entry.fields.resolutiondate.as_deref() else {
                    debug!(ticket = %entry.key, "Skipping ticket without resolution date");
                    continue;
                };
                issues.push(Issue {
                    opened: parse_day(&entry.fields.created)?,
                    fixed: parse_day(resolved)?,
                    affected_versions: entry.fields.versions.into_iter().map(|v| v.name).collect(),
                    key: entry.key,
                });
            }

            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        info!(project = %self.project, tickets = issues.len(), "Fetched fixed bugs");
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn released_versions_are_filtered_and_sorted() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rest/api/2/project/PROJ");
            then.status(200).json_body(json!({
                "key": "PROJ",
                "versions": [
                    { "name": "1.1", "released": true, "releaseDate": "2020-06-01" },
                    { "name": "2.0", "released": false, "releaseDate": "2021-01-01" },
                    { "name": "0.9", "released": true },
                    { "name": "1.0", "released": true, "releaseDate": "2020-01-01" }
                ]
            }));
        });

        let client = JiraClient::new(&server.url(""), "PROJ");
        let versions = client.released_versions().unwrap();

        mock.assert();
        assert_eq!(
            versions,
            vec![("1.0".to_string(), date(2020, 1, 1)), ("1.1".to_string(), date(2020, 6, 1))]
        );
    }

    #[test]
    fn fixed_bugs_are_paged() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/api/2/search")
                .query_param("startAt", "0")
                .query_param("maxResults", "2");
            then.status(200).json_body(json!({
                "startAt": 0,
                "total": 3,
                "issues": [
                    {
                        "key": "PROJ-1",
                        "fields": {
                            "created": "2020-02-01T10:00:00.000+0000",
                            "resolutiondate": "2020-07-01T08:30:00.000+0000",
                            "versions": [{ "name": "1.0" }]
                        }
                    },
                    {
                        "key": "PROJ-2",
                        "fields": {
                            "created": "2020-03-01T10:00:00.000+0000",
                            "resolutiondate": null,
                            "versions": []
                        }
                    }
                ]
            }));
        });
        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/rest/api/2/search")
                .query_param("startAt", "2");
            then.status(200).json_body(json!({
                "startAt": 2,
                "total": 3,
                "issues": [
                    {
                        "key": "PROJ-3",
                        "fields": {
                            "created": "2020-04-01T10:00:00.000+0000",
                            "resolutiondate": "2020-04-02T10:00:00.000+0000"
                        }
                    }
                ]
            }));
        });

        let client = JiraClient::new(&server.url(""), "PROJ").with_page_size(2);
        let bugs = client.fixed_bugs().unwrap();

        first.assert();
        second.assert();
        assert_eq!(bugs.len(), 2);
        assert_eq!(bugs[0].key, "PROJ-1");
        assert_eq!(bugs[0].opened, date(2020, 2, 1));
        assert_eq!(bugs[0].fixed, date(2020, 7, 1));
        assert_eq!(bugs[0].affected_versions, vec!["1.0".to_string()]);
        assert_eq!(bugs[1].key, "PROJ-3");
        assert!(bugs[1].affected_versions.is_empty());
    }

    #[test]
    fn http_errors_surface_as_tracker_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rest/api/2/project/NOPE");
            then.status(404).body("No project could be found with key 'NOPE'.");
        });

        let client = JiraClient::new(&server.url(""), "NOPE");
        let err = client.released_versions().unwrap_err();

        match err {
            MinerError::Tracker(message) => assert!(message.contains("404")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn timestamps_keep_only_the_day() {
        assert_eq!(parse_day("2020-07-01T23:59:00.000+0000").unwrap(), date(2020, 7, 1));
        assert_eq!(parse_day("2020-07-01").unwrap(), date(2020, 7, 1));
        assert!(parse_day("July 1st").is_err());
    }
}
