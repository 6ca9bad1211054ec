//! Download of `workflow.json` files.

use crate::kudu::{KuduClient, VfsResponse};
use crate::lister::WorkflowFolder;
use crate::snapshot::{WorkflowEntry, WorkflowFailure};
use crate::{BackupError, Result};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Results of fetching every candidate folder.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Parsed workflows, in candidate order
    pub entries: Vec<WorkflowEntry>,
    /// Folders that turned out not to be workflows (404), or whose workflow
    /// name was already taken by an earlier folder
    pub skipped: Vec<WorkflowFolder>,
    /// Workflows that could not be fetched or parsed
    pub failures: Vec<WorkflowFailure>,
}

/// Fetches one folder's `workflow.json`.
///
/// Returns `Ok(None)` when the folder has no `workflow.json` (HTTP 404).
///
/// # Errors
///
/// - [`BackupError::Fetch`]: any other non-2xx status after retries, or a
///   transport failure
/// - [`BackupError::MalformedWorkflow`]: the body is not a JSON object
pub async fn fetch_workflow(
    kudu: &KuduClient,
    folder: &WorkflowFolder,
) -> Result<Option<WorkflowEntry>> {
    let body = match kudu.get_file(&folder.definition_path()).await {
        Ok(VfsResponse::Found(body)) => body,
        Ok(VfsResponse::NotFound) => return Ok(None),
        Ok(VfsResponse::Failed(status)) => {
            return Err(BackupError::fetch(&folder.name, format!("HTTP {}", status)));
        }
        Err(e) => return Err(BackupError::fetch(&folder.name, e.to_string())),
    };

    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(definition)) => Ok(Some(WorkflowEntry {
            name: folder.name.clone(),
            path: folder.path.clone(),
            definition,
        })),
        Ok(_) => Err(BackupError::malformed(
            &folder.name,
            "workflow.json is not a JSON object",
        )),
        Err(e) => Err(BackupError::malformed(&folder.name, e.to_string())),
    }
}

/// Fetches all folders with at most `concurrency` requests in flight.
///
/// Per-workflow errors are collected into the report; this never fails as a
/// whole. Output order follows `folders`. When several folders with the
/// same workflow name have a `workflow.json`, the first one wins and the
/// rest are reported as skipped.
pub async fn fetch_all(
    kudu: &KuduClient,
    folders: &[WorkflowFolder],
    concurrency: usize,
) -> FetchReport {
    let outcomes: Vec<_> = stream::iter(folders)
        .map(|folder| async move { (folder, fetch_workflow(kudu, folder).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut report = FetchReport::default();
    let mut names = HashSet::new();
    for (folder, outcome) in outcomes {
        match outcome {
            Ok(Some(entry)) if !names.insert(entry.name.clone()) => {
                debug!(path = %folder.path, "workflow name already backed up, skipping folder");
                report.skipped.push(folder.clone());
            }
            Ok(Some(entry)) => {
                debug!(workflow = %entry.name, "workflow fetched");
                report.entries.push(entry);
            }
            Ok(None) => {
                debug!(path = %folder.path, "no workflow.json, skipping folder");
                report.skipped.push(folder.clone());
            }
            Err(err) => {
                warn!(workflow = %folder.name, error = %err, "workflow not backed up");
                report
                    .failures
                    .push(WorkflowFailure::new(&folder.name, &folder.path, &err));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::PublishingCredentials;
    use crate::retry::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn kudu(server: &MockServer) -> KuduClient {
        KuduClient::new(
            reqwest::Client::new(),
            RetryPolicy::new(2, Duration::from_millis(1)),
            server.uri(),
            PublishingCredentials::new("$site", "pw"),
        )
    }

    async fn mount(server: &MockServer, at: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_parses_object() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/Workflows/C/workflow.json",
            ResponseTemplate::new(200).set_body_string(r#"{"kind":"Stateful"}"#),
        )
        .await;

        let entry = fetch_workflow(&kudu(&server), &WorkflowFolder::new("Workflows/C"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "C");
        assert_eq!(entry.path, "Workflows/C");
        assert_eq!(entry.definition["kind"], "Stateful");
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_none() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/lib/workflow.json",
            ResponseTemplate::new(404),
        )
        .await;

        let result = fetch_workflow(&kudu(&server), &WorkflowFolder::new("lib")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_fetch_malformed() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/A/workflow.json",
            ResponseTemplate::new(200).set_body_string("{ truncated"),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/B/workflow.json",
            ResponseTemplate::new(200).set_body_string("[1, 2]"),
        )
        .await;

        let client = kudu(&server);
        for name in ["A", "B"] {
            let err = fetch_workflow(&client, &WorkflowFolder::new(name))
                .await
                .unwrap_err();
            assert!(matches!(err, BackupError::MalformedWorkflow { .. }), "got: {err}");
        }
    }

    #[tokio::test]
    async fn test_fetch_all_tolerates_partial_failure() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/A/workflow.json",
            ResponseTemplate::new(200).set_body_string("{}"),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/B/workflow.json",
            ResponseTemplate::new(500),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/C/workflow.json",
            ResponseTemplate::new(404),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/D/workflow.json",
            ResponseTemplate::new(200).set_body_string(r#"{"d":1}"#),
        )
        .await;

        let folders: Vec<_> = ["A", "B", "C", "D"].into_iter().map(WorkflowFolder::new).collect();
        let report = fetch_all(&kudu(&server), &folders, 2).await;

        let names: Vec<&str> = report.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "D"]);
        assert_eq!(report.skipped, vec![WorkflowFolder::new("C")]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "B");
        assert!(report.failures[0].reason.contains("500"));
    }

    #[tokio::test]
    async fn test_same_name_resolved_by_first_definition_found() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/C/workflow.json",
            ResponseTemplate::new(404),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/Workflows/C/workflow.json",
            ResponseTemplate::new(200).set_body_string(r#"{"nested":true}"#),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/D/workflow.json",
            ResponseTemplate::new(200).set_body_string(r#"{"top":true}"#),
        )
        .await;
        mount(
            &server,
            "/api/vfs/site/wwwroot/Workflows/D/workflow.json",
            ResponseTemplate::new(200).set_body_string(r#"{"nested":true}"#),
        )
        .await;

        let folders: Vec<_> = ["C", "Workflows/C", "D", "Workflows/D"]
            .into_iter()
            .map(WorkflowFolder::new)
            .collect();
        let report = fetch_all(&kudu(&server), &folders, 4).await;

        let paths: Vec<&str> = report.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Workflows/C", "D"]);
        assert_eq!(
            report.skipped,
            vec![WorkflowFolder::new("C"), WorkflowFolder::new("Workflows/D")]
        );
        assert!(report.failures.is_empty());
    }
}
