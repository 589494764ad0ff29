//! End-to-end pull request workflow against in-process doubles.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};

use perflens::errors::{HostError, ParserError, StageError};
use perflens::github::{ChangedFile, CodeHost, CommentResponse, ReviewResponse};
use perflens::parser::{ParseResult, SourceParser};
use perflens::pipeline::stages::StageSpec;
use perflens::pipeline::{StageEvent, StageExecutor, StageOrchestrator};
use perflens::review::{ReviewComment, ReviewEvent, ReviewPolicy, Severity};
use perflens::session::{InMemorySessionStore, SessionHandle, SessionKey, SessionStore};
use perflens::workflow::{ArtifactRunner, PrWorkflow};

#[derive(Debug, Clone)]
struct PostedReview {
    commit_id: String,
    body: String,
    event: ReviewEvent,
    comments: Vec<ReviewComment>,
}

struct FakeHost {
    files: Vec<(&'static str, &'static str)>,
    reject_reviews: bool,
    reviews: Mutex<Vec<PostedReview>>,
}

impl FakeHost {
    fn new(files: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            files,
            reject_reviews: false,
            reviews: Mutex::new(Vec::new()),
        }
    }

    fn rejecting(mut self) -> Self {
        self.reject_reviews = true;
        self
    }
}

#[async_trait]
impl CodeHost for FakeHost {
    fn repository(&self) -> &str {
        "acme/widgets"
    }

    async fn list_changed_files(&self, _pr_number: u64) -> Result<Vec<ChangedFile>, HostError> {
        Ok(self
            .files
            .iter()
            .map(|(name, _)| ChangedFile {
                filename: name.to_string(),
                status: "modified".to_string(),
                contents_url: None,
            })
            .collect())
    }

    async fn fetch_content(&self, file: &ChangedFile, git_ref: &str) -> Result<String, HostError> {
        assert_eq!(git_ref, "abc123");
        self.files
            .iter()
            .find(|(name, _)| *name == file.filename)
            .map(|(_, content)| content.to_string())
            .ok_or(HostError::Status {
                status: 404,
                url: file.filename.clone(),
                body: "Not Found".to_string(),
            })
    }

    async fn head_sha(&self, _pr_number: u64) -> Result<String, HostError> {
        Ok("abc123".to_string())
    }

    async fn create_review(
        &self,
        _pr_number: u64,
        commit_id: &str,
        body: &str,
        event: ReviewEvent,
        comments: &[ReviewComment],
    ) -> Result<ReviewResponse, HostError> {
        if self.reject_reviews {
            return Err(HostError::Status {
                status: 422,
                url: "reviews".to_string(),
                body: "Unprocessable Entity".to_string(),
            });
        }
        let mut reviews = self.reviews.lock().unwrap();
        reviews.push(PostedReview {
            commit_id: commit_id.to_string(),
            body: body.to_string(),
            event,
            comments: comments.to_vec(),
        });
        Ok(ReviewResponse {
            id: reviews.len() as u64,
        })
    }

    async fn post_comment(
        &self,
        _pr_number: u64,
        _path: &str,
        _line: u32,
        _body: &str,
        _commit_id: Option<&str>,
    ) -> Result<CommentResponse, HostError> {
        Ok(CommentResponse { id: 1 })
    }
}

struct FakeParser;

#[async_trait]
impl SourceParser for FakeParser {
    async fn parse(&self, _source: &str, filename: &str) -> Result<ParseResult, ParserError> {
        if filename.contains("broken") {
            return Err(ParserError::Reported("Unexpected token".to_string()));
        }
        Ok(ParseResult {
            success: true,
            components: vec![json!({"name": "Widget", "isMemoized": false, "hooks": []})],
            ..Default::default()
        })
    }
}

/// Emits a report per artifact: `a.tsx` has one critical issue, anything
/// else has none.
struct ScriptedBackend;

#[async_trait]
impl StageExecutor for ScriptedBackend {
    async fn execute(
        &self,
        stage: &StageSpec,
        prompt: &str,
        _session: &SessionHandle,
    ) -> Result<Vec<StageEvent>, StageError> {
        let issues = if prompt.contains("a.tsx") {
            json!([{
                "file": "src/a.tsx",
                "line": 12,
                "component": "Widget",
                "severity": "critical",
                "title": "Inline object breaks memoization",
                "problem": "A new style object is created on every render.",
                "suggestion": "Hoist the object or wrap it in useMemo."
            }])
        } else {
            json!([])
        };
        let report = json!({"issues": issues, "summary": {"files_analyzed": 1}});
        Ok(vec![
            StageEvent::text(stage.name, "Working on it."),
            StageEvent::final_text(stage.name, format!("```json\n{}\n```", report)),
        ])
    }
}

fn workflow(host: Arc<FakeHost>, store: Arc<InMemorySessionStore>) -> PrWorkflow {
    let orchestrator = StageOrchestrator::new(
        Arc::new(ScriptedBackend),
        Arc::new(FakeParser),
        store.clone(),
    );
    let runner = ArtifactRunner::new(Arc::new(orchestrator), 120);
    PrWorkflow::new(
        host,
        store,
        runner,
        ReviewPolicy::new(Severity::Medium, false),
    )
}

#[tokio::test]
async fn test_critical_issue_requests_changes() {
    let host = Arc::new(FakeHost::new(vec![
        ("src/a.tsx", "export const A = () => <Widget style={{}} />;"),
        ("src/b.tsx", "export const B = () => null;"),
    ]));
    let store = Arc::new(InMemorySessionStore::new());
    let outcome = workflow(host.clone(), store.clone())
        .analyze_and_review(42, false)
        .await
        .unwrap();

    assert!(outcome.review_posted);
    assert_eq!(outcome.review_event, Some(ReviewEvent::RequestChanges));
    assert_eq!(outcome.comments_posted, 1);
    assert_eq!(outcome.analysis.files_analyzed, 2);
    assert_eq!(outcome.analysis.total_issues, 1);
    assert_eq!(outcome.analysis.issue_breakdown["critical"], 1);

    let reviews = host.reviews.lock().unwrap();
    assert_eq!(reviews.len(), 1);
    let review = &reviews[0];
    assert_eq!(review.commit_id, "abc123");
    assert_eq!(review.event, ReviewEvent::RequestChanges);
    assert_eq!(review.comments.len(), 1);
    assert_eq!(review.comments[0].path, "src/a.tsx");
    assert_eq!(review.comments[0].line, 12);
    assert!(review.body.contains("Critical issues found: 1"));

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_failed_artifact_does_not_abort_run() {
    let host = Arc::new(FakeHost::new(vec![
        ("src/broken.tsx", "export const = ;"),
        ("src/b.tsx", "export const B = () => null;"),
    ]));
    let store = Arc::new(InMemorySessionStore::new());
    let analysis = workflow(host, store).analyze_pr(7).await.unwrap();

    assert_eq!(analysis.results.len(), 2);
    assert!(!analysis.results[0].success);
    assert!(
        analysis.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Unexpected token")
    );
    assert!(analysis.results[1].success);
    assert_eq!(analysis.files_analyzed, 1);
    assert_eq!(analysis.repository, "acme/widgets");
    assert!(analysis.session_id.starts_with("pr-"));
}

#[tokio::test]
async fn test_post_failure_keeps_analysis() {
    let host = Arc::new(
        FakeHost::new(vec![("src/a.tsx", "export const A = () => null;")]).rejecting(),
    );
    let store = Arc::new(InMemorySessionStore::new());
    let outcome = workflow(host, store)
        .analyze_and_review(42, false)
        .await
        .unwrap();

    assert!(!outcome.review_posted);
    assert!(outcome.error.as_deref().unwrap().contains("422"));
    assert_eq!(outcome.analysis.total_issues, 1);
}

#[tokio::test]
async fn test_analyze_only_posts_nothing() {
    let host = Arc::new(FakeHost::new(vec![("src/a.tsx", "x")]));
    let store = Arc::new(InMemorySessionStore::new());
    let outcome = workflow(host.clone(), store)
        .analyze_and_review(42, true)
        .await
        .unwrap();

    assert!(!outcome.review_posted);
    assert!(outcome.reason.is_some());
    assert_eq!(outcome.analysis.total_issues, 1);
    assert!(host.reviews.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_reviewable_files_skips_review() {
    let host = Arc::new(FakeHost::new(Vec::new()));
    let store = Arc::new(InMemorySessionStore::new());
    let outcome = workflow(host.clone(), store.clone())
        .analyze_and_review(42, false)
        .await
        .unwrap();

    assert!(!outcome.review_posted);
    assert_eq!(outcome.reason.as_deref(), Some("No files were analyzed"));
    assert!(host.reviews.lock().unwrap().is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_run_session_is_purged_from_shared_store() {
    let host = Arc::new(FakeHost::new(vec![("src/b.tsx", "x")]));
    let store = Arc::new(InMemorySessionStore::new());
    let concurrent_run = SessionKey::for_run("github.com", "acme/widgets", 4);
    store.ensure(&concurrent_run).await.unwrap();
    store
        .append(&concurrent_run, json!({"artifact": "src/c.tsx"}))
        .await
        .unwrap();

    let analysis = workflow(host, store.clone()).analyze_pr(3).await.unwrap();

    // Another run sharing the store keeps its session and history.
    assert!(store.contains(&concurrent_run.session_id).await);
    assert_eq!(store.history(&concurrent_run).await.unwrap().len(), 1);
    assert_eq!(store.len().await, 1);

    assert!(!store.contains(&analysis.session_id).await);
    assert!(
        store
            .history(&SessionKey::for_run("github.com", "acme/widgets", 3))
            .await
            .is_err()
    );
}
