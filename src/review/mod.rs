//! Issue model, report rendering and the review gate.
//!
//! ## Components
//!
//! - [`findings`]: normalized [`Issue`] and [`ReportSummary`] types
//! - [`format`]: [`OutputFormat`] and one [`ReportFormatter`] per format
//! - [`policy`]: [`ReviewPolicy`], which turns issues into a [`ReviewDecision`]
//!
//! ## Example
//!
//! ```
//! use perflens::memory::MemoryInsights;
//! use perflens::review::{ArtifactIssues, Issue, ReviewEvent, ReviewPolicy, Severity};
//!
//! let issues = vec![Issue::new("src/App.tsx", "Inline object").with_severity(Severity::Critical)];
//! let policy = ReviewPolicy::new(Severity::Medium, false);
//! let decision = policy
//!     .decide(
//!         &[ArtifactIssues { path: "src/App.tsx", issues: &issues }],
//!         &MemoryInsights::default(),
//!     )
//!     .unwrap();
//!
//! assert_eq!(decision.event, ReviewEvent::RequestChanges);
//! assert_eq!(decision.comments.len(), 1);
//! ```

pub mod findings;
pub mod format;
pub mod policy;

pub use findings::{Confidence, Issue, ReportSummary, Severity};
pub use format::{OutputFormat, ReportFormatter};
pub use policy::{ArtifactIssues, ReviewComment, ReviewDecision, ReviewEvent, ReviewPolicy};
