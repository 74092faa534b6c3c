//! # Project Evaluation Connector
//!
//! This library scores projects against weighted rubrics and tracks the progress of the
//! evaluators assigned to them. Projects, users and notifications live in a hosted document
//! store reached over REST with `reqwest`; requests share a concurrency limit and are
//! retried while the store throttles them.
//!
//! ## Core Features
//!
//! - **Rubrics:** Ordered sections of weighted criteria, edited by position.
//! - **Scoring:** Section percentages and a weight-normalized overall score per evaluator,
//!   with side-by-side comparison of evaluators.
//! - **Evaluation tracking:** Per-role records (`PV1`, `PV2`, `VK`) moving from pending to
//!   in progress to completed, the project status derived from them, and a quorum gate
//!   before results are shown.
//! - **Assignment:** Binding evaluators to roles and keeping the users' `assignedProjects`
//!   back-references and notifications in line.
//! - **Credentials:** Store URL and token from the environment, a config file or the system
//!   keyring.
//!
//! ### Examples
//!
//! Fetching the projects visible to a caller:
//! ```no_run
//! use project_evaluation_connector::{Caller, Store, StoreCredentials, StoreResultProjects};
//!
//! let credentials = StoreCredentials::credentials().unwrap();
//! let caller = Caller::evaluator("uid-42", "ana@example.org");
//! match Store::fetch_projects_with_credentials(&credentials, &caller) {
//!     StoreResultProjects::Ok(projects) => {
//!         for project in projects {
//!             println!("{}: {}%", project.document.project_name, project.completion_percentage());
//!         }
//!     }
//!     StoreResultProjects::ErrConnection(err) => eprintln!("Connection error: {}", err),
//!     StoreResultProjects::ErrCredentials(err) => eprintln!("Credentials error: {}", err),
//! }
//! ```
//!
//! Scoring a rubric directly:
//! ```
//! use project_evaluation_connector::{score, CriterionKey, Ratings, Rubric};
//!
//! let mut rubric = Rubric::default();
//! rubric.add_section();
//! rubric.add_criterion(0);
//! rubric.sections[0].weight = 1.0;
//! rubric.sections[0].criteria[0].max_rating = 4.0;
//!
//! let ratings: Ratings = [(CriterionKey::new(0, 0), 3.0)].into_iter().collect();
//! assert_eq!(score(&rubric, &ratings).overall, 75.0);
//! ```
pub mod access; // Caller identity and write authorization.
pub mod binding; // Evaluator assignment across project and user documents.
mod connection; // HTTP requests to the document store.
pub mod credentials; // Storage and retrieval of store credentials.
pub mod criterion_key;
pub mod error;
pub mod evaluation; // Per-role evaluation records.
pub mod evaluator; // Evaluator roles and their bindings.
pub mod memory_store;
pub mod notification;
pub mod project; // Project documents and the evaluation workflow.
pub mod project_draft;
pub mod report; // Rounded views of the scores.
pub mod rest_store;
pub mod rubric;
pub mod scoring;
mod serde_helpers; // Lenient readers for stored documents.
pub mod status; // Completion tracking and the quorum gate.
pub mod store;
pub mod user;

// Exports key structures for external use.
pub use access::Caller;
pub use binding::{BindingFailure, BindingReport, BindingStep};
pub use credentials::StoreCredentials;
pub use criterion_key::CriterionKey;
pub use error::{EvaluationError, StoreError};
pub use evaluation::{EvaluationRecord, EvaluationStatus, Ratings};
pub use evaluator::{EvaluatorBinding, EvaluatorBindings, EvaluatorRole};
pub use memory_store::InMemoryStore;
pub use notification::Notification;
pub use project::{Project, ProjectDocument};
pub use project_draft::ProjectDraft;
pub use report::{round_percent, ProjectResults, ScoreReport};
pub use rest_store::RestStore;
pub use rubric::{Criterion, Rubric, RubricIssue, Section};
pub use scoring::{compare_evaluators, score, ScoreCard};
pub use status::{EvaluationCounts, ProjectStatus, QuorumPolicy};
pub use store::{DocumentStore, Store, StoreResultProjects, StoreResultSingleProject};
pub use user::{User, UserRole};
