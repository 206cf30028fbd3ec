//! Data models for contextkeep.
//!
//! This module contains the core data structures shared by storage and
//! services.

mod activity;
mod cache;
mod document;
mod item;
mod link;
mod outcome;
mod search;
mod session;
mod workspace;

pub use activity::{
    ActivityQuery, DEFAULT_ACTIVITY_HOURS, DEFAULT_ACTIVITY_LIMIT, RecentActivity,
};
pub use cache::{
    CacheRecommendation, CacheState, CacheSuggestion, CacheableCandidate, CacheableContent,
    CandidateSource, ChangedSource, DynamicContextBundle, DynamicSection, PrefixSection,
    PriorityTier, SourceKind, StableContextPrefix,
};
pub use document::{
    ContextDocument, ContextKind, ContextUpdate, ContextVersion, DocumentContent, DocumentPatch,
    HistoryQuery, PatchOp, apply_patch,
};
pub use item::{
    CustomDatum, DEFAULT_PROGRESS_RELATIONSHIP, Decision, ItemFilter, ItemRef, ItemType,
    KnowledgeItem, NewCustomDatum, NewDecision, NewProgress, NewSystemPattern, ProgressEntry,
    ProgressUpdate, SystemPattern, render_value,
};
pub use link::{Link, LinkQuery, NewLink};
pub use outcome::{
    BatchItemResult, BatchReport, DeleteOutcome, LoggedCustomData, LoggedProgress,
    ReconcileReport, WriteOutcome,
};
pub use search::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT, SearchFilter, SearchHit, SearchMode};
pub use session::{SESSION_ACTIVITY_HOURS, SESSION_ACTIVITY_LIMIT, SessionInit};
pub use workspace::{MAX_WORKSPACE_ID_LEN, WorkspaceId};
