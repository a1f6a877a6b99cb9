//! UI message builders.
//!
//! Three deterministic screens (form, confirmation, search results)
//! plus the generative review screen with its repair/completion/fallback
//! chain. All builders are pure: data in, message sequence out.

pub mod builder;
pub mod review;

pub use builder::{build_confirmation, build_expense_form, build_search_results};
pub use review::{build_review_fallback, build_review_ui, is_valid_response};
