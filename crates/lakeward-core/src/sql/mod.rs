//! SQL analysis and policy rewriting.

pub mod analyze;
pub mod rewrite;

pub use analyze::{AnalyzedQuery, StatementAnalyzer};
pub use rewrite::{
    parse_policy_expr, quote_identifier, quote_relation, PolicyRewriter, RewrittenQuery,
    TablePolicy,
};
