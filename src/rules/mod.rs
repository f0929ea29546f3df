//! Identity-provider rule table.
//!
//! The table maps each IdP (and the first-party methods PASSKEY, MFA_GENERIC,
//! and PASSWORD_BASED) to its keywords, login-request rule, optional passive
//! rule, form and MFA hints, and ordered SDK sub-rules. It is compiled once on
//! first use and shared read-only afterwards.

mod matching;
mod table;
mod types;

use std::sync::{Arc, LazyLock};

pub use matching::{match_request, match_sdk, match_url};
pub use types::{
    FormRule, IdpKind, IdpRule, IdpRuleSpec, IdpRuleTable, ParamRule, UrlRule, UrlRuleSpec,
};

static IDP_RULES: LazyLock<Arc<IdpRuleTable>> = LazyLock::new(|| {
    match IdpRuleTable::from_specs(table::BUILTIN_RULES) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            log::error!("Failed to compile IdP rule table: {e}");
            Arc::new(IdpRuleTable::default())
        }
    }
});

/// Returns the shared, compiled rule table.
pub fn idp_rules() -> Arc<IdpRuleTable> {
    Arc::clone(&IDP_RULES)
}
