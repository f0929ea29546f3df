//! Compiled rule types.

use regex::Regex;

/// Constraint on one query or body parameter.
#[derive(Debug, Clone)]
pub struct ParamRule {
    pub name: Regex,
    pub value: Regex,
}

/// Domain/path/param regex triple describing a login request.
///
/// All regexes are unanchored searches unless the pattern anchors itself.
#[derive(Debug, Clone)]
pub struct UrlRule {
    pub domain: Regex,
    pub path: Regex,
    /// A path matching this regex never satisfies the rule
    pub path_exclude: Option<Regex>,
    pub params: Vec<ParamRule>,
}

/// Source text for a [`UrlRule`], compiled once at startup.
#[derive(Debug, Clone, Copy)]
pub struct UrlRuleSpec {
    pub domain: &'static str,
    pub path: &'static str,
    pub path_exclude: Option<&'static str>,
    /// `(name, value)` regex pairs
    pub params: &'static [(&'static str, &'static str)],
}

impl UrlRuleSpec {
    pub const fn new(
        domain: &'static str,
        path: &'static str,
        params: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            domain,
            path,
            path_exclude: None,
            params,
        }
    }

    pub const fn excluding(mut self, path_exclude: &'static str) -> Self {
        self.path_exclude = Some(path_exclude);
        self
    }

    /// The catch-all rule used by `CUSTOM` SDK entries.
    pub const fn any() -> Self {
        Self::new(".*", ".*", &[])
    }

    pub fn compile(&self) -> Result<UrlRule, regex::Error> {
        Ok(UrlRule {
            domain: Regex::new(self.domain)?,
            path: Regex::new(self.path)?,
            path_exclude: self.path_exclude.map(Regex::new).transpose()?,
            params: self
                .params
                .iter()
                .map(|(name, value)| {
                    Ok(ParamRule {
                        name: Regex::new(name)?,
                        value: Regex::new(value)?,
                    })
                })
                .collect::<Result<Vec<_>, regex::Error>>()?,
        })
    }
}

/// Whether an entry names a federated IdP or a first-party auth method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdpKind {
    Sso,
    Passkey,
    Mfa,
    Password,
}

/// Tokens identifying username and password inputs by name, id, or placeholder.
#[derive(Debug, Clone, Default)]
pub struct FormRule {
    pub username: Vec<String>,
    pub password: Vec<String>,
}

/// Recognition rules for one IdP or auth method.
#[derive(Debug, Clone)]
pub struct IdpRule {
    pub name: String,
    pub kind: IdpKind,
    pub keywords: Vec<String>,
    pub login_request_rule: UrlRule,
    pub passive_login_request_rule: Option<UrlRule>,
    pub form_rule: Option<FormRule>,
    pub mfa_selectors: Vec<String>,
    /// SDK sub-rules in declaration order
    pub sdks: Vec<(String, UrlRule)>,
}

/// Static description of an [`IdpRule`].
#[derive(Debug, Clone, Copy)]
pub struct IdpRuleSpec {
    pub name: &'static str,
    pub kind: IdpKind,
    pub keywords: &'static [&'static str],
    pub login_request_rule: UrlRuleSpec,
    pub passive_login_request_rule: Option<UrlRuleSpec>,
    pub form_rule: Option<(&'static [&'static str], &'static [&'static str])>,
    pub mfa_selectors: &'static [&'static str],
    pub sdks: &'static [(&'static str, UrlRuleSpec)],
}

impl IdpRuleSpec {
    pub fn compile(&self) -> Result<IdpRule, regex::Error> {
        let to_strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Ok(IdpRule {
            name: self.name.to_string(),
            kind: self.kind,
            keywords: to_strings(self.keywords),
            login_request_rule: self.login_request_rule.compile()?,
            passive_login_request_rule: self
                .passive_login_request_rule
                .as_ref()
                .map(UrlRuleSpec::compile)
                .transpose()?,
            form_rule: self.form_rule.map(|(username, password)| FormRule {
                username: to_strings(username),
                password: to_strings(password),
            }),
            mfa_selectors: to_strings(self.mfa_selectors),
            sdks: self
                .sdks
                .iter()
                .map(|(name, rule)| Ok((name.to_string(), rule.compile()?)))
                .collect::<Result<Vec<_>, regex::Error>>()?,
        })
    }
}

/// The compiled, read-only rule table.
#[derive(Debug, Clone, Default)]
pub struct IdpRuleTable {
    rules: Vec<IdpRule>,
}

impl IdpRuleTable {
    pub fn from_specs(specs: &[IdpRuleSpec]) -> Result<Self, regex::Error> {
        let rules = specs
            .iter()
            .map(IdpRuleSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdpRule> {
        self.rules.iter()
    }

    pub fn get(&self, name: &str) -> Option<&IdpRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Federated IdPs only (no passkey, MFA, or password entries).
    pub fn sso(&self) -> impl Iterator<Item = &IdpRule> {
        self.rules.iter().filter(|r| r.kind == IdpKind::Sso)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
