//! Built-in IdP rule table.
//!
//! Order matters: detectors report IdPs in table order, and SDK entries are
//! tried top to bottom with `CUSTOM` last.

use super::types::{IdpKind, IdpRuleSpec, UrlRuleSpec};

const CLIENT_ID: &[(&str, &str)] = &[("^client_id$", ".*")];
const CUSTOM: (&str, UrlRuleSpec) = ("CUSTOM", UrlRuleSpec::any());

const GOOGLE_DOMAIN: &str = r"^accounts\.google\.com$";
const GOOGLE_PASSIVE_PATH: &str = "^(/gsi/status|/gsi/iframe/select)";

/// Shorthand for the common shape of an OAuth-style SSO entry.
const fn sso(
    name: &'static str,
    keywords: &'static [&'static str],
    login_request_rule: UrlRuleSpec,
    sdks: &'static [(&'static str, UrlRuleSpec)],
) -> IdpRuleSpec {
    IdpRuleSpec {
        name,
        kind: IdpKind::Sso,
        keywords,
        login_request_rule,
        passive_login_request_rule: None,
        form_rule: None,
        mfa_selectors: &[],
        sdks,
    }
}

pub(crate) const BUILTIN_RULES: &[IdpRuleSpec] = &[
    sso(
        "APPLE",
        &["apple"],
        UrlRuleSpec::new(r"^appleid\.apple\.com$", "^/auth/authorize", CLIENT_ID),
        &[
            (
                "SIGN_IN_WITH_APPLE",
                UrlRuleSpec::new(
                    r"^appleid\.apple\.com$",
                    "^/auth/authorize",
                    &[("^client_id$", ".*"), ("^frame_id$", ".*")],
                ),
            ),
            CUSTOM,
        ],
    ),
    sso(
        "FACEBOOK",
        &["facebook"],
        UrlRuleSpec::new(r"facebook\.com$", "/dialog/oauth", &[("^(client_id|app_id)$", ".*")]),
        &[
            (
                "FACEBOOK_LOGIN",
                UrlRuleSpec::new(
                    r"facebook\.com$",
                    "/dialog/oauth",
                    &[
                        ("^app_id$", ".*"),
                        ("^channel_url$", r"^https://staticxx\.facebook\.com/x/connect/xd_arbiter/"),
                    ],
                ),
            ),
            CUSTOM,
        ],
    ),
    IdpRuleSpec {
        passive_login_request_rule: Some(UrlRuleSpec::new(GOOGLE_DOMAIN, GOOGLE_PASSIVE_PATH, CLIENT_ID)),
        ..sso(
            "GOOGLE",
            &["google", "gmail", "gplus"],
            UrlRuleSpec::new(GOOGLE_DOMAIN, "(/auth/authorize|/gsi/select|/oauth2)", CLIENT_ID)
                .excluding("/iframerpc"),
            &[
                ("SIGN_IN_WITH_GOOGLE", UrlRuleSpec::new(GOOGLE_DOMAIN, "^/gsi/select", CLIENT_ID)),
                ("GOOGLE_ONE_TAP", UrlRuleSpec::new(GOOGLE_DOMAIN, GOOGLE_PASSIVE_PATH, CLIENT_ID)),
                (
                    "GOOGLE_SIGN_IN_DEPRECATED",
                    UrlRuleSpec::new(
                        GOOGLE_DOMAIN,
                        "^/o/oauth2",
                        &[("^client_id$", ".*"), ("^redirect_uri$", "^storagerelay://")],
                    ),
                ),
                CUSTOM,
            ],
        )
    },
    sso(
        "TWITTER_1.0",
        &["twitter"],
        UrlRuleSpec::new(
            r"^(api\.twitter\.com|twitter\.com)$",
            "/oauth",
            &[("^(oauth_token|client_id)$", ".*")],
        ),
        &[CUSTOM],
    ),
    sso(
        "MICROSOFT",
        &["microsoft", "xbox", "azure"],
        UrlRuleSpec::new(r"^(login\.live\.com|login\.microsoftonline\.com)$", "/oauth", CLIENT_ID),
        &[CUSTOM],
    ),
    sso(
        "LINKEDIN",
        &["linkedin"],
        UrlRuleSpec::new(r"^www\.linkedin\.com$", "/oauth", CLIENT_ID),
        &[CUSTOM],
    ),
    sso(
        "BAIDU",
        &["baidu"],
        UrlRuleSpec::new(r"^openapi\.baidu\.com$", "/oauth", CLIENT_ID),
        &[CUSTOM],
    ),
    sso(
        "GITHUB",
        &["github"],
        UrlRuleSpec::new(r"^github\.com$", "(/oauth|/login)", CLIENT_ID),
        &[CUSTOM],
    ),
    sso(
        "QQ",
        &["qq"],
        UrlRuleSpec::new(r"^graph\.qq\.com$", "/oauth", CLIENT_ID),
        &[CUSTOM],
    ),
    sso(
        "SINA_WEIBO",
        &["weibo", "sina"],
        UrlRuleSpec::new(r"^api\.weibo\.com$", "/oauth", CLIENT_ID),
        &[CUSTOM],
    ),
    sso(
        "WECHAT",
        &["wechat", "weixin"],
        UrlRuleSpec::new(r"^open\.weixin\.qq\.com$", "/connect/qrconnect", &[("^appid$", ".*")]),
        &[CUSTOM],
    ),
    IdpRuleSpec {
        name: "PASSKEY",
        kind: IdpKind::Passkey,
        keywords: &["passkey", "webauthn", "passwordless", "sign in with a passkey", "use passkey"],
        login_request_rule: UrlRuleSpec::new(".*", ".*", &[("^webauthn$", ".*")]),
        passive_login_request_rule: Some(UrlRuleSpec::any()),
        form_rule: None,
        mfa_selectors: &[],
        sdks: &[
            ("WEBAUTHN", UrlRuleSpec::new(r"^webauthn\..*", "^/authenticate", &[])),
            CUSTOM,
        ],
    },
    IdpRuleSpec {
        name: "MFA_GENERIC",
        kind: IdpKind::Mfa,
        keywords: &[
            "two-factor",
            "2fa",
            "mfa",
            "multi-factor",
            "verification code",
            "one-time code",
            "authenticator",
            "totp",
        ],
        login_request_rule: UrlRuleSpec::new(
            ".*",
            ".*(2fa|mfa|totp|authenticate|verification|verify).*",
            &[("^(code|otp|token)$", ".*")],
        ),
        passive_login_request_rule: Some(UrlRuleSpec::any()),
        form_rule: None,
        mfa_selectors: &[
            ".otp-input",
            "#verificationCode",
            "input[name='code']",
            "input[name='otp']",
            "input[name='token']",
        ],
        sdks: &[CUSTOM],
    },
    IdpRuleSpec {
        name: "PASSWORD_BASED",
        kind: IdpKind::Password,
        keywords: &["login", "sign in", "username", "password", "email", "account"],
        login_request_rule: UrlRuleSpec::new(
            ".*",
            ".*(login|signin|auth).*",
            &[("^(username|email|password)$", ".*")],
        ),
        passive_login_request_rule: Some(UrlRuleSpec::any()),
        form_rule: Some((&["email", "user", "login", "username"], &["pass", "pwd", "password"])),
        mfa_selectors: &[],
        sdks: &[CUSTOM],
    },
];
