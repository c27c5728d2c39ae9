//! Deployment variables: `${VAR}` substitution, the built-in default
//! block, and random secret generation.
//!
//! Substitution is deliberately dumb string replacement. Supplied
//! values are applied before defaults so they always win, and tokens
//! that match neither are left verbatim for the operator to spot in
//! the rendered output.

use indexmap::IndexMap;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;

pub const DEFAULT_DOMAIN: &str = "example.com";
pub const DEFAULT_POSTIZ_SUBDOMAIN: &str = "postiz";
pub const DEFAULT_SSL_EMAIL: &str = "admin@example.com";
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Length of a generated deploy-time secret.
pub const SECRET_LEN: usize = 32;

/// Replace every `${KEY}` occurrence with its value from `vars`.
/// Tokens with no matching key are left untouched.
#[must_use]
pub fn substitute(text: &str, vars: &IndexMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

/// The recognized default block, with supplied values taking
/// precedence over built-ins.
///
/// `jwt_secret` is injected by the caller (normally
/// [`generate_secret`]) so that rendering stays deterministic under
/// test.
#[must_use]
pub fn resolve_defaults(
    supplied: &IndexMap<String, String>,
    jwt_secret: &str,
) -> IndexMap<String, String> {
    let pick = |key: &str, fallback: &str| {
        supplied
            .get(key)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    };

    let mut defaults = IndexMap::new();
    defaults.insert("DOMAIN_NAME".to_string(), pick("DOMAIN_NAME", DEFAULT_DOMAIN));
    defaults.insert(
        "POSTIZ_SUBDOMAIN".to_string(),
        pick("POSTIZ_SUBDOMAIN", DEFAULT_POSTIZ_SUBDOMAIN),
    );
    defaults.insert("SSL_EMAIL".to_string(), pick("SSL_EMAIL", DEFAULT_SSL_EMAIL));
    defaults.insert(
        "GENERIC_TIMEZONE".to_string(),
        pick("GENERIC_TIMEZONE", DEFAULT_TIMEZONE),
    );
    defaults.insert("JWT_SECRET".to_string(), pick("JWT_SECRET", jwt_secret));
    defaults
}

/// Generate a 32-character uniform alphanumeric secret from the OS
/// random source. Used only when the caller did not supply one.
#[must_use]
pub fn generate_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}
